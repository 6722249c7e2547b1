//! Structural diff between two snapshot trees of one entity.
//!
//! The new tree is a sparse overlay: a leaf that is missing (or null) in the new tree
//! carries no opinion and never produces a change.

use core::fmt::{self, Display, Formatter};

use itertools::Itertools;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// One step from a tree node to one of its children
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSegment {
    /// A map field
    Field(String),
    /// A sequence index
    Index(usize),
}

impl Display for PathSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => write!(f, "{}", name),
            PathSegment::Index(i) => write!(f, "{}", i),
        }
    }
}

impl Serialize for PathSegment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PathSegment::Field(name) => serializer.serialize_str(name),
            PathSegment::Index(i) => serializer.serialize_u64(*i as u64),
        }
    }
}

/// The location of a leaf, from the root of the tree
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Path(Vec<PathSegment>);

impl Path {
    /// The empty path, pointing at the root
    pub fn root() -> Self {
        Path(Vec::new())
    }

    /// Build a path from field names; numeric names become indices
    pub fn parse(path: &str) -> Self {
        Path(
            path.split('/')
                .filter(|s| !s.is_empty())
                .map(|s| match s.parse::<usize>() {
                    Ok(i) => PathSegment::Index(i),
                    Err(_) => PathSegment::Field(s.to_string()),
                })
                .collect(),
        )
    }

    /// The segments
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Each segment rendered as a string, handy for slice-pattern matching
    pub fn labels(&self) -> Vec<String> {
        self.0.iter().map(|s| s.to_string()).collect()
    }

    fn child(&self, segment: PathSegment) -> Path {
        let mut segments = self.0.clone();
        segments.push(segment);
        Path(segments)
    }

    /// Walk the tree along this path.
    ///
    /// Any missing step yields `None` rather than an error.
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut node = root;
        for segment in &self.0 {
            node = match (segment, node) {
                (PathSegment::Field(name), Value::Object(map)) => map.get(name)?,
                (PathSegment::Index(i), Value::Array(items)) => items.get(*i)?,
                _ => return None,
            };
        }
        Some(node)
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().join("/"))
    }
}

/// A single changed leaf
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Change {
    /// Where the leaf lives
    pub path: Path,
    /// The old value, if the old tree had one
    pub from: Option<Value>,
    /// The new value
    pub to: Value,
}

impl Display for Change {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.from {
            Some(from) => write!(f, "{}: {} -> {}", self.path, from, self.to),
            None => write!(f, "{}: (absent) -> {}", self.path, self.to),
        }
    }
}

/// Compute the changes needed to bring `old` in line with `new`.
///
/// Map fields are visited in key order, sequences by index.  Neither tree is modified.
pub fn diff(old: &Value, new: &Value) -> Vec<Change> {
    let mut changes = Vec::new();
    walk(old, new, Path::root(), &mut changes);
    changes
}

fn walk(old_root: &Value, new: &Value, path: Path, changes: &mut Vec<Change>) {
    match new {
        Value::Object(map) => {
            for (name, child) in map {
                walk(old_root, child, path.child(PathSegment::Field(name.clone())), changes);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                walk(old_root, child, path.child(PathSegment::Index(i)), changes);
            }
        }
        Value::Null => {}
        leaf => {
            let from = path.resolve(old_root).filter(|v| !v.is_null());
            if from != Some(leaf) {
                changes.push(Change { path, from: from.cloned(), to: leaf.clone() });
            }
        }
    }
}
