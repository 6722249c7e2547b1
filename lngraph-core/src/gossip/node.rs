use serde_json::Value;

use super::{decode_leaf, GossipTarget, PathClass};
use crate::diff::Path;
use crate::error::GraphError;
use crate::guard::MutationToken;
use crate::model::node::Node;

/// The node fields gossip may change
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeField {
    /// `alias`
    Alias,
    /// `color`
    Color,
}

/// A decoded node change
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeMutation {
    /// New alias
    Alias(String),
    /// New color
    Color(String),
}

impl GossipTarget for Node {
    type Field = NodeField;
    type Mutation = NodeMutation;

    fn describe(&self) -> String {
        format!("node {}", self.public_key())
    }

    fn classify(path: &Path) -> PathClass<NodeField> {
        let labels = path.labels();
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        match labels.as_slice() {
            ["_key"] | ["public_key"] => PathClass::Forbidden,
            ["_source", ..] | ["myself"] => PathClass::Ignorable,
            ["alias"] => PathClass::Whitelisted(NodeField::Alias),
            ["color"] => PathClass::Whitelisted(NodeField::Color),
            _ => PathClass::Unknown,
        }
    }

    fn snapshot(&self) -> Result<Value, GraphError> {
        Ok(serde_json::to_value(self.dump())?)
    }

    fn decode(&self, field: NodeField, value: &Value) -> Result<NodeMutation, GraphError> {
        Ok(match field {
            NodeField::Alias => NodeMutation::Alias(decode_leaf(value)?),
            NodeField::Color => NodeMutation::Color(decode_leaf(value)?),
        })
    }

    fn commit(&mut self, mutation: NodeMutation, token: &MutationToken) -> Result<(), GraphError> {
        match mutation {
            NodeMutation::Alias(alias) => self.set_alias(alias, token),
            NodeMutation::Color(color) => self.set_color(color, token),
        }
    }
}
