use core::fmt::{self, Debug, Formatter};

use bitcoin::secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{identity_mismatch_error, ownership_error, GraphError};
use crate::guard::{Guarded, MutationGuard, MutationToken};
use crate::key::{CanonicalKey, EntityKind};
use crate::model::Provenance;

/// The canonical key of the node with this public key
pub fn node_key(public_key: &PublicKey) -> CanonicalKey {
    // a serialized public key is never empty, so a key is always derived
    CanonicalKey::derive(EntityKind::Node, &[&public_key.serialize()])
        .unwrap_or_else(|| unreachable!("public key has identifying bytes"))
}

/// Lightning implementation details
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// e.g. `lnd`
    pub implementation: String,
    /// e.g. `0.17.0-beta`
    pub version: String,
}

/// What the local node runs on
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// e.g. `bitcoin`
    pub blockchain: String,
    /// e.g. `mainnet`
    pub network: String,
    /// The Lightning implementation
    pub lightning: Implementation,
}

/// A lightweight reference to a node, as embedded in channels and routes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    /// The canonical key of the node
    #[serde(rename = "_key")]
    pub key: CanonicalKey,
    /// The node's public key
    pub public_key: PublicKey,
    /// Whether this is the local node
    #[serde(default)]
    pub myself: bool,
}

impl NodeRef {
    /// Reference the node with the given public key
    pub fn new(public_key: PublicKey, myself: bool) -> Self {
        NodeRef { key: node_key(&public_key), public_key, myself }
    }

    /// Check that the embedded key belongs to the public key
    pub(crate) fn validate(&self) -> Result<(), GraphError> {
        if self.key != node_key(&self.public_key) {
            return Err(identity_mismatch_error(format!(
                "node key {} does not belong to {}",
                self.key, self.public_key
            )));
        }
        Ok(())
    }

    /// The public view
    pub fn public_view(&self) -> Value {
        json!({ "_key": self.key, "public_key": self.public_key })
    }
}

/// The full, portable state of a [Node]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// The canonical key, if already derived
    #[serde(rename = "_key", default)]
    pub key: Option<CanonicalKey>,
    /// Where the data came from
    #[serde(rename = "_source", default)]
    pub source: Provenance,
    /// The node identity
    pub public_key: PublicKey,
    /// Announced alias
    #[serde(default)]
    pub alias: Option<String>,
    /// Announced color, as `#rrggbb`
    #[serde(default)]
    pub color: Option<String>,
    /// Whether this is the local node
    #[serde(default)]
    pub myself: bool,
    /// Platform details, only known for the local node
    #[serde(default)]
    pub platform: Option<Platform>,
}

/// A Lightning node
#[derive(Clone)]
pub struct Node {
    key: CanonicalKey,
    public_key: PublicKey,
    alias: Option<String>,
    color: Option<String>,
    myself: bool,
    platform: Option<Platform>,
    source: Provenance,
    guard: MutationGuard,
}

impl Node {
    /// Build a node from its snapshot.
    ///
    /// A snapshot that carries a key must carry the key derived from its public key.
    pub fn from_snapshot(snapshot: NodeSnapshot) -> Result<Node, GraphError> {
        let key = node_key(&snapshot.public_key);
        if let Some(claimed) = snapshot.key {
            if claimed != key {
                return Err(identity_mismatch_error(format!(
                    "node key {} does not belong to {}",
                    claimed, snapshot.public_key
                )));
            }
        }
        if snapshot.platform.is_some() && !snapshot.myself {
            return Err(ownership_error(format!(
                "platform given for foreign node {}",
                snapshot.public_key
            )));
        }
        Ok(Node {
            key,
            public_key: snapshot.public_key,
            alias: snapshot.alias,
            color: snapshot.color,
            myself: snapshot.myself,
            platform: snapshot.platform,
            source: snapshot.source,
            guard: MutationGuard::default(),
        })
    }

    /// Build a node from a snapshot tree
    pub fn from_value(value: Value) -> Result<Node, GraphError> {
        Node::from_snapshot(serde_json::from_value(value)?)
    }

    /// The canonical key
    pub fn key(&self) -> &CanonicalKey {
        &self.key
    }

    /// The node identity
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Announced alias
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Announced color
    pub fn color(&self) -> Option<&str> {
        self.color.as_deref()
    }

    /// Whether this is the local node
    pub fn myself(&self) -> bool {
        self.myself
    }

    /// Platform details.  Only available for the local node.
    pub fn platform(&self) -> Result<Option<&Platform>, GraphError> {
        if !self.myself {
            return Err(ownership_error(format!("platform of node {}", self.public_key)));
        }
        Ok(self.platform.as_ref())
    }

    /// A reference to this node
    pub fn to_ref(&self) -> NodeRef {
        NodeRef { key: self.key, public_key: self.public_key, myself: self.myself }
    }

    /// Set the alias.  Requires a prepared token.
    pub fn set_alias(&mut self, alias: String, token: &MutationToken) -> Result<(), GraphError> {
        self.guard.consume(token)?;
        self.alias = Some(alias);
        Ok(())
    }

    /// Set the color.  Requires a prepared token.
    pub fn set_color(&mut self, color: String, token: &MutationToken) -> Result<(), GraphError> {
        self.guard.consume(token)?;
        self.color = Some(color);
        Ok(())
    }

    /// The full snapshot, sufficient to rebuild this node
    pub fn dump(&self) -> NodeSnapshot {
        NodeSnapshot {
            key: Some(self.key),
            source: self.source.clone(),
            public_key: self.public_key,
            alias: self.alias.clone(),
            color: self.color.clone(),
            myself: self.myself,
            platform: self.platform.clone(),
        }
    }

    /// The public view, omitting the platform of foreign nodes
    pub fn public_view(&self) -> Value {
        let mut view = json!({
            "_key": self.key,
            "public_key": self.public_key,
            "alias": self.alias,
            "color": self.color,
        });
        if self.myself {
            view["myself"] = json!(true);
            view["platform"] = json!(self.platform);
        }
        view
    }
}

impl Guarded for Node {
    fn guard_mut(&mut self) -> &mut MutationGuard {
        &mut self.guard
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("key", &self.key)
            .field("public_key", &self.public_key)
            .field("alias", &self.alias)
            .field("myself", &self.myself)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphErrorKind;
    use crate::util::test_utils::{make_test_node_snapshot, make_test_pubkey};
    use test_log::test;

    #[test]
    fn roundtrip_test() {
        let node = Node::from_snapshot(make_test_node_snapshot(1, "alice")).unwrap();
        let dumped = node.dump();
        assert_eq!(dumped.key, Some(*node.key()));
        let rebuilt = Node::from_snapshot(dumped.clone()).unwrap();
        assert_eq!(rebuilt.dump(), dumped);

        let value = serde_json::to_value(&dumped).unwrap();
        assert_eq!(Node::from_value(value).unwrap().dump(), dumped);
    }

    #[test]
    fn key_is_stable_test() {
        let a = Node::from_snapshot(make_test_node_snapshot(1, "alice")).unwrap();
        let mut other_call = make_test_node_snapshot(1, "alice-renamed");
        other_call.source = vec!["get_node_info".to_string()];
        let b = Node::from_snapshot(other_call).unwrap();
        assert_eq!(a.key(), b.key());
        assert_eq!(a.to_ref(), NodeRef::new(make_test_pubkey(1), false));
    }

    #[test]
    fn foreign_key_rejected_test() {
        let mut snapshot = make_test_node_snapshot(1, "alice");
        snapshot.key = Some(node_key(&make_test_pubkey(2)));
        let err = Node::from_snapshot(snapshot).unwrap_err();
        assert!(matches!(err.kind, GraphErrorKind::IdentityMismatch(_)));
    }

    #[test]
    fn platform_ownership_test() {
        let node = Node::from_snapshot(make_test_node_snapshot(1, "alice")).unwrap();
        let err = node.platform().unwrap_err();
        assert!(matches!(err.kind, GraphErrorKind::Ownership(_)));
        assert!(node.public_view().get("platform").is_none());

        let mut snapshot = make_test_node_snapshot(2, "me");
        snapshot.myself = true;
        snapshot.platform = Some(Platform {
            blockchain: "bitcoin".to_string(),
            network: "mainnet".to_string(),
            lightning: Implementation {
                implementation: "lnd".to_string(),
                version: "0.17.0-beta".to_string(),
            },
        });
        let me = Node::from_snapshot(snapshot).unwrap();
        assert_eq!(me.platform().unwrap().unwrap().network, "mainnet");
        assert_eq!(me.public_view()["platform"]["lightning"]["implementation"], "lnd");
    }

    #[test]
    fn setters_need_token_test() {
        let mut node = Node::from_snapshot(make_test_node_snapshot(1, "alice")).unwrap();
        let token = MutationToken::generate();
        let err = node.set_alias("mallory".to_string(), &token).unwrap_err();
        assert!(matches!(err.kind, GraphErrorKind::Token(_)));
        assert_eq!(node.alias(), Some("alice"));

        node.prepare_token(token.clone());
        node.set_alias("alice2".to_string(), &token).unwrap();
        assert_eq!(node.alias(), Some("alice2"));
        assert!(node.set_color("#ff0000".to_string(), &token).is_err());
        assert_eq!(node.color(), Some("#3399ff"));
    }
}
