use core::fmt::{self, Debug, Display, Formatter};
use core::str::FromStr;

use bitcoin::hashes::{sha256, Hash, HashEngine};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as, Bytes, IfIsHumanReadable};

use crate::error::{invalid_snapshot_error, GraphError};

/// The kind of entity a [CanonicalKey] identifies.
///
/// The kind is committed into the key, so a node and a channel can never share a key
/// even if their identifying values happen to collide.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    /// A Lightning node, identified by its public key
    Node,
    /// A channel, identified by its channel id
    Channel,
    /// A payment, identified by creation time, hash, amount and fee
    Payment,
}

impl EntityKind {
    fn tag(&self) -> &'static [u8] {
        match self {
            EntityKind::Node => b"node",
            EntityKind::Channel => b"channel",
            EntityKind::Payment => b"payment",
        }
    }
}

/// A deterministic content key.
///
/// The same real-world entity observed through different remote calls derives the same
/// key, as long as the adapters feed the same identifying values in the same order.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CanonicalKey(#[serde_as(as = "IfIsHumanReadable<Hex, Bytes>")] [u8; 32]);

impl CanonicalKey {
    /// Derive a key from an ordered list of identifying values.
    ///
    /// Returns `None` when every identifying value is empty, since there is nothing to
    /// identify the entity by.
    pub fn derive(kind: EntityKind, parts: &[&[u8]]) -> Option<CanonicalKey> {
        if parts.iter().all(|p| p.is_empty()) {
            return None;
        }
        let mut engine = sha256::Hash::engine();
        engine.input(kind.tag());
        for part in parts {
            // length prefix, so that ["ab", "c"] and ["a", "bc"] differ
            engine.input(&(part.len() as u32).to_be_bytes());
            engine.input(part);
        }
        Some(CanonicalKey(sha256::Hash::from_engine(engine).to_byte_array()))
    }

    /// The raw key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Debug for CanonicalKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Display for CanonicalKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for CanonicalKey {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| invalid_snapshot_error(format!("canonical key {}: {}", s, e)))?;
        Ok(CanonicalKey(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic_test() {
        let a = CanonicalKey::derive(EntityKind::Channel, &[b"abcd", &7u32.to_be_bytes()]);
        let b = CanonicalKey::derive(EntityKind::Channel, &[b"abcd", &7u32.to_be_bytes()]);
        assert!(a.is_some());
        assert_eq!(a, b);
    }

    #[test]
    fn derive_separates_parts_and_kinds_test() {
        let ab_c = CanonicalKey::derive(EntityKind::Payment, &[b"ab", b"c"]);
        let a_bc = CanonicalKey::derive(EntityKind::Payment, &[b"a", b"bc"]);
        assert_ne!(ab_c, a_bc);

        let node = CanonicalKey::derive(EntityKind::Node, &[b"same"]);
        let channel = CanonicalKey::derive(EntityKind::Channel, &[b"same"]);
        assert_ne!(node, channel);
    }

    #[test]
    fn derive_without_values_test() {
        assert_eq!(CanonicalKey::derive(EntityKind::Node, &[]), None);
        assert_eq!(CanonicalKey::derive(EntityKind::Node, &[b"", b""]), None);
    }

    #[test]
    fn hex_roundtrip_test() {
        let key = CanonicalKey::derive(EntityKind::Node, &[b"02aa"]).unwrap();
        let s = key.to_string();
        assert_eq!(s.len(), 64);
        assert_eq!(s.parse::<CanonicalKey>().unwrap(), key);
        assert!("zz".parse::<CanonicalKey>().is_err());

        let json = serde_json::to_value(&key).unwrap();
        assert_eq!(json, serde_json::Value::String(s));
        assert_eq!(serde_json::from_value::<CanonicalKey>(json).unwrap(), key);
    }
}
