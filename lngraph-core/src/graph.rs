//! The graph registry.
//!
//! Owns every known entity, keyed by canonical key, and routes incoming gossip to the
//! matching entity.  Applies take `&mut self`, so the borrow checker serializes them.

use std::collections::BTreeMap;

use bitcoin::secp256k1::PublicKey;
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::diff::Change;
use crate::error::{invalid_snapshot_error, GraphError};
use crate::gossip::apply;
use crate::key::CanonicalKey;
use crate::model::channel::{channel_key, Channel, ChannelId, ChannelSnapshot};
use crate::model::node::{node_key, Node, NodeSnapshot};
use crate::model::payment::{Payment, PaymentAttempt, PaymentSnapshot};

/// Graph configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// The public key of the local node
    pub local_node: PublicKey,
    /// The network the graph tracks, e.g. `bitcoin`
    pub network: String,
}

impl GraphConfig {
    /// Configuration for the local node on mainnet
    pub fn new(local_node: PublicKey) -> Self {
        GraphConfig { local_node, network: "bitcoin".to_string() }
    }
}

/// What happened to the graph when gossip was applied
#[derive(Clone, Debug, PartialEq)]
pub enum GossipOutcome {
    /// The entity was new and has been added
    Inserted,
    /// A channel seen only by id was replaced by its resolved state
    Resolved,
    /// The entity was updated with these changes, possibly none
    Updated(Vec<Change>),
}

/// Every entity of a graph, as portable snapshots
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Node dumps
    pub nodes: Vec<NodeSnapshot>,
    /// Channel dumps
    pub channels: Vec<ChannelSnapshot>,
    /// Payment dumps
    pub payments: Vec<PaymentSnapshot>,
}

/// The canonical graph of nodes, channels and payments seen by the local node
pub struct Graph {
    config: GraphConfig,
    nodes: BTreeMap<CanonicalKey, Node>,
    channels: BTreeMap<CanonicalKey, Channel>,
    payments: BTreeMap<CanonicalKey, Payment>,
}

impl Graph {
    /// An empty graph
    pub fn new(config: GraphConfig) -> Self {
        info!("new graph for {} on {}", config.local_node, config.network);
        Graph {
            config,
            nodes: BTreeMap::new(),
            channels: BTreeMap::new(),
            payments: BTreeMap::new(),
        }
    }

    /// The configuration
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// The local node's public key
    pub fn local_node(&self) -> &PublicKey {
        &self.config.local_node
    }

    // ownership flags are derived from the configuration, not trusted from adapters
    fn mark_node(&self, snapshot: &mut NodeSnapshot) {
        snapshot.myself = snapshot.public_key == self.config.local_node;
    }

    fn mark_channel(&self, snapshot: &mut ChannelSnapshot) {
        for partner in snapshot.partners.iter_mut() {
            partner.node.myself = partner.node.public_key == self.config.local_node;
        }
        snapshot.mine = snapshot.known && snapshot.partners.iter().any(|p| p.node.myself);
    }

    fn mark_payment(&self, snapshot: &mut PaymentSnapshot) {
        for hop in snapshot.hops.iter_mut() {
            self.mark_channel(&mut hop.channel);
        }
    }

    /// Add a node
    pub fn insert_node(&mut self, mut snapshot: NodeSnapshot) -> Result<&Node, GraphError> {
        self.mark_node(&mut snapshot);
        let node = Node::from_snapshot(snapshot)?;
        let key = *node.key();
        if self.nodes.contains_key(&key) {
            graph_err!(invalid_argument_error, "node {} already present", node.public_key());
        }
        debug!("inserting node {}", node.public_key());
        Ok(self.nodes.entry(key).or_insert(node))
    }

    /// Add a channel
    pub fn insert_channel(
        &mut self,
        mut snapshot: ChannelSnapshot,
    ) -> Result<&Channel, GraphError> {
        self.mark_channel(&mut snapshot);
        let channel = Channel::from_snapshot(snapshot)?;
        let key = *channel.key();
        if self.channels.contains_key(&key) {
            graph_err!(invalid_argument_error, "channel {} already present", channel.id());
        }
        debug!(
            "inserting channel {} (known {}, mine {})",
            channel.id(),
            channel.known(),
            channel.mine()
        );
        Ok(self.channels.entry(key).or_insert(channel))
    }

    /// Add a payment made by the local node, classifying its route
    pub fn insert_payment(
        &mut self,
        mut snapshot: PaymentSnapshot,
    ) -> Result<&Payment, GraphError> {
        self.mark_payment(&mut snapshot);
        let payment = Payment::classified(snapshot, &self.config.local_node)?;
        self.register_payment(payment)
    }

    /// Add a payment whose route comes from its attempts
    pub fn insert_payment_attempts(
        &mut self,
        mut snapshot: PaymentSnapshot,
        attempts: &[PaymentAttempt],
    ) -> Result<&Payment, GraphError> {
        self.mark_payment(&mut snapshot);
        let mut attempts = attempts.to_vec();
        for attempt in attempts.iter_mut() {
            for hop in attempt.hops.iter_mut() {
                self.mark_channel(&mut hop.channel);
            }
        }
        let payment = Payment::from_attempts(snapshot, &attempts, &self.config.local_node)?;
        self.register_payment(payment)
    }

    fn register_payment(&mut self, payment: Payment) -> Result<&Payment, GraphError> {
        let key = *payment.key();
        if self.payments.contains_key(&key) {
            graph_err!(invalid_argument_error, "payment {} already present", key);
        }
        debug!("inserting payment {} ({:?})", key, payment.purpose());
        Ok(self.payments.entry(key).or_insert(payment))
    }

    /// The node with this key
    pub fn node(&self, key: &CanonicalKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    /// The channel with this key
    pub fn channel(&self, key: &CanonicalKey) -> Option<&Channel> {
        self.channels.get(key)
    }

    /// The payment with this key
    pub fn payment(&self, key: &CanonicalKey) -> Option<&Payment> {
        self.payments.get(key)
    }

    /// The node with this public key
    pub fn find_node(&self, public_key: &PublicKey) -> Option<&Node> {
        self.nodes.get(&node_key(public_key))
    }

    /// The channel with this id
    pub fn find_channel(&self, id: &ChannelId) -> Option<&Channel> {
        self.channels.get(&channel_key(id)?)
    }

    /// Every node, in key order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Every channel, in key order
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    /// Every payment, in key order
    pub fn payments(&self) -> impl Iterator<Item = &Payment> {
        self.payments.values()
    }

    /// Apply a node message.  Unknown nodes are inserted.
    #[instrument(skip(self, incoming))]
    pub fn apply_node_gossip(&mut self, incoming: &Value) -> Result<GossipOutcome, GraphError> {
        let public_key: PublicKey = match incoming.get("public_key") {
            Some(pk) => serde_json::from_value(pk.clone())?,
            None => return Err(invalid_snapshot_error("node gossip without a public key")),
        };
        match self.nodes.get_mut(&node_key(&public_key)) {
            Some(node) => Ok(GossipOutcome::Updated(apply(node, incoming)?)),
            None => {
                self.insert_node(serde_json::from_value(incoming.clone())?)?;
                Ok(GossipOutcome::Inserted)
            }
        }
    }

    /// Apply a channel message.
    ///
    /// Unknown channels are inserted.  A channel only seen by id is replaced when the
    /// message resolves it.
    #[instrument(skip(self, incoming))]
    pub fn apply_channel_gossip(&mut self, incoming: &Value) -> Result<GossipOutcome, GraphError> {
        let id: ChannelId = match incoming.get("id") {
            Some(id) => serde_json::from_value(id.clone())?,
            None => return Err(invalid_snapshot_error("channel gossip without an id")),
        };
        let key = channel_key(&id).ok_or_else(|| invalid_snapshot_error("empty channel id"))?;
        let resolves = incoming.get("known").and_then(Value::as_bool).unwrap_or(false);
        let local_known = match self.channels.get(&key) {
            None => {
                self.insert_channel(serde_json::from_value(incoming.clone())?)?;
                return Ok(GossipOutcome::Inserted);
            }
            Some(channel) => channel.known(),
        };
        if !local_known && resolves {
            let mut snapshot: ChannelSnapshot = serde_json::from_value(incoming.clone())?;
            self.mark_channel(&mut snapshot);
            let channel = Channel::from_snapshot(snapshot)?;
            info!("resolved channel {}", id);
            self.channels.insert(key, channel);
            return Ok(GossipOutcome::Resolved);
        }
        match self.channels.get_mut(&key) {
            Some(channel) => Ok(GossipOutcome::Updated(apply(channel, incoming)?)),
            None => Err(invalid_snapshot_error(format!("channel {} vanished", id))),
        }
    }

    /// Dump every entity
    pub fn dump(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.values().map(Node::dump).collect(),
            channels: self.channels.values().map(Channel::dump).collect(),
            payments: self.payments.values().map(Payment::dump).collect(),
        }
    }

    /// Rebuild a graph from a dump.  Payments keep their recorded purpose.
    pub fn restore(config: GraphConfig, snapshot: GraphSnapshot) -> Result<Graph, GraphError> {
        let mut graph = Graph::new(config);
        for node in snapshot.nodes {
            graph.insert_node(node)?;
        }
        for channel in snapshot.channels {
            graph.insert_channel(channel)?;
        }
        for payment in snapshot.payments {
            graph.register_payment(Payment::from_snapshot(payment)?)?;
        }
        debug!(
            "restored {} nodes, {} channels, {} payments",
            graph.nodes.len(),
            graph.channels.len(),
            graph.payments.len()
        );
        Ok(graph)
    }
}
