use core::fmt::{self, Debug, Display, Formatter};

use bitcoin::secp256k1::PublicKey;
use bitcoin::Txid;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{
    identity_mismatch_error, invalid_argument_error, invalid_snapshot_error, ownership_error,
    unknown_entity_error, GraphError,
};
use crate::guard::{Guarded, MutationGuard, MutationToken};
use crate::key::{CanonicalKey, EntityKind};
use crate::model::node::NodeRef;
use crate::model::policy::Policy;
use crate::model::{Amount, FeeRate, Provenance};

/// Channel identifier, as reported by the Lightning implementation
/// (e.g. a short channel id such as `821000x1234x1`).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Create an ID
    pub fn new(id: impl Into<String>) -> Self {
        ChannelId(id.into())
    }

    /// The ID as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Debug for ChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The canonical key of the channel with this id
pub fn channel_key(id: &ChannelId) -> Option<CanonicalKey> {
    CanonicalKey::derive(EntityKind::Channel, &[id.as_str().as_bytes()])
}

/// The funding transaction output of a channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingPoint {
    /// The funding transaction
    pub transaction: Txid,
    /// The output index in the funding transaction
    pub output: u32,
}

/// Whether the channel is announced to the network
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exposure {
    /// Announced
    Public,
    /// Unannounced
    Private,
}

/// A partner's view of the channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartnerState {
    /// The partner forwards through the channel
    Active,
    /// The partner has disabled the channel
    Inactive,
}

/// Channel level accounting.  Only the capacity is public.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAccounting {
    /// Total channel capacity
    #[serde(default)]
    pub capacity: Option<Amount>,
    /// Total sent by the local node
    #[serde(default)]
    pub sent: Option<Amount>,
    /// Total received by the local node
    #[serde(default)]
    pub received: Option<Amount>,
    /// Amount locked in pending HTLCs
    #[serde(default)]
    pub unsettled: Option<Amount>,
}

/// Per-partner accounting, only known for channels of the local node
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerAccounting {
    /// The partner's balance
    #[serde(default)]
    pub balance: Option<Amount>,
}

/// The full, portable state of a [ChannelNode]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelNodeSnapshot {
    /// Whether the partner has the channel enabled
    #[serde(default)]
    pub state: Option<PartnerState>,
    /// The partner node
    pub node: NodeRef,
    /// The partner's forwarding policy
    #[serde(default)]
    pub policy: Option<Policy>,
    /// The partner's balance
    #[serde(default)]
    pub accounting: Option<PartnerAccounting>,
}

/// The full, portable state of a [Channel]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    /// The canonical key, if already derived
    #[serde(rename = "_key", default)]
    pub key: Option<CanonicalKey>,
    /// Where the data came from
    #[serde(rename = "_source", default)]
    pub source: Provenance,
    /// The channel identity
    pub id: ChannelId,
    /// Whether a remote call ever resolved this channel
    #[serde(default)]
    pub known: bool,
    /// Whether the local node is a partner
    #[serde(default)]
    pub mine: bool,
    /// Announced or not
    #[serde(default)]
    pub exposure: Option<Exposure>,
    /// The funding output
    #[serde(default)]
    pub funding: Option<FundingPoint>,
    /// When the channel was opened, in unix seconds
    #[serde(default)]
    pub opened_at: Option<u64>,
    /// For how long the channel has been up, in seconds
    #[serde(default)]
    pub up_at: Option<u64>,
    /// Whether the channel is currently usable from the local node
    #[serde(default)]
    pub active: Option<bool>,
    /// Channel accounting
    #[serde(default)]
    pub accounting: Option<ChannelAccounting>,
    /// The two partners, or whatever is known of them for unresolved channels
    #[serde(default)]
    pub partners: Vec<ChannelNodeSnapshot>,
}

/// One side of a channel
#[derive(Clone, Debug)]
pub struct ChannelNode {
    state: Option<PartnerState>,
    node: NodeRef,
    policy: Option<Policy>,
    accounting: Option<PartnerAccounting>,
    // copied from the channel, gates the owner-only accessors
    mine: bool,
}

impl ChannelNode {
    fn from_snapshot(snapshot: ChannelNodeSnapshot, mine: bool) -> Result<Self, GraphError> {
        snapshot.node.validate()?;
        if snapshot.accounting.is_some() && !mine {
            return Err(ownership_error(format!(
                "balance given for partner {} of a foreign channel",
                snapshot.node.public_key
            )));
        }
        Ok(ChannelNode {
            state: snapshot.state,
            node: snapshot.node,
            policy: snapshot.policy,
            accounting: snapshot.accounting,
            mine,
        })
    }

    /// Whether the partner has the channel enabled
    pub fn state(&self) -> Option<PartnerState> {
        self.state
    }

    /// The partner node
    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    /// The partner's forwarding policy
    pub fn policy(&self) -> Option<&Policy> {
        self.policy.as_ref()
    }

    /// The partner's balance.  Only available on channels of the local node.
    pub fn balance(&self) -> Result<Option<Amount>, GraphError> {
        if !self.mine {
            return Err(ownership_error(format!(
                "balance of partner {} on a foreign channel",
                self.node.public_key
            )));
        }
        Ok(self.accounting.and_then(|a| a.balance))
    }

    fn dump(&self) -> ChannelNodeSnapshot {
        ChannelNodeSnapshot {
            state: self.state,
            node: self.node.clone(),
            policy: self.policy,
            accounting: self.accounting,
        }
    }

    fn policy_mut(&mut self) -> &mut Policy {
        self.policy.get_or_insert_with(Policy::default)
    }
}

/// A channel between two nodes
#[derive(Clone)]
pub struct Channel {
    key: CanonicalKey,
    id: ChannelId,
    known: bool,
    mine: bool,
    exposure: Option<Exposure>,
    funding: Option<FundingPoint>,
    opened_at: Option<u64>,
    up_at: Option<u64>,
    active: Option<bool>,
    accounting: Option<ChannelAccounting>,
    partners: Vec<ChannelNode>,
    source: Provenance,
    guard: MutationGuard,
}

impl Channel {
    /// Build a channel from its snapshot.
    ///
    /// A resolved channel must have exactly two partners and a capacity.  A channel of
    /// the local node must have the local node among its partners.
    pub fn from_snapshot(snapshot: ChannelSnapshot) -> Result<Channel, GraphError> {
        let key = channel_key(&snapshot.id)
            .ok_or_else(|| invalid_snapshot_error("channel without an id"))?;
        if let Some(claimed) = snapshot.key {
            if claimed != key {
                return Err(identity_mismatch_error(format!(
                    "channel key {} does not belong to {}",
                    claimed, snapshot.id
                )));
            }
        }
        let accounting = snapshot.accounting.unwrap_or_default();
        if snapshot.known {
            if snapshot.partners.len() != 2 {
                return Err(invalid_snapshot_error(format!(
                    "channel {} has {} partners",
                    snapshot.id,
                    snapshot.partners.len()
                )));
            }
            if accounting.capacity.is_none() {
                return Err(invalid_snapshot_error(format!(
                    "channel {} has no capacity",
                    snapshot.id
                )));
            }
        } else {
            if snapshot.mine {
                return Err(invalid_snapshot_error(format!(
                    "unresolved channel {} cannot be mine",
                    snapshot.id
                )));
            }
            if snapshot.partners.len() > 2 {
                return Err(invalid_snapshot_error(format!(
                    "channel {} has {} partners",
                    snapshot.id,
                    snapshot.partners.len()
                )));
            }
        }
        if snapshot.mine && !snapshot.partners.iter().any(|p| p.node.myself) {
            return Err(invalid_snapshot_error(format!(
                "channel {} is mine but the local node is not a partner",
                snapshot.id
            )));
        }
        let has_private = snapshot.opened_at.is_some()
            || snapshot.up_at.is_some()
            || snapshot.active.is_some()
            || accounting.sent.is_some()
            || accounting.received.is_some()
            || accounting.unsettled.is_some();
        if has_private && !snapshot.mine {
            return Err(ownership_error(format!(
                "owner-only fields given for foreign channel {}",
                snapshot.id
            )));
        }
        let mine = snapshot.mine;
        let partners = snapshot
            .partners
            .into_iter()
            .map(|p| ChannelNode::from_snapshot(p, mine))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Channel {
            key,
            id: snapshot.id,
            known: snapshot.known,
            mine,
            exposure: snapshot.exposure,
            funding: snapshot.funding,
            opened_at: snapshot.opened_at,
            up_at: snapshot.up_at,
            active: snapshot.active,
            accounting: snapshot.accounting,
            partners,
            source: snapshot.source,
            guard: MutationGuard::default(),
        })
    }

    /// Build a channel from a snapshot tree
    pub fn from_value(value: Value) -> Result<Channel, GraphError> {
        Channel::from_snapshot(serde_json::from_value(value)?)
    }

    /// A channel seen only by id, e.g. in a payment route
    pub fn unresolved(id: ChannelId, partners: Vec<NodeRef>) -> Result<Channel, GraphError> {
        Channel::from_snapshot(ChannelSnapshot {
            key: None,
            source: vec![],
            id,
            known: false,
            mine: false,
            exposure: None,
            funding: None,
            opened_at: None,
            up_at: None,
            active: None,
            accounting: None,
            partners: partners
                .into_iter()
                .map(|node| ChannelNodeSnapshot {
                    state: None,
                    node,
                    policy: None,
                    accounting: None,
                })
                .collect(),
        })
    }

    pub(crate) fn ensure_known(&self, what: &str) -> Result<(), GraphError> {
        if !self.known {
            return Err(unknown_entity_error(format!("{} of unresolved channel {}", what, self.id)));
        }
        Ok(())
    }

    fn ensure_mine(&self, what: &str) -> Result<(), GraphError> {
        self.ensure_known(what)?;
        if !self.mine {
            return Err(ownership_error(format!("{} of foreign channel {}", what, self.id)));
        }
        Ok(())
    }

    /// The canonical key
    pub fn key(&self) -> &CanonicalKey {
        &self.key
    }

    /// The channel identity
    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    /// Whether a remote call ever resolved this channel
    pub fn known(&self) -> bool {
        self.known
    }

    /// Whether the local node is a partner
    pub fn mine(&self) -> bool {
        self.mine
    }

    /// The partners.  Always two for resolved channels.
    pub fn partners(&self) -> &[ChannelNode] {
        &self.partners
    }

    /// The partner with the given public key
    pub fn partner(&self, public_key: &PublicKey) -> Option<&ChannelNode> {
        self.partners.iter().find(|p| &p.node.public_key == public_key)
    }

    /// The partner that doesn't have the given public key, if the channel has one
    pub fn other_partner(&self, public_key: &PublicKey) -> Option<&ChannelNode> {
        if self.partner(public_key).is_none() {
            return None;
        }
        self.partners.iter().find(|p| &p.node.public_key != public_key)
    }

    /// Whether the node with the given public key is a partner
    pub fn has_partner(&self, public_key: &PublicKey) -> bool {
        self.partner(public_key).is_some()
    }

    /// Announced or not
    pub fn exposure(&self) -> Result<Option<Exposure>, GraphError> {
        self.ensure_known("exposure")?;
        Ok(self.exposure)
    }

    /// The funding output
    pub fn funding(&self) -> Result<Option<&FundingPoint>, GraphError> {
        self.ensure_known("funding")?;
        Ok(self.funding.as_ref())
    }

    /// Total channel capacity
    pub fn capacity(&self) -> Result<Amount, GraphError> {
        self.ensure_known("capacity")?;
        self.accounting
            .and_then(|a| a.capacity)
            .ok_or_else(|| invalid_snapshot_error(format!("channel {} has no capacity", self.id)))
    }

    /// When the channel was opened
    pub fn opened_at(&self) -> Result<Option<u64>, GraphError> {
        self.ensure_mine("opened_at")?;
        Ok(self.opened_at)
    }

    /// For how long the channel has been up
    pub fn up_at(&self) -> Result<Option<u64>, GraphError> {
        self.ensure_mine("up_at")?;
        Ok(self.up_at)
    }

    /// Whether the channel is currently usable
    pub fn active(&self) -> Result<Option<bool>, GraphError> {
        self.ensure_mine("active")?;
        Ok(self.active)
    }

    /// Total sent through the channel by the local node
    pub fn sent(&self) -> Result<Option<Amount>, GraphError> {
        self.ensure_mine("sent")?;
        Ok(self.accounting.and_then(|a| a.sent))
    }

    /// Total received through the channel by the local node
    pub fn received(&self) -> Result<Option<Amount>, GraphError> {
        self.ensure_mine("received")?;
        Ok(self.accounting.and_then(|a| a.received))
    }

    /// Amount locked in pending HTLCs
    pub fn unsettled(&self) -> Result<Option<Amount>, GraphError> {
        self.ensure_mine("unsettled")?;
        Ok(self.accounting.and_then(|a| a.unsettled))
    }

    fn partner_mut(&mut self, index: usize) -> Result<&mut ChannelNode, GraphError> {
        let id = &self.id;
        let count = self.partners.len();
        self.partners.get_mut(index).ok_or_else(|| {
            invalid_argument_error(format!("channel {} has no partner {} of {}", id, index, count))
        })
    }

    // Validate everything a setter needs before the token is spent, so a failed call
    // has no side effects.
    pub(crate) fn check_partner(&self, index: usize) -> Result<(), GraphError> {
        self.ensure_known("partner")?;
        if index >= self.partners.len() {
            return Err(invalid_argument_error(format!(
                "channel {} has no partner {} of {}",
                self.id,
                index,
                self.partners.len()
            )));
        }
        Ok(())
    }

    /// Set the capacity.  Requires a prepared token.
    pub fn set_capacity(
        &mut self,
        capacity: Amount,
        token: &MutationToken,
    ) -> Result<(), GraphError> {
        self.ensure_known("capacity")?;
        self.guard.consume(token)?;
        self.accounting.get_or_insert_with(ChannelAccounting::default).capacity = Some(capacity);
        Ok(())
    }

    /// Set a partner's state.  Requires a prepared token.
    pub fn set_partner_state(
        &mut self,
        index: usize,
        state: PartnerState,
        token: &MutationToken,
    ) -> Result<(), GraphError> {
        self.check_partner(index)?;
        self.guard.consume(token)?;
        self.partner_mut(index)?.state = Some(state);
        Ok(())
    }

    /// Set a partner's base fee.  Requires a prepared token.
    pub fn set_fee_base(
        &mut self,
        index: usize,
        base: Amount,
        token: &MutationToken,
    ) -> Result<(), GraphError> {
        self.check_partner(index)?;
        self.guard.consume(token)?;
        self.partner_mut(index)?.policy_mut().fee.base = Some(base);
        Ok(())
    }

    /// Set a partner's fee rate.  Requires a prepared token.
    pub fn set_fee_rate(
        &mut self,
        index: usize,
        rate: FeeRate,
        token: &MutationToken,
    ) -> Result<(), GraphError> {
        self.check_partner(index)?;
        self.guard.consume(token)?;
        self.partner_mut(index)?.policy_mut().fee.rate = Some(rate);
        Ok(())
    }

    /// Set a partner's HTLC minimum.  Requires a prepared token.
    pub fn set_htlc_minimum(
        &mut self,
        index: usize,
        minimum: Amount,
        token: &MutationToken,
    ) -> Result<(), GraphError> {
        self.check_partner(index)?;
        self.guard.consume(token)?;
        self.partner_mut(index)?.policy_mut().htlc.minimum = Some(minimum);
        Ok(())
    }

    /// Set a partner's HTLC maximum.  Requires a prepared token.
    pub fn set_htlc_maximum(
        &mut self,
        index: usize,
        maximum: Amount,
        token: &MutationToken,
    ) -> Result<(), GraphError> {
        self.check_partner(index)?;
        self.guard.consume(token)?;
        self.partner_mut(index)?.policy_mut().htlc.maximum = Some(maximum);
        Ok(())
    }

    /// Set a partner's minimum CLTV delta.  Requires a prepared token.
    pub fn set_htlc_delta_minimum(
        &mut self,
        index: usize,
        blocks: u32,
        token: &MutationToken,
    ) -> Result<(), GraphError> {
        self.check_partner(index)?;
        self.guard.consume(token)?;
        self.partner_mut(index)?.policy_mut().htlc.blocks.delta.minimum = Some(blocks);
        Ok(())
    }

    /// The full snapshot, sufficient to rebuild this channel
    pub fn dump(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            key: Some(self.key),
            source: self.source.clone(),
            id: self.id.clone(),
            known: self.known,
            mine: self.mine,
            exposure: self.exposure,
            funding: self.funding,
            opened_at: self.opened_at,
            up_at: self.up_at,
            active: self.active,
            accounting: self.accounting,
            partners: self.partners.iter().map(|p| p.dump()).collect(),
        }
    }

    /// The public view.
    ///
    /// Unresolved channels show only the id and the bare partner list.  Foreign channels
    /// show the public policy and capacity.  Channels of the local node show everything
    /// but provenance.
    pub fn public_view(&self) -> Value {
        if !self.known {
            let partners: Vec<Value> =
                self.partners.iter().map(|p| json!({ "node": p.node.public_view() })).collect();
            return json!({ "_key": self.key, "id": self.id, "partners": partners });
        }
        if !self.mine {
            let partners: Vec<Value> = self
                .partners
                .iter()
                .map(|p| {
                    json!({
                        "state": p.state,
                        "node": p.node.public_view(),
                        "policy": p.policy,
                    })
                })
                .collect();
            return json!({
                "_key": self.key,
                "id": self.id,
                "exposure": self.exposure,
                "accounting": { "capacity": self.accounting.and_then(|a| a.capacity) },
                "partners": partners,
            });
        }
        let partners: Vec<Value> = self
            .partners
            .iter()
            .map(|p| {
                json!({
                    "state": p.state,
                    "node": p.node.public_view(),
                    "policy": p.policy,
                    "accounting": { "balance": p.accounting.and_then(|a| a.balance) },
                })
            })
            .collect();
        json!({
            "_key": self.key,
            "id": self.id,
            "exposure": self.exposure,
            "funding": self.funding,
            "opened_at": self.opened_at,
            "up_at": self.up_at,
            "active": self.active,
            "accounting": self.accounting,
            "partners": partners,
        })
    }
}

impl Guarded for Channel {
    fn guard_mut(&mut self) -> &mut MutationGuard {
        &mut self.guard
    }
}

impl Debug for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("known", &self.known)
            .field("mine", &self.mine)
            .field(
                "partners",
                &self.partners.iter().map(|p| &p.node.public_key).collect::<Vec<_>>(),
            )
            .finish()
    }
}
