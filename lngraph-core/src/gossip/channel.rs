use bitcoin::secp256k1::PublicKey;
use log::*;
use serde_json::{json, Value};

use super::{apply, decode_leaf, GossipTarget, PathClass};
use crate::diff::{Change, Path};
use crate::error::{invalid_argument_error, GraphError};
use crate::guard::MutationToken;
use crate::model::channel::{Channel, PartnerState};
use crate::model::policy::Policy;
use crate::model::{Amount, FeeRate};

/// The channel fields gossip may change.  Partner fields carry the partner index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelField {
    /// `accounting/capacity`
    Capacity,
    /// `partners/i/state`
    PartnerState(usize),
    /// `partners/i/policy/fee/base`
    FeeBase(usize),
    /// `partners/i/policy/fee/rate`
    FeeRate(usize),
    /// `partners/i/policy/htlc/minimum`
    HtlcMinimum(usize),
    /// `partners/i/policy/htlc/maximum`
    HtlcMaximum(usize),
    /// `partners/i/policy/htlc/blocks/delta/minimum`
    HtlcDeltaMinimum(usize),
}

/// A decoded channel change
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelMutation {
    /// New capacity
    Capacity(Amount),
    /// New partner state
    PartnerState(usize, PartnerState),
    /// New base fee
    FeeBase(usize, Amount),
    /// New fee rate
    FeeRate(usize, FeeRate),
    /// New HTLC minimum
    HtlcMinimum(usize, Amount),
    /// New HTLC maximum
    HtlcMaximum(usize, Amount),
    /// New minimum CLTV delta
    HtlcDeltaMinimum(usize, u32),
}

fn partner_field(index: &str, field: fn(usize) -> ChannelField) -> PathClass<ChannelField> {
    match index.parse::<usize>() {
        Ok(i) => PathClass::Whitelisted(field(i)),
        Err(_) => PathClass::Unknown,
    }
}

fn incoming_partner_key(partner: &Value) -> Option<PublicKey> {
    serde_json::from_value(partner.get("node")?.get("public_key")?.clone()).ok()
}

impl GossipTarget for Channel {
    type Field = ChannelField;
    type Mutation = ChannelMutation;

    fn describe(&self) -> String {
        format!("channel {}", self.id())
    }

    fn classify(path: &Path) -> PathClass<ChannelField> {
        let labels = path.labels();
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        match labels.as_slice() {
            ["_key"] | ["id"] | ["funding", ..] => PathClass::Forbidden,
            ["partners", _, "node", "_key"] | ["partners", _, "node", "public_key"] => {
                PathClass::Forbidden
            }
            ["_source", ..] | ["known"] | ["mine"] => PathClass::Ignorable,
            ["partners", _, "node", "myself"] => PathClass::Ignorable,
            ["accounting", "capacity", "millisatoshis"] => {
                PathClass::Whitelisted(ChannelField::Capacity)
            }
            ["partners", i, "state"] => partner_field(i, ChannelField::PartnerState),
            ["partners", i, "policy", "fee", "base", "millisatoshis"] => {
                partner_field(i, ChannelField::FeeBase)
            }
            ["partners", i, "policy", "fee", "rate", "parts_per_million"] => {
                partner_field(i, ChannelField::FeeRate)
            }
            ["partners", i, "policy", "htlc", "minimum", "millisatoshis"] => {
                partner_field(i, ChannelField::HtlcMinimum)
            }
            ["partners", i, "policy", "htlc", "maximum", "millisatoshis"] => {
                partner_field(i, ChannelField::HtlcMaximum)
            }
            ["partners", i, "policy", "htlc", "blocks", "delta", "minimum"] => {
                partner_field(i, ChannelField::HtlcDeltaMinimum)
            }
            _ => PathClass::Unknown,
        }
    }

    fn snapshot(&self) -> Result<Value, GraphError> {
        Ok(serde_json::to_value(self.dump())?)
    }

    /// Put the incoming partners in the local order.
    ///
    /// Two partners listed in the reverse of the local order are swapped.  A single
    /// partner that identifies the local second partner is moved to index 1, behind an
    /// empty overlay.  Partners without a public key don't take part in the comparison,
    /// but at least one must be identified.
    fn align(&self, incoming: &mut Value) {
        let local: Vec<&PublicKey> = self.partners().iter().map(|p| &p.node().public_key).collect();
        if local.len() != 2 || local[0] == local[1] {
            return;
        }
        let partners = match incoming.get_mut("partners").and_then(Value::as_array_mut) {
            Some(partners) if (1..=2).contains(&partners.len()) => partners,
            _ => return,
        };
        let keys: Vec<Option<PublicKey>> = partners.iter().map(incoming_partner_key).collect();
        let identified = keys.iter().filter(|k| k.is_some()).count();
        let reversed = keys
            .iter()
            .enumerate()
            .all(|(j, key)| key.as_ref().map_or(true, |k| k == local[1 - j]));
        if identified == 0 || !reversed {
            return;
        }
        if partners.len() == 1 {
            debug!("{}: incoming partner is the second one, moving it", self.describe());
            partners.insert(0, json!({}));
        } else {
            debug!("{}: incoming partners are reversed, swapping", self.describe());
            partners.swap(0, 1);
        }
    }

    fn decode(&self, field: ChannelField, value: &Value) -> Result<ChannelMutation, GraphError> {
        let mutation = match field {
            ChannelField::Capacity => {
                self.ensure_known("capacity")?;
                return Ok(ChannelMutation::Capacity(Amount::from_msat(decode_leaf(value)?)));
            }
            ChannelField::PartnerState(i) => ChannelMutation::PartnerState(i, decode_leaf(value)?),
            ChannelField::FeeBase(i) => {
                ChannelMutation::FeeBase(i, Amount::from_msat(decode_leaf(value)?))
            }
            ChannelField::FeeRate(i) => {
                ChannelMutation::FeeRate(i, FeeRate::from_ppm(decode_leaf(value)?))
            }
            ChannelField::HtlcMinimum(i) => {
                ChannelMutation::HtlcMinimum(i, Amount::from_msat(decode_leaf(value)?))
            }
            ChannelField::HtlcMaximum(i) => {
                ChannelMutation::HtlcMaximum(i, Amount::from_msat(decode_leaf(value)?))
            }
            ChannelField::HtlcDeltaMinimum(i) => {
                ChannelMutation::HtlcDeltaMinimum(i, decode_leaf(value)?)
            }
        };
        match field {
            ChannelField::PartnerState(i)
            | ChannelField::FeeBase(i)
            | ChannelField::FeeRate(i)
            | ChannelField::HtlcMinimum(i)
            | ChannelField::HtlcMaximum(i)
            | ChannelField::HtlcDeltaMinimum(i) => self.check_partner(i)?,
            ChannelField::Capacity => {}
        }
        Ok(mutation)
    }

    fn commit(
        &mut self,
        mutation: ChannelMutation,
        token: &MutationToken,
    ) -> Result<(), GraphError> {
        match mutation {
            ChannelMutation::Capacity(capacity) => self.set_capacity(capacity, token),
            ChannelMutation::PartnerState(i, state) => self.set_partner_state(i, state, token),
            ChannelMutation::FeeBase(i, base) => self.set_fee_base(i, base, token),
            ChannelMutation::FeeRate(i, rate) => self.set_fee_rate(i, rate, token),
            ChannelMutation::HtlcMinimum(i, minimum) => self.set_htlc_minimum(i, minimum, token),
            ChannelMutation::HtlcMaximum(i, maximum) => self.set_htlc_maximum(i, maximum, token),
            ChannelMutation::HtlcDeltaMinimum(i, blocks) => {
                self.set_htlc_delta_minimum(i, blocks, token)
            }
        }
    }
}

/// Record a policy change the network confirmed for one partner of a channel.
///
/// Absent parts of `policy` are left alone.  The update goes through the same
/// classification and guard as gossip.
pub fn apply_confirmed_policy(
    channel: &mut Channel,
    partner: &PublicKey,
    policy: &Policy,
) -> Result<Vec<Change>, GraphError> {
    let index = channel
        .partners()
        .iter()
        .position(|p| &p.node().public_key == partner)
        .ok_or_else(|| {
            invalid_argument_error(format!("{} is not a partner of {}", partner, channel.id()))
        })?;
    let mut partners = vec![json!({}); channel.partners().len()];
    partners[index] = json!({ "node": { "public_key": partner }, "policy": policy });
    let overlay = json!({ "id": channel.id(), "partners": partners });
    apply(channel, &overlay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphErrorKind;
    use crate::model::channel::ChannelSnapshot;
    use crate::model::policy::Fee;
    use crate::util::test_utils::*;
    use test_log::test;

    fn channel() -> Channel {
        Channel::from_snapshot(make_test_channel_snapshot("100x1x0", 1, 2)).unwrap()
    }

    fn to_value(snapshot: &ChannelSnapshot) -> Value {
        serde_json::to_value(snapshot).unwrap()
    }

    #[test]
    fn classify_test() {
        let cases = [
            ("_key", PathClass::Forbidden),
            ("id", PathClass::Forbidden),
            ("funding/transaction", PathClass::Forbidden),
            ("funding/output", PathClass::Forbidden),
            ("partners/1/node/public_key", PathClass::Forbidden),
            ("partners/0/node/_key", PathClass::Forbidden),
            ("_source/0", PathClass::Ignorable),
            ("known", PathClass::Ignorable),
            ("mine", PathClass::Ignorable),
            ("partners/0/node/myself", PathClass::Ignorable),
            ("accounting/capacity/millisatoshis", PathClass::Whitelisted(ChannelField::Capacity)),
            ("partners/1/state", PathClass::Whitelisted(ChannelField::PartnerState(1))),
            (
                "partners/0/policy/fee/base/millisatoshis",
                PathClass::Whitelisted(ChannelField::FeeBase(0)),
            ),
            (
                "partners/1/policy/fee/rate/parts_per_million",
                PathClass::Whitelisted(ChannelField::FeeRate(1)),
            ),
            (
                "partners/0/policy/htlc/minimum/millisatoshis",
                PathClass::Whitelisted(ChannelField::HtlcMinimum(0)),
            ),
            (
                "partners/0/policy/htlc/maximum/millisatoshis",
                PathClass::Whitelisted(ChannelField::HtlcMaximum(0)),
            ),
            (
                "partners/1/policy/htlc/blocks/delta/minimum",
                PathClass::Whitelisted(ChannelField::HtlcDeltaMinimum(1)),
            ),
            ("exposure", PathClass::Unknown),
            ("opened_at", PathClass::Unknown),
            ("accounting/sent/millisatoshis", PathClass::Unknown),
            ("partners/0/accounting/balance/millisatoshis", PathClass::Unknown),
            ("partners/x/state", PathClass::Unknown),
        ];
        for (path, expected) in cases {
            assert_eq!(Channel::classify(&Path::parse(path)), expected, "{}", path);
        }
    }

    #[test]
    fn capacity_update_test() {
        let mut channel = channel();
        let mut incoming = make_test_channel_snapshot("100x1x0", 1, 2);
        incoming.accounting.as_mut().unwrap().capacity = Some(Amount::from_sat(2_000));
        let changes = apply(&mut channel, &to_value(&incoming)).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, Path::parse("accounting/capacity/millisatoshis"));
        assert_eq!(changes[0].from, Some(json!(1_000_000)));
        assert_eq!(changes[0].to, json!(2_000_000));
        assert_eq!(channel.capacity().unwrap(), Amount::from_sat(2_000));
    }

    #[test]
    fn identity_mismatch_applies_nothing_test() {
        let mut channel = channel();
        let mut incoming = make_test_channel_snapshot("100x1x0", 1, 2);
        incoming.funding.as_mut().unwrap().output = 1;
        incoming.partners[0].policy.as_mut().unwrap().fee.base = Some(Amount::from_msat(9));
        let err = apply(&mut channel, &to_value(&incoming)).unwrap_err();
        assert!(matches!(err.kind, GraphErrorKind::IdentityMismatch(_)));
        assert_eq!(
            channel.partners()[0].policy().unwrap().fee.base,
            Some(Amount::from_msat(1_000))
        );
    }

    #[test]
    fn foreign_partner_is_identity_mismatch_test() {
        let mut channel = channel();
        let incoming = make_test_channel_snapshot("100x1x0", 1, 3);
        let err = apply(&mut channel, &to_value(&incoming)).unwrap_err();
        assert!(matches!(err.kind, GraphErrorKind::IdentityMismatch(_)));
    }

    #[test]
    fn partner_reordering_test() {
        let mut channel = channel();
        let mut incoming = make_test_channel_snapshot("100x1x0", 1, 2);
        incoming.partners.reverse();
        // incoming index 0 is node 2
        incoming.partners[0].policy.as_mut().unwrap().fee.base = Some(Amount::from_msat(5_000));
        let changes = apply(&mut channel, &to_value(&incoming)).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, Path::parse("partners/1/policy/fee/base/millisatoshis"));
        let node2 = channel.partner(&make_test_pubkey(2)).unwrap();
        assert_eq!(node2.policy().unwrap().fee.base, Some(Amount::from_msat(5_000)));
        let node1 = channel.partner(&make_test_pubkey(1)).unwrap();
        assert_eq!(node1.policy().unwrap().fee.base, Some(Amount::from_msat(1_000)));
        // local order is kept
        assert_eq!(channel.partners()[0].node().public_key, make_test_pubkey(1));
    }

    #[test]
    fn idempotent_test() {
        let mut channel = channel();
        let mut incoming = make_test_channel_snapshot("100x1x0", 1, 2);
        incoming.partners[1].state = Some(PartnerState::Inactive);
        incoming.partners[1].policy.as_mut().unwrap().htlc.blocks.delta.minimum = Some(144);
        let value = to_value(&incoming);
        assert_eq!(apply(&mut channel, &value).unwrap().len(), 2);
        let before = channel.dump();
        assert!(apply(&mut channel, &value).unwrap().is_empty());
        assert_eq!(channel.dump(), before);
        assert_eq!(channel.partners()[1].state(), Some(PartnerState::Inactive));
    }

    #[test]
    fn unknown_path_applies_nothing_test() {
        let mut channel = channel();
        let mut incoming = make_test_channel_snapshot("100x1x0", 1, 2);
        incoming.exposure = Some(crate::model::channel::Exposure::Private);
        incoming.accounting.as_mut().unwrap().capacity = Some(Amount::from_sat(2_000));
        let err = apply(&mut channel, &to_value(&incoming)).unwrap_err();
        assert!(matches!(err.kind, GraphErrorKind::UnknownMutationPath(_)));
        assert_eq!(channel.capacity().unwrap(), Amount::from_sat(1_000));
    }

    #[test]
    fn sparse_overlay_test() {
        let mut channel = channel();
        let incoming = json!({
            "id": "100x1x0",
            "partners": [{}, { "policy": { "htlc": { "maximum": { "millisatoshis": 500_000 } } } }],
        });
        let changes = apply(&mut channel, &incoming).unwrap();
        assert_eq!(changes.len(), 1);
        let policy = channel.partners()[1].policy().unwrap();
        assert_eq!(policy.htlc.maximum, Some(Amount::from_msat(500_000)));
        assert_eq!(policy.fee.base, Some(Amount::from_msat(2_000)));
    }

    #[test]
    fn lone_partner_alignment_test() {
        let mut channel = channel();
        // only the second local partner, listed first
        let incoming = json!({
            "id": "100x1x0",
            "partners": [{
                "node": { "public_key": make_test_pubkey(2) },
                "policy": { "fee": { "base": { "millisatoshis": 7_000 } } },
            }],
        });
        let changes = apply(&mut channel, &incoming).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, Path::parse("partners/1/policy/fee/base/millisatoshis"));
        assert_eq!(
            channel.partners()[1].policy().unwrap().fee.base,
            Some(Amount::from_msat(7_000))
        );
        assert_eq!(
            channel.partners()[0].policy().unwrap().fee.base,
            Some(Amount::from_msat(1_000))
        );

        // the first local partner stays where it is
        let incoming = json!({
            "partners": [{
                "node": { "public_key": make_test_pubkey(1) },
                "policy": { "fee": { "base": { "millisatoshis": 8_000 } } },
            }],
        });
        let changes = apply(&mut channel, &incoming).unwrap();
        assert_eq!(changes[0].path, Path::parse("partners/0/policy/fee/base/millisatoshis"));

        // a stranger is still another channel
        let incoming = json!({ "partners": [{ "node": { "public_key": make_test_pubkey(3) } }] });
        let err = apply(&mut channel, &incoming).unwrap_err();
        assert!(matches!(err.kind, GraphErrorKind::IdentityMismatch(_)));
        assert_eq!(
            channel.partners()[0].policy().unwrap().fee.base,
            Some(Amount::from_msat(8_000))
        );
    }

    #[test]
    fn unresolved_channel_test() {
        let mut channel =
            Channel::from_snapshot(make_test_unresolved_channel_snapshot("100x3x0", 3)).unwrap();
        let incoming = json!({ "accounting": { "capacity": { "millisatoshis": 1 } } });
        let err = apply(&mut channel, &incoming).unwrap_err();
        assert!(matches!(err.kind, GraphErrorKind::UnknownEntity(_)));
    }

    #[test]
    fn confirmed_policy_test() {
        let mut channel = channel();
        let policy = Policy {
            fee: Fee { base: Some(Amount::from_msat(3_000)), rate: None },
            ..Default::default()
        };
        let changes = apply_confirmed_policy(&mut channel, &make_test_pubkey(2), &policy).unwrap();
        assert_eq!(changes.len(), 1);
        let applied = channel.partners()[1].policy().unwrap();
        assert_eq!(applied.fee.base, Some(Amount::from_msat(3_000)));
        assert_eq!(applied.fee.rate, Some(FeeRate::from_ppm(10)));

        let err = apply_confirmed_policy(&mut channel, &make_test_pubkey(9), &policy).unwrap_err();
        assert!(matches!(err.kind, GraphErrorKind::InvalidArgument(_)));
    }
}
