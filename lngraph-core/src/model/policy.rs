use serde::{Deserialize, Serialize};

use crate::model::{Amount, FeeRate};

/// The fee a partner charges to forward through a channel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    /// Fixed fee per forwarded HTLC
    #[serde(default)]
    pub base: Option<Amount>,
    /// Proportional fee
    #[serde(default)]
    pub rate: Option<FeeRate>,
}

impl Fee {
    /// The total fee for forwarding `amount`, if both fee components are known
    pub fn fee_for(&self, amount: Amount) -> Option<Amount> {
        Some(self.base? + self.rate?.fee_for(amount))
    }
}

/// Minimum block delta requirement
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    /// The minimum number of blocks
    #[serde(default)]
    pub minimum: Option<u32>,
}

/// Block related HTLC constraints
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blocks {
    /// The CLTV expiry delta
    #[serde(default)]
    pub delta: Delta,
}

/// HTLC constraints a partner imposes on a channel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Htlc {
    /// Smallest HTLC forwarded
    #[serde(default)]
    pub minimum: Option<Amount>,
    /// Largest HTLC forwarded
    #[serde(default)]
    pub maximum: Option<Amount>,
    /// Block constraints
    #[serde(default)]
    pub blocks: Blocks,
}

/// One partner's forwarding policy for a channel.
///
/// Any part may be absent when the counterpart's policy is only partially known.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Forwarding fee
    #[serde(default)]
    pub fee: Fee,
    /// HTLC constraints
    #[serde(default)]
    pub htlc: Htlc,
}

impl Policy {
    /// Whether nothing at all is known about this policy
    pub fn is_empty(&self) -> bool {
        *self == Policy::default()
    }

    /// Whether `amount` is within the HTLC limits that are known
    pub fn accepts(&self, amount: Amount) -> bool {
        self.htlc.minimum.map_or(true, |min| amount >= min)
            && self.htlc.maximum.map_or(true, |max| amount <= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_policy_test() {
        let policy: Policy =
            serde_json::from_value(json!({"fee": {"base": {"millisatoshis": 1000}}})).unwrap();
        assert_eq!(policy.fee.base, Some(Amount::from_msat(1000)));
        assert_eq!(policy.fee.rate, None);
        assert_eq!(policy.htlc.blocks.delta.minimum, None);
        assert!(!policy.is_empty());
        assert!(Policy::default().is_empty());
        assert_eq!(policy.fee.fee_for(Amount::from_sat(1)), None);
    }

    #[test]
    fn fee_and_limits_test() {
        let policy = Policy {
            fee: Fee { base: Some(Amount::from_msat(1000)), rate: Some(FeeRate::from_ppm(1)) },
            htlc: Htlc {
                minimum: Some(Amount::from_msat(1000)),
                maximum: Some(Amount::from_sat(1_000_000)),
                blocks: Blocks { delta: Delta { minimum: Some(40) } },
            },
        };
        assert_eq!(policy.fee.fee_for(Amount::from_sat(1_000_000)), Some(Amount::from_msat(2000)));
        assert!(policy.accepts(Amount::from_sat(10)));
        assert!(!policy.accepts(Amount::from_msat(999)));
        assert!(!policy.accepts(Amount::from_sat(1_000_001)));
        assert_eq!(
            serde_json::to_value(&policy).unwrap()["htlc"]["blocks"]["delta"]["minimum"],
            json!(40)
        );
    }
}
