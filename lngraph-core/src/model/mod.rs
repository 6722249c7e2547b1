//! Domain entities and their snapshots.
//!
//! Every entity can be dumped into a snapshot that carries every internal field, and
//! rebuilt from it.  The public view is a filtered JSON tree that omits owner-only and
//! secret fields depending on the ownership of the entity.

/// Channels and their partners
pub mod channel;
/// Nodes and node references
pub mod node;
/// Payments and payment hops
pub mod payment;
/// Forwarding policy
pub mod policy;

use core::fmt::{self, Display, Formatter};
use core::ops::Add;

use serde::{Deserialize, Serialize};

/// An amount of bitcoin, in millisatoshi
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount {
    /// The amount in millisatoshi
    pub millisatoshis: u64,
}

impl Amount {
    /// The zero amount
    pub const ZERO: Amount = Amount { millisatoshis: 0 };

    /// Create from millisatoshi
    pub fn from_msat(millisatoshis: u64) -> Self {
        Amount { millisatoshis }
    }

    /// Create from satoshi
    pub fn from_sat(satoshis: u64) -> Self {
        Amount { millisatoshis: satoshis.saturating_mul(1000) }
    }

    /// The amount in millisatoshi
    pub fn msat(&self) -> u64 {
        self.millisatoshis
    }

    /// The amount in whole satoshi, rounded down
    pub fn sat(&self) -> u64 {
        self.millisatoshis / 1000
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount { millisatoshis: self.millisatoshis.saturating_add(rhs.millisatoshis) }
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} msat", self.millisatoshis)
    }
}

/// A proportional fee rate
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeeRate {
    /// The rate in parts per million of the forwarded amount
    pub parts_per_million: u64,
}

impl FeeRate {
    /// Create from parts per million
    pub fn from_ppm(parts_per_million: u64) -> Self {
        FeeRate { parts_per_million }
    }

    /// The proportional fee charged on `amount`, rounded down
    pub fn fee_for(&self, amount: Amount) -> Amount {
        let fee = amount.millisatoshis as u128 * self.parts_per_million as u128 / 1_000_000;
        Amount::from_msat(fee.min(u64::MAX as u128) as u64)
    }
}

/// Where a snapshot's data came from, e.g. the remote calls that contributed to it.
///
/// Bookkeeping only: gossip never applies changes to it.
pub type Provenance = Vec<String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_test() {
        assert_eq!(Amount::from_sat(2).msat(), 2000);
        assert_eq!(Amount::from_msat(2999).sat(), 2);
        assert_eq!(Amount::from_msat(1) + Amount::from_msat(2), Amount::from_msat(3));
        assert_eq!(Amount::from_msat(u64::MAX) + Amount::from_msat(2), Amount::from_msat(u64::MAX));
        assert_eq!(Amount::from_msat(5).to_string(), "5 msat");
        assert_eq!(
            serde_json::to_value(Amount::from_msat(5)).unwrap(),
            serde_json::json!({"millisatoshis": 5})
        );
    }

    #[test]
    fn fee_rate_test() {
        let rate = FeeRate::from_ppm(100);
        assert_eq!(rate.fee_for(Amount::from_sat(1_000_000)), Amount::from_sat(100));
        assert_eq!(rate.fee_for(Amount::from_msat(9_999)), Amount::ZERO);
    }
}
