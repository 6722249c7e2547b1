//! Payment route classification and navigation.
//!
//! Raw hop data only carries an unordered partner pair per channel.  The direction of
//! flow through each hop is recovered from the position in the route and from whether
//! the local node is one of the partners.

use bitcoin::secp256k1::PublicKey;
use serde::{Deserialize, Serialize};

use crate::error::{invalid_argument_error, GraphError};
use crate::model::node::NodeRef;
use crate::model::payment::PaymentChannel;

/// What a payment was for, inferred from its route
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Purpose {
    /// No route known
    Unknown,
    /// Paid a direct peer
    PeerToPeer,
    /// Out and back through the same channel
    SelfPayment,
    /// Out through one channel and back in through another, to move liquidity
    Rebalance,
    /// Paid someone else
    Payment,
}

/// Infer the purpose of a route, as seen by the local node.
///
/// The first matching rule wins:
/// no hops is unknown, one hop is peer-to-peer, two hops through the same channel is a
/// self-payment, more than two hops ending at the local node is a rebalance, and
/// anything else is a payment.
pub fn classify_purpose(hops: &[PaymentChannel], local: &PublicKey) -> Purpose {
    match hops {
        [] => Purpose::Unknown,
        [_] => Purpose::PeerToPeer,
        [first, second] if first.channel().id() == second.channel().id() => Purpose::SelfPayment,
        [.., last] if hops.len() > 2 && last.counterpart() == local => Purpose::Rebalance,
        _ => Purpose::Payment,
    }
}

/// Directional view of a route.  Hop positions start at 1.
pub struct Route<'a> {
    hops: &'a [PaymentChannel],
    local: &'a PublicKey,
}

impl<'a> Route<'a> {
    /// Navigate `hops` from the point of view of `local`
    pub fn new(hops: &'a [PaymentChannel], local: &'a PublicKey) -> Self {
        Route { hops, local }
    }

    /// The purpose of the route
    pub fn purpose(&self) -> Purpose {
        classify_purpose(self.hops, self.local)
    }

    /// The hop at position `i`
    pub fn hop(&self, i: usize) -> Result<&'a PaymentChannel, GraphError> {
        if i == 0 || i > self.hops.len() {
            return Err(invalid_argument_error(format!(
                "hop {} out of range 1..={}",
                i,
                self.hops.len()
            )));
        }
        Ok(&self.hops[i - 1])
    }

    fn local_ref(&self, hop: &PaymentChannel) -> NodeRef {
        match hop.channel().partner(self.local) {
            Some(partner) => partner.node().clone(),
            None => NodeRef::new(*self.local, true),
        }
    }

    /// The node hop `i` leads away from the local node to.
    ///
    /// When the local node is a partner of the hop's channel this is the other partner.
    /// Otherwise it is the partner matching the counterpart reported in the route.
    pub fn target(&self, i: usize) -> Result<NodeRef, GraphError> {
        let hop = self.hop(i)?;
        let channel = hop.channel();
        if let Some(other) = channel.other_partner(self.local) {
            return Ok(other.node().clone());
        }
        if let Some(partner) = channel.partner(hop.counterpart()) {
            return Ok(partner.node().clone());
        }
        // unresolved channel, all we have is the route itself
        Ok(NodeRef::new(*hop.counterpart(), hop.counterpart() == self.local))
    }

    /// The node funds enter hop `i` from
    pub fn entry(&self, i: usize) -> Result<Option<NodeRef>, GraphError> {
        let hop = self.hop(i)?;
        let channel = hop.channel();
        if i == 1 {
            if channel.has_partner(self.local) {
                return Ok(Some(self.local_ref(hop)));
            }
            return self.target(1).map(Some);
        }
        if hop.is_last() {
            if let Some(other) = channel.other_partner(self.local) {
                return Ok(Some(other.node().clone()));
            }
        }
        self.target(i - 1).map(Some)
    }

    /// The node funds leave hop `i` to.  Absent for a single-hop route.
    pub fn exit(&self, i: usize) -> Result<Option<NodeRef>, GraphError> {
        let hop = self.hop(i)?;
        if i == 1 && hop.is_last() {
            return Ok(None);
        }
        if hop.is_last() && hop.channel().has_partner(self.local) {
            return Ok(Some(self.local_ref(hop)));
        }
        self.target(i).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphErrorKind;
    use crate::model::payment::Payment;
    use crate::util::test_utils::*;
    use test_log::test;

    fn payment(route: &[(&str, u8)]) -> Payment {
        Payment::from_snapshot(make_test_payment_snapshot(route)).unwrap()
    }

    fn pk(n: u8) -> PublicKey {
        make_test_pubkey(n)
    }

    #[test]
    fn classify_table_test() {
        let local = make_test_local_pubkey();
        let cases: Vec<(Vec<(&str, u8)>, Purpose)> = vec![
            (vec![], Purpose::Unknown),
            (vec![("1x1x1", 1)], Purpose::PeerToPeer),
            (vec![("1x1x1", 1), ("1x1x1", TEST_LOCAL)], Purpose::SelfPayment),
            (vec![("1x1x1", 1), ("2x2x2", 2), ("3x3x3", TEST_LOCAL)], Purpose::Rebalance),
            (vec![("1x1x1", 1), ("2x2x2", 2)], Purpose::Payment),
            (vec![("1x1x1", 1), ("2x2x2", 2), ("3x3x3", 3)], Purpose::Payment),
            // two distinct channels back home is too short to be a rebalance
            (vec![("1x1x1", 1), ("2x2x2", TEST_LOCAL)], Purpose::Payment),
        ];
        for (route, expected) in cases {
            let p = payment(&route);
            assert_eq!(classify_purpose(p.hops(), &local), expected, "{:?}", route);
            assert_eq!(p.route(&local).purpose(), expected);
        }
    }

    #[test]
    fn payment_navigation_test() {
        let local = make_test_local_pubkey();
        let p = payment(&[("1x1x1", 1), ("2x2x2", 2), ("3x3x3", 3)]);
        let route = p.route(&local);

        assert_eq!(route.target(1).unwrap().public_key, pk(1));
        assert_eq!(route.target(2).unwrap().public_key, pk(2));
        assert_eq!(route.target(3).unwrap().public_key, pk(3));

        let entry = route.entry(1).unwrap().unwrap();
        assert_eq!(entry.public_key, local);
        assert!(entry.myself);
        assert_eq!(route.exit(1).unwrap().unwrap().public_key, pk(1));

        assert_eq!(route.entry(2).unwrap().unwrap().public_key, pk(1));
        assert_eq!(route.exit(2).unwrap().unwrap().public_key, pk(2));

        assert_eq!(route.entry(3).unwrap().unwrap().public_key, pk(2));
        assert_eq!(route.exit(3).unwrap().unwrap().public_key, pk(3));
    }

    #[test]
    fn rebalance_navigation_test() {
        let local = make_test_local_pubkey();
        let p = payment(&[("1x1x1", 1), ("2x2x2", 2), ("3x3x3", TEST_LOCAL)]);
        let route = p.route(&local);
        assert_eq!(route.purpose(), Purpose::Rebalance);

        // the last channel is between node 2 and us
        assert_eq!(route.target(3).unwrap().public_key, pk(2));
        assert_eq!(route.entry(3).unwrap().unwrap().public_key, pk(2));
        let exit = route.exit(3).unwrap().unwrap();
        assert_eq!(exit.public_key, local);
        assert!(exit.myself);
    }

    #[test]
    fn peer_to_peer_navigation_test() {
        let local = make_test_local_pubkey();
        let p = payment(&[("1x1x1", 1)]);
        let route = p.route(&local);
        assert_eq!(route.entry(1).unwrap().unwrap().public_key, local);
        assert_eq!(route.exit(1).unwrap(), None);
        assert_eq!(route.target(1).unwrap().public_key, pk(1));
    }

    #[test]
    fn unresolved_partner_fallback_test() {
        let local = make_test_local_pubkey();
        let mut snapshot = make_test_payment_snapshot(&[("1x1x1", 1), ("2x2x2", 2)]);
        // first channel only knows the far partner
        snapshot.hops[0].channel.partners.remove(0);
        let p = Payment::from_snapshot(snapshot).unwrap();
        let route = p.route(&local);
        // local isn't a partner of hop 1, so entry falls back to the target
        assert_eq!(route.entry(1).unwrap().unwrap().public_key, pk(1));
        assert_eq!(route.entry(2).unwrap().unwrap().public_key, pk(1));
    }

    #[test]
    fn out_of_range_test() {
        let local = make_test_local_pubkey();
        let p = payment(&[("1x1x1", 1)]);
        let route = p.route(&local);
        for i in [0, 2] {
            let err = route.entry(i).unwrap_err();
            assert!(matches!(err.kind, GraphErrorKind::InvalidArgument(_)));
        }
    }
}
