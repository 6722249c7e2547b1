#![allow(missing_docs)]

use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use bitcoin::Txid;

use crate::model::channel::{
    ChannelAccounting, ChannelId, ChannelNodeSnapshot, ChannelSnapshot, Exposure, FundingPoint,
    PartnerAccounting, PartnerState,
};
use crate::model::node::{NodeRef, NodeSnapshot};
use crate::model::payment::{
    Description, InvoiceRef, PaymentChannelSnapshot, PaymentSecret, PaymentSnapshot, PaymentState,
    Through,
};
use crate::model::policy::{Fee, Policy};
use crate::model::{Amount, FeeRate};
use crate::route::Purpose;

/// The seed of the local node's test key
pub const TEST_LOCAL: u8 = 100;

pub fn make_test_key(i: u8) -> (PublicKey, SecretKey) {
    let secp_ctx = Secp256k1::signing_only();
    let secret_key = SecretKey::from_slice(&[i; 32]).unwrap();
    (PublicKey::from_secret_key(&secp_ctx, &secret_key), secret_key)
}

pub fn make_test_pubkey(i: u8) -> PublicKey {
    make_test_key(i).0
}

pub fn make_test_local_pubkey() -> PublicKey {
    make_test_pubkey(TEST_LOCAL)
}

pub fn make_test_node_ref(i: u8) -> NodeRef {
    NodeRef::new(make_test_pubkey(i), i == TEST_LOCAL)
}

pub fn make_test_node_snapshot(i: u8, alias: &str) -> NodeSnapshot {
    NodeSnapshot {
        key: None,
        source: vec!["describe_graph".to_string()],
        public_key: make_test_pubkey(i),
        alias: Some(alias.to_string()),
        color: Some("#3399ff".to_string()),
        myself: i == TEST_LOCAL,
        platform: None,
    }
}

pub fn make_test_policy(base_msat: u64, rate_ppm: u64) -> Policy {
    Policy {
        fee: Fee {
            base: Some(Amount::from_msat(base_msat)),
            rate: Some(FeeRate::from_ppm(rate_ppm)),
        },
        ..Default::default()
    }
}

pub fn make_test_funding() -> FundingPoint {
    FundingPoint { transaction: Txid::from_byte_array([2u8; 32]), output: 0 }
}

fn make_test_partner(i: u8, policy: Policy, balance: Option<Amount>) -> ChannelNodeSnapshot {
    ChannelNodeSnapshot {
        state: Some(PartnerState::Active),
        node: make_test_node_ref(i),
        policy: Some(policy),
        accounting: balance.map(|b| PartnerAccounting { balance: Some(b) }),
    }
}

/// A resolved channel between two foreign nodes, with a 1000 sat capacity
pub fn make_test_channel_snapshot(id: &str, n1: u8, n2: u8) -> ChannelSnapshot {
    ChannelSnapshot {
        key: None,
        source: vec!["describe_graph".to_string()],
        id: ChannelId::new(id),
        known: true,
        mine: false,
        exposure: Some(Exposure::Public),
        funding: Some(make_test_funding()),
        opened_at: None,
        up_at: None,
        active: None,
        accounting: Some(ChannelAccounting {
            capacity: Some(Amount::from_sat(1_000)),
            ..Default::default()
        }),
        partners: vec![
            make_test_partner(n1, make_test_policy(1_000, 1), None),
            make_test_partner(n2, make_test_policy(2_000, 10), None),
        ],
    }
}

/// A channel between the local node, at index 0, and a peer
pub fn make_test_my_channel_snapshot(id: &str, peer: u8) -> ChannelSnapshot {
    ChannelSnapshot {
        key: None,
        source: vec!["list_channels".to_string()],
        id: ChannelId::new(id),
        known: true,
        mine: true,
        exposure: Some(Exposure::Private),
        funding: Some(make_test_funding()),
        opened_at: Some(1_700_000_000),
        up_at: Some(3_600),
        active: Some(true),
        accounting: Some(ChannelAccounting {
            capacity: Some(Amount::from_sat(1_000)),
            sent: Some(Amount::from_sat(10)),
            received: Some(Amount::from_sat(5)),
            unsettled: Some(Amount::ZERO),
        }),
        partners: vec![
            make_test_partner(TEST_LOCAL, make_test_policy(1_000, 1), Some(Amount::from_sat(600))),
            make_test_partner(peer, make_test_policy(2_000, 10), Some(Amount::from_sat(400))),
        ],
    }
}

/// A channel only seen by id, with a single known partner
pub fn make_test_unresolved_channel_snapshot(id: &str, n: u8) -> ChannelSnapshot {
    ChannelSnapshot {
        key: None,
        source: vec![],
        id: ChannelId::new(id),
        known: false,
        mine: false,
        exposure: None,
        funding: None,
        opened_at: None,
        up_at: None,
        active: None,
        accounting: None,
        partners: vec![ChannelNodeSnapshot {
            state: None,
            node: make_test_node_ref(n),
            policy: None,
            accounting: None,
        }],
    }
}

/// A settled invoice payment from the local node along `route`.
///
/// Each entry is a channel id and the seed of the node the hop leads to.  Hop channels
/// are unresolved, with the previous node and the counterpart as partners.
pub fn make_test_payment_snapshot(route: &[(&str, u8)]) -> PaymentSnapshot {
    let mut prev = TEST_LOCAL;
    let hops = route
        .iter()
        .enumerate()
        .map(|(i, (id, counterpart))| {
            let mut partners = vec![make_test_node_ref(prev)];
            if prev != *counterpart {
                partners.push(make_test_node_ref(*counterpart));
            }
            prev = *counterpart;
            let channel = ChannelSnapshot {
                partners: partners
                    .into_iter()
                    .map(|node| ChannelNodeSnapshot {
                        state: None,
                        node,
                        policy: None,
                        accounting: None,
                    })
                    .collect(),
                ..make_test_unresolved_channel_snapshot(id, *counterpart)
            };
            PaymentChannelSnapshot {
                hop: i + 1,
                amount: Amount::from_sat(10_000),
                fee: Amount::from_sat(1),
                counterpart: make_test_pubkey(*counterpart),
                is_last: i + 1 == route.len(),
                channel,
            }
        })
        .collect();
    PaymentSnapshot {
        key: None,
        source: vec!["list_payments".to_string()],
        created_at: 1_700_000_000_000_000_000,
        amount: Amount::from_sat(10_000),
        fee: Amount::from_sat(5),
        secret: PaymentSecret { hash: [7u8; 32], preimage: Some([8u8; 32]) },
        purpose: Purpose::Unknown,
        through: Through::Invoice,
        state: PaymentState::Succeeded,
        message: None,
        invoice: Some(InvoiceRef {
            code: Some("lnbc100u1ptest".to_string()),
            amount: Some(Amount::from_sat(10_000)),
            description: Description { memo: Some("coffee".to_string()), hash: None },
        }),
        hops,
    }
}
