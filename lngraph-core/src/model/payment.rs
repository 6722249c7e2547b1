use core::fmt::{self, Debug, Formatter};

use bitcoin::secp256k1::PublicKey;
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use serde_with::{hex::Hex, serde_as};

use crate::error::{
    identity_mismatch_error, invalid_snapshot_error, multiple_attempts_error, GraphError,
};
use crate::key::{CanonicalKey, EntityKind};
use crate::model::channel::{Channel, ChannelSnapshot};
use crate::model::{Amount, Provenance};
use crate::route::{classify_purpose, Purpose, Route};

/// How the payment was made
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Through {
    /// Paying a BOLT11 invoice
    Invoice,
    /// Spontaneous payment
    Keysend,
    /// Atomic multi-path payment
    Amp,
}

/// The state of a payment or of one of its attempts
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    /// Still trying
    InFlight,
    /// Settled
    Succeeded,
    /// Gave up
    Failed,
}

/// Payment hash and, once settled, the preimage
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSecret {
    /// The payment hash
    #[serde_as(as = "Hex")]
    pub hash: [u8; 32],
    /// The payment preimage
    #[serde_as(as = "Option<Hex>")]
    pub preimage: Option<[u8; 32]>,
}

impl Debug for PaymentSecret {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentSecret")
            .field("hash", &hex::encode(self.hash))
            .field("preimage", &self.preimage.map(|_| ".."))
            .finish()
    }
}

/// An invoice description
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    /// Free-form memo
    #[serde(default)]
    pub memo: Option<String>,
    /// Hash of a long description
    #[serde(default)]
    pub hash: Option<String>,
}

/// The invoice a payment paid
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRef {
    /// The BOLT11 encoded invoice
    #[serde(default)]
    pub code: Option<String>,
    /// The requested amount
    #[serde(default)]
    pub amount: Option<Amount>,
    /// The description
    #[serde(default)]
    pub description: Description,
}

/// The full, portable state of a [PaymentChannel]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentChannelSnapshot {
    /// Position in the route, starting at 1
    pub hop: usize,
    /// Amount forwarded through this hop
    pub amount: Amount,
    /// Fee paid to forward through this hop
    pub fee: Amount,
    /// The node this hop leads to, as reported in the route
    pub counterpart: PublicKey,
    /// Whether this is the final hop
    pub is_last: bool,
    /// The channel traversed
    pub channel: ChannelSnapshot,
}

/// One channel traversal in a payment route
#[derive(Clone, Debug)]
pub struct PaymentChannel {
    hop: usize,
    amount: Amount,
    fee: Amount,
    counterpart: PublicKey,
    is_last: bool,
    channel: Channel,
}

impl PaymentChannel {
    /// Build a hop from its snapshot
    pub fn from_snapshot(snapshot: PaymentChannelSnapshot) -> Result<Self, GraphError> {
        Ok(PaymentChannel {
            hop: snapshot.hop,
            amount: snapshot.amount,
            fee: snapshot.fee,
            counterpart: snapshot.counterpart,
            is_last: snapshot.is_last,
            channel: Channel::from_snapshot(snapshot.channel)?,
        })
    }

    /// Position in the route, starting at 1
    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Amount forwarded through this hop
    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// Fee paid to forward through this hop
    pub fn fee(&self) -> Amount {
        self.fee
    }

    /// The node this hop leads to, as reported in the route
    pub fn counterpart(&self) -> &PublicKey {
        &self.counterpart
    }

    /// Whether this is the final hop
    pub fn is_last(&self) -> bool {
        self.is_last
    }

    /// The channel traversed
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// The full snapshot
    pub fn dump(&self) -> PaymentChannelSnapshot {
        PaymentChannelSnapshot {
            hop: self.hop,
            amount: self.amount,
            fee: self.fee,
            counterpart: self.counterpart,
            is_last: self.is_last,
            channel: self.channel.dump(),
        }
    }

    /// The public view
    pub fn public_view(&self) -> Value {
        json!({
            "hop": self.hop,
            "amount": self.amount,
            "fee": self.fee,
            "is_last": self.is_last,
            "channel": self.channel.public_view(),
        })
    }
}

/// One attempt at routing a payment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    /// The state of this attempt
    pub state: PaymentState,
    /// The route tried
    pub hops: Vec<PaymentChannelSnapshot>,
}

/// Pick the attempt whose route describes the payment.
///
/// More than one attempt in flight is an error, whatever the other attempts did.
/// Otherwise a settled attempt wins, then the single in-flight attempt.  More than one
/// settled attempt is also an error rather than a guess.  `None` means every attempt
/// failed.
pub fn select_attempt(attempts: &[PaymentAttempt]) -> Result<Option<&PaymentAttempt>, GraphError> {
    let in_flight: Vec<&PaymentAttempt> =
        attempts.iter().filter(|a| a.state == PaymentState::InFlight).collect();
    if in_flight.len() > 1 {
        return Err(multiple_attempts_error(format!("{} attempts in flight", in_flight.len())));
    }
    let succeeded: Vec<&PaymentAttempt> =
        attempts.iter().filter(|a| a.state == PaymentState::Succeeded).collect();
    match succeeded.len() {
        0 => Ok(in_flight.first().copied()),
        1 => Ok(Some(succeeded[0])),
        n => Err(multiple_attempts_error(format!("{} attempts succeeded", n))),
    }
}

/// The full, portable state of a [Payment]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentSnapshot {
    /// The canonical key, if already derived
    #[serde(rename = "_key", default)]
    pub key: Option<CanonicalKey>,
    /// Where the data came from
    #[serde(rename = "_source", default)]
    pub source: Provenance,
    /// Creation time, in unix nanoseconds
    pub created_at: u64,
    /// Amount delivered to the destination
    pub amount: Amount,
    /// Total routing fee
    pub fee: Amount,
    /// Hash and preimage
    pub secret: PaymentSecret,
    /// What the payment was for
    #[serde(default = "default_purpose")]
    pub purpose: Purpose,
    /// How the payment was made
    pub through: Through,
    /// Payment state
    pub state: PaymentState,
    /// Sender message, if any
    #[serde(default)]
    pub message: Option<String>,
    /// The invoice paid
    #[serde(default)]
    pub invoice: Option<InvoiceRef>,
    /// The route
    #[serde(default)]
    pub hops: Vec<PaymentChannelSnapshot>,
}

fn default_purpose() -> Purpose {
    Purpose::Unknown
}

/// The canonical key of a payment
pub fn payment_key(created_at: u64, hash: &[u8; 32], amount: Amount, fee: Amount) -> CanonicalKey {
    CanonicalKey::derive(
        EntityKind::Payment,
        &[
            &created_at.to_be_bytes(),
            hash,
            &amount.msat().to_be_bytes(),
            &fee.msat().to_be_bytes(),
        ],
    )
    .unwrap_or_else(|| unreachable!("payment identity has fixed width fields"))
}

/// A payment made by the local node
#[derive(Clone)]
pub struct Payment {
    key: CanonicalKey,
    created_at: u64,
    amount: Amount,
    fee: Amount,
    secret: PaymentSecret,
    purpose: Purpose,
    through: Through,
    state: PaymentState,
    message: Option<String>,
    invoice: Option<InvoiceRef>,
    hops: Vec<PaymentChannel>,
    source: Provenance,
}

impl Payment {
    /// Rebuild a payment from its snapshot, keeping the recorded purpose
    pub fn from_snapshot(snapshot: PaymentSnapshot) -> Result<Payment, GraphError> {
        let key =
            payment_key(snapshot.created_at, &snapshot.secret.hash, snapshot.amount, snapshot.fee);
        if let Some(claimed) = snapshot.key {
            if claimed != key {
                return Err(identity_mismatch_error(format!(
                    "payment key {} does not match its identity",
                    claimed
                )));
            }
        }
        let count = snapshot.hops.len();
        let hops = snapshot
            .hops
            .into_iter()
            .enumerate()
            .map(|(i, hop)| {
                if hop.hop != i + 1 || hop.is_last != (i + 1 == count) {
                    return Err(invalid_snapshot_error(format!(
                        "hop {} (last {}) at position {} of {}",
                        hop.hop,
                        hop.is_last,
                        i + 1,
                        count
                    )));
                }
                PaymentChannel::from_snapshot(hop)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Payment {
            key,
            created_at: snapshot.created_at,
            amount: snapshot.amount,
            fee: snapshot.fee,
            secret: snapshot.secret,
            purpose: snapshot.purpose,
            through: snapshot.through,
            state: snapshot.state,
            message: snapshot.message,
            invoice: snapshot.invoice,
            hops,
            source: snapshot.source,
        })
    }

    /// Build a payment and classify its purpose from the route, as seen by `local`
    pub fn classified(snapshot: PaymentSnapshot, local: &PublicKey) -> Result<Payment, GraphError> {
        let mut payment = Payment::from_snapshot(snapshot)?;
        payment.purpose = classify_purpose(&payment.hops, local);
        debug!("payment {} classified as {:?}", payment.key, payment.purpose);
        Ok(payment)
    }

    /// Build a payment whose route comes from the relevant attempt.
    ///
    /// Any hops already in `snapshot` are replaced.
    pub fn from_attempts(
        mut snapshot: PaymentSnapshot,
        attempts: &[PaymentAttempt],
        local: &PublicKey,
    ) -> Result<Payment, GraphError> {
        snapshot.hops = match select_attempt(attempts)? {
            Some(attempt) => attempt.hops.clone(),
            None => vec![],
        };
        Payment::classified(snapshot, local)
    }

    /// The canonical key
    pub fn key(&self) -> &CanonicalKey {
        &self.key
    }

    /// Creation time, in unix nanoseconds
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Amount delivered
    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// Total routing fee
    pub fn fee(&self) -> Amount {
        self.fee
    }

    /// Hash and preimage
    pub fn secret(&self) -> &PaymentSecret {
        &self.secret
    }

    /// What the payment was for
    pub fn purpose(&self) -> Purpose {
        self.purpose
    }

    /// How the payment was made
    pub fn through(&self) -> Through {
        self.through
    }

    /// Payment state
    pub fn state(&self) -> PaymentState {
        self.state
    }

    /// Sender message
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// The invoice paid
    pub fn invoice(&self) -> Option<&InvoiceRef> {
        self.invoice.as_ref()
    }

    /// The route, in order
    pub fn hops(&self) -> &[PaymentChannel] {
        &self.hops
    }

    /// Navigate the route from the point of view of `local`
    pub fn route<'a>(&'a self, local: &'a PublicKey) -> Route<'a> {
        Route::new(&self.hops, local)
    }

    /// The full snapshot, sufficient to rebuild this payment
    pub fn dump(&self) -> PaymentSnapshot {
        PaymentSnapshot {
            key: Some(self.key),
            source: self.source.clone(),
            created_at: self.created_at,
            amount: self.amount,
            fee: self.fee,
            secret: self.secret,
            purpose: self.purpose,
            through: self.through,
            state: self.state,
            message: self.message.clone(),
            invoice: self.invoice.clone(),
            hops: self.hops.iter().map(|h| h.dump()).collect(),
        }
    }

    /// The public view, without the preimage
    pub fn public_view(&self) -> Value {
        let hops: Vec<Value> = self.hops.iter().map(|h| h.public_view()).collect();
        json!({
            "_key": self.key,
            "created_at": self.created_at,
            "amount": self.amount,
            "fee": self.fee,
            "secret": { "hash": hex::encode(self.secret.hash) },
            "purpose": self.purpose,
            "through": self.through,
            "state": self.state,
            "message": self.message,
            "invoice": self.invoice,
            "hops": hops,
        })
    }
}

impl Debug for Payment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payment")
            .field("key", &self.key)
            .field("purpose", &self.purpose)
            .field("state", &self.state)
            .field("amount", &self.amount)
            .field("hops", &self.hops.len())
            .finish()
    }
}
