//! Applying gossip to local entities.
//!
//! An incoming snapshot is diffed against the entity's current dump.  Every changed path
//! is classified as forbidden (identity), ignorable (bookkeeping) or whitelisted (a
//! mutable business field with exactly one typed setter).  Anything else fails the
//! whole apply, so schema drift is noticed instead of silently dropped.
//!
//! An apply either commits every whitelisted change or none of them.

/// Channel gossip
pub mod channel;
/// Node gossip
pub mod node;

use core::fmt::Debug;

use log::*;
use serde_json::Value;
use tracing::instrument;

use crate::diff::{diff, Change, Path};
use crate::error::{identity_mismatch_error, unknown_mutation_path_error, GraphError};
use crate::guard::{Guarded, MutationToken};

pub use self::channel::{apply_confirmed_policy, ChannelField, ChannelMutation};
pub use self::node::{NodeField, NodeMutation};

/// How the gossip controller treats a changed path
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathClass<F> {
    /// Identity field.  A change means the message describes another entity.
    Forbidden,
    /// Bookkeeping field, never applied
    Ignorable,
    /// Mutable field, applied through the setter for `F`
    Whitelisted(F),
    /// Not part of the known schema
    Unknown,
}

/// An entity that accepts gossip updates
pub trait GossipTarget: Guarded {
    /// Identifies a whitelisted field
    type Field: Copy + Debug;
    /// A decoded, typed change to a whitelisted field
    type Mutation: Debug;

    /// Short name for logs and error messages
    fn describe(&self) -> String;

    /// Classify a changed path
    fn classify(path: &Path) -> PathClass<Self::Field>;

    /// The current state, in the same shape as incoming snapshots
    fn snapshot(&self) -> Result<Value, GraphError>;

    /// Reshape an incoming snapshot so that positional paths line up with the local
    /// entity.  The default leaves it as is.
    fn align(&self, _incoming: &mut Value) {}

    /// Decode a new leaf value for a field and check the entity can take it.
    /// Must not modify the entity.
    fn decode(&self, field: Self::Field, value: &Value) -> Result<Self::Mutation, GraphError>;

    /// Apply a decoded mutation through the matching protected setter
    fn commit(
        &mut self,
        mutation: Self::Mutation,
        token: &MutationToken,
    ) -> Result<(), GraphError>;
}

/// Apply an incoming snapshot to a local entity.
///
/// Returns the applied changes, in path order.  Fails without touching the entity if
/// any identity field differs, or if any changed path is unknown.
///
/// Messages are applied in arrival order with no staleness check: an older message
/// applied after a newer one wins.
#[instrument(skip_all, fields(entity = %entity.describe()))]
pub fn apply<E: GossipTarget>(entity: &mut E, incoming: &Value) -> Result<Vec<Change>, GraphError> {
    let current = entity.snapshot()?;
    let mut incoming = incoming.clone();
    entity.align(&mut incoming);
    let changes = diff(&current, &incoming);

    let classified: Vec<(Change, PathClass<E::Field>)> = changes
        .into_iter()
        .map(|change| {
            let class = E::classify(&change.path);
            (change, class)
        })
        .collect();

    // identity is checked over the whole diff first, so it wins over any other problem
    if let Some((change, _)) = classified.iter().find(|(_, c)| matches!(c, PathClass::Forbidden)) {
        warn!("{}: rejecting gossip for another entity: {}", entity.describe(), change);
        return Err(identity_mismatch_error(format!("{}: {}", entity.describe(), change)));
    }

    let mut pending = Vec::new();
    for (change, class) in classified {
        match class {
            PathClass::Forbidden => {}
            PathClass::Ignorable => trace!("{}: ignoring {}", entity.describe(), change),
            PathClass::Unknown => {
                warn!("{}: rejecting gossip with unknown path {}", entity.describe(), change.path);
                return Err(unknown_mutation_path_error(format!(
                    "{}: {}",
                    entity.describe(),
                    change.path
                )));
            }
            PathClass::Whitelisted(field) => {
                let mutation = entity.decode(field, &change.to).map_err(|e| {
                    e.prepend_msg(format!("{}: {}: ", entity.describe(), change.path))
                })?;
                pending.push((change, mutation));
            }
        }
    }

    let mut applied = Vec::with_capacity(pending.len());
    for (change, mutation) in pending {
        let token = MutationToken::generate();
        entity.prepare_token(token.clone());
        entity.commit(mutation, &token)?;
        applied.push(change);
    }
    if !applied.is_empty() {
        debug!("{}: applied {}", entity.describe(), changes_str!(applied));
    }
    Ok(applied)
}

/// Decode a JSON leaf into a typed value
pub(crate) fn decode_leaf<T: serde::de::DeserializeOwned>(value: &Value) -> Result<T, GraphError> {
    Ok(serde_json::from_value(value.clone())?)
}
