use core::fmt::{self, Debug, Formatter};

use crate::error::{token_error, GraphError};

/// A single-use authorization for one protected write.
///
/// Tokens are random, so a caller can only hold a matching token if it went through
/// [MutationGuard::prepare] (usually via the gossip controller) first.
#[derive(Clone, PartialEq, Eq)]
pub struct MutationToken([u8; 16]);

impl MutationToken {
    /// Generate a fresh random token
    pub fn generate() -> Self {
        MutationToken(rand::random())
    }
}

impl Debug for MutationToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // don't leak the token value into logs
        write!(f, "MutationToken(..)")
    }
}

/// Guards the protected setters of one entity instance.
///
/// Holds at most one outstanding token.  Not safe for interleaved use from several
/// threads: a second `prepare` overwrites the first, so applies on the same entity
/// must be serialized by the caller.
#[derive(Clone, Default)]
pub struct MutationGuard {
    pending: Option<MutationToken>,
}

impl MutationGuard {
    /// Store a token for the next protected write, replacing any unconsumed one.
    pub fn prepare(&mut self, token: MutationToken) {
        self.pending = Some(token);
    }

    /// Consume the stored token if it matches.
    ///
    /// Fails without side effects if no token is stored or it doesn't match.
    pub fn consume(&mut self, token: &MutationToken) -> Result<(), GraphError> {
        match &self.pending {
            None => Err(token_error("no token prepared")),
            Some(pending) if pending != token => Err(token_error("token does not match")),
            Some(_) => {
                self.pending = None;
                Ok(())
            }
        }
    }

    /// Whether a token is waiting to be consumed
    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }
}

impl Debug for MutationGuard {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationGuard").field("armed", &self.is_armed()).finish()
    }
}

/// An entity with protected setters
pub trait Guarded {
    /// The guard embedded in the entity
    fn guard_mut(&mut self) -> &mut MutationGuard;

    /// Prepare a token for the next protected setter call
    fn prepare_token(&mut self, token: MutationToken) {
        self.guard_mut().prepare(token)
    }
}
