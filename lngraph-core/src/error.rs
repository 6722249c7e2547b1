#[cfg(feature = "use_backtrace")]
use backtrace::Backtrace;

use GraphErrorKind::*;

/// Kind of graph error
#[derive(Clone, Debug, PartialEq)]
pub enum GraphErrorKind {
    /// An incoming snapshot's identity fields disagree with the local entity
    IdentityMismatch(String),
    /// A diffed field is neither forbidden, ignorable nor whitelisted
    UnknownMutationPath(String),
    /// A protected setter was called without a freshly prepared, unconsumed token
    Token(String),
    /// An owner-only member was accessed on an entity the local node doesn't own
    Ownership(String),
    /// A member was accessed on a channel that was never resolved
    UnknownEntity(String),
    /// A payment record has more than one in-flight attempt
    MultipleAttempts(String),
    /// A snapshot or gossip value could not be decoded
    InvalidSnapshot(String),
    /// The caller passed an argument that doesn't fit the entity
    InvalidArgument(String),
}

// Explicit PartialEq which ignores backtrace.
impl PartialEq for GraphError {
    fn eq(&self, other: &GraphError) -> bool {
        self.kind == other.kind
    }
}

/// Graph error
#[derive(Clone)]
pub struct GraphError {
    /// The kind of error
    pub kind: GraphErrorKind,
    /// A non-resolved backtrace
    #[cfg(feature = "use_backtrace")]
    pub bt: Backtrace,
}

impl GraphError {
    fn new(kind: GraphErrorKind) -> Self {
        GraphError {
            kind,
            #[cfg(feature = "use_backtrace")]
            bt: Backtrace::new_unresolved(),
        }
    }

    /// Resolve the backtrace for display to the user
    #[cfg(feature = "use_backtrace")]
    pub fn resolved_backtrace(&self) -> Backtrace {
        let mut ge = self.clone();
        ge.bt.resolve();
        ge.bt
    }

    /// Return a new GraphError with the message prepended
    pub fn prepend_msg(&self, premsg: String) -> GraphError {
        let modkind = match &self.kind {
            IdentityMismatch(s0) => IdentityMismatch(premsg + s0),
            UnknownMutationPath(s0) => UnknownMutationPath(premsg + s0),
            Token(s0) => Token(premsg + s0),
            Ownership(s0) => Ownership(premsg + s0),
            UnknownEntity(s0) => UnknownEntity(premsg + s0),
            MultipleAttempts(s0) => MultipleAttempts(premsg + s0),
            InvalidSnapshot(s0) => InvalidSnapshot(premsg + s0),
            InvalidArgument(s0) => InvalidArgument(premsg + s0),
        };
        GraphError {
            kind: modkind,
            #[cfg(feature = "use_backtrace")]
            bt: self.bt.clone(),
        }
    }

    /// The message carried by the error kind
    pub fn message(&self) -> &str {
        match &self.kind {
            IdentityMismatch(s)
            | UnknownMutationPath(s)
            | Token(s)
            | Ownership(s)
            | UnknownEntity(s)
            | MultipleAttempts(s)
            | InvalidSnapshot(s)
            | InvalidArgument(s) => s,
        }
    }
}

impl core::fmt::Display for GraphError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{:?}", self.kind)
    }
}

impl core::fmt::Debug for GraphError {
    #[cfg(not(feature = "use_backtrace"))]
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("GraphError").field("kind", &self.kind).finish()
    }
    #[cfg(feature = "use_backtrace")]
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("GraphError")
            .field("kind", &self.kind)
            .field("bt", &self.resolved_backtrace())
            .finish()
    }
}

impl std::error::Error for GraphError {}

impl Into<String> for GraphError {
    fn into(self) -> String {
        match self.kind {
            IdentityMismatch(s) => "identity mismatch: ".to_string() + &s,
            UnknownMutationPath(s) => "unknown mutation path: ".to_string() + &s,
            Token(s) => "token violation: ".to_string() + &s,
            Ownership(s) => "ownership violation: ".to_string() + &s,
            UnknownEntity(s) => "unknown entity: ".to_string() + &s,
            MultipleAttempts(s) => "multiple in-flight attempts: ".to_string() + &s,
            InvalidSnapshot(s) => "invalid snapshot: ".to_string() + &s,
            InvalidArgument(s) => "invalid argument: ".to_string() + &s,
        }
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(e: serde_json::Error) -> Self {
        invalid_snapshot_error(e.to_string())
    }
}

pub(crate) fn identity_mismatch_error(msg: impl Into<String>) -> GraphError {
    GraphError::new(IdentityMismatch(msg.into()))
}

pub(crate) fn unknown_mutation_path_error(msg: impl Into<String>) -> GraphError {
    GraphError::new(UnknownMutationPath(msg.into()))
}

pub(crate) fn token_error(msg: impl Into<String>) -> GraphError {
    GraphError::new(Token(msg.into()))
}

pub(crate) fn ownership_error(msg: impl Into<String>) -> GraphError {
    GraphError::new(Ownership(msg.into()))
}

pub(crate) fn unknown_entity_error(msg: impl Into<String>) -> GraphError {
    GraphError::new(UnknownEntity(msg.into()))
}

pub(crate) fn multiple_attempts_error(msg: impl Into<String>) -> GraphError {
    GraphError::new(MultipleAttempts(msg.into()))
}

pub(crate) fn invalid_snapshot_error(msg: impl Into<String>) -> GraphError {
    GraphError::new(InvalidSnapshot(msg.into()))
}

pub(crate) fn invalid_argument_error(msg: impl Into<String>) -> GraphError {
    GraphError::new(InvalidArgument(msg.into()))
}

/// Return an error of the given kind from the current function, with the
/// function name prepended to the message.
#[doc(hidden)]
#[macro_export]
macro_rules! graph_err {
	($ctor:ident, $($arg:tt)*) => (
        return Err($crate::error::$ctor(format!(
            "{}: {}",
            $crate::short_function!(),
            format!($($arg)*)
        )))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_error_test() {
        assert_eq!(
            format!("{}", identity_mismatch_error("testing")),
            "IdentityMismatch(\"testing\")"
        );
        assert_eq!(
            Into::<String>::into(identity_mismatch_error("testing")),
            "identity mismatch: testing"
        );
        assert_eq!(format!("{}", token_error("testing")), "Token(\"testing\")");
        assert_eq!(Into::<String>::into(token_error("testing")), "token violation: testing");
        assert_eq!(
            Into::<String>::into(unknown_mutation_path_error("a/b")),
            "unknown mutation path: a/b"
        );
        assert_eq!(
            Into::<String>::into(multiple_attempts_error("2 attempts")),
            "multiple in-flight attempts: 2 attempts"
        );
    }

    #[test]
    fn prepend_and_eq_test() {
        let e = ownership_error("sent").prepend_msg("channel 1x1x1: ".to_string());
        assert_eq!(e.message(), "channel 1x1x1: sent");
        assert_eq!(e, ownership_error("channel 1x1x1: sent"));
        assert_ne!(e, unknown_entity_error("channel 1x1x1: sent"));
    }

    fn failing(x: u32) -> Result<(), GraphError> {
        if x > 1 {
            graph_err!(invalid_argument_error, "x too large: {}", x);
        }
        Ok(())
    }

    #[test]
    fn graph_err_macro_test() {
        assert!(failing(1).is_ok());
        assert_eq!(failing(2), Err(invalid_argument_error("failing: x too large: 2")));
    }
}
