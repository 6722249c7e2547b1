#![crate_name = "lngraph"]

//! An in-memory canonical graph of Lightning nodes, channels and payments.
//!
//! Entities are built from remote-call snapshots, keyed by a [key::CanonicalKey], and
//! kept in sync with peer gossip through the [gossip] controller.  Payment routes are
//! classified and navigated with [route::Route].
//! See [`graph::Graph`] for the entry point.

#![forbid(unsafe_code)]
#![warn(rustdoc::broken_intra_doc_links)]
#![warn(missing_docs)]

pub use bitcoin;

/// Various utilities
#[macro_use]
pub mod util;
/// Errors
#[macro_use]
pub mod error;
/// Canonical keys
pub mod key;
/// Protected mutation
pub mod guard;
/// Structural diff
pub mod diff;
/// Domain entities
pub mod model;
/// Gossip apply controller
pub mod gossip;
/// Route classification and navigation
pub mod route;
/// The graph registry
pub mod graph;

/// Commonly used types
pub mod prelude {
    pub use crate::error::{GraphError, GraphErrorKind};
    pub use crate::graph::{GossipOutcome, Graph, GraphConfig, GraphSnapshot};
    pub use crate::key::CanonicalKey;
    pub use crate::model::channel::{Channel, ChannelId};
    pub use crate::model::node::{Node, NodeRef};
    pub use crate::model::payment::Payment;
    pub use crate::model::{Amount, FeeRate};
    pub use crate::route::{Purpose, Route};
}
