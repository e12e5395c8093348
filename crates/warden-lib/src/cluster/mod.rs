//! Cluster sync protocol
//!
//! Typed envelopes over an opaque byte transport, a dispatch table per
//! message kind, and round tracking for peer report collection.

mod protocol;
mod sync;

pub use protocol::{Envelope, MessageKind, ProtocolError};
pub use sync::{ClusterSync, ClusterTransport, LoopbackTransport};
