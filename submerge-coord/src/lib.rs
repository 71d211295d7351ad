//! The coordinator side of the protocol: two-phase quorum write-lock
//! coordination driven over a `Transport`. Where `submerge-store`'s
//! `Replica` is a single-writer serializer, `Coordinator` is the
//! concurrent fan-out on the other end of the wire -- it owns no replica
//! state beyond its view of cluster membership, and a caller may run many
//! operations through it at once.

mod coordinator;
mod fanout;
mod outcome;

pub use coordinator::Coordinator;
pub use outcome::{NoQuorum, QuorumOutcome};
