// Wire protocol and transport for a Realm of replicas: NodeID identity,
// Millis wall-clock time, the Tag that correlates a coordinator's
// phase-1 lock with its phase-2 commit, and the Request/Reply shapes
// exchanged between a coordinator and a replica.
//
// Transport itself (how bytes actually cross the wire) is an external
// collaborator per the protocol this crate serves: callers are expected
// to supply a reliable, ordered, request/reply `Transport` impl with a
// bounded per-call deadline. The `LoopbackTransport` here is the one
// concrete implementation we own, used for tests and for running a
// multi-node Realm inside a single process.

use std::fmt::Debug;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

mod codec;
mod proto;
mod transport;

pub use codec::{decode_reply, decode_request, encode_reply, encode_request};
pub use proto::{DebugEntry, DebugLock, DebugState, Expected, Reply, Request, SweeperStatus};
pub use transport::{Envelope, Inbox, LoopbackTransport, Transport, TransportError};

/// Bound satisfied by any Key or Value type usable in this system: it must
/// be cheaply comparable, hashable (for the replica's store), and able to
/// cross the wire.
pub trait KvData: Clone + Debug + Eq + Hash + Serialize + DeserializeOwned + Send + Sync + 'static {}
impl<T> KvData for T where T: Clone + Debug + Eq + Hash + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// A node's identity within one Realm. Administratively assigned; never
/// minted by the protocol itself.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct NodeID(pub u64);

impl std::fmt::Display for NodeID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Milliseconds since the epoch. The protocol only needs comparisons to be
/// consistent within one node, so a wall clock is fine as long as it
/// doesn't jump; see submerge-store's clock module for the one place this
/// is actually read.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Millis(pub u64);

impl Millis {
    pub fn saturating_add(self, ms: u64) -> Millis {
        Millis(self.0.saturating_add(ms))
    }
}

impl std::ops::Sub for Millis {
    type Output = i64;
    fn sub(self, rhs: Millis) -> i64 {
        self.0 as i64 - rhs.0 as i64
    }
}

/// A Tag uniquely identifies one coordinator attempt, cluster-wide, across
/// coordinator restarts. Rather than a 128-bit random token (which would
/// pull in a UUID dependency this workspace otherwise has no use for), a
/// Tag pairs the minting node with a per-node monotonic counter -- the
/// same shape `RealmTime` used to use for stamping events without
/// cross-node coordination.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub node: NodeID,
    pub seq: u64,
}

/// Mints fresh Tags for one node. A coordinator owns exactly one of these.
///
/// Uniqueness must hold cluster-wide across coordinator restarts, so the
/// counter is seeded from wall-clock epoch microseconds at construction
/// time rather than always starting at 0 -- a coordinator that restarts
/// with the same NodeID will not re-mint tags its previous run already
/// used (barring a restart within the same microsecond, which the 1s lock
/// TTL makes harmless in any case).
pub struct TagMinter {
    node: NodeID,
    next: std::sync::atomic::AtomicU64,
}

impl TagMinter {
    pub fn new(node: NodeID) -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        TagMinter {
            node,
            next: std::sync::atomic::AtomicU64::new(seed),
        }
    }

    pub fn mint(&self) -> Tag {
        let seq = self.next.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Tag { node: self.node, seq }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tags_from_one_minter_are_distinct() {
        let minter = TagMinter::new(NodeID(7));
        let a = minter.mint();
        let b = minter.mint();
        assert_ne!(a, b);
        assert_eq!(a.node, NodeID(7));
        assert_eq!(b.node, NodeID(7));
    }

    #[test]
    fn millis_sub_gives_signed_delta() {
        assert_eq!(Millis(500) - Millis(200), 300);
        assert_eq!(Millis(200) - Millis(500), -300);
    }
}
