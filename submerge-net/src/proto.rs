//! The RPC surface: one request/reply shape per row of the external
//! interfaces table. Every request carries a reply; there is no
//! fire-and-forget message in this protocol.

use serde::{Deserialize, Serialize};

use crate::{Millis, NodeID, Tag};

/// The value a `get_write_lock` or `extend_lease` caller expects to find
/// already in the store. Rather than reserve one in-band value of `V` to
/// mean "nothing here", absence is its own variant, so no value of `V` is
/// ever unrepresentable as a stored entry.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Expected<V> {
    Value(V),
    NotFound,
}

/// A request a coordinator sends to one replica.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Request<K, V> {
    GetWriteLock {
        key: K,
        expected: Expected<V>,
        tag: Tag,
    },
    ReleaseWriteLock {
        tag: Tag,
    },
    Write {
        tag: Tag,
        key: K,
        value: V,
        lease_length_ms: u64,
    },
    Release {
        key: K,
        value: V,
        tag: Tag,
    },
    ExtendLease {
        tag: Tag,
        key: K,
        value: V,
        extend_length_ms: u64,
    },
    SetNodes {
        primaries: Vec<NodeID>,
        replicas: Vec<NodeID>,
    },
    SetW {
        w: u32,
    },
    RemoveNode {
        node: NodeID,
        reciprocal: bool,
    },
    GetNodes,
    GetDebugState,
    DirtyRead {
        key: K,
    },
}

/// The reply a replica sends back. Error kinds are reply statuses, not
/// process faults (see submerge-base::Error for the latter).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Reply<K, V> {
    Ok,
    AlreadyLocked,
    NotExpectedValue,
    LockExpired,
    NotOwner,
    NotFound,
    Nodes {
        primaries: Vec<NodeID>,
        replicas: Vec<NodeID>,
        w: u32,
    },
    DebugState(DebugState<K, V>),
    Value(V),
}

impl<K, V> Reply<K, V> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Ok)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DebugLock<K> {
    pub tag: Tag,
    pub key: K,
    pub acquired_ms: Millis,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DebugEntry<K, V> {
    pub key: K,
    pub value: V,
    pub lease_expiry_ms: Millis,
}

/// Last-run timestamps for the two sweepers, exposed for operator
/// visibility; there is nothing else meaningful to serialize about a
/// background thread.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SweeperStatus {
    pub last_lock_sweep_ms: Millis,
    pub last_lease_sweep_ms: Millis,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DebugState<K, V> {
    pub locks: Vec<DebugLock<K>>,
    pub store: Vec<DebugEntry<K, V>>,
    pub sweepers: SweeperStatus,
}
