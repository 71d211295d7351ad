use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info, warn};

use submerge_base::{err, Result as BaseResult};
use submerge_net::{Expected, KvData, NodeID, Reply, Request, TagMinter, Transport};
use submerge_store::Membership;

use crate::fanout::{fan_out, fan_out_best_effort, FanOutReply};
use crate::outcome::{NoQuorum, QuorumOutcome};

/// Drives client operations against a Realm over `transport`. Holds no
/// replica state of its own -- just enough membership bookkeeping to pick
/// fan-out targets -- and may run many operations concurrently; nothing
/// here is serialized the way a `Replica` is.
pub struct Coordinator<K, V, T> {
    node: NodeID,
    transport: T,
    tags: TagMinter,
    deadline: Duration,
    membership: Mutex<Membership>,
    _kv: std::marker::PhantomData<fn() -> (K, V)>,
}

impl<K, V, T> Coordinator<K, V, T>
where
    K: KvData,
    V: KvData,
    T: Transport<K, V>,
{
    pub fn new(node: NodeID, membership: Membership, transport: T, deadline: Duration) -> Self {
        Coordinator {
            node,
            transport,
            tags: TagMinter::new(node),
            deadline,
            membership: Mutex::new(membership),
            _kv: std::marker::PhantomData,
        }
    }

    pub fn membership(&self) -> Membership {
        self.membership.lock().expect("membership lock poisoned").clone()
    }

    fn snapshot(&self) -> (Vec<NodeID>, Vec<NodeID>, u32) {
        let m = self.membership.lock().expect("membership lock poisoned");
        (m.primaries(), m.all_nodes(), m.w)
    }

    fn count_ok(replies: &[FanOutReply<K, V>]) -> usize {
        replies.iter().filter(|r| matches!(&r.reply, Ok(reply) if reply.is_ok())).count()
    }

    /// Phase 1: broadcasts `get_write_lock(key, expected, tag)` to
    /// `primaries` and counts OK replies. Mints a fresh tag for this
    /// attempt.
    fn phase1(&self, key: &K, expected: Expected<V>, primaries: &[NodeID]) -> (submerge_net::Tag, usize) {
        let tag = self.tags.mint();
        let req = Request::GetWriteLock { key: key.clone(), expected, tag };
        let replies = fan_out(&self.transport, primaries, &req, self.deadline);
        (tag, Self::count_ok(&replies))
    }

    /// Best-effort cleanup broadcast used whenever an attempt abandons a
    /// tag: on a quorum miss (all three operations) and on straggling
    /// phase-2 replies (`extend_lease` only).
    fn abandon(&self, tag: submerge_net::Tag, targets: &[NodeID]) {
        fan_out_best_effort(&self.transport, targets, &Request::ReleaseWriteLock { tag }, self.deadline);
    }

    /// Coordinator: `lock(key, value, lease_length_ms)`. `expected_value
    /// = NotFound` in phase 1 makes this a create-if-absent operation --
    /// an existing key causes `NotExpectedValue` on that node and
    /// potentially `NoQuorum`.
    pub fn lock(&self, key: K, value: V, lease_length_ms: u64) -> Result<QuorumOutcome, NoQuorum> {
        let (primaries, all_nodes, w) = self.snapshot();
        let (tag, voted) = self.phase1(&key, Expected::NotFound, &primaries);
        if voted < w as usize {
            debug!(node = %self.node, voted, w, "lock: phase 1 missed quorum");
            self.abandon(tag, &primaries);
            return Err(NoQuorum);
        }
        let req = Request::Write { tag, key, value, lease_length_ms };
        let replies = fan_out(&self.transport, &all_nodes, &req, self.deadline);
        let committed = Self::count_ok(&replies);
        info!(node = %self.node, voted, committed, "lock: committed");
        Ok(QuorumOutcome { w, voted, committed })
    }

    /// Coordinator: `release(key, value)`. Phase 1 uses `expected_value =
    /// value`, proving ownership before the delete is allowed to commit.
    pub fn release(&self, key: K, value: V) -> Result<QuorumOutcome, NoQuorum> {
        let (primaries, all_nodes, w) = self.snapshot();
        let (tag, voted) = self.phase1(&key, Expected::Value(value.clone()), &primaries);
        if voted < w as usize {
            debug!(node = %self.node, voted, w, "release: phase 1 missed quorum");
            self.abandon(tag, &primaries);
            return Err(NoQuorum);
        }
        let req = Request::Release { key, value, tag };
        let replies = fan_out(&self.transport, &all_nodes, &req, self.deadline);
        let committed = Self::count_ok(&replies);
        info!(node = %self.node, voted, committed, "release: committed");
        Ok(QuorumOutcome { w, voted, committed })
    }

    /// Coordinator: `extend_lease(key, value, lease_length_ms)`. Unlike
    /// `lock`/`release`, a successful quorum here always returns `Ok(())`
    /// even with partial phase-2 failures -- callers who want counts
    /// should use `lock`/`release`'s shape instead. Every node that came
    /// back non-OK (or unreachable) in phase 2 gets an explicit
    /// `release_write_lock` so its dangling lock doesn't wait out the
    /// sweeper.
    pub fn extend_lease(&self, key: K, value: V, lease_length_ms: u64) -> Result<(), NoQuorum> {
        let (primaries, all_nodes, w) = self.snapshot();
        let (tag, voted) = self.phase1(&key, Expected::Value(value.clone()), &primaries);
        if voted < w as usize {
            debug!(node = %self.node, voted, w, "extend_lease: phase 1 missed quorum");
            self.abandon(tag, &primaries);
            return Err(NoQuorum);
        }
        let req = Request::ExtendLease { tag, key, value, extend_length_ms: lease_length_ms };
        let replies = fan_out(&self.transport, &all_nodes, &req, self.deadline);
        let stragglers: Vec<NodeID> = replies
            .iter()
            .filter(|r| !matches!(&r.reply, Ok(reply) if reply.is_ok()))
            .map(|r| r.node)
            .collect();
        if !stragglers.is_empty() {
            warn!(node = %self.node, count = stragglers.len(), "extend_lease: cleaning up stragglers' dangling locks");
            self.abandon(tag, &stragglers);
        }
        Ok(())
    }

    /// `set_nodes(cluster, primaries, replicas)`: broadcast to every node
    /// in `cluster`, replacing its local membership view. No failures are
    /// tolerated -- this is a fault, not a reply status, since a cluster
    /// left half-reconfigured has no well-defined semantics.
    pub fn set_nodes(&self, cluster: &[NodeID], primaries: BTreeSet<NodeID>, replicas: BTreeSet<NodeID>) -> BaseResult<()> {
        let req = Request::SetNodes {
            primaries: primaries.iter().copied().collect(),
            replicas: replicas.iter().copied().collect(),
        };
        let replies = fan_out(&self.transport, cluster, &req, self.deadline);
        Self::assert_all_ok(&replies, "set_nodes")?;
        self.membership.lock().expect("membership lock poisoned").set_nodes(primaries, replicas);
        Ok(())
    }

    /// `set_w(cluster, w)`: broadcast the new write quorum size.
    pub fn set_w(&self, cluster: &[NodeID], w: u32) -> BaseResult<()> {
        let replies = fan_out(&self.transport, cluster, &Request::SetW { w }, self.deadline);
        Self::assert_all_ok(&replies, "set_w")?;
        self.membership.lock().expect("membership lock poisoned").set_w(w);
        Ok(())
    }

    /// `remove_node(target)`: removes `target` from this coordinator's
    /// local membership, then issues a one-hop reciprocal call telling
    /// `target` to remove this coordinator's node in turn. The
    /// `reciprocal` flag tells `target`'s replica not to call back again.
    pub fn remove_node(&self, target: NodeID) -> BaseResult<()> {
        self.membership.lock().expect("membership lock poisoned").remove_node(target);
        let reply = self
            .transport
            .call(target, Request::RemoveNode { node: self.node, reciprocal: true }, self.deadline)
            .map_err(|e| err(format!("remove_node: {target} unreachable: {e:?}")))?;
        if reply.is_ok() {
            Ok(())
        } else {
            Err(err(format!("remove_node: {target} returned an unexpected reply")))
        }
    }

    fn assert_all_ok(replies: &[FanOutReply<K, V>], op: &str) -> BaseResult<()> {
        for r in replies {
            match &r.reply {
                Ok(reply) if reply.is_ok() => {}
                Ok(_other) => return Err(err(format!("{op}: node {} returned an unexpected reply", r.node))),
                Err(e) => return Err(err(format!("{op}: node {} unreachable: {e:?}", r.node))),
            }
        }
        Ok(())
    }
}
