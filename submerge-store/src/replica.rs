//! The RequestHandler: a single-writer serializer that owns Store,
//! LockTable and Membership, and processes exactly one request at a
//! time. `Replica::handle` is the synchronous core -- it never blocks and
//! never performs network IO, which is what lets `spawn` drive it from a
//! plain channel-fed thread with no further synchronization.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use submerge_net::{
    DebugEntry, DebugLock, DebugState, Envelope, Expected, Inbox, Millis, NodeID, Reply, Request,
    SweeperStatus, Tag,
};

use crate::clock::Clock;
use crate::config::ReplicaConfig;
use crate::lock_table::LockTable;
use crate::membership::Membership;
use crate::store::{RemoveOutcome, Store};

pub struct Replica<K, V, C> {
    node: NodeID,
    store: Store<K, V>,
    locks: LockTable<K>,
    membership: Membership,
    clock: C,
    config: ReplicaConfig,
    last_lock_sweep_ms: Millis,
    last_lease_sweep_ms: Millis,
}

impl<K, V, C> Replica<K, V, C>
where
    K: Clone + Eq + std::hash::Hash + std::fmt::Debug,
    V: Clone + Eq + std::fmt::Debug,
    C: Clock,
{
    pub fn new(node: NodeID, membership: Membership, clock: C, config: ReplicaConfig) -> Self {
        let now = clock.now_ms();
        Replica {
            node,
            store: Store::new(),
            locks: LockTable::new(),
            membership,
            clock,
            config,
            last_lock_sweep_ms: now,
            last_lease_sweep_ms: now,
        }
    }

    pub fn node(&self) -> NodeID {
        self.node
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    /// Processes one request against the current Store/LockTable state,
    /// including the receiving side of membership changes.
    pub fn handle(&mut self, req: Request<K, V>) -> Reply<K, V> {
        match req {
            Request::GetWriteLock { key, expected, tag } => self.get_write_lock(key, expected, tag),
            Request::ReleaseWriteLock { tag } => self.release_write_lock(tag),
            Request::Write { tag, key, value, lease_length_ms } => self.write(tag, key, value, lease_length_ms),
            Request::Release { key, value, tag } => self.release(key, value, tag),
            Request::ExtendLease { tag, key, value, extend_length_ms } => {
                self.extend_lease(tag, key, value, extend_length_ms)
            }
            Request::SetNodes { primaries, replicas } => {
                self.membership.set_nodes(primaries.into_iter().collect(), replicas.into_iter().collect());
                Reply::Ok
            }
            Request::SetW { w } => {
                self.membership.set_w(w);
                Reply::Ok
            }
            Request::RemoveNode { node, reciprocal: _ } => {
                self.membership.remove_node(node);
                Reply::Ok
            }
            Request::GetNodes => Reply::Nodes {
                primaries: self.membership.primaries(),
                replicas: self.membership.replicas.iter().copied().collect(),
                w: self.membership.w,
            },
            Request::GetDebugState => Reply::DebugState(self.debug_state()),
            Request::DirtyRead { key } => self.dirty_read(&key),
        }
    }

    fn get_write_lock(&mut self, key: K, expected: Expected<V>, tag: Tag) -> Reply<K, V> {
        if self.locks.is_locked(&key) {
            return Reply::AlreadyLocked;
        }
        let matches = match (&self.store.get(&key), &expected) {
            (Some(entry), Expected::Value(v)) => &entry.value == v,
            (None, Expected::NotFound) => true,
            _ => false,
        };
        if !matches {
            return Reply::NotExpectedValue;
        }
        let now = self.clock.now_ms();
        self.locks.acquire(key, tag, now);
        Reply::Ok
    }

    fn release_write_lock(&mut self, tag: Tag) -> Reply<K, V> {
        if self.locks.release_by_tag(tag) {
            Reply::Ok
        } else {
            Reply::LockExpired
        }
    }

    /// The commit step of phase 2: unconditional, trusting the
    /// coordinator's quorum. Folding the lock release into commit saves a
    /// round trip; `extend_lease` can't do the same, since it has to
    /// distinguish "not owner" from "not found" on the fallback path.
    fn write(&mut self, tag: Tag, key: K, value: V, lease_length_ms: u64) -> Reply<K, V> {
        let now = self.clock.now_ms();
        self.store.put(key, value, now.saturating_add(lease_length_ms));
        self.locks.release_by_tag(tag);
        Reply::Ok
    }

    fn release(&mut self, key: K, value: V, tag: Tag) -> Reply<K, V> {
        let outcome = self.store.remove_if_value_eq(&key, &value);
        self.locks.release_by_tag(tag);
        match outcome {
            RemoveOutcome::Removed => Reply::Ok,
            RemoveOutcome::ValueMismatch => Reply::NotOwner,
            RemoveOutcome::Absent => Reply::NotFound,
        }
    }

    /// New expiry is absolute (`now + extend_length_ms`), not an
    /// increment, so a freshly joined node with no knowledge of when the
    /// lease started can still install it correctly. On a node with no
    /// entry, this doubles as the install path for a replica catching
    /// up -- but only for replicas, never primaries, since a primary
    /// with no entry genuinely lost the key.
    fn extend_lease(&mut self, tag: Tag, key: K, value: V, extend_length_ms: u64) -> Reply<K, V> {
        let now = self.clock.now_ms();
        let new_expiry = now.saturating_add(extend_length_ms);
        let reply = match self.store.get(&key) {
            Some(entry) if entry.value == value => {
                self.store.put(key.clone(), value, new_expiry);
                Reply::Ok
            }
            Some(_) => Reply::NotOwner,
            None => {
                if self.membership.is_replica(self.node) {
                    self.store.put(key.clone(), value, new_expiry);
                    Reply::Ok
                } else {
                    Reply::NotFound
                }
            }
        };
        if matches!(reply, Reply::Ok) {
            self.locks.release_by_tag(tag);
        }
        reply
    }

    fn dirty_read(&self, key: &K) -> Reply<K, V> {
        match self.store.get(key) {
            Some(entry) => Reply::Value(entry.value.clone()),
            None => Reply::NotFound,
        }
    }

    fn debug_state(&self) -> DebugState<K, V> {
        let locks = self
            .locks
            .debug_locks()
            .into_iter()
            .map(|l| DebugLock { tag: l.tag, key: l.key, acquired_ms: l.acquired_ms })
            .collect();
        let store = self
            .store
            .iter()
            .map(|(k, e)| DebugEntry { key: k.clone(), value: e.value.clone(), lease_expiry_ms: e.lease_expiry_ms })
            .collect();
        DebugState {
            locks,
            store,
            sweepers: SweeperStatus {
                last_lock_sweep_ms: self.last_lock_sweep_ms,
                last_lease_sweep_ms: self.last_lease_sweep_ms,
            },
        }
    }

    /// Lock-sweep: remove every lock whose `acquired_ms + ttl <= now`.
    pub fn lock_sweep(&mut self) {
        let now = self.clock.now_ms();
        let reclaimed = self.locks.sweep_expired(now, self.config.lock_ttl_ms);
        self.last_lock_sweep_ms = now;
        if !reclaimed.is_empty() {
            debug!(node = %self.node, count = reclaimed.len(), "lock sweep reclaimed stale locks");
        }
    }

    /// Lease-sweep: delete expired entries, but only those with no
    /// live write-lock on their key -- that join is what keeps a key
    /// currently being rewritten from being observed as momentarily
    /// missing.
    pub fn lease_sweep(&mut self) {
        let now = self.clock.now_ms();
        let expired = self.store.keys_with_expired_leases(now);
        let mut reclaimed = 0;
        for key in expired {
            if !self.locks.is_locked(&key) {
                self.store.remove(&key);
                reclaimed += 1;
            }
        }
        self.last_lease_sweep_ms = now;
        if reclaimed > 0 {
            debug!(node = %self.node, count = reclaimed, "lease sweep reclaimed expired entries");
        }
    }
}

/// Drives a `Replica` on a dedicated thread: one thread relays inbound
/// RPCs from the transport's inbox, two ticker threads inject periodic
/// sweep messages, and the replica's own thread drains all three through
/// a single channel so every operation -- requests and sweeps alike --
/// is strictly serialized.
pub fn spawn<K, V, C>(mut replica: Replica<K, V, C>, inbox: Inbox<K, V>) -> thread::JoinHandle<()>
where
    K: Clone + Eq + std::hash::Hash + std::fmt::Debug + Send + 'static,
    V: Clone + Eq + std::fmt::Debug + Send + 'static,
    C: Clock + 'static,
{
    enum Msg<K, V> {
        Call(Envelope<K, V>),
        LockSweep,
        LeaseSweep,
    }

    let (tx, rx) = mpsc::channel::<Msg<K, V>>();

    let relay_tx = tx.clone();
    thread::spawn(move || {
        while let Ok(env) = inbox.recv() {
            if relay_tx.send(Msg::Call(env)).is_err() {
                break;
            }
        }
    });

    let lock_sweep_period = Duration::from_millis(replica.config.lock_sweep_period_ms);
    let lock_tx = tx.clone();
    thread::spawn(move || loop {
        thread::sleep(lock_sweep_period);
        if lock_tx.send(Msg::LockSweep).is_err() {
            break;
        }
    });

    let lease_sweep_period = Duration::from_millis(replica.config.lease_sweep_period_ms);
    let lease_tx = tx;
    thread::spawn(move || loop {
        thread::sleep(lease_sweep_period);
        if lease_tx.send(Msg::LeaseSweep).is_err() {
            break;
        }
    });

    thread::spawn(move || {
        info!(node = %replica.node(), "replica request handler started");
        while let Ok(msg) = rx.recv() {
            match msg {
                Msg::Call(env) => {
                    let reply = replica.handle(env.req);
                    env.reply(reply);
                }
                Msg::LockSweep => replica.lock_sweep(),
                Msg::LeaseSweep => replica.lease_sweep(),
            }
        }
        warn!(node = %replica.node(), "replica request handler exiting: all senders dropped");
    })
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use submerge_net::NodeID;
    use test_log::test;

    use super::*;
    use crate::clock::FakeClock;

    fn replica(primaries: &[u64], replicas: &[u64], w: u32) -> Replica<String, i64, FakeClock> {
        let membership = Membership::new(
            primaries.iter().copied().map(NodeID).collect(),
            replicas.iter().copied().map(NodeID).collect(),
            w,
        );
        Replica::new(NodeID(primaries[0]), membership, FakeClock::new(0), ReplicaConfig::default())
    }

    fn tag(seq: u64) -> Tag {
        Tag { node: NodeID(0), seq }
    }

    #[test]
    fn get_write_lock_then_write_installs_the_value() {
        let mut r = replica(&[0, 1, 2], &[], 2);
        let t = tag(1);
        assert!(matches!(r.handle(Request::GetWriteLock { key: "a".into(), expected: Expected::NotFound, tag: t }), Reply::Ok));
        assert!(matches!(r.handle(Request::Write { tag: t, key: "a".into(), value: 1, lease_length_ms: 1000 }), Reply::Ok));
        assert!(matches!(r.handle(Request::DirtyRead { key: "a".into() }), Reply::Value(1)));
        // The lock was released as part of commit, so a fresh attempt can proceed.
        assert!(matches!(
            r.handle(Request::GetWriteLock { key: "a".into(), expected: Expected::Value(1), tag: tag(2) }),
            Reply::Ok
        ));
    }

    #[test]
    fn second_lock_attempt_on_a_held_key_is_rejected() {
        let mut r = replica(&[0, 1, 2], &[], 2);
        assert!(matches!(
            r.handle(Request::GetWriteLock { key: "a".into(), expected: Expected::NotFound, tag: tag(1) }),
            Reply::Ok
        ));
        assert!(matches!(
            r.handle(Request::GetWriteLock { key: "a".into(), expected: Expected::NotFound, tag: tag(2) }),
            Reply::AlreadyLocked
        ));
    }

    #[test]
    fn get_write_lock_with_wrong_expected_value_is_rejected() {
        let mut r = replica(&[0, 1, 2], &[], 2);
        r.handle(Request::GetWriteLock { key: "a".into(), expected: Expected::NotFound, tag: tag(1) });
        r.handle(Request::Write { tag: tag(1), key: "a".into(), value: 1, lease_length_ms: 1000 });
        assert!(matches!(
            r.handle(Request::GetWriteLock { key: "a".into(), expected: Expected::Value(2), tag: tag(2) }),
            Reply::NotExpectedValue
        ));
    }

    #[test]
    fn release_checks_ownership_before_removing() {
        let mut r = replica(&[0, 1, 2], &[], 2);
        r.handle(Request::GetWriteLock { key: "a".into(), expected: Expected::NotFound, tag: tag(1) });
        r.handle(Request::Write { tag: tag(1), key: "a".into(), value: 1, lease_length_ms: 1000 });

        r.handle(Request::GetWriteLock { key: "a".into(), expected: Expected::Value(1), tag: tag(2) });
        assert!(matches!(
            r.handle(Request::Release { key: "a".into(), value: 2, tag: tag(2) }),
            Reply::NotOwner
        ));
        assert!(matches!(r.handle(Request::DirtyRead { key: "a".into() }), Reply::Value(1)));

        r.handle(Request::GetWriteLock { key: "a".into(), expected: Expected::Value(1), tag: tag(3) });
        assert!(matches!(r.handle(Request::Release { key: "a".into(), value: 1, tag: tag(3) }), Reply::Ok));
        assert!(matches!(r.handle(Request::DirtyRead { key: "a".into() }), Reply::NotFound));
    }

    #[test]
    fn extend_lease_installs_on_a_replica_but_not_a_primary() {
        let primaries: BTreeSet<NodeID> = [NodeID(0)].into_iter().collect();
        let replicas: BTreeSet<NodeID> = [NodeID(1)].into_iter().collect();

        let mut primary = Replica::new(NodeID(0), Membership::new(primaries.clone(), replicas.clone(), 1), FakeClock::new(0), ReplicaConfig::default());
        assert!(matches!(
            primary.handle(Request::ExtendLease { tag: tag(1), key: "a".into(), value: 1, extend_length_ms: 1000 }),
            Reply::NotFound
        ));

        let mut replica = Replica::new(NodeID(1), Membership::new(primaries, replicas, 1), FakeClock::new(0), ReplicaConfig::default());
        assert!(matches!(
            replica.handle(Request::ExtendLease { tag: tag(2), key: "a".into(), value: 1, extend_length_ms: 1000 }),
            Reply::Ok
        ));
        assert!(matches!(replica.handle(Request::DirtyRead { key: "a".into() }), Reply::Value(1)));
    }

    #[test]
    fn lock_sweep_reclaims_only_after_ttl() {
        let mut r = replica(&[0, 1, 2], &[], 2);
        r.handle(Request::GetWriteLock { key: "a".into(), expected: Expected::NotFound, tag: tag(1) });

        r.clock.advance(r.config.lock_ttl_ms - 1);
        r.lock_sweep();
        assert!(matches!(
            r.handle(Request::GetWriteLock { key: "a".into(), expected: Expected::NotFound, tag: tag(2) }),
            Reply::AlreadyLocked
        ));

        r.clock.advance(2);
        r.lock_sweep();
        assert!(matches!(
            r.handle(Request::GetWriteLock { key: "a".into(), expected: Expected::NotFound, tag: tag(3) }),
            Reply::Ok
        ));
    }

    #[test]
    fn lease_sweep_reclaims_expired_entries_but_not_locked_ones() {
        let mut r = replica(&[0, 1, 2], &[], 2);
        r.handle(Request::GetWriteLock { key: "a".into(), expected: Expected::NotFound, tag: tag(1) });
        r.handle(Request::Write { tag: tag(1), key: "a".into(), value: 1, lease_length_ms: 100 });

        // Re-lock the same key under a fresh tag so the entry is guarded
        // by a live write-lock when its lease lapses.
        r.handle(Request::GetWriteLock { key: "a".into(), expected: Expected::Value(1), tag: tag(2) });

        r.clock.advance(200);
        r.lease_sweep();
        assert!(matches!(r.handle(Request::DirtyRead { key: "a".into() }), Reply::Value(1)), "locked key must survive lease sweep");

        r.handle(Request::ReleaseWriteLock { tag: tag(2) });
        r.lease_sweep();
        assert!(matches!(r.handle(Request::DirtyRead { key: "a".into() }), Reply::NotFound));
    }

    #[test]
    fn debug_state_reports_locks_and_store_contents() {
        let mut r = replica(&[0, 1, 2], &[], 2);
        r.handle(Request::GetWriteLock { key: "a".into(), expected: Expected::NotFound, tag: tag(1) });
        r.handle(Request::Write { tag: tag(1), key: "a".into(), value: 1, lease_length_ms: 1000 });
        r.handle(Request::GetWriteLock { key: "b".into(), expected: Expected::NotFound, tag: tag(2) });

        let Reply::DebugState(state) = r.handle(Request::GetDebugState) else { panic!("expected DebugState") };
        assert_eq!(state.store.len(), 1);
        assert_eq!(state.store[0].key, "a");
        assert_eq!(state.locks.len(), 1);
        assert_eq!(state.locks[0].key, "b");
    }

    #[test]
    fn remove_node_mutates_only_local_membership() {
        let mut r = replica(&[0, 1, 2], &[], 2);
        assert!(matches!(r.handle(Request::RemoveNode { node: NodeID(2), reciprocal: false }), Reply::Ok));
        assert!(!r.membership().is_primary(NodeID(2)));
    }
}
