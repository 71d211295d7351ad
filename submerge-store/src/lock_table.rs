//! The per-key write-lock table. Invariant: at most one `WriteLock` per
//! key exists on a given node at any moment -- enforced here by keying
//! one of the two indexes on `K` itself, so a second acquisition attempt
//! for an already-locked key can't even construct a conflicting entry.
//!
//! Representation note: a small association list would satisfy the
//! contract (O(locks) `is_locked`, O(1) remove-by-tag) just as well; this
//! uses a hash map keyed by tag plus an index by key so both directions
//! are O(1), which costs nothing extra once `K: Hash`.

use std::collections::HashMap;
use std::hash::Hash;

use submerge_net::{Millis, Tag};

#[derive(Clone, Debug)]
pub struct WriteLock<K> {
    pub tag: Tag,
    pub key: K,
    pub acquired_ms: Millis,
}

#[derive(Default)]
pub struct LockTable<K> {
    by_key: HashMap<K, (Tag, Millis)>,
    by_tag: HashMap<Tag, K>,
}

impl<K: Eq + Hash + Clone> LockTable<K> {
    pub fn new() -> Self {
        LockTable {
            by_key: HashMap::new(),
            by_tag: HashMap::new(),
        }
    }

    pub fn is_locked(&self, key: &K) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn lock_for_key(&self, key: &K) -> Option<(Tag, Millis)> {
        self.by_key.get(key).copied()
    }

    /// Caller must have already checked `!is_locked(&key)`.
    pub fn acquire(&mut self, key: K, tag: Tag, now: Millis) {
        self.by_tag.insert(tag, key.clone());
        self.by_key.insert(key, (tag, now));
    }

    /// Removes the unique lock with `tag`, if any. O(1): the key lives in
    /// `by_tag` already.
    pub fn release_by_tag(&mut self, tag: Tag) -> bool {
        match self.by_tag.remove(&tag) {
            Some(key) => {
                self.by_key.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Removes every lock whose `acquired_ms + ttl_ms <= now`, returning
    /// the tags reclaimed (for logging).
    pub fn sweep_expired(&mut self, now: Millis, ttl_ms: u64) -> Vec<Tag> {
        let mut stale = Vec::new();
        for (tag, acquired_ms) in self.by_key.values() {
            if acquired_ms.saturating_add(ttl_ms) <= now {
                stale.push(*tag);
            }
        }
        for tag in &stale {
            self.release_by_tag(*tag);
        }
        stale
    }

    pub fn debug_locks(&self) -> Vec<WriteLock<K>> {
        let mut locks = Vec::new();
        for (key, (tag, acquired_ms)) in self.by_key.iter() {
            locks.push(WriteLock {
                tag: *tag,
                key: key.clone(),
                acquired_ms: *acquired_ms,
            });
        }
        locks
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use submerge_net::NodeID;

    fn tag(seq: u64) -> Tag {
        Tag { node: NodeID(1), seq }
    }

    #[test]
    fn acquire_then_is_locked() {
        let mut lt: LockTable<&'static str> = LockTable::new();
        assert!(!lt.is_locked(&"a"));
        lt.acquire("a", tag(1), Millis(0));
        assert!(lt.is_locked(&"a"));
    }

    #[test]
    fn release_by_tag_is_idempotent_in_effect() {
        let mut lt: LockTable<&'static str> = LockTable::new();
        lt.acquire("a", tag(1), Millis(0));
        assert!(lt.release_by_tag(tag(1)));
        assert!(!lt.release_by_tag(tag(1)));
        assert!(!lt.is_locked(&"a"));
    }

    #[test]
    fn sweep_expired_reclaims_only_stale_locks() {
        let mut lt: LockTable<&'static str> = LockTable::new();
        lt.acquire("old", tag(1), Millis(0));
        lt.acquire("new", tag(2), Millis(900));
        let reclaimed = lt.sweep_expired(Millis(1000), 1000);
        assert_eq!(reclaimed, vec![tag(1)]);
        assert!(!lt.is_locked(&"old"));
        assert!(lt.is_locked(&"new"));
    }
}

#[cfg(test)]
mod proptest_invariants {
    use super::*;
    use proptest::prelude::*;
    use submerge_net::NodeID;

    #[derive(Clone, Debug)]
    enum Op {
        Acquire { key: u8, seq: u64 },
        ReleaseByTag { seq: u64 },
        Sweep { now: u64, ttl: u64 },
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..4, 0u64..20).prop_map(|(key, seq)| Op::Acquire { key, seq }),
            (0u64..20).prop_map(|seq| Op::ReleaseByTag { seq }),
            (0u64..2000, 100u64..1500).prop_map(|(now, ttl)| Op::Sweep { now, ttl }),
        ]
    }

    proptest! {
        // At most one lock per key holds after any sequence of
        // acquire/release/sweep operations, regardless of how many
        // attempts raced for the same key.
        #[test]
        fn at_most_one_lock_per_key(ops in proptest::collection::vec(op(), 0..200)) {
            let mut lt: LockTable<u8> = LockTable::new();
            for op in ops {
                match op {
                    Op::Acquire { key, seq } => {
                        if !lt.is_locked(&key) {
                            lt.acquire(key, Tag { node: NodeID(0), seq }, Millis(seq * 10));
                        }
                    }
                    Op::ReleaseByTag { seq } => {
                        lt.release_by_tag(Tag { node: NodeID(0), seq });
                    }
                    Op::Sweep { now, ttl } => {
                        lt.sweep_expired(Millis(now), ttl);
                    }
                }
                for key in 0u8..4 {
                    let by_key_count = if lt.is_locked(&key) { 1 } else { 0 };
                    let by_tag_count = lt.debug_locks().iter().filter(|l| l.key == key).count();
                    prop_assert_eq!(by_key_count, by_tag_count.min(1));
                    prop_assert!(by_tag_count <= 1, "key {} has {} concurrent locks", key, by_tag_count);
                }
            }
        }
    }
}
