//! The in-memory key/value table. Invariant: no entry's value is ever the
//! `NotFound` sentinel -- `Store` only ever holds concrete `V`s, which is
//! why it doesn't use `Expected<V>` at all; absence is just `None`.

use std::collections::HashMap;
use std::hash::Hash;

use submerge_net::Millis;

#[derive(Clone, Debug)]
pub struct StoreEntry<V> {
    pub value: V,
    pub lease_expiry_ms: Millis,
}

#[derive(Default)]
pub struct Store<K, V> {
    entries: HashMap<K, StoreEntry<V>>,
}

impl<K: Eq + Hash + Clone, V: Eq + Clone> Store<K, V> {
    pub fn new() -> Self {
        Store {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<&StoreEntry<V>> {
        self.entries.get(key)
    }

    /// Unconditionally installs `(key, value, now + lease_length_ms)`,
    /// overwriting whatever was there. This is the commit step of `write`
    /// -- the replica trusts the coordinator's quorum and performs no
    /// precondition check here.
    pub fn put(&mut self, key: K, value: V, lease_expiry_ms: Millis) {
        self.entries.insert(key, StoreEntry { value, lease_expiry_ms });
    }

    /// Removes `key` iff its stored value equals `expected`. Returns
    /// whether the entry existed at all, distinguishing `ERR_NOT_OWNER`
    /// from `ERR_NOT_FOUND` at the call site.
    pub fn remove_if_value_eq(&mut self, key: &K, expected: &V) -> RemoveOutcome {
        match self.entries.get(key) {
            None => RemoveOutcome::Absent,
            Some(entry) if &entry.value == expected => {
                self.entries.remove(key);
                RemoveOutcome::Removed
            }
            Some(_) => RemoveOutcome::ValueMismatch,
        }
    }

    /// Unconditional removal, used by the lease sweeper once it has
    /// confirmed the key isn't guarded by a live write-lock.
    pub fn remove(&mut self, key: &K) {
        self.entries.remove(key);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &StoreEntry<V>)> {
        self.entries.iter()
    }

    pub fn keys_with_expired_leases(&self, now: Millis) -> Vec<K> {
        self.entries
            .iter()
            .filter(|(_, e)| e.lease_expiry_ms < now)
            .map(|(k, _)| k.clone())
            .collect()
    }
}

pub enum RemoveOutcome {
    Removed,
    Absent,
    ValueMismatch,
}
