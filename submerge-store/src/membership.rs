//! The locally known cluster shape. Replaced wholesale by `set_nodes`,
//! with `w` changed independently by `set_w`. There is no defined
//! behavior for `set_nodes` racing an in-flight coordinator operation
//! beyond "the serializer linearizes them" -- callers just see whatever
//! each per-node reply reports.

use std::collections::BTreeSet;

use submerge_net::NodeID;

#[derive(Clone, Debug)]
pub struct Membership {
    pub primaries: BTreeSet<NodeID>,
    pub replicas: BTreeSet<NodeID>,
    pub w: u32,
}

impl Membership {
    pub fn new(primaries: BTreeSet<NodeID>, replicas: BTreeSet<NodeID>, w: u32) -> Self {
        assert!(w >= 1, "w must be >= 1");
        Membership { primaries, replicas, w }
    }

    pub fn is_replica(&self, node: NodeID) -> bool {
        self.replicas.contains(&node)
    }

    pub fn is_primary(&self, node: NodeID) -> bool {
        self.primaries.contains(&node)
    }

    /// Primaries, for phase 1.
    pub fn primaries(&self) -> Vec<NodeID> {
        self.primaries.iter().copied().collect()
    }

    /// Primaries ∪ replicas, for phase 2.
    pub fn all_nodes(&self) -> Vec<NodeID> {
        self.primaries.union(&self.replicas).copied().collect()
    }

    pub fn set_nodes(&mut self, primaries: BTreeSet<NodeID>, replicas: BTreeSet<NodeID>) {
        self.primaries = primaries;
        self.replicas = replicas;
    }

    pub fn set_w(&mut self, w: u32) {
        assert!(w >= 1, "w must be >= 1");
        self.w = w;
    }

    /// Removes `node` from the primary set (and from replicas, in case it
    /// was listed as both, which shouldn't normally happen but costs
    /// nothing to handle).
    pub fn remove_node(&mut self, node: NodeID) {
        self.primaries.remove(&node);
        self.replicas.remove(&node);
    }
}
