//! A bounded model check of the write-lock state machine's
//! quorum-intersection property: since each replica grants at most one
//! lock at a time, and any two majorities of a 3-node cluster share a
//! replica, two distinct coordinator attempts can never simultaneously
//! hold a majority. This explores every reachable state of a small (3
//! replica, 2 tag) instance rather than arguing it by hand.

use stateright::{Checker, Model, Property};

const REPLICAS: usize = 3;
const W: usize = 2;

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct LockState {
    // Which tag (if any) currently holds the write-lock on each replica.
    held_by: [Option<u8>; REPLICAS],
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
enum LockAction {
    Acquire { replica: usize, tag: u8 },
    Release { replica: usize },
}

struct QuorumModel;

impl Model for QuorumModel {
    type State = LockState;
    type Action = LockAction;

    fn init_states(&self) -> Vec<Self::State> {
        vec![LockState { held_by: [None; REPLICAS] }]
    }

    fn actions(&self, state: &Self::State, actions: &mut Vec<Self::Action>) {
        for replica in 0..REPLICAS {
            match state.held_by[replica] {
                None => {
                    for tag in 0u8..2 {
                        actions.push(LockAction::Acquire { replica, tag });
                    }
                }
                Some(_) => actions.push(LockAction::Release { replica }),
            }
        }
    }

    fn next_state(&self, state: &Self::State, action: Self::Action) -> Option<Self::State> {
        let mut next = state.clone();
        match action {
            LockAction::Acquire { replica, tag } => {
                if next.held_by[replica].is_some() {
                    return None;
                }
                next.held_by[replica] = Some(tag);
            }
            LockAction::Release { replica } => {
                next.held_by[replica] = None;
            }
        }
        Some(next)
    }

    fn properties(&self) -> Vec<Property<Self>> {
        vec![Property::always("no two tags both hold a write quorum", |_model, state| {
            let count = |tag: u8| state.held_by.iter().filter(|h| **h == Some(tag)).count();
            !(count(0) >= W && count(1) >= W)
        })]
    }
}

#[test]
fn quorum_intersection_prevents_two_simultaneous_majorities() {
    QuorumModel.checker().spawn_dfs().join().assert_properties();
}
