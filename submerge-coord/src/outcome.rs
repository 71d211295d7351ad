//! The coordinator's client-visible results. `NoQuorum` is the single
//! failure a caller needs to handle; everything else -- partial phase-2
//! commits included -- is reported as counts in `QuorumOutcome`, not as
//! an error.

use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct QuorumOutcome {
    pub w: u32,
    pub voted: usize,
    pub committed: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NoQuorum;

impl fmt::Display for NoQuorum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no quorum: insufficient phase-1 OK replies")
    }
}

impl std::error::Error for NoQuorum {}
