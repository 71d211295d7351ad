//! Concurrent RPC fan-out: one thread per target node, joined with a
//! deadline. The deadline itself is enforced by the `Transport` impl (it
//! takes the deadline as an argument); this module only parallelizes
//! across targets so the coordinator's total latency is bounded by the
//! slowest responder, not the sum of all of them.

use std::thread;
use std::time::Duration;

use submerge_net::{KvData, NodeID, Reply, Request, Transport, TransportError};

pub struct FanOutReply<K, V> {
    pub node: NodeID,
    pub reply: Result<Reply<K, V>, TransportError>,
}

/// Sends `req` to every node in `targets` concurrently, returning one
/// `FanOutReply` per target in arbitrary order (the caller classifies
/// and counts; order never matters to the protocol).
pub fn fan_out<K, V, T>(transport: &T, targets: &[NodeID], req: &Request<K, V>, deadline: Duration) -> Vec<FanOutReply<K, V>>
where
    K: KvData,
    V: KvData,
    T: Transport<K, V>,
{
    thread::scope(|scope| {
        let handles: Vec<_> = targets
            .iter()
            .map(|&node| {
                let req = req.clone();
                scope.spawn(move || FanOutReply { node, reply: transport.call(node, req, deadline) })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("fan-out worker thread panicked")).collect()
    })
}

/// Same as `fan_out` but the caller doesn't want the replies, only that
/// every call was sent; used for the best-effort `release_write_lock`
/// cleanup broadcasts, where the coordinator has already decided on its
/// own outcome and just wants the cluster's dangling locks cleaned up.
pub fn fan_out_best_effort<K, V, T>(transport: &T, targets: &[NodeID], req: &Request<K, V>, deadline: Duration)
where
    K: KvData,
    V: KvData,
    T: Transport<K, V>,
{
    let _ = fan_out(transport, targets, req, deadline);
}
