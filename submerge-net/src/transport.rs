//! `Transport` is the seam between this protocol and whatever actually
//! moves bytes between nodes. The protocol only relies on: reliable,
//! ordered, point-to-point request/reply, with a caller-supplied
//! deadline per call. Everything past that (sockets, retries at the
//! transport layer, TLS, ...) is out of scope and left to the embedder.
//!
//! `LoopbackTransport` is the one implementation this crate ships: an
//! in-process registry of replica inboxes, used by tests and by a
//! single-process multi-node demo.

use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{NodeID, Reply, Request};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportError {
    /// No route to the target node (not registered, or gone).
    Unreachable,
    /// A route exists but no reply arrived within the deadline.
    Timeout,
}

pub trait Transport<K, V>: Send + Sync {
    fn call(&self, target: NodeID, req: Request<K, V>, deadline: Duration) -> Result<Reply<K, V>, TransportError>;
}

/// One pending call: a request plus the one-shot channel its reply goes
/// back on. `Inbox<K, V>` is what a replica's request-handling thread
/// drains.
pub struct Envelope<K, V> {
    pub req: Request<K, V>,
    reply_tx: Sender<Reply<K, V>>,
}

impl<K, V> Envelope<K, V> {
    pub fn reply(self, reply: Reply<K, V>) {
        // The caller may have already timed out and dropped its receiver;
        // that's fine, there's nobody left to tell.
        let _ = self.reply_tx.send(reply);
    }
}

pub type Inbox<K, V> = mpsc::Receiver<Envelope<K, V>>;

#[derive(Clone)]
pub struct LoopbackTransport<K, V> {
    routes: Arc<Mutex<HashMap<NodeID, Sender<Envelope<K, V>>>>>,
}

impl<K, V> Default for LoopbackTransport<K, V> {
    fn default() -> Self {
        LoopbackTransport {
            routes: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, V> LoopbackTransport<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a replica's inbox under `node`, returning the receiving
    /// end the replica's request-handling thread should drain.
    pub fn register(&self, node: NodeID) -> Inbox<K, V> {
        let (tx, rx) = mpsc::channel();
        self.routes.lock().expect("routes lock poisoned").insert(node, tx);
        rx
    }

    pub fn unregister(&self, node: NodeID) {
        self.routes.lock().expect("routes lock poisoned").remove(&node);
    }
}

impl<K: Send + 'static, V: Send + 'static> Transport<K, V> for LoopbackTransport<K, V> {
    fn call(&self, target: NodeID, req: Request<K, V>, deadline: Duration) -> Result<Reply<K, V>, TransportError> {
        let route = {
            let routes = self.routes.lock().expect("routes lock poisoned");
            routes.get(&target).cloned()
        };
        let Some(route) = route else {
            return Err(TransportError::Unreachable);
        };
        let (reply_tx, reply_rx) = mpsc::channel();
        if route.send(Envelope { req, reply_tx }).is_err() {
            return Err(TransportError::Unreachable);
        }
        match reply_rx.recv_timeout(deadline) {
            Ok(reply) => Ok(reply),
            Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Unreachable),
        }
    }
}
