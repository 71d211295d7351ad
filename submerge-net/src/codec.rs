//! Wire encoding for `Request`/`Reply`, for a socket-backed `Transport`'s
//! send/recv boundary. `LoopbackTransport` never calls these -- an
//! in-process channel has nothing to serialize -- but any real deployment
//! crossing an actual wire needs exactly this, in the same
//! encode-to-Vec/decode-from-slice shape the teacher's own
//! `Node::send_msg`/`decode_msg` uses for its own message type.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

use submerge_base::Result;
use crate::{Reply, Request};

pub fn encode_request<K: Serialize, V: Serialize>(req: &Request<K, V>) -> Result<Vec<u8>> {
    let buf = rmp_serde::to_vec(req)?;
    trace!(bytes = buf.len(), "encoded request");
    Ok(buf)
}

pub fn decode_request<K: DeserializeOwned, V: DeserializeOwned>(buf: &[u8]) -> Result<Request<K, V>> {
    let req = rmp_serde::from_slice(buf)?;
    trace!(bytes = buf.len(), "decoded request");
    Ok(req)
}

pub fn encode_reply<K: Serialize, V: Serialize>(reply: &Reply<K, V>) -> Result<Vec<u8>> {
    let buf = rmp_serde::to_vec(reply)?;
    trace!(bytes = buf.len(), "encoded reply");
    Ok(buf)
}

pub fn decode_reply<K: DeserializeOwned, V: DeserializeOwned>(buf: &[u8]) -> Result<Reply<K, V>> {
    let reply = rmp_serde::from_slice(buf)?;
    trace!(bytes = buf.len(), "decoded reply");
    Ok(reply)
}
