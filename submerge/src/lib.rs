//! Wires a whole Realm's worth of `Replica`s onto one `LoopbackTransport`
//! and hands back a `Coordinator` that can drive operations against them.
//! A real deployment would run one replica per process talking over a
//! socket transport, but that transport is an external collaborator this
//! workspace doesn't implement (see `submerge-net::Transport`) -- this is
//! the single-process multi-node stand-in used by the binary and by the
//! admin viewer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use submerge_coord::Coordinator;
use submerge_net::{LoopbackTransport, NodeID};
use submerge_store::{Membership, Replica, ReplicaConfig, SystemClock};

/// The whole-cluster configuration a node binary loads at startup:
/// membership, the per-replica tunables, and the coordinator's per-call
/// RPC deadline.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub primaries: Vec<u64>,
    pub replicas: Vec<u64>,
    pub w: u32,
    pub replica: ReplicaConfig,
    pub rpc_deadline_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            primaries: vec![0, 1, 2],
            replicas: vec![],
            w: 2,
            replica: ReplicaConfig::default(),
            rpc_deadline_ms: 1000,
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> submerge_base::Result<Config> {
        toml::from_str(s).map_err(submerge_base::Error::from)
    }

    fn membership(&self) -> Membership {
        Membership::new(
            self.primaries.iter().copied().map(NodeID).collect(),
            self.replicas.iter().copied().map(NodeID).collect(),
            self.w,
        )
    }
}

/// A running Realm: every configured node's `Replica` on its own thread,
/// all reachable through one shared `LoopbackTransport`.
pub struct Realm {
    pub transport: LoopbackTransport<String, String>,
    pub membership: Membership,
    pub deadline: Duration,
    _handles: Vec<std::thread::JoinHandle<()>>,
}

impl Realm {
    /// Starts a `Replica` thread for every node named in `config`'s
    /// membership, all sharing one in-process transport.
    pub fn start(config: &Config) -> Realm {
        let membership = config.membership();
        let transport: LoopbackTransport<String, String> = LoopbackTransport::new();
        let mut handles = Vec::new();
        for node in membership.all_nodes() {
            let inbox = transport.register(node);
            let replica = Replica::new(node, membership.clone(), SystemClock::new(), config.replica);
            handles.push(submerge_store::spawn(replica, inbox));
        }
        tracing::info!(nodes = membership.all_nodes().len(), w = config.w, "realm started");
        Realm {
            transport,
            membership,
            deadline: Duration::from_millis(config.rpc_deadline_ms),
            _handles: handles,
        }
    }

    /// A `Coordinator` identity for driving operations against this
    /// Realm; `coordinator_node` need not be one of the Realm's replicas.
    pub fn coordinator(&self, coordinator_node: NodeID) -> Coordinator<String, String, LoopbackTransport<String, String>> {
        Coordinator::new(coordinator_node, self.membership.clone(), self.transport.clone(), self.deadline)
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    /// Exercises the whole wiring path -- config, `Realm::start` (which
    /// logs via `tracing::info!`), and a coordinator driving a real
    /// operation against the spun-up replicas.
    #[test]
    fn realm_started_from_default_config_commits_a_lock() {
        let config = Config::default();
        let realm = Realm::start(&config);
        let coord = realm.coordinator(NodeID(0));
        let outcome = coord.lock("k".to_string(), "v".to_string(), 5000).expect("quorum");
        assert_eq!(outcome.committed, config.primaries.len());
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string(&config).expect("serialize");
        let parsed = Config::from_toml_str(&text).expect("parse");
        assert_eq!(parsed.primaries, config.primaries);
        assert_eq!(parsed.w, config.w);
    }
}
