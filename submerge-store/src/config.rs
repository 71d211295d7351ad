//! Protocol configuration, with the defaults from the external
//! interfaces table. `Serialize`/`Deserialize` so a node binary can load
//! these from a TOML file rather than hardcode them.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaConfig {
    pub default_lease_length_ms: u64,
    pub lock_ttl_ms: u64,
    pub lock_sweep_period_ms: u64,
    pub lease_sweep_period_ms: u64,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        ReplicaConfig {
            default_lease_length_ms: 2000,
            lock_ttl_ms: 1000,
            lock_sweep_period_ms: 1000,
            lease_sweep_period_ms: 10_000,
        }
    }
}
