use serde::{Deserialize, Serialize};

/// DEFAULT_BIND_ADDRESS is the default address the shard write server binds to.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8088";

/// Config holds the settings of the shard write server.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub bind_address: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
        }
    }
}
