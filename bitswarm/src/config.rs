use std::net::SocketAddr;
use std::path::PathBuf;

// Engine-wide configuration, set once at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {

    // Address to bind the inbound listener to.
    pub listen_address: SocketAddr,

    // Directory completed content is exported into.
    pub output_dir: PathBuf,

    // Desired number of active peer sessions; the coordinator stops
    // opening new outbound connections once `max_peers` is reached.
    pub min_peers: usize,
    pub max_peers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:6881".parse().expect("valid default listen address"),
            output_dir: PathBuf::from("."),
            min_peers: 4,
            max_peers: 50,
        }
    }
}
