mod config;
mod de;
mod id;
mod metainfo;
mod p2p;
mod store;
mod swarm;
mod tracker;

pub use config::EngineConfig;
pub use id::generate_peer_id;
pub use metainfo::{Metainfo, MetainfoError};
pub use store::{FileSpan, Piece, PieceStore, StoreError};
pub use swarm::{SwarmCoordinator, SwarmError};
pub use tracker::{AnnounceParams, AnnounceResponse, Event, ScrapeResponse, TrackerClient, TrackerError};
