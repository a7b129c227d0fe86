use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

mod handshake;
mod message;
pub mod state;
mod session;

pub use handshake::{Handshake, PROTOCOL};
pub use message::Message;
pub use session::PeerSession;
pub use state::SessionState;

use crate::swarm::SwarmCoordinator;

pub type Result<T> = std::result::Result<T, PeerError>;

#[derive(thiserror::Error, Debug)]
pub enum PeerError {

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("handshake provided incorrect protocol")]
    IncorrectProtocol,

    #[error("handshake provided incorrect info-hash")]
    IncorrectInfoHash,

    #[error("connection closed before handshake completed")]
    NoHandshake,

    #[error("invalid message ID: {0}")]
    InvalidMessageId(u8),

    #[error("message body too short for its type")]
    MalformedMessage,

}

// Spawns a thread running a peer session over an already-connected
// socket. `inbound` tells the session whether it must wait for the
// remote's handshake first or send its own first (either side may send
// first on outbound, per the spec; only the ordering of validation
// differs).
pub fn spawn_session(
    address: SocketAddr,
    stream: std::net::TcpStream,
    coordinator: Arc<SwarmCoordinator>,
    inbound: bool,
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name(format!("peer-{address}"))
        .spawn(move || {
            let mut session = PeerSession::new(address, stream, coordinator.clone());
            if let Err(e) = session.run(inbound) {
                tracing::warn!(%address, error = %e, "peer session ended with error");
            }
            coordinator.stop(address);
        })
        .expect("failed to spawn peer session thread")
}
