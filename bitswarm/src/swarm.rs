use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bitvec::prelude::*;

use crate::config::EngineConfig;
use crate::metainfo::Metainfo;
use crate::p2p;
use crate::store::{Piece, PieceStore};
use crate::tracker::{AnnounceParams, Event, TrackerClient, TrackerError};

#[derive(Debug, thiserror::Error)]
pub enum SwarmError {

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

}

// Everything the coordinator mutates behind its one mutex (§5): the
// piece store, the per-peer bitfield table, and the replica-count
// table.
struct SwarmState {
    store: PieceStore,
    peer_bitfields: HashMap<SocketAddr, BitVec<u8, Msb0>>,
    replica_counts: Vec<usize>,
}

impl SwarmState {

    fn apply_bitfield(&mut self, addr: SocketAddr, bitfield: BitVec<u8, Msb0>) {
        if let Some(old) = self.peer_bitfields.remove(&addr) {
            for (idx, had) in old.iter().by_vals().enumerate() {
                if had {
                    self.replica_counts[idx] = self.replica_counts[idx].saturating_sub(1);
                }
            }
        }
        for (idx, has_it) in bitfield.iter().by_vals().enumerate() {
            if has_it {
                self.replica_counts[idx] += 1;
            }
        }
        self.peer_bitfields.insert(addr, bitfield);
    }

    fn remove_peer(&mut self, addr: SocketAddr) {
        if let Some(old) = self.peer_bitfields.remove(&addr) {
            for (idx, had) in old.iter().by_vals().enumerate() {
                if had {
                    self.replica_counts[idx] = self.replica_counts[idx].saturating_sub(1);
                }
            }
        }
    }

    // Smallest replica count among pieces we lack, ties broken by lower
    // index.
    fn rarest_first(&self) -> Option<usize> {
        self.replica_counts
            .iter()
            .enumerate()
            .filter(|(idx, _)| !self.store.has(*idx))
            .min_by_key(|(idx, count)| (**count, *idx))
            .map(|(idx, _)| idx)
    }
}

// Owns the piece store and swarm state; the single synchronization
// point peer sessions consult via a narrow callback interface.
pub struct SwarmCoordinator {
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    announce_url: url::Url,
    config: EngineConfig,

    state: Mutex<SwarmState>,
    tracker: TrackerClient,
    shutdown: AtomicBool,
    uploaded: std::sync::atomic::AtomicU64,
}

impl SwarmCoordinator {

    pub fn new(metainfo: &Metainfo, peer_id: [u8; 20], config: EngineConfig) -> Self {
        let store = PieceStore::new(metainfo, config.output_dir.clone());
        let num_pieces = store.num_pieces();

        Self {
            info_hash: metainfo.info_hash,
            peer_id,
            announce_url: metainfo.announce_url().clone(),
            tracker: TrackerClient::new(metainfo.announce_url().clone()),
            config,
            state: Mutex::new(SwarmState {
                store,
                peer_bitfields: HashMap::new(),
                replica_counts: vec![0; num_pieces],
            }),
            shutdown: AtomicBool::new(false),
            uploaded: std::sync::atomic::AtomicU64::new(0),
        }
    }

    // Populates the store from local content for seeding, ahead of the
    // initial STARTED announce.
    pub fn seed_from(&self, path: &std::path::Path) -> crate::store::Result<()> {
        self.state.lock().expect("swarm mutex poisoned").store.ingest(path)
    }

    pub fn info_hash(&self) -> [u8; 20] {
        self.info_hash
    }

    pub fn peer_id(&self) -> [u8; 20] {
        self.peer_id
    }

    pub fn num_pieces(&self) -> usize {
        self.state.lock().expect("swarm mutex poisoned").store.num_pieces()
    }

    pub fn is_complete(&self) -> bool {
        self.state.lock().expect("swarm mutex poisoned").store.complete()
    }

    // --- coordinator callback interface (§4.4) ---

    pub fn bitfield_received(&self, addr: SocketAddr, bitfield: BitVec<u8, Msb0>) -> bool {
        let mut state = self.state.lock().expect("swarm mutex poisoned");
        let interested = state.store.is_interested(&bitfield);
        state.apply_bitfield(addr, bitfield);
        interested
    }

    pub fn request_bitfield(&self) -> Vec<u8> {
        self.state.lock().expect("swarm mutex poisoned").store.bitfield()
    }

    pub fn request_piece_index(&self) -> Option<(usize, usize)> {
        let state = self.state.lock().expect("swarm mutex poisoned");
        let index = state.rarest_first()?;
        Some((index, state.store.exact_piece_length(index)))
    }

    pub fn request_piece(&self, index: usize) -> Option<Vec<u8>> {
        let state = self.state.lock().expect("swarm mutex poisoned");
        if !state.store.has(index) {
            return None;
        }
        // The store doesn't expose stored bytes directly outside of
        // export; re-read via a narrow accessor kept next to `has`.
        state.store.piece_data(index)
    }

    pub fn piece_received(&self, index: usize, _begin: usize, block: Vec<u8>) -> bool {
        let mut state = self.state.lock().expect("swarm mutex poisoned");
        let was_complete = state.store.complete();
        state.store.add(Piece { index, data: block });
        let now_complete = state.store.complete();

        if !was_complete && now_complete {
            if let Err(e) = state.store.export() {
                tracing::error!(error = %e, "failed to export completed torrent");
            }
            drop(state);
            if let Err(e) = self.announce(Event::Completed) {
                tracing::warn!(error = %e, "completed announce failed");
            }
            return true;
        }
        now_complete
    }

    pub fn stop(&self, addr: SocketAddr) {
        self.state.lock().expect("swarm mutex poisoned").remove_peer(addr);
        tracing::debug!(%addr, "peer session removed from swarm state");
    }

    // --- lifecycle ---

    fn announce(&self, event: Event) -> Result<Vec<SocketAddr>, SwarmError> {
        let (left, total) = {
            let state = self.state.lock().expect("swarm mutex poisoned");
            let total = state.store.total_length() as u64;
            let have: u64 = (0..state.store.num_pieces())
                .filter(|i| state.store.has(*i))
                .map(|i| state.store.exact_piece_length(i) as u64)
                .sum();
            (total.saturating_sub(have), total)
        };
        let _ = total;

        let params = AnnounceParams {
            info_hash: self.info_hash,
            peer_id: self.peer_id,
            ip: self.config.listen_address.ip(),
            port: self.config.listen_address.port(),
            uploaded: self.uploaded.load(Ordering::Relaxed),
            downloaded: 0,
            left,
        };
        let resp = self.tracker.announce(&params, event)?;
        Ok(resp
            .peers
            .into_iter()
            .map(|p| SocketAddr::new(p.ip, p.port))
            .collect())
    }

    // Starts the listener and dials the peers returned by the initial
    // announce. Blocks the calling thread until `shutdown` is called
    // from another thread.
    pub fn run(self: &Arc<Self>) -> Result<(), SwarmError> {
        let peers = self.announce(Event::Started)?;
        tracing::info!(count = peers.len(), "tracker returned peers");

        let listener = TcpListener::bind(self.config.listen_address)?;
        listener.set_nonblocking(false)?;

        let listener_handle = self.clone().spawn_listener(listener);

        let mut outbound: Vec<JoinHandle<()>> = Vec::new();
        for addr in peers.into_iter().take(self.config.max_peers) {
            outbound.push(self.clone().spawn_outbound(addr));
        }

        listener_handle.join().ok();
        for handle in outbound {
            handle.join().ok();
        }
        Ok(())
    }

    fn spawn_listener(self: Arc<Self>, listener: TcpListener) -> JoinHandle<()> {
        thread::Builder::new()
            .name("swarm-listener".into())
            .spawn(move || {
                listener.set_nonblocking(true).ok();
                while !self.shutdown.load(Ordering::Relaxed) {
                    match listener.accept() {
                        Ok((stream, addr)) => {
                            stream.set_nonblocking(false).ok();
                            self.clone().spawn_inbound(stream, addr);
                        },
                        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                            thread::sleep(Duration::from_secs(1));
                        },
                        Err(e) => {
                            tracing::warn!(error = %e, "listener accept error");
                            thread::sleep(Duration::from_secs(1));
                        },
                    }
                }
            })
            .expect("failed to spawn listener thread")
    }

    fn spawn_inbound(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        p2p::spawn_session(addr, stream, self, true);
    }

    // Short-lived: its only job is the blocking connect call. On success
    // it hands the socket off to a dedicated session thread and exits.
    fn spawn_outbound(self: Arc<Self>, addr: SocketAddr) -> JoinHandle<()> {
        let coordinator = self.clone();
        thread::Builder::new()
            .name(format!("connect-{addr}"))
            .spawn(move || {
                match TcpStream::connect_timeout(&addr, Duration::from_secs(10)) {
                    Ok(stream) => {
                        p2p::spawn_session(addr, stream, coordinator, false);
                    },
                    Err(e) => {
                        tracing::warn!(%addr, error = %e, "outbound connect failed");
                    },
                }
            })
            .expect("failed to spawn outbound connect thread")
    }

    // Signals the listener to stop and sends a final STOPPED announce.
    // Existing peer sessions are not forcibly killed; they exit on their
    // own socket close.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Err(e) = self.announce(Event::Stopped) {
            tracing::warn!(error = %e, "stopped announce failed");
        }
    }

    pub fn announce_url(&self) -> &url::Url {
        &self.announce_url
    }
}
