use std::net::SocketAddr;
use std::sync::Arc;

use bitvec::prelude::*;

use super::{Handshake, Message, PeerError, Result, SessionState};
use crate::swarm::SwarmCoordinator;

// Drives one peer connection start to finish on its own OS thread.
// Message handling is strictly sequential in wire order; the only
// shared state touched is the coordinator, reached through its own
// mutex.
pub struct PeerSession {
    address: SocketAddr,
    stream: std::net::TcpStream,
    coordinator: Arc<SwarmCoordinator>,
    state: SessionState,
}

impl PeerSession {

    pub fn new(address: SocketAddr, stream: std::net::TcpStream, coordinator: Arc<SwarmCoordinator>) -> Self {
        Self {
            address,
            stream,
            coordinator,
            state: SessionState::default(),
        }
    }

    pub fn run(&mut self, inbound: bool) -> Result<()> {
        self.exchange_handshake(inbound)?;

        let bitfield = self.coordinator.request_bitfield();
        Message::Bitfield(bitfield).write_to(&mut self.stream)?;

        loop {
            let msg = match Message::read_from(&mut self.stream) {
                Ok(msg) => msg,
                Err(PeerError::Io(e)) if is_clean_eof(&e) => {
                    tracing::debug!(address = %self.address, "peer closed connection");
                    return Ok(());
                },
                Err(e) => return Err(e),
            };
            tracing::trace!(address = %self.address, %msg, "received");
            self.handle_message(msg)?;
        }
    }

    fn exchange_handshake(&mut self, inbound: bool) -> Result<()> {
        let local = Handshake::new(self.coordinator.info_hash(), self.coordinator.peer_id());

        if !inbound {
            local.write_to(&mut self.stream)?;
        }

        let remote = Handshake::read_from(&mut self.stream)?;
        if remote.info_hash != self.coordinator.info_hash() {
            return Err(PeerError::IncorrectInfoHash);
        }

        if inbound {
            local.write_to(&mut self.stream)?;
        }

        tracing::info!(address = %self.address, "handshake complete");
        Ok(())
    }

    fn handle_message(&mut self, msg: Message) -> Result<()> {
        match msg {

            Message::KeepAlive => {},

            Message::Bitfield(bits) => {
                let num_pieces = self.coordinator.num_pieces();
                let mut bitvec: BitVec<u8, Msb0> = BitVec::from_vec(bits);
                bitvec.truncate(num_pieces);
                let interested = self.coordinator.bitfield_received(self.address, bitvec.clone());
                self.state.remote_bitfield = Some(bitvec);
                self.send_interest(interested)?;
            },

            Message::Have { index } => {
                let num_pieces = self.coordinator.num_pieces();
                self.state.set_have(index as usize, num_pieces);
                if let Some(bits) = self.state.remote_bitfield.clone() {
                    let interested = self.coordinator.bitfield_received(self.address, bits);
                    if interested != self.state.am_interested {
                        self.send_interest(interested)?;
                    }
                }
            },

            Message::Interested => {
                self.state.peer_interested = true;
                self.state.am_choking = false;
                Message::Unchoke.write_to(&mut self.stream)?;
            },

            Message::NotInterested => {
                self.state.peer_interested = false;
            },

            Message::Unchoke => {
                self.state.peer_choking = false;
                if self.state.am_interested {
                    self.request_next_piece()?;
                }
            },

            Message::Choke => {
                self.state.peer_choking = true;
            },

            Message::Request { index, begin, length } => {
                if self.state.am_choking {
                    return Ok(());
                }
                if let Some(data) = self.coordinator.request_piece(index as usize) {
                    let _ = length;
                    Message::Piece { index, begin, block: data }.write_to(&mut self.stream)?;
                }
            },

            Message::Piece { index, begin, block } => {
                let complete = self.coordinator.piece_received(index as usize, begin as usize, block);
                if complete {
                    self.state.am_interested = false;
                    Message::NotInterested.write_to(&mut self.stream)?;
                } else {
                    self.request_next_piece()?;
                }
            },

            Message::Cancel { .. } => {},
        }
        Ok(())
    }

    fn send_interest(&mut self, interested: bool) -> Result<()> {
        self.state.am_interested = interested;
        if interested {
            Message::Interested.write_to(&mut self.stream)?;
        } else {
            Message::NotInterested.write_to(&mut self.stream)?;
        }
        Ok(())
    }

    fn request_next_piece(&mut self) -> Result<()> {
        if self.state.peer_choking {
            return Ok(());
        }
        match self.coordinator.request_piece_index() {
            Some((index, length)) => {
                Message::Request { index: index as u32, begin: 0, length: length as u32 }
                    .write_to(&mut self.stream)?;
            },
            None => {
                self.state.am_interested = false;
                Message::NotInterested.write_to(&mut self.stream)?;
            },
        }
        Ok(())
    }
}

fn is_clean_eof(e: &std::io::Error) -> bool {
    matches!(e.kind(), std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::ConnectionReset)
}
