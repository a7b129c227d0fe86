use bitvec::prelude::*;

// Per-connection state vector (§3). Initial values: am_choking=true,
// am_interested=false, peer_choking=true, peer_interested=false.
#[derive(Debug, Clone)]
pub struct SessionState {

    pub am_choking: bool,
    pub am_interested: bool,
    pub peer_choking: bool,
    pub peer_interested: bool,

    // Set once on BITFIELD receipt; extended/updated by HAVE.
    pub remote_bitfield: Option<BitVec<u8, Msb0>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            am_choking: true,
            am_interested: false,
            peer_choking: true,
            peer_interested: false,
            remote_bitfield: None,
        }
    }
}

impl SessionState {

    // Sets bit `index`, initialising an all-zero bitfield of `num_pieces`
    // bits first if none has been received yet.
    pub fn set_have(&mut self, index: usize, num_pieces: usize) {
        let bits = self.remote_bitfield.get_or_insert_with(|| BitVec::repeat(false, num_pieces));
        if index < bits.len() {
            bits.set(index, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_matches_initial_vector() {
        let state = SessionState::default();
        assert!(state.am_choking);
        assert!(!state.am_interested);
        assert!(state.peer_choking);
        assert!(!state.peer_interested);
        assert!(state.remote_bitfield.is_none());
    }

    #[test]
    fn set_have_initialises_bitfield_lazily() {
        let mut state = SessionState::default();
        state.set_have(2, 4);
        let bits = state.remote_bitfield.as_ref().unwrap();
        assert_eq!(bits.len(), 4);
        assert!(bits[2]);
        assert!(!bits[0]);
    }
}
