use rand::Rng;

const CLIENT_TAG: &[u8; 8] = b"-PY0001-";

/// Generates a stable 20-byte peer id for the process lifetime:
/// `-PY0001-` followed by 12 random ASCII letters/digits.
pub fn generate_peer_id() -> [u8; 20] {
    let mut id = [0u8; 20];
    id[..8].copy_from_slice(CLIENT_TAG);

    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    for slot in id[8..].iter_mut() {
        *slot = ALPHABET[rng.gen_range(0..ALPHABET.len())];
    }
    id
}
