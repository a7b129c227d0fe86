use std::net::SocketAddr;

use bitswarm::{EngineConfig, Metainfo, Piece, PieceStore};
use sha1::{Digest, Sha1};

fn single_file_bencode(content: &[u8], piece_length: u32, name: &str) -> Vec<u8> {
    let mut pieces = Vec::new();
    for chunk in content.chunks(piece_length as usize) {
        let mut h = Sha1::new();
        h.update(chunk);
        pieces.extend_from_slice(&h.finalize());
    }

    let mut b = Vec::new();
    b.extend(b"d8:announce20:http://tracker.test/4:infod6:lengthi");
    b.extend(content.len().to_string().as_bytes());
    b.extend(b"e4:name");
    b.extend(name.len().to_string().as_bytes());
    b.push(b':');
    b.extend(name.as_bytes());
    b.extend(b"12:piece lengthi");
    b.extend(piece_length.to_string().as_bytes());
    b.extend(b"e6:pieces");
    b.extend(pieces.len().to_string().as_bytes());
    b.push(b':');
    b.extend(&pieces);
    b.extend(b"ee");
    b
}

fn multi_file_bencode(files: &[(&str, &[u8])], piece_length: u32, name: &str) -> Vec<u8> {
    let mut content = Vec::new();
    for (_, data) in files {
        content.extend_from_slice(data);
    }

    let mut pieces = Vec::new();
    for chunk in content.chunks(piece_length as usize) {
        let mut h = Sha1::new();
        h.update(chunk);
        pieces.extend_from_slice(&h.finalize());
    }

    let mut file_entries = Vec::new();
    for (path, data) in files {
        file_entries.extend(b"d6:lengthi".to_vec());
        file_entries.extend(data.len().to_string().as_bytes());
        file_entries.extend(b"e4:pathl");
        file_entries.extend(path.len().to_string().as_bytes());
        file_entries.push(b':');
        file_entries.extend(path.as_bytes());
        file_entries.extend(b"ee");
    }

    let mut b = Vec::new();
    b.extend(b"d8:announce20:http://tracker.test/4:infod5:filesl");
    b.extend(&file_entries);
    b.extend(b"e4:name");
    b.extend(name.len().to_string().as_bytes());
    b.push(b':');
    b.extend(name.as_bytes());
    b.extend(b"12:piece lengthi");
    b.extend(piece_length.to_string().as_bytes());
    b.extend(b"e6:pieces");
    b.extend(pieces.len().to_string().as_bytes());
    b.push(b':');
    b.extend(&pieces);
    b.extend(b"ee");
    b
}

#[test]
fn two_piece_multi_file_round_trips_through_export() -> anyhow::Result<()> {
    // a.txt(3) + b.txt(5) concatenated is "HELLOSIR"; piece length 4 splits
    // it into piece 0 = "HELL" (a.txt[0..3] + b.txt[0..1]) and piece 1 =
    // "OSIR" (b.txt[1..5]).
    let files: [(&str, &[u8]); 2] = [("a.txt", b"HEL"), ("b.txt", b"LOSIR")];
    let metainfo = Metainfo::from_bytes(&multi_file_bencode(&files, 4, "demo"))?;
    assert!(metainfo.is_multi_file());
    assert_eq!(metainfo.num_pieces(), 2);

    let tmp = tempfile::tempdir()?;
    let mut store = PieceStore::new(&metainfo, tmp.path().to_path_buf());

    store.add(Piece { index: 0, data: b"HELL".to_vec() });
    store.add(Piece { index: 1, data: b"OSIR".to_vec() });
    assert!(store.complete());

    store.export()?;
    let a = std::fs::read(tmp.path().join("demo").join("a.txt"))?;
    let b_file = std::fs::read(tmp.path().join("demo").join("b.txt"))?;
    assert_eq!(a, b"HEL");
    assert_eq!(b_file, b"LOSIR");
    Ok(())
}

#[test]
fn single_piece_single_file_round_trips_through_export() -> anyhow::Result<()> {
    let metainfo = Metainfo::from_bytes(&single_file_bencode(b"ABCD", 4, "a.bin"))?;
    assert_eq!(metainfo.num_pieces(), 1);

    let tmp = tempfile::tempdir()?;
    let mut store = PieceStore::new(&metainfo, tmp.path().to_path_buf());

    assert!(!store.has(0));
    let inserted = store.add(Piece { index: 0, data: b"ABCD".to_vec() });
    assert!(inserted);
    assert!(store.complete());

    store.export()?;
    let exported = std::fs::read(tmp.path().join("a.bin"))?;
    assert_eq!(exported, b"ABCD");
    Ok(())
}

#[test]
fn short_final_piece_bitfield_has_zeroed_trailing_bits() -> anyhow::Result<()> {
    let metainfo = Metainfo::from_bytes(&single_file_bencode(b"ABCDE", 4, "a.bin"))?;
    let tmp = tempfile::tempdir()?;
    let mut store = PieceStore::new(&metainfo, tmp.path().to_path_buf());

    assert_eq!(store.exact_piece_length(0), 4);
    assert_eq!(store.exact_piece_length(1), 1);

    store.add(Piece { index: 0, data: b"ABCD".to_vec() });
    store.add(Piece { index: 1, data: b"E".to_vec() });
    assert!(store.complete());
    assert_eq!(store.bitfield(), vec![0b1100_0000]);
    Ok(())
}

#[test]
fn integrity_rejection_leaves_piece_unstored() -> anyhow::Result<()> {
    let metainfo = Metainfo::from_bytes(&single_file_bencode(b"ABCD", 4, "a.bin"))?;
    let tmp = tempfile::tempdir()?;
    let mut store = PieceStore::new(&metainfo, tmp.path().to_path_buf());

    let inserted = store.add(Piece { index: 0, data: b"WXYZ".to_vec() });
    assert!(!inserted);
    assert!(!store.has(0));
    assert!(!store.complete());
    Ok(())
}

#[test]
fn rarest_first_tie_break_prefers_lower_index() -> anyhow::Result<()> {
    // Three pieces, none stored locally. Two remote peers report disjoint
    // knowledge so replica counts for pieces 0 and 2 tie at 1 while piece 1
    // has replica count 2; rarest-first with a tie must prefer index 0.
    let content = vec![0u8; 12];
    let metainfo = Metainfo::from_bytes(&single_file_bencode(&content, 4, "a.bin"))?;
    let config = EngineConfig {
        listen_address: "127.0.0.1:0".parse()?,
        output_dir: tempfile::tempdir()?.path().to_path_buf(),
        min_peers: 1,
        max_peers: 1,
    };
    let coordinator = std::sync::Arc::new(bitswarm::SwarmCoordinator::new(
        &metainfo,
        bitswarm::generate_peer_id(),
        config,
    ));

    let peer_a: SocketAddr = "127.0.0.1:1".parse()?;
    let peer_b: SocketAddr = "127.0.0.1:2".parse()?;

    // peer_a has pieces 0 and 1.
    coordinator.bitfield_received(peer_a, bitvec_of(&[true, true, false]));
    // peer_b has pieces 1 and 2.
    coordinator.bitfield_received(peer_b, bitvec_of(&[false, true, true]));

    let (index, length) = coordinator.request_piece_index().expect("a candidate piece exists");
    assert_eq!(index, 0);
    assert_eq!(length, 4);
    Ok(())
}

#[test]
fn disconnect_decrements_replica_counts() -> anyhow::Result<()> {
    let content = vec![0u8; 4];
    let metainfo = Metainfo::from_bytes(&single_file_bencode(&content, 4, "a.bin"))?;
    let config = EngineConfig {
        listen_address: "127.0.0.1:0".parse()?,
        output_dir: tempfile::tempdir()?.path().to_path_buf(),
        min_peers: 1,
        max_peers: 1,
    };
    let coordinator = bitswarm::SwarmCoordinator::new(&metainfo, bitswarm::generate_peer_id(), config);

    let peer: SocketAddr = "127.0.0.1:1".parse()?;
    coordinator.bitfield_received(peer, bitvec_of(&[true]));
    assert!(coordinator.request_piece_index().is_some());

    coordinator.stop(peer);
    // With the only peer gone, replica count for piece 0 returns to zero
    // but it's still a candidate (rarest-first only excludes pieces we
    // already have, not pieces with zero replicas).
    let (index, _) = coordinator.request_piece_index().expect("still a candidate");
    assert_eq!(index, 0);
    Ok(())
}

fn bitvec_of(bits: &[bool]) -> bitvec::vec::BitVec<u8, bitvec::order::Msb0> {
    let mut bv = bitvec::vec::BitVec::repeat(false, bits.len());
    for (idx, &b) in bits.iter().enumerate() {
        bv.set(idx, b);
    }
    bv
}
