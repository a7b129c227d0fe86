use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use bitvec::prelude::*;
use sha1::{Digest, Sha1};

use crate::metainfo::Metainfo;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {

    #[error(transparent)]
    Io(#[from] std::io::Error),

}

pub type Result<T> = std::result::Result<T, StoreError>;

// One file's placement within the torrent's flat byte-address space.
#[derive(Debug, Clone)]
pub struct FileSpan {
    pub path: PathBuf,
    pub length: usize,
    pub offset: usize,
}

impl FileSpan {
    pub fn byte_range(&self) -> Range<usize> {
        self.offset..(self.offset + self.length)
    }
}

// A piece whose bytes have been assembled (from the network, or read
// from local disk for seeding) but not yet verified against the
// expected hash.
#[derive(Debug, Clone)]
pub struct Piece {
    pub index: usize,
    pub data: Vec<u8>,
}

// Where a single piece's bytes live across the torrent's file set, as an
// ordered list of spans. Built once from the metainfo and immutable
// afterwards.
#[derive(Debug, Clone)]
struct FileOverlap {
    file_idx: usize,
    offset_in_file: usize,
    length: usize,
}

// Owns reconstructed piece data, the piece-file map, and bitfield
// bookkeeping for a single torrent. Reached only through the
// coordinator's mutex; this type has no internal locking of its own.
#[derive(Debug)]
pub struct PieceStore {
    piece_length: usize,
    total_length: usize,
    num_pieces: usize,
    piece_hashes: Vec<[u8; 20]>,
    files: Vec<FileSpan>,
    output_dir: PathBuf,

    pieces: HashMap<usize, Vec<u8>>,
    overlaps: Vec<Vec<FileOverlap>>,
}

impl PieceStore {

    pub fn new(metainfo: &Metainfo, output_dir: PathBuf) -> Self {
        let files = metainfo.files();
        let total_length = metainfo.total_length() as usize;
        let piece_length = metainfo.piece_length();
        let num_pieces = metainfo.num_pieces() as usize;
        let piece_hashes = metainfo.piece_hashes();

        let output_dir = if metainfo.is_multi_file() {
            output_dir.join(metainfo.name())
        } else {
            output_dir
        };

        let overlaps = (0..num_pieces)
            .map(|idx| build_overlap(idx, piece_length, total_length, &files))
            .collect();

        Self {
            piece_length,
            total_length,
            num_pieces,
            piece_hashes,
            files,
            output_dir,
            pieces: HashMap::new(),
            overlaps,
        }
    }

    pub fn exact_piece_length(&self, index: usize) -> usize {
        if index == self.num_pieces - 1 {
            self.total_length - self.piece_length * (self.num_pieces - 1)
        } else {
            self.piece_length
        }
    }

    pub fn num_pieces(&self) -> usize {
        self.num_pieces
    }

    pub fn has(&self, index: usize) -> bool {
        self.pieces.contains_key(&index)
    }

    // Inserts a verified piece, returning `true` if newly stored.
    // Duplicate, out-of-range, or hash-mismatching input is silently
    // dropped (idempotent).
    pub fn add(&mut self, piece: Piece) -> bool {
        if piece.index >= self.num_pieces || self.has(piece.index) {
            return false;
        }
        if piece.data.len() != self.exact_piece_length(piece.index) {
            return false;
        }
        let mut hasher = Sha1::new();
        hasher.update(&piece.data);
        let digest: [u8; 20] = hasher.finalize().into();
        if digest != self.piece_hashes[piece.index] {
            tracing::warn!(index = piece.index, "piece failed hash verification");
            return false;
        }
        self.pieces.insert(piece.index, piece.data);
        true
    }

    pub fn bitfield(&self) -> Vec<u8> {
        let mut bits: BitVec<u8, Msb0> = BitVec::repeat(false, self.num_pieces);
        for idx in self.pieces.keys() {
            bits.set(*idx, true);
        }
        bits.into_vec()
    }

    pub fn is_interested(&self, remote_bitfield: &BitSlice<u8, Msb0>) -> bool {
        remote_bitfield
            .iter()
            .by_vals()
            .take(self.num_pieces)
            .enumerate()
            .any(|(idx, has_it)| has_it && !self.has(idx))
    }

    pub fn complete(&self) -> bool {
        self.pieces.len() == self.num_pieces
    }

    // Returns a copy of a stored piece's bytes, for replying to REQUEST.
    pub fn piece_data(&self, index: usize) -> Option<Vec<u8>> {
        self.pieces.get(&index).cloned()
    }

    pub fn total_length(&self) -> usize {
        self.total_length
    }

    // Writes every stored piece to its file(s) under `self.output_dir`
    // (the save root `PieceStore::new` was given, plus the torrent name
    // for multi-file torrents), per the piece-file map, seeking each file
    // to the right offset. Intermediate directories are created as needed.
    pub fn export(&self) -> Result<()> {
        let dest = &self.output_dir;
        let mut handles: Vec<Option<std::fs::File>> = vec![None; self.files.len()];

        for idx in 0..self.num_pieces {
            let Some(data) = self.pieces.get(&idx) else { continue };
            let mut cursor = 0usize;
            for overlap in &self.overlaps[idx] {
                if handles[overlap.file_idx].is_none() {
                    let span = &self.files[overlap.file_idx];
                    let path = dest.join(&span.path);
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    let file = std::fs::OpenOptions::new()
                        .create(true)
                        .write(true)
                        .open(&path)?;
                    handles[overlap.file_idx] = Some(file);
                }
                let file = handles[overlap.file_idx].as_mut().unwrap();
                file.seek(SeekFrom::Start(overlap.offset_in_file as u64))?;
                file.write_all(&data[cursor..cursor + overlap.length])?;
                cursor += overlap.length;
            }
        }
        tracing::info!(dir = %dest.display(), "exported torrent content");
        Ok(())
    }

    // Reads local content in `piece_length` chunks, sorted depth-first by
    // relative path, hashing each with SHA-1 to populate the store for
    // seeding. `input` may be a single file or a directory tree.
    pub fn ingest(&mut self, input: &Path) -> Result<()> {
        if input.is_dir() {
            self.ingest_dir(input)
        } else {
            self.ingest_file(input)
        }
    }

    fn ingest_file(&mut self, path: &Path) -> Result<()> {
        let mut file = std::fs::File::open(path)?;
        let mut index = 0;
        loop {
            let mut buf = vec![0u8; self.piece_length];
            let n = read_fill(&mut file, &mut buf)?;
            if n == 0 {
                break;
            }
            buf.truncate(n);
            self.add(Piece { index, data: buf });
            index += 1;
        }
        Ok(())
    }

    fn ingest_dir(&mut self, root: &Path) -> Result<()> {
        let mut paths = Vec::new();
        collect_paths(root, root, &mut paths)?;
        paths.sort_by(|a, b| a.1.cmp(&b.1));

        let mut index = 0;
        let mut carry: Vec<u8> = Vec::new();
        for (abs_path, _rel) in paths {
            let mut file = std::fs::File::open(&abs_path)?;
            loop {
                let need = self.piece_length - carry.len();
                let mut buf = vec![0u8; need];
                let n = read_fill(&mut file, &mut buf)?;
                buf.truncate(n);
                carry.extend_from_slice(&buf);
                if carry.len() < self.piece_length {
                    break;
                }
                self.add(Piece { index, data: std::mem::take(&mut carry) });
                index += 1;
            }
        }
        if !carry.is_empty() {
            self.add(Piece { index, data: carry });
        }
        Ok(())
    }
}

fn read_fill(r: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = r.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

// Depth-first, sorted-by-name at each level; relative path recorded for
// the final cross-directory sort.
fn collect_paths(root: &Path, dir: &Path, out: &mut Vec<(PathBuf, String)>) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<std::result::Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            collect_paths(root, &path, out)?;
        } else {
            let rel = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().into_owned();
            out.push((path, rel));
        }
    }
    Ok(())
}

fn build_overlap(piece_idx: usize, piece_length: usize, total_length: usize, files: &[FileSpan]) -> Vec<FileOverlap> {
    let start = piece_idx * piece_length;
    let end = std::cmp::min(start + piece_length, total_length);

    let mut overlap = Vec::new();
    for (file_idx, span) in files.iter().enumerate() {
        let span_range = span.byte_range();
        let overlap_start = start.max(span_range.start);
        let overlap_end = end.min(span_range.end);
        if overlap_start < overlap_end {
            overlap.push(FileOverlap {
                file_idx,
                offset_in_file: overlap_start - span.offset,
                length: overlap_end - overlap_start,
            });
        }
    }
    overlap
}
