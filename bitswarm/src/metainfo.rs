use serde_derive::{Deserialize, Serialize};
use crate::store::FileSpan;

#[derive(Debug, thiserror::Error)]
pub enum MetainfoError {

    #[error("bencode error whilst decoding metainfo: {0}")]
    Bencode(#[from] bencode::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid pieces length, must be a non-empty multiple of 20 bytes")]
    InvalidPiecesLength,

    #[error("file(s) with size 0")]
    FileNoSize,

    #[error("file(s) with no path")]
    FileEmptyPath,

    #[error("file has an absolute path")]
    FileAbsolutePath,
}

// A single entry in a multi-file torrent's `info.files` list.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileEntry {

    #[serde(deserialize_with = "crate::de::path_deserialize")]
    pub path: std::path::PathBuf,

    pub length: u64,

}

#[derive(Clone, Deserialize, Serialize)]
pub struct Info {

    // File or directory name.
    pub name: String,

    // Concatenation of all 20-byte SHA-1 hash values, one per piece.
    #[serde(with = "serde_bytes")]
    pub pieces: Vec<u8>,

    // Number of bytes in each piece.
    #[serde(rename = "piece length")]
    pub piece_length: u32,

    // Length of the file in bytes. Present for single-file torrents.
    #[serde(default)]
    pub length: Option<u64>,

    // One entry per file. Present for multi-file torrents.
    #[serde(default)]
    pub files: Option<Vec<FileEntry>>,

}

impl Info {
    // Computes the SHA-1 of the bencoded info dict, the torrent's identity.
    fn info_hash(&self) -> Result<[u8; 20], MetainfoError> {
        use sha1::Digest;
        let mut hasher = sha1::Sha1::new();
        let encoded = bencode::encode_to_raw(&self)?;
        hasher.update(encoded);
        Ok(hasher.finalize().into())
    }
}

// Immutable typed view of a parsed torrent (§3). Created once at parse
// time; `info_hash` is computed then and never recomputed.
#[derive(Clone, Deserialize)]
pub struct Metainfo {

    #[serde(deserialize_with = "crate::de::url_deserialize")]
    pub announce: url::Url,

    pub info: Info,

    #[serde(skip)]
    pub info_hash: [u8; 20],

}

impl Metainfo {

    pub fn from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self, MetainfoError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MetainfoError> {
        let mut metainfo: Metainfo = bencode::decode_bytes(bytes)?;

        if metainfo.info.pieces.is_empty() || metainfo.info.pieces.len() % 20 != 0 {
            return Err(MetainfoError::InvalidPiecesLength);
        }

        for file in metainfo.info.files.iter().flatten() {
            if file.length == 0 {
                return Err(MetainfoError::FileNoSize);
            }
            if file.path.as_os_str().is_empty() {
                return Err(MetainfoError::FileEmptyPath);
            }
            if file.path.is_absolute() {
                return Err(MetainfoError::FileAbsolutePath);
            }
        }
        if metainfo.is_multi_file() {
            // Nothing else to validate: total_len() sums the files directly,
            // so the §3 invariant sum(files) == total_length holds by
            // construction.
        } else if metainfo.info.length == Some(0) {
            return Err(MetainfoError::FileNoSize);
        }

        metainfo.info_hash = metainfo.info.info_hash()?;
        tracing::debug!(
            name = %metainfo.info.name,
            num_pieces = metainfo.num_pieces(),
            "metainfo parsed",
        );
        Ok(metainfo)
    }

    pub fn piece_hashes(&self) -> Vec<[u8; 20]> {
        self.info.pieces
            .chunks_exact(20)
            .map(|c| c.try_into().expect("chunks_exact(20) yields 20-byte slices"))
            .collect()
    }

    pub fn piece_length(&self) -> usize {
        self.info.piece_length as usize
    }

    pub fn num_pieces(&self) -> u32 {
        self.info.pieces.len() as u32 / 20
    }

    pub fn is_multi_file(&self) -> bool {
        self.info.files.is_some()
    }

    pub fn total_length(&self) -> u64 {
        if let Some(files) = &self.info.files {
            files.iter().map(|f| f.length).sum()
        } else {
            self.info.length.unwrap_or(0)
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn announce_url(&self) -> &url::Url {
        &self.announce
    }

    // File spans in declaration order, each with its byte offset into the
    // torrent viewed as one flat array.
    pub fn files(&self) -> Vec<FileSpan> {
        if let Some(files) = &self.info.files {
            let mut offset = 0;
            files.iter().map(|f| {
                let span = FileSpan {
                    path: f.path.clone(),
                    length: f.length as usize,
                    offset,
                };
                offset += f.length as usize;
                span
            }).collect()
        } else {
            vec![FileSpan {
                path: self.info.name.clone().into(),
                length: self.info.length.unwrap_or(0) as usize,
                offset: 0,
            }]
        }
    }

    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }
}

impl std::fmt::Debug for Metainfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metainfo")
            .field("announce", &self.announce.as_str())
            .field("name", &self.info.name)
            .field("num_pieces", &self.num_pieces())
            .field("piece_length", &self.info.piece_length)
            .field("total_length", &self.total_length())
            .field("info_hash", &self.info_hash_hex())
            .finish()
    }
}
