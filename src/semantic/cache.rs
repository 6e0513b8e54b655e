//! Binary storage for the content-hash → vector cache.
//!
//! File format: embeddings.bin
//!
//! Header (47 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated):
//! - content_hash: [u8; 64] (lowercase hex, ASCII)
//! - embedding: [f32; dimensions] (little-endian)
//!
//! Entries are immutable once written: a changed post gets a new hash and
//! a new entry, never an in-place mutation. The file is a pure function of
//! the content that has passed through the model, safe to delete at any
//! time (deleting only forces recomputation).

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

/// Byte length of a hex-encoded content hash.
const HASH_LEN: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingCacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file uses different model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Invalid content hash key: {0}")]
    InvalidKey(String),

    #[error("Cannot store a zero-norm vector")]
    ZeroNormVector,
}

/// In-memory view of the persistent embedding cache.
///
/// The provider is the only writer; everyone else reads snapshots.
pub struct EmbeddingCache {
    path: PathBuf,
    model_id: [u8; 32],
    dimensions: usize,
    entries: HashMap<String, Vec<f32>>,
}

impl EmbeddingCache {
    /// Open the cache at `path` for the given model.
    ///
    /// A file produced by another model or an unsupported format version is
    /// discarded with a warning (vectors are recomputable); corruption or
    /// I/O problems surface as errors.
    pub fn open(
        path: PathBuf,
        model_id: [u8; 32],
        dimensions: usize,
    ) -> Result<Self, EmbeddingCacheError> {
        let mut cache = Self {
            path,
            model_id,
            dimensions,
            entries: HashMap::new(),
        };

        if !cache.path.exists() {
            log::info!("no existing embedding cache, starting fresh");
            return Ok(cache);
        }

        match cache.load() {
            Ok(()) => {
                log::info!("loaded {} cached embeddings", cache.entries.len());
                Ok(cache)
            }
            Err(EmbeddingCacheError::ModelMismatch) => {
                log::warn!("embedding model changed, discarding cached vectors");
                cache.entries.clear();
                Ok(cache)
            }
            Err(EmbeddingCacheError::VersionMismatch(file_ver, _)) => {
                log::warn!("embedding cache version {file_ver} unsupported, starting fresh");
                cache.entries.clear();
                Ok(cache)
            }
            Err(err) => {
                log::error!("failed to load embedding cache: {err}");
                Err(err)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, content_hash: &str) -> bool {
        self.entries.contains_key(content_hash)
    }

    pub fn get(&self, content_hash: &str) -> Option<&[f32]> {
        self.entries.get(content_hash).map(|v| v.as_slice())
    }

    /// Insert a vector for a content hash.
    ///
    /// An existing entry is kept untouched (entries are immutable); the
    /// vector must match the cache dimensions and have a non-zero norm.
    pub fn insert(
        &mut self,
        content_hash: &str,
        vector: Vec<f32>,
    ) -> Result<(), EmbeddingCacheError> {
        if content_hash.len() != HASH_LEN || !content_hash.is_ascii() {
            return Err(EmbeddingCacheError::InvalidKey(content_hash.to_string()));
        }

        if vector.len() != self.dimensions {
            return Err(EmbeddingCacheError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < f32::EPSILON {
            return Err(EmbeddingCacheError::ZeroNormVector);
        }

        self.entries.entry(content_hash.to_string()).or_insert(vector);

        Ok(())
    }

    /// Save the cache to disk: temp file, then atomic rename.
    pub fn save(&self) -> Result<(), EmbeddingCacheError> {
        let temp_path = self.path.with_extension("tmp");

        let result = self.write_to_file(&temp_path);

        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    fn load(&mut self) -> Result<(), EmbeddingCacheError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let header = self.read_header(&mut reader)?;

        if header.model_id != self.model_id {
            return Err(EmbeddingCacheError::ModelMismatch);
        }

        if header.dimensions as usize != self.dimensions {
            return Err(EmbeddingCacheError::DimensionMismatch {
                expected: self.dimensions,
                got: header.dimensions as usize,
            });
        }

        self.entries = HashMap::with_capacity(header.entry_count as usize);
        for _ in 0..header.entry_count {
            let (hash, vector) = Self::read_entry(&mut reader, self.dimensions)?;
            self.entries.insert(hash, vector);
        }

        Ok(())
    }

    fn write_to_file(&self, path: &Path) -> Result<(), EmbeddingCacheError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        self.write_header(&mut writer)?;

        for (hash, vector) in &self.entries {
            writer.write_all(hash.as_bytes())?;
            for &value in vector {
                writer.write_all(&value.to_le_bytes())?;
            }
        }

        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        Ok(())
    }

    fn read_header(
        &self,
        reader: &mut BufReader<File>,
    ) -> Result<Header, EmbeddingCacheError> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes)?;

        let version = header_bytes[0];

        // Version check first
        if version > FORMAT_VERSION {
            return Err(EmbeddingCacheError::VersionMismatch(version, FORMAT_VERSION));
        }

        let mut model_id = [0u8; 32];
        model_id.copy_from_slice(&header_bytes[1..33]);

        let dimensions = u16::from_le_bytes([header_bytes[33], header_bytes[34]]);

        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&header_bytes[35..43]);
        let entry_count = u64::from_le_bytes(count_bytes);

        let mut checksum_bytes = [0u8; 4];
        checksum_bytes.copy_from_slice(&header_bytes[43..47]);
        let stored_checksum = u32::from_le_bytes(checksum_bytes);

        // Verify checksum (computed over header without checksum field)
        let computed_checksum = crc32fast::hash(&header_bytes[0..43]);
        if stored_checksum != computed_checksum {
            return Err(EmbeddingCacheError::ChecksumMismatch);
        }

        Ok(Header {
            model_id,
            dimensions,
            entry_count,
        })
    }

    fn write_header(&self, writer: &mut BufWriter<File>) -> Result<(), EmbeddingCacheError> {
        let mut header_bytes = [0u8; HEADER_SIZE];

        header_bytes[0] = FORMAT_VERSION;
        header_bytes[1..33].copy_from_slice(&self.model_id);
        header_bytes[33..35].copy_from_slice(&(self.dimensions as u16).to_le_bytes());
        header_bytes[35..43].copy_from_slice(&(self.entries.len() as u64).to_le_bytes());

        let checksum = crc32fast::hash(&header_bytes[0..43]);
        header_bytes[43..47].copy_from_slice(&checksum.to_le_bytes());

        writer.write_all(&header_bytes)?;
        Ok(())
    }

    fn read_entry(
        reader: &mut BufReader<File>,
        dimensions: usize,
    ) -> Result<(String, Vec<f32>), EmbeddingCacheError> {
        let mut hash_bytes = [0u8; HASH_LEN];
        reader.read_exact(&mut hash_bytes)?;
        let hash = String::from_utf8(hash_bytes.to_vec())
            .map_err(|e| EmbeddingCacheError::InvalidKey(e.to_string()))?;

        let mut vector = Vec::with_capacity(dimensions);
        for _ in 0..dimensions {
            let mut float_bytes = [0u8; 4];
            reader.read_exact(&mut float_bytes)?;
            vector.push(f32::from_le_bytes(float_bytes));
        }

        Ok((hash, vector))
    }
}

/// Parsed file header.
struct Header {
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::content_hash;

    fn test_model_id() -> [u8; 32] {
        let mut id = [0u8; 32];
        id[0] = 0xAB;
        id[31] = 0xCD;
        id
    }

    fn temp_cache_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("embeddings.bin")
    }

    #[test]
    fn test_open_missing_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache::open(temp_cache_path(&dir), test_model_id(), 3).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_cache_path(&dir);

        let h1 = content_hash("first post");
        let h2 = content_hash("second post");

        let mut cache = EmbeddingCache::open(path.clone(), test_model_id(), 3).unwrap();
        cache.insert(&h1, vec![1.0, 0.0, 0.0]).unwrap();
        cache.insert(&h2, vec![0.0, 1.0, 0.0]).unwrap();
        cache.save().unwrap();

        let reloaded = EmbeddingCache::open(path, test_model_id(), 3).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get(&h1).unwrap(), &[1.0, 0.0, 0.0]);
        assert_eq!(reloaded.get(&h2).unwrap(), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_entries_are_immutable() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache =
            EmbeddingCache::open(temp_cache_path(&dir), test_model_id(), 3).unwrap();

        let hash = content_hash("a post");
        cache.insert(&hash, vec![1.0, 0.0, 0.0]).unwrap();
        cache.insert(&hash, vec![0.0, 1.0, 0.0]).unwrap();

        // first write wins, entry is never mutated in place
        assert_eq!(cache.get(&hash).unwrap(), &[1.0, 0.0, 0.0]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_insert_rejects_wrong_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache =
            EmbeddingCache::open(temp_cache_path(&dir), test_model_id(), 3).unwrap();

        let result = cache.insert(&content_hash("p"), vec![1.0, 0.0]);
        assert!(matches!(
            result,
            Err(EmbeddingCacheError::DimensionMismatch { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn test_insert_rejects_zero_norm() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache =
            EmbeddingCache::open(temp_cache_path(&dir), test_model_id(), 3).unwrap();

        let result = cache.insert(&content_hash("p"), vec![0.0, 0.0, 0.0]);
        assert!(matches!(result, Err(EmbeddingCacheError::ZeroNormVector)));
    }

    #[test]
    fn test_insert_rejects_bad_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache =
            EmbeddingCache::open(temp_cache_path(&dir), test_model_id(), 3).unwrap();

        let result = cache.insert("short-key", vec![1.0, 0.0, 0.0]);
        assert!(matches!(result, Err(EmbeddingCacheError::InvalidKey(_))));
    }

    #[test]
    fn test_model_change_discards_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_cache_path(&dir);

        let mut cache = EmbeddingCache::open(path.clone(), test_model_id(), 3).unwrap();
        cache.insert(&content_hash("p"), vec![1.0, 0.0, 0.0]).unwrap();
        cache.save().unwrap();

        let mut other_model = [0u8; 32];
        other_model[0] = 0xFF;

        // different model: cache starts fresh instead of erroring
        let reloaded = EmbeddingCache::open(path, other_model, 3).unwrap();
        assert!(reloaded.is_empty());
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_cache_path(&dir);

        let mut cache = EmbeddingCache::open(path.clone(), test_model_id(), 3).unwrap();
        cache.insert(&content_hash("p"), vec![1.0, 0.0, 0.0]).unwrap();
        cache.save().unwrap();

        // flip a byte inside the header
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[10] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let result = EmbeddingCache::open(path, test_model_id(), 3);
        assert!(matches!(result, Err(EmbeddingCacheError::ChecksumMismatch)));
    }

    #[test]
    fn test_atomic_save_cleans_up_on_error() {
        let path = PathBuf::from("/nonexistent/directory/embeddings.bin");
        let cache = EmbeddingCache {
            path: path.clone(),
            model_id: test_model_id(),
            dimensions: 3,
            entries: HashMap::new(),
        };

        assert!(cache.save().is_err());
        assert!(!path.with_extension("tmp").exists());
    }
}
