//! Versioned binary artifact for store persistence.
//!
//! One artifact file holds everything a store needs to come back: the
//! embedding vectors, the aligned metadata, and the query cache. Vectors are
//! stored as raw little-endian `f32` bytes so reloading reproduces them
//! bit-for-bit; metadata rides as a JSON section. A magic tag and a format
//! version guard against misreads when the layout evolves.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! magic        4 bytes   b"CVLT"
//! version      u32       1
//! saved_at     i64       unix seconds at save time
//! dim          u32       vector dimensionality (0 when empty)
//! records      u64       number of stored vectors
//! vectors      records * dim * 4 bytes of f32
//! meta_len     u64       byte length of the metadata JSON
//! metadata     meta_len bytes (JSON array of ChunkMetadata)
//! cache_count  u64       number of query-cache entries
//! entries      key_len u64, key bytes, entry_dim u32, entry_dim * 4 bytes
//! ```

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::Path;

use crate::models::ChunkMetadata;

pub const MAGIC: [u8; 4] = *b"CVLT";
pub const FORMAT_VERSION: u32 = 1;

/// Decoded contents of a store artifact.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub saved_at: i64,
    pub embeddings: Vec<Vec<f32>>,
    pub metadata: Vec<ChunkMetadata>,
    pub query_cache: HashMap<String, Vec<f32>>,
}

/// Serialize store state and write it to `path`, creating parent
/// directories as needed.
pub fn write_artifact(
    path: &Path,
    embeddings: &[Vec<f32>],
    metadata: &[ChunkMetadata],
    query_cache: &HashMap<String, Vec<f32>>,
) -> Result<()> {
    let bytes = encode(
        chrono::Utc::now().timestamp(),
        embeddings,
        metadata,
        query_cache,
    )?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create store directory: {}", parent.display()))?;
    }
    std::fs::write(path, bytes)
        .with_context(|| format!("Failed to write store artifact: {}", path.display()))?;
    Ok(())
}

/// Read and decode the artifact at `path`.
pub fn read_artifact(path: &Path) -> Result<Artifact> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read store artifact: {}", path.display()))?;
    decode(&bytes).with_context(|| format!("Failed to decode store artifact: {}", path.display()))
}

/// Encode store state into artifact bytes.
///
/// Output is deterministic for identical inputs: query-cache entries are
/// written in sorted key order.
pub fn encode(
    saved_at: i64,
    embeddings: &[Vec<f32>],
    metadata: &[ChunkMetadata],
    query_cache: &HashMap<String, Vec<f32>>,
) -> Result<Vec<u8>> {
    if embeddings.len() != metadata.len() {
        bail!(
            "embeddings/metadata length mismatch: {} vs {}",
            embeddings.len(),
            metadata.len()
        );
    }

    let dim = embeddings.first().map(|v| v.len()).unwrap_or(0);
    if dim == 0 && !embeddings.is_empty() {
        bail!("cannot encode {} records with dimension 0", embeddings.len());
    }
    for (i, vector) in embeddings.iter().enumerate() {
        if vector.len() != dim {
            bail!(
                "inconsistent vector dimensions: record {} has {} (expected {})",
                i,
                vector.len(),
                dim
            );
        }
    }

    let metadata_json = serde_json::to_vec(metadata)?;

    let mut buf = Vec::with_capacity(32 + embeddings.len() * dim * 4 + metadata_json.len());
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&saved_at.to_le_bytes());
    buf.extend_from_slice(&(dim as u32).to_le_bytes());
    buf.extend_from_slice(&(embeddings.len() as u64).to_le_bytes());
    for vector in embeddings {
        push_f32s(&mut buf, vector);
    }

    buf.extend_from_slice(&(metadata_json.len() as u64).to_le_bytes());
    buf.extend_from_slice(&metadata_json);

    let mut entries: Vec<(&String, &Vec<f32>)> = query_cache.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    buf.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    for (query, vector) in entries {
        buf.extend_from_slice(&(query.len() as u64).to_le_bytes());
        buf.extend_from_slice(query.as_bytes());
        buf.extend_from_slice(&(vector.len() as u32).to_le_bytes());
        push_f32s(&mut buf, vector);
    }

    Ok(buf)
}

/// Decode artifact bytes, validating magic, version, and section lengths.
pub fn decode(bytes: &[u8]) -> Result<Artifact> {
    let mut reader = Reader::new(bytes);

    if reader.take(4)? != MAGIC {
        bail!("not a store artifact (bad magic)");
    }

    let version = reader.read_u32()?;
    if version != FORMAT_VERSION {
        bail!(
            "unsupported artifact version {} (this build reads version {})",
            version,
            FORMAT_VERSION
        );
    }

    let saved_at = reader.read_i64()?;
    let dim = reader.read_u32()? as usize;
    let records = reader.read_u64()? as usize;

    // A dim-0 header with records is impossible from `encode`, and the
    // vector-section size check cannot bound the count when dim is 0.
    if dim == 0 && records > 0 {
        bail!("artifact declares {} records with dimension 0", records);
    }

    let vector_bytes = records
        .checked_mul(dim)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| anyhow::anyhow!("vector section size overflows"))?;
    if vector_bytes > reader.remaining() {
        bail!(
            "artifact truncated: vector section needs {} bytes, {} remain",
            vector_bytes,
            reader.remaining()
        );
    }

    // records is bounded by the size check above.
    let mut embeddings = Vec::with_capacity(records);
    for _ in 0..records {
        embeddings.push(read_f32s(reader.take(dim * 4)?));
    }

    let meta_len = reader.read_u64()? as usize;
    let metadata: Vec<ChunkMetadata> = serde_json::from_slice(reader.take(meta_len)?)
        .context("metadata section is not valid JSON")?;
    if metadata.len() != records {
        bail!(
            "metadata count {} does not match vector count {}",
            metadata.len(),
            records
        );
    }

    let cache_count = reader.read_u64()? as usize;
    // Each entry carries at least its two length prefixes (8 + 4 bytes).
    if cache_count > reader.remaining() / 12 {
        bail!(
            "artifact truncated: query-cache section declares {} entries, {} bytes remain",
            cache_count,
            reader.remaining()
        );
    }
    let mut query_cache = HashMap::with_capacity(cache_count);
    for _ in 0..cache_count {
        let key_len = reader.read_u64()? as usize;
        let key = String::from_utf8(reader.take(key_len)?.to_vec())
            .map_err(|_| anyhow::anyhow!("query-cache key is not valid UTF-8"))?;
        let entry_dim = reader.read_u32()? as usize;
        let vector = read_f32s(reader.take(entry_dim * 4)?);
        query_cache.insert(key, vector);
    }

    if reader.remaining() != 0 {
        bail!("artifact has {} trailing bytes", reader.remaining());
    }

    Ok(Artifact {
        saved_at,
        embeddings,
        metadata,
        query_cache,
    })
}

fn push_f32s(buf: &mut Vec<u8>, values: &[f32]) {
    for &v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

fn read_f32s(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Bounds-checked cursor over the artifact bytes.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            bail!(
                "artifact truncated: needed {} bytes at offset {}, {} remain",
                n,
                self.pos,
                self.remaining()
            );
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn read_i64(&mut self) -> Result<i64> {
        let b = self.take(8)?;
        Ok(i64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }
}
