//! On-disk formats: the binary collection codec and the database manifest.
//!
//! A persisted collection is a fixed 36-byte header followed by a bincode
//! payload. The header carries the format version, the parameters a reader
//! needs before decoding (dimension, metric, fan-out, live count), and a
//! crc32 of the payload so torn or bit-rotted files fail with `Corrupt`
//! instead of decoding into garbage.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::collection::Collection;
use crate::config::Config;
use crate::distance::Distance;
use crate::error::{Error, Result};
use crate::record::{Record, RecordId};

/// `"LSTN"` in ASCII.
const COLLECTION_MAGIC: u32 = 0x4C53_544E;
/// Bumped on every incompatible layout change.
pub(crate) const FORMAT_VERSION: u16 = 1;
const HEADER_BYTES: usize = 36;

pub(crate) const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    version: u16,
    metric: Distance,
    dimension: u32,
    max_degree: u32,
    live_count: u64,
    payload_len: u64,
    payload_crc32: u32,
}

impl Header {
    fn encode(&self) -> [u8; HEADER_BYTES] {
        let metric = match self.metric {
            Distance::Euclidean => 0u8,
            Distance::Cosine => 1,
            Distance::Dot => 2,
        };
        let mut buf = [0u8; HEADER_BYTES];
        buf[0..4].copy_from_slice(&COLLECTION_MAGIC.to_le_bytes());
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6] = metric;
        buf[7] = 0; // reserved
        buf[8..12].copy_from_slice(&self.dimension.to_le_bytes());
        buf[12..16].copy_from_slice(&self.max_degree.to_le_bytes());
        buf[16..24].copy_from_slice(&self.live_count.to_le_bytes());
        buf[24..32].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[32..36].copy_from_slice(&self.payload_crc32.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_BYTES {
            return Err(Error::Corrupt(format!(
                "collection file truncated: {} bytes, header needs {HEADER_BYTES}",
                buf.len()
            )));
        }
        let magic = u32::from_le_bytes(buf[0..4].try_into().expect("slice length checked"));
        if magic != COLLECTION_MAGIC {
            return Err(Error::Corrupt(format!(
                "bad magic 0x{magic:08X}, expected 0x{COLLECTION_MAGIC:08X}"
            )));
        }
        let version = u16::from_le_bytes(buf[4..6].try_into().expect("slice length checked"));
        if version != FORMAT_VERSION {
            return Err(Error::UnsupportedFormatVersion {
                found: version,
                supported: FORMAT_VERSION,
            });
        }
        let metric = match buf[6] {
            0 => Distance::Euclidean,
            1 => Distance::Cosine,
            2 => Distance::Dot,
            other => {
                return Err(Error::Corrupt(format!("unknown metric tag {other}")));
            }
        };
        Ok(Self {
            version,
            metric,
            dimension: u32::from_le_bytes(buf[8..12].try_into().expect("slice length checked")),
            max_degree: u32::from_le_bytes(buf[12..16].try_into().expect("slice length checked")),
            live_count: u64::from_le_bytes(buf[16..24].try_into().expect("slice length checked")),
            payload_len: u64::from_le_bytes(buf[24..32].try_into().expect("slice length checked")),
            payload_crc32: u32::from_le_bytes(buf[32..36].try_into().expect("slice length checked")),
        })
    }
}

/// The serialized body of a collection. Index topology is persisted, not
/// rebuilt on load.
#[derive(Debug, Serialize, Deserialize)]
struct CollectionPayload {
    config: Config,
    dimension: u64,
    next_id: RecordId,
    records: Vec<(RecordId, Record)>,
    adjacency: Vec<(RecordId, Vec<RecordId>)>,
    entry_point: Option<RecordId>,
    tombstones: Vec<RecordId>,
    relevancy: Option<f32>,
}

pub(crate) fn encode_collection(collection: &Collection) -> Result<Vec<u8>> {
    let parts = collection.parts();

    let mut adjacency: Vec<(RecordId, Vec<RecordId>)> = parts
        .adjacency
        .iter()
        .map(|(&id, edges)| (id, edges.clone()))
        .collect();
    // Stable output: identical collections encode to identical bytes.
    adjacency.sort_unstable_by_key(|(id, _)| *id);

    let payload = CollectionPayload {
        config: parts.config.clone(),
        dimension: parts.dimension as u64,
        next_id: parts.next_id,
        records: parts
            .records
            .iter()
            .map(|(&id, record)| (id, record.clone()))
            .collect(),
        adjacency,
        entry_point: parts.entry_point,
        tombstones: parts.tombstones.iter().copied().collect(),
        relevancy: parts.relevancy,
    };

    let body = bincode::serialize(&payload)
        .map_err(|error| Error::Corrupt(format!("payload serialization failed: {error}")))?;

    let header = Header {
        version: FORMAT_VERSION,
        metric: parts.config.metric,
        dimension: parts.dimension as u32,
        max_degree: parts.config.max_degree as u32,
        live_count: collection.len() as u64,
        payload_len: body.len() as u64,
        payload_crc32: crc32fast::hash(&body),
    };

    let mut bytes = Vec::with_capacity(HEADER_BYTES + body.len());
    bytes.extend_from_slice(&header.encode());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

pub(crate) fn decode_collection(bytes: &[u8]) -> Result<Collection> {
    let header = Header::decode(bytes)?;
    let body = &bytes[HEADER_BYTES..];
    if body.len() as u64 != header.payload_len {
        return Err(Error::Corrupt(format!(
            "payload length {} does not match header {}",
            body.len(),
            header.payload_len
        )));
    }
    let crc = crc32fast::hash(body);
    if crc != header.payload_crc32 {
        return Err(Error::Corrupt(format!(
            "payload checksum 0x{crc:08X} does not match header 0x{:08X}",
            header.payload_crc32
        )));
    }

    let payload: CollectionPayload = bincode::deserialize(body)
        .map_err(|error| Error::Corrupt(format!("payload deserialization failed: {error}")))?;

    if payload.config.metric != header.metric {
        return Err(Error::Corrupt(
            "metric disagrees between header and payload".to_string(),
        ));
    }
    if payload.config.max_degree as u32 != header.max_degree {
        return Err(Error::Corrupt(
            "fan-out disagrees between header and payload".to_string(),
        ));
    }
    if payload.dimension != u64::from(header.dimension) {
        return Err(Error::Corrupt(
            "dimension disagrees between header and payload".to_string(),
        ));
    }

    let records: BTreeMap<RecordId, Record> = payload.records.into_iter().collect();
    let adjacency: HashMap<RecordId, Vec<RecordId>> = payload.adjacency.into_iter().collect();
    let tombstones: BTreeSet<RecordId> = payload.tombstones.into_iter().collect();

    // Structural validation: every graph id must resolve to a stored record
    // and the bookkeeping must be internally consistent.
    if records.len() != adjacency.len() {
        return Err(Error::Corrupt(format!(
            "record store holds {} entries but the graph has {} nodes",
            records.len(),
            adjacency.len()
        )));
    }
    for (id, edges) in &adjacency {
        if !records.contains_key(id) {
            return Err(Error::Corrupt(format!("graph node {id} has no record")));
        }
        for neighbor in edges {
            if !adjacency.contains_key(neighbor) {
                return Err(Error::Corrupt(format!(
                    "node {id} references missing neighbor {neighbor}"
                )));
            }
        }
    }
    for id in &tombstones {
        if !adjacency.contains_key(id) {
            return Err(Error::Corrupt(format!(
                "tombstoned id {id} is not present in the graph"
            )));
        }
    }
    if let Some(entry) = payload.entry_point {
        if !adjacency.contains_key(&entry) {
            return Err(Error::Corrupt(format!(
                "entry point {entry} is not present in the graph"
            )));
        }
    }
    let live = records.len() - tombstones.len();
    if live as u64 != header.live_count {
        return Err(Error::Corrupt(format!(
            "live count {live} does not match header {}",
            header.live_count
        )));
    }
    if records.keys().any(|&id| id >= payload.next_id) {
        return Err(Error::Corrupt(
            "record id at or above the next-id counter".to_string(),
        ));
    }

    Collection::from_parts(
        payload.config,
        payload.dimension as usize,
        payload.next_id,
        records,
        adjacency,
        payload.entry_point,
        tombstones,
        payload.relevancy,
    )
}

/// The database manifest: the set of active collection names. Kept tiny so
/// `len`/`is_empty` never have to open collection files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Manifest {
    pub version: u32,
    pub collections: BTreeSet<String>,
}

impl Manifest {
    pub fn new() -> Self {
        Self {
            version: MANIFEST_VERSION,
            collections: BTreeSet::new(),
        }
    }
}

pub(crate) fn read_manifest(path: &Path) -> Result<Manifest> {
    let raw = fs::read_to_string(path)?;
    let manifest: Manifest = serde_json::from_str(&raw)
        .map_err(|error| Error::Corrupt(format!("manifest parse failed: {error}")))?;
    if manifest.version != MANIFEST_VERSION {
        return Err(Error::UnsupportedFormatVersion {
            found: manifest.version as u16,
            supported: MANIFEST_VERSION as u16,
        });
    }
    Ok(manifest)
}

pub(crate) fn write_manifest(path: &Path, manifest: &Manifest) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(manifest)
        .map_err(|error| Error::Corrupt(format!("manifest serialization failed: {error}")))?;
    write_atomic(path, &bytes)
}

/// Write-then-rename with fsync on the file and its directory, so a crash
/// mid-write never replaces a prior copy with a partial one.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&temp_path)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;
    sync_parent_dir(path)?;
    Ok(())
}

pub(crate) fn sync_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if parent.as_os_str().is_empty() {
            return Ok(());
        }
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests;
