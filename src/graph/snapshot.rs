//! Binary snapshot codec for the graph store.
//!
//! # Format
//!
//! All integers are little-endian.
//!
//! ```text
//! magic     "GRSN"
//! version   u16
//! counts    users u64 | items u64 | edges u64 | genre_entries u64 | pref_users u64
//! genres    genre_entries × (item u64, genre u32)
//! users     users × (user u64, degree u64, degree × (item u64, timestamp u64))
//! prefs     pref_users × (user u64, n u64, n × genre u32)
//! checksum  SHA-256 over every preceding byte
//! ```
//!
//! Only the user→item direction is written; the item→user direction is
//! derived while decoding. Decoding builds a fresh [`GraphState`] and never
//! touches a live store, so a rejected blob leaves nothing half-loaded.

use super::store::{GraphState, GraphStore};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use thiserror::Error;

/// Leading bytes of every snapshot.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"GRSN";

/// Current format version.
pub const SNAPSHOT_VERSION: u16 = 1;

const CHECKSUM_LEN: usize = 32;

/// Reasons a snapshot blob is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// The blob ended before the structure it declares.
    #[error("snapshot truncated at byte {offset}")]
    Truncated {
        /// Offset at which more bytes were needed.
        offset: usize,
    },
    /// The blob does not start with the snapshot magic.
    #[error("not a graph snapshot (bad magic)")]
    BadMagic,
    /// The blob was written by an incompatible encoder.
    #[error("unsupported snapshot version {found} (expected {SNAPSHOT_VERSION})")]
    UnsupportedVersion {
        /// Version found in the header.
        found: u16,
    },
    /// The content does not match its checksum.
    #[error("snapshot checksum mismatch")]
    ChecksumMismatch,
    /// Bytes remain after the checksum.
    #[error("{0} unexpected trailing bytes after snapshot")]
    TrailingBytes(usize),
    /// The decoded graph contradicts the header.
    #[error("inconsistent snapshot: {0}")]
    Inconsistent(String),
}

/// Encodes the store under a single read guard.
///
/// The guard is released before the bytes are returned, so callers can write
/// them out without holding the graph lock.
pub fn encode_store(store: &GraphStore) -> Vec<u8> {
    let state = store.read();
    let bytes = encode(&state);
    drop(state);
    metrics::gauge!("snapshot_bytes").set(bytes.len() as f64);
    bytes
}

/// Encodes a graph state.
#[must_use]
pub fn encode(state: &GraphState) -> Vec<u8> {
    let counts = state.counts();
    let genres = state.genres_sorted();
    let users = state.users_sorted();
    let prefs = state.preferences_sorted();

    let mut out = Vec::with_capacity(
        4 + 2 + 8 * 5 + genres.len() * 12 + users.len() * 16 + counts.edges * 16 + CHECKSUM_LEN,
    );
    out.extend_from_slice(&SNAPSHOT_MAGIC);
    out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    for count in [
        counts.users,
        counts.items,
        counts.edges,
        genres.len(),
        prefs.len(),
    ] {
        out.extend_from_slice(&(count as u64).to_le_bytes());
    }

    for (item_id, genre_id) in &genres {
        out.extend_from_slice(&item_id.to_le_bytes());
        out.extend_from_slice(&genre_id.to_le_bytes());
    }

    for (user_id, items) in &users {
        out.extend_from_slice(&user_id.to_le_bytes());
        out.extend_from_slice(&(items.len() as u64).to_le_bytes());
        for (item_id, timestamp) in items.iter() {
            out.extend_from_slice(&item_id.to_le_bytes());
            out.extend_from_slice(&timestamp.to_le_bytes());
        }
    }

    for (user_id, genre_ids) in &prefs {
        out.extend_from_slice(&user_id.to_le_bytes());
        out.extend_from_slice(&(genre_ids.len() as u64).to_le_bytes());
        for genre_id in *genre_ids {
            out.extend_from_slice(&genre_id.to_le_bytes());
        }
    }

    let checksum = Sha256::digest(&out);
    out.extend_from_slice(&checksum);
    out
}

/// Decodes a snapshot into a fresh graph state.
///
/// # Errors
///
/// Returns a [`SnapshotError`] describing the first problem found.
pub fn decode(bytes: &[u8]) -> Result<GraphState, SnapshotError> {
    let mut reader = Reader::new(bytes);

    if reader.take(SNAPSHOT_MAGIC.len())? != SNAPSHOT_MAGIC {
        return Err(SnapshotError::BadMagic);
    }
    let version = reader.u16()?;
    if version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion { found: version });
    }

    let users = reader.count()?;
    let items = reader.count()?;
    let edges = reader.count()?;
    let genre_entries = reader.count()?;
    let pref_users = reader.count()?;

    let mut state = GraphState::new();

    for _ in 0..genre_entries {
        let item_id = reader.u64()?;
        let genre_id = reader.u32()?;
        state.set_item_genre(item_id, genre_id);
    }

    for _ in 0..users {
        let user_id = reader.u64()?;
        let degree = reader.count()?;
        if degree == 0 {
            return Err(SnapshotError::Inconsistent(format!(
                "user {user_id} has no edges"
            )));
        }
        for _ in 0..degree {
            let item_id = reader.u64()?;
            let timestamp = reader.u64()?;
            state.add_edge(user_id, item_id, timestamp);
        }
    }

    for _ in 0..pref_users {
        let user_id = reader.u64()?;
        let n = reader.count()?;
        let mut genre_ids = BTreeSet::new();
        for _ in 0..n {
            genre_ids.insert(reader.u32()?);
        }
        state.set_user_preferences(user_id, genre_ids);
    }

    let body_len = reader.offset;
    let checksum = reader.take(CHECKSUM_LEN)?;
    if reader.remaining() > 0 {
        return Err(SnapshotError::TrailingBytes(reader.remaining()));
    }
    if Sha256::digest(&bytes[..body_len]).as_slice() != checksum {
        return Err(SnapshotError::ChecksumMismatch);
    }

    let counts = state.counts();
    if counts.users != users || counts.items != items || counts.edges != edges {
        return Err(SnapshotError::Inconsistent(format!(
            "header declares {users} users / {items} items / {edges} edges, decoded {} / {} / {}",
            counts.users, counts.items, counts.edges
        )));
    }
    if state.genre_entries() != genre_entries || state.preference_entries() != pref_users {
        return Err(SnapshotError::Inconsistent(
            "duplicate genre or preference entries".to_string(),
        ));
    }

    Ok(state)
}

/// Bounds-checked little-endian cursor.
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    const fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], SnapshotError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(SnapshotError::Truncated {
                offset: self.offset,
            })?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], SnapshotError> {
        let offset = self.offset;
        self.take(N)?
            .try_into()
            .map_err(|_| SnapshotError::Truncated { offset })
    }

    fn u16(&mut self) -> Result<u16, SnapshotError> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32, SnapshotError> {
        self.array().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64, SnapshotError> {
        self.array().map(u64::from_le_bytes)
    }

    fn count(&mut self) -> Result<usize, SnapshotError> {
        let value = self.u64()?;
        usize::try_from(value)
            .map_err(|_| SnapshotError::Inconsistent(format!("count {value} exceeds usize")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> GraphState {
        let mut state = GraphState::new();
        state.add_edge(999, 101, 1_000);
        state.add_edge(888, 101, 1_001);
        state.add_edge(888, 104, 1_002);
        state.set_item_genre(101, 7);
        state.set_item_genre(200, 3);
        state.set_user_preferences(999, BTreeSet::from([7, 2]));
        state
    }

    #[test]
    fn test_roundtrip_preserves_state() {
        let state = sample_state();
        let decoded = decode(&encode(&state)).unwrap();
        assert_eq!(decoded, state);
        assert_eq!(decoded.counts(), state.counts());
    }

    #[test]
    fn test_empty_graph_roundtrip() {
        let state = GraphState::new();
        let bytes = encode(&state);
        assert_eq!(bytes.len(), 4 + 2 + 40 + CHECKSUM_LEN);
        assert_eq!(decode(&bytes).unwrap(), state);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        assert_eq!(encode(&sample_state()), encode(&sample_state()));
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = encode(&sample_state());
        bytes[0] = b'X';
        assert_eq!(decode(&bytes), Err(SnapshotError::BadMagic));
    }

    #[test]
    fn test_rejects_other_version() {
        let mut bytes = encode(&sample_state());
        bytes[4..6].copy_from_slice(&2u16.to_le_bytes());
        assert_eq!(
            decode(&bytes),
            Err(SnapshotError::UnsupportedVersion { found: 2 })
        );
    }

    #[test]
    fn test_rejects_every_truncation() {
        let bytes = encode(&sample_state());
        for len in 0..bytes.len() {
            let result = decode(&bytes[..len]);
            assert!(result.is_err(), "prefix of {len} bytes was accepted");
        }
    }

    #[test]
    fn test_truncated_header_reports_truncation() {
        let bytes = encode(&sample_state());
        assert!(matches!(
            decode(&bytes[..10]),
            Err(SnapshotError::Truncated { .. })
        ));
    }

    #[test]
    fn test_rejects_flipped_payload_byte() {
        let mut bytes = encode(&sample_state());
        let last_timestamp_byte = bytes.len() - CHECKSUM_LEN - 30;
        bytes[last_timestamp_byte] ^= 0xFF;
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut bytes = encode(&sample_state());
        bytes.push(0);
        assert_eq!(decode(&bytes), Err(SnapshotError::TrailingBytes(1)));
    }

    #[test]
    fn test_encode_store_matches_state_encoding() {
        let store = GraphStore::from_state(sample_state());
        assert_eq!(encode_store(&store), encode(&sample_state()));
    }
}
