use std::path::PathBuf;

use crate::row::Row;
use crate::storage::btree::{Payload, PayloadError};

/// Bare `u32` payloads, so tests can tell duplicate keys apart.
impl Payload for u32 {
    const WIDTH: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Result<Self, PayloadError> {
        <[u8; 4]>::decode(buf).map(Self::from_le_bytes)
    }
}

/// Create a fresh database path inside a temporary directory.
///
/// The directory is removed when the returned `TempDir` is dropped, so keep
/// it alive for as long as the path is in use.
pub fn test_db_path() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("test.db");
    (dir, path)
}

/// A row whose username and email are derived from its id.
pub fn test_row(id: u32) -> Row {
    Row::new(id, &format!("user{id}"), &format!("user{id}@example.com"))
}
