//! The fixed-layout row stored in table leaves.
//!
//! Text columns are NUL-padded, so a column's text ends at its first NUL.
//! `Row::new` drops everything from the first NUL on, and encoding does the
//! same for rows built by hand.

use std::fmt;

use crate::storage::PAGE_SIZE;
use crate::storage::btree::{Payload, PayloadError};

/// Width of the `id` column in bytes.
pub const ID_SIZE: usize = 4;

/// Width of the `username` column in bytes.
pub const COLUMN_USERNAME_SIZE: usize = 32;

/// Width of the `email` column in bytes.
pub const COLUMN_EMAIL_SIZE: usize = 255;

/// Encoded row width.
pub const ROW_SIZE: usize = ID_SIZE + COLUMN_USERNAME_SIZE + COLUMN_EMAIL_SIZE;

/// Rows that would fit in one page if stored back to back.
pub const ROWS_PER_PAGE: usize = PAGE_SIZE / ROW_SIZE;

const USERNAME_OFFSET: usize = ID_SIZE;
const EMAIL_OFFSET: usize = USERNAME_OFFSET + COLUMN_USERNAME_SIZE;

/// A table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: u32,
    pub username: String,
    pub email: String,
}

impl Row {
    /// Create a row, cutting `username` and `email` to what their columns hold.
    #[must_use]
    pub fn new(id: u32, username: &str, email: &str) -> Self {
        Self {
            id,
            username: column_text(username, COLUMN_USERNAME_SIZE).to_string(),
            email: column_text(email, COLUMN_EMAIL_SIZE).to_string(),
        }
    }
}

/// The part of `s` a column of `max` bytes stores.
fn column_text(s: &str, max: usize) -> &str {
    let s = s.find('\0').map_or(s, |end| &s[..end]);
    truncate(s, max)
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn decode_column(bytes: &[u8], name: &str) -> Result<String, PayloadError> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end])
        .map(str::to_string)
        .map_err(|e| PayloadError(format!("{name} is not valid UTF-8: {e}")))
}

impl Payload for Row {
    const WIDTH: usize = ROW_SIZE;

    fn encode(&self, buf: &mut [u8]) {
        let username = column_text(&self.username, COLUMN_USERNAME_SIZE).as_bytes();
        let email = column_text(&self.email, COLUMN_EMAIL_SIZE).as_bytes();

        buf[..ID_SIZE].copy_from_slice(&self.id.to_le_bytes());
        buf[USERNAME_OFFSET..USERNAME_OFFSET + username.len()].copy_from_slice(username);
        buf[EMAIL_OFFSET..EMAIL_OFFSET + email.len()].copy_from_slice(email);
    }

    fn decode(buf: &[u8]) -> Result<Self, PayloadError> {
        if buf.len() != ROW_SIZE {
            return Err(PayloadError(format!(
                "row needs {ROW_SIZE} bytes, got {}",
                buf.len()
            )));
        }

        let id = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let username = decode_column(&buf[USERNAME_OFFSET..EMAIL_OFFSET], "username")?;
        let email = decode_column(&buf[EMAIL_OFFSET..], "email")?;
        Ok(Self {
            id,
            username,
            email,
        })
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.id, self.username, self.email)
    }
}
