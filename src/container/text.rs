//! DLG/LNG string table reader **(added)**.
//!
//! Both dialog and localized-string containers share one simple layout: a
//! `u32` entry count followed by that many length-prefixed (`u32`) byte
//! strings, windows-1252 in practice but treated as lossy UTF-8 here since
//! the decompiler only round-trips text for display, not byte-for-byte
//! re-encoding.

use crate::error::{HypeError, Result};
use std::io::{Cursor, Read};

#[derive(Debug, Clone)]
pub struct StringTable {
    pub entries: Vec<String>,
}

impl StringTable {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let mut count_bytes = [0u8; 4];
        cursor.read_exact(&mut count_bytes)?;
        let count = u32::from_le_bytes(count_bytes);

        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut len_bytes = [0u8; 4];
            cursor
                .read_exact(&mut len_bytes)
                .map_err(|_| HypeError::MalformedFile("string table truncated before entry length".into()))?;
            let len = u32::from_le_bytes(len_bytes) as usize;
            let mut raw = vec![0u8; len];
            cursor
                .read_exact(&mut raw)
                .map_err(|_| HypeError::MalformedFile("string table truncated mid-entry".into()))?;
            entries.push(String::from_utf8_lossy(&raw).to_string());
        }

        Ok(Self { entries })
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(strings: &[&str]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(strings.len() as u32).to_le_bytes());
        for s in strings {
            buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        buf
    }

    #[test]
    fn reads_entries_in_order() {
        let data = build(&["Hello", "Goodbye", ""]);
        let table = StringTable::parse(&data).unwrap();
        assert_eq!(table.entries, vec!["Hello", "Goodbye", ""]);
        assert_eq!(table.get(1), Some("Goodbye"));
        assert_eq!(table.get(99), None);
    }

    #[test]
    fn truncated_entry_errors() {
        let mut data = build(&["Hello"]);
        data.truncate(data.len() - 2);
        assert!(StringTable::parse(&data).is_err());
    }
}
