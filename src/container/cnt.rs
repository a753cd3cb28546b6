//! CNT texture archive reader (spec §4.2).
//!
//! ```text
//! header: dir_count:i32, file_count:i32, is_xor:u8, is_checksum:u8, xor_key:u8
//! dir_count x length-prefixed byte strings (XOR'd with xor_key if is_xor)
//! [checksum byte, present iff is_checksum]
//! file_count x { dir_index:i32, name_length:i32, name:bytes,
//!                file_xor_key:[u8;4], checksum:u32, pointer:i32, size:i32 }
//! ```

use crate::codec::xor;
use crate::error::{HypeError, Result};
use std::io::{Cursor, Read};

#[derive(Debug, Clone)]
pub struct CntFileEntry {
    pub dir_index: i32,
    pub name: String,
    pub file_xor_key: [u8; 4],
    pub checksum: u32,
    pub pointer: i32,
    pub size: i32,
}

#[derive(Debug, Clone)]
pub struct CntArchive {
    pub directories: Vec<String>,
    pub files: Vec<CntFileEntry>,
}

fn read_u8(c: &mut Cursor<&[u8]>) -> Result<u8> {
    let mut b = [0u8; 1];
    c.read_exact(&mut b)?;
    Ok(b[0])
}

fn read_i32(c: &mut Cursor<&[u8]>) -> Result<i32> {
    let mut b = [0u8; 4];
    c.read_exact(&mut b)?;
    Ok(i32::from_le_bytes(b))
}

fn read_u32(c: &mut Cursor<&[u8]>) -> Result<u32> {
    let mut b = [0u8; 4];
    c.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

impl CntArchive {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);

        let dir_count = read_i32(&mut cursor)?;
        let file_count = read_i32(&mut cursor)?;
        let is_xor = read_u8(&mut cursor)? != 0;
        let is_checksum = read_u8(&mut cursor)? != 0;
        let xor_key = read_u8(&mut cursor)?;

        if dir_count < 0 || file_count < 0 {
            return Err(HypeError::MalformedFile(
                "CNT header has negative dir_count or file_count".into(),
            ));
        }

        let mut directories = Vec::with_capacity(dir_count as usize);
        let mut directory_bytes_sum: u32 = 0;
        for _ in 0..dir_count {
            let len = read_i32(&mut cursor)? as usize;
            let mut raw = vec![0u8; len];
            cursor.read_exact(&mut raw)?;
            for &b in &raw {
                directory_bytes_sum = directory_bytes_sum.wrapping_add(b as u32);
            }
            let decoded = if is_xor {
                xor::string_xor(&raw, xor_key)
            } else {
                raw
            };
            directories.push(String::from_utf8_lossy(&decoded).to_string());
        }

        if is_checksum {
            let checksum_byte = read_u8(&mut cursor)?;
            let expected = (directory_bytes_sum % 256) as u8;
            if checksum_byte != expected {
                return Err(HypeError::ChecksumMismatch {
                    expected: expected as u32,
                    actual: checksum_byte as u32,
                });
            }
        }

        let mut files = Vec::with_capacity(file_count as usize);
        for _ in 0..file_count {
            let dir_index = read_i32(&mut cursor)?;
            let name_length = read_i32(&mut cursor)? as usize;
            let mut name_bytes = vec![0u8; name_length];
            cursor.read_exact(&mut name_bytes)?;
            let name = String::from_utf8_lossy(&name_bytes).to_string();

            let mut file_xor_key = [0u8; 4];
            cursor.read_exact(&mut file_xor_key)?;
            let checksum = read_u32(&mut cursor)?;
            let pointer = read_i32(&mut cursor)?;
            let size = read_i32(&mut cursor)?;

            files.push(CntFileEntry {
                dir_index,
                name,
                file_xor_key,
                checksum,
                pointer,
                size,
            });
        }

        Ok(Self { directories, files })
    }

    /// Extracts the raw (still-encoded-as-stored, already decrypted) bytes
    /// of a file entry from the full archive buffer.
    pub fn extract<'a>(&self, entry: &CntFileEntry, archive_data: &'a [u8]) -> Result<Vec<u8>> {
        if entry.pointer < 0 || entry.size < 0 {
            return Err(HypeError::MalformedFile(
                "CNT file entry has negative pointer or size".into(),
            ));
        }
        let start = entry.pointer as usize;
        let end = start
            .checked_add(entry.size as usize)
            .ok_or_else(|| HypeError::MalformedFile("CNT file entry size overflow".into()))?;
        let raw = archive_data
            .get(start..end)
            .ok_or_else(|| HypeError::MalformedFile("CNT file entry out of bounds".into()))?;
        let mut bytes = raw.to_vec();
        xor::cyclic_xor4_in_place(&mut bytes, entry.file_xor_key);
        Ok(bytes)
    }
}
