//! GLB (binary glTF) container writer: 12-byte header, JSON chunk, BIN
//! chunk, both padded to 4-byte alignment.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

const GLB_MAGIC: u32 = 0x46546C67; // "glTF"
const GLB_VERSION: u32 = 2;
const GLB_HEADER_SIZE: u32 = 12;
const CHUNK_HEADER_SIZE: u32 = 8;
const CHUNK_TYPE_JSON: u32 = 0x4E4F534A;
const CHUNK_TYPE_BIN: u32 = 0x004E4942;

pub fn write_glb(json_str: &str, bin_data: &[u8], path: &Path) -> Result<()> {
    let json_bytes = json_str.as_bytes();

    let json_padding = (4 - (json_bytes.len() % 4)) % 4;
    let json_chunk_length = json_bytes.len() + json_padding;

    let bin_padding = (4 - (bin_data.len() % 4)) % 4;
    let bin_chunk_length = bin_data.len() + bin_padding;

    let total_length = GLB_HEADER_SIZE
        + CHUNK_HEADER_SIZE
        + json_chunk_length as u32
        + CHUNK_HEADER_SIZE
        + bin_chunk_length as u32;

    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create GLB: {}", path.display()))?;
    let mut w = std::io::BufWriter::new(file);

    w.write_all(&GLB_MAGIC.to_le_bytes())?;
    w.write_all(&GLB_VERSION.to_le_bytes())?;
    w.write_all(&total_length.to_le_bytes())?;

    w.write_all(&(json_chunk_length as u32).to_le_bytes())?;
    w.write_all(&CHUNK_TYPE_JSON.to_le_bytes())?;
    w.write_all(json_bytes)?;
    for _ in 0..json_padding {
        w.write_all(&[0x20])?;
    }

    w.write_all(&(bin_chunk_length as u32).to_le_bytes())?;
    w.write_all(&CHUNK_TYPE_BIN.to_le_bytes())?;
    w.write_all(bin_data)?;
    for _ in 0..bin_padding {
        w.write_all(&[0x00])?;
    }

    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_valid_header_and_alignment() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.glb");

        let json = r#"{"asset":{"version":"2.0"}}"#;
        let bin = vec![1, 2, 3, 4, 5];

        write_glb(json, &bin, &path).unwrap();
        let data = std::fs::read(&path).unwrap();

        let magic = u32::from_le_bytes(data[0..4].try_into().unwrap());
        assert_eq!(magic, GLB_MAGIC);
        let total_len = u32::from_le_bytes(data[8..12].try_into().unwrap());
        assert_eq!(total_len as usize, data.len());
        assert_eq!(data.len() % 4, 0);
    }
}
