//! BNM sound bank reader (spec §4.2).
//!
//! A 44-byte header names five block offsets (MPDX/MIDI/PCM/APM/streamed)
//! plus section offsets/counts and EOF. Entries are 0x5C or 0x60 bytes
//! depending on `version`. *Critical subtlety*: `stream_offset` is relative
//! to the owning block's start for PCM/APM, but absolute within the file
//! for MPDX.

use crate::error::{HypeError, Result};
use std::io::{Cursor, Read};

pub const HEADER_LEN: usize = 44;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Pcm,
    Midi,
    Mpdx,
    Apm,
}

impl StreamType {
    fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            1 => Ok(StreamType::Pcm),
            2 => Ok(StreamType::Mpdx),
            4 => Ok(StreamType::Apm),
            other => Err(HypeError::UnsupportedVariant(format!(
                "unknown BNM stream_type {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BnmHeader {
    pub section_offset_0: u32,
    pub section_offset_1: u32,
    pub count_0: u32,
    pub count_1: u32,
    pub mpdx_offset: u32,
    pub midi_offset: u32,
    pub pcm_offset: u32,
    pub apm_offset: u32,
    pub streamed_offset: u32,
    pub eof_offset: u32,
}

#[derive(Debug, Clone)]
pub struct BnmEntry {
    pub name: String,
    pub stream_type: StreamType,
    pub sample_rate: u32,
    pub channels: u16,
    /// File-absolute byte offset, already normalized from the
    /// block-relative PCM/APM convention (spec §4.2 "critical subtlety").
    pub absolute_offset: u32,
    pub stream_size: u32,
}

fn read_u32(c: &mut Cursor<&[u8]>) -> Result<u32> {
    let mut b = [0u8; 4];
    c.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn read_u16(c: &mut Cursor<&[u8]>) -> Result<u16> {
    let mut b = [0u8; 2];
    c.read_exact(&mut b)?;
    Ok(u16::from_le_bytes(b))
}

fn read_cstr_fixed(c: &mut Cursor<&[u8]>, len: usize) -> Result<String> {
    let mut buf = vec![0u8; len];
    c.read_exact(&mut buf)?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(len);
    Ok(String::from_utf8_lossy(&buf[..end]).to_string())
}

impl BnmHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(HypeError::MalformedFile(
                "BNM file shorter than 44-byte header".into(),
            ));
        }
        let mut c = Cursor::new(data);
        Ok(Self {
            section_offset_0: read_u32(&mut c)?,
            section_offset_1: read_u32(&mut c)?,
            count_0: read_u32(&mut c)?,
            count_1: read_u32(&mut c)?,
            mpdx_offset: read_u32(&mut c)?,
            midi_offset: read_u32(&mut c)?,
            pcm_offset: read_u32(&mut c)?,
            apm_offset: read_u32(&mut c)?,
            streamed_offset: read_u32(&mut c)?,
            eof_offset: read_u32(&mut c)?,
        })
    }
}

const ENTRY_SIZE_V1: usize = 0x5C;
const ENTRY_SIZE_V2: usize = 0x60;
const ENTRY_NAME_LEN: usize = 20;

/// Parses `entry_count` audio entries starting at `entries_offset`. `version`
/// selects the 0x5C vs 0x60-byte entry layout (spec §4.2).
pub fn read_entries(
    data: &[u8],
    header: &BnmHeader,
    entries_offset: usize,
    entry_count: u32,
    version: u32,
) -> Result<Vec<BnmEntry>> {
    let entry_size = if version >= 2 { ENTRY_SIZE_V2 } else { ENTRY_SIZE_V1 };
    let mut entries = Vec::with_capacity(entry_count as usize);

    for i in 0..entry_count {
        let start = entries_offset + i as usize * entry_size;
        let end = start + entry_size;
        let raw = data
            .get(start..end)
            .ok_or_else(|| HypeError::MalformedFile("BNM entry table runs past EOF".into()))?;
        let mut c = Cursor::new(raw);

        let stream_size = read_u32(&mut c)?;
        let stream_offset = read_u32(&mut c)?;
        let sample_rate = read_u32(&mut c)?;
        let channels = read_u16(&mut c)?;
        let _unused = read_u16(&mut c)?;
        let stream_type_raw = read_u32(&mut c)?;
        let stream_type = StreamType::from_raw(stream_type_raw)?;
        let name = read_cstr_fixed(&mut c, ENTRY_NAME_LEN)?;

        let block_base = match stream_type {
            StreamType::Mpdx => 0, // absolute within the file already
            StreamType::Pcm => header.pcm_offset,
            StreamType::Apm => header.apm_offset,
            StreamType::Midi => header.midi_offset,
        };
        let absolute_offset = block_base + stream_offset;

        entries.push(BnmEntry {
            name,
            stream_type,
            sample_rate,
            channels,
            absolute_offset,
            stream_size,
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_header(pcm_offset: u32, apm_offset: u32) -> Vec<u8> {
        let mut h = Vec::new();
        h.extend_from_slice(&0u32.to_le_bytes()); // section_offset_0
        h.extend_from_slice(&0u32.to_le_bytes()); // section_offset_1
        h.extend_from_slice(&1u32.to_le_bytes()); // count_0
        h.extend_from_slice(&0u32.to_le_bytes()); // count_1
        h.extend_from_slice(&0u32.to_le_bytes()); // mpdx_offset
        h.extend_from_slice(&0u32.to_le_bytes()); // midi_offset
        h.extend_from_slice(&pcm_offset.to_le_bytes());
        h.extend_from_slice(&apm_offset.to_le_bytes());
        h.extend_from_slice(&0u32.to_le_bytes()); // streamed_offset
        h.extend_from_slice(&0u32.to_le_bytes()); // eof_offset
        h
    }

    fn build_entry(stream_type: u32, stream_offset: u32, name: &str) -> Vec<u8> {
        let mut e = Vec::new();
        e.extend_from_slice(&1234u32.to_le_bytes()); // stream_size
        e.extend_from_slice(&stream_offset.to_le_bytes());
        e.extend_from_slice(&22050u32.to_le_bytes()); // sample_rate
        e.extend_from_slice(&1u16.to_le_bytes()); // channels
        e.extend_from_slice(&0u16.to_le_bytes()); // unused
        e.extend_from_slice(&stream_type.to_le_bytes());
        let mut name_bytes = name.as_bytes().to_vec();
        name_bytes.resize(ENTRY_NAME_LEN, 0);
        e.extend_from_slice(&name_bytes);
        e.resize(ENTRY_SIZE_V1, 0);
        e
    }

    #[test]
    fn pcm_offset_is_block_relative() {
        let mut header_bytes = build_header(0x1000, 0x2000);
        let header = BnmHeader::parse(&header_bytes).unwrap();
        let entry_bytes = build_entry(1, 0x40, "step.pcm");
        header_bytes.extend_from_slice(&entry_bytes);
        let entries_offset = HEADER_LEN;

        let entries = read_entries(&header_bytes, &header, entries_offset, 1, 1).unwrap();
        assert_eq!(entries[0].absolute_offset, 0x1000 + 0x40);
        assert_eq!(entries[0].name, "step.pcm");
    }

    #[test]
    fn mpdx_offset_is_absolute() {
        let mut header_bytes = build_header(0x1000, 0x2000);
        let header = BnmHeader::parse(&header_bytes).unwrap();
        let entry_bytes = build_entry(2, 0x9000, "theme.mpdx");
        header_bytes.extend_from_slice(&entry_bytes);
        let entries = read_entries(&header_bytes, &header, HEADER_LEN, 1, 1).unwrap();
        assert_eq!(entries[0].absolute_offset, 0x9000);
    }
}
