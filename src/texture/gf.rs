//! GF texture decoder, Montreal dialect (spec §4.5).
//!
//! Header: `version, width, height, channels, repeat_byte, palette_colors,
//! palette_bytes_per_color, [3 unknown bytes], u32, channel_pixels,
//! montreal_type`. Channel planes are RLE-decoded independently and then
//! interleaved before being converted to RGBA8 per `montreal_type`.

use crate::codec::rle;
use crate::error::{HypeError, Result};
use std::io::{Cursor, Read};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MontrealPixelFormat {
    Palette,
    Rgb565,
    Argb1555,
    Argb4444,
    /// Channels >= 3: raw BGR(A) byte tuples, swapped to RGBA on decode.
    Bgra { channels: u8 },
}

impl MontrealPixelFormat {
    fn from_type_and_channels(montreal_type: u8, channels: u8) -> Result<Self> {
        match montreal_type {
            5 => Ok(MontrealPixelFormat::Palette),
            10 => Ok(MontrealPixelFormat::Rgb565),
            11 => Ok(MontrealPixelFormat::Argb1555),
            12 => Ok(MontrealPixelFormat::Argb4444),
            _ if channels >= 3 => Ok(MontrealPixelFormat::Bgra { channels }),
            other => Err(HypeError::UnsupportedVariant(format!(
                "unknown GF montreal_type {other} with {channels} channels"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GfTexture {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 pixels, `width * height * 4` bytes.
    pub rgba: Vec<u8>,
}

fn read_u8(c: &mut Cursor<&[u8]>) -> Result<u8> {
    let mut b = [0u8; 1];
    c.read_exact(&mut b)?;
    Ok(b[0])
}

fn read_u16(c: &mut Cursor<&[u8]>) -> Result<u16> {
    let mut b = [0u8; 2];
    c.read_exact(&mut b)?;
    Ok(u16::from_le_bytes(b))
}

fn read_u32(c: &mut Cursor<&[u8]>) -> Result<u32> {
    let mut b = [0u8; 4];
    c.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

/// Whether textures from this source should be emitted upside-down-flipped
/// per spec §4.5 ("Orientation"): GPU textures (`Textures.cnt`) get flipped
/// unless they happen to be 640x480; `Vignette.cnt`/640x480 images pass
/// through as-is.
pub fn needs_vertical_flip(source_is_textures_cnt: bool, width: u32, height: u32) -> bool {
    source_is_textures_cnt && !(width == 640 && height == 480)
}

pub fn decode(data: &[u8]) -> Result<GfTexture> {
    let mut cursor = Cursor::new(data);

    let _version = read_u8(&mut cursor)?;
    let width = read_u32(&mut cursor)?;
    let height = read_u32(&mut cursor)?;
    let channels = read_u8(&mut cursor)?;
    let repeat_byte = read_u8(&mut cursor)?;
    let palette_colors = read_u16(&mut cursor)?;
    let palette_bytes_per_color = read_u8(&mut cursor)?;
    let _unk = [read_u8(&mut cursor)?, read_u8(&mut cursor)?, read_u8(&mut cursor)?];
    let _unk_u32 = read_u32(&mut cursor)?;
    let channel_pixels = read_u32(&mut cursor)?;
    let montreal_type = read_u8(&mut cursor)?;

    if channels == 0 {
        return Err(HypeError::MalformedFile("GF texture declares zero channels".into()));
    }

    let palette = if palette_colors > 0 {
        let palette_len = palette_colors as usize * palette_bytes_per_color as usize;
        let mut buf = vec![0u8; palette_len];
        cursor.read_exact(&mut buf)?;
        Some(buf)
    } else {
        None
    };

    let pixel_count = (width as usize) * (height as usize);
    if channel_pixels as usize < pixel_count {
        return Err(HypeError::InvariantViolation(format!(
            "GF channel_pixels ({channel_pixels}) smaller than width*height ({pixel_count})"
        )));
    }

    // Remaining input is one RLE stream per channel, back-to-back.
    let mut channel_planes: Vec<Vec<u8>> = Vec::with_capacity(channels as usize);
    let mut offset = cursor.position() as usize;
    for _ in 0..channels {
        let (decoded, consumed) =
            rle::decode_channel_with_len(&data[offset..], repeat_byte, channel_pixels as usize)?;
        offset += consumed;
        // Keep only the first `pixel_count` bytes: later bytes belong to
        // discarded mipmap levels (spec §4.5).
        channel_planes.push(decoded[..pixel_count].to_vec());
    }

    let format = MontrealPixelFormat::from_type_and_channels(montreal_type, channels)?;
    let rgba = interleave_and_convert(&channel_planes, pixel_count, format, palette.as_deref(), palette_bytes_per_color)?;

    Ok(GfTexture { width, height, rgba })
}

fn interleave_and_convert(
    planes: &[Vec<u8>],
    pixel_count: usize,
    format: MontrealPixelFormat,
    palette: Option<&[u8]>,
    palette_bytes_per_color: u8,
) -> Result<Vec<u8>> {
    let mut rgba = vec![0u8; pixel_count * 4];

    match format {
        MontrealPixelFormat::Palette => {
            let palette = palette.ok_or_else(|| {
                HypeError::InvariantViolation("indexed GF texture has no palette".into())
            })?;
            let stride = palette_bytes_per_color as usize;
            for i in 0..pixel_count {
                let index = planes[0][i] as usize;
                let entry = index * stride;
                let (b, g, r, a) = if stride == 4 {
                    (
                        palette[entry],
                        palette[entry + 1],
                        palette[entry + 2],
                        palette[entry + 3],
                    )
                } else {
                    (palette[entry], palette[entry + 1], palette[entry + 2], 255)
                };
                rgba[i * 4] = r;
                rgba[i * 4 + 1] = g;
                rgba[i * 4 + 2] = b;
                rgba[i * 4 + 3] = a;
            }
        }
        MontrealPixelFormat::Rgb565 => {
            for i in 0..pixel_count {
                let lo = planes[0][i] as u16;
                let hi = planes[1][i] as u16;
                let value = lo | (hi << 8);
                let r5 = (value >> 11) & 0x1F;
                let g6 = (value >> 5) & 0x3F;
                let b5 = value & 0x1F;
                rgba[i * 4] = (r5 * 255 / 31) as u8;
                rgba[i * 4 + 1] = (g6 * 255 / 63) as u8;
                rgba[i * 4 + 2] = (b5 * 255 / 31) as u8;
                rgba[i * 4 + 3] = 255;
            }
        }
        MontrealPixelFormat::Argb1555 => {
            for i in 0..pixel_count {
                let lo = planes[0][i] as u16;
                let hi = planes[1][i] as u16;
                let value = lo | (hi << 8);
                let a = (value >> 15) & 0x1;
                let r5 = (value >> 10) & 0x1F;
                let g5 = (value >> 5) & 0x1F;
                let b5 = value & 0x1F;
                rgba[i * 4] = (r5 * 255 / 31) as u8;
                rgba[i * 4 + 1] = (g5 * 255 / 31) as u8;
                rgba[i * 4 + 2] = (b5 * 255 / 31) as u8;
                rgba[i * 4 + 3] = if a != 0 { 255 } else { 0 };
            }
        }
        MontrealPixelFormat::Argb4444 => {
            for i in 0..pixel_count {
                let lo = planes[0][i] as u16;
                let hi = planes[1][i] as u16;
                let value = lo | (hi << 8);
                let a4 = (value >> 12) & 0xF;
                let r4 = (value >> 8) & 0xF;
                let g4 = (value >> 4) & 0xF;
                let b4 = value & 0xF;
                rgba[i * 4] = (r4 * 255 / 15) as u8;
                rgba[i * 4 + 1] = (g4 * 255 / 15) as u8;
                rgba[i * 4 + 2] = (b4 * 255 / 15) as u8;
                rgba[i * 4 + 3] = (a4 * 255 / 15) as u8;
            }
        }
        MontrealPixelFormat::Bgra { channels } => {
            for i in 0..pixel_count {
                let b = planes[0][i];
                let g = planes[1][i];
                let r = planes[2][i];
                let a = if channels >= 4 { planes[3][i] } else { 255 };
                rgba[i * 4] = r;
                rgba[i * 4 + 1] = g;
                rgba[i * 4 + 2] = b;
                rgba[i * 4 + 3] = a;
            }
        }
    }

    Ok(rgba)
}

/// Flips an RGBA8 buffer vertically in place (spec §4.5, "Orientation").
pub fn flip_vertical(rgba: &mut [u8], width: u32, height: u32) {
    let stride = width as usize * 4;
    let height = height as usize;
    for row in 0..height / 2 {
        let top = row * stride;
        let bottom = (height - 1 - row) * stride;
        for i in 0..stride {
            rgba.swap(top + i, bottom + i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_rgb565_gf(width: u32, height: u32, pixels: &[u16]) -> Vec<u8> {
        let pixel_count = (width * height) as usize;
        assert_eq!(pixels.len(), pixel_count);
        let repeat_byte = 0xFF; // must not occur literally in test data
        let mut lo = Vec::with_capacity(pixel_count);
        let mut hi = Vec::with_capacity(pixel_count);
        for &p in pixels {
            lo.push((p & 0xFF) as u8);
            hi.push((p >> 8) as u8);
        }

        let mut buf = Vec::new();
        buf.push(1u8); // version
        buf.extend_from_slice(&width.to_le_bytes());
        buf.extend_from_slice(&height.to_le_bytes());
        buf.push(2); // channels
        buf.push(repeat_byte);
        buf.extend_from_slice(&0u16.to_le_bytes()); // palette_colors
        buf.push(0); // palette_bytes_per_color
        buf.extend_from_slice(&[0, 0, 0]);
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&(pixel_count as u32).to_le_bytes()); // channel_pixels
        buf.push(10); // montreal_type = RGB565
        buf.extend_from_slice(&lo);
        buf.extend_from_slice(&hi);
        buf
    }

    #[test]
    fn decodes_rgb565_dimensions() {
        let data = build_rgb565_gf(2, 2, &[0xF800, 0x07E0, 0x001F, 0xFFFF]);
        let tex = decode(&data).unwrap();
        assert_eq!(tex.width, 2);
        assert_eq!(tex.height, 2);
        // spec §8 property 6.
        assert_eq!(tex.rgba.len(), 4 * 2 * 2);
        // Pure red.
        assert_eq!(&tex.rgba[0..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn flip_vertical_swaps_rows() {
        let mut rgba = vec![
            1, 1, 1, 255, 2, 2, 2, 255, // row 0
            3, 3, 3, 255, 4, 4, 4, 255, // row 1
        ];
        flip_vertical(&mut rgba, 2, 2);
        assert_eq!(rgba, vec![3, 3, 3, 255, 4, 4, 4, 255, 1, 1, 1, 255, 2, 2, 2, 255]);
    }

    #[test]
    fn orientation_rule() {
        assert!(needs_vertical_flip(true, 256, 256));
        assert!(!needs_vertical_flip(true, 640, 480));
        assert!(!needs_vertical_flip(false, 256, 256));
    }
}
