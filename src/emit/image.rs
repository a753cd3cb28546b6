//! PNG adapter for decoded RGBA8 texture buffers (spec §6: "an optional
//! PNG emitter is provided by a thin adapter").

use std::path::Path;

use anyhow::{Context, Result};
use image::{ImageBuffer, Rgba};

use crate::texture::GfTexture;

pub fn write_png(texture: &GfTexture, out_path: &Path) -> Result<()> {
    let buffer: ImageBuffer<Rgba<u8>, _> =
        ImageBuffer::from_raw(texture.width, texture.height, texture.rgba.clone()).ok_or_else(|| {
            anyhow::anyhow!(
                "texture buffer length {} does not match {}x{}",
                texture.rgba.len(),
                texture.width,
                texture.height
            )
        })?;

    buffer
        .save(out_path)
        .with_context(|| format!("failed to write PNG: {}", out_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_solid_color_png() {
        let texture = GfTexture {
            width: 2,
            height: 2,
            rgba: vec![255, 0, 0, 255].repeat(4),
        };
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.png");
        write_png(&texture, &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn mismatched_buffer_length_is_rejected() {
        let texture = GfTexture { width: 2, height: 2, rgba: vec![0u8; 3] };
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.png");
        assert!(write_png(&texture, &path).is_err());
    }
}
