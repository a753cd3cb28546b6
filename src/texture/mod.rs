//! Texture decoding (spec §4.5).

pub mod gf;

pub use gf::{decode as decode_gf, flip_vertical, needs_vertical_flip, GfTexture};
