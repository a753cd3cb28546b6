//! Asset archaeology for "Hype: The Time Quest" (OpenSpace Montreal engine).
//!
//! The crate is organized leaves-first, mirroring the data flow in spec §2:
//! bytes -> [`codec`] -> [`container`]/[`sna`]/[`reloc`] -> [`memory`] ->
//! typed walkers ([`scene`], [`geometry`], [`family`], [`script`],
//! [`texture`]) -> [`emit`] adapters. [`level`] ties the core pieces
//! together into one full-level decode. [`provider`] abstracts the two
//! supported input sources (ISO-9660 image, native directory).

pub mod codec;
pub mod container;
pub mod emit;
pub mod error;
pub mod family;
pub mod geometry;
pub mod level;
pub mod memory;
pub mod provider;
pub mod reloc;
pub mod scene;
pub mod script;
pub mod sna;
pub mod texture;
