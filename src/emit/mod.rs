//! Thin output adapters: glTF2 meshes, PNG images, WAV audio (spec §6).
//! None of these are part of the memory-image decode core; they convert
//! already-decoded in-memory records to files on disk.

pub mod audio;
pub mod glb;
pub mod gltf;
pub mod image;
