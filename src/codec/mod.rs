//! Codec layer: encryption, compression envelope, checksum, channel-RLE
//! (spec §4.1). Everything above the container readers builds on these.

pub mod checksum;
pub mod lzo;
pub mod rle;
pub mod xor;

pub use lzo::{decode_envelope, EnvelopeHeader};
