//! Archive and container format readers (spec §4.2).

pub mod apm;
pub mod bnm;
pub mod cnt;
pub mod text;

pub use apm::{decode_body as decode_apm_body, ApmHeader};
pub use bnm::{read_entries as read_bnm_entries, BnmEntry, BnmHeader, StreamType};
pub use cnt::{CntArchive, CntFileEntry};
pub use text::StringTable;
