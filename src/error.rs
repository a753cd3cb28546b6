use std::io;

/// Error kinds produced by the core decode pipeline (spec §7).
///
/// Every variant is *reported*, never silently swallowed: batch operations
/// tally outcomes (see [`crate::BatchReport`]) rather than aborting on the
/// first failure.
#[derive(Debug)]
pub enum HypeError {
    /// Envelope lengths or counts contradict the file size, or a header
    /// magic/shape check failed. Fatal to the current file.
    MalformedFile(String),

    /// The Adler-variant checksum disagreed after decode. Fatal to the
    /// current block.
    ChecksumMismatch { expected: u32, actual: u32 },

    /// A record pointer resolved to no block. Fatal to the current record
    /// only — the walker that produced it skips the record and continues.
    UnmappedAddress(u32),

    /// A record decoded successfully but its fields contradict one of the
    /// invariants in spec §3. Same policy as `UnmappedAddress`.
    InvariantViolation(String),

    /// A format version outside the Montreal variant scope. Fatal to the
    /// file.
    UnsupportedVariant(String),

    /// Cancellation was observed; no further I/O was performed.
    Cancelled,

    /// Underlying I/O failure.
    Io(io::Error),
}

impl std::fmt::Display for HypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HypeError::MalformedFile(msg) => write!(f, "malformed file: {}", msg),
            HypeError::ChecksumMismatch { expected, actual } => write!(
                f,
                "checksum mismatch: expected {:#010x}, got {:#010x}",
                expected, actual
            ),
            HypeError::UnmappedAddress(addr) => {
                write!(f, "address {:#010x} does not resolve to any block", addr)
            }
            HypeError::InvariantViolation(msg) => write!(f, "invariant violation: {}", msg),
            HypeError::UnsupportedVariant(msg) => write!(f, "unsupported format variant: {}", msg),
            HypeError::Cancelled => write!(f, "operation cancelled"),
            HypeError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for HypeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HypeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for HypeError {
    fn from(err: io::Error) -> Self {
        HypeError::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, HypeError>;

/// Cooperative cancellation token, checked at the top of per-block,
/// per-file and per-entry enumeration loops (spec §5).
#[derive(Clone, Default)]
pub struct CancelToken(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Outcome tally for a batch operation over many files/records (spec §7).
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchReport {
    pub fn record_ok(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    pub fn record_cancelled(&mut self) {
        self.cancelled += 1;
    }

    /// Exit code policy from spec §7: non-zero iff `failed > 0`.
    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 {
            1
        } else {
            0
        }
    }
}
