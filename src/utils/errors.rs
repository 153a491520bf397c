use thiserror::Error;

/// Crate-wide error taxonomy. Variants map onto process exit codes in the
/// binary: IO/parse failures exit 1, structural PRG errors exit 2, lack of
/// data for confidence calibration exits 3, and impossible internal states
/// exit 4.
#[derive(Error, Debug)]
pub enum WeaverError {
    #[error("invalid PRG: {0}")]
    InvalidPrg(String),

    #[error("corrupted index: {0}")]
    CorruptedIndex(String),

    /// A read whose sequence contains characters outside {A,C,G,T,N} or is
    /// empty. Recovered locally: the read is counted as skipped and dropped.
    #[error("bad read: {0}")]
    BadRead(String),

    #[error("not enough data: {0}")]
    NotEnoughData(String),

    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),
}

pub type WeaverResult<T> = Result<T, WeaverError>;

impl WeaverError {
    pub fn exit_code(&self) -> i32 {
        match self {
            WeaverError::InvalidPrg(_) => 2,
            WeaverError::NotEnoughData(_) => 3,
            WeaverError::InternalInvariant(_) => 4,
            // Corrupted on-disk data is reported as a load failure
            _ => 1,
        }
    }
}
