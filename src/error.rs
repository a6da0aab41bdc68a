use thiserror::Error;

/// Errors that stop the decoder from reaching the file at all, or a single
/// positioned read that falls outside the declared file.
#[derive(Error, Debug)]
pub enum IndexDatError {
    #[error("read of {length} bytes at 0x{offset:X} is outside the file (size 0x{size:X})")]
    OutOfBounds { offset: u64, length: usize, size: u64 },

    #[error("file is {0} bytes, too small to hold an index.dat header")]
    TooSmall(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IndexDatError>;
