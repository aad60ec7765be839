//! Expected negative outcomes of file-system operations.
//!
//! Broken invariants and exhausted fixed-size pools are not represented here: they panic,
//! because continuing would risk corrupting the disk image.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("file exists")]
    Exists,
    #[error("not a directory")]
    NotDir,
    #[error("is a directory")]
    IsDir,
    #[error("directory not empty")]
    NotEmpty,
    #[error("offset out of range")]
    OutOfRange,
    #[error("file too large")]
    FileTooLarge,
    #[error("file not open for reading")]
    NotReadable,
    #[error("file not open for writing")]
    NotWritable,
    #[error("no handler for device major {0}")]
    NoDevice(i16),
    #[error("file table full")]
    FileTableFull,
    #[error("invalid argument")]
    Invalid,
}

pub type Result<T> = core::result::Result<T, FsError>;
