//! Persistence error types

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use ember_protocol::ErrorCode;

use crate::compress::CompressError;

/// Errors from the persistence pipeline.
#[derive(Debug, Error)]
pub enum PersistError {
    /// A job with this id is already running.
    #[error("persist job {0} already exists")]
    DuplicateJobId(u32),

    /// Another job already writes to this path.
    #[error("output path already in use: {0}")]
    DuplicatePath(PathBuf),

    /// The output path has no usable parent directory.
    #[error("invalid output path: {0}")]
    InvalidPath(PathBuf),

    /// Rejected file size or file count.
    #[error("invalid rotation parameters: size {file_size}, num {file_num}")]
    InvalidFileParams { file_size: u32, file_num: u32 },

    /// Opening a persistence file failed.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Mapping the staging region failed.
    #[error("failed to map staging region: {0}")]
    Mmap(#[source] io::Error),

    /// Other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Compression failure; staged bytes stay put for a later retry.
    #[error(transparent)]
    Compress(#[from] CompressError),
}

impl PersistError {
    /// The frozen client-facing code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::DuplicateJobId(_) => ErrorCode::PersistJobIdFail,
            Self::DuplicatePath(_) => ErrorCode::PersistFileNameInvalid,
            Self::InvalidPath(_) => ErrorCode::PersistFilePathExp,
            Self::InvalidFileParams { .. } => ErrorCode::PersistFileSizeInvalid,
            Self::Open { .. } => ErrorCode::PersistFileOpenFail,
            Self::Mmap(_) => ErrorCode::PersistMmapFail,
            Self::Io(_) => ErrorCode::PersistFileOpenFail,
            Self::Compress(_) => ErrorCode::PersistCompressInitFail,
        }
    }
}
