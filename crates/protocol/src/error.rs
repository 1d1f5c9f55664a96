//! Protocol error types
//!
//! `ErrorCode` is the daemon's client-facing error enumeration; its values
//! are pinned for compatibility with deployed client tools. `PacketError`
//! covers ingress packet decoding and stays internal to the daemon.

use thiserror::Error;

/// Client-facing error codes.
///
/// The numeric values are frozen; new codes may only be appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[repr(i32)]
pub enum ErrorCode {
    #[error("invalid log level")]
    LogLevelInvalid = -1,
    #[error("invalid log type")]
    LogTypeInvalid = -2,
    #[error("invalid query level")]
    QueryLevelInvalid = -3,
    #[error("invalid query tag")]
    QueryTagInvalid = -4,
    #[error("invalid query pid")]
    QueryPidInvalid = -5,
    #[error("invalid query type")]
    QueryTypeInvalid = -6,
    #[error("invalid buffer size")]
    BuffSizeInvalid = -7,
    #[error("buffer resize failed")]
    BuffSizeExp = -8,
    #[error("invalid persist file size")]
    PersistFileSizeInvalid = -9,
    #[error("invalid persist file name")]
    PersistFileNameInvalid = -10,
    #[error("persist file path error")]
    PersistFilePathExp = -11,
    #[error("compressor init failed")]
    PersistCompressInitFail = -12,
    #[error("persist file open failed")]
    PersistFileOpenFail = -13,
    #[error("persist mmap failed")]
    PersistMmapFail = -14,
    #[error("persist job id error")]
    PersistJobIdFail = -15,
    #[error("invalid domain")]
    DomainInvalid = -16,
    #[error("memory allocation failed")]
    MemAllocFail = -17,
    #[error("invalid message length")]
    MsgLenInvalid = -18,
    #[error("invalid property value")]
    PropertyValueInvalid = -19,
    #[error("log content is null")]
    LogContentNull = -20,
    #[error("command not found")]
    CommandNotFound = -21,
    #[error("invalid format")]
    FormatInvalid = -22,
}

impl ErrorCode {
    /// The frozen wire value.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Decode a wire value back into a code.
    pub fn from_i32(value: i32) -> Option<Self> {
        use ErrorCode::*;
        Some(match value {
            -1 => LogLevelInvalid,
            -2 => LogTypeInvalid,
            -3 => QueryLevelInvalid,
            -4 => QueryTagInvalid,
            -5 => QueryPidInvalid,
            -6 => QueryTypeInvalid,
            -7 => BuffSizeInvalid,
            -8 => BuffSizeExp,
            -9 => PersistFileSizeInvalid,
            -10 => PersistFileNameInvalid,
            -11 => PersistFilePathExp,
            -12 => PersistCompressInitFail,
            -13 => PersistFileOpenFail,
            -14 => PersistMmapFail,
            -15 => PersistJobIdFail,
            -16 => DomainInvalid,
            -17 => MemAllocFail,
            -18 => MsgLenInvalid,
            -19 => PropertyValueInvalid,
            -20 => LogContentNull,
            -21 => CommandNotFound,
            -22 => FormatInvalid,
            _ => return None,
        })
    }
}

/// Errors that can occur while decoding an ingress packet.
#[derive(Debug, Error)]
pub enum PacketError {
    /// Frame is shorter than the fixed header.
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    /// The length field disagrees with the bytes on hand.
    #[error("packet length mismatch: header says {header}, frame has {actual}")]
    LengthMismatch { header: usize, actual: usize },

    /// Tag length outside `1..=32`.
    #[error("invalid tag length: {0}")]
    InvalidTagLen(usize),

    /// Content length outside `1..=1024`.
    #[error("invalid content length: {0}")]
    InvalidContentLen(isize),

    /// Log type value outside the known range.
    #[error("invalid log type: {0}")]
    InvalidLogType(u8),
}
