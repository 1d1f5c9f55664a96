//! Ember - Protocol
//!
//! Wire types shared between the daemon, the client library and the CLI:
//! log records, timestamps, query conditions and the ingress packet codec.
//!
//! # Ingress packet
//!
//! Each packet is self-framed by its leading length field (little-endian,
//! packed):
//!
//! ```text
//! ┌───────┬──────────────────────────┬─────────┬─────────┬───────┬───────┬────────┐
//! │ len   │ version:3 type:4 level:3 │ tv_sec  │ tv_nsec │ pid   │ tid   │ domain │
//! │ u16   │ tag_len:6          (u16) │ u32     │ u32     │ u32   │ u32   │ u32    │
//! ├───────┴──────────────────────────┴─────────┴─────────┴───────┴───────┴────────┤
//! │ tag (tag_len bytes, NUL-terminated) │ content (len - 24 - tag_len, NUL-term.) │
//! └────────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `len` counts the whole packet including the 24-byte header. Content length
//! must satisfy `0 < len - 24 - tag_len <= 1024`.

mod error;
mod packet;
mod query;
mod record;
mod timestamp;

pub use error::{ErrorCode, PacketError};
pub use packet::{decode_packet, encode_packet, PACKET_HEADER_LEN};
pub use query::QueryCondition;
pub use record::{level_char, LogRecord, LogType, LOG_TYPE_MAX};
pub use timestamp::LogTimeStamp;

/// Maximum length of one log content, including the trailing NUL.
pub const MAX_LOG_LEN: usize = 1024;

/// Maximum tag length, including the trailing NUL.
pub const MAX_TAG_LEN: usize = 32;

/// Limits on query condition list sizes.
pub const MAX_PIDS: usize = 5;
pub const MAX_DOMAINS: usize = 5;
pub const MAX_TAGS: usize = 10;

/// Domain values >= this match a record's domain exactly.
pub const DOMAIN_STRICT_MASK: u32 = 0x0d00_0000;

/// Domain values <= this match `record.domain >> DOMAIN_MODULE_BITS`.
pub const DOMAIN_FUZZY_MASK: u32 = 0x000d_ffff;

/// Bits dropped from a record's domain for a fuzzy comparison.
pub const DOMAIN_MODULE_BITS: u32 = 8;

/// Socket directory for the daemon's unix sockets.
#[cfg(not(target_env = "musl"))]
pub const SOCKET_FILE_DIR: &str = "/dev/socket/";
#[cfg(target_env = "musl")]
pub const SOCKET_FILE_DIR: &str = "/dev/unix/socket/";

/// Name of the log ingress socket.
pub const INPUT_SOCKET_NAME: &str = "hilogInput";

/// Name of the control socket.
pub const CONTROL_SOCKET_NAME: &str = "hilogControl";

/// Tag attached to every reader delivery.
///
/// The values are part of the client ABI and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SendId {
    /// Reached the end of the buffered log.
    EndOfStream = 0,
    /// A normal record delivery.
    Normal = 1,
    /// New data became available while the client was waiting.
    NewData = 2,
}

impl SendId {
    /// Decode a send-id from its wire value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::EndOfStream),
            1 => Some(Self::Normal),
            2 => Some(Self::NewData),
            _ => None,
        }
    }
}
