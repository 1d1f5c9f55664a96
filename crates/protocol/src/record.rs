//! Decoded log records
//!
//! The owned form of an ingress message, as stored in the log buffer. The
//! `len` field counts the payload only (`tag_len + content_len`), so size
//! accounting adds and removes the same number of bytes for a record.

use crate::timestamp::LogTimeStamp;
use crate::{MAX_LOG_LEN, MAX_TAG_LEN};

/// Number of distinct log types.
pub const LOG_TYPE_MAX: usize = 5;

/// Log type carried in the packed header.
///
/// Kernel messages are stored in their own list; all other types share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LogType {
    /// Application logs.
    App = 0,
    /// Init process logs.
    Init = 1,
    /// Security logs.
    Sec = 2,
    /// System core logs.
    Core = 3,
    /// Kernel messages.
    Kmsg = 4,
}

impl LogType {
    /// All types, in wire-value order.
    pub const ALL: [LogType; LOG_TYPE_MAX] = [
        LogType::App,
        LogType::Init,
        LogType::Sec,
        LogType::Core,
        LogType::Kmsg,
    ];

    /// Decode from the 4-bit wire value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::App),
            1 => Some(Self::Init),
            2 => Some(Self::Sec),
            3 => Some(Self::Core),
            4 => Some(Self::Kmsg),
            _ => None,
        }
    }

    /// The bit for this type in a types bitmask.
    pub fn bit(self) -> u16 {
        1 << (self as u16)
    }

    /// Index into per-type accounting arrays.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// One decoded log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Log type; selects the storage list and the accounting slot.
    pub ty: LogType,
    /// Log level, 0..=7. Levels 3..=7 render as D/I/W/E/F.
    pub level: u8,
    /// Tag length as transmitted, trailing NUL included.
    pub tag_len: u8,
    /// Sender process id.
    pub pid: u32,
    /// Sender thread id.
    pub tid: u32,
    /// 32-bit domain identifier grouping related sources.
    pub domain: u32,
    /// Client-side timestamp.
    pub ts: LogTimeStamp,
    /// Tag without the trailing NUL.
    pub tag: String,
    /// Content without the trailing NUL; may contain embedded newlines.
    pub content: String,
}

impl LogRecord {
    /// Content length as counted on the wire (trailing NUL included).
    pub fn content_len(&self) -> usize {
        self.content.len() + 1
    }

    /// Payload length: `tag_len + content_len`.
    ///
    /// Subtracting `tag_len` from this yields exactly the bytes that size
    /// accounting charged for the record.
    pub fn len(&self) -> usize {
        self.tag_len as usize + self.content_len()
    }

    /// Whether the record would be accepted by the buffer.
    pub fn is_valid(&self) -> bool {
        let tag_len = self.tag_len as usize;
        let content_len = self.content_len();
        (1..=MAX_TAG_LEN).contains(&tag_len) && (1..=MAX_LOG_LEN).contains(&content_len)
    }
}

/// Single-character rendering of a log level.
///
/// Levels outside the conventional 3..=7 range render as `?`.
pub fn level_char(level: u8) -> char {
    match level {
        3 => 'D',
        4 => 'I',
        5 => 'W',
        6 => 'E',
        7 => 'F',
        _ => '?',
    }
}
