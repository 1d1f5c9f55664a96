//! Ingress packet codec
//!
//! Decodes the length-prefixed ingress frame into a [`LogRecord`] and encodes
//! records back into frames for the client library and tests. All multi-byte
//! fields are little-endian; the second header word packs
//! `version:3 type:4 level:3 tag_len:6` from the low bits up.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::PacketError;
use crate::record::{LogRecord, LogType};
use crate::timestamp::LogTimeStamp;
use crate::{MAX_LOG_LEN, MAX_TAG_LEN};

/// Fixed header size in bytes.
pub const PACKET_HEADER_LEN: usize = 24;

/// Decode one complete ingress frame.
///
/// `frame` must contain exactly the bytes announced by the leading length
/// field. Tag and content bytes are taken up to their trailing NUL; invalid
/// UTF-8 is replaced rather than rejected.
pub fn decode_packet(frame: &[u8]) -> Result<LogRecord, PacketError> {
    if frame.len() < PACKET_HEADER_LEN {
        return Err(PacketError::TooShort {
            expected: PACKET_HEADER_LEN,
            actual: frame.len(),
        });
    }

    let mut buf = frame;
    let len = buf.get_u16_le() as usize;
    if len != frame.len() {
        return Err(PacketError::LengthMismatch {
            header: len,
            actual: frame.len(),
        });
    }

    let packed = buf.get_u16_le();
    let ty = ((packed >> 3) & 0x0f) as u8;
    let level = ((packed >> 7) & 0x07) as u8;
    let tag_len = ((packed >> 10) & 0x3f) as usize;

    let ty = LogType::from_u8(ty).ok_or(PacketError::InvalidLogType(ty))?;
    if !(1..=MAX_TAG_LEN).contains(&tag_len) {
        return Err(PacketError::InvalidTagLen(tag_len));
    }

    let tv_sec = buf.get_u32_le();
    let tv_nsec = buf.get_u32_le();
    let pid = buf.get_u32_le();
    let tid = buf.get_u32_le();
    let domain = buf.get_u32_le();

    let content_len = len as isize - PACKET_HEADER_LEN as isize - tag_len as isize;
    if content_len <= 0 || content_len > MAX_LOG_LEN as isize {
        return Err(PacketError::InvalidContentLen(content_len));
    }
    let content_len = content_len as usize;

    let tag = take_nul_terminated(&buf[..tag_len]);
    let content = take_nul_terminated(&buf[tag_len..tag_len + content_len]);

    Ok(LogRecord {
        ty,
        level,
        tag_len: tag_len as u8,
        pid,
        tid,
        domain,
        ts: LogTimeStamp::new(tv_sec, tv_nsec),
        tag,
        content,
    })
}

/// Encode a record into a complete ingress frame.
///
/// The inverse of [`decode_packet`]; the version bits are written as zero.
pub fn encode_packet(record: &LogRecord) -> BytesMut {
    let tag_len = record.tag.len() + 1;
    let content_len = record.content.len() + 1;
    let total = PACKET_HEADER_LEN + tag_len + content_len;

    let mut buf = BytesMut::with_capacity(total);
    buf.put_u16_le(total as u16);

    let packed = ((record.ty as u16) << 3)
        | ((record.level as u16 & 0x07) << 7)
        | ((tag_len as u16 & 0x3f) << 10);
    buf.put_u16_le(packed);

    buf.put_u32_le(record.ts.sec);
    buf.put_u32_le(record.ts.nsec);
    buf.put_u32_le(record.pid);
    buf.put_u32_le(record.tid);
    buf.put_u32_le(record.domain);

    buf.put_slice(record.tag.as_bytes());
    buf.put_u8(0);
    buf.put_slice(record.content.as_bytes());
    buf.put_u8(0);

    buf
}

/// String up to (not including) the first NUL, lossily decoded.
fn take_nul_terminated(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
#[path = "packet_test.rs"]
mod packet_test;
