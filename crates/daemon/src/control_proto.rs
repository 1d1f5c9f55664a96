//! Control socket wire protocol
//!
//! Simple length-prefixed binary messages, kept language-neutral for client
//! tools.
//!
//! # Wire Format
//!
//! ```text
//! ┌──────────────┬──────────┬──────────────────────────┐
//! │ 4 bytes      │ 1 byte   │ N bytes                  │
//! │ length (BE)  │ msg type │ fields                   │
//! └──────────────┴──────────┴──────────────────────────┘
//! ```
//!
//! Strings are `u16` length + bytes; numeric lists are a `u8` count +
//! values. All integers are big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use ember_protocol::QueryCondition;

/// Largest accepted control frame.
pub const MAX_CONTROL_FRAME: usize = 64 * 1024;

const REQ_TAIL: u8 = 0x01;
const REQ_BUFFER_SIZE_GET: u8 = 0x02;
const REQ_BUFFER_SIZE_SET: u8 = 0x03;
const REQ_BUFFER_CLEAR: u8 = 0x04;
const REQ_STATS_TYPE: u8 = 0x05;
const REQ_STATS_DOMAIN: u8 = 0x06;
const REQ_STATS_CLEAR_TYPE: u8 = 0x07;
const REQ_STATS_CLEAR_DOMAIN: u8 = 0x08;
const REQ_PERSIST_START: u8 = 0x09;
const REQ_PERSIST_STOP: u8 = 0x0a;
const REQ_PERSIST_QUERY: u8 = 0x0b;

const RSP_ACK: u8 = 0x10;
const RSP_BUFFER_SIZE: u8 = 0x11;
const RSP_REMOVED: u8 = 0x12;
const RSP_STATS: u8 = 0x13;
const RSP_PERSIST_JOBS: u8 = 0x14;
const RSP_TAIL_RECORD: u8 = 0x15;

/// Control protocol errors.
#[derive(Debug, Error)]
pub enum ControlProtoError {
    /// Frame ended before a field was complete.
    #[error("truncated control message")]
    Truncated,

    /// Unknown message discriminant.
    #[error("unknown control message type: {0:#04x}")]
    UnknownMessage(u8),

    /// String field held invalid UTF-8.
    #[error("invalid string field")]
    BadString,

    /// Frame exceeds [`MAX_CONTROL_FRAME`].
    #[error("control frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// Socket error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Client-to-daemon commands.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    /// Start a live tail stream with the given filter.
    Tail { condition: QueryCondition },
    /// Read a type's buffer budget.
    BufferSizeGet { ty: u8 },
    /// Change a type's buffer budget.
    BufferSizeSet { ty: u8, size: u64 },
    /// Drop all buffered records of a type.
    BufferClear { ty: u8 },
    /// Read statistic counters for a type.
    StatsOfType { ty: u8 },
    /// Read statistic counters for a domain.
    StatsOfDomain { domain: u32 },
    /// Reset statistic counters for a type.
    StatsClearType { ty: u8 },
    /// Reset statistic counters for a domain.
    StatsClearDomain { domain: u32 },
    /// Start a persist job.
    PersistStart {
        id: u32,
        path: String,
        compress_alg: u16,
        compress_type: u16,
        file_size: u32,
        file_num: u32,
        condition: QueryCondition,
    },
    /// Stop a persist job.
    PersistStop { id: u32 },
    /// List persist jobs matching a type mask.
    PersistQuery { type_mask: u16 },
}

/// One persist job in a [`ControlResponse::PersistJobs`] reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescription {
    pub job_id: u32,
    pub path: String,
    pub compress_type: u16,
    pub compress_alg: u16,
    pub file_size: u32,
    pub file_num: u32,
    pub log_type: u16,
}

/// Daemon-to-client replies.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlResponse {
    /// Command outcome: 0 for success, a frozen error code otherwise.
    Ack { code: i32 },
    /// Reply to `BufferSizeGet`.
    BufferSize { size: u64 },
    /// Reply to `BufferClear`: content bytes removed.
    Removed { bytes: u64 },
    /// Reply to the statistics queries.
    Stats {
        print_len: u64,
        cache_len: u64,
        dropped: u64,
    },
    /// Reply to `PersistQuery`.
    PersistJobs { jobs: Vec<JobDescription> },
    /// One tail delivery; `line` is empty for end-of-stream markers.
    TailRecord { send_id: u8, line: String },
}

impl ControlRequest {
    /// Encode into a complete frame, length prefix included.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u32(0);

        match self {
            Self::Tail { condition } => {
                buf.put_u8(REQ_TAIL);
                encode_condition(condition, &mut buf);
            }
            Self::BufferSizeGet { ty } => {
                buf.put_u8(REQ_BUFFER_SIZE_GET);
                buf.put_u8(*ty);
            }
            Self::BufferSizeSet { ty, size } => {
                buf.put_u8(REQ_BUFFER_SIZE_SET);
                buf.put_u8(*ty);
                buf.put_u64(*size);
            }
            Self::BufferClear { ty } => {
                buf.put_u8(REQ_BUFFER_CLEAR);
                buf.put_u8(*ty);
            }
            Self::StatsOfType { ty } => {
                buf.put_u8(REQ_STATS_TYPE);
                buf.put_u8(*ty);
            }
            Self::StatsOfDomain { domain } => {
                buf.put_u8(REQ_STATS_DOMAIN);
                buf.put_u32(*domain);
            }
            Self::StatsClearType { ty } => {
                buf.put_u8(REQ_STATS_CLEAR_TYPE);
                buf.put_u8(*ty);
            }
            Self::StatsClearDomain { domain } => {
                buf.put_u8(REQ_STATS_CLEAR_DOMAIN);
                buf.put_u32(*domain);
            }
            Self::PersistStart {
                id,
                path,
                compress_alg,
                compress_type,
                file_size,
                file_num,
                condition,
            } => {
                buf.put_u8(REQ_PERSIST_START);
                buf.put_u32(*id);
                encode_string(path, &mut buf);
                buf.put_u16(*compress_alg);
                buf.put_u16(*compress_type);
                buf.put_u32(*file_size);
                buf.put_u32(*file_num);
                encode_condition(condition, &mut buf);
            }
            Self::PersistStop { id } => {
                buf.put_u8(REQ_PERSIST_STOP);
                buf.put_u32(*id);
            }
            Self::PersistQuery { type_mask } => {
                buf.put_u8(REQ_PERSIST_QUERY);
                buf.put_u16(*type_mask);
            }
        }

        finish_frame(buf)
    }

    /// Decode from a frame body (after the length prefix).
    pub fn decode(mut buf: Bytes) -> Result<Self, ControlProtoError> {
        let msg_type = take_u8(&mut buf)?;
        match msg_type {
            REQ_TAIL => Ok(Self::Tail {
                condition: decode_condition(&mut buf)?,
            }),
            REQ_BUFFER_SIZE_GET => Ok(Self::BufferSizeGet {
                ty: take_u8(&mut buf)?,
            }),
            REQ_BUFFER_SIZE_SET => Ok(Self::BufferSizeSet {
                ty: take_u8(&mut buf)?,
                size: take_u64(&mut buf)?,
            }),
            REQ_BUFFER_CLEAR => Ok(Self::BufferClear {
                ty: take_u8(&mut buf)?,
            }),
            REQ_STATS_TYPE => Ok(Self::StatsOfType {
                ty: take_u8(&mut buf)?,
            }),
            REQ_STATS_DOMAIN => Ok(Self::StatsOfDomain {
                domain: take_u32(&mut buf)?,
            }),
            REQ_STATS_CLEAR_TYPE => Ok(Self::StatsClearType {
                ty: take_u8(&mut buf)?,
            }),
            REQ_STATS_CLEAR_DOMAIN => Ok(Self::StatsClearDomain {
                domain: take_u32(&mut buf)?,
            }),
            REQ_PERSIST_START => Ok(Self::PersistStart {
                id: take_u32(&mut buf)?,
                path: decode_string(&mut buf)?,
                compress_alg: take_u16(&mut buf)?,
                compress_type: take_u16(&mut buf)?,
                file_size: take_u32(&mut buf)?,
                file_num: take_u32(&mut buf)?,
                condition: decode_condition(&mut buf)?,
            }),
            REQ_PERSIST_STOP => Ok(Self::PersistStop {
                id: take_u32(&mut buf)?,
            }),
            REQ_PERSIST_QUERY => Ok(Self::PersistQuery {
                type_mask: take_u16(&mut buf)?,
            }),
            other => Err(ControlProtoError::UnknownMessage(other)),
        }
    }
}

impl ControlResponse {
    /// Encode into a complete frame, length prefix included.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u32(0);

        match self {
            Self::Ack { code } => {
                buf.put_u8(RSP_ACK);
                buf.put_i32(*code);
            }
            Self::BufferSize { size } => {
                buf.put_u8(RSP_BUFFER_SIZE);
                buf.put_u64(*size);
            }
            Self::Removed { bytes } => {
                buf.put_u8(RSP_REMOVED);
                buf.put_u64(*bytes);
            }
            Self::Stats {
                print_len,
                cache_len,
                dropped,
            } => {
                buf.put_u8(RSP_STATS);
                buf.put_u64(*print_len);
                buf.put_u64(*cache_len);
                buf.put_u64(*dropped);
            }
            Self::PersistJobs { jobs } => {
                buf.put_u8(RSP_PERSIST_JOBS);
                buf.put_u32(jobs.len() as u32);
                for job in jobs {
                    buf.put_u32(job.job_id);
                    encode_string(&job.path, &mut buf);
                    buf.put_u16(job.compress_type);
                    buf.put_u16(job.compress_alg);
                    buf.put_u32(job.file_size);
                    buf.put_u32(job.file_num);
                    buf.put_u16(job.log_type);
                }
            }
            Self::TailRecord { send_id, line } => {
                buf.put_u8(RSP_TAIL_RECORD);
                buf.put_u8(*send_id);
                encode_string(line, &mut buf);
            }
        }

        finish_frame(buf)
    }

    /// Decode from a frame body (after the length prefix).
    pub fn decode(mut buf: Bytes) -> Result<Self, ControlProtoError> {
        let msg_type = take_u8(&mut buf)?;
        match msg_type {
            RSP_ACK => Ok(Self::Ack {
                code: take_u32(&mut buf)? as i32,
            }),
            RSP_BUFFER_SIZE => Ok(Self::BufferSize {
                size: take_u64(&mut buf)?,
            }),
            RSP_REMOVED => Ok(Self::Removed {
                bytes: take_u64(&mut buf)?,
            }),
            RSP_STATS => Ok(Self::Stats {
                print_len: take_u64(&mut buf)?,
                cache_len: take_u64(&mut buf)?,
                dropped: take_u64(&mut buf)?,
            }),
            RSP_PERSIST_JOBS => {
                let count = take_u32(&mut buf)? as usize;
                let mut jobs = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    jobs.push(JobDescription {
                        job_id: take_u32(&mut buf)?,
                        path: decode_string(&mut buf)?,
                        compress_type: take_u16(&mut buf)?,
                        compress_alg: take_u16(&mut buf)?,
                        file_size: take_u32(&mut buf)?,
                        file_num: take_u32(&mut buf)?,
                        log_type: take_u16(&mut buf)?,
                    });
                }
                Ok(Self::PersistJobs { jobs })
            }
            RSP_TAIL_RECORD => Ok(Self::TailRecord {
                send_id: take_u8(&mut buf)?,
                line: decode_string(&mut buf)?,
            }),
            other => Err(ControlProtoError::UnknownMessage(other)),
        }
    }
}

/// Read one length-prefixed frame body.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Bytes, ControlProtoError> {
    let len = reader.read_u32().await? as usize;
    if len > MAX_CONTROL_FRAME {
        return Err(ControlProtoError::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Bytes::from(body))
}

/// Write one already-encoded frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: Bytes,
) -> Result<(), ControlProtoError> {
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

fn finish_frame(mut buf: BytesMut) -> Bytes {
    let len = (buf.len() - 4) as u32;
    buf[0..4].copy_from_slice(&len.to_be_bytes());
    buf.freeze()
}

fn encode_condition(condition: &QueryCondition, buf: &mut BytesMut) {
    buf.put_u16(condition.types);
    buf.put_u16(condition.levels);
    buf.put_u16(condition.no_types);
    buf.put_u16(condition.no_levels);
    encode_u32_list(&condition.pids, buf);
    encode_u32_list(&condition.domains, buf);
    encode_u32_list(&condition.no_pids, buf);
    encode_u32_list(&condition.no_domains, buf);
    encode_string_list(&condition.tags, buf);
    encode_string_list(&condition.no_tags, buf);
}

fn decode_condition(buf: &mut Bytes) -> Result<QueryCondition, ControlProtoError> {
    Ok(QueryCondition {
        types: take_u16(buf)?,
        levels: take_u16(buf)?,
        no_types: take_u16(buf)?,
        no_levels: take_u16(buf)?,
        pids: decode_u32_list(buf)?,
        domains: decode_u32_list(buf)?,
        no_pids: decode_u32_list(buf)?,
        no_domains: decode_u32_list(buf)?,
        tags: decode_string_list(buf)?,
        no_tags: decode_string_list(buf)?,
    })
}

fn encode_u32_list(values: &[u32], buf: &mut BytesMut) {
    buf.put_u8(values.len() as u8);
    for value in values {
        buf.put_u32(*value);
    }
}

fn decode_u32_list(buf: &mut Bytes) -> Result<Vec<u32>, ControlProtoError> {
    let count = take_u8(buf)? as usize;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(take_u32(buf)?);
    }
    Ok(values)
}

fn encode_string_list(values: &[String], buf: &mut BytesMut) {
    buf.put_u8(values.len() as u8);
    for value in values {
        encode_string(value, buf);
    }
}

fn decode_string_list(buf: &mut Bytes) -> Result<Vec<String>, ControlProtoError> {
    let count = take_u8(buf)? as usize;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(decode_string(buf)?);
    }
    Ok(values)
}

fn encode_string(value: &str, buf: &mut BytesMut) {
    buf.put_u16(value.len() as u16);
    buf.put_slice(value.as_bytes());
}

fn decode_string(buf: &mut Bytes) -> Result<String, ControlProtoError> {
    let len = take_u16(buf)? as usize;
    if buf.remaining() < len {
        return Err(ControlProtoError::Truncated);
    }
    let bytes = buf.split_to(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| ControlProtoError::BadString)
}

fn take_u8(buf: &mut Bytes) -> Result<u8, ControlProtoError> {
    if buf.remaining() < 1 {
        return Err(ControlProtoError::Truncated);
    }
    Ok(buf.get_u8())
}

fn take_u16(buf: &mut Bytes) -> Result<u16, ControlProtoError> {
    if buf.remaining() < 2 {
        return Err(ControlProtoError::Truncated);
    }
    Ok(buf.get_u16())
}

fn take_u32(buf: &mut Bytes) -> Result<u32, ControlProtoError> {
    if buf.remaining() < 4 {
        return Err(ControlProtoError::Truncated);
    }
    Ok(buf.get_u32())
}

fn take_u64(buf: &mut Bytes) -> Result<u64, ControlProtoError> {
    if buf.remaining() < 8 {
        return Err(ControlProtoError::Truncated);
    }
    Ok(buf.get_u64())
}

#[cfg(test)]
#[path = "control_proto_test.rs"]
mod control_proto_test;
