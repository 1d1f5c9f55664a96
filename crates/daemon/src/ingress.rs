//! Log ingress server
//!
//! Accepts client connections on the ingress unix socket and feeds decoded
//! records into the log buffer. Each frame on the stream is one ingress
//! packet, self-framed by its leading little-endian length field.
//!
//! Malformed packets are dropped silently (the frame boundary is still
//! honored); a length field outside the valid packet range means the stream
//! lost sync, and the connection is closed.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use ember_buffer::LogBuffer;
use ember_protocol::{decode_packet, MAX_LOG_LEN, MAX_TAG_LEN, PACKET_HEADER_LEN};

/// Smallest complete frame: header plus one-byte tag and one-byte content.
const MIN_FRAME_LEN: usize = PACKET_HEADER_LEN + 2;

/// Largest complete frame.
const MAX_FRAME_LEN: usize = PACKET_HEADER_LEN + MAX_TAG_LEN + MAX_LOG_LEN;

/// Per-connection read buffer size.
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Unix-socket ingress for log packets.
pub struct IngressServer {
    path: PathBuf,
    buffer: Arc<LogBuffer>,
    token: CancellationToken,
}

impl IngressServer {
    /// Create an ingress server bound to `path` when run.
    pub fn new(path: PathBuf, buffer: Arc<LogBuffer>, token: CancellationToken) -> Self {
        Self {
            path,
            buffer,
            token,
        }
    }

    /// Accept connections until the token is cancelled.
    pub async fn run(self) -> std::io::Result<()> {
        let _ = std::fs::remove_file(&self.path);
        let listener = UnixListener::bind(&self.path)?;
        info!(path = %self.path.display(), "ingress listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let buffer = Arc::clone(&self.buffer);
                        let token = self.token.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, buffer, token).await;
                        });
                    }
                    Err(err) => {
                        error!(error = %err, "ingress accept failed");
                    }
                },
                _ = self.token.cancelled() => break,
            }
        }

        let _ = std::fs::remove_file(&self.path);
        Ok(())
    }
}

async fn handle_connection(
    mut stream: UnixStream,
    buffer: Arc<LogBuffer>,
    token: CancellationToken,
) {
    let mut acc = BytesMut::with_capacity(READ_BUFFER_SIZE);

    loop {
        tokio::select! {
            read = stream.read_buf(&mut acc) => match read {
                Ok(0) => break,
                Ok(_) => {
                    if !drain_frames(&mut acc, &buffer) {
                        debug!("ingress stream desynced, closing connection");
                        break;
                    }
                }
                Err(err) => {
                    debug!(error = %err, "ingress read failed");
                    break;
                }
            },
            _ = token.cancelled() => break,
        }
    }
}

/// Consume every complete frame in `acc`, inserting decoded records.
///
/// Returns `false` when a length field is outside the valid packet range,
/// meaning the byte stream can no longer be trusted.
fn drain_frames(acc: &mut BytesMut, buffer: &LogBuffer) -> bool {
    loop {
        if acc.len() < 2 {
            return true;
        }
        let len = u16::from_le_bytes([acc[0], acc[1]]) as usize;
        if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&len) {
            return false;
        }
        if acc.len() < len {
            return true;
        }

        let frame = acc.split_to(len);
        match decode_packet(&frame) {
            Ok(record) => {
                buffer.insert(record);
            }
            Err(err) => {
                debug!(error = %err, "dropping malformed ingress packet");
            }
        }
    }
}

#[cfg(test)]
#[path = "ingress_test.rs"]
mod ingress_test;
