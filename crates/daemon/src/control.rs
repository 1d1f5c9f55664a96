//! Control socket server
//!
//! Serves the command surface: live tail queries, buffer management,
//! statistics and persist job control. One connection handles a sequence of
//! request/reply exchanges; a `Tail` request switches the connection into
//! streaming mode until the client disconnects.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ember_buffer::{LogBuffer, LogReader, RecordSink, SinkKind};
use ember_config::PersistConfig;
use ember_persist::{render_lines, CompressAlg, PersistJobConfig, PersisterRegistry};
use ember_protocol::{ErrorCode, LogRecord, LogType, QueryCondition, SendId};

use crate::control_proto::{
    read_frame, write_frame, ControlProtoError, ControlRequest, ControlResponse, JobDescription,
};

/// Outstanding tail deliveries buffered towards one client.
const TAIL_CHANNEL_DEPTH: usize = 256;

/// Shared state handed to every control connection.
#[derive(Clone)]
pub struct ControlContext {
    pub buffer: Arc<LogBuffer>,
    pub registry: Arc<PersisterRegistry>,
    pub persist_defaults: PersistConfig,
}

/// Unix-socket control server.
pub struct ControlServer {
    path: PathBuf,
    context: ControlContext,
    token: CancellationToken,
}

impl ControlServer {
    /// Create a control server bound to `path` when run.
    pub fn new(path: PathBuf, context: ControlContext, token: CancellationToken) -> Self {
        Self {
            path,
            context,
            token,
        }
    }

    /// Accept connections until the token is cancelled.
    pub async fn run(self) -> std::io::Result<()> {
        let _ = std::fs::remove_file(&self.path);
        let listener = UnixListener::bind(&self.path)?;
        info!(path = %self.path.display(), "control listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let context = self.context.clone();
                        let token = self.token.clone();
                        tokio::spawn(async move {
                            if let Err(err) = handle_connection(stream, context, token).await {
                                debug!(error = %err, "control connection ended");
                            }
                        });
                    }
                    Err(err) => {
                        error!(error = %err, "control accept failed");
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
    context: ControlContext,
    token: CancellationToken,
) -> Result<(), ControlProtoError> {
    loop {
        let body = tokio::select! {
            body = read_frame(&mut stream) => body?,
            _ = token.cancelled() => return Ok(()),
        };

        let request = match ControlRequest::decode(body) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "bad control request");
                let reply = ControlResponse::Ack {
                    code: ErrorCode::FormatInvalid.as_i32(),
                };
                write_frame(&mut stream, reply.encode()).await?;
                continue;
            }
        };

        match request {
            ControlRequest::Tail { condition } => {
                // The connection becomes a dedicated stream; this call only
                // returns when the client goes away or the daemon stops.
                return run_tail(stream, context, condition, token).await;
            }
            other => {
                let reply = dispatch(other, &context);
                write_frame(&mut stream, reply.encode()).await?;
            }
        }
    }
}

/// Execute a non-streaming command against the core.
fn dispatch(request: ControlRequest, context: &ControlContext) -> ControlResponse {
    match request {
        ControlRequest::BufferSizeGet { ty } => match LogType::from_u8(ty) {
            Some(ty) => ControlResponse::BufferSize {
                size: context.buffer.buff_len(ty) as u64,
            },
            None => ack_err(ErrorCode::LogTypeInvalid),
        },
        ControlRequest::BufferSizeSet { ty, size } => match LogType::from_u8(ty) {
            Some(ty) => match context.buffer.set_buff_len(ty, size as usize) {
                Ok(_) => ack_ok(),
                Err(code) => ack_err(code),
            },
            None => ack_err(ErrorCode::LogTypeInvalid),
        },
        ControlRequest::BufferClear { ty } => match LogType::from_u8(ty) {
            Some(ty) => ControlResponse::Removed {
                bytes: context.buffer.delete(ty) as u64,
            },
            None => ack_err(ErrorCode::LogTypeInvalid),
        },
        ControlRequest::StatsOfType { ty } => match LogType::from_u8(ty) {
            Some(ty) => {
                let stats = context.buffer.stats_by_type(ty);
                ControlResponse::Stats {
                    print_len: stats.print_len,
                    cache_len: stats.cache_len,
                    dropped: stats.dropped,
                }
            }
            None => ack_err(ErrorCode::LogTypeInvalid),
        },
        ControlRequest::StatsOfDomain { domain } => {
            let stats = context.buffer.stats_by_domain(domain);
            ControlResponse::Stats {
                print_len: stats.print_len,
                cache_len: stats.cache_len,
                dropped: stats.dropped,
            }
        }
        ControlRequest::StatsClearType { ty } => match LogType::from_u8(ty) {
            Some(ty) => {
                context.buffer.clear_stats_by_type(ty);
                ack_ok()
            }
            None => ack_err(ErrorCode::LogTypeInvalid),
        },
        ControlRequest::StatsClearDomain { domain } => {
            context.buffer.clear_stats_by_domain(domain);
            ack_ok()
        }
        ControlRequest::PersistStart {
            id,
            path,
            compress_alg,
            compress_type,
            file_size,
            file_num,
            condition,
        } => {
            let Some(compress_alg) = CompressAlg::from_u16(compress_alg) else {
                return ack_err(ErrorCode::FormatInvalid);
            };
            if let Err(code) = condition.validate() {
                return ack_err(code);
            }

            let path = PathBuf::from(path);
            let path = if path.is_absolute() {
                path
            } else {
                context.persist_defaults.directory.join(path)
            };
            let config = PersistJobConfig {
                id,
                path,
                compress_alg,
                compress_type,
                file_size: if file_size == 0 {
                    context.persist_defaults.file_size
                } else {
                    file_size
                },
                file_num: if file_num == 0 {
                    context.persist_defaults.file_num
                } else {
                    file_num
                },
                sleep_secs: context.persist_defaults.sleep_secs,
            };

            match context.registry.start_job(&context.buffer, config, condition) {
                Ok(_) => ack_ok(),
                Err(err) => {
                    warn!(job = id, error = %err, "persist start failed");
                    ack_err(err.error_code())
                }
            }
        }
        ControlRequest::PersistStop { id } => match context.registry.kill(id) {
            Ok(()) => ack_ok(),
            Err(code) => ack_err(code),
        },
        ControlRequest::PersistQuery { type_mask } => ControlResponse::PersistJobs {
            jobs: context
                .registry
                .query(type_mask)
                .into_iter()
                .map(|info| JobDescription {
                    job_id: info.job_id,
                    path: info.file_path.to_string_lossy().into_owned(),
                    compress_type: info.compress_type,
                    compress_alg: info.compress_alg,
                    file_size: info.file_size,
                    file_num: info.file_num,
                    log_type: info.log_type,
                })
                .collect(),
        },
        ControlRequest::Tail { .. } => ack_err(ErrorCode::CommandNotFound),
    }
}

fn ack_ok() -> ControlResponse {
    ControlResponse::Ack { code: 0 }
}

fn ack_err(code: ErrorCode) -> ControlResponse {
    ControlResponse::Ack {
        code: code.as_i32(),
    }
}

/// Sink that forwards rendered lines into a tail client's channel.
///
/// Deliveries that don't fit in the channel are dropped; a slow client only
/// loses its own stream. End-of-stream markers are deduplicated so an idle
/// tail doesn't flood the client between wake-ups.
struct TailSink {
    tx: mpsc::Sender<(u8, String)>,
    last_was_end: bool,
}

impl RecordSink for TailSink {
    fn write_data(&mut self, send_id: SendId, record: Option<&LogRecord>) {
        match (send_id, record) {
            (SendId::Normal, Some(record)) => {
                for line in render_lines(record) {
                    let _ = self.tx.try_send((SendId::Normal as u8, line));
                }
                self.last_was_end = false;
            }
            (SendId::EndOfStream, _) => {
                if !self.last_was_end {
                    let _ = self.tx.try_send((SendId::EndOfStream as u8, String::new()));
                    self.last_was_end = true;
                }
            }
            _ => {}
        }
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Network
    }
}

/// Stream matching records to the client until it disconnects.
async fn run_tail(
    mut stream: UnixStream,
    context: ControlContext,
    condition: QueryCondition,
    token: CancellationToken,
) -> Result<(), ControlProtoError> {
    if let Err(code) = condition.validate() {
        write_frame(&mut stream, ack_err(code).encode()).await?;
        return Ok(());
    }

    let (tx, mut rx) = mpsc::channel(TAIL_CHANNEL_DEPTH);
    let probe = tx.clone();
    let reader = Arc::new(LogReader::new(
        condition,
        Box::new(TailSink {
            tx,
            last_was_end: false,
        }),
    ));
    context.buffer.add_reader(&reader);

    // The pump drives the buffer from a blocking thread, pacing on the
    // reader's condvar like any other long-lived reader.
    let pump_buffer = Arc::clone(&context.buffer);
    let pump_reader = Arc::clone(&reader);
    let pump = tokio::task::spawn_blocking(move || {
        while !probe.is_closed() {
            if !pump_buffer.query(&pump_reader) {
                pump_reader.wait_for_data(Duration::from_secs(1));
            }
        }
        pump_buffer.remove_reader(&pump_reader);
    });

    loop {
        tokio::select! {
            delivery = rx.recv() => match delivery {
                Some((send_id, line)) => {
                    let frame = ControlResponse::TailRecord { send_id, line }.encode();
                    if write_frame(&mut stream, frame).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            _ = token.cancelled() => break,
        }
    }

    // Dropping the receiver closes the channel; the pump notices within its
    // wait timeout and unregisters the reader.
    drop(rx);
    let _ = pump.await;
    Ok(())
}
