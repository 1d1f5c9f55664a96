//! Persist jobs
//!
//! A `LogPersister` is a reader over the log buffer that renders matching
//! records into its staging region and flushes them through the rotator.
//! Each job runs one worker thread: it drains the buffer while records are
//! available, then parks on the reader's condvar with a bounded timeout.
//! A timeout flushes whatever is staged; a wake-up resumes draining.

use std::collections::VecDeque;
use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use std::{io, thread};

use parking_lot::{Condvar, Mutex};

use ember_buffer::{LogBuffer, LogReader, RecordSink, SinkKind};
use ember_protocol::{LogRecord, QueryCondition, SendId};

use crate::compress::{Compress, CompressAlg};
use crate::error::PersistError;
use crate::render::render_lines;
use crate::rotator::Rotator;
use crate::staging::StagingRegion;

/// Upper bound on lines queued while the disk is unavailable.
const MAX_PENDING_LINES: usize = 1024;

/// Parameters of one persist job.
#[derive(Debug, Clone)]
pub struct PersistJobConfig {
    /// Job id, unique across live jobs.
    pub id: u32,
    /// Output base path; files are `<path>.N<suffix>`.
    pub path: PathBuf,
    /// Compression applied to flushed segments.
    pub compress_alg: CompressAlg,
    /// Client-facing persist file type tag, echoed in job queries.
    pub compress_type: u16,
    /// Worker idle timeout in seconds.
    pub sleep_secs: u64,
    /// Nominal size of one output file.
    pub file_size: u32,
    /// Number of output file slots.
    pub file_num: u32,
}

/// Job description returned by the dispatcher query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistJobInfo {
    pub job_id: u32,
    pub file_path: PathBuf,
    pub compress_type: u16,
    pub compress_alg: u16,
    pub file_size: u32,
    pub file_num: u32,
    pub log_type: u16,
}

/// Staging region, rotator and compressor of one job.
///
/// The staging slot becomes `None` once the job's files are torn down.
struct PersistCore {
    staging: Option<StagingRegion>,
    rotator: Rotator,
    compressor: Option<Box<dyn Compress>>,
}

impl PersistCore {
    /// Drain the staging region into the rotator.
    ///
    /// With compression on, every flush is one finished segment and closes
    /// the current output file. Without it, only `rotate_segment` flushes
    /// (staging overflow) close the file; timer flushes keep appending.
    /// A compression failure leaves the staged bytes in place.
    fn flush(&mut self, rotate_segment: bool) -> Result<(), PersistError> {
        let Some(staging) = self.staging.as_mut() else {
            return Ok(());
        };
        if staging.offset() == 0 {
            return Ok(());
        }

        match self.compressor.as_mut() {
            None => {
                self.rotator.input(staging.staged())?;
                if rotate_segment {
                    self.rotator.finish_input();
                }
            }
            Some(compressor) => {
                let compressed = compressor.compress(staging.staged())?;
                self.rotator.input(&compressed)?;
                self.rotator.finish_input();
            }
        }
        staging.reset()?;
        Ok(())
    }

    /// Stage one rendered line, flushing once when the region is full.
    fn write_line(&mut self, line: &str) -> Result<(), PersistError> {
        let Some(staging) = self.staging.as_mut() else {
            return Ok(());
        };
        if staging.append(line.as_bytes())? {
            return Ok(());
        }

        self.flush(true)?;
        let Some(staging) = self.staging.as_mut() else {
            return Ok(());
        };
        if !staging.append(line.as_bytes())? {
            tracing::warn!(len = line.len(), "dropping line larger than staging region");
        }
        Ok(())
    }
}

/// Sink half of a persist job: renders records and stages them.
struct PersistSink {
    core: Arc<Mutex<PersistCore>>,
    pending: VecDeque<String>,
}

impl RecordSink for PersistSink {
    fn write_data(&mut self, send_id: SendId, record: Option<&LogRecord>) {
        if send_id == SendId::Normal {
            if let Some(record) = record {
                self.pending.extend(render_lines(record));
                while self.pending.len() > MAX_PENDING_LINES {
                    self.pending.pop_front();
                }
            }
        }

        while let Some(line) = self.pending.front() {
            match self.core.lock().write_line(line) {
                Ok(()) => {
                    self.pending.pop_front();
                }
                Err(err) => {
                    tracing::warn!(error = %err, "staging write failed, will retry");
                    break;
                }
            }
        }
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Persist
    }
}

/// One running persistence job.
pub struct LogPersister {
    id: u32,
    path: PathBuf,
    compress_alg: CompressAlg,
    compress_type: u16,
    sleep: Duration,
    file_size: u32,
    file_num: u32,
    types: u16,
    buffer: Arc<LogBuffer>,
    reader: Arc<LogReader>,
    core: Arc<Mutex<PersistCore>>,
    exit_requested: AtomicBool,
    exited: Mutex<bool>,
    exited_cv: Condvar,
}

impl LogPersister {
    /// Build the job's on-disk state and reader.
    ///
    /// Creates the parent directory if needed, opens the rotator, opens or
    /// recovers the staging region, and flushes recovered bytes right away.
    /// Uniqueness of (id, path) is the registry's responsibility.
    pub(crate) fn create(
        buffer: Arc<LogBuffer>,
        config: PersistJobConfig,
        condition: QueryCondition,
    ) -> Result<Arc<Self>, PersistError> {
        if config.file_size == 0 || config.file_num == 0 {
            return Err(PersistError::InvalidFileParams {
                file_size: config.file_size,
                file_num: config.file_num,
            });
        }
        let parent = config
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| PersistError::InvalidPath(config.path.clone()))?
            .to_path_buf();
        if !parent.exists() {
            DirBuilder::new()
                .recursive(true)
                .mode(0o777)
                .create(&parent)?;
        }

        let rotator = Rotator::new(
            &config.path,
            config.compress_alg.suffix(),
            config.file_size,
            config.file_num,
            config.id,
        )?;
        let (staging, restored) = StagingRegion::open(&parent, config.id)?;

        let core = Arc::new(Mutex::new(PersistCore {
            staging: Some(staging),
            rotator,
            compressor: config.compress_alg.compressor(),
        }));

        if restored {
            let staged = core.lock().staging.as_ref().map(|s| s.offset()).unwrap_or(0);
            core.lock().flush(false)?;
            tracing::info!(job = config.id, bytes = staged, "recovered staging region");
        }

        let sink = PersistSink {
            core: Arc::clone(&core),
            pending: VecDeque::new(),
        };
        let types = condition.types;
        let reader = Arc::new(LogReader::new(condition, Box::new(sink)));

        Ok(Arc::new(Self {
            id: config.id,
            path: config.path,
            compress_alg: config.compress_alg,
            compress_type: config.compress_type,
            sleep: Duration::from_secs(config.sleep_secs.max(1)),
            file_size: config.file_size,
            file_num: config.file_num,
            types,
            buffer,
            reader,
            core,
            exit_requested: AtomicBool::new(false),
            exited: Mutex::new(false),
            exited_cv: Condvar::new(),
        }))
    }

    /// Job id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Output base path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Type mask this job subscribes to.
    pub fn types(&self) -> u16 {
        self.types
    }

    /// The buffer reader backing this job.
    pub(crate) fn reader(&self) -> &Arc<LogReader> {
        &self.reader
    }

    /// Job description for the dispatcher query.
    pub fn info(&self) -> PersistJobInfo {
        PersistJobInfo {
            job_id: self.id,
            file_path: self.path.clone(),
            compress_type: self.compress_type,
            compress_alg: self.compress_alg.as_u16(),
            file_size: self.file_size,
            file_num: self.file_num,
            log_type: self.types,
        }
    }

    /// Spawn the worker thread.
    pub(crate) fn start(self: &Arc<Self>) -> io::Result<()> {
        let worker = Arc::clone(self);
        thread::Builder::new()
            .name(format!("ember-persist-{}", self.id))
            .spawn(move || worker.run())?;
        Ok(())
    }

    fn run(&self) {
        tracing::debug!(job = self.id, "persister worker started");
        loop {
            if self.exit_requested.load(Ordering::Acquire) {
                break;
            }
            if !self.buffer.query(&self.reader) {
                if !self.reader.wait_for_data(self.sleep) {
                    if self.exit_requested.load(Ordering::Acquire) {
                        break;
                    }
                    self.flush_quiet();
                }
            }
        }
        self.flush_quiet();

        *self.exited.lock() = true;
        self.exited_cv.notify_all();
        tracing::debug!(job = self.id, "persister worker exited");
    }

    fn flush_quiet(&self) {
        if let Err(err) = self.core.lock().flush(false) {
            tracing::warn!(job = self.id, error = %err, "flush failed");
        }
    }

    /// Stop the worker, flushing once; staging files stay on disk so a
    /// restart can recover them.
    pub fn stop(&self) {
        self.exit_requested.store(true, Ordering::Release);
        self.reader.wake();

        let mut exited = self.exited.lock();
        while !*exited {
            self.exited_cv.wait(&mut exited);
        }
        drop(exited);

        self.buffer.remove_reader(&self.reader);
    }

    /// Stop the worker and delete the job's staging files and rotator
    /// sidecar. Output files are left in place.
    pub fn exit(&self) -> Result<(), PersistError> {
        self.stop();

        let mut core = self.core.lock();
        if let Some(staging) = core.staging.take() {
            staging.remove_files()?;
        }
        core.rotator.remove_info_file()?;
        tracing::info!(job = self.id, "persist job removed");
        Ok(())
    }

    /// Bytes currently staged (diagnostics).
    pub fn staged_bytes(&self) -> usize {
        self.core
            .lock()
            .staging
            .as_ref()
            .map(|staging| staging.offset())
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "persister_test.rs"]
mod persister_test;
