//! Persist job registry
//!
//! Process-wide dispatcher for persist jobs. Enforces that no two live jobs
//! share an id or an output path, and serves the control surface's job
//! queries.

use std::sync::Arc;

use parking_lot::Mutex;

use ember_buffer::LogBuffer;
use ember_protocol::{ErrorCode, QueryCondition};

use crate::error::PersistError;
use crate::persister::{LogPersister, PersistJobConfig, PersistJobInfo};

/// Registry of live persist jobs.
#[derive(Default)]
pub struct PersisterRegistry {
    jobs: Mutex<Vec<Arc<LogPersister>>>,
}

impl PersisterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create, register and start a persist job.
    ///
    /// Fails without side effects when the id or path is already taken, or
    /// when the job's on-disk state cannot be set up.
    pub fn start_job(
        &self,
        buffer: &Arc<LogBuffer>,
        config: PersistJobConfig,
        condition: QueryCondition,
    ) -> Result<Arc<LogPersister>, PersistError> {
        let mut jobs = self.jobs.lock();
        if jobs.iter().any(|job| job.id() == config.id) {
            return Err(PersistError::DuplicateJobId(config.id));
        }
        if jobs.iter().any(|job| job.path() == &config.path) {
            return Err(PersistError::DuplicatePath(config.path));
        }

        let job = LogPersister::create(Arc::clone(buffer), config, condition)?;
        buffer.add_reader(job.reader());
        if let Err(err) = job.start() {
            buffer.remove_reader(job.reader());
            return Err(err.into());
        }
        jobs.push(Arc::clone(&job));

        tracing::info!(job = job.id(), path = %job.path().display(), "persist job started");
        Ok(job)
    }

    /// Stop and remove the job with `id`, deleting its staging files.
    pub fn kill(&self, id: u32) -> Result<(), ErrorCode> {
        let job = {
            let mut jobs = self.jobs.lock();
            let position = jobs.iter().position(|job| job.id() == id);
            match position {
                Some(index) => jobs.remove(index),
                None => return Err(ErrorCode::PersistJobIdFail),
            }
        };

        if let Err(err) = job.exit() {
            tracing::warn!(job = id, error = %err, "persist job teardown failed");
        }
        Ok(())
    }

    /// Describe every job whose type mask intersects `type_mask`.
    pub fn query(&self, type_mask: u16) -> Vec<PersistJobInfo> {
        self.jobs
            .lock()
            .iter()
            .filter(|job| job.types() & type_mask != 0)
            .map(|job| job.info())
            .collect()
    }

    /// Number of live jobs.
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Whether no jobs are registered.
    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    /// Stop every job, keeping staging files for recovery after restart.
    pub fn shutdown_all(&self) {
        let jobs = std::mem::take(&mut *self.jobs.lock());
        for job in jobs {
            job.stop();
        }
    }
}
