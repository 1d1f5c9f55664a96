//! Ember - Persistence
//!
//! Takes records out of the log buffer and lands them on disk, surviving
//! process crashes along the way.
//!
//! # Architecture
//!
//! ```text
//! [LogBuffer] --query--> [worker thread] --render--> [StagingRegion (mmap)]
//!                                                         │ flush
//!                                                         ▼
//!                                         [Compress] --> [Rotator] --> <path>.N
//! ```
//!
//! Each persist job owns a worker thread, a memory-mapped staging region
//! with a cursor sidecar, and a rotating set of numbered output files. The
//! staging region is recovered on restart: rendered lines that were staged
//! but not yet flushed are written out before new data flows.

mod compress;
mod error;
mod persister;
mod registry;
mod render;
mod rotator;
mod staging;

pub use compress::{Compress, CompressAlg, CompressError, ZlibCompress, ZstdCompress};
pub use error::PersistError;
pub use persister::{LogPersister, PersistJobConfig, PersistJobInfo};
pub use registry::PersisterRegistry;
pub use render::render_lines;
pub use rotator::Rotator;
pub use staging::{StagingRegion, MAX_PERSISTER_BUFFER_SIZE};
