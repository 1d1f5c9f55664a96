//! Ember - Log buffer
//!
//! The central in-memory store: two near-sorted record lists (kernel
//! messages and everything else), per-type and per-domain accounting, and a
//! registry of long-lived readers that stream matching records as they
//! arrive.
//!
//! # Architecture
//!
//! ```text
//! [Ingress] --insert--> [LogBuffer] --notify--> [LogReader] --query--> [sink]
//!                           │                        │
//!                      eviction repairs         cursor + filter
//!                      reader cursors           per reader
//! ```
//!
//! Insertion keeps each list ordered by timestamp within a bounded reorder
//! window; when a type's budget fills up, the oldest records of that type
//! are dropped and every live reader cursor pointing at a dropped record is
//! moved to its successor first, so readers never observe a dangling
//! position.

mod buffer;
mod list;
mod reader;

pub use buffer::{LogBuffer, Stats, DEFAULT_BUFFER_SIZE, DROP_RATIO, MAX_BUFFER_SIZE};
pub use list::{Cursor, CursorList};
pub use reader::{LogReader, Pos, RecordSink, SinkKind};
