//! The log buffer
//!
//! Storage, eviction and the query step. Kernel messages live in their own
//! list; all other types share one. Both lists stay timestamp-ordered
//! within a bounded reorder window.
//!
//! # Locking
//!
//! - `core` (read/write): exclusive for insertion, deletion and resizing;
//!   shared for queries and statistics.
//! - `readers` (read/write): exclusive for registration changes; shared
//!   while eviction repairs cursors.
//! - Per-reader state locks nest strictly inside the two above.
//!
//! Print counters are atomics and concurrent maps so the query path can
//! account deliveries under the shared lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::RwLock;

use ember_protocol::{ErrorCode, LogRecord, LogTimeStamp, LogType, SendId, LOG_TYPE_MAX};

use crate::list::{Cursor, CursorList};
use crate::reader::{LogReader, Pos};

/// Default per-type budget (256 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 262_144;

/// Upper bound accepted by [`LogBuffer::set_buff_len`].
pub const MAX_BUFFER_SIZE: usize = 1 << 30;

/// Share of a type's budget dropped when it fills up.
pub const DROP_RATIO: f64 = 0.05;

/// Reorder window for out-of-order timestamps.
const MAX_TIME_DIFF: LogTimeStamp = LogTimeStamp::from_secs(5);

/// Statistic counters for one type or one domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Bytes delivered to readers.
    pub print_len: u64,
    /// Bytes admitted into the buffer.
    pub cache_len: u64,
    /// Records rejected by the ingress rate limiter.
    pub dropped: u64,
}

struct BufferCore {
    main_list: CursorList<LogRecord>,
    klog_list: CursorList<LogRecord>,
    size: usize,
    size_by_type: [usize; LOG_TYPE_MAX],
    max_size_by_type: [usize; LOG_TYPE_MAX],
    max_size_total: usize,
    cache_len_by_type: [u64; LOG_TYPE_MAX],
    cache_len_by_domain: HashMap<u32, u64>,
}

impl BufferCore {
    fn list(&self, ty: LogType) -> &CursorList<LogRecord> {
        if ty == LogType::Kmsg {
            &self.klog_list
        } else {
            &self.main_list
        }
    }

    fn list_mut(&mut self, ty: LogType) -> &mut CursorList<LogRecord> {
        if ty == LogType::Kmsg {
            &mut self.klog_list
        } else {
            &mut self.main_list
        }
    }
}

/// The central in-memory log store.
pub struct LogBuffer {
    core: RwLock<BufferCore>,
    readers: RwLock<Vec<Weak<LogReader>>>,
    print_len_by_type: [AtomicU64; LOG_TYPE_MAX],
    print_len_by_domain: DashMap<u32, u64>,
    dropped_by_type: [AtomicU64; LOG_TYPE_MAX],
    dropped_by_domain: DashMap<u32, u64>,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBuffer {
    /// Create a buffer with the default per-type budgets.
    pub fn new() -> Self {
        Self::with_limits([DEFAULT_BUFFER_SIZE; LOG_TYPE_MAX])
    }

    /// Create a buffer with explicit per-type budgets.
    pub fn with_limits(max_size_by_type: [usize; LOG_TYPE_MAX]) -> Self {
        Self {
            core: RwLock::new(BufferCore {
                main_list: CursorList::new(),
                klog_list: CursorList::new(),
                size: 0,
                size_by_type: [0; LOG_TYPE_MAX],
                max_size_by_type,
                max_size_total: max_size_by_type.iter().sum(),
                cache_len_by_type: [0; LOG_TYPE_MAX],
                cache_len_by_domain: HashMap::new(),
            }),
            readers: RwLock::new(Vec::new()),
            print_len_by_type: Default::default(),
            print_len_by_domain: DashMap::new(),
            dropped_by_type: Default::default(),
            dropped_by_domain: DashMap::new(),
        }
    }

    /// Insert a record, evicting old records of the same type if needed.
    ///
    /// Returns the accepted content bytes, or 0 for a malformed record.
    /// Registered readers are notified after the buffer lock is released.
    pub fn insert(&self, record: LogRecord) -> usize {
        if !record.is_valid() {
            return 0;
        }
        let ele_size = record.content_len();
        let ty = record.ty;
        let domain = record.domain;

        {
            let mut core = self.core.write();
            if ele_size + core.size_by_type[ty.index()] >= core.max_size_by_type[ty.index()] {
                self.evict_locked(&mut core, ty);
            }
            Self::place_ordered(core.list_mut(ty), record);

            core.size += ele_size;
            core.size_by_type[ty.index()] += ele_size;
            core.cache_len_by_type[ty.index()] += ele_size as u64;
            *core.cache_len_by_domain.entry(domain).or_insert(0) += ele_size as u64;
        }

        self.notify_readers();
        ele_size
    }

    /// Stream the next matching record to `reader`.
    ///
    /// Returns `true` if a record was delivered; `false` once the list is
    /// exhausted, in which case an end-of-stream marker is delivered and the
    /// reader's notified flag is cleared.
    pub fn query(&self, reader: &LogReader) -> bool {
        let core = self.core.read();
        let list = if reader.targets_kmsg() {
            &core.klog_list
        } else {
            &core.main_list
        };

        let mut state = reader.state.lock();
        if state.reload {
            state.read_pos = pos_of(list.front());
            state.last_pos = state.read_pos;
            state.reload = false;
        }

        if reader.is_notified() && state.read_pos == Pos::End {
            // Resume after the most recently scanned record; a reader that
            // has nothing left in the list starts over from the oldest.
            state.read_pos = match state.last_pos {
                Pos::At(cursor) => pos_of(list.next(cursor)),
                Pos::End => pos_of(list.front()),
            };
        }

        while let Pos::At(cursor) = state.read_pos {
            state.last_pos = Pos::At(cursor);
            let Some(record) = list.get(cursor) else {
                break;
            };
            let next = pos_of(list.next(cursor));
            if reader.condition().matches(record) {
                reader.deliver(SendId::Normal, Some(record));
                let printed = record.content.len() as u64;
                self.print_len_by_type[record.ty.index()].fetch_add(printed, Ordering::Relaxed);
                *self.print_len_by_domain.entry(record.domain).or_insert(0) += printed;
                state.read_pos = next;
                return true;
            }
            state.read_pos = next;
        }

        reader.clear_notified();
        reader.deliver(SendId::EndOfStream, None);
        false
    }

    /// Remove every record of `ty` from its list.
    ///
    /// Returns the content bytes removed. Reader cursors pointing at removed
    /// records are advanced to their successor first.
    pub fn delete(&self, ty: LogType) -> usize {
        let mut core = self.core.write();
        let mut removed = 0;

        let mut position = core.list(ty).front();
        while let Some(cursor) = position {
            let next = core.list(ty).next(cursor);
            let matches = core
                .list(ty)
                .get(cursor)
                .map(|record| record.ty == ty)
                .unwrap_or(false);
            if matches {
                self.repair_cursors(cursor, pos_of(next), ty == LogType::Kmsg);
                if let Some(record) = core.list_mut(ty).remove(cursor) {
                    let freed = record.len() - record.tag_len as usize;
                    removed += freed;
                    core.size -= freed;
                    core.size_by_type[record.ty.index()] -= freed;
                }
            }
            position = next;
        }

        removed
    }

    /// Register a reader.
    ///
    /// The reader's last position starts at the end of its target list.
    pub fn add_reader(&self, reader: &Arc<LogReader>) {
        let mut readers = self.readers.write();
        reader.state.lock().last_pos = Pos::End;
        readers.push(Arc::downgrade(reader));
    }

    /// Unregister a reader; dead weak entries are dropped along the way.
    pub fn remove_reader(&self, reader: &Arc<LogReader>) {
        let mut readers = self.readers.write();
        readers.retain(|weak| {
            weak.upgrade()
                .map(|live| !Arc::ptr_eq(&live, reader))
                .unwrap_or(false)
        });
    }

    /// Wake every registered reader for new data.
    pub fn notify_readers(&self) {
        let readers = self.readers.read();
        for weak in readers.iter() {
            if let Some(reader) = weak.upgrade() {
                reader.notify_new_data();
            }
        }
    }

    /// Current budget for a type.
    pub fn buff_len(&self, ty: LogType) -> usize {
        self.core.read().max_size_by_type[ty.index()]
    }

    /// Sum of all per-type budgets.
    pub fn total_budget(&self) -> usize {
        self.core.read().max_size_total
    }

    /// Change a type's budget.
    ///
    /// Shrinking does not evict immediately; the budget is enforced on the
    /// next insertion. Returns the accepted size.
    pub fn set_buff_len(&self, ty: LogType, size: usize) -> Result<usize, ErrorCode> {
        if size == 0 || size > MAX_BUFFER_SIZE {
            return Err(ErrorCode::BuffSizeInvalid);
        }
        let mut core = self.core.write();
        let old = core.max_size_by_type[ty.index()];
        core.max_size_by_type[ty.index()] = size;
        core.max_size_total = (core.max_size_total as i64 + size as i64 - old as i64) as usize;
        Ok(size)
    }

    /// Record ingress drops reported by the rate limiter.
    pub fn note_dropped(&self, ty: LogType, domain: u32, count: u64) {
        self.dropped_by_type[ty.index()].fetch_add(count, Ordering::Relaxed);
        *self.dropped_by_domain.entry(domain).or_insert(0) += count;
    }

    /// Statistic counters for a type.
    pub fn stats_by_type(&self, ty: LogType) -> Stats {
        Stats {
            print_len: self.print_len_by_type[ty.index()].load(Ordering::Relaxed),
            cache_len: self.core.read().cache_len_by_type[ty.index()],
            dropped: self.dropped_by_type[ty.index()].load(Ordering::Relaxed),
        }
    }

    /// Statistic counters for a domain.
    pub fn stats_by_domain(&self, domain: u32) -> Stats {
        Stats {
            print_len: self
                .print_len_by_domain
                .get(&domain)
                .map(|entry| *entry)
                .unwrap_or(0),
            cache_len: self
                .core
                .read()
                .cache_len_by_domain
                .get(&domain)
                .copied()
                .unwrap_or(0),
            dropped: self
                .dropped_by_domain
                .get(&domain)
                .map(|entry| *entry)
                .unwrap_or(0),
        }
    }

    /// Reset a type's statistic counters.
    pub fn clear_stats_by_type(&self, ty: LogType) {
        self.print_len_by_type[ty.index()].store(0, Ordering::Relaxed);
        self.dropped_by_type[ty.index()].store(0, Ordering::Relaxed);
        self.core.write().cache_len_by_type[ty.index()] = 0;
    }

    /// Reset a domain's statistic counters.
    pub fn clear_stats_by_domain(&self, domain: u32) {
        self.print_len_by_domain.remove(&domain);
        self.dropped_by_domain.remove(&domain);
        self.core.write().cache_len_by_domain.remove(&domain);
    }

    /// Total resident content bytes.
    pub fn size(&self) -> usize {
        self.core.read().size
    }

    /// Resident content bytes for one type.
    pub fn size_by_type(&self, ty: LogType) -> usize {
        self.core.read().size_by_type[ty.index()]
    }

    /// Drop the oldest records of `ty` until its size falls below the
    /// budget minus the drop ratio.
    fn evict_locked(&self, core: &mut BufferCore, ty: LogType) {
        let budget = core.max_size_by_type[ty.index()];
        let threshold = (budget as f64 * (1.0 - DROP_RATIO)) as usize;

        let mut position = core.list(ty).front();
        while core.size_by_type[ty.index()] > threshold {
            let Some(cursor) = position else {
                break;
            };
            let next = core.list(ty).next(cursor);
            let same_type = core
                .list(ty)
                .get(cursor)
                .map(|record| record.ty == ty)
                .unwrap_or(false);
            if same_type {
                self.repair_cursors(cursor, pos_of(next), ty == LogType::Kmsg);
                if let Some(record) = core.list_mut(ty).remove(cursor) {
                    let freed = record.len() - record.tag_len as usize;
                    core.size -= freed;
                    core.size_by_type[record.ty.index()] -= freed;
                }
            }
            position = next;
        }

        if core.size_by_type[ty.index()] >= budget {
            tracing::warn!(
                ty = ?ty,
                resident = core.size_by_type[ty.index()],
                budget,
                "failed to clean old logs"
            );
        }
    }

    /// Move every live reader cursor equal to `victim` to `successor`.
    ///
    /// Must run before the victim node is removed, so readers never hold a
    /// dangling position. Only readers over the mutated list are touched:
    /// the two lists have overlapping cursor spaces, so a cursor value from
    /// one list must never be compared against a node of the other.
    fn repair_cursors(&self, victim: Cursor, successor: Pos, in_kmsg_list: bool) {
        let readers = self.readers.read();
        for weak in readers.iter() {
            let Some(reader) = weak.upgrade() else {
                continue;
            };
            if reader.targets_kmsg() != in_kmsg_list {
                continue;
            }
            let mut state = reader.state.lock();
            if state.read_pos == Pos::At(victim) {
                state.read_pos = successor;
            }
            if state.last_pos == Pos::At(victim) {
                state.last_pos = successor;
            }
        }
    }

    /// Place a record into its list, keeping timestamp order within the
    /// reorder window.
    ///
    /// Appends when the record is newest, older than the head, or more than
    /// the window behind the newest; otherwise walks back from the tail and
    /// inserts after the first record that is not newer.
    fn place_ordered(list: &mut CursorList<LogRecord>, record: LogRecord) {
        let (Some(head), Some(tail)) = (list.front(), list.back()) else {
            list.push_back(record);
            return;
        };

        let ts = record.ts;
        let newest = list.get(tail).map(|r| r.ts).unwrap_or_default();
        let oldest = list.get(head).map(|r| r.ts).unwrap_or_default();

        if ts >= newest || ts < oldest || (newest - ts) > MAX_TIME_DIFF {
            list.push_back(record);
            return;
        }

        let mut cursor = tail;
        loop {
            let at = list.get(cursor).map(|r| r.ts).unwrap_or_default();
            if at <= ts {
                list.insert_after(cursor, record);
                return;
            }
            match list.prev(cursor) {
                Some(prev) => cursor = prev,
                None => {
                    list.push_front(record);
                    return;
                }
            }
        }
    }
}

fn pos_of(cursor: Option<Cursor>) -> Pos {
    cursor.map(Pos::At).unwrap_or(Pos::End)
}

#[cfg(test)]
#[path = "buffer_test.rs"]
mod buffer_test;
