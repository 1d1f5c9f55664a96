use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

struct CountingSink {
    delivered: Arc<AtomicUsize>,
}

impl RecordSink for CountingSink {
    fn write_data(&mut self, send_id: SendId, record: Option<&LogRecord>) {
        if send_id == SendId::Normal && record.is_some() {
            self.delivered.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Network
    }
}

fn reader_with_types(types: u16) -> LogReader {
    let condition = QueryCondition {
        types,
        levels: u16::MAX,
        ..Default::default()
    };
    LogReader::new(
        condition,
        Box::new(CountingSink {
            delivered: Arc::new(AtomicUsize::new(0)),
        }),
    )
}

#[test]
fn test_fresh_reader_starts_in_reload() {
    let reader = reader_with_types(u16::MAX);
    assert!(reader.state.lock().reload);
    assert_eq!(reader.state.lock().last_pos, Pos::End);
}

#[test]
fn test_targets_kmsg_requires_exact_mask() {
    assert!(reader_with_types(LogType::Kmsg.bit()).targets_kmsg());
    assert!(!reader_with_types(u16::MAX).targets_kmsg());
    assert!(!reader_with_types(LogType::Kmsg.bit() | LogType::App.bit()).targets_kmsg());
}

#[test]
fn test_wait_times_out_without_notify() {
    let reader = reader_with_types(u16::MAX);
    let start = Instant::now();
    let woken = reader.wait_for_data(Duration::from_millis(30));
    assert!(!woken);
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[test]
fn test_notify_wakes_waiter() {
    let reader = Arc::new(reader_with_types(u16::MAX));

    let waiter = Arc::clone(&reader);
    let handle = std::thread::spawn(move || waiter.wait_for_data(Duration::from_secs(5)));

    // Give the waiter a moment to park.
    std::thread::sleep(Duration::from_millis(20));
    reader.notify_new_data();

    assert!(handle.join().expect("waiter panicked"));
    assert!(reader.is_notified());
}

#[test]
fn test_notify_before_wait_is_not_lost() {
    let reader = reader_with_types(u16::MAX);
    reader.notify_new_data();
    assert!(reader.wait_for_data(Duration::from_millis(10)));
}

#[test]
fn test_clear_notified() {
    let reader = reader_with_types(u16::MAX);
    reader.notify_new_data();
    reader.clear_notified();
    assert!(!reader.is_notified());
}
