use super::*;
use ember_protocol::{encode_packet, LogRecord, LogTimeStamp, LogType};

fn record(content: &str) -> LogRecord {
    LogRecord {
        ty: LogType::App,
        level: 4,
        tag_len: 4,
        pid: 1,
        tid: 1,
        domain: 0x0d00_0001,
        ts: LogTimeStamp::from_secs(100),
        tag: "tag".into(),
        content: content.into(),
    }
}

#[test]
fn test_drain_single_frame() {
    let buffer = LogBuffer::new();
    let mut acc = BytesMut::from(&encode_packet(&record("hello"))[..]);

    assert!(drain_frames(&mut acc, &buffer));
    assert!(acc.is_empty());
    assert_eq!(buffer.size(), 6);
}

#[test]
fn test_drain_back_to_back_frames() {
    let buffer = LogBuffer::new();
    let mut acc = BytesMut::new();
    acc.extend_from_slice(&encode_packet(&record("one")));
    acc.extend_from_slice(&encode_packet(&record("two")));

    assert!(drain_frames(&mut acc, &buffer));
    assert!(acc.is_empty());
    assert_eq!(buffer.size(), 8);
}

#[test]
fn test_partial_frame_waits_for_more_bytes() {
    let buffer = LogBuffer::new();
    let full = encode_packet(&record("partial"));
    let mut acc = BytesMut::from(&full[..full.len() - 3]);

    assert!(drain_frames(&mut acc, &buffer));
    assert_eq!(buffer.size(), 0);
    assert_eq!(acc.len(), full.len() - 3);

    acc.extend_from_slice(&full[full.len() - 3..]);
    assert!(drain_frames(&mut acc, &buffer));
    assert_eq!(buffer.size(), 8);
}

#[test]
fn test_single_length_byte_waits() {
    let buffer = LogBuffer::new();
    let mut acc = BytesMut::from(&[0x30][..]);
    assert!(drain_frames(&mut acc, &buffer));
    assert_eq!(acc.len(), 1);
}

#[test]
fn test_bogus_length_field_desyncs() {
    let buffer = LogBuffer::new();

    // Too small to be a packet.
    let mut acc = BytesMut::from(&5u16.to_le_bytes()[..]);
    assert!(!drain_frames(&mut acc, &buffer));

    // Larger than any legal packet.
    let mut acc = BytesMut::from(&9000u16.to_le_bytes()[..]);
    assert!(!drain_frames(&mut acc, &buffer));
}

#[test]
fn test_malformed_packet_is_dropped_but_stream_continues() {
    let buffer = LogBuffer::new();

    // Corrupt the type bits of an otherwise well-formed frame.
    let mut bad = encode_packet(&record("bad"));
    let packed = (u16::from_le_bytes([bad[2], bad[3]]) & !(0x0f << 3)) | (9 << 3);
    bad[2..4].copy_from_slice(&packed.to_le_bytes());

    let mut acc = BytesMut::new();
    acc.extend_from_slice(&bad);
    acc.extend_from_slice(&encode_packet(&record("good")));

    assert!(drain_frames(&mut acc, &buffer));
    assert!(acc.is_empty());
    // Only the good record made it in.
    assert_eq!(buffer.size(), 5);
}
