use super::*;
use crate::record::level_char;

fn sample_record() -> LogRecord {
    LogRecord {
        ty: LogType::App,
        level: 4,
        tag_len: 8,
        pid: 1234,
        tid: 1235,
        domain: 0x0d12_3456,
        ts: LogTimeStamp::new(1000, 500_000_000),
        tag: "AppCore".into(),
        content: "service started".into(),
    }
}

// =============================================================================
// Round-trip tests
// =============================================================================

#[test]
fn test_encode_decode_round_trip() {
    let record = sample_record();
    let frame = encode_packet(&record);
    let decoded = decode_packet(&frame).expect("decode failed");

    assert_eq!(decoded, record);
}

#[test]
fn test_round_trip_kmsg_type() {
    let mut record = sample_record();
    record.ty = LogType::Kmsg;
    record.level = 7;

    let decoded = decode_packet(&encode_packet(&record)).expect("decode failed");
    assert_eq!(decoded.ty, LogType::Kmsg);
    assert_eq!(decoded.level, 7);
}

#[test]
fn test_round_trip_embedded_newlines() {
    let mut record = sample_record();
    record.content = "line one\nline two\n\nline four".into();

    let decoded = decode_packet(&encode_packet(&record)).expect("decode failed");
    assert_eq!(decoded.content, record.content);
}

#[test]
fn test_round_trip_max_content() {
    let mut record = sample_record();
    record.content = "x".repeat(MAX_LOG_LEN - 1);

    let decoded = decode_packet(&encode_packet(&record)).expect("decode failed");
    assert_eq!(decoded.content.len(), MAX_LOG_LEN - 1);
}

// =============================================================================
// Header layout tests
// =============================================================================

#[test]
fn test_packed_word_layout() {
    let record = sample_record();
    let frame = encode_packet(&record);

    let packed = u16::from_le_bytes([frame[2], frame[3]]);
    assert_eq!(packed & 0x07, 0, "version bits must be zero");
    assert_eq!((packed >> 3) & 0x0f, LogType::App as u16);
    assert_eq!((packed >> 7) & 0x07, 4);
    assert_eq!((packed >> 10) & 0x3f, 8);
}

#[test]
fn test_length_field_counts_whole_frame() {
    let record = sample_record();
    let frame = encode_packet(&record);

    let len = u16::from_le_bytes([frame[0], frame[1]]) as usize;
    assert_eq!(len, frame.len());
    assert_eq!(
        len,
        PACKET_HEADER_LEN + record.tag.len() + 1 + record.content.len() + 1
    );
}

// =============================================================================
// Malformed frame tests
// =============================================================================

#[test]
fn test_decode_rejects_short_frame() {
    let err = decode_packet(&[0u8; 10]).unwrap_err();
    assert!(matches!(err, PacketError::TooShort { .. }));
}

#[test]
fn test_decode_rejects_length_mismatch() {
    let record = sample_record();
    let mut frame = encode_packet(&record);
    frame[0] = frame[0].wrapping_add(4);

    let err = decode_packet(&frame).unwrap_err();
    assert!(matches!(err, PacketError::LengthMismatch { .. }));
}

#[test]
fn test_decode_rejects_zero_tag_len() {
    let record = sample_record();
    let mut frame = encode_packet(&record);

    // Zero out the tag_len bits while keeping the frame length consistent
    // with what the header claims.
    let packed = u16::from_le_bytes([frame[2], frame[3]]) & !(0x3f << 10);
    frame[2..4].copy_from_slice(&packed.to_le_bytes());

    let err = decode_packet(&frame).unwrap_err();
    assert!(matches!(err, PacketError::InvalidTagLen(0)));
}

#[test]
fn test_decode_rejects_unknown_type() {
    let record = sample_record();
    let mut frame = encode_packet(&record);

    let packed = (u16::from_le_bytes([frame[2], frame[3]]) & !(0x0f << 3)) | (9 << 3);
    frame[2..4].copy_from_slice(&packed.to_le_bytes());

    let err = decode_packet(&frame).unwrap_err();
    assert!(matches!(err, PacketError::InvalidLogType(9)));
}

#[test]
fn test_decode_rejects_empty_content() {
    // A frame whose length leaves no room for content at all.
    let mut record = sample_record();
    record.content = String::new();
    let mut frame = encode_packet(&record);
    // Strip the content NUL so content_len computes to zero.
    frame.truncate(frame.len() - 1);
    let total = frame.len() as u16;
    frame[0..2].copy_from_slice(&total.to_le_bytes());

    let err = decode_packet(&frame).unwrap_err();
    assert!(matches!(err, PacketError::InvalidContentLen(0)));
}

// =============================================================================
// Record helpers
// =============================================================================

#[test]
fn test_record_len_accounting() {
    let record = sample_record();
    // len - tag_len must equal the content bytes charged at insertion.
    assert_eq!(record.len() - record.tag_len as usize, record.content_len());
}

#[test]
fn test_level_chars() {
    assert_eq!(level_char(3), 'D');
    assert_eq!(level_char(4), 'I');
    assert_eq!(level_char(5), 'W');
    assert_eq!(level_char(6), 'E');
    assert_eq!(level_char(7), 'F');
    assert_eq!(level_char(0), '?');
}
