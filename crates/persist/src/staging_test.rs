use super::*;
use tempfile::TempDir;

#[test]
fn test_fresh_region_starts_empty() {
    let dir = TempDir::new().expect("tempdir failed");
    let (region, restored) = StagingRegion::open(dir.path(), 1).expect("open failed");

    assert!(!restored);
    assert_eq!(region.offset(), 0);
    assert_eq!(region.capacity(), MAX_PERSISTER_BUFFER_SIZE);
    assert!(region.staged().is_empty());
    assert!(dir.path().join(".1").exists());
    assert!(dir.path().join(".1.info").exists());
}

#[test]
fn test_append_adds_newline_and_advances_cursor() {
    let dir = TempDir::new().expect("tempdir failed");
    let (mut region, _) = StagingRegion::open(dir.path(), 1).expect("open failed");

    assert!(region.append(b"hello").expect("append failed"));
    assert!(region.append(b"world").expect("append failed"));

    assert_eq!(region.offset(), 12);
    assert_eq!(region.staged(), b"hello\nworld\n");
}

#[test]
fn test_cursor_sidecar_tracks_offset() {
    let dir = TempDir::new().expect("tempdir failed");
    let (mut region, _) = StagingRegion::open(dir.path(), 1).expect("open failed");

    region.append(b"abc").expect("append failed");
    let sidecar = fs::read_to_string(dir.path().join(".1.info")).expect("read failed");
    assert_eq!(sidecar, "0004\n");
}

#[test]
fn test_append_refuses_overflow_without_writing() {
    let dir = TempDir::new().expect("tempdir failed");
    let (mut region, _) = StagingRegion::open(dir.path(), 1).expect("open failed");

    let filler = vec![b'x'; MAX_PERSISTER_BUFFER_SIZE - 10];
    assert!(region.append(&filler).expect("append failed"));
    let offset_before = region.offset();

    assert!(!region.append(b"does not fit").expect("append failed"));
    assert_eq!(region.offset(), offset_before);
}

#[test]
fn test_reset_clears_cursor() {
    let dir = TempDir::new().expect("tempdir failed");
    let (mut region, _) = StagingRegion::open(dir.path(), 1).expect("open failed");

    region.append(b"data").expect("append failed");
    region.reset().expect("reset failed");

    assert_eq!(region.offset(), 0);
    assert!(region.staged().is_empty());
    let sidecar = fs::read_to_string(dir.path().join(".1.info")).expect("read failed");
    assert_eq!(sidecar, "0000\n");
}

#[test]
fn test_crash_recovery_restores_staged_bytes() {
    let dir = TempDir::new().expect("tempdir failed");

    // First process stages two lines and "crashes" (drop without reset).
    {
        let (mut region, restored) = StagingRegion::open(dir.path(), 3).expect("open failed");
        assert!(!restored);
        region.append(b"first line").expect("append failed");
        region.append(b"second line").expect("append failed");
    }

    // Restart: same job id recovers cursor and content.
    let (region, restored) = StagingRegion::open(dir.path(), 3).expect("reopen failed");
    assert!(restored);
    assert_eq!(region.staged(), b"first line\nsecond line\n");
}

#[test]
fn test_recovery_with_damaged_sidecar_falls_back_to_zero() {
    let dir = TempDir::new().expect("tempdir failed");
    {
        let (mut region, _) = StagingRegion::open(dir.path(), 4).expect("open failed");
        region.append(b"data").expect("append failed");
    }

    fs::write(dir.path().join(".4.info"), b"not hex").expect("write failed");
    let (region, restored) = StagingRegion::open(dir.path(), 4).expect("reopen failed");
    assert!(restored);
    assert_eq!(region.offset(), 0);
}

#[test]
fn test_different_job_ids_use_different_files() {
    let dir = TempDir::new().expect("tempdir failed");
    let (mut a, _) = StagingRegion::open(dir.path(), 1).expect("open failed");
    let (mut b, _) = StagingRegion::open(dir.path(), 2).expect("open failed");

    a.append(b"from a").expect("append failed");
    b.append(b"from b").expect("append failed");

    assert_eq!(a.staged(), b"from a\n");
    assert_eq!(b.staged(), b"from b\n");
}

#[test]
fn test_remove_files_deletes_both() {
    let dir = TempDir::new().expect("tempdir failed");
    let (region, _) = StagingRegion::open(dir.path(), 5).expect("open failed");

    region.remove_files().expect("remove failed");
    assert!(!dir.path().join(".5").exists());
    assert!(!dir.path().join(".5.info").exists());
}
