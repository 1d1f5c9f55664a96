use super::*;
use crate::registry::PersisterRegistry;
use crate::render::render_lines;
use crate::staging::StagingRegion;
use ember_protocol::{ErrorCode, LogTimeStamp, LogType};
use std::fs;
use std::io::Read;
use std::time::Instant;
use tempfile::TempDir;

fn record(ts_sec: u32, content: &str) -> LogRecord {
    LogRecord {
        ty: LogType::App,
        level: 4,
        tag_len: 5,
        pid: 77,
        tid: 78,
        domain: 0x0d00_0042,
        ts: LogTimeStamp::from_secs(ts_sec),
        tag: "test".into(),
        content: content.into(),
    }
}

fn job_config(id: u32, path: PathBuf, alg: CompressAlg) -> PersistJobConfig {
    PersistJobConfig {
        id,
        path,
        compress_alg: alg,
        compress_type: 0,
        sleep_secs: 1,
        file_size: 4096,
        file_num: 3,
    }
}

fn rendered(records: &[LogRecord]) -> String {
    let mut out = String::new();
    for record in records {
        for line in render_lines(record) {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    check()
}

// =============================================================================
// Registry invariants
// =============================================================================

#[test]
fn test_registry_rejects_duplicate_id_and_path() {
    let dir = TempDir::new().expect("tempdir failed");
    let buffer = Arc::new(LogBuffer::new());
    let registry = PersisterRegistry::new();

    registry
        .start_job(
            &buffer,
            job_config(1, dir.path().join("a"), CompressAlg::Off),
            QueryCondition::match_all(),
        )
        .expect("first job failed");

    let same_id = registry.start_job(
        &buffer,
        job_config(1, dir.path().join("b"), CompressAlg::Off),
        QueryCondition::match_all(),
    );
    assert!(matches!(same_id, Err(PersistError::DuplicateJobId(1))));

    let same_path = registry.start_job(
        &buffer,
        job_config(2, dir.path().join("a"), CompressAlg::Off),
        QueryCondition::match_all(),
    );
    assert!(matches!(same_path, Err(PersistError::DuplicatePath(_))));

    assert_eq!(registry.len(), 1);
    registry.kill(1).expect("kill failed");
    assert!(registry.is_empty());
}

#[test]
fn test_kill_unknown_id_fails() {
    let registry = PersisterRegistry::new();
    assert_eq!(registry.kill(99), Err(ErrorCode::PersistJobIdFail));
}

#[test]
fn test_id_is_reusable_after_kill() {
    let dir = TempDir::new().expect("tempdir failed");
    let buffer = Arc::new(LogBuffer::new());
    let registry = PersisterRegistry::new();

    registry
        .start_job(
            &buffer,
            job_config(5, dir.path().join("a"), CompressAlg::Off),
            QueryCondition::match_all(),
        )
        .expect("first job failed");
    registry.kill(5).expect("kill failed");

    registry
        .start_job(
            &buffer,
            job_config(5, dir.path().join("a"), CompressAlg::Off),
            QueryCondition::match_all(),
        )
        .expect("restart with same id failed");
    registry.kill(5).expect("second kill failed");
}

#[test]
fn test_invalid_rotation_params_rejected() {
    let dir = TempDir::new().expect("tempdir failed");
    let buffer = Arc::new(LogBuffer::new());
    let registry = PersisterRegistry::new();

    let mut config = job_config(1, dir.path().join("a"), CompressAlg::Off);
    config.file_num = 0;
    let result = registry.start_job(&buffer, config, QueryCondition::match_all());
    assert!(matches!(
        result,
        Err(PersistError::InvalidFileParams { .. })
    ));
    assert!(registry.is_empty());
}

#[test]
fn test_query_filters_by_type_mask() {
    let dir = TempDir::new().expect("tempdir failed");
    let buffer = Arc::new(LogBuffer::new());
    let registry = PersisterRegistry::new();

    let condition = QueryCondition {
        types: LogType::App.bit() | LogType::Core.bit(),
        levels: u16::MAX,
        ..Default::default()
    };
    registry
        .start_job(
            &buffer,
            job_config(3, dir.path().join("a"), CompressAlg::Off),
            condition,
        )
        .expect("job failed");

    let hits = registry.query(LogType::App.bit());
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].job_id, 3);
    assert_eq!(hits[0].file_num, 3);
    assert_eq!(hits[0].compress_alg, CompressAlg::Off.as_u16());

    assert!(registry.query(LogType::Kmsg.bit()).is_empty());

    registry.kill(3).expect("kill failed");
}

// =============================================================================
// End-to-end persistence
// =============================================================================

#[test]
fn test_uncompressed_job_persists_rendered_lines() {
    let dir = TempDir::new().expect("tempdir failed");
    let buffer = Arc::new(LogBuffer::new());
    let registry = PersisterRegistry::new();

    let records = vec![
        record(1000, "first event"),
        record(1001, "second event"),
        record(1002, "third\nwith a second line"),
    ];
    for r in &records {
        buffer.insert(r.clone());
    }

    let path = dir.path().join("app");
    let job = registry
        .start_job(
            &buffer,
            job_config(1, path.clone(), CompressAlg::Off),
            QueryCondition::match_all(),
        )
        .expect("job failed");

    let out = dir.path().join("app.0");
    let expected = rendered(&records);
    assert!(
        wait_until(Duration::from_secs(3), || {
            job.staged_bytes() == expected.len()
                || fs::read_to_string(&out)
                    .map(|s| s.len() == expected.len())
                    .unwrap_or(false)
        }),
        "worker never consumed the backlog"
    );

    registry.kill(1).expect("kill failed");

    let written = fs::read_to_string(&out).expect("output missing");
    assert_eq!(written, expected);

    // Teardown removed the staging files but kept the output.
    assert!(!dir.path().join(".1").exists());
    assert!(!dir.path().join(".1.info").exists());
    assert!(out.exists());
}

#[test]
fn test_compressed_job_round_trips_through_zlib() {
    let dir = TempDir::new().expect("tempdir failed");
    let buffer = Arc::new(LogBuffer::new());
    let registry = PersisterRegistry::new();

    let records = vec![record(2000, "compressed one"), record(2001, "compressed two")];
    for r in &records {
        buffer.insert(r.clone());
    }

    let path = dir.path().join("zipped");
    let job = registry
        .start_job(
            &buffer,
            job_config(2, path.clone(), CompressAlg::Zlib),
            QueryCondition::match_all(),
        )
        .expect("job failed");

    let out = dir.path().join("zipped.0.gz");
    let expected = rendered(&records);
    assert!(
        wait_until(Duration::from_secs(3), || job.staged_bytes()
            == expected.len()
            || out.exists()),
        "worker never consumed the backlog"
    );
    registry.kill(2).expect("kill failed");

    let compressed = fs::read(&out).expect("output missing");
    let mut decompressed = Vec::new();
    flate2::read::ZlibDecoder::new(&compressed[..])
        .read_to_end(&mut decompressed)
        .expect("zlib decode failed");
    assert_eq!(String::from_utf8_lossy(&decompressed), expected);
}

#[test]
fn test_job_filters_records_by_condition() {
    let dir = TempDir::new().expect("tempdir failed");
    let buffer = Arc::new(LogBuffer::new());
    let registry = PersisterRegistry::new();

    let mut keep = record(3000, "keep me");
    keep.pid = 500;
    let skip = record(3001, "skip me");
    buffer.insert(keep.clone());
    buffer.insert(skip);

    let condition = QueryCondition {
        pids: vec![500],
        ..QueryCondition::match_all()
    };
    let path = dir.path().join("filtered");
    let job = registry
        .start_job(
            &buffer,
            job_config(4, path.clone(), CompressAlg::Off),
            condition,
        )
        .expect("job failed");

    let out = dir.path().join("filtered.0");
    let expected = rendered(&[keep]);
    assert!(wait_until(Duration::from_secs(3), || job.staged_bytes()
        == expected.len()
        || out.exists()));
    registry.kill(4).expect("kill failed");

    let written = fs::read_to_string(&out).expect("output missing");
    assert_eq!(written, expected);
    assert!(!written.contains("skip me"));
}

// =============================================================================
// Crash recovery
// =============================================================================

#[test]
fn test_restore_flushes_precrash_staging() {
    let dir = TempDir::new().expect("tempdir failed");

    // Simulate a crashed job: staged lines exist, nothing was flushed.
    {
        let (mut staging, restored) =
            StagingRegion::open(dir.path(), 9).expect("staging open failed");
        assert!(!restored);
        staging.append(b"pre-crash line one").expect("append failed");
        staging.append(b"pre-crash line two").expect("append failed");
    }

    let buffer = Arc::new(LogBuffer::new());
    let registry = PersisterRegistry::new();
    let path = dir.path().join("recovered");
    registry
        .start_job(
            &buffer,
            job_config(9, path.clone(), CompressAlg::Off),
            QueryCondition::match_all(),
        )
        .expect("job failed");

    // The recovered bytes are flushed during init, before any new data.
    let written = fs::read_to_string(dir.path().join("recovered.0")).expect("output missing");
    assert_eq!(written, "pre-crash line one\npre-crash line two\n");

    registry.kill(9).expect("kill failed");
}

#[test]
fn test_shutdown_keeps_staging_files_for_recovery() {
    let dir = TempDir::new().expect("tempdir failed");
    let buffer = Arc::new(LogBuffer::new());
    let registry = PersisterRegistry::new();

    registry
        .start_job(
            &buffer,
            job_config(6, dir.path().join("a"), CompressAlg::Off),
            QueryCondition::match_all(),
        )
        .expect("job failed");

    registry.shutdown_all();
    assert!(registry.is_empty());

    // Unlike kill, process shutdown leaves the staging pair behind.
    assert!(dir.path().join(".6").exists());
    assert!(dir.path().join(".6.info").exists());
}
