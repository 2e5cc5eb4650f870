use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use artifact_writer::{ArtifactWriter, TextCodec, WriteError};
use autosave::{
    AutosaveError, AutosaveScheduler, DurabilityConfig, PlacementStrategy, SaveTrigger,
    SharedDataset, TriggerMode,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tabular_contract::{ArtifactCodec, CodecError, Dataset, ExportFormat};

fn values(values: &[i64]) -> Arc<Dataset> {
    let records: Vec<_> = values.iter().map(|v| json!({ "v": v })).collect();
    Arc::new(Dataset::from_records(&records).expect("fixture should build"))
}

fn scheduler(config: DurabilityConfig) -> AutosaveScheduler {
    AutosaveScheduler::new("s1", config, ArtifactWriter::new(), SharedDataset::new())
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("dir readable")
        .map(|entry| {
            entry
                .expect("entry readable")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}

/// Text codec that sleeps while encoding and records peak concurrency.
struct SlowCodec {
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ArtifactCodec for SlowCodec {
    fn encode(
        &self,
        dataset: &Dataset,
        format: ExportFormat,
        encoding: &str,
    ) -> Result<Vec<u8>, CodecError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.active.fetch_sub(1, Ordering::SeqCst);
        TextCodec.encode(dataset, format, encoding)
    }
}

#[tokio::test]
async fn on_edit_overwrite_writes_one_file_with_latest_state() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let source = dir.path().join("data.csv");
    let scheduler = scheduler(DurabilityConfig::default());
    scheduler.set_source_path(Some(source.clone()));
    assert!(scheduler.should_save_after_edit());

    for edit in 1..=3 {
        let report = scheduler
            .save(values(&[edit, edit * 10]), SaveTrigger::Edit)
            .await
            .expect("save should succeed");
        assert_eq!(report.path, source);
        assert_eq!(report.save_count, edit as u64);
    }

    assert_eq!(file_names(dir.path()), vec!["data.csv".to_string()]);
    assert_eq!(
        fs::read_to_string(&source).expect("artifact readable"),
        "v\n3\n30\n"
    );
}

#[tokio::test]
async fn timestamped_backups_keep_most_recent() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let scheduler = scheduler(
        DurabilityConfig::default()
            .with_strategy(PlacementStrategy::TimestampedBackup)
            .with_backup_dir(dir.path())
            .with_max_backups(3),
    );

    let mut written: Vec<PathBuf> = Vec::new();
    let mut pruned = 0;
    for save in 0..5 {
        let report = scheduler
            .save(values(&[save]), SaveTrigger::Manual)
            .await
            .expect("save should succeed");
        pruned += report.pruned.len();
        written.push(report.path);
    }

    assert_eq!(pruned, 2);
    let expected: Vec<String> = written[2..]
        .iter()
        .map(|path| {
            path.file_name()
                .expect("backup has a name")
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    assert_eq!(file_names(dir.path()), expected);
    assert!(expected.iter().all(|name| name.starts_with("backup_s1_")));
}

#[tokio::test]
async fn monotonic_versions_are_numbered_in_order() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let scheduler = scheduler(
        DurabilityConfig::default()
            .with_strategy(PlacementStrategy::MonotonicVersion)
            .with_backup_dir(dir.path())
            .with_format(ExportFormat::Json),
    );

    for save in 0..3 {
        scheduler
            .save(values(&[save]), SaveTrigger::Manual)
            .await
            .expect("save should succeed");
    }

    assert_eq!(
        file_names(dir.path()),
        vec![
            "version_s1_v0001.json".to_string(),
            "version_s1_v0002.json".to_string(),
            "version_s1_v0003.json".to_string(),
        ]
    );
    let last: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(dir.path().join("version_s1_v0003.json")).expect("readable"),
    )
    .expect("version is JSON");
    assert_eq!(last, json!([{ "v": 2 }]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_saves_never_interleave() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let codec = Arc::new(SlowCodec {
        delay: Duration::from_millis(150),
        active: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let scheduler = AutosaveScheduler::new(
        "s1",
        DurabilityConfig::default()
            .with_strategy(PlacementStrategy::FixedPath)
            .with_fixed_path(dir.path().join("out.csv")),
        ArtifactWriter::with_codec(Arc::clone(&codec) as Arc<dyn ArtifactCodec>),
        SharedDataset::new(),
    );
    let periodic = scheduler.clone();

    let started = Instant::now();
    let (first, second) = tokio::join!(
        periodic.save(values(&[1]), SaveTrigger::Periodic),
        scheduler.save(values(&[2]), SaveTrigger::Edit),
    );
    let elapsed = started.elapsed();

    let first = first.expect("periodic save should succeed");
    let second = second.expect("edit save should succeed");
    assert_eq!(codec.peak.load(Ordering::SeqCst), 1);
    assert!(elapsed >= Duration::from_millis(300), "saves overlapped: {elapsed:?}");
    let mut counts = vec![first.save_count, second.save_count];
    counts.sort_unstable();
    assert_eq!(counts, vec![1, 2]);
}

#[tokio::test]
async fn overwrite_source_without_origin_fails_structurally() {
    let scheduler = scheduler(DurabilityConfig::default());
    let error = scheduler
        .save(values(&[1]), SaveTrigger::Edit)
        .await
        .expect_err("no source path must fail");
    assert!(matches!(error, AutosaveError::NoSourcePath));
    assert_eq!(scheduler.save_count(), 0);
    assert_eq!(scheduler.status().last_save, None);
}

#[tokio::test]
async fn write_failure_leaves_ledger_untouched() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "x").expect("blocker written");
    let scheduler = scheduler(
        DurabilityConfig::default()
            .with_strategy(PlacementStrategy::FixedPath)
            .with_fixed_path(blocker.join("out.csv")),
    );

    let error = scheduler
        .save(values(&[1]), SaveTrigger::Manual)
        .await
        .expect_err("parent is a file");
    assert!(matches!(error, AutosaveError::Write(WriteError::Io { .. })));
    assert_eq!(scheduler.save_count(), 0);

    // The save lock was released on the error path.
    let error = scheduler
        .save(values(&[1]), SaveTrigger::Manual)
        .await
        .expect_err("still failing");
    assert!(matches!(error, AutosaveError::Write(_)));
}

#[tokio::test]
async fn last_saved_tracks_the_written_handle() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let fixed = scheduler(
        DurabilityConfig::default()
            .with_strategy(PlacementStrategy::FixedPath)
            .with_fixed_path(dir.path().join("out.csv")),
    );
    let first = values(&[1]);
    let equal_but_distinct = values(&[1]);
    assert!(!fixed.last_saved_is(&first));

    fixed
        .save(Arc::clone(&first), SaveTrigger::Periodic)
        .await
        .expect("save should succeed");
    assert!(fixed.last_saved_is(&first));
    assert!(!fixed.last_saved_is(&equal_but_distinct));

    let failing = scheduler(DurabilityConfig::default());
    let unsaved = values(&[2]);
    failing
        .save(Arc::clone(&unsaved), SaveTrigger::Edit)
        .await
        .expect_err("no source path must fail");
    assert!(!failing.last_saved_is(&unsaved));
}

#[tokio::test]
async fn periodic_loop_saves_until_stopped() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let source = SharedDataset::new();
    source.set(values(&[7]));
    let scheduler = AutosaveScheduler::new(
        "s1",
        DurabilityConfig::default()
            .with_trigger(TriggerMode::Interval)
            .with_interval(Duration::from_millis(30))
            .with_strategy(PlacementStrategy::MonotonicVersion)
            .with_backup_dir(dir.path())
            .with_max_backups(100),
        ArtifactWriter::new(),
        source,
    );
    assert!(!scheduler.should_save_after_edit());

    assert!(scheduler.start_periodic());
    assert!(scheduler.start_periodic(), "second start reuses the running loop");
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(scheduler.is_periodic_alive());

    assert!(scheduler.stop_periodic().await);
    assert!(!scheduler.is_periodic_alive());
    let count = scheduler.save_count();
    assert!(count >= 2, "expected periodic saves, got {count}");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(scheduler.save_count(), count);
    assert!(!scheduler.stop_periodic().await);
    assert_eq!(file_names(dir.path()).len() as u64, count);
}

#[tokio::test]
async fn periodic_loop_skips_ticks_without_dataset() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let scheduler = AutosaveScheduler::new(
        "s1",
        DurabilityConfig::default()
            .with_trigger(TriggerMode::Both)
            .with_interval(Duration::from_millis(20))
            .with_strategy(PlacementStrategy::FixedPath)
            .with_fixed_path(dir.path().join("out.csv")),
        ArtifactWriter::new(),
        SharedDataset::new(),
    );

    assert!(scheduler.start_periodic());
    tokio::time::sleep(Duration::from_millis(100)).await;
    scheduler.stop_periodic().await;
    assert_eq!(scheduler.save_count(), 0);
}

#[tokio::test]
async fn reconfigure_and_disable_follow_trigger_mode() {
    let scheduler = scheduler(DurabilityConfig::default());
    assert!(!scheduler.start_periodic());

    scheduler
        .reconfigure(
            DurabilityConfig::default()
                .with_trigger(TriggerMode::Interval)
                .with_interval(Duration::from_secs(3600)),
        )
        .await
        .expect("interval config is valid");
    assert!(scheduler.is_periodic_alive());
    assert!(!scheduler.should_save_after_edit());

    let error = scheduler
        .reconfigure(DurabilityConfig::default().with_max_backups(0))
        .await
        .expect_err("invalid config must be rejected");
    assert!(matches!(error, AutosaveError::InvalidConfig { .. }));
    assert!(scheduler.is_periodic_alive(), "rejected config leaves the loop running");

    scheduler.disable().await;
    let status = scheduler.status();
    assert!(!status.enabled);
    assert!(!status.periodic_alive);
    assert_eq!(status.trigger, TriggerMode::Interval);
    assert!(!scheduler.start_periodic());
}

#[tokio::test]
async fn status_reports_ledger_and_config() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let scheduler = scheduler(
        DurabilityConfig::default()
            .with_strategy(PlacementStrategy::FixedPath)
            .with_fixed_path(dir.path().join("fixed.md"))
            .with_format(ExportFormat::Markdown),
    );
    scheduler
        .save(values(&[1]), SaveTrigger::Manual)
        .await
        .expect("save should succeed");

    let status = scheduler.status();
    assert_eq!(status.save_count, 1);
    assert!(status.last_save.is_some());
    assert_eq!(status.strategy, PlacementStrategy::FixedPath);
    assert_eq!(status.config.format, ExportFormat::Markdown);
    assert_eq!(
        fs::read_to_string(dir.path().join("fixed.md")).expect("readable"),
        "| v |\n| --- |\n| 1 |\n"
    );
}
