
use std::fs;
use std::time::Duration;

use fixture::{quiet_config, values};
use pretty_assertions::assert_eq;
use tabular_session::{
    ArtifactWriter, DurabilityConfig, ErrorKind, ExportFormat, Operation, PlacementStrategy,
    SaveTrigger, Session, SessionConfig, TriggerMode,
};

fn session(durability: DurabilityConfig) -> Session {
    Session::new(
        "s1",
        &SessionConfig::default().with_durability(durability),
        ArtifactWriter::new(),
    )
    .expect("session should build")
}

#[tokio::test]
async fn edit_then_trigger_overwrites_the_source_file() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let source = dir.path().join("data.csv");
    fs::write(&source, "v\n1\n2\n").expect("source written");

    let session = session(DurabilityConfig::default());
    session
        .load(values(&[1, 2]), Some(source.clone()))
        .await
        .expect("load should succeed");
    assert_eq!(
        session
            .trigger_autosave_if_needed()
            .await
            .expect("nothing owed"),
        None
    );

    let receipt = session
        .edit(Operation::DropRows { indices: vec![0] }, values(&[2]))
        .expect("edit should succeed");
    assert!(receipt.autosave_due);
    assert!(session.has_unflushed_edits());

    let report = session
        .trigger_autosave_if_needed()
        .await
        .expect("save should succeed")
        .expect("a save was owed");
    assert_eq!(report.path, source);
    assert_eq!(report.trigger, SaveTrigger::Edit);
    assert!(!session.has_unflushed_edits());
    assert_eq!(fs::read_to_string(&source).expect("readable"), "v\n2\n");

    assert_eq!(
        session
            .trigger_autosave_if_needed()
            .await
            .expect("nothing owed"),
        None
    );
}

#[tokio::test]
async fn failed_autosave_keeps_the_edit_and_the_obligation() {
    let session = session(DurabilityConfig::default());
    session
        .load(values(&[1, 2]), None)
        .await
        .expect("load should succeed");

    session
        .edit(Operation::DropRows { indices: vec![0] }, values(&[2]))
        .expect("edit succeeds even though saving cannot");
    let error = session
        .trigger_autosave_if_needed()
        .await
        .expect_err("no source path for overwrite_source");
    assert_eq!(error.kind(), ErrorKind::NoSourcePath);

    assert!(session.has_unflushed_edits());
    assert_eq!(session.info().history_len, 1);
    assert_eq!(session.autosave_status().save_count, 0);
}

#[tokio::test]
async fn interval_mode_does_not_save_on_edit() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let session = session(
        DurabilityConfig::default()
            .with_trigger(TriggerMode::Interval)
            .with_interval(Duration::from_secs(3600))
            .with_strategy(PlacementStrategy::FixedPath)
            .with_fixed_path(dir.path().join("out.csv")),
    );
    session
        .load(values(&[1]), None)
        .await
        .expect("load should succeed");
    assert!(session.autosave_status().periodic_alive);

    let receipt = session
        .edit(Operation::DropRows { indices: vec![0] }, values(&[]))
        .expect("edit should succeed");
    assert!(!receipt.autosave_due);
    assert_eq!(
        session
            .trigger_autosave_if_needed()
            .await
            .expect("nothing to do"),
        None
    );
    assert!(session.has_unflushed_edits());

    session.shutdown().await;
    assert!(!session.autosave_status().periodic_alive);
}

#[tokio::test]
async fn periodic_saves_pick_up_the_latest_state() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let target = dir.path().join("out.csv");
    let session = session(
        DurabilityConfig::default()
            .with_trigger(TriggerMode::Interval)
            .with_interval(Duration::from_millis(25))
            .with_strategy(PlacementStrategy::FixedPath)
            .with_fixed_path(target.clone()),
    );
    session
        .load(values(&[1, 2]), None)
        .await
        .expect("load should succeed");
    session
        .edit(Operation::DropRows { indices: vec![0] }, values(&[2]))
        .expect("edit should succeed");

    tokio::time::sleep(Duration::from_millis(150)).await;
    session.shutdown().await;

    assert!(session.autosave_status().save_count >= 1);
    assert_eq!(fs::read_to_string(&target).expect("readable"), "v\n2\n");
}

#[tokio::test]
async fn manual_save_and_reconfiguration() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let session = Session::new(
        "s1",
        &quiet_config(),
        ArtifactWriter::new(),
    )
    .expect("session should build");
    session
        .load(values(&[5]), None)
        .await
        .expect("load should succeed");

    let status = session
        .configure_autosave(
            DurabilityConfig::default()
                .with_strategy(PlacementStrategy::MonotonicVersion)
                .with_backup_dir(dir.path())
                .with_format(ExportFormat::Json),
        )
        .await
        .expect("config is valid");
    assert!(status.enabled);
    assert_eq!(status.strategy, PlacementStrategy::MonotonicVersion);

    let report = session.save_now().await.expect("manual save succeeds");
    assert_eq!(report.trigger, SaveTrigger::Manual);
    assert_eq!(
        report.path.file_name().and_then(|name| name.to_str()),
        Some("version_s1_v0001.json")
    );

    let error = session
        .configure_autosave(DurabilityConfig::default().with_max_backups(0))
        .await
        .expect_err("invalid config");
    assert_eq!(error.kind(), ErrorKind::InvalidInput);

    let status = session.disable_autosave().await;
    assert!(!status.enabled);
    assert_eq!(status.save_count, 1);
    session.save_now().await.expect("manual saves still work");
    assert_eq!(session.autosave_status().save_count, 2);
}

#[tokio::test]
async fn periodic_save_settles_the_edit_obligation() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let session = session(
        DurabilityConfig::default()
            .with_trigger(TriggerMode::Both)
            .with_interval(Duration::from_millis(25))
            .with_strategy(PlacementStrategy::FixedPath)
            .with_fixed_path(dir.path().join("out.csv")),
    );
    session
        .load(values(&[1, 2]), None)
        .await
        .expect("load should succeed");
    let receipt = session
        .edit(Operation::DropRows { indices: vec![0] }, values(&[2]))
        .expect("edit should succeed");
    assert!(receipt.autosave_due);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!session.has_unflushed_edits());
    assert_eq!(
        session
            .trigger_autosave_if_needed()
            .await
            .expect("nothing owed"),
        None
    );

    session
        .edit(Operation::DropRows { indices: vec![0] }, values(&[]))
        .expect("edit should succeed");
    assert!(session.has_unflushed_edits(), "a newer state is owed again");
    session.shutdown().await;
}
