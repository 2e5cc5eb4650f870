
use std::time::Duration;

use fixture::{directory, quiet_config, values};
use pretty_assertions::assert_eq;
use tabular_session::{
    ConfigError, DirectoryConfig, DurabilityConfig, ErrorKind, HistoryConfig, HistoryError,
    Operation, PlacementStrategy, SessionDirectory, SessionError, TriggerMode,
};

fn periodic(dir: &std::path::Path, interval: Duration) -> DurabilityConfig {
    DurabilityConfig::default()
        .with_trigger(TriggerMode::Interval)
        .with_interval(interval)
        .with_strategy(PlacementStrategy::FixedPath)
        .with_fixed_path(dir.join("out.csv"))
}

#[tokio::test]
async fn create_get_and_remove_round_trip() {
    let sessions = directory(10, Duration::from_secs(60));
    let session = sessions.create().await.expect("create should succeed");
    let id = session.id().to_string();
    assert_eq!(id.len(), 36);

    let found = sessions.get(&id).expect("session should be found");
    assert_eq!(found.id(), id);
    assert_eq!(sessions.len(), 1);

    assert!(sessions.remove(&id).await);
    assert!(!sessions.remove(&id).await, "second remove is a no-op");
    let error = sessions.get(&id).expect_err("removed session is gone");
    assert_eq!(error.kind(), ErrorKind::NotFound);
    assert!(sessions.is_empty());
}

#[tokio::test]
async fn duplicate_ids_are_rejected() {
    let sessions = directory(10, Duration::from_secs(60));
    sessions
        .create_with_id("fixed")
        .await
        .expect("first create succeeds");
    let error = sessions
        .create_with_id("fixed")
        .await
        .expect_err("id already taken");
    assert!(matches!(error, SessionError::AlreadyExists { .. }));
}

#[tokio::test]
async fn expired_sessions_are_marked_then_purged() {
    let sessions = directory(10, Duration::from_millis(40));
    let stale = sessions.create_with_id("stale").await.expect("create");
    stale
        .load(values(&[1]), None)
        .await
        .expect("load should succeed");

    tokio::time::sleep(Duration::from_millis(80)).await;
    sessions.create_with_id("fresh").await.expect("create");

    let error = sessions.get("stale").expect_err("expired on access");
    assert_eq!(error.kind(), ErrorKind::NotFound);
    assert_eq!(sessions.len(), 2, "lookup only marks the session");
    assert!(stale.is_marked_expired());

    assert_eq!(sessions.sweep(), Vec::<String>::new(), "already marked");
    let ids: Vec<String> = sessions.list().into_iter().map(|info| info.session_id).collect();
    assert_eq!(ids, vec!["fresh".to_string()]);

    assert_eq!(sessions.purge_expired().await, vec!["stale".to_string()]);
    assert_eq!(sessions.len(), 1);
    assert_eq!(stale.dataset(), None, "purged sessions release their dataset");
    assert!(sessions.get("fresh").is_ok());
}

#[tokio::test]
async fn expired_periodic_session_is_fully_stopped_after_purge() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let sessions = SessionDirectory::new(
        quiet_config()
            .with_directory(DirectoryConfig::default().with_session_ttl(Duration::from_millis(40)))
            .with_durability(periodic(dir.path(), Duration::from_secs(3600))),
    );
    let idle = sessions.create_with_id("idle").await.expect("create");
    idle.load(values(&[1]), None)
        .await
        .expect("load should succeed");
    assert!(idle.autosave_status().periodic_alive);

    tokio::time::sleep(Duration::from_millis(80)).await;
    let error = sessions.get("idle").expect_err("idle past its ttl");
    assert_eq!(error.kind(), ErrorKind::NotFound);
    assert_eq!(sessions.sweep(), Vec::<String>::new(), "get already marked it");

    assert_eq!(sessions.purge_expired().await, vec!["idle".to_string()]);
    assert!(sessions.is_empty());
    assert!(!idle.autosave_status().periodic_alive);
    assert_eq!(idle.dataset(), None);
}

#[tokio::test]
async fn sweep_marks_idle_sessions() {
    let sessions = directory(10, Duration::from_millis(30));
    sessions.create_with_id("a").await.expect("create");
    sessions.create_with_id("b").await.expect("create");

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(sessions.sweep(), vec!["a".to_string(), "b".to_string()]);
    assert_eq!(sessions.purge_expired().await.len(), 2);
    assert!(sessions.is_empty());
}

#[tokio::test]
async fn capacity_evicts_least_recently_accessed() {
    let sessions = directory(2, Duration::from_secs(60));
    sessions.create_with_id("a").await.expect("create");
    tokio::time::sleep(Duration::from_millis(5)).await;
    sessions.create_with_id("b").await.expect("create");
    tokio::time::sleep(Duration::from_millis(5)).await;
    sessions.get("a").expect("touch a");

    sessions.create_with_id("c").await.expect("create at capacity");
    assert_eq!(sessions.len(), 2);
    assert!(sessions.get("b").is_err(), "b was least recently accessed");
    assert!(sessions.get("a").is_ok());
    assert!(sessions.get("c").is_ok());
}

#[tokio::test]
async fn eviction_stops_the_periodic_loop() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let sessions = SessionDirectory::new(
        quiet_config()
            .with_directory(DirectoryConfig::default().with_max_sessions(1))
            .with_durability(
                DurabilityConfig::default()
                    .with_trigger(TriggerMode::Interval)
                    .with_interval(Duration::from_secs(3600))
                    .with_backup_dir(dir.path()),
            ),
    );
    let first = sessions.create_with_id("first").await.expect("create");
    first
        .load(values(&[1]), Some(dir.path().join("first.csv")))
        .await
        .expect("load should succeed");
    assert!(first.autosave_status().periodic_alive);

    sessions.create_with_id("second").await.expect("create");
    assert!(!first.autosave_status().periodic_alive);
    assert_eq!(first.dataset(), None);
}

#[tokio::test]
async fn protect_unflushed_skips_sessions_with_unsaved_edits() {
    let sessions = SessionDirectory::new(
        quiet_config().with_directory(
            DirectoryConfig::default()
                .with_max_sessions(2)
                .with_protect_unflushed(true),
        ),
    );
    let dirty = sessions.create_with_id("dirty").await.expect("create");
    dirty
        .load(values(&[1, 2]), None)
        .await
        .expect("load should succeed");
    dirty
        .edit(Operation::DropRows { indices: vec![0] }, values(&[2]))
        .expect("edit should succeed");
    tokio::time::sleep(Duration::from_millis(5)).await;
    sessions.create_with_id("clean").await.expect("create");

    sessions.create_with_id("third").await.expect("clean one is evicted");
    assert!(sessions.get("dirty").is_ok());
    assert!(sessions.get("clean").is_err());

    let third = sessions.get("third").expect("third exists");
    third
        .load(values(&[1]), None)
        .await
        .expect("load should succeed");
    third
        .edit(Operation::DropRows { indices: vec![0] }, values(&[]))
        .expect("edit should succeed");

    let error = sessions
        .create_with_id("fourth")
        .await
        .expect_err("every session has unsaved edits");
    assert!(matches!(error, SessionError::CapacityExhausted { max_sessions: 2 }));
    assert_eq!(error.kind(), ErrorKind::InvalidState);
    assert_eq!(sessions.len(), 2);
}

#[tokio::test]
async fn list_and_shutdown() {
    let sessions = directory(10, Duration::from_secs(60));
    let first = sessions.create_with_id("one").await.expect("create");
    first
        .load(values(&[1, 2, 3]), None)
        .await
        .expect("load should succeed");
    sessions.create_with_id("two").await.expect("create");

    let infos = sessions.list();
    assert_eq!(infos.len(), 2);
    let one = infos
        .iter()
        .find(|info| info.session_id == "one")
        .expect("one is listed");
    assert_eq!(one.rows, Some(3));
    assert_eq!(one.columns, Some(1));
    assert_eq!(one.history_len, 0);
    assert!(!one.unflushed);

    sessions.shutdown().await;
    assert!(sessions.is_empty());
    assert_eq!(first.dataset(), None);
}

#[tokio::test]
async fn invalid_history_limits_fail_creation() {
    for history in [
        HistoryConfig::default().with_snapshot_interval(0),
        HistoryConfig::default().with_max_entries(0),
    ] {
        let sessions = SessionDirectory::new(quiet_config().with_history(history));
        let error = sessions
            .create_with_id("a")
            .await
            .expect_err("zero history limits must be rejected");
        assert!(matches!(
            error,
            SessionError::Config(ConfigError::History(HistoryError::InvalidConfig { .. }))
        ));
        assert_eq!(error.kind(), ErrorKind::InvalidInput);
        assert!(sessions.is_empty());
    }
}

#[tokio::test]
async fn periodic_save_of_the_live_state_allows_protected_eviction() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let sessions = SessionDirectory::new(
        quiet_config()
            .with_directory(
                DirectoryConfig::default()
                    .with_max_sessions(1)
                    .with_protect_unflushed(true),
            )
            .with_durability(periodic(dir.path(), Duration::from_millis(25))),
    );
    let first = sessions.create_with_id("a").await.expect("create");
    first
        .load(values(&[1, 2]), None)
        .await
        .expect("load should succeed");
    first
        .edit(Operation::DropRows { indices: vec![0] }, values(&[2]))
        .expect("edit should succeed");

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(first.autosave_status().save_count >= 1);
    assert!(!first.has_unflushed_edits());
    assert!(!first.info().unflushed);

    sessions
        .create_with_id("b")
        .await
        .expect("saved session can be evicted");
    assert!(sessions.get("a").is_err());
    assert!(!first.autosave_status().periodic_alive);
    sessions.shutdown().await;
}

#[tokio::test]
async fn get_or_create_reuses_live_sessions() {
    let sessions = directory(10, Duration::from_secs(60));
    let fresh = sessions.get_or_create(None).await.expect("create");
    let again = sessions
        .get_or_create(Some(fresh.id()))
        .await
        .expect("lookup");
    assert_eq!(again.id(), fresh.id());
    assert_eq!(sessions.len(), 1);

    let other = sessions
        .get_or_create(Some("unknown"))
        .await
        .expect("unknown id creates a new session");
    assert_ne!(other.id(), "unknown");
    assert_ne!(other.id(), fresh.id());
    assert_eq!(sessions.len(), 2);
}
