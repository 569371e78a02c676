use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use chrono::{DateTime, Duration, Utc};
use judgment_mind::config::EvolutionConfig;
use judgment_mind::evolution::{
    Evaluation, EvolutionStorage, JsonFileStorage, MemoryStorage, MilestoneType,
    PersistedEvolution, SnapshotContext, SnapshotStore, TimeWindow,
};
use judgment_mind::{JudgmentError, Result};

/// Storage whose writes always fail.
#[derive(Default)]
struct FailingStorage {
    attempts: AtomicUsize,
}

#[async_trait]
impl EvolutionStorage for FailingStorage {
    async fn load(&self) -> Result<PersistedEvolution> {
        Ok(PersistedEvolution::default())
    }

    async fn save(&self, _data: &PersistedEvolution) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(JudgmentError::Persistence {
            message: "disk full".into(),
        })
    }

    fn describe(&self) -> String {
        "failing".to_string()
    }
}

fn eval(overall: f64) -> Evaluation {
    Evaluation {
        overall_intelligence: overall,
        cognitive_coherence: 0.7,
        ..Evaluation::default()
    }
}

fn start() -> DateTime<Utc> {
    Utc::now() - Duration::hours(3)
}

#[tokio::test]
async fn test_window_filter_is_idempotent() {
    let storage = Arc::new(MemoryStorage::new());
    let store = SnapshotStore::open(&EvolutionConfig::default(), storage).await;
    let now = Utc::now();
    let ctx = SnapshotContext::default();

    store
        .record_at(now - Duration::days(3), &eval(0.4), &ctx)
        .await
        .unwrap();
    for i in 0..5 {
        store
            .record_at(now - Duration::hours(5 - i), &eval(0.5 + i as f64 * 0.01), &ctx)
            .await
            .unwrap();
    }

    let first = store.filter_by_window_at(TimeWindow::Day, now).await;
    let second = store.filter_by_window_at(TimeWindow::Day, now).await;
    assert_eq!(first.len(), 5);
    assert_eq!(first, second);
    assert!(first.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn test_save_happens_every_tenth_record() {
    let storage = Arc::new(MemoryStorage::new());
    let store = SnapshotStore::open(&EvolutionConfig::default(), storage.clone()).await;
    let ctx = SnapshotContext::default();
    let t0 = start();

    for i in 0..9 {
        store
            .record_at(t0 + Duration::minutes(i), &eval(0.5), &ctx)
            .await
            .unwrap();
    }
    assert_eq!(storage.save_count(), 0);

    store
        .record_at(t0 + Duration::minutes(9), &eval(0.5), &ctx)
        .await
        .unwrap();
    assert_eq!(storage.save_count(), 1);
    assert_eq!(storage.snapshot_count().await, 10);
}

#[tokio::test]
async fn test_failed_save_does_not_fail_record() {
    let storage = Arc::new(FailingStorage::default());
    let store = SnapshotStore::open(&EvolutionConfig::default(), storage.clone()).await;
    let ctx = SnapshotContext::default();
    let t0 = start();

    for i in 0..10 {
        let recorded = store
            .record_at(t0 + Duration::minutes(i), &eval(0.5), &ctx)
            .await;
        assert!(recorded.is_ok(), "record {} failed: {:?}", i, recorded.err());
    }
    assert_eq!(storage.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(store.len().await, 10);
    assert_eq!(store.latest().await.unwrap().overall_intelligence, 0.5);
}

#[tokio::test]
async fn test_revision_advances_once_history_is_full() {
    let config = EvolutionConfig {
        max_persisted_snapshots: 5,
        max_snapshots_in_memory: 5,
        ..EvolutionConfig::default()
    };
    let store = SnapshotStore::open(&config, Arc::new(MemoryStorage::new())).await;
    let ctx = SnapshotContext::default();
    let t0 = start();

    for i in 0..5 {
        store
            .record_at(t0 + Duration::minutes(i), &eval(0.5), &ctx)
            .await
            .unwrap();
    }
    let full = store.revision().await;
    store
        .record_at(t0 + Duration::minutes(5), &eval(0.6), &ctx)
        .await
        .unwrap();
    assert_eq!(store.len().await, 5);
    assert!(store.revision().await > full);
}

#[tokio::test]
async fn test_out_of_range_metric_is_rejected() {
    let store = SnapshotStore::open(&EvolutionConfig::default(), Arc::new(MemoryStorage::new())).await;
    let err = store
        .record(&eval(1.2), &SnapshotContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, JudgmentError::Validation { .. }));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_round_trip_through_json_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = EvolutionConfig {
        storage_path: dir.path().to_path_buf(),
        save_every: 250,
        ..EvolutionConfig::default()
    };
    let storage = Arc::new(JsonFileStorage::new(dir.path()));
    let store = SnapshotStore::open(&config, storage).await;
    let ctx = SnapshotContext {
        session_id: Some("round-trip".into()),
        ..SnapshotContext::default()
    };
    let t0 = start();

    for i in 0..1005 {
        // slow sawtooth keeps every milestone kind in play
        let overall = 0.4 + (i % 40) as f64 * 0.01;
        store
            .record_at(t0 + Duration::seconds(i), &eval(overall), &ctx)
            .await
            .unwrap();
    }
    store.save().await.unwrap();

    let written = store.snapshots().await;
    let milestones = store.milestones().await;
    assert!(!milestones.is_empty());

    let reopened = SnapshotStore::open(&config, Arc::new(JsonFileStorage::new(dir.path()))).await;
    let loaded = reopened.snapshots().await;
    assert_eq!(loaded.len(), 1000);
    assert_eq!(loaded.as_slice(), &written[5..]);
    assert_eq!(reopened.milestones().await, milestones);
}

#[tokio::test]
async fn test_corrupt_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("snapshots.json"), b"{not json").unwrap();
    let store = SnapshotStore::open(
        &EvolutionConfig::default(),
        Arc::new(JsonFileStorage::new(dir.path())),
    )
    .await;
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_plateau_milestone_recorded_by_store() {
    let store = SnapshotStore::open(&EvolutionConfig::default(), Arc::new(MemoryStorage::new())).await;
    let ctx = SnapshotContext::default();
    let t0 = start();
    for i in 0..15 {
        let overall = if i % 2 == 0 { 0.50 } else { 0.54 };
        store
            .record_at(t0 + Duration::minutes(i), &eval(overall), &ctx)
            .await
            .unwrap();
    }
    let milestones = store.milestones().await;
    assert_eq!(milestones.len(), 1);
    assert_eq!(milestones[0].milestone_type, MilestoneType::Plateau);
}
