//! Append-only, time-ordered snapshot store with batched persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::milestone::{EvolutionMilestone, MilestoneDetector};
use super::snapshot::{CognitiveSnapshot, Evaluation, SnapshotContext, TimeWindow};
use super::storage::{EvolutionStorage, PersistedEvolution};
use crate::config::EvolutionConfig;
use crate::error::{JudgmentError, Result};

#[derive(Debug, Default)]
struct StoreState {
    snapshots: Vec<CognitiveSnapshot>,
    milestones: Vec<EvolutionMilestone>,
    /// Snapshots recorded by this process; drives the save cadence
    recorded: u64,
    /// Bumped on every record and load; never reset by trimming
    revision: u64,
}

/// Sole owner of the snapshot and milestone lists.
///
/// Records are serialized through one lock so the save cadence stays exact.
pub struct SnapshotStore {
    storage: Arc<dyn EvolutionStorage>,
    detector: MilestoneDetector,
    save_every: u64,
    max_persisted: usize,
    max_in_memory: usize,
    state: Mutex<StoreState>,
}

impl SnapshotStore {
    /// Create a store and load whatever durable state exists.
    ///
    /// A failed load is logged and the store starts empty.
    pub async fn open(config: &EvolutionConfig, storage: Arc<dyn EvolutionStorage>) -> Self {
        let store = Self {
            storage,
            detector: MilestoneDetector::default(),
            save_every: config.save_every.max(1) as u64,
            max_persisted: config.max_persisted_snapshots.max(1),
            max_in_memory: config
                .max_snapshots_in_memory
                .max(config.max_persisted_snapshots)
                .max(1),
            state: Mutex::new(StoreState::default()),
        };
        if let Err(e) = store.load().await {
            tracing::error!(
                storage = %store.storage.describe(),
                error = %e,
                "failed to load evolution data, starting empty"
            );
        }
        store
    }

    pub fn with_detector(mut self, detector: MilestoneDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Replace in-memory state with the durable record. Returns the snapshot count.
    pub async fn load(&self) -> Result<usize> {
        let data = self.storage.load().await?;
        let mut snapshots = Vec::with_capacity(data.snapshots.len());
        for snapshot in data.snapshots {
            match snapshot.validate() {
                Ok(()) => snapshots.push(snapshot),
                Err(e) => tracing::warn!(session = %snapshot.session_id, error = %e, "skipping invalid stored snapshot"),
            }
        }
        snapshots.sort_by_key(|s| s.timestamp);

        let mut state = self.state.lock().await;
        state.snapshots = snapshots;
        state.milestones = data.milestones;
        state.revision += 1;
        tracing::info!(
            snapshots = state.snapshots.len(),
            milestones = state.milestones.len(),
            "loaded evolution data"
        );
        Ok(state.snapshots.len())
    }

    /// Persist the most recent snapshots and every milestone.
    pub async fn save(&self) -> Result<()> {
        let state = self.state.lock().await;
        self.persist(&state).await
    }

    async fn persist(&self, state: &StoreState) -> Result<()> {
        let skip = state.snapshots.len().saturating_sub(self.max_persisted);
        let data = PersistedEvolution {
            snapshots: state.snapshots[skip..].to_vec(),
            milestones: state.milestones.clone(),
        };
        self.storage.save(&data).await?;
        tracing::debug!(
            snapshots = data.snapshots.len(),
            milestones = data.milestones.len(),
            "evolution data saved"
        );
        Ok(())
    }

    pub async fn record(
        &self,
        evaluation: &Evaluation,
        context: &SnapshotContext,
    ) -> Result<CognitiveSnapshot> {
        self.record_at(Utc::now(), evaluation, context).await
    }

    /// Record a snapshot with an explicit timestamp, which must not precede the latest one.
    pub async fn record_at(
        &self,
        timestamp: DateTime<Utc>,
        evaluation: &Evaluation,
        context: &SnapshotContext,
    ) -> Result<CognitiveSnapshot> {
        let snapshot = CognitiveSnapshot::new(timestamp, evaluation, context)?;

        let mut state = self.state.lock().await;
        if let Some(last) = state.snapshots.last() {
            if snapshot.timestamp < last.timestamp {
                return Err(JudgmentError::Validation {
                    message: format!(
                        "snapshot at {} precedes latest snapshot at {}",
                        snapshot.timestamp, last.timestamp
                    ),
                });
            }
        }

        state.snapshots.push(snapshot.clone());
        let found = self.detector.detect(&state.snapshots);
        for m in &found {
            tracing::info!(
                kind = m.milestone_type.as_str(),
                significance = m.significance_score,
                "{}",
                m.description
            );
        }
        state.milestones.extend(found);

        if state.snapshots.len() > self.max_in_memory {
            let excess = state.snapshots.len() - self.max_in_memory;
            state.snapshots.drain(..excess);
        }

        state.recorded += 1;
        state.revision += 1;
        if state.recorded % self.save_every == 0 {
            // durable store problems never block the in-memory path
            if let Err(e) = self.persist(&state).await {
                tracing::error!(error = %e, "failed to save evolution data");
            }
        }

        tracing::debug!(
            overall = snapshot.overall_intelligence,
            total = state.snapshots.len(),
            "cognitive state recorded"
        );
        Ok(snapshot)
    }

    /// Up to `n` most recent snapshots, oldest first
    pub async fn recent(&self, n: usize) -> Vec<CognitiveSnapshot> {
        let state = self.state.lock().await;
        let skip = state.snapshots.len().saturating_sub(n);
        state.snapshots[skip..].to_vec()
    }

    pub async fn filter_by_window(&self, window: TimeWindow) -> Vec<CognitiveSnapshot> {
        self.filter_by_window_at(window, Utc::now()).await
    }

    /// Snapshots with timestamp >= `now` minus the window, in recorded order.
    pub async fn filter_by_window_at(
        &self,
        window: TimeWindow,
        now: DateTime<Utc>,
    ) -> Vec<CognitiveSnapshot> {
        let cutoff = window.cutoff(now);
        let state = self.state.lock().await;
        state
            .snapshots
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    pub async fn snapshots(&self) -> Vec<CognitiveSnapshot> {
        self.state.lock().await.snapshots.clone()
    }

    pub async fn milestones(&self) -> Vec<EvolutionMilestone> {
        self.state.lock().await.milestones.clone()
    }

    pub async fn latest(&self) -> Option<CognitiveSnapshot> {
        self.state.lock().await.snapshots.last().cloned()
    }

    /// Changes whenever the held history changes, including once the list is at capacity.
    pub async fn revision(&self) -> u64 {
        self.state.lock().await.revision
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.snapshots.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::storage::MemoryStorage;
    use chrono::Duration;

    fn eval(v: f64) -> Evaluation {
        Evaluation {
            overall_intelligence: v,
            ..Evaluation::default()
        }
    }

    #[tokio::test]
    async fn test_rejects_out_of_order_timestamp() {
        let store = SnapshotStore::open(&EvolutionConfig::default(), Arc::new(MemoryStorage::new())).await;
        let now = Utc::now();
        store.record_at(now, &eval(0.5), &SnapshotContext::default()).await.unwrap();
        let err = store
            .record_at(now - Duration::seconds(5), &eval(0.5), &SnapshotContext::default())
            .await;
        assert!(err.is_err());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_memory_bound_drops_oldest() {
        let config = EvolutionConfig {
            max_persisted_snapshots: 3,
            max_snapshots_in_memory: 3,
            save_every: 100,
            ..EvolutionConfig::default()
        };
        let store = SnapshotStore::open(&config, Arc::new(MemoryStorage::new())).await;
        let start = Utc::now() - Duration::minutes(10);
        for i in 0..5 {
            store
                .record_at(start + Duration::minutes(i), &eval(0.1 * (i + 1) as f64), &SnapshotContext::default())
                .await
                .unwrap();
        }
        let kept: Vec<f64> = store.snapshots().await.iter().map(|s| s.overall_intelligence).collect();
        assert_eq!(kept.len(), 3);
        assert!((kept[0] - 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_recent_returns_tail_in_order() {
        let store = SnapshotStore::open(&EvolutionConfig::default(), Arc::new(MemoryStorage::new())).await;
        for v in [0.1, 0.2, 0.3] {
            store.record(&eval(v), &SnapshotContext::default()).await.unwrap();
        }
        let tail: Vec<f64> = store.recent(2).await.iter().map(|s| s.overall_intelligence).collect();
        assert_eq!(tail, vec![0.2, 0.3]);
        assert_eq!(store.recent(10).await.len(), 3);
    }
}
