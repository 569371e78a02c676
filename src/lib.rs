//! judgment-mind: an eight-stage judgment pipeline plus a longitudinal
//! engine that tracks how its quality metrics evolve.

pub mod config;
pub mod error;
pub mod evolution;
pub mod pipeline;
pub mod stages;
pub mod utils;

pub use config::Config;
pub use error::{JudgmentError, Result};
pub use evolution::{EvolutionTracker, MilestoneDetector, SnapshotStore, TrendAnalyzer};
pub use pipeline::{PipelineRun, PipelineScheduler};
pub use stages::StageRegistry;
