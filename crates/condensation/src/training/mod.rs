//! Training pipeline: event data and batching, learning-rate schedules,
//! checkpoints, failure diagnostics, and the epoch/batch controller.

pub mod checkpoint;
pub mod data;
pub mod diagnostics;
pub mod metrics;
pub mod schedule;
pub mod trainer;

pub use checkpoint::{
    load_checkpoint, BestTracker, CheckpointError, CheckpointMeta, CheckpointStore, CheckpointTag,
    FileCheckpointStore,
};
pub use data::{
    BatchSource, DataError, Event, EventBatch, EventDataset, EventLoader, EventRecord, InMemoryLoader,
    PointCloudBatch,
};
pub use diagnostics::BatchFailure;
pub use metrics::{EpochRecord, TrainSummary};
pub use schedule::{ConstantLr, CyclicLrWithRestarts, LrScheduler, SchedulerConfig, WarmupCosine};
pub use trainer::{train, validate, StepError, TrainError, TrainingConfig};
