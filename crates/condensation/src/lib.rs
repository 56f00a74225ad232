//! Object-condensation training for point clouds.
//!
//! A point-cloud model predicts, for every detector hit, a confidence `β`,
//! coordinates in a learned clustering space, and properties of the object
//! the hit belongs to. This crate provides the losses that train it
//! (clustering potential, confidence, and property regression, combined
//! into one annealed scalar), the event data pipeline, and the epoch/batch
//! training controller with checkpointing and best-model selection.

pub mod inference;
pub mod loss;
pub mod model;
pub mod training;

pub use inference::{BatchPrediction, ClusterPredictor, InferenceError};
pub use loss::{LossCombiner, LossConfig, LossError};
pub use model::{NodeRegressor, NodeRegressorConfig, PointCloudModel};
pub use training::{train, TrainError, TrainingConfig};
