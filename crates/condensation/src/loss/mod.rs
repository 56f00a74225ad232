//! Loss functions for object-condensation training.
//!
//! - [`stabilizer`]: `softclip` and `huber`, shared by the regression losses
//! - [`property`]: confidence-weighted property regression (`L_p`)
//! - [`potential`]: clustering potential and confidence loss (`L_V`, `L_beta`)
//! - [`combiner`]: output splitting, annealing, and the total objective
//! - [`components`]: the named breakdown used for logging and validation

pub mod combiner;
pub mod components;
pub mod potential;
pub mod property;
pub mod stabilizer;

use burn::prelude::*;

pub use combiner::{ActiveTerms, AnnealingPolicy, LossCombiner, LossConfig, LossTerms};
pub use components::{LossAccumulator, LossComponent, LossComponents};
pub use potential::{PotentialLoss, PotentialLossConfig};
pub use property::{property_loss, PropertyLayout, PropertyTerms};
pub use stabilizer::{huber, softclip};

/// Errors raised while evaluating a loss.
#[derive(Debug, thiserror::Error)]
pub enum LossError {
    /// A tensor does not have the shape the configured layout requires.
    #[error("shape mismatch for {what}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Inputs live on different devices.
    #[error("device mismatch: {0} is not on the model output device")]
    DeviceMismatch(&'static str),

    /// Properties are configured but the batch carries no truth properties.
    #[error("batch has no truth cluster properties but the loss regresses properties")]
    MissingTruthProperties,

    /// The loss configuration cannot describe a valid output layout.
    #[error("unsupported layout: {0}")]
    UnsupportedLayout(String),

    /// A requested loss path exists in the layout but has no implementation.
    #[error("not implemented: {0}")]
    Unimplemented(&'static str),

    /// The total loss evaluated to NaN or infinity.
    #[error("non-finite loss: {0}")]
    NonFinite(f64),

    /// A loss value could not be read back from the device.
    #[error("failed to read tensor data: {0}")]
    TensorData(String),
}

/// Clustering terms returned by a [`ClusteringLoss`], each of shape `(1,)`.
#[derive(Clone, Debug)]
pub struct ClusteringTerms<B: Backend> {
    /// Potential loss `L_V`.
    pub lv: Tensor<B, 1>,
    /// Confidence loss `L_beta`.
    pub lbeta: Tensor<B, 1>,
    /// Optional finer-grained sub-terms for reporting.
    pub breakdown: Vec<(LossComponent, Tensor<B, 1>)>,
}

/// Differentiable clustering/confidence loss over a batch of point clouds.
///
/// Inputs are per point: confidence `β` in `(0, 1)`, clustering-space
/// coordinates `(n, k)`, truth cluster index (0 = noise), and the event
/// index each point belongs to.
pub trait ClusteringLoss {
    fn forward<B: Backend>(
        &self,
        beta: Tensor<B, 1>,
        coords: Tensor<B, 2>,
        truth_cluster_index: Tensor<B, 1, Int>,
        batch_index: Tensor<B, 1, Int>,
    ) -> Result<ClusteringTerms<B>, LossError>;
}
