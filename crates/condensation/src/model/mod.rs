//! Point-cloud model contract, a reference node regressor, and the tensor
//! bridge between host buffers and burn tensors.

pub mod bridge;
pub mod regressor;

use burn::prelude::*;

pub use regressor::{NodeRegressor, NodeRegressorConfig};

/// A model mapping a batch of point clouds to per-node outputs.
///
/// `x` has shape `(n, input_dim)` and `batch_index` assigns each row to an
/// event. The output has shape `(n, 1 + k + m)`: a confidence logit, `k`
/// clustering coordinates, then `m` property predictions.
pub trait PointCloudModel<B: Backend> {
    fn forward(&self, x: Tensor<B, 2>, batch_index: Tensor<B, 1, Int>) -> Tensor<B, 2>;
}
