//! Per-node predictions from a trained model.
//!
//! [`ClusterPredictor`] runs a [`PointCloudModel`] on a non-autodiff
//! backend (evaluation mode) and splits its output into confidence,
//! clustering coordinates, and property predictions.

use std::path::Path;

use burn::prelude::*;
use burn::tensor::activation::sigmoid;

use crate::loss::LossConfig;
use crate::model::bridge::tensor_to_vec;
use crate::model::{NodeRegressor, NodeRegressorConfig, PointCloudModel};
use crate::training::checkpoint::{load_checkpoint, CheckpointError};
use crate::training::data::EventBatch;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("model output has {got} columns, expected {expected}")]
    Layout { expected: usize, got: usize },
}

/// Host-side predictions for one batch, row-major per node.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchPrediction {
    /// Confidence in `(0, 1)`, one per node.
    pub beta: Vec<f32>,
    /// `(n, clustering_dim)`.
    pub coords: Vec<f32>,
    /// `(n, prop_dim)`, empty when no properties are regressed.
    pub props: Vec<f32>,
    pub clustering_dim: usize,
    pub prop_dim: usize,
    /// Event index per node.
    pub batch: Vec<i64>,
}

impl BatchPrediction {
    pub fn num_nodes(&self) -> usize {
        self.beta.len()
    }

    pub fn coords_of(&self, node: usize) -> &[f32] {
        &self.coords[node * self.clustering_dim..(node + 1) * self.clustering_dim]
    }

    pub fn props_of(&self, node: usize) -> &[f32] {
        &self.props[node * self.prop_dim..(node + 1) * self.prop_dim]
    }

    /// Nodes of `event` with confidence above `threshold`, most confident first.
    pub fn confident_nodes(&self, event: i64, threshold: f32) -> Vec<usize> {
        let mut nodes: Vec<usize> = (0..self.num_nodes())
            .filter(|&i| self.batch[i] == event && self.beta[i] > threshold)
            .collect();
        nodes.sort_by(|&a, &b| self.beta[b].total_cmp(&self.beta[a]));
        nodes
    }
}

/// Evaluation-mode wrapper around a point-cloud model.
pub struct ClusterPredictor<B: Backend, M> {
    model: M,
    clustering_dim: usize,
    prop_dim: usize,
    device: B::Device,
}

impl<B: Backend, M: PointCloudModel<B>> ClusterPredictor<B, M> {
    /// Wrap `model`, whose output layout is described by `loss`.
    pub fn new(model: M, loss: &LossConfig, device: B::Device) -> Self {
        Self {
            model,
            clustering_dim: loss.clustering_dim,
            prop_dim: loss.properties.as_ref().map_or(0, |p| p.dim()),
            device,
        }
    }

    pub fn output_dim(&self) -> usize {
        1 + self.clustering_dim + self.prop_dim
    }

    /// Run the model on `batch`.
    pub fn predict(&self, batch: &EventBatch) -> Result<BatchPrediction, InferenceError> {
        let tensors = batch.to_device::<B>(&self.device);
        let output = self.model.forward(tensors.x, tensors.batch);
        let [n, width] = output.dims();
        if width != self.output_dim() {
            return Err(InferenceError::Layout {
                expected: self.output_dim(),
                got: width,
            });
        }

        let k = self.clustering_dim;
        let beta = sigmoid(output.clone().slice([0..n, 0..1]).reshape([n]));
        let coords = output.clone().slice([0..n, 1..1 + k]);
        let props = if self.prop_dim > 0 {
            tensor_to_vec(output.slice([0..n, 1 + k..width]))
        } else {
            Vec::new()
        };

        Ok(BatchPrediction {
            beta: tensor_to_vec(beta),
            coords: tensor_to_vec(coords),
            props,
            clustering_dim: k,
            prop_dim: self.prop_dim,
            batch: batch.batch.clone(),
        })
    }
}

impl<B: Backend> ClusterPredictor<B, NodeRegressor<B>> {
    /// Load a [`NodeRegressor`] checkpoint.
    pub fn load(
        path: &Path,
        model: &NodeRegressorConfig,
        loss: &LossConfig,
        device: B::Device,
    ) -> Result<Self, InferenceError> {
        let regressor = load_checkpoint::<B>(path, model, &device)?;
        tracing::info!(path = %path.display(), "Loaded model checkpoint");
        Ok(Self::new(regressor, loss, device))
    }
}
