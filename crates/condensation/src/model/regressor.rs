use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::silu;
use burn::tensor::TensorData;

use super::bridge::{count_events, int_tensor_to_vec};
use super::PointCloudModel;

/// Configuration for the [`NodeRegressor`].
///
/// ```text
/// (n, input_dim)
///   → Linear(input_dim→hidden) → SiLU                       = h
///   → concat(h, mean of h over the node's event)            (n, 2·hidden)
///   → Linear(2·hidden→hidden) → SiLU → Dropout
///   → Linear(hidden→output_dim)
///   → (n, output_dim)
/// ```
#[derive(Config, Debug)]
pub struct NodeRegressorConfig {
    /// Per-node feature width.
    pub input_dim: usize,
    /// `1 + k + m`, see [`crate::loss::LossConfig::output_dim`].
    pub output_dim: usize,
    #[config(default = 64)]
    pub hidden_dim: usize,
    /// Dropout probability after the hidden activation.
    #[config(default = 0.1)]
    pub dropout: f64,
}

/// Per-node MLP with mean-pooled event context.
#[derive(Module, Debug)]
pub struct NodeRegressor<B: Backend> {
    embed: Linear<B>,
    hidden: Linear<B>,
    output: Linear<B>,
    dropout: Dropout,
}

impl NodeRegressorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> NodeRegressor<B> {
        NodeRegressor {
            embed: LinearConfig::new(self.input_dim, self.hidden_dim).init(device),
            hidden: LinearConfig::new(2 * self.hidden_dim, self.hidden_dim).init(device),
            output: LinearConfig::new(self.hidden_dim, self.output_dim).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// `(num_events, n)` matrix averaging rows of the same event.
fn event_mean_matrix<B: Backend>(batch_host: &[i64], device: &B::Device) -> Tensor<B, 2> {
    let n = batch_host.len();
    let num_events = count_events(batch_host).max(1);
    let mut counts = vec![0usize; num_events];
    for &e in batch_host {
        counts[e.max(0) as usize] += 1;
    }
    let mut weights = vec![0.0_f32; num_events * n];
    for (row, &e) in batch_host.iter().enumerate() {
        let e = e.max(0) as usize;
        weights[e * n + row] = 1.0 / counts[e] as f32;
    }
    Tensor::from_data(TensorData::new(weights, [num_events, n]), device)
}

impl<B: Backend> NodeRegressor<B> {
    /// Input `(n, input_dim)` plus event index `(n,)`, output `(n, output_dim)`.
    pub fn forward(&self, x: Tensor<B, 2>, batch_index: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        let device = x.device();
        let batch_host = int_tensor_to_vec(batch_index.clone());

        let h = silu(self.embed.forward(x));
        let context = event_mean_matrix::<B>(&batch_host, &device)
            .matmul(h.clone())
            .select(0, batch_index);

        let h = Tensor::cat(vec![h, context], 1);
        let h = self.dropout.forward(silu(self.hidden.forward(h)));
        self.output.forward(h)
    }
}

impl<B: Backend> PointCloudModel<B> for NodeRegressor<B> {
    fn forward(&self, x: Tensor<B, 2>, batch_index: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        NodeRegressor::forward(self, x, batch_index)
    }
}
