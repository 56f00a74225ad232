//! Total-loss combination.
//!
//! The model output has one row per point laid out as
//! `[β_logit, coord_0..coord_{k-1}, prop_0..prop_{m-1}]`. The combiner
//! splits it, runs the clustering loss and the property loss, and forms
//!
//! ```text
//! L_total = s_c·(L_V + L_beta) + L_p + loss_offset
//! ```
//!
//! Which terms take part in the training scalar is decided by an
//! [`AnnealingPolicy`], a pure function of the epoch index.

use burn::prelude::*;
use burn::tensor::activation::sigmoid;
use serde::{Deserialize, Serialize};

use super::components::{LossComponent, LossComponents};
use super::potential::{PotentialLoss, PotentialLossConfig};
use super::property::{property_loss, PropertyLayout, PropertyTerms};
use super::{ClusteringLoss, ClusteringTerms, LossError};
use crate::training::data::PointCloudBatch;

/// Epochs trained on `L_V` alone when no properties are regressed.
pub const DEFAULT_BETA_START_EPOCH: usize = 8;

/// Loss terms switched on for one evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveTerms {
    pub beta: bool,
}

impl ActiveTerms {
    pub const ALL: Self = Self { beta: true };
}

/// Epoch-dependent staging of the loss terms.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnnealingPolicy {
    /// Every term is active from the first epoch.
    Constant,
    /// `L_beta` is left out for epochs `0..start_epoch`.
    DelayBeta { start_epoch: usize },
}

impl AnnealingPolicy {
    /// Terms active at `epoch`. `None` means outside training, where
    /// everything is active.
    pub fn active_terms(&self, epoch: Option<usize>) -> ActiveTerms {
        match (self, epoch) {
            (Self::DelayBeta { start_epoch }, Some(epoch)) => ActiveTerms {
                beta: epoch >= *start_epoch,
            },
            _ => ActiveTerms::ALL,
        }
    }
}

/// Configuration for [`LossCombiner`].
#[derive(Config, Debug)]
pub struct LossConfig {
    /// Clustering-space dimensionality `k`.
    #[config(default = 3)]
    pub clustering_dim: usize,
    /// Regressed properties; `None` disables the property loss.
    #[config(default = "None")]
    pub properties: Option<PropertyLayout>,
    /// Weight `s_c` of the clustering and confidence terms.
    #[config(default = 1.0)]
    pub clustering_weight: f64,
    /// Constant added to the total so it stays positive.
    #[config(default = 1.0)]
    pub loss_offset: f64,
    /// Staging policy. Defaults to delaying `L_beta` by
    /// [`DEFAULT_BETA_START_EPOCH`] epochs when no properties are
    /// regressed, and to no staging otherwise.
    #[config(default = "None")]
    pub annealing: Option<AnnealingPolicy>,
    #[config(default = "PotentialLossConfig::new()")]
    pub potential: PotentialLossConfig,
}

impl LossConfig {
    /// Model output width `1 + k + m`.
    pub fn output_dim(&self) -> usize {
        1 + self.clustering_dim + self.properties.as_ref().map_or(0, PropertyLayout::dim)
    }

    pub fn annealing_policy(&self) -> AnnealingPolicy {
        match (&self.annealing, &self.properties) {
            (Some(policy), _) => policy.clone(),
            (None, None) => AnnealingPolicy::DelayBeta {
                start_epoch: DEFAULT_BETA_START_EPOCH,
            },
            (None, Some(_)) => AnnealingPolicy::Constant,
        }
    }

    /// Combiner with the reference potential loss.
    pub fn init(&self) -> Result<LossCombiner<PotentialLoss>, LossError> {
        LossCombiner::new(self, self.potential.init())
    }
}

/// Unreduced terms of one evaluation, each of shape `(1,)`.
#[derive(Clone, Debug)]
pub struct LossTerms<B: Backend> {
    pub clustering: ClusteringTerms<B>,
    pub properties: Option<PropertyTerms<B>>,
}

/// Splits model output and combines the clustering and property losses.
#[derive(Clone, Debug)]
pub struct LossCombiner<L> {
    clustering: L,
    clustering_dim: usize,
    properties: Option<PropertyLayout>,
    clustering_weight: f64,
    loss_offset: f64,
    annealing: AnnealingPolicy,
}

impl<L: ClusteringLoss> LossCombiner<L> {
    pub fn new(config: &LossConfig, clustering: L) -> Result<Self, LossError> {
        if config.clustering_dim == 0 {
            return Err(LossError::UnsupportedLayout(
                "clustering space needs at least one dimension".to_string(),
            ));
        }
        Ok(Self {
            clustering,
            clustering_dim: config.clustering_dim,
            properties: config.properties.clone(),
            clustering_weight: config.clustering_weight,
            loss_offset: config.loss_offset,
            annealing: config.annealing_policy(),
        })
    }

    pub fn output_dim(&self) -> usize {
        1 + self.clustering_dim + self.properties.as_ref().map_or(0, PropertyLayout::dim)
    }

    pub fn clustering_dim(&self) -> usize {
        self.clustering_dim
    }

    pub fn properties(&self) -> Option<&PropertyLayout> {
        self.properties.as_ref()
    }

    pub fn annealing(&self) -> &AnnealingPolicy {
        &self.annealing
    }

    /// Evaluate every term on `output` of shape `(n, output_dim)`.
    pub fn terms<B: Backend>(
        &self,
        output: Tensor<B, 2>,
        batch: &PointCloudBatch<B>,
    ) -> Result<LossTerms<B>, LossError> {
        let [n, width] = output.dims();
        if width != self.output_dim() {
            return Err(LossError::ShapeMismatch {
                what: "model output",
                expected: vec![n, self.output_dim()],
                got: vec![n, width],
            });
        }
        for (what, dims) in [("truth cluster index", batch.y.dims()), ("batch index", batch.batch.dims())] {
            if dims != [n] {
                return Err(LossError::ShapeMismatch {
                    what,
                    expected: vec![n],
                    got: dims.to_vec(),
                });
            }
        }

        let device = output.device();
        if batch.y.device() != device {
            return Err(LossError::DeviceMismatch("truth cluster index"));
        }
        if batch.batch.device() != device {
            return Err(LossError::DeviceMismatch("batch index"));
        }
        if let Some(props) = &batch.truth_cluster_props {
            if props.device() != device {
                return Err(LossError::DeviceMismatch("truth cluster properties"));
            }
        }

        let k = self.clustering_dim;
        let beta = sigmoid(output.clone().slice([0..n, 0..1]).reshape([n]));
        let coords = output.clone().slice([0..n, 1..1 + k]);

        let properties = match &self.properties {
            Some(layout) => {
                let truth = batch
                    .truth_cluster_props
                    .clone()
                    .ok_or(LossError::MissingTruthProperties)?;
                let pred = output.slice([0..n, 1 + k..width]);
                Some(property_loss(
                    beta.clone(),
                    batch.y.clone(),
                    pred,
                    truth,
                    batch.num_events,
                    layout,
                )?)
            }
            None => None,
        };

        let clustering = self
            .clustering
            .forward(beta, coords, batch.y.clone(), batch.batch.clone())?;

        Ok(LossTerms {
            clustering,
            properties,
        })
    }

    /// `s_c·(L_V + [L_beta]) + L_p + offset` over the active terms.
    pub fn combine<B: Backend>(&self, terms: &LossTerms<B>, active: ActiveTerms) -> Tensor<B, 1> {
        let mut clustering = terms.clustering.lv.clone();
        if active.beta {
            clustering = clustering + terms.clustering.lbeta.clone();
        }
        let mut total = clustering * self.clustering_weight;
        if let Some(props) = &terms.properties {
            total = total + props.total.clone();
        }
        total.add_scalar(self.loss_offset)
    }

    /// Training scalar at `epoch`, with annealing applied.
    pub fn loss<B: Backend>(
        &self,
        output: Tensor<B, 2>,
        batch: &PointCloudBatch<B>,
        epoch: Option<usize>,
    ) -> Result<Tensor<B, 1>, LossError> {
        let terms = self.terms(output, batch)?;
        Ok(self.combine(&terms, self.annealing.active_terms(epoch)))
    }

    /// Named breakdown with every term active and `L_total` appended.
    pub fn components<B: Backend>(
        &self,
        output: Tensor<B, 2>,
        batch: &PointCloudBatch<B>,
    ) -> Result<LossComponents, LossError> {
        let terms = self.terms(output, batch)?;
        let total = self.combine(&terms, ActiveTerms::ALL);

        let mut components = LossComponents::new();
        for (component, value) in &terms.clustering.breakdown {
            components.set(*component, scalar(value.clone())?);
        }
        components.set(LossComponent::LV, scalar(terms.clustering.lv.clone())?);
        components.set(LossComponent::LBeta, scalar(terms.clustering.lbeta.clone())?);
        if let Some(props) = &terms.properties {
            components.set(LossComponent::LpEnergy, scalar(props.energy.clone())?);
            components.set(LossComponent::LpPosition, scalar(props.position.clone())?);
            if let Some(time) = &props.time {
                components.set(LossComponent::LpTime, scalar(time.clone())?);
            }
            components.set(LossComponent::Lp, scalar(props.total.clone())?);
        }
        components.set(LossComponent::LTotal, scalar(total)?);
        Ok(components)
    }
}

/// Read a `(1,)` loss tensor back to the host.
pub fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> Result<f64, LossError> {
    let values = tensor
        .into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|e| LossError::TensorData(format!("{e:?}")))?;
    values
        .first()
        .copied()
        .ok_or_else(|| LossError::TensorData("empty loss tensor".to_string()))
}
