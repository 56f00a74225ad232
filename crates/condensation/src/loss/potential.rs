//! Object-condensation potential loss (`L_V`, `L_beta`).
//!
//! For every truth object the point with the highest confidence is its
//! condensation point `α`. Points are charged by `q = arctanh(β)² + q_min`.
//! Members of an object are pulled toward `α` by a quadratic potential,
//! everything else is pushed away by a unit-radius hinge. The confidence
//! loss rewards confident condensation points and penalizes confident noise.

use std::collections::BTreeMap;

use burn::prelude::*;
use burn::tensor::TensorData;

use crate::model::bridge::{count_events, int_tensor_to_vec, rows_by_event, tensor_to_vec};

use super::property::BETA_EPSILON;
use super::{ClusteringLoss, ClusteringTerms, LossComponent, LossError};

/// Configuration for [`PotentialLoss`].
#[derive(Config, Debug)]
pub struct PotentialLossConfig {
    /// Minimum charge of every point.
    #[config(default = 0.1)]
    pub q_min: f64,
    /// Weight of the noise confidence term.
    #[config(default = 1.0)]
    pub s_b: f64,
}

impl PotentialLossConfig {
    pub fn init(&self) -> PotentialLoss {
        PotentialLoss {
            q_min: self.q_min,
            s_b: self.s_b,
        }
    }
}

/// Reference clustering/confidence loss.
#[derive(Clone, Debug)]
pub struct PotentialLoss {
    q_min: f64,
    s_b: f64,
}

impl Default for PotentialLoss {
    fn default() -> Self {
        PotentialLossConfig::new().init()
    }
}

/// Per-event sub-terms, each of shape `(1,)`.
struct EventTerms<B: Backend> {
    v_att: Tensor<B, 1>,
    v_rep: Tensor<B, 1>,
    beta_sig: Tensor<B, 1>,
    beta_noise: Tensor<B, 1>,
}

impl PotentialLoss {
    fn event_terms<B: Backend>(
        &self,
        beta: &Tensor<B, 1>,
        coords: &Tensor<B, 2>,
        beta_host: &[f32],
        truth_host: &[i64],
        rows: &[usize],
    ) -> EventTerms<B> {
        let device = beta.device();
        let n = rows.len();
        let zero = || Tensor::<B, 1>::zeros([1], &device);
        let index = |local: &[usize]| {
            let idx: Vec<i64> = local.iter().map(|&i| i as i64).collect();
            Tensor::<B, 1, Int>::from_data(TensorData::new(idx, [local.len()]), &device)
        };

        let beta_e = beta.clone().select(0, index(rows));
        let x_e = coords.clone().select(0, index(rows));

        // Local positions of each object's members, and of noise points
        let mut objects: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        let mut noise = Vec::new();
        for (local, &row) in rows.iter().enumerate() {
            match truth_host[row] {
                t if t > 0 => objects.entry(t).or_default().push(local),
                _ => noise.push(local),
            }
        }

        let beta_noise = if noise.is_empty() {
            zero()
        } else {
            beta_e.clone().select(0, index(&noise)).mean() * self.s_b
        };

        if objects.is_empty() {
            return EventTerms {
                v_att: zero(),
                v_rep: zero(),
                beta_sig: zero(),
                beta_noise,
            };
        }

        let k = objects.len();
        let mut alphas = Vec::with_capacity(k);
        let mut membership = vec![0.0_f32; n * k];
        for (col, members) in objects.values().enumerate() {
            let alpha = members
                .iter()
                .copied()
                .max_by(|&a, &b| beta_host[rows[a]].total_cmp(&beta_host[rows[b]]))
                .unwrap_or(members[0]);
            alphas.push(alpha);
            for &local in members {
                membership[local * k + col] = 1.0;
            }
        }
        let membership = Tensor::<B, 2>::from_data(TensorData::new(membership, [n, k]), &device);

        let clamped = beta_e.clone().clamp_max(1.0 - BETA_EPSILON);
        let atanh = ((clamped.clone().add_scalar(1.0)) / (clamped.neg().add_scalar(1.0))).log() * 0.5;
        let q = atanh.powf_scalar(2.0).add_scalar(self.q_min);

        let alpha_idx = index(&alphas);
        let q_alpha = q.clone().select(0, alpha_idx.clone());
        let x_alpha = x_e.clone().select(0, alpha_idx.clone());
        let beta_alpha = beta_e.select(0, alpha_idx);

        let d = x_e.dims()[1];
        let diff = x_e.reshape([n, 1, d]) - x_alpha.reshape([1, k, d]);
        let dist_sq = diff.powf_scalar(2.0).sum_dim(2).reshape([n, k]);
        let charge = q.reshape([n, 1]) * q_alpha.reshape([1, k]);

        let v_att = (charge.clone() * membership.clone() * dist_sq.clone()).sum() / n as f64;
        let hinge = dist_sq.add_scalar(1e-9).sqrt().neg().add_scalar(1.0).clamp_min(0.0);
        let v_rep = (charge * membership.neg().add_scalar(1.0) * hinge).sum() / n as f64;
        let beta_sig = beta_alpha.neg().add_scalar(1.0).mean();

        EventTerms {
            v_att,
            v_rep,
            beta_sig,
            beta_noise,
        }
    }
}

impl ClusteringLoss for PotentialLoss {
    fn forward<B: Backend>(
        &self,
        beta: Tensor<B, 1>,
        coords: Tensor<B, 2>,
        truth_cluster_index: Tensor<B, 1, Int>,
        batch_index: Tensor<B, 1, Int>,
    ) -> Result<ClusteringTerms<B>, LossError> {
        let device = beta.device();
        let [n] = beta.dims();
        if coords.dims()[0] != n {
            return Err(LossError::ShapeMismatch {
                what: "clustering coordinates",
                expected: vec![n, coords.dims()[1]],
                got: coords.dims().to_vec(),
            });
        }

        let beta_host = tensor_to_vec(beta.clone());
        let truth_host = int_tensor_to_vec(truth_cluster_index);
        let batch_host = int_tensor_to_vec(batch_index);
        if truth_host.len() != n || batch_host.len() != n || beta_host.len() != n {
            return Err(LossError::ShapeMismatch {
                what: "truth / batch index",
                expected: vec![n, n],
                got: vec![truth_host.len(), batch_host.len()],
            });
        }

        let groups = rows_by_event(&batch_host, count_events(&batch_host));
        let mut totals = EventTerms {
            v_att: Tensor::zeros([1], &device),
            v_rep: Tensor::zeros([1], &device),
            beta_sig: Tensor::zeros([1], &device),
            beta_noise: Tensor::zeros([1], &device),
        };
        let mut num_events = 0usize;
        for rows in groups.iter().filter(|rows| !rows.is_empty()) {
            let t = self.event_terms(&beta, &coords, &beta_host, &truth_host, rows);
            totals.v_att = totals.v_att + t.v_att;
            totals.v_rep = totals.v_rep + t.v_rep;
            totals.beta_sig = totals.beta_sig + t.beta_sig;
            totals.beta_noise = totals.beta_noise + t.beta_noise;
            num_events += 1;
        }

        let scale = 1.0 / num_events.max(1) as f64;
        let v_att = totals.v_att * scale;
        let v_rep = totals.v_rep * scale;
        let beta_sig = totals.beta_sig * scale;
        let beta_noise = totals.beta_noise * scale;

        Ok(ClusteringTerms {
            lv: v_att.clone() + v_rep.clone(),
            lbeta: beta_sig.clone() + beta_noise.clone(),
            breakdown: vec![
                (LossComponent::VAttractive, v_att),
                (LossComponent::VRepulsive, v_rep),
                (LossComponent::LBetaSignal, beta_sig),
                (LossComponent::LBetaNoise, beta_noise),
            ],
        })
    }
}
