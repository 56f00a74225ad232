//! Per-cluster property regression loss (`L_p`).
//!
//! Each signal point (truth cluster index > 0) regresses the properties of
//! the object it belongs to. Point losses are weighted by `xi = arctanh(β)`,
//! so points the model is confident about pull harder, and reduced to a
//! confidence-weighted mean normalized per event.
//!
//! Column layout of the property matrices: `0` energy, `1..3` boundary
//! crossing position, then `time` and `class` when enabled in
//! [`PropertyLayout`].

use burn::prelude::*;

use super::stabilizer::{huber, softclip};
use super::LossError;

/// Confidence is clamped to at most `1 - BETA_EPSILON` before `arctanh`.
pub const BETA_EPSILON: f64 = 1e-6;
/// Floor for the weight sum, only reached by all-background batches.
const XI_SUM_FLOOR: f64 = 1e-12;

/// Which property columns the model regresses.
#[derive(Config, Debug, PartialEq)]
pub struct PropertyLayout {
    /// Regress a hit time column after the position.
    #[config(default = false)]
    pub time: bool,
    /// Regress a particle class column. Not implemented.
    #[config(default = false)]
    pub classification: bool,
}

impl PropertyLayout {
    /// Number of property columns: energy + 2D position, plus extras.
    pub fn dim(&self) -> usize {
        3 + usize::from(self.time) + usize::from(self.classification)
    }
}

/// Property loss terms for one batch, each of shape `(1,)`.
#[derive(Clone, Debug)]
pub struct PropertyTerms<B: Backend> {
    pub energy: Tensor<B, 1>,
    pub position: Tensor<B, 1>,
    pub time: Option<Tensor<B, 1>>,
    /// Sum of all enabled terms.
    pub total: Tensor<B, 1>,
}

/// Energy loss per point.
///
/// `softclip(10·exp(−0.1·Δ²) + 0.01·|Δ|, 10)`.
pub fn energy_loss<B: Backend>(pred: Tensor<B, 1>, truth: Tensor<B, 1>) -> Tensor<B, 1> {
    let diff = (pred - truth).abs();
    let bump = diff.clone().powf_scalar(2.0).mul_scalar(-0.1).exp().mul_scalar(10.0);
    softclip(bump + diff.mul_scalar(0.01), 10.0)
}

/// Position loss per point for `(n, 2)` coordinates.
///
/// `softclip(huber(sqrt(Σ Δ²/100 + 0.01), 10), 3)`.
pub fn position_loss<B: Backend>(pred: Tensor<B, 2>, truth: Tensor<B, 2>) -> Tensor<B, 1> {
    let [n, _] = pred.dims();
    let d_squared = (pred - truth).powf_scalar(2.0).sum_dim(1).reshape([n]);
    let distance = (d_squared / 100.0).add_scalar(1e-2).sqrt();
    softclip(huber(distance, 10.0), 3.0)
}

/// Time loss per point: `softclip(huber(|Δt|, 2), 6)`.
pub fn time_loss<B: Backend>(pred: Tensor<B, 1>, truth: Tensor<B, 1>) -> Tensor<B, 1> {
    softclip(huber((pred - truth).abs(), 2.0), 6.0)
}

/// Per-point weights: `arctanh(β)` on signal points, 0 elsewhere.
pub fn signal_weights<B: Backend>(beta: Tensor<B, 1>, is_signal: Tensor<B, 1, Bool>) -> Tensor<B, 1> {
    let beta = beta.clamp_max(1.0 - BETA_EPSILON);
    // arctanh(b) = ln((1 + b) / (1 - b)) / 2
    let atanh = ((beta.clone().add_scalar(1.0)) / (beta.neg().add_scalar(1.0))).log() * 0.5;
    atanh * is_signal.float()
}

/// Confidence-weighted property loss.
///
/// # Arguments
/// - `pred_beta`: shape `(n,)`, confidence in `(0, 1)`
/// - `truth_cluster_index`: shape `(n,)`, 0 for noise
/// - `pred_props`, `truth_props`: shape `(n, layout.dim())`; truth rows of
///   noise points are ignored and may hold anything, including NaN
/// - `num_events`: events in the batch, used for per-event normalization
///
/// Each term is `(Σ xi·L) / (Σ xi) / num_events`. A batch without signal
/// points yields zero for every term.
pub fn property_loss<B: Backend>(
    pred_beta: Tensor<B, 1>,
    truth_cluster_index: Tensor<B, 1, Int>,
    pred_props: Tensor<B, 2>,
    truth_props: Tensor<B, 2>,
    num_events: usize,
    layout: &PropertyLayout,
) -> Result<PropertyTerms<B>, LossError> {
    if layout.classification {
        return Err(LossError::Unimplemented("classification property loss"));
    }
    let [n, m] = pred_props.dims();
    if m != layout.dim() {
        return Err(LossError::ShapeMismatch {
            what: "predicted properties",
            expected: vec![n, layout.dim()],
            got: vec![n, m],
        });
    }
    if truth_props.dims() != [n, m] {
        return Err(LossError::ShapeMismatch {
            what: "truth properties",
            expected: vec![n, m],
            got: truth_props.dims().to_vec(),
        });
    }

    let device = pred_props.device();
    let is_signal = truth_cluster_index.greater_elem(0);
    let xi = signal_weights(pred_beta, is_signal.clone());

    // Noise rows carry no truth; zero them so they stay finite under xi = 0.
    let noise_rows = (Tensor::<B, 2>::zeros([n, m], &device)
        + is_signal.float().unsqueeze_dim::<2>(1))
    .lower_elem(0.5);
    let truth_props = truth_props.mask_fill(noise_rows, 0.0);

    let xi_sum = xi.clone().sum();
    let has_signal = xi_sum.clone().greater_elem(0.0).float();
    let norm = xi_sum.clamp_min(XI_SUM_FLOOR) * num_events.max(1) as f64;
    let weighted = |loss: Tensor<B, 1>| {
        (xi.clone() * loss).sum() / norm.clone() * has_signal.clone()
    };

    let column = |t: &Tensor<B, 2>, c: usize| t.clone().slice([0..n, c..c + 1]).reshape([n]);

    let energy = weighted(energy_loss(column(&pred_props, 0), column(&truth_props, 0)));
    let position = weighted(position_loss(
        pred_props.clone().slice([0..n, 1..3]),
        truth_props.clone().slice([0..n, 1..3]),
    ));
    let time = layout
        .time
        .then(|| weighted(time_loss(column(&pred_props, 3), column(&truth_props, 3))));

    let mut total = energy.clone() + position.clone();
    if let Some(t) = &time {
        total = total + t.clone();
    }

    Ok(PropertyTerms {
        energy,
        position,
        time,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn scalar<B: Backend>(t: Tensor<B, 1>) -> f32 {
        t.into_scalar().elem()
    }

    #[test]
    fn test_energy_loss_shape() {
        let device = Default::default();
        let pred = Tensor::<TestBackend, 1>::from_data(TensorData::from([0.0_f32, 1.0, 50.0]), &device);
        let truth = Tensor::<TestBackend, 1>::from_data(TensorData::from([0.0_f32, 0.0, 0.0]), &device);
        let l: Vec<f32> = energy_loss(pred, truth).into_data().to_vec().unwrap();

        // Zero error sits at the top of the exp bump
        assert!((l[0] - 10.0).abs() < 1e-4, "got {}", l[0]);
        assert!(l[1] < l[0]);
        // Far from zero only the linear term survives: 0.01 * 50
        assert!((l[2] - 0.5).abs() < 1e-3, "got {}", l[2]);
    }

    #[test]
    fn test_position_loss_floor() {
        let device = Default::default();
        let p = Tensor::<TestBackend, 2>::from_data(TensorData::from([[1.0_f32, 2.0]]), &device);
        let l: Vec<f32> = position_loss(p.clone(), p).into_data().to_vec().unwrap();
        // sqrt(0.01)^2 = 0.01
        assert!((l[0] - 0.01).abs() < 1e-6, "got {}", l[0]);
    }

    #[test]
    fn test_all_background_is_zero() {
        let device = Default::default();
        let beta = Tensor::<TestBackend, 1>::from_data(TensorData::from([0.5_f32, 0.9, 0.1]), &device);
        let truth = Tensor::<TestBackend, 1, Int>::from_data(TensorData::from([0_i64, 0, 0]), &device);
        let pred = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[1.0_f32, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]),
            &device,
        );
        let truth_props = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[f32::NAN, f32::NAN, f32::NAN]; 3]),
            &device,
        );

        let xi = signal_weights(beta.clone(), truth.clone().greater_elem(0));
        assert_eq!(scalar(xi.sum()), 0.0);

        let terms = property_loss(beta, truth, pred, truth_props, 2, &PropertyLayout::new()).unwrap();
        assert_eq!(scalar(terms.energy), 0.0);
        assert_eq!(scalar(terms.position), 0.0);
        assert_eq!(scalar(terms.total), 0.0);
    }

    #[test]
    fn test_noise_truth_ignored() {
        let device = Default::default();
        let beta = Tensor::<TestBackend, 1>::from_data(TensorData::from([0.5_f32, 0.5]), &device);
        let truth = Tensor::<TestBackend, 1, Int>::from_data(TensorData::from([1_i64, 0]), &device);
        let pred = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[2.0_f32, 0.0, 0.0], [0.0, 0.0, 0.0]]),
            &device,
        );
        let with_nan = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[1.0_f32, 0.0, 0.0], [f32::NAN, f32::NAN, f32::NAN]]),
            &device,
        );
        let with_junk = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[1.0_f32, 0.0, 0.0], [1e6, -1e6, 3.0]]),
            &device,
        );
        let layout = PropertyLayout::new();

        let a = scalar(property_loss(beta.clone(), truth.clone(), pred.clone(), with_nan, 1, &layout).unwrap().total);
        let b = scalar(property_loss(beta, truth, pred, with_junk, 1, &layout).unwrap().total);
        assert!(a.is_finite());
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_mean_normalized_per_event() {
        let device = Default::default();
        let beta = Tensor::<TestBackend, 1>::from_data(TensorData::from([0.5_f32, 0.8]), &device);
        let truth = Tensor::<TestBackend, 1, Int>::from_data(TensorData::from([1_i64, 2]), &device);
        let pred = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[3.0_f32, 1.0, 1.0], [0.0, 0.0, 0.0]]),
            &device,
        );
        let truth_props = Tensor::<TestBackend, 2>::zeros([2, 3], &device);
        let layout = PropertyLayout::new();

        let one = scalar(
            property_loss(beta.clone(), truth.clone(), pred.clone(), truth_props.clone(), 1, &layout)
                .unwrap()
                .energy,
        );
        let four = scalar(property_loss(beta, truth, pred, truth_props, 4, &layout).unwrap().energy);
        assert!((one / four - 4.0).abs() < 1e-4);

        // Manual weighted mean: xi = atanh(beta)
        let xi = [0.5_f32.atanh(), 0.8_f32.atanh()];
        let l = [10.0 * (-0.9_f32).exp() + 0.03, 10.0];
        let expected = (xi[0] * l[0] + xi[1] * l[1]) / (xi[0] + xi[1]);
        assert!((one - expected).abs() < 1e-3, "expected {expected}, got {one}");
    }

    #[test]
    fn test_time_column() {
        let device = Default::default();
        let beta = Tensor::<TestBackend, 1>::from_data(TensorData::from([0.5_f32]), &device);
        let truth = Tensor::<TestBackend, 1, Int>::from_data(TensorData::from([1_i64]), &device);
        let pred = Tensor::<TestBackend, 2>::from_data(TensorData::from([[0.0_f32, 0.0, 0.0, 1.0]]), &device);
        let truth_props = Tensor::<TestBackend, 2>::zeros([1, 4], &device);
        let layout = PropertyLayout::new().with_time(true);

        let terms = property_loss(beta, truth, pred, truth_props, 1, &layout).unwrap();
        let time = scalar(terms.time.unwrap());
        assert!((time - 1.0).abs() < 1e-5, "huber(1, 2) = 1, got {time}");
        let total = scalar(terms.total);
        let parts = scalar(terms.energy) + scalar(terms.position) + time;
        assert!((total - parts).abs() < 1e-5);
    }

    #[test]
    fn test_classification_unimplemented() {
        let device = Default::default();
        let beta = Tensor::<TestBackend, 1>::from_data(TensorData::from([0.5_f32]), &device);
        let truth = Tensor::<TestBackend, 1, Int>::from_data(TensorData::from([1_i64]), &device);
        let props = Tensor::<TestBackend, 2>::zeros([1, 4], &device);
        let layout = PropertyLayout::new().with_classification(true);

        let err = property_loss(beta, truth, props.clone(), props, 1, &layout).unwrap_err();
        assert!(matches!(err, LossError::Unimplemented(_)));
    }

    #[test]
    fn test_wrong_property_count() {
        let device = Default::default();
        let beta = Tensor::<TestBackend, 1>::from_data(TensorData::from([0.5_f32]), &device);
        let truth = Tensor::<TestBackend, 1, Int>::from_data(TensorData::from([1_i64]), &device);
        let props = Tensor::<TestBackend, 2>::zeros([1, 5], &device);

        let err = property_loss(beta, truth, props.clone(), props, 1, &PropertyLayout::new()).unwrap_err();
        assert!(matches!(err, LossError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_saturated_confidence_stays_finite() {
        let device = Default::default();
        let beta = Tensor::<TestBackend, 1>::from_data(TensorData::from([1.0_f32, 1.0]), &device);
        let truth = Tensor::<TestBackend, 1, Int>::from_data(TensorData::from([1_i64, 0]), &device);
        let props = Tensor::<TestBackend, 2>::ones([2, 3], &device);

        let total = scalar(property_loss(beta, truth, props.clone(), props.zeros_like(), 1, &PropertyLayout::new()).unwrap().total);
        assert!(total.is_finite());
    }

    #[test]
    fn test_gradient_only_at_signal_points() {
        let device = Default::default();
        let beta = Tensor::<TestAutodiffBackend, 1>::from_data(TensorData::from([0.5_f32, 0.5, 0.5]), &device);
        let truth = Tensor::<TestAutodiffBackend, 1, Int>::from_data(TensorData::from([0_i64, 3, 0]), &device);
        let pred = Tensor::<TestAutodiffBackend, 2>::from_data(
            TensorData::from([[1.0_f32, 1.0, 1.0], [2.0, 3.0, -4.0], [5.0, 5.0, 5.0]]),
            &device,
        )
        .require_grad();
        let truth_props = Tensor::<TestAutodiffBackend, 2>::from_data(
            TensorData::from([[0.0_f32, 0.0, 0.0], [0.5, 0.0, 0.0], [0.0, 0.0, 0.0]]),
            &device,
        );

        let terms = property_loss(beta, truth, pred.clone(), truth_props, 1, &PropertyLayout::new()).unwrap();
        let grads = terms.total.backward();
        let g: Vec<f32> = pred.grad(&grads).unwrap().into_data().to_vec().unwrap();

        for (i, v) in g.iter().enumerate() {
            let row = i / 3;
            if row == 1 {
                assert!(v.abs() > 0.0, "signal gradient [{i}] should be non-zero");
            } else {
                assert_eq!(*v, 0.0, "noise gradient [{i}] should be zero");
            }
        }
    }

    #[test]
    fn test_all_background_has_zero_gradient() {
        let device = Default::default();
        let beta = Tensor::<TestAutodiffBackend, 1>::from_data(TensorData::from([0.5_f32, 0.9, 0.1]), &device)
            .require_grad();
        let truth = Tensor::<TestAutodiffBackend, 1, Int>::from_data(TensorData::from([0_i64, 0, 0]), &device);
        let pred = Tensor::<TestAutodiffBackend, 2>::from_data(
            TensorData::from([[1.0_f32, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]),
            &device,
        )
        .require_grad();
        let truth_props = Tensor::<TestAutodiffBackend, 2>::from_data(
            TensorData::from([[f32::NAN, f32::NAN, f32::NAN]; 3]),
            &device,
        );

        let terms = property_loss(beta.clone(), truth, pred.clone(), truth_props, 2, &PropertyLayout::new()).unwrap();
        let grads = terms.total.backward();

        let g: Vec<f32> = pred.grad(&grads).unwrap().into_data().to_vec().unwrap();
        assert_eq!(g.len(), 9);
        assert!(g.iter().all(|v| *v == 0.0), "property gradient {g:?}");
        if let Some(gb) = beta.grad(&grads) {
            let gb: Vec<f32> = gb.into_data().to_vec().unwrap();
            assert!(gb.iter().all(|v| *v == 0.0), "confidence gradient {gb:?}");
        }
    }
}
