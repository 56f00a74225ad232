//! Bounded-growth rescaling shared by every regression loss.
//!
//! `softclip` leaves well-behaved loss values untouched and compresses the
//! tail logarithmically, so a handful of outlier points cannot dominate the
//! gradient of a batch.

use burn::prelude::*;

/// Offset added to the logarithmic tail so it joins the identity at 1.
const TAIL_OFFSET: f64 = 1.0 - std::f64::consts::LN_2;

/// Softclip a non-negative loss tensor of any rank.
///
/// The tensor is rescaled by `1 / start_clip_value`; entries at or below 1
/// pass through, entries above 1 become `ln(x + 1) + 1 - ln 2`; the result
/// is scaled back by `start_clip_value`.
///
/// The result equals the input for `x <= start_clip_value`, is continuous and
/// non-decreasing, and grows logarithmically for large inputs.
pub fn softclip<B: Backend, const D: usize>(
    loss: Tensor<B, D>,
    start_clip_value: f64,
) -> Tensor<B, D> {
    let scaled = loss / start_clip_value;
    let tail = scaled.clone().add_scalar(1.0).log().add_scalar(TAIL_OFFSET);
    let over = scaled.clone().greater_elem(1.0);
    scaled.mask_where(over, tail) * start_clip_value
}

/// Huber-smoothed magnitude, scaled by 2 relative to the textbook form.
///
/// `d²` inside `|d| <= delta`, `2·delta·|d| − delta²` outside. Both branches
/// meet at `|d| = delta`.
pub fn huber<B: Backend, const D: usize>(d: Tensor<B, D>, delta: f64) -> Tensor<B, D> {
    let abs = d.clone().abs();
    let quadratic = d.powf_scalar(2.0);
    let linear = abs.clone().mul_scalar(2.0 * delta).sub_scalar(delta * delta);
    quadratic.mask_where(abs.greater_elem(delta), linear)
}
