//! Named loss breakdown with a fixed, ordered key set.
//!
//! Every loss term the engine can report has a `LossComponent` variant.
//! `LossComponents` stores at most one value per variant and iterates in
//! declaration order, which is also the print order.

use std::fmt;

/// A named loss term.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LossComponent {
    /// Attractive part of the clustering potential.
    VAttractive,
    /// Repulsive part of the clustering potential.
    VRepulsive,
    /// Clustering potential loss `L_V`.
    LV,
    /// Condensation-point part of the confidence loss.
    LBetaSignal,
    /// Noise part of the confidence loss.
    LBetaNoise,
    /// Confidence loss `L_beta`.
    LBeta,
    /// Weighted energy regression loss.
    LpEnergy,
    /// Weighted position regression loss.
    LpPosition,
    /// Weighted time regression loss.
    LpTime,
    /// Sum of the property losses.
    Lp,
    /// Combined training objective.
    LTotal,
}

impl LossComponent {
    /// All components in report order.
    pub const ALL: [LossComponent; 11] = [
        LossComponent::VAttractive,
        LossComponent::VRepulsive,
        LossComponent::LV,
        LossComponent::LBetaSignal,
        LossComponent::LBetaNoise,
        LossComponent::LBeta,
        LossComponent::LpEnergy,
        LossComponent::LpPosition,
        LossComponent::LpTime,
        LossComponent::Lp,
        LossComponent::LTotal,
    ];

    /// Printed key, e.g. `L_beta`.
    pub fn key(self) -> &'static str {
        match self {
            LossComponent::VAttractive => "V_att",
            LossComponent::VRepulsive => "V_rep",
            LossComponent::LV => "L_V",
            LossComponent::LBetaSignal => "L_beta_sig",
            LossComponent::LBetaNoise => "L_beta_noise",
            LossComponent::LBeta => "L_beta",
            LossComponent::LpEnergy => "L_p_energy",
            LossComponent::LpPosition => "L_p_position",
            LossComponent::LpTime => "L_p_time",
            LossComponent::Lp => "L_p",
            LossComponent::LTotal => "L_total",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for LossComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Scalar values for a subset of [`LossComponent`]s.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LossComponents {
    values: [Option<f64>; LossComponent::ALL.len()],
}

impl LossComponents {
    /// An empty breakdown.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a component, replacing any previous value.
    pub fn set(&mut self, component: LossComponent, value: f64) {
        self.values[component.index()] = Some(value);
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, component: LossComponent, value: f64) -> Self {
        self.set(component, value);
        self
    }

    pub fn get(&self, component: LossComponent) -> Option<f64> {
        self.values[component.index()]
    }

    /// The `L_total` entry, if present.
    pub fn total(&self) -> Option<f64> {
        self.get(LossComponent::LTotal)
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    /// Present components in report order.
    pub fn iter(&self) -> impl Iterator<Item = (LossComponent, f64)> + '_ {
        LossComponent::ALL
            .iter()
            .filter_map(|&c| self.get(c).map(|v| (c, v)))
    }
}

impl fmt::Display for LossComponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (component, value) in self.iter() {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{component}={value:.6}")?;
            first = false;
        }
        Ok(())
    }
}

/// Sums breakdowns over an epoch and averages by item count.
///
/// Averages are always `sum / count` per component; nothing is re-derived
/// from other averaged values.
#[derive(Clone, Debug, Default)]
pub struct LossAccumulator {
    sums: LossComponents,
    count: usize,
}

impl LossAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one batch breakdown.
    pub fn update(&mut self, components: &LossComponents) {
        for (component, value) in components.iter() {
            let current = self.sums.get(component).unwrap_or(0.0);
            self.sums.set(component, current + value);
        }
        self.count += 1;
    }

    /// Number of breakdowns added so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Per-component mean, or `None` before the first update.
    pub fn average(&self) -> Option<LossComponents> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        let mut avg = LossComponents::new();
        for (component, sum) in self.sums.iter() {
            avg.set(component, sum / n);
        }
        Some(avg)
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
