//! TOML config loading for the training CLI.
//!
//! Deserializes `configs/train.toml` with `[training]`, `[model]`, `[loss]`,
//! `[scheduler]` and `[data]` sections. Every field is optional; values are
//! layered as library defaults < TOML < CLI flags.

use std::path::{Path, PathBuf};

use condensation::loss::{AnnealingPolicy, LossConfig, PotentialLossConfig, PropertyLayout};
use condensation::model::NodeRegressorConfig;
use condensation::training::{SchedulerConfig, TrainingConfig};
use serde::Deserialize;

/// Top-level structure matching `configs/train.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct TrainToml {
    #[serde(default)]
    pub training: TrainingOverrides,
    #[serde(default)]
    pub model: ModelOverrides,
    #[serde(default)]
    pub loss: LossOverrides,
    /// Learning-rate schedule; cyclic cosine with restarts when absent.
    pub scheduler: Option<SchedulerConfig>,
    #[serde(default)]
    pub data: DataOverrides,
}

#[derive(Debug, Default, Deserialize)]
pub struct TrainingOverrides {
    pub n_epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub lr: Option<f64>,
    pub weight_decay: Option<f64>,
    pub max_grad_norm: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelOverrides {
    pub hidden_dim: Option<usize>,
    pub dropout: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LossOverrides {
    pub clustering_dim: Option<usize>,
    /// Regress energy and position per cluster.
    pub regress_properties: Option<bool>,
    /// Also regress a time column. Implies `regress_properties`.
    pub regress_time: Option<bool>,
    pub clustering_weight: Option<f64>,
    pub loss_offset: Option<f64>,
    pub annealing: Option<AnnealingPolicy>,
    pub q_min: Option<f64>,
    pub s_b: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DataOverrides {
    /// Fraction of events used for training; the rest validates.
    pub train_fraction: Option<f64>,
    /// Fraction of events kept in `--dry` runs.
    pub dry_keep_fraction: Option<f64>,
    /// Fraction of noise points dropped from every event.
    pub reduce_noise: Option<f64>,
    /// Batch size multiplier applied when noise is reduced.
    pub multiply_batch_size: Option<usize>,
    /// Event files excluded from the run.
    #[serde(default)]
    pub blacklist: Vec<PathBuf>,
    pub shuffle: Option<bool>,
    pub seed: Option<u64>,
}

/// Resolved data settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSettings {
    pub train_fraction: f64,
    pub dry_keep_fraction: f64,
    pub reduce_noise: Option<f64>,
    pub multiply_batch_size: usize,
    pub blacklist: Vec<PathBuf>,
    pub shuffle: bool,
    pub seed: u64,
}

impl DataSettings {
    /// Events per batch after the noise-reduction multiplier.
    pub fn effective_batch_size(&self, batch_size: usize) -> usize {
        match self.reduce_noise {
            Some(_) => batch_size * self.multiply_batch_size.max(1),
            None => batch_size,
        }
    }
}

/// Flags from the `train` subcommand that override TOML values.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub lr: Option<f64>,
}

/// Load and deserialize a `TrainToml`. `None` yields all defaults.
pub fn load_train_toml(path: Option<&Path>) -> anyhow::Result<TrainToml> {
    let Some(path) = path else {
        return Ok(TrainToml::default());
    };
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
    let config: TrainToml = toml::from_str(&contents)?;
    tracing::info!(path = %path.display(), "Loaded training config");
    Ok(config)
}

pub fn build_training_config(overrides: &TrainingOverrides, cli: &CliOverrides) -> TrainingConfig {
    let mut config = TrainingConfig::new();
    if let Some(n) = overrides.n_epochs {
        config.n_epochs = n;
    }
    if let Some(n) = overrides.batch_size {
        config.batch_size = n;
    }
    if let Some(lr) = overrides.lr {
        config.lr = lr;
    }
    if let Some(wd) = overrides.weight_decay {
        config.weight_decay = wd;
    }
    if overrides.max_grad_norm.is_some() {
        config.max_grad_norm = overrides.max_grad_norm;
    }

    // CLI flags take highest priority
    if let Some(n) = cli.epochs {
        config.n_epochs = n;
    }
    if let Some(n) = cli.batch_size {
        config.batch_size = n;
    }
    if let Some(lr) = cli.lr {
        config.lr = lr;
    }
    config
}

pub fn build_loss_config(overrides: &LossOverrides) -> LossConfig {
    let mut config = LossConfig::new();
    if let Some(k) = overrides.clustering_dim {
        config.clustering_dim = k;
    }
    let time = overrides.regress_time.unwrap_or(false);
    if overrides.regress_properties.unwrap_or(false) || time {
        config.properties = Some(PropertyLayout::new().with_time(time));
    }
    if let Some(w) = overrides.clustering_weight {
        config.clustering_weight = w;
    }
    if let Some(offset) = overrides.loss_offset {
        config.loss_offset = offset;
    }
    if overrides.annealing.is_some() {
        config.annealing = overrides.annealing.clone();
    }
    let mut potential = PotentialLossConfig::new();
    if let Some(q_min) = overrides.q_min {
        potential.q_min = q_min;
    }
    if let Some(s_b) = overrides.s_b {
        potential.s_b = s_b;
    }
    config.potential = potential;
    config
}

pub fn build_model_config(overrides: &ModelOverrides, input_dim: usize, output_dim: usize) -> NodeRegressorConfig {
    let mut config = NodeRegressorConfig::new(input_dim, output_dim);
    if let Some(h) = overrides.hidden_dim {
        config.hidden_dim = h;
    }
    if let Some(p) = overrides.dropout {
        config.dropout = p;
    }
    config
}

pub fn build_data_settings(overrides: &DataOverrides) -> DataSettings {
    DataSettings {
        train_fraction: overrides.train_fraction.unwrap_or(0.8),
        dry_keep_fraction: overrides.dry_keep_fraction.unwrap_or(0.005),
        reduce_noise: overrides.reduce_noise,
        multiply_batch_size: overrides.multiply_batch_size.unwrap_or(6),
        blacklist: overrides.blacklist.clone(),
        shuffle: overrides.shuffle.unwrap_or(true),
        seed: overrides.seed.unwrap_or(1009),
    }
}
