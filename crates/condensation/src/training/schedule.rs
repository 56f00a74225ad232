//! Learning-rate schedulers.
//!
//! The trainer calls [`LrScheduler::step_epoch`] at the start of every
//! epoch and [`LrScheduler::step_batch`] after every optimizer step, and
//! reads [`LrScheduler::lr`] before each step.

use serde::{Deserialize, Serialize};

/// Errors raised by a scheduler.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// More batch steps than the epoch was sized for.
    #[error(
        "batch step {step} exceeds the {available} increments of this epoch; \
         epoch size and batch size must match the loader"
    )]
    Exhausted { step: usize, available: usize },

    #[error("invalid scheduler setting: {0}")]
    Invalid(String),
}

/// A learning-rate schedule driven by epoch and batch steps.
pub trait LrScheduler {
    /// Advance to the next epoch.
    fn step_epoch(&mut self) -> Result<(), ScheduleError>;

    /// Advance by one batch.
    fn step_batch(&mut self) -> Result<(), ScheduleError>;

    /// Current learning rate.
    fn lr(&self) -> f64;
}

/// Fixed learning rate.
#[derive(Clone, Debug)]
pub struct ConstantLr(pub f64);

impl LrScheduler for ConstantLr {
    fn step_epoch(&mut self) -> Result<(), ScheduleError> {
        Ok(())
    }

    fn step_batch(&mut self) -> Result<(), ScheduleError> {
        Ok(())
    }

    fn lr(&self) -> f64 {
        self.0
    }
}

/// Compute learning rate with linear warmup and cosine decay.
///
/// - Steps `0..warmup_steps`: linear ramp from `base_lr/warmup_steps` to `base_lr`
/// - Steps `warmup_steps..total_steps`: cosine decay from `base_lr` to 0
pub fn lr_schedule(base_lr: f64, warmup_steps: usize, total_steps: usize, step: usize) -> f64 {
    if warmup_steps > 0 && step < warmup_steps {
        base_lr * (step + 1) as f64 / warmup_steps as f64
    } else {
        let decay_steps = total_steps.saturating_sub(warmup_steps).max(1);
        let progress = (step.saturating_sub(warmup_steps)) as f64 / decay_steps as f64;
        base_lr * 0.5 * (1.0 + (std::f64::consts::PI * progress.min(1.0)).cos())
    }
}

/// Per-batch linear warmup followed by cosine decay.
#[derive(Clone, Debug)]
pub struct WarmupCosine {
    base_lr: f64,
    warmup_steps: usize,
    total_steps: usize,
    step: usize,
}

impl WarmupCosine {
    pub fn new(base_lr: f64, warmup_steps: usize, total_steps: usize) -> Self {
        Self {
            base_lr,
            warmup_steps,
            total_steps,
            step: 0,
        }
    }
}

impl LrScheduler for WarmupCosine {
    fn step_epoch(&mut self) -> Result<(), ScheduleError> {
        Ok(())
    }

    fn step_batch(&mut self) -> Result<(), ScheduleError> {
        self.step += 1;
        Ok(())
    }

    fn lr(&self) -> f64 {
        lr_schedule(self.base_lr, self.warmup_steps, self.total_steps, self.step)
    }
}

/// Cosine annealing with warm restarts, advanced fractionally per batch.
///
/// Within an epoch the position `t_cur = t_epoch + f` moves through
/// `f ∈ linspace(0, 1, batches + 1)`. Once `t_epoch` reaches the period
/// the cycle restarts and the period grows by `t_mult`.
#[derive(Clone, Debug)]
pub struct CyclicLrWithRestarts {
    base_lr: f64,
    min_lr: f64,
    period: usize,
    t_mult: f64,
    epoch_size: usize,
    batch_size: usize,
    t_epoch: Option<usize>,
    increments: Vec<f64>,
    iteration: usize,
    restarts: usize,
    lr: f64,
}

impl CyclicLrWithRestarts {
    pub fn new(
        base_lr: f64,
        epoch_size: usize,
        batch_size: usize,
        period: usize,
        t_mult: f64,
        min_lr: f64,
    ) -> Result<Self, ScheduleError> {
        if batch_size == 0 {
            return Err(ScheduleError::Invalid("batch size must be positive".to_string()));
        }
        if period == 0 {
            return Err(ScheduleError::Invalid("restart period must be positive".to_string()));
        }
        if t_mult < 1.0 {
            return Err(ScheduleError::Invalid(format!("t_mult {t_mult} is below 1")));
        }
        Ok(Self {
            base_lr,
            min_lr,
            period,
            t_mult,
            epoch_size,
            batch_size,
            t_epoch: None,
            increments: Vec::new(),
            iteration: 0,
            restarts: 0,
            lr: base_lr,
        })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn restarts(&self) -> usize {
        self.restarts
    }

    /// `linspace(0, 1, n)` with one point per batch boundary.
    fn batch_increments(&self) -> Vec<f64> {
        let full = self.epoch_size / self.batch_size;
        let n = if self.epoch_size % self.batch_size > 0 { full + 2 } else { full + 1 };
        if n == 1 {
            return vec![0.0];
        }
        (0..n).map(|i| i as f64 / (n - 1) as f64).collect()
    }
}

impl LrScheduler for CyclicLrWithRestarts {
    fn step_epoch(&mut self) -> Result<(), ScheduleError> {
        self.t_epoch = Some(self.t_epoch.map_or(0, |t| t + 1));
        self.increments = self.batch_increments();
        self.iteration = 0;
        self.step_batch()
    }

    fn step_batch(&mut self) -> Result<(), ScheduleError> {
        let t_epoch = self.t_epoch.unwrap_or(0);
        let increment = *self.increments.get(self.iteration).ok_or(ScheduleError::Exhausted {
            step: self.iteration,
            available: self.increments.len(),
        })?;
        self.iteration += 1;

        let t_cur = t_epoch as f64 + increment;
        let cosine = 0.5 + 0.5 * (std::f64::consts::PI * t_cur / self.period as f64).cos();
        self.lr = self.min_lr + (self.base_lr - self.min_lr) * cosine;

        if t_epoch >= self.period {
            self.period = (self.period as f64 * self.t_mult).ceil() as usize;
            self.restarts += 1;
            self.t_epoch = Some(0);
            tracing::debug!(period = self.period, restarts = self.restarts, "Learning-rate cycle restarted");
        }
        Ok(())
    }

    fn lr(&self) -> f64 {
        self.lr
    }
}

fn default_restart_period() -> usize {
    400
}

fn default_t_mult() -> f64 {
    1.1
}

fn default_min_lr() -> f64 {
    1e-7
}

/// Scheduler selection, as read from configuration files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchedulerConfig {
    Constant,
    WarmupCosine {
        warmup_steps: usize,
        total_steps: usize,
    },
    CyclicRestarts {
        #[serde(default = "default_restart_period")]
        restart_period: usize,
        #[serde(default = "default_t_mult")]
        t_mult: f64,
        #[serde(default = "default_min_lr")]
        min_lr: f64,
    },
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::CyclicRestarts {
            restart_period: default_restart_period(),
            t_mult: default_t_mult(),
            min_lr: default_min_lr(),
        }
    }
}

impl SchedulerConfig {
    /// Build a scheduler for `epoch_size` events in batches of `batch_size`.
    pub fn build(
        &self,
        base_lr: f64,
        epoch_size: usize,
        batch_size: usize,
    ) -> Result<Box<dyn LrScheduler>, ScheduleError> {
        Ok(match *self {
            Self::Constant => Box::new(ConstantLr(base_lr)),
            Self::WarmupCosine {
                warmup_steps,
                total_steps,
            } => Box::new(WarmupCosine::new(base_lr, warmup_steps, total_steps)),
            Self::CyclicRestarts {
                restart_period,
                t_mult,
                min_lr,
            } => Box::new(CyclicLrWithRestarts::new(
                base_lr,
                epoch_size,
                batch_size,
                restart_period,
                t_mult,
                min_lr,
            )?),
        })
    }
}
