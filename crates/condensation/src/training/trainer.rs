//! Epoch/batch training controller.
//!
//! Every epoch runs, in order: a training pass with the annealed loss, an
//! epoch checkpoint, a validation pass on the inner backend, and best-model
//! tracking. All epochs always run. A failing training batch is reported
//! with its source files and ends the run.

use std::time::Instant;

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::{AdamWConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};

use crate::loss::combiner::scalar;
use crate::loss::{ClusteringLoss, LossAccumulator, LossCombiner, LossComponents, LossError};
use crate::model::PointCloudModel;
use crate::training::checkpoint::{
    BestTracker, CheckpointError, CheckpointMeta, CheckpointStore, CheckpointTag,
};
use crate::training::data::{BatchSource, DataError, EventBatch};
use crate::training::diagnostics::BatchFailure;
use crate::training::metrics::{EpochRecord, RunningLoss, TrainSummary};
use crate::training::schedule::{LrScheduler, ScheduleError};

/// Configuration for [`train`].
#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = 400)]
    pub n_epochs: usize,
    /// Events per batch.
    #[config(default = 4)]
    pub batch_size: usize,
    /// Base learning rate handed to the scheduler.
    #[config(default = 1e-5)]
    pub lr: f64,
    /// Weight decay for AdamW.
    #[config(default = 1e-4)]
    pub weight_decay: f64,
    /// Gradient norm clipping; `None` disables clipping.
    #[config(default = "None")]
    pub max_grad_norm: Option<f64>,
}

/// Why a single batch could not be processed.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Loss(#[from] LossError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// Errors that end a training run.
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    /// A training batch failed. `failure` names its source files.
    #[error("training batch failed at {failure}")]
    Batch {
        failure: BatchFailure,
        #[source]
        source: StepError,
    },

    #[error("validation failed at epoch {epoch}")]
    Validation {
        epoch: usize,
        #[source]
        source: StepError,
    },

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// A failed training batch before the loader is available for naming sources.
struct EpochFailure {
    batch_index: usize,
    batch: Option<EventBatch>,
    source: StepError,
}

/// One optimizer step. Returns the updated model and the loss value.
fn train_step<B, M, L, O>(
    model: M,
    optimizer: &mut O,
    loss: &LossCombiner<L>,
    batch: &EventBatch,
    epoch: usize,
    lr: f64,
    device: &B::Device,
) -> Result<(M, f64), StepError>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + PointCloudModel<B>,
    L: ClusteringLoss,
    O: Optimizer<M, B>,
{
    let batch = batch.to_device::<B>(device);
    let output = model.forward(batch.x.clone(), batch.batch.clone());
    let total = loss.loss(output, &batch, Some(epoch))?;

    let value = scalar(total.clone())?;
    if !value.is_finite() {
        return Err(LossError::NonFinite(value).into());
    }

    let grads = GradientsParams::from_grads(total.backward(), &model);
    Ok((optimizer.step(lr, model, grads), value))
}

/// Training pass over one epoch.
#[allow(clippy::too_many_arguments)]
fn train_epoch<B, M, L, O>(
    mut model: M,
    optimizer: &mut O,
    loss: &LossCombiner<L>,
    loader: &mut dyn BatchSource,
    scheduler: &mut dyn LrScheduler,
    epoch: usize,
    pb: &ProgressBar,
    device: &B::Device,
) -> Result<(M, RunningLoss), EpochFailure>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + PointCloudModel<B>,
    L: ClusteringLoss,
    O: Optimizer<M, B>,
{
    let mut running = RunningLoss::new();
    for (batch_index, next) in loader.batches().enumerate() {
        let batch = match next {
            Ok(batch) => batch,
            Err(e) => {
                return Err(EpochFailure {
                    batch_index,
                    batch: None,
                    source: e.into(),
                })
            }
        };

        let step = train_step::<B, _, _, _>(model, optimizer, loss, &batch, epoch, scheduler.lr(), device)
            .and_then(|(model, value)| {
                scheduler.step_batch()?;
                Ok((model, value))
            });
        let value;
        (model, value) = match step {
            Ok(updated) => updated,
            Err(source) => {
                return Err(EpochFailure {
                    batch_index,
                    batch: Some(batch),
                    source,
                })
            }
        };

        running.update(value);
        pb.inc(1);
        pb.set_message(format!("loss={:.4}", running.mean().unwrap_or(value)));
    }
    Ok((model, running))
}

/// Average the loss breakdown over every validation batch.
///
/// Returns `None` when the loader yields no batches.
pub fn validate<B, M, L>(
    model: &M,
    loss: &LossCombiner<L>,
    loader: &mut dyn BatchSource,
    device: &B::Device,
) -> Result<Option<LossComponents>, StepError>
where
    B: Backend,
    M: PointCloudModel<B>,
    L: ClusteringLoss,
{
    let mut accumulator = LossAccumulator::new();
    for next in loader.batches() {
        let batch = next?.to_device::<B>(device);
        let output = model.forward(batch.x.clone(), batch.batch.clone());
        accumulator.update(&loss.components(output, &batch)?);
    }
    Ok(accumulator.average())
}

fn progress_bar(len: usize, epoch: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {prefix} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.set_prefix(format!("epoch {epoch}"));
    pb
}

/// Run the full training loop.
///
/// # Arguments
/// - `config`: epochs and optimizer settings
/// - `model`: initialized model, consumed and returned trained in the summary
/// - `loss`: combiner producing the annealed training scalar and the
///   validation breakdown
/// - `train_loader`, `val_loader`: batch sources, iterated once per epoch
/// - `scheduler`: stepped per epoch and per batch; supplies the learning rate
/// - `store`: receives `Epoch(n)` checkpoints and `Best` overwrites
#[allow(clippy::too_many_arguments)]
pub fn train<B, M, L, C>(
    config: &TrainingConfig,
    mut model: M,
    loss: &LossCombiner<L>,
    train_loader: &mut dyn BatchSource,
    val_loader: &mut dyn BatchSource,
    scheduler: &mut dyn LrScheduler,
    store: &mut C,
    device: &B::Device,
) -> Result<TrainSummary<M>, TrainError>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + PointCloudModel<B>,
    M::InnerModule: PointCloudModel<B::InnerBackend>,
    L: ClusteringLoss,
    C: CheckpointStore,
{
    let mut optimizer = AdamWConfig::new()
        .with_weight_decay(config.weight_decay as f32)
        .with_grad_clipping(
            config
                .max_grad_norm
                .map(|norm| GradientClippingConfig::Norm(norm as f32)),
        )
        .init::<B, M>();

    tracing::info!(
        epochs = config.n_epochs,
        train_batches = train_loader.num_batches(),
        train_events = train_loader.num_events(),
        val_batches = val_loader.num_batches(),
        annealing = ?loss.annealing(),
        "Starting training"
    );

    let train_start = Instant::now();
    let mut tracker = BestTracker::new();
    let mut epochs = Vec::with_capacity(config.n_epochs);

    for epoch in 0..config.n_epochs {
        scheduler.step_epoch()?;
        let active = loss.annealing().active_terms(Some(epoch));
        tracing::debug!(epoch, lr = scheduler.lr(), beta_active = active.beta, "Epoch started");

        // Train
        let pb = progress_bar(train_loader.num_batches(), epoch);
        let result = train_epoch::<B, _, _, _>(model, &mut optimizer, loss, train_loader, scheduler, epoch, &pb, device);
        pb.finish_and_clear();
        let running;
        (model, running) = match result {
            Ok(trained) => trained,
            Err(EpochFailure {
                batch_index,
                batch,
                source,
            }) => {
                let failure = match &batch {
                    Some(batch) => BatchFailure::capture(epoch, batch_index, batch, train_loader),
                    None => BatchFailure::unloaded(epoch, batch_index),
                };
                failure.log();
                return Err(TrainError::Batch { failure, source });
            }
        };

        store.save(
            &model,
            CheckpointTag::Epoch(epoch),
            &CheckpointMeta {
                epoch,
                val_loss: None,
                best: false,
            },
        )?;

        // Validate
        let validation = validate::<B::InnerBackend, _, _>(&model.valid(), loss, val_loader, device)
            .map_err(|source| TrainError::Validation { epoch, source })?;
        let val_loss = validation.as_ref().and_then(LossComponents::total);
        match &validation {
            Some(components) => tracing::info!(epoch, "{components}"),
            None => tracing::warn!(epoch, "No validation batches"),
        }

        let best = val_loss.is_some_and(|v| tracker.observe(epoch, v));
        if best {
            tracing::info!(epoch, val_loss, "Saving epoch {epoch} as new best");
            store.save(
                &model,
                CheckpointTag::Best,
                &CheckpointMeta {
                    epoch,
                    val_loss,
                    best: true,
                },
            )?;
        }

        let train_loss = running.mean();
        tracing::info!(
            epoch,
            train_loss = %train_loss.map(|l| format!("{l:.4}")).unwrap_or_default(),
            val_loss = %val_loss.map(|l| format!("{l:.4}")).unwrap_or_default(),
            lr = %format!("{:.2e}", scheduler.lr()),
            "Epoch finished"
        );
        epochs.push(EpochRecord {
            epoch,
            train_loss,
            validation,
            best,
            lr: scheduler.lr(),
        });
    }

    tracing::info!(
        best_epoch = ?tracker.best_epoch(),
        min_val_loss = tracker.min_loss(),
        elapsed_secs = %format!("{:.1}", train_start.elapsed().as_secs_f64()),
        "Training finished"
    );

    Ok(TrainSummary {
        model,
        epochs,
        best_epoch: tracker.best_epoch(),
        min_val_loss: tracker.min_loss(),
    })
}
