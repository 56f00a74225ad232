use crate::loss::LossComponents;

/// Mean of the training scalar over the batches seen so far.
#[derive(Clone, Debug, Default)]
pub struct RunningLoss {
    sum: f64,
    count: usize,
}

impl RunningLoss {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, loss: f64) {
        self.sum += loss;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// What one epoch produced.
#[derive(Clone, Debug)]
pub struct EpochRecord {
    pub epoch: usize,
    /// Mean annealed training loss.
    pub train_loss: Option<f64>,
    /// Validation breakdown averaged over batches.
    pub validation: Option<LossComponents>,
    /// Whether this epoch set a new best validation loss.
    pub best: bool,
    /// Learning rate at the end of the epoch.
    pub lr: f64,
}

impl EpochRecord {
    pub fn val_loss(&self) -> Option<f64> {
        self.validation.as_ref().and_then(LossComponents::total)
    }
}

/// Result of a training run.
#[derive(Debug)]
pub struct TrainSummary<M> {
    pub model: M,
    pub epochs: Vec<EpochRecord>,
    pub best_epoch: Option<usize>,
    pub min_val_loss: f64,
}

impl<M> TrainSummary<M> {
    /// Epochs that set a new best, in order.
    pub fn best_epochs(&self) -> Vec<usize> {
        self.epochs.iter().filter(|r| r.best).map(|r| r.epoch).collect()
    }

    pub fn last(&self) -> Option<&EpochRecord> {
        self.epochs.last()
    }
}
