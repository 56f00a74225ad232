//! Context captured when a training batch fails.

use std::fmt;

use super::data::{BatchSource, EventBatch};

/// Where and on what a training batch failed.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchFailure {
    pub epoch: usize,
    pub batch_index: usize,
    /// One-line description of the batch, empty if it never loaded.
    pub summary: String,
    /// Source files contributing points to the batch, in batch order.
    pub sources: Vec<String>,
}

impl BatchFailure {
    /// Failure on a batch that was loaded.
    pub fn capture(epoch: usize, batch_index: usize, batch: &EventBatch, loader: &dyn BatchSource) -> Self {
        Self {
            epoch,
            batch_index,
            summary: batch.to_string(),
            sources: batch.source_ids().into_iter().map(|id| loader.source_name(id)).collect(),
        }
    }

    /// Failure while the loader was producing the batch.
    pub fn unloaded(epoch: usize, batch_index: usize) -> Self {
        Self {
            epoch,
            batch_index,
            summary: String::new(),
            sources: Vec::new(),
        }
    }

    /// Report lines: a header, the batch summary, then one source per line.
    pub fn report(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "Training failed at epoch {} batch {}",
            self.epoch, self.batch_index
        )];
        if !self.summary.is_empty() {
            lines.push(self.summary.clone());
        }
        if self.sources.is_empty() {
            lines.push("No source files recorded".to_string());
        } else {
            lines.push(format!("Source files ({}):", self.sources.len()));
            lines.extend(self.sources.iter().map(|s| format!("  {s}")));
        }
        lines
    }

    /// Log the report at error level.
    pub fn log(&self) {
        for line in self.report() {
            tracing::error!(epoch = self.epoch, batch = self.batch_index, "{line}");
        }
    }
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "epoch {} batch {} ({} source files)",
            self.epoch,
            self.batch_index,
            self.sources.len()
        )
    }
}
