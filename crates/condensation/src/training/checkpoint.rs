//! Checkpoint persistence and best-model tracking.
//!
//! A run directory holds `ckpt_<epoch>.mpk` for every epoch and a single
//! `ckpt_best.mpk` that is overwritten whenever validation improves. Each
//! weight file has a `.json` sidecar with [`CheckpointMeta`].

use std::fmt;
use std::path::{Path, PathBuf};

use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};

use crate::model::{NodeRegressor, NodeRegressorConfig};

/// Validation losses start above this so the first epoch is always best.
pub const MIN_LOSS_SENTINEL: f64 = 1e9;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("failed to create checkpoint directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to record {path}: {message}")]
    Record { path: PathBuf, message: String },

    #[error("failed to write checkpoint metadata {path}: {source}")]
    Meta {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid checkpoint metadata {path}: {source}")]
    MetaFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Which snapshot a checkpoint is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckpointTag {
    Epoch(usize),
    Best,
}

impl CheckpointTag {
    /// File stem, without extension.
    pub fn file_stem(&self) -> String {
        match self {
            Self::Epoch(epoch) => format!("ckpt_{epoch}"),
            Self::Best => "ckpt_best".to_string(),
        }
    }
}

impl fmt::Display for CheckpointTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Epoch(epoch) => write!(f, "epoch {epoch}"),
            Self::Best => write!(f, "best"),
        }
    }
}

/// Sidecar metadata written next to each weight file.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct CheckpointMeta {
    pub epoch: usize,
    /// Validation total of this epoch, when validation has run.
    pub val_loss: Option<f64>,
    pub best: bool,
}

/// Destination for model snapshots.
pub trait CheckpointStore {
    fn save<B: Backend, M: Module<B>>(
        &mut self,
        model: &M,
        tag: CheckpointTag,
        meta: &CheckpointMeta,
    ) -> Result<(), CheckpointError>;
}

/// Writes burn named-msgpack records into a run directory.
#[derive(Clone, Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    dry_run: bool,
}

impl FileCheckpointStore {
    /// Store rooted at `dir`, created if missing. A dry-run store never
    /// touches the filesystem.
    pub fn new(dir: impl Into<PathBuf>, dry_run: bool) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        if !dry_run {
            std::fs::create_dir_all(&dir).map_err(|source| CheckpointError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(Self { dir, dry_run })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Path of the weight file for `tag`.
    pub fn model_path(&self, tag: CheckpointTag) -> PathBuf {
        self.dir.join(format!("{}.mpk", tag.file_stem()))
    }

    /// Path of the metadata sidecar for `tag`.
    pub fn meta_path(&self, tag: CheckpointTag) -> PathBuf {
        self.dir.join(format!("{}.json", tag.file_stem()))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save<B: Backend, M: Module<B>>(
        &mut self,
        model: &M,
        tag: CheckpointTag,
        meta: &CheckpointMeta,
    ) -> Result<(), CheckpointError> {
        if self.dry_run {
            tracing::debug!(%tag, "Dry run, checkpoint not written");
            return Ok(());
        }

        let model_path = self.model_path(tag);
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        model
            .clone()
            .save_file(self.dir.join(tag.file_stem()), &recorder)
            .map_err(|e| CheckpointError::Record {
                path: model_path.clone(),
                message: e.to_string(),
            })?;

        let meta_path = self.meta_path(tag);
        let file = std::fs::File::create(&meta_path).map_err(|source| CheckpointError::Meta {
            path: meta_path.clone(),
            source,
        })?;
        serde_json::to_writer_pretty(file, meta).map_err(|source| CheckpointError::MetaFormat {
            path: meta_path.clone(),
            source,
        })?;

        tracing::debug!(path = %model_path.display(), %tag, "Checkpoint saved");
        Ok(())
    }
}

/// Read a metadata sidecar.
pub fn read_meta(path: &Path) -> Result<CheckpointMeta, CheckpointError> {
    let file = std::fs::File::open(path).map_err(|source| CheckpointError::Meta {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(file).map_err(|source| CheckpointError::MetaFormat {
        path: path.to_path_buf(),
        source,
    })
}

/// Re-create a [`NodeRegressor`] from `config` and load weights from `path`.
pub fn load_checkpoint<B: Backend>(
    path: &Path,
    config: &NodeRegressorConfig,
    device: &B::Device,
) -> Result<NodeRegressor<B>, CheckpointError> {
    config
        .init::<B>(device)
        .load_file(path, &NamedMpkFileRecorder::<FullPrecisionSettings>::new(), device)
        .map_err(|e| CheckpointError::Record {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Running minimum of validation losses.
#[derive(Clone, Debug)]
pub struct BestTracker {
    min_loss: f64,
    best_epoch: Option<usize>,
}

impl Default for BestTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl BestTracker {
    pub fn new() -> Self {
        Self {
            min_loss: MIN_LOSS_SENTINEL,
            best_epoch: None,
        }
    }

    /// Record `loss` for `epoch`. Returns true when it is strictly below
    /// every loss seen so far.
    pub fn observe(&mut self, epoch: usize, loss: f64) -> bool {
        if loss < self.min_loss {
            self.min_loss = loss;
            self.best_epoch = Some(epoch);
            true
        } else {
            false
        }
    }

    pub fn min_loss(&self) -> f64 {
        self.min_loss
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }
}
