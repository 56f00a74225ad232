//! Training and evaluation pipelines behind the CLI subcommands.

use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use burn::config::Config;

use condensation::loss::{LossComponent, LossConfig};
use condensation::model::NodeRegressorConfig;
use condensation::training::checkpoint::load_checkpoint;
use condensation::training::{
    train, validate, BatchSource, EventDataset, EventLoader, FileCheckpointStore,
};

use crate::config::{
    build_data_settings, build_loss_config, build_model_config, build_training_config, load_train_toml,
    CliOverrides,
};

type TrainBackend = Autodiff<NdArray<f32>>;
type EvalBackend = NdArray<f32>;

/// Config files written next to the checkpoints of a run.
const MODEL_CONFIG_FILE: &str = "model_config.json";
const LOSS_CONFIG_FILE: &str = "loss_config.json";
const TRAINING_CONFIG_FILE: &str = "training_config.json";

/// Arguments for the `train` subcommand.
#[derive(Debug)]
pub struct TrainArgs {
    pub config: Option<PathBuf>,
    /// Directory of JSON event files.
    pub data: PathBuf,
    /// Checkpoint directory; `ckpts_<unix-seconds>` when absent.
    pub ckptdir: Option<PathBuf>,
    /// Keep a sliver of the data and write no checkpoints.
    pub dry: bool,
    pub overrides: CliOverrides,
}

/// Arguments for the `evaluate` subcommand.
#[derive(Debug)]
pub struct EvaluateArgs {
    pub config: Option<PathBuf>,
    pub data: PathBuf,
    /// Weight file written by `train`; run configs are read from its directory.
    pub checkpoint: PathBuf,
}

fn default_ckptdir() -> PathBuf {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    PathBuf::from(format!("ckpts_{secs}"))
}

fn save_config<C: Config>(config: &C, dir: &Path, name: &str) -> anyhow::Result<()> {
    let path = dir.join(name);
    config
        .save(&path)
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {e}", path.display()))
}

fn load_config<C: Config>(dir: &Path, name: &str) -> anyhow::Result<C> {
    let path = dir.join(name);
    C::load(&path).map_err(|e| anyhow::anyhow!("Failed to read {}: {e:?}", path.display()))
}

/// Load the event directory, then split into train and validation sets.
pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    // 1. Config
    let toml = load_train_toml(args.config.as_deref())?;
    let training = build_training_config(&toml.training, &args.overrides);
    let loss_config = build_loss_config(&toml.loss);
    let data = build_data_settings(&toml.data);

    // 2. Dataset
    let mut dataset = EventDataset::from_dir(&args.data)?
        .with_reduce_noise(data.reduce_noise)
        .with_seed(data.seed);
    dataset.blacklist(&data.blacklist);
    if args.dry {
        dataset = dataset.split(data.dry_keep_fraction).0;
        tracing::info!(events = dataset.len(), "Dry run: keeping a subset and writing no checkpoints");
    }
    let (train_set, val_set) = dataset.split(data.train_fraction);
    if train_set.is_empty() {
        anyhow::bail!("No training events in {}", args.data.display());
    }

    let sample = train_set.load(0)?;
    if loss_config.properties.is_some() && sample.truth_cluster_props.is_none() {
        anyhow::bail!("Loss regresses properties but events carry no truth_cluster_props");
    }

    // 3. Model, loss, scheduler
    let loss = loss_config.init()?;
    let model_config = build_model_config(&toml.model, sample.input_dim, loss.output_dim());
    let device = Default::default();
    let model = model_config.init::<TrainBackend>(&device);

    let batch_size = data.effective_batch_size(training.batch_size);
    let mut scheduler = toml
        .scheduler
        .clone()
        .unwrap_or_default()
        .build(training.lr, train_set.len(), batch_size)?;

    tracing::info!(
        train_events = train_set.len(),
        val_events = val_set.len(),
        batch_size,
        input_dim = sample.input_dim,
        output_dim = loss.output_dim(),
        "Dataset ready"
    );

    let mut train_loader = EventLoader::new(train_set, batch_size);
    if data.shuffle {
        train_loader = train_loader.with_shuffle(data.seed);
    }
    let mut val_loader = EventLoader::new(val_set, batch_size);

    // 4. Checkpoint store
    let ckptdir = args.ckptdir.unwrap_or_else(default_ckptdir);
    let mut store = FileCheckpointStore::new(&ckptdir, args.dry)?;
    if !args.dry {
        save_config(&model_config, &ckptdir, MODEL_CONFIG_FILE)?;
        save_config(&loss_config, &ckptdir, LOSS_CONFIG_FILE)?;
        save_config(&training, &ckptdir, TRAINING_CONFIG_FILE)?;
        tracing::info!(dir = %ckptdir.display(), "Writing checkpoints");
    }

    // 5. Train
    let summary = train::<TrainBackend, _, _, _>(
        &training,
        model,
        &loss,
        &mut train_loader,
        &mut val_loader,
        scheduler.as_mut(),
        &mut store,
        &device,
    )?;

    tracing::info!(
        epochs = summary.epochs.len(),
        best_epoch = ?summary.best_epoch,
        min_val_loss = summary.min_val_loss,
        elapsed_secs = %format!("{:.1}", start.elapsed().as_secs_f64()),
        "Done"
    );
    Ok(())
}

/// Evaluate a checkpoint on every event of a directory.
pub fn run_evaluate(args: EvaluateArgs) -> anyhow::Result<()> {
    let toml = load_train_toml(args.config.as_deref())?;
    let data = build_data_settings(&toml.data);

    let run_dir = args
        .checkpoint
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let model_config: NodeRegressorConfig = load_config(&run_dir, MODEL_CONFIG_FILE)?;
    let loss_config: LossConfig = load_config(&run_dir, LOSS_CONFIG_FILE)?;
    let batch_size = toml.training.batch_size.unwrap_or(4);

    let device = Default::default();
    let model = load_checkpoint::<EvalBackend>(&args.checkpoint, &model_config, &device)?;
    let loss = loss_config.init()?;

    let mut dataset = EventDataset::from_dir(&args.data)?;
    dataset.blacklist(&data.blacklist);
    let mut loader = EventLoader::new(dataset, batch_size);
    tracing::info!(
        checkpoint = %args.checkpoint.display(),
        events = loader.num_events(),
        "Evaluating"
    );

    let components = validate::<EvalBackend, _, _>(&model, &loss, &mut loader, &device)?
        .ok_or_else(|| anyhow::anyhow!("No events to evaluate in {}", args.data.display()))?;

    println!("{components}");
    if let Some(total) = components.get(LossComponent::LTotal) {
        tracing::info!(total, "Evaluation finished");
    }
    Ok(())
}
