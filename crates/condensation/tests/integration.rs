//! Integration tests for the condensation crate.
//!
//! These exercise cross-module paths: model output → combiner → gradients,
//! JSON events on disk → loader → training controller → checkpoint files →
//! predictor, and failure reporting with real source file names. All use
//! the NdArray backend and synthetic events.

use std::path::{Path, PathBuf};

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use burn::prelude::*;
use burn::tensor::TensorData;
use tempfile::TempDir;

use condensation::inference::ClusterPredictor;
use condensation::loss::{LossComponent, LossConfig, PropertyLayout};
use condensation::model::NodeRegressorConfig;
use condensation::training::checkpoint::{read_meta, CheckpointTag, FileCheckpointStore};
use condensation::training::data::{
    write_event, BatchSource, EventBatch, EventDataset, EventLoader, EventRecord, InMemoryLoader, PointCloudBatch,
};
use condensation::training::schedule::{CyclicLrWithRestarts, LrScheduler};
use condensation::training::trainer::{train, StepError, TrainError, TrainingConfig};
use condensation::LossError;

type TestBackend = NdArray<f32>;
type TestAutodiffBackend = Autodiff<NdArray<f32>>;

/// Event with `n` points: two objects and noise, properties on every row.
fn record(n: usize, seed: usize, with_props: bool) -> EventRecord {
    EventRecord {
        x: (0..n)
            .map(|i| vec![((i + seed) % 7) as f32 * 0.2, (i % 3) as f32 - 1.0, seed as f32 * 0.1])
            .collect(),
        y: (0..n).map(|i| (i % 3) as i64).collect(),
        truth_cluster_props: with_props.then(|| {
            (0..n)
                .map(|i| vec![2.0 + (i % 3) as f32, 0.5, -0.5])
                .collect()
        }),
    }
}

fn write_events(dir: &Path, count: usize, with_props: bool) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("event_{i:03}.json"));
            write_event(&path, &record(6 + i % 3, i, with_props)).unwrap();
            path
        })
        .collect()
}

#[test]
fn test_two_event_scenario_gradients() {
    let device = Default::default();
    let combiner = LossConfig::new()
        .with_clustering_dim(2)
        .with_properties(Some(PropertyLayout::new()))
        .init()
        .unwrap();

    // 2 events x 5 points, columns [logit, x0, x1, energy, p0, p1]
    let n = 10;
    let mut output = Vec::with_capacity(n * 6);
    for i in 0..n {
        // logit 0 → β = 0.5
        output.extend_from_slice(&[0.0, i as f32 * 0.1, -(i as f32) * 0.1, 0.0, 0.0, 0.0]);
    }
    let output = Tensor::<TestAutodiffBackend, 2>::from_data(TensorData::new(output, [n, 6]), &device)
        .require_grad();

    let mut truth_index = vec![0_i64; n];
    truth_index[0] = 1;
    truth_index[7] = 1;
    let mut truth_props = vec![f32::NAN; n * 3];
    for row in [0, 7] {
        truth_props[row * 3..row * 3 + 3].copy_from_slice(&[1.5, 1.0, 2.0]);
    }
    let batch = PointCloudBatch {
        x: Tensor::zeros([n, 2], &device),
        y: Tensor::from_data(TensorData::new(truth_index, [n]), &device),
        batch: Tensor::from_data(
            TensorData::new((0..n as i64).map(|i| i / 5).collect::<Vec<_>>(), [n]),
            &device,
        ),
        truth_cluster_props: Some(Tensor::from_data(TensorData::new(truth_props, [n, 3]), &device)),
        num_events: 2,
    };

    let components = combiner.components(output.clone(), &batch).unwrap();
    let lp = components.get(LossComponent::Lp).unwrap();
    assert!(lp.is_finite() && lp >= 0.0, "L_p = {lp}");
    assert!(components.total().unwrap() >= 0.0);

    let total = combiner.loss(output.clone(), &batch, None).unwrap();
    let grads = total.backward();
    let grad = output.grad(&grads).expect("output should have a gradient");
    let grad: Vec<f32> = grad.into_data().to_vec().unwrap();

    for row in 0..n {
        let prop_grad: f32 = grad[row * 6 + 3..row * 6 + 6].iter().map(|g| g.abs()).sum();
        if row == 0 || row == 7 {
            assert!(prop_grad > 0.0, "signal row {row} has no property gradient");
        } else {
            assert_eq!(prop_grad, 0.0, "noise row {row} has property gradient {prop_grad}");
        }
    }
}

#[test]
fn test_train_from_json_events_and_predict() {
    let tmp = TempDir::new().unwrap();
    let data_dir = tmp.path().join("events");
    std::fs::create_dir(&data_dir).unwrap();
    write_events(&data_dir, 6, true);

    let dataset = EventDataset::from_dir(&data_dir).unwrap().with_reduce_noise(Some(0.5));
    let (train_set, val_set) = dataset.split(0.67);
    assert_eq!((train_set.len(), val_set.len()), (4, 2));

    let device = Default::default();
    let loss_config = LossConfig::new()
        .with_clustering_dim(2)
        .with_properties(Some(PropertyLayout::new()));
    let loss = loss_config.init().unwrap();
    let model_config = NodeRegressorConfig::new(3, loss.output_dim()).with_hidden_dim(8);
    let model = model_config.init::<TestAutodiffBackend>(&device);

    let mut train_loader = EventLoader::new(train_set, 2).with_shuffle(5);
    let mut val_loader = EventLoader::new(val_set, 2);
    let mut scheduler = CyclicLrWithRestarts::new(1e-3, 4, 2, 400, 1.1, 1e-7).unwrap();
    let mut store = FileCheckpointStore::new(tmp.path().join("run"), false).unwrap();

    let summary = train::<TestAutodiffBackend, _, _, _>(
        &TrainingConfig::new().with_n_epochs(2),
        model,
        &loss,
        &mut train_loader,
        &mut val_loader,
        &mut scheduler,
        &mut store,
        &device,
    )
    .unwrap();

    assert!(scheduler.lr() < 1e-3);
    assert!(store.model_path(CheckpointTag::Epoch(0)).exists());
    assert!(store.model_path(CheckpointTag::Epoch(1)).exists());
    let best_meta = read_meta(&store.meta_path(CheckpointTag::Best)).unwrap();
    assert!(best_meta.best);
    assert_eq!(Some(best_meta.epoch), summary.best_epoch);
    assert_eq!(best_meta.val_loss, Some(summary.min_val_loss));

    let predictor = ClusterPredictor::<TestBackend, _>::load(
        &store.model_path(CheckpointTag::Best),
        &model_config,
        &loss_config,
        device,
    )
    .unwrap();
    let batch = val_loader.batches().next().unwrap().unwrap();
    let prediction = predictor.predict(&batch).unwrap();
    assert_eq!(prediction.num_nodes(), batch.num_points());
    assert_eq!(prediction.props.len(), batch.num_points() * 3);
}

#[test]
fn test_failure_names_event_files() {
    let tmp = TempDir::new().unwrap();
    let files = write_events(tmp.path(), 3, false);
    let dataset = EventDataset::from_dir(tmp.path()).unwrap();

    let device = Default::default();
    let loss = LossConfig::new()
        .with_clustering_dim(2)
        .with_properties(Some(PropertyLayout::new()))
        .init()
        .unwrap();
    let model = NodeRegressorConfig::new(3, loss.output_dim()).init::<TestAutodiffBackend>(&device);

    let mut train_loader = EventLoader::new(dataset, 3);
    let mut val_loader = InMemoryLoader::default();
    let mut store = FileCheckpointStore::new(tmp.path().join("run"), true).unwrap();
    let mut scheduler = condensation::training::schedule::ConstantLr(1e-4);

    let err = train::<TestAutodiffBackend, _, _, _>(
        &TrainingConfig::new().with_n_epochs(1),
        model,
        &loss,
        &mut train_loader,
        &mut val_loader,
        &mut scheduler,
        &mut store,
        &device,
    )
    .unwrap_err();

    let TrainError::Batch { failure, source } = err else {
        panic!("expected a batch failure");
    };
    assert!(matches!(source, StepError::Loss(LossError::MissingTruthProperties)));
    let expected: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
    assert_eq!(failure.sources, expected);
    let report = failure.report();
    assert!(report.iter().any(|line| line.ends_with("event_002.json")));
}

#[test]
fn test_validation_averages_batches() {
    let device = Default::default();
    let combiner = LossConfig::new().with_clustering_dim(2).init().unwrap();
    let model = NodeRegressorConfig::new(3, combiner.output_dim())
        .with_dropout(0.0)
        .init::<TestBackend>(&device);

    let event = |seed| {
        condensation::training::data::Event::from_record(record(6, seed, false), Path::new("e.json")).unwrap()
    };
    let a = EventBatch::collate(&[(0, event(1))]).unwrap();
    let b = EventBatch::collate(&[(1, event(2))]).unwrap();

    let single = |batch: &EventBatch| {
        let mut loader = InMemoryLoader::new(vec![batch.clone()]);
        condensation::training::trainer::validate::<TestBackend, _, _>(&model, &combiner, &mut loader, &device)
            .unwrap()
            .unwrap()
    };
    let (la, lb) = (single(&a), single(&b));

    let mut both = InMemoryLoader::new(vec![a, b]);
    let avg = condensation::training::trainer::validate::<TestBackend, _, _>(&model, &combiner, &mut both, &device)
        .unwrap()
        .unwrap();

    for component in [LossComponent::LV, LossComponent::LBeta, LossComponent::LTotal] {
        let expected = (la.get(component).unwrap() + lb.get(component).unwrap()) / 2.0;
        assert!((avg.get(component).unwrap() - expected).abs() < 1e-5, "{component}");
    }
}
