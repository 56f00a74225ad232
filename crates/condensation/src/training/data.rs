//! Point-cloud event data for object-condensation training.
//!
//! Events are stored one per JSON file. An [`EventDataset`] is an ordered
//! list of such files; the position of a file in that list is the source
//! identifier (`inpz`) attached to every point it contributes to a batch.
//! [`EventLoader`] groups events into [`EventBatch`]es, which are
//! concatenated host-side point clouds with a parallel event-index vector.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use burn::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::model::bridge::{labels_to_tensor, rows_to_tensor};

/// Errors raised while reading or batching events.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The event file parsed but its arrays are inconsistent.
    #[error("malformed event {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    /// Events in one batch disagree on feature or property width.
    #[error("cannot collate events: {0}")]
    Collate(String),

    #[error("no events found in {0}")]
    Empty(PathBuf),
}

/// On-disk event layout.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventRecord {
    /// Per-point features, `(n, input_dim)`.
    pub x: Vec<Vec<f32>>,
    /// Per-point truth cluster index, 0 for noise.
    pub y: Vec<i64>,
    /// Per-point truth properties of the owning cluster, `(n, m)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truth_cluster_props: Option<Vec<Vec<f32>>>,
}

/// Write an event record as JSON.
pub fn write_event(path: &Path, record: &EventRecord) -> Result<(), DataError> {
    let file = std::fs::File::create(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::to_writer(std::io::BufWriter::new(file), record).map_err(|source| {
        DataError::Json {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// A single validated event with flat row-major buffers.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub x: Vec<f32>,
    pub input_dim: usize,
    pub y: Vec<i64>,
    pub truth_cluster_props: Option<Vec<f32>>,
    /// Width of `truth_cluster_props` (0 when absent).
    pub prop_dim: usize,
}

fn flatten_rows(rows: &[Vec<f32>], what: &str, path: &Path) -> Result<(Vec<f32>, usize), DataError> {
    let width = rows.first().map(Vec::len).unwrap_or(0);
    if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
        return Err(DataError::Malformed {
            path: path.to_path_buf(),
            message: format!("{what} row {i} has {} columns, expected {width}", row.len()),
        });
    }
    Ok((rows.iter().flatten().copied().collect(), width))
}

impl Event {
    /// Validate a record read from `path`.
    pub fn from_record(record: EventRecord, path: &Path) -> Result<Self, DataError> {
        let n = record.x.len();
        let (x, input_dim) = flatten_rows(&record.x, "x", path)?;
        if n > 0 && input_dim == 0 {
            return Err(DataError::Malformed {
                path: path.to_path_buf(),
                message: "points have no features".to_string(),
            });
        }
        if record.y.len() != n {
            return Err(DataError::Malformed {
                path: path.to_path_buf(),
                message: format!("y has {} entries for {n} points", record.y.len()),
            });
        }
        let (truth_cluster_props, prop_dim) = match record.truth_cluster_props {
            Some(rows) => {
                if rows.len() != n {
                    return Err(DataError::Malformed {
                        path: path.to_path_buf(),
                        message: format!("truth_cluster_props has {} rows for {n} points", rows.len()),
                    });
                }
                let (flat, width) = flatten_rows(&rows, "truth_cluster_props", path)?;
                (Some(flat), width)
            }
            None => (None, 0),
        };
        Ok(Self {
            x,
            input_dim,
            y: record.y,
            truth_cluster_props,
            prop_dim,
        })
    }

    pub fn num_points(&self) -> usize {
        self.y.len()
    }

    /// Keep only the given point rows, in order.
    fn retain_rows(&mut self, keep: &[usize]) {
        let d = self.input_dim;
        self.x = keep.iter().flat_map(|&r| self.x[r * d..(r + 1) * d].iter().copied()).collect();
        self.y = keep.iter().map(|&r| self.y[r]).collect();
        if let Some(props) = &self.truth_cluster_props {
            let m = self.prop_dim;
            self.truth_cluster_props =
                Some(keep.iter().flat_map(|&r| props[r * m..(r + 1) * m].iter().copied()).collect());
        }
    }

    /// Drop a random `fraction` of the noise points (truth index 0).
    pub fn reduce_noise(&mut self, fraction: f64, rng: &mut StdRng) {
        let mut noise: Vec<usize> = (0..self.num_points()).filter(|&i| self.y[i] == 0).collect();
        let n_drop = (noise.len() as f64 * fraction.clamp(0.0, 1.0)).floor() as usize;
        if n_drop == 0 {
            return;
        }
        noise.shuffle(rng);
        let dropped: HashSet<usize> = noise[..n_drop].iter().copied().collect();
        let keep: Vec<usize> = (0..self.num_points()).filter(|i| !dropped.contains(i)).collect();
        self.retain_rows(&keep);
    }
}

/// Ordered collection of event files.
#[derive(Clone, Debug)]
pub struct EventDataset {
    files: Vec<PathBuf>,
    reduce_noise: Option<f64>,
    seed: u64,
}

impl EventDataset {
    pub fn from_files(files: Vec<PathBuf>) -> Self {
        Self {
            files,
            reduce_noise: None,
            seed: 1009,
        }
    }

    /// All `*.json` files in `dir`, sorted by path.
    pub fn from_dir(dir: &Path) -> Result<Self, DataError> {
        let entries = std::fs::read_dir(dir).map_err(|source| DataError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| DataError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?
                .path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(DataError::Empty(dir.to_path_buf()));
        }
        files.sort();
        tracing::info!(dir = %dir.display(), events = files.len(), "Event dataset indexed");
        Ok(Self::from_files(files))
    }

    /// Randomly drop this fraction of noise points from every loaded event.
    pub fn with_reduce_noise(mut self, fraction: Option<f64>) -> Self {
        self.reduce_noise = fraction;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn reduce_noise(&self) -> Option<f64> {
        self.reduce_noise
    }

    /// Remove known-bad events. Returns how many files were removed.
    pub fn blacklist<P: AsRef<Path>>(&mut self, paths: &[P]) -> usize {
        let before = self.files.len();
        self.files
            .retain(|f| !paths.iter().any(|p| f.as_path() == p.as_ref() || f.ends_with(p.as_ref())));
        let removed = before - self.files.len();
        if removed > 0 {
            tracing::info!(removed, remaining = self.files.len(), "Blacklisted events removed");
        }
        removed
    }

    /// Split into the first `fraction` of events and the rest.
    ///
    /// A non-zero fraction of a non-empty dataset keeps at least one event.
    pub fn split(self, fraction: f64) -> (Self, Self) {
        let len = self.files.len();
        let mut n_head = ((len as f64) * fraction.clamp(0.0, 1.0)).floor() as usize;
        if fraction > 0.0 && len > 0 {
            n_head = n_head.max(1);
        }
        let mut head = self.files;
        let tail = head.split_off(n_head);
        (
            Self {
                files: head,
                reduce_noise: self.reduce_noise,
                seed: self.seed,
            },
            Self {
                files: tail,
                reduce_noise: self.reduce_noise,
                seed: self.seed,
            },
        )
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn file(&self, index: usize) -> Option<&Path> {
        self.files.get(index).map(PathBuf::as_path)
    }

    /// Read and validate event `index`, applying noise reduction.
    pub fn load(&self, index: usize) -> Result<Event, DataError> {
        let path = self.files.get(index).ok_or_else(|| DataError::Malformed {
            path: PathBuf::new(),
            message: format!("event index {index} out of range for {} events", self.files.len()),
        })?;
        let contents = std::fs::read_to_string(path).map_err(|source| DataError::Io {
            path: path.clone(),
            source,
        })?;
        let record: EventRecord = serde_json::from_str(&contents).map_err(|source| DataError::Json {
            path: path.clone(),
            source,
        })?;
        let mut event = Event::from_record(record, path)?;
        if let Some(fraction) = self.reduce_noise {
            let mut rng = StdRng::seed_from_u64(self.seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
            event.reduce_noise(fraction, &mut rng);
        }
        Ok(event)
    }
}

/// Several events concatenated into one host-side point cloud.
#[derive(Clone, Debug, PartialEq)]
pub struct EventBatch {
    /// Features, row-major `(num_points, input_dim)`.
    pub x: Vec<f32>,
    pub input_dim: usize,
    /// Truth cluster index per point.
    pub y: Vec<i64>,
    /// Event index per point, 0-based and contiguous.
    pub batch: Vec<i64>,
    /// Source identifier per point.
    pub inpz: Vec<usize>,
    /// Truth properties, row-major `(num_points, prop_dim)`.
    pub truth_cluster_props: Option<Vec<f32>>,
    pub prop_dim: usize,
    pub num_events: usize,
}

impl EventBatch {
    /// Concatenate `(source_id, event)` pairs in the given order.
    pub fn collate(events: &[(usize, Event)]) -> Result<Self, DataError> {
        let Some((_, first)) = events.first() else {
            return Err(DataError::Collate("empty batch".to_string()));
        };
        // Zero-hit events report width 0
        let reference = events
            .iter()
            .map(|(_, e)| e)
            .find(|e| e.num_points() > 0)
            .unwrap_or(first);
        let input_dim = reference.input_dim;
        let has_props = reference.truth_cluster_props.is_some();
        let prop_dim = reference.prop_dim;

        let total: usize = events.iter().map(|(_, e)| e.num_points()).sum();
        let mut batch = EventBatch {
            x: Vec::with_capacity(total * input_dim),
            input_dim,
            y: Vec::with_capacity(total),
            batch: Vec::with_capacity(total),
            inpz: Vec::with_capacity(total),
            truth_cluster_props: has_props.then(|| Vec::with_capacity(total * prop_dim)),
            prop_dim,
            num_events: events.len(),
        };

        for (event_index, (source, event)) in events.iter().enumerate() {
            if event.num_points() > 0 && event.input_dim != input_dim {
                return Err(DataError::Collate(format!(
                    "event {source} has {} features, expected {input_dim}",
                    event.input_dim
                )));
            }
            if event.truth_cluster_props.is_some() != has_props
                || (has_props && event.num_points() > 0 && event.prop_dim != prop_dim)
            {
                return Err(DataError::Collate(format!(
                    "event {source} has inconsistent truth properties"
                )));
            }
            batch.x.extend_from_slice(&event.x);
            batch.y.extend_from_slice(&event.y);
            batch.batch.extend(std::iter::repeat(event_index as i64).take(event.num_points()));
            batch.inpz.extend(std::iter::repeat(*source).take(event.num_points()));
            if let (Some(dst), Some(src)) = (batch.truth_cluster_props.as_mut(), &event.truth_cluster_props) {
                dst.extend_from_slice(src);
            }
        }
        Ok(batch)
    }

    pub fn num_points(&self) -> usize {
        self.y.len()
    }

    /// Distinct source identifiers, in order of first appearance.
    pub fn source_ids(&self) -> Vec<usize> {
        let mut seen = HashSet::new();
        self.inpz.iter().copied().filter(|id| seen.insert(*id)).collect()
    }

    /// Upload to `device` as tensors.
    pub fn to_device<B: Backend>(&self, device: &B::Device) -> PointCloudBatch<B> {
        let n = self.num_points();
        PointCloudBatch {
            x: rows_to_tensor(&self.x, n, self.input_dim, device),
            y: labels_to_tensor(&self.y, device),
            batch: labels_to_tensor(&self.batch, device),
            truth_cluster_props: self
                .truth_cluster_props
                .as_ref()
                .map(|props| rows_to_tensor(props, n, self.prop_dim, device)),
            num_events: self.num_events,
        }
    }
}

impl fmt::Display for EventBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let signal = self.y.iter().filter(|&&y| y > 0).count();
        write!(
            f,
            "EventBatch(events={}, points={}, signal={}, x=[{}, {}], props={})",
            self.num_events,
            self.num_points(),
            signal,
            self.num_points(),
            self.input_dim,
            if self.truth_cluster_props.is_some() {
                format!("[{}, {}]", self.num_points(), self.prop_dim)
            } else {
                "none".to_string()
            }
        )
    }
}

/// A batch on a burn device, as consumed by the model and the losses.
#[derive(Clone, Debug)]
pub struct PointCloudBatch<B: Backend> {
    /// Features, `(n, input_dim)`.
    pub x: Tensor<B, 2>,
    /// Truth cluster index, `(n,)`.
    pub y: Tensor<B, 1, Int>,
    /// Event index, `(n,)`.
    pub batch: Tensor<B, 1, Int>,
    /// Truth properties, `(n, m)`.
    pub truth_cluster_props: Option<Tensor<B, 2>>,
    pub num_events: usize,
}

/// Something that yields batches once per epoch.
pub trait BatchSource {
    /// Batches per epoch.
    fn num_batches(&self) -> usize;

    /// Events per epoch.
    fn num_events(&self) -> usize;

    /// Iterate one epoch of batches.
    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<EventBatch, DataError>> + '_>;

    /// Human-readable name of a source identifier, used in failure reports.
    fn source_name(&self, id: usize) -> String {
        format!("source #{id}")
    }
}

/// File-backed loader with optional per-epoch shuffling.
pub struct EventLoader {
    dataset: EventDataset,
    batch_size: usize,
    shuffle: bool,
    rng: StdRng,
}

impl EventLoader {
    pub fn new(dataset: EventDataset, batch_size: usize) -> Self {
        Self {
            dataset,
            batch_size: batch_size.max(1),
            shuffle: false,
            rng: StdRng::seed_from_u64(1009),
        }
    }

    /// Shuffle the event order at the start of every epoch.
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle = true;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn dataset(&self) -> &EventDataset {
        &self.dataset
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl BatchSource for EventLoader {
    fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    fn num_events(&self) -> usize {
        self.dataset.len()
    }

    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<EventBatch, DataError>> + '_> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            order.shuffle(&mut self.rng);
        }
        let chunks: Vec<Vec<usize>> = order.chunks(self.batch_size).map(<[usize]>::to_vec).collect();
        let dataset = &self.dataset;
        Box::new(chunks.into_iter().map(move |chunk| {
            let events = chunk
                .iter()
                .map(|&i| dataset.load(i).map(|event| (i, event)))
                .collect::<Result<Vec<_>, _>>()?;
            EventBatch::collate(&events)
        }))
    }

    fn source_name(&self, id: usize) -> String {
        self.dataset
            .file(id)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("source #{id}"))
    }
}

/// Pre-collated batches held in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLoader {
    batches: Vec<EventBatch>,
    names: Vec<String>,
}

impl InMemoryLoader {
    pub fn new(batches: Vec<EventBatch>) -> Self {
        Self {
            batches,
            names: Vec::new(),
        }
    }

    /// Names for source identifiers, indexed by id.
    pub fn with_source_names(mut self, names: Vec<String>) -> Self {
        self.names = names;
        self
    }
}

impl BatchSource for InMemoryLoader {
    fn num_batches(&self) -> usize {
        self.batches.len()
    }

    fn num_events(&self) -> usize {
        self.batches.iter().map(|b| b.num_events).sum()
    }

    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<EventBatch, DataError>> + '_> {
        Box::new(self.batches.iter().cloned().map(Ok))
    }

    fn source_name(&self, id: usize) -> String {
        self.names
            .get(id)
            .cloned()
            .unwrap_or_else(|| format!("source #{id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    fn record(n: usize, signal: usize, with_props: bool) -> EventRecord {
        EventRecord {
            x: (0..n).map(|i| vec![i as f32, 1.0]).collect(),
            y: (0..n).map(|i| if i < signal { 1 } else { 0 }).collect(),
            truth_cluster_props: with_props.then(|| (0..n).map(|_| vec![5.0, 0.5, -0.5]).collect()),
        }
    }

    fn write_dataset(dir: &Path, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("event_{i:03}.json"));
                write_event(&path, &record(4 + i, 2, true)).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_event_validation() {
        let path = Path::new("bad.json");
        let mut rec = record(3, 1, false);
        rec.y.pop();
        assert!(matches!(Event::from_record(rec, path), Err(DataError::Malformed { .. })));

        let mut rec = record(3, 1, false);
        rec.x[1].push(9.0);
        assert!(matches!(Event::from_record(rec, path), Err(DataError::Malformed { .. })));

        let event = Event::from_record(record(3, 1, true), path).unwrap();
        assert_eq!(event.input_dim, 2);
        assert_eq!(event.prop_dim, 3);
        assert_eq!(event.x.len(), 6);
    }

    #[test]
    fn test_reduce_noise_keeps_signal() {
        let mut event = Event::from_record(record(12, 2, true), Path::new("e.json")).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        event.reduce_noise(0.7, &mut rng);

        // 10 noise points, floor(7.0) dropped
        assert_eq!(event.num_points(), 5);
        assert_eq!(event.y.iter().filter(|&&y| y > 0).count(), 2);
        assert_eq!(event.x.len(), 5 * 2);
        assert_eq!(event.truth_cluster_props.as_ref().unwrap().len(), 5 * 3);
    }

    #[test]
    fn test_collate_builds_index_vectors() {
        let path = Path::new("e.json");
        let a = Event::from_record(record(2, 1, false), path).unwrap();
        let b = Event::from_record(record(3, 1, false), path).unwrap();

        let batch = EventBatch::collate(&[(7, a), (2, b)]).unwrap();
        assert_eq!(batch.num_events, 2);
        assert_eq!(batch.batch, vec![0, 0, 1, 1, 1]);
        assert_eq!(batch.inpz, vec![7, 7, 2, 2, 2]);
        assert_eq!(batch.source_ids(), vec![7, 2]);
        assert!(batch.truth_cluster_props.is_none());

        let tensors = batch.to_device::<TestBackend>(&Default::default());
        assert_eq!(tensors.x.dims(), [5, 2]);
        assert_eq!(tensors.batch.dims(), [5]);
    }

    #[test]
    fn test_collate_rejects_mixed_props() {
        let path = Path::new("e.json");
        let a = Event::from_record(record(2, 1, true), path).unwrap();
        let b = Event::from_record(record(2, 1, false), path).unwrap();
        assert!(matches!(EventBatch::collate(&[(0, a), (1, b)]), Err(DataError::Collate(_))));
        assert!(EventBatch::collate(&[]).is_err());
    }

    #[test]
    fn test_collate_zero_hit_event_first() {
        let path = Path::new("e.json");
        let empty = Event::from_record(record(0, 0, true), path).unwrap();
        let full = Event::from_record(record(2, 1, true), path).unwrap();
        assert_eq!((empty.input_dim, empty.prop_dim), (0, 0));

        let batch = EventBatch::collate(&[(0, empty.clone()), (1, full.clone())]).unwrap();
        assert_eq!(batch.input_dim, 2);
        assert_eq!(batch.prop_dim, 3);
        assert_eq!(batch.num_points(), 2);
        assert_eq!(batch.batch, vec![1, 1]);
        assert_eq!(batch.truth_cluster_props.as_ref().map(Vec::len), Some(6));

        let reversed = EventBatch::collate(&[(1, full), (0, empty)]).unwrap();
        assert_eq!((reversed.input_dim, reversed.prop_dim), (2, 3));
        assert_eq!(reversed.batch, vec![0, 0]);
    }

    #[test]
    fn test_dataset_dir_blacklist_split() {
        let tmp = TempDir::new().unwrap();
        let files = write_dataset(tmp.path(), 10);
        std::fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let mut dataset = EventDataset::from_dir(tmp.path()).unwrap();
        assert_eq!(dataset.len(), 10);
        assert_eq!(dataset.files(), files.as_slice());

        let removed = dataset.blacklist(&[files[3].clone(), PathBuf::from("event_005.json")]);
        assert_eq!(removed, 2);
        assert_eq!(dataset.len(), 8);

        let (train, test) = dataset.split(0.8);
        assert_eq!(train.len(), 6);
        assert_eq!(test.len(), 2);

        let (tiny, _) = train.split(0.005);
        assert_eq!(tiny.len(), 1);
    }

    #[test]
    fn test_empty_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(EventDataset::from_dir(tmp.path()), Err(DataError::Empty(_))));
    }

    #[test]
    fn test_loader_batches_cover_dataset() {
        let tmp = TempDir::new().unwrap();
        write_dataset(tmp.path(), 5);
        let dataset = EventDataset::from_dir(tmp.path()).unwrap();
        let mut loader = EventLoader::new(dataset, 2).with_shuffle(11);

        assert_eq!(loader.num_batches(), 3);
        assert_eq!(loader.num_events(), 5);

        let batches: Vec<EventBatch> = loader.batches().collect::<Result<_, _>>().unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].num_events, 1);

        let mut seen: Vec<usize> = batches.iter().flat_map(|b| b.source_ids()).collect();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert!(loader.source_name(4).ends_with("event_004.json"));
    }

    #[test]
    fn test_loader_reports_bad_file() {
        let tmp = TempDir::new().unwrap();
        write_dataset(tmp.path(), 2);
        std::fs::write(tmp.path().join("event_999.json"), "{not json").unwrap();
        let dataset = EventDataset::from_dir(tmp.path()).unwrap();
        let mut loader = EventLoader::new(dataset, 3);

        let result: Result<Vec<EventBatch>, DataError> = loader.batches().collect();
        assert!(matches!(result, Err(DataError::Json { .. })));
    }

    #[test]
    fn test_noise_reduction_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("event.json");
        write_event(&path, &record(20, 3, false)).unwrap();
        let dataset = EventDataset::from_files(vec![path]).with_reduce_noise(Some(0.5));

        let a = dataset.load(0).unwrap();
        let b = dataset.load(0).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.num_points(), 3 + 9);
    }
}
