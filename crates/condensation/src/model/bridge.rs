//! Tensor bridge: conversions between host-side point data (`Vec<f32>`,
//! `Vec<i64>`) and burn tensors.
//!
//! Loaders and loss bookkeeping work on flat host buffers; the model and the
//! differentiable losses need `Tensor<B, _>` values on a device.

use burn::prelude::*;
use burn::tensor::TensorData;

/// Convert a row-major `(rows, cols)` buffer into a 2D float tensor.
///
/// # Panics
/// Panics if `values.len() != rows * cols`.
pub fn rows_to_tensor<B: Backend>(
    values: &[f32],
    rows: usize,
    cols: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    assert_eq!(
        values.len(),
        rows * cols,
        "buffer has {} values, expected {rows}x{cols}",
        values.len()
    );
    Tensor::from_data(TensorData::new(values.to_vec(), [rows, cols]), device)
}

/// Convert a slice of integer labels into a 1D int tensor.
pub fn labels_to_tensor<B: Backend>(labels: &[i64], device: &B::Device) -> Tensor<B, 1, Int> {
    Tensor::from_data(TensorData::new(labels.to_vec(), [labels.len()]), device)
}

/// Extract f32 values from a float tensor of any rank, in row-major order.
///
/// Elements are cast one by one, so the length always matches the tensor
/// whatever the backend's float type.
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().iter::<f32>().collect()
}

/// Extract integer values from a 1D int tensor.
pub fn int_tensor_to_vec<B: Backend>(tensor: Tensor<B, 1, Int>) -> Vec<i64> {
    tensor.into_data().iter::<i64>().collect()
}

/// Number of events encoded in a batch-index vector (`max + 1`, 0 if empty).
pub fn count_events(batch_index: &[i64]) -> usize {
    batch_index
        .iter()
        .copied()
        .max()
        .map(|m| (m.max(-1) + 1) as usize)
        .unwrap_or(0)
}

/// Group point indices by event: `groups[e]` lists the rows with
/// `batch_index == e`, in order.
pub fn rows_by_event(batch_index: &[i64], num_events: usize) -> Vec<Vec<usize>> {
    let mut groups = vec![Vec::new(); num_events];
    for (row, &event) in batch_index.iter().enumerate() {
        if event >= 0 && (event as usize) < num_events {
            groups[event as usize].push(row);
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_rows_round_trip() {
        let device = Default::default();
        let values = vec![1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0];

        let tensor = rows_to_tensor::<TestBackend>(&values, 2, 3, &device);
        assert_eq!(tensor.dims(), [2, 3]);

        let row1 = tensor_to_vec(tensor.slice([1..2, 0..3]));
        assert_eq!(row1, vec![4.0, 5.0, 6.0]);
    }

    #[test]
    #[should_panic]
    fn test_rows_wrong_length() {
        let device = Default::default();
        let _ = rows_to_tensor::<TestBackend>(&[1.0, 2.0, 3.0], 2, 2, &device);
    }

    #[test]
    fn test_labels_round_trip() {
        let device = Default::default();
        let labels = vec![0_i64, 3, 3, 7];
        let tensor = labels_to_tensor::<TestBackend>(&labels, &device);
        assert_eq!(tensor.dims(), [4]);
        assert_eq!(int_tensor_to_vec(tensor), labels);
    }

    #[test]
    fn test_reads_narrow_element_types() {
        type NarrowBackend = NdArray<f64, i32>;
        let device = Default::default();

        let labels = labels_to_tensor::<NarrowBackend>(&[2, 0, 5], &device);
        assert_eq!(int_tensor_to_vec(labels), vec![2, 0, 5]);

        let values = rows_to_tensor::<NarrowBackend>(&[0.5, -1.0, 2.0, 4.0], 2, 2, &device);
        assert_eq!(tensor_to_vec(values), vec![0.5, -1.0, 2.0, 4.0]);
    }

    #[test]
    fn test_event_grouping() {
        let batch = [0_i64, 0, 1, 1, 1, 2];
        assert_eq!(count_events(&batch), 3);
        assert_eq!(count_events(&[]), 0);

        let groups = rows_by_event(&batch, 3);
        assert_eq!(groups, vec![vec![0, 1], vec![2, 3, 4], vec![5]]);
    }
}
