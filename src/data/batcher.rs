// ============================================================
// Layer 4 - Multi-Label Batcher
// ============================================================
// Implements Burn's Batcher trait: stacks a Vec<Sample> into
// dense tensors for one forward pass.
//
//   Input:  N samples, F features, C classes each
//   Output: inputs  [N, F]   float
//           targets [N, C]   float in {-1, 0, 1}
//
// The sample ids and a host copy of the targets travel with the
// batch. Validation needs both to aggregate per subject, and with
// several loader workers batches may arrive in any order, so the
// ids cannot be reconstructed from positions.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::domain::sample::Sample;

#[derive(Debug, Clone)]
pub struct MultiLabelBatch<B: Backend> {
    /// Features, shape [batch_size, num_features]
    pub inputs: Tensor<B, 2>,

    /// Targets, shape [batch_size, num_classes]
    pub targets: Tensor<B, 2>,

    /// Row-major copy of `targets`
    pub target_values: Vec<f32>,

    /// Sample id of every row
    pub ids: Vec<String>,
}

impl<B: Backend> MultiLabelBatch<B> {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Holds the device the batch tensors are created on.
#[derive(Clone, Debug)]
pub struct MultiLabelBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> MultiLabelBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<Sample, MultiLabelBatch<B>> for MultiLabelBatcher<B> {
    fn batch(&self, items: Vec<Sample>) -> MultiLabelBatch<B> {
        let batch_size   = items.len();
        let num_features = items.first().map_or(0, |s| s.features.len());
        let num_classes  = items.first().map_or(0, |s| s.targets.len());

        let feature_flat: Vec<f32> = items
            .iter()
            .flat_map(|s| s.features.iter().copied())
            .collect();
        let target_values: Vec<f32> = items
            .iter()
            .flat_map(|s| s.targets.iter().copied())
            .collect();

        let inputs = Tensor::<B, 2>::from_data(
            TensorData::new(feature_flat, [batch_size, num_features]),
            &self.device,
        );
        let targets = Tensor::<B, 2>::from_data(
            TensorData::new(target_values.clone(), [batch_size, num_classes]),
            &self.device,
        );

        MultiLabelBatch {
            inputs,
            targets,
            target_values,
            ids: items.into_iter().map(|s| s.id).collect(),
        }
    }
}
