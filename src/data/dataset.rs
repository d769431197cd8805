use burn::data::dataset::Dataset;

use crate::domain::sample::Sample;

/// In-memory split of labelled samples with fixed dimensions.
#[derive(Debug, Clone)]
pub struct MultiLabelDataset {
    samples:      Vec<Sample>,
    num_features: usize,
    num_classes:  usize,
}

impl MultiLabelDataset {
    /// Dimensions are taken from the first sample; the loader has
    /// already checked that every sample agrees with it.
    pub fn new(samples: Vec<Sample>) -> Self {
        let (num_features, num_classes) = samples
            .first()
            .map_or((0, 0), |s| (s.features.len(), s.targets.len()));
        Self { samples, num_features, num_classes }
    }

    pub fn num_features(&self) -> usize { self.num_features }

    pub fn num_classes(&self) -> usize { self.num_classes }

    pub fn samples(&self) -> &[Sample] { &self.samples }
}

impl Dataset<Sample> for MultiLabelDataset {
    fn get(&self, index: usize) -> Option<Sample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
