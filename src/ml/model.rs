use burn::{
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation,
};

/// Clamp applied to probabilities before taking logarithms.
const PROB_EPS: f64 = 1e-7;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally - do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    pub num_features: usize,
    pub num_classes:  usize,
    /// Width of each hidden layer, input side first
    #[config(default = "vec![256, 128]")]
    pub hidden:       Vec<usize>,
    #[config(default = 0.2)]
    pub dropout:      f64,
}

impl ClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> MultiLabelClassifier<B> {
        let mut hidden = Vec::with_capacity(self.hidden.len());
        let mut width  = self.num_features;
        for &next in &self.hidden {
            hidden.push(LinearConfig::new(width, next).init(device));
            width = next;
        }
        let output  = LinearConfig::new(width, self.num_classes).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        MultiLabelClassifier {
            hidden,
            output,
            dropout,
            num_classes: self.num_classes,
        }
    }
}

/// Feed-forward network with one independent logit per class.
#[derive(Module, Debug)]
pub struct MultiLabelClassifier<B: Backend> {
    pub hidden:      Vec<Linear<B>>,
    pub output:      Linear<B>,
    pub dropout:     Dropout,
    pub num_classes: usize,
}

impl<B: Backend> MultiLabelClassifier<B> {
    /// inputs: [batch, num_features] → logits: [batch, num_classes]
    pub fn forward(&self, inputs: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = inputs;
        for layer in &self.hidden {
            x = self.dropout.forward(activation::relu(layer.forward(x)));
        }
        self.output.forward(x)
    }

    /// Sigmoid class probabilities, [batch, num_classes].
    pub fn probabilities(&self, inputs: Tensor<B, 2>) -> Tensor<B, 2> {
        let logits = narrow_to_classes(self.forward(inputs), self.num_classes);
        activation::sigmoid(logits)
    }

    /// Masked BCE loss over labelled targets plus the class logits.
    pub fn forward_loss(
        &self,
        inputs:  Tensor<B, 2>,
        targets: Tensor<B, 2>,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = narrow_to_classes(self.forward(inputs), self.num_classes);
        let loss   = masked_bce_with_logits(logits.clone(), targets);
        (loss, logits)
    }
}

/// Keep the first `num_classes` output columns.
pub fn narrow_to_classes<B: Backend>(output: Tensor<B, 2>, num_classes: usize) -> Tensor<B, 2> {
    let [batch, width] = output.dims();
    if width > num_classes {
        output.slice([0..batch, 0..num_classes])
    } else {
        output
    }
}

/// 1 where a target is labelled (±1), 0 where it is unknown.
fn label_mask<B: Backend>(targets: &Tensor<B, 2>) -> Tensor<B, 2> {
    targets.clone().abs()
}

/// {-1, 0, 1} → {0, 0.5, 1}
fn binary_targets<B: Backend>(targets: Tensor<B, 2>) -> Tensor<B, 2> {
    targets.add_scalar(1.0).div_scalar(2.0)
}

fn masked_mean<B: Backend>(per_entry: Tensor<B, 2>, mask: Tensor<B, 2>) -> Tensor<B, 1> {
    let total = (per_entry * mask.clone()).sum();
    let count = mask.sum().clamp_min(1.0);
    total / count
}

/// Binary cross-entropy from logits, averaged over labelled entries.
///
/// Uses max(x, 0) - x * y + ln(1 + e^-|x|) which stays finite for
/// large logits.
pub fn masked_bce_with_logits<B: Backend>(
    logits:  Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let mask = label_mask(&targets);
    let y    = binary_targets(targets);

    let per_entry = activation::relu(logits.clone())
        - logits.clone() * y
        + logits.abs().neg().exp().add_scalar(1.0).log();

    masked_mean(per_entry, mask)
}

/// Binary cross-entropy on probabilities, averaged over labelled entries.
pub fn masked_bce_on_probabilities<B: Backend>(
    probabilities: Tensor<B, 2>,
    targets:       Tensor<B, 2>,
) -> Tensor<B, 1> {
    let mask = label_mask(&targets);
    let y    = binary_targets(targets);
    let p    = probabilities.clamp(PROB_EPS, 1.0 - PROB_EPS);

    let positive = y.clone() * p.clone().log();
    let negative = y.neg().add_scalar(1.0) * p.neg().add_scalar(1.0).log();
    let per_entry = (positive + negative).neg();

    masked_mean(per_entry, mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    fn tensor(values: Vec<f32>, shape: [usize; 2]) -> Tensor<TestBackend, 2> {
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f64 {
        t.into_scalar().elem::<f64>()
    }

    #[test]
    fn test_forward_shapes() {
        let cfg = ClassifierConfig::new(6, 3).with_hidden(vec![8, 4]).with_dropout(0.0);
        let model = cfg.init::<TestBackend>(&Default::default());
        assert_eq!(model.hidden.len(), 2);

        let inputs = Tensor::<TestBackend, 2>::zeros([5, 6], &Default::default());
        assert_eq!(model.forward(inputs.clone()).dims(), [5, 3]);

        let probs: Vec<f32> = model.probabilities(inputs).into_data().to_vec().unwrap();
        assert!(probs.iter().all(|p| *p > 0.0 && *p < 1.0));
    }

    #[test]
    fn test_no_hidden_layers() {
        let cfg = ClassifierConfig::new(4, 2).with_hidden(vec![]);
        let model = cfg.init::<TestBackend>(&Default::default());
        let out = model.forward(Tensor::zeros([1, 4], &Default::default()));
        assert_eq!(out.dims(), [1, 2]);
    }

    #[test]
    fn test_zero_logits_give_ln2() {
        let logits  = tensor(vec![0.0; 4], [2, 2]);
        let targets = tensor(vec![1.0, -1.0, 1.0, -1.0], [2, 2]);
        let loss = scalar(masked_bce_with_logits(logits, targets));
        assert!((loss - std::f64::consts::LN_2).abs() < 1e-5, "{loss}");
    }

    #[test]
    fn test_unknown_labels_are_masked() {
        // The second column is unknown; a huge wrong logit there must not matter
        let logits  = tensor(vec![0.0, -50.0], [1, 2]);
        let targets = tensor(vec![1.0, 0.0], [1, 2]);
        let loss = scalar(masked_bce_with_logits(logits, targets));
        assert!((loss - std::f64::consts::LN_2).abs() < 1e-5, "{loss}");
    }

    #[test]
    fn test_all_unknown_gives_zero_loss() {
        let logits  = tensor(vec![3.0, -2.0], [1, 2]);
        let targets = tensor(vec![0.0, 0.0], [1, 2]);
        assert_eq!(scalar(masked_bce_with_logits(logits, targets)), 0.0);
    }

    #[test]
    fn test_probability_loss_matches_logit_loss() {
        let logits  = tensor(vec![2.0, -1.0, 0.5, 0.0], [2, 2]);
        let targets = tensor(vec![1.0, -1.0, -1.0, 1.0], [2, 2]);
        let from_logits = scalar(masked_bce_with_logits(logits.clone(), targets.clone()));
        let from_probs  = scalar(masked_bce_on_probabilities(activation::sigmoid(logits), targets));
        assert!((from_logits - from_probs).abs() < 1e-4, "{from_logits} vs {from_probs}");
    }

    #[test]
    fn test_narrow_to_classes() {
        let wide = tensor(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]);
        let narrow = narrow_to_classes(wide, 2);
        let values: Vec<f32> = narrow.into_data().to_vec().unwrap();
        assert_eq!(values, vec![1.0, 2.0, 4.0, 5.0]);
    }
}
