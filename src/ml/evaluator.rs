// ============================================================
// Layer 5 - Validation Loop
// ============================================================
// One pass over a validation loader without gradient tracking:
//
//   1. predict probabilities for every batch
//   2. masked BCE loss + thresholded accuracy per batch
//   3. collect (id, prediction, mapped target) rows
//   4. average the rows of each subject (first two id tokens)
//   5. dump the subject table to results/step-{n}-{split}.json.gz
//   6. per-class ROC-AUC over the subjects, mean = performance
//
// Targets are mapped t/2 + 0.5 before aggregation, so only the
// labelled subjects (exactly 0 or 1) enter the AUC.

use anyhow::Result;
use burn::{data::dataloader::DataLoader, prelude::*};
use std::time::Instant;

use crate::data::batcher::MultiLabelBatch;
use crate::domain::{
    aggregation::{aggregate_by_subject, SubjectTable},
    metrics::{accuracy, mean_class_auc, AverageMeter},
    sample::validation_target,
    traits::ScalarSink,
};
use crate::infra::results::ResultStore;
use crate::ml::model::{masked_bce_on_probabilities, narrow_to_classes};
use crate::ml::predictor::Predictor;

/// Where one validation pass reports to.
pub struct ValidationRequest<'a> {
    /// Split name used in result file names ("val", "test", ...)
    pub split:            &'a str,
    /// Summary step and result file step
    pub samples_seen:     usize,
    /// Loader batch size, for the batch count in progress lines
    pub batch_size:       usize,
    pub num_classes:      usize,
    pub print_freq:       usize,
    /// Also write one AUC scalar per class
    pub class_statistics: bool,
    pub results:          Option<&'a ResultStore>,
    pub summary:          Option<&'a mut dyn ScalarSink>,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub loss:       f64,
    pub accuracy:   f64,
    /// Mean of `class_aucs`; the run's performance measure
    pub auc:        f64,
    pub class_aucs: Vec<f64>,
    pub table:      SubjectTable,
}

pub fn validate<B, P>(
    predictor: &P,
    loader:    &dyn DataLoader<MultiLabelBatch<B>>,
    request:   ValidationRequest<'_>,
) -> Result<ValidationReport>
where
    B: Backend,
    P: Predictor<B>,
{
    let mut losses     = AverageMeter::new();
    let mut accuracies = AverageMeter::new();
    let mut batch_time = AverageMeter::new();

    let mut ids:         Vec<String>   = Vec::new();
    let mut predictions: Vec<Vec<f64>> = Vec::new();
    let mut targets:     Vec<Vec<f64>> = Vec::new();

    let num_batches = loader.num_items().div_ceil(request.batch_size.max(1));

    let mut end = Instant::now();
    for (i, batch) in loader.iter().enumerate() {
        if batch.is_empty() {
            continue;
        }
        let n = batch.len();

        let probabilities = narrow_to_classes(predictor.predict(batch.inputs), request.num_classes);
        let targets_t     = narrow_to_classes(batch.targets, request.num_classes);
        let loss = masked_bce_on_probabilities(probabilities.clone(), targets_t)
            .into_scalar()
            .elem::<f64>();

        let [_, width] = probabilities.dims();
        let probs: Vec<f32> = probabilities
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("Cannot read validation outputs: {e:?}"))?;

        let target_width = batch.target_values.len() / n;
        let batch_targets: Vec<f32> = batch
            .target_values
            .chunks(target_width)
            .flat_map(|row| row.iter().take(width).copied())
            .collect();

        losses.update(loss, n);
        accuracies.update(accuracy(&probs, &batch_targets), n);

        for ((id, p_row), t_row) in batch
            .ids
            .into_iter()
            .zip(probs.chunks(width))
            .zip(batch_targets.chunks(width))
        {
            ids.push(id);
            predictions.push(p_row.iter().map(|&p| p as f64).collect());
            targets.push(t_row.iter().map(|&t| validation_target(t)).collect());
        }

        batch_time.update(end.elapsed().as_secs_f64(), 1);
        end = Instant::now();

        if i % request.print_freq == 0 {
            tracing::info!(
                "{}: [{}/{}]\tTime {:.3} ({:.3})\tLoss {:.4} ({:.4})\tAccuracy {:.3} ({:.3})",
                request.split, i, num_batches, batch_time.val, batch_time.avg, losses.val, losses.avg,
                accuracies.val, accuracies.avg,
            );
        }
    }

    let table = aggregate_by_subject(&ids, &predictions, &targets);
    tracing::debug!("{} samples grouped into {} subjects", ids.len(), table.len());

    if let Some(store) = request.results {
        store.save(request.samples_seen, request.split, &table)?;
    }

    let (class_aucs, auc) = mean_class_auc(&table, request.num_classes);

    if let Some(summary) = request.summary {
        let step = request.samples_seen;
        summary.add_scalar("Loss", losses.avg, step)?;
        summary.add_scalar("Accuracy", accuracies.avg, step)?;
        summary.add_scalar("AUC", auc, step)?;
        if request.class_statistics {
            for (c, class_auc) in class_aucs.iter().enumerate() {
                summary.add_scalar(&format!("Tasks/Task_{c}_AUC"), *class_auc, step)?;
            }
        }
    }

    tracing::info!(" * Accuracy {:.3}\tAUC {:.3}", accuracies.avg, auc);

    Ok(ValidationReport {
        loss: losses.avg,
        accuracy: accuracies.avg,
        auc,
        class_aucs,
        table,
    })
}
