//! Running metrics of the training loop

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::utils::error::{ClassifierError, Result};

/// Global step counter and the running training loss between reports.
///
/// The running loss is cleared at the start of every epoch and after every
/// report, while the reported value is always divided by the full report
/// interval. A window that straddles an epoch boundary therefore reports
/// only the losses of the new epoch over the whole interval.
#[derive(Debug, Clone)]
pub struct StepTracker {
    report_every: usize,
    step: usize,
    running_loss: f64,
}

impl StepTracker {
    pub fn new(report_every: usize) -> Self {
        Self {
            report_every: report_every.max(1),
            step: 0,
            running_loss: 0.0,
        }
    }

    pub fn begin_epoch(&mut self) {
        self.running_loss = 0.0;
    }

    /// Count one optimization step with its loss. Returns `true` when a
    /// validation report is due.
    pub fn record(&mut self, loss: f64) -> bool {
        self.step += 1;
        self.running_loss += loss;
        self.step % self.report_every == 0
    }

    /// Mean training loss of the interval; clears the running loss
    pub fn take_train_loss(&mut self) -> f64 {
        let loss = self.running_loss / self.report_every as f64;
        self.running_loss = 0.0;
        loss
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn running_loss(&self) -> f64 {
        self.running_loss
    }
}

/// Result of a full pass over an evaluation loader
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    /// Mean of per-batch losses
    pub loss: f64,
    /// Mean of per-batch accuracies
    pub accuracy: f64,
    /// Correct predictions over all samples
    pub pooled_accuracy: f64,
    pub batches: usize,
    pub samples: usize,
}

/// Sums per-batch loss and accuracy over one evaluation pass
#[derive(Debug, Clone, Default)]
pub struct ValidationAccumulator {
    loss_sum: f64,
    accuracy_sum: f64,
    batches: usize,
    correct: usize,
    samples: usize,
}

impl ValidationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one batch: its mean loss, its number of correct predictions and
    /// its size
    pub fn push(&mut self, batch_loss: f64, correct: usize, batch_size: usize) {
        self.loss_sum += batch_loss;
        if batch_size > 0 {
            self.accuracy_sum += correct as f64 / batch_size as f64;
        }
        self.batches += 1;
        self.correct += correct;
        self.samples += batch_size;
    }

    pub fn finish(self) -> Result<ValidationMetrics> {
        if self.batches == 0 {
            return Err(ClassifierError::Training(
                "evaluation loader produced no batches".to_string(),
            ));
        }

        let metrics = ValidationMetrics {
            loss: self.loss_sum / self.batches as f64,
            accuracy: self.accuracy_sum / self.batches as f64,
            pooled_accuracy: self.correct as f64 / self.samples.max(1) as f64,
            batches: self.batches,
            samples: self.samples,
        };

        debug!(
            "evaluation: {} batches, {} samples, batch-mean accuracy {:.4}, pooled accuracy {:.4}",
            metrics.batches, metrics.samples, metrics.accuracy, metrics.pooled_accuracy
        );

        Ok(metrics)
    }
}

/// One interleaved validation report
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricReport {
    /// 1-based epoch
    pub epoch: usize,
    /// Global step at which the report was taken
    pub step: usize,
    pub train_loss: f64,
    pub valid_loss: f64,
    pub valid_accuracy: f64,
    pub pooled_accuracy: f64,
}

impl std::fmt::Display for MetricReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "epochs: {}, Training Loss: {:.3} Valid Loss: {:.3} Valid Accuracy: {:.3}",
            self.epoch, self.train_loss, self.valid_loss, self.valid_accuracy
        )
    }
}
