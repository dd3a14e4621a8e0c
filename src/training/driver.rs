//! Training loop driver
//!
//! Runs the epoch/batch loop over a model whose backbone is frozen: one Adam
//! step on the head per training batch, and every [`REPORT_EVERY`] steps a
//! full pass over the validation loader that emits a [`MetricReport`].

use burn::data::dataloader::DataLoader;
use burn::module::{AutodiffModule, Module};
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use tracing::debug;

use crate::backend::Placement;
use crate::dataset::ImageBatch;
use crate::model::TransferClassifier;
use crate::training::loss::ClassificationLoss;
use crate::training::metrics::{MetricReport, StepTracker, ValidationAccumulator, ValidationMetrics};
use crate::utils::error::{ClassifierError, Result};
use crate::utils::logging::TrainingLogger;

/// Steps between validation reports
pub const REPORT_EVERY: usize = 10;

/// Training data loader on the autodiff backend
pub type TrainLoader<B> = dyn DataLoader<B, ImageBatch<B>>;
/// Evaluation data loader on the inner backend
pub type EvalLoader<B> = dyn DataLoader<
    <B as AutodiffBackend>::InnerBackend,
    ImageBatch<<B as AutodiffBackend>::InnerBackend>,
>;

/// What a finished run hands back
#[derive(Debug)]
pub struct TrainOutcome<B: AutodiffBackend> {
    pub model: TransferClassifier<B>,
    pub reports: Vec<MetricReport>,
    /// Total optimization steps over all epochs
    pub steps: usize,
}

#[derive(Debug, Clone)]
pub struct TrainingLoop {
    epochs: usize,
    learning_rate: f64,
    report_every: usize,
}

impl TrainingLoop {
    pub fn new(epochs: usize, learning_rate: f64) -> Self {
        Self {
            epochs,
            learning_rate,
            report_every: REPORT_EVERY,
        }
    }

    /// Train the head of `model` and return it with every emitted report.
    ///
    /// `on_report` is called with each report as soon as it is computed.
    pub fn run<B, O, L, F>(
        &self,
        model: TransferClassifier<B>,
        loss_fn: &L,
        optimizer: &mut O,
        train_loader: &TrainLoader<B>,
        valid_loader: &EvalLoader<B>,
        placement: &Placement<B>,
        mut on_report: F,
    ) -> Result<TrainOutcome<B>>
    where
        B: AutodiffBackend,
        O: Optimizer<TransferClassifier<B>, B>,
        L: ClassificationLoss,
        F: FnMut(&MetricReport),
    {
        if self.epochs == 0 {
            return Err(ClassifierError::Training("epochs must be at least 1".to_string()));
        }

        let mut model = model.fork(&placement.device);
        let mut tracker = StepTracker::new(self.report_every);
        let mut reports = Vec::new();
        let mut logger = TrainingLogger::new(self.epochs);

        for epoch in 1..=self.epochs {
            logger.start_epoch(epoch, tracker.step());
            tracker.begin_epoch();

            let mut seen = 0;
            for batch in train_loader.iter() {
                let images = batch.images.to_device(&placement.device);
                let targets = batch.targets.to_device(&placement.device);
                seen += targets.dims()[0];

                // Gradients are produced fresh by each backward pass
                let log_probs = model.forward_train(images);
                let loss = loss_fn.forward(log_probs, targets);
                let loss_value: f64 = loss.clone().into_scalar().elem();

                let mut grads = loss.backward();
                let head_grads = GradientsParams::from_module(&mut grads, &model.head);
                model = optimizer.step(self.learning_rate, model, head_grads);

                if tracker.record(loss_value) {
                    let validation = evaluate(
                        &model.valid(),
                        loss_fn,
                        valid_loader,
                        &placement.eval_device,
                    )?;

                    let report = MetricReport {
                        epoch,
                        step: tracker.step(),
                        train_loss: tracker.take_train_loss(),
                        valid_loss: validation.loss,
                        valid_accuracy: validation.accuracy,
                        pooled_accuracy: validation.pooled_accuracy,
                    };
                    on_report(&report);
                    reports.push(report);
                } else {
                    debug!("step {}: loss {:.4}", tracker.step(), loss_value);
                }
            }

            // The loader stops at the first item it cannot produce
            if seen != train_loader.num_items() {
                return Err(ClassifierError::Training(format!(
                    "training loader ended after {} of {} images in epoch {}",
                    seen,
                    train_loader.num_items(),
                    epoch
                )));
            }

            logger.end_epoch(tracker.step());
        }

        logger.log_complete(tracker.step(), reports.len());

        Ok(TrainOutcome {
            model,
            reports,
            steps: tracker.step(),
        })
    }
}

/// Full pass over `loader` without gradient tracking.
///
/// Loss and accuracy are averaged per batch.
pub fn evaluate<B, L>(
    model: &TransferClassifier<B>,
    loss_fn: &L,
    loader: &dyn DataLoader<B, ImageBatch<B>>,
    device: &B::Device,
) -> Result<ValidationMetrics>
where
    B: Backend,
    L: ClassificationLoss,
{
    let mut accumulator = ValidationAccumulator::new();

    for batch in loader.iter() {
        let images = batch.images.to_device(device);
        let targets = batch.targets.to_device(device);
        let batch_size = targets.dims()[0];

        let log_probs = model.forward(images);
        let loss: f64 = loss_fn
            .forward(log_probs.clone(), targets.clone())
            .into_scalar()
            .elem();

        let predicted = log_probs.argmax(1).flatten::<1>(0, 1);
        let correct: i64 = predicted.equal(targets).int().sum().into_scalar().elem();

        accumulator.push(loss, correct as usize, batch_size);
    }

    accumulator.finish()
}
