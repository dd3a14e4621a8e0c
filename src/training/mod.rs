//! Head fine-tuning: loss, running metrics, the loop driver and the
//! end-to-end session around it.

pub mod driver;
pub mod loss;
pub mod metrics;
pub mod runner;

pub use driver::{evaluate, TrainOutcome, TrainingLoop, REPORT_EVERY};
pub use loss::{ClassificationLoss, NllLoss};
pub use metrics::{MetricReport, StepTracker, ValidationAccumulator, ValidationMetrics};
pub use runner::{PreparedData, TrainingSession, TrainingSummary};
