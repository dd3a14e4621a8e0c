//! Inference on trained checkpoints

pub mod predictor;

pub use predictor::{load_category_names, ClassPrediction, PredictionResult, Predictor};

/// Number of classes shown by `predict` unless `--top_k` says otherwise
pub const DEFAULT_TOP_K: usize = 5;
