//! Classification losses over log-probabilities

use burn::tensor::{backend::Backend, Int, Tensor};

/// A loss computed from log-probabilities and integer targets.
///
/// Implementations return a single-element tensor so the result can be
/// back-propagated directly.
pub trait ClassificationLoss {
    fn forward<B: Backend>(&self, log_probs: Tensor<B, 2>, targets: Tensor<B, 1, Int>)
        -> Tensor<B, 1>;
}

/// Negative log-likelihood, averaged over the batch
#[derive(Debug, Clone, Copy, Default)]
pub struct NllLoss;

impl ClassificationLoss for NllLoss {
    fn forward<B: Backend>(
        &self,
        log_probs: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
    ) -> Tensor<B, 1> {
        let picked = log_probs.gather(1, targets.unsqueeze_dim::<2>(1));
        picked.mean().neg()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{ElementConversion, TensorData};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_nll_picks_target_log_probability() {
        let device = Default::default();
        let log_probs = Tensor::<TestBackend, 2>::from_floats(
            TensorData::new(vec![-0.1f32, -2.0, -3.0, -1.5, -0.5, -4.0], [2, 3]),
            &device,
        );
        let targets =
            Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![0i64, 2], [2]), &device);

        let loss: f64 = NllLoss.forward(log_probs, targets).into_scalar().elem();
        assert!((loss - (0.1 + 4.0) / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_nll_of_confident_correct_prediction_is_small() {
        let device = Default::default();
        let log_probs = Tensor::<TestBackend, 2>::from_floats(
            TensorData::new(vec![0.0f32, -20.0], [1, 2]),
            &device,
        );
        let targets =
            Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![0i64], [1]), &device);

        let loss: f64 = NllLoss.forward(log_probs, targets).into_scalar().elem();
        assert!(loss.abs() < 1e-6);
    }
}
