//! Trainable classification head

use burn::{
    config::Config,
    module::Module,
    nn::{Dropout, DropoutConfig, Linear, LinearConfig, Relu},
    tensor::{activation::log_softmax, backend::Backend, Tensor},
};

/// Configuration for the classification head
#[derive(Config, Debug)]
pub struct HeadConfig {
    /// Backbone feature vector length
    pub in_features: usize,
    pub hidden_units: usize,
    pub num_classes: usize,

    #[config(default = "0.5")]
    pub dropout: f64,
}

impl HeadConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ClassifierHead<B> {
        ClassifierHead {
            fc1: LinearConfig::new(self.in_features, self.hidden_units).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            relu: Relu::new(),
            fc2: LinearConfig::new(self.hidden_units, self.num_classes).init(device),
            num_classes: self.num_classes,
        }
    }
}

/// Linear -> Dropout -> ReLU -> Linear -> log-softmax
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    fc1: Linear<B>,
    dropout: Dropout,
    relu: Relu,
    fc2: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> ClassifierHead<B> {
    /// Features `[batch, in_features]` to log-probabilities `[batch, classes]`
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.fc1.forward(features);
        let x = self.dropout.forward(x);
        let x = self.relu.forward(x);
        log_softmax(self.fc2.forward(x), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}
