//! Small convolutional network for binary X-ray classification
//!
//! Architecture:
//!
//! ```text
//! Image (1 x 150 x 150, raw 0..255)
//!   -> rescale 1/255
//!   -> Conv 3x3 (16) + ReLU -> MaxPool 2x2   (16 x 75 x 75)
//!   -> Conv 3x3 (32) + ReLU -> MaxPool 2x2   (32 x 37 x 37)
//!   -> Conv 3x3 (64) + ReLU -> MaxPool 2x2   (64 x 18 x 18)
//!   -> Dropout(0.4) -> Flatten -> Linear(1)  (logit)
//! ```
//!
//! The network returns logits; apply a sigmoid to get the pneumonia probability.

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::prelude::*;
use burn::tensor::activation::sigmoid;

/// Number of conv + pool stages
const STAGES: usize = 3;

/// Smallest input side that survives every pooling stage
pub const MIN_IMAGE_SIZE: usize = 1 << STAGES;

#[derive(Module, Debug)]
pub struct XRayCnn<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    pool: MaxPool2d,
    dropout: Dropout,
    output: Linear<B>,
    activation: Relu,
}

#[derive(Config, Debug)]
pub struct XRayCnnConfig {
    /// Square input side length
    #[config(default = "150")]
    pub image_size: usize,
    #[config(default = "16")]
    pub conv1_channels: usize,
    #[config(default = "32")]
    pub conv2_channels: usize,
    #[config(default = "64")]
    pub conv3_channels: usize,
    #[config(default = "0.4")]
    pub dropout: f64,
}

impl XRayCnnConfig {
    /// Side length of the feature maps after the last pooling stage
    pub fn pooled_size(&self) -> usize {
        (0..STAGES).fold(self.image_size, |size, _| {
            if size < 2 {
                0
            } else {
                (size - 2) / 2 + 1
            }
        })
    }

    /// Width of the flattened feature vector fed to the output layer
    pub fn flattened_size(&self) -> usize {
        let pooled = self.pooled_size();
        self.conv3_channels * pooled * pooled
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> XRayCnn<B> {
        let conv = |input: usize, output: usize| {
            Conv2dConfig::new([input, output], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init::<B>(device)
        };

        XRayCnn {
            conv1: conv(1, self.conv1_channels),
            conv2: conv(self.conv1_channels, self.conv2_channels),
            conv3: conv(self.conv2_channels, self.conv3_channels),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            output: LinearConfig::new(self.flattened_size(), 1).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> XRayCnn<B> {
    /// `[batch, 1, h, w]` raw intensities to `[batch, 1]` logits
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = images.div_scalar(255.0);

        let x = self.pool.forward(self.activation.forward(self.conv1.forward(x)));
        let x = self.pool.forward(self.activation.forward(self.conv2.forward(x)));
        let x = self.pool.forward(self.activation.forward(self.conv3.forward(x)));
        let x = self.dropout.forward(x);

        let [batch, channels, height, width] = x.dims();
        let x = x.reshape([batch, channels * height * width]);
        self.output.forward(x)
    }

    /// Pneumonia probabilities, `[batch, 1]`
    pub fn forward_probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        sigmoid(self.forward(images))
    }
}
