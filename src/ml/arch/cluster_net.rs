// ============================================================
// Layer 5 — ClusterNet (IIC)
// ============================================================
// VGG-style convolutional trunk with two groups of heads:
//
//   x [B, C, H, W]
//     │  ConvBlock(3×3, pad 1) → BatchNorm → ReLU   ×N
//     │  MaxPool 2×2 between blocks (skipped once H or W < 2)
//     ▼
//   AdaptiveAvgPool → features [B, widths.last()]
//     │
//     ├── head A: num_sub_heads × Linear(→ output_k_a)   over-clustering
//     └── head B: num_sub_heads × Linear(→ output_k_b)   main clustering
//
// Heads return logits; softmax is applied inside the losses.
//
// Reference: Ji et al. (2019) IIC, "6c" architecture

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

use crate::ml::arch::{Head, MultiHeadNet};

#[derive(Config, Debug)]
pub struct ClusterNetConfig {
    pub in_channels:   usize,
    /// Number of over-clusters produced by head A
    pub output_k_a:    usize,
    /// Number of clusters produced by head B
    pub output_k_b:    usize,
    #[config(default = 5)]
    pub num_sub_heads: usize,
    #[config(default = "vec![32, 64, 128, 256]")]
    pub widths:        Vec<usize>,
}

impl ClusterNetConfig {
    /// Smallest square input that survives every max-pool with at
    /// least one pixel left.
    pub fn min_input_size(&self) -> usize {
        1 << self.widths.len().saturating_sub(1)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ClusterNet<B> {
        let mut blocks = Vec::with_capacity(self.widths.len());
        let mut in_channels = self.in_channels;
        for &width in &self.widths {
            blocks.push(ConvBlock {
                conv: Conv2dConfig::new([in_channels, width], [3, 3])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device),
                norm: BatchNormConfig::new(width).init(device),
            });
            in_channels = width;
        }

        let feature_dim = in_channels;
        let head = |k: usize| -> Vec<Linear<B>> {
            (0..self.num_sub_heads)
                .map(|_| LinearConfig::new(feature_dim, k).init(device))
                .collect()
        };

        ClusterNet {
            blocks,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            gap: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            head_a: head(self.output_k_a),
            head_b: head(self.output_k_b),
        }
    }
}

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub norm: BatchNorm<B, 2>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        relu(self.norm.forward(self.conv.forward(x)))
    }
}

#[derive(Module, Debug)]
pub struct ClusterNet<B: Backend> {
    pub blocks: Vec<ConvBlock<B>>,
    pub pool:   MaxPool2d,
    pub gap:    AdaptiveAvgPool2d,
    pub head_a: Vec<Linear<B>>,
    pub head_b: Vec<Linear<B>>,
}

impl<B: Backend> ClusterNet<B> {
    /// x: [batch, C, H, W] → features: [batch, widths.last()]
    pub fn features(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = x;
        let last = self.blocks.len().saturating_sub(1);
        for (i, block) in self.blocks.iter().enumerate() {
            x = block.forward(x);
            if i < last {
                let [_, _, height, width] = x.dims();
                if height >= 2 && width >= 2 {
                    x = self.pool.forward(x);
                }
            }
        }
        let x = self.gap.forward(x);
        let [batch, channels, _, _] = x.dims();
        x.reshape([batch, channels])
    }

    /// One logits tensor [batch, k] per sub-head of `head`
    pub fn forward(&self, x: Tensor<B, 4>, head: Head) -> Vec<Tensor<B, 2>> {
        let features = self.features(x);
        self.heads(head)
            .iter()
            .map(|linear| linear.forward(features.clone()))
            .collect()
    }

    pub fn heads(&self, head: Head) -> &[Linear<B>] {
        match head {
            Head::A => &self.head_a,
            Head::B => &self.head_b,
        }
    }
}

impl<B: Backend> MultiHeadNet<B> for ClusterNet<B> {
    fn forward_head(&self, x: Tensor<B, 4>, head: Head) -> Vec<Tensor<B, 2>> {
        self.forward(x, head)
    }

    fn num_sub_heads(&self) -> usize {
        self.head_b.len()
    }
}
