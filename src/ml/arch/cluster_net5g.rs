// ============================================================
// Layer 5 — ClusterNet5g (IIC, residual trunk)
// ============================================================
// ResNet-style trunk with the same two head groups as ClusterNet:
//
//   x [B, C, H, W]
//     │  Conv 3×3 → BatchNorm → ReLU → MaxPool 3×3 / 2
//     │  stage 1: blocks[0] × BasicBlock(widths[0])        stride 1
//     │  stage i: blocks[i] × BasicBlock(widths[i])        stride 2
//     ▼
//   AdaptiveAvgPool → features [B, widths.last()]
//     │
//     ├── head A: num_sub_heads × Linear(→ output_k_a)
//     └── head B: num_sub_heads × Linear(→ output_k_b)
//
// The defaults ([3, 4, 6, 3] blocks of 64..512 channels) give the
// ResNet-34 layout. Padded 3×3 convolutions never shrink a 1×1
// map, so any input size is accepted.
//
// Reference: Ji et al. (2019) IIC, "5g" architecture; He et al. (2016)

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
pub struct ClusterNet5gConfig {
    pub in_channels:   usize,
    /// Number of over-clusters produced by head A
    pub output_k_a:    usize,
    /// Number of clusters produced by head B
    pub output_k_b:    usize,
    #[config(default = 5)]
    pub num_sub_heads: usize,
    /// Residual blocks per stage
    #[config(default = "vec![3, 4, 6, 3]")]
    pub blocks:        Vec<usize>,
    /// Channels per stage
    #[config(default = "vec![64, 128, 256, 512]")]
    pub widths:        Vec<usize>,
}

fn conv3x3<B: Backend>(channels: [usize; 2], stride: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new(channels, [3, 3])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_bias(false)
        .init(device)
}

impl ClusterNet5gConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ClusterNet5g<B> {
        let stem_width = self.widths.first().copied().unwrap_or(self.in_channels);

        let mut blocks = Vec::new();
        let mut in_channels = stem_width;
        for (stage, (&count, &width)) in self.blocks.iter().zip(&self.widths).enumerate() {
            for i in 0..count {
                let stride = if stage > 0 && i == 0 { 2 } else { 1 };
                blocks.push(BasicBlock::new(in_channels, width, stride, device));
                in_channels = width;
            }
        }

        let feature_dim = in_channels;
        let head = |k: usize| -> Vec<Linear<B>> {
            (0..self.num_sub_heads)
                .map(|_| LinearConfig::new(feature_dim, k).init(device))
                .collect()
        };

        ClusterNet5g {
            stem: conv3x3([self.in_channels, stem_width], 1, device),
            stem_norm: BatchNormConfig::new(stem_width).init(device),
            stem_pool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            blocks,
            gap: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            head_a: head(self.output_k_a),
            head_b: head(self.output_k_b),
        }
    }
}

/// 1×1 projection on the skip path when shape changes
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    pub conv: Conv2d<B>,
    pub norm: BatchNorm<B, 2>,
}

#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    pub conv1:      Conv2d<B>,
    pub norm1:      BatchNorm<B, 2>,
    pub conv2:      Conv2d<B>,
    pub norm2:      BatchNorm<B, 2>,
    pub downsample: Option<Downsample<B>>,
}

impl<B: Backend> BasicBlock<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let downsample = (stride != 1 || in_channels != out_channels).then(|| Downsample {
            conv: Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .init(device),
            norm: BatchNormConfig::new(out_channels).init(device),
        });
        Self {
            conv1: conv3x3([in_channels, out_channels], stride, device),
            norm1: BatchNormConfig::new(out_channels).init(device),
            conv2: conv3x3([out_channels, out_channels], 1, device),
            norm2: BatchNormConfig::new(out_channels).init(device),
            downsample,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(down) => down.norm.forward(down.conv.forward(x.clone())),
            None => x.clone(),
        };
        let out = relu(self.norm1.forward(self.conv1.forward(x)));
        let out = self.norm2.forward(self.conv2.forward(out));
        relu(out + identity)
    }
}

#[derive(Module, Debug)]
pub struct ClusterNet5g<B: Backend> {
    pub stem:      Conv2d<B>,
    pub stem_norm: BatchNorm<B, 2>,
    pub stem_pool: MaxPool2d,
    pub blocks:    Vec<BasicBlock<B>>,
    pub gap:       AdaptiveAvgPool2d,
    pub head_a:    Vec<Linear<B>>,
    pub head_b:    Vec<Linear<B>>,
}

impl<B: Backend> ClusterNet5g<B> {
    /// x: [batch, C, H, W] → features: [batch, widths.last()]
    pub fn features(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = relu(self.stem_norm.forward(self.stem.forward(x)));
        let mut x = self.stem_pool.forward(x);
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.gap.forward(x);
        let [batch, channels, _, _] = x.dims();
        x.reshape([batch, channels])
    }

    pub fn forward(&self, x: Tensor<B, 4>, head: Head) -> Vec<Tensor<B, 2>> {
        let features = self.features(x);
        let heads = match head {
            Head::A => &self.head_a,
            Head::B => &self.head_b,
        };
        heads.iter().map(|linear| linear.forward(features.clone())).collect()
    }
}

impl<B: Backend> MultiHeadNet<B> for ClusterNet5g<B> {
    fn forward_head(&self, x: Tensor<B, 4>, head: Head) -> Vec<Tensor<B, 2>> {
        self.forward(x, head)
    }

    fn num_sub_heads(&self) -> usize {
        self.head_b.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TB = NdArray;

    fn tiny(in_channels: usize) -> ClusterNet5gConfig {
        ClusterNet5gConfig::new(in_channels, 6, 3)
            .with_num_sub_heads(2)
            .with_blocks(vec![1, 2])
            .with_widths(vec![4, 8])
    }

    #[test]
    fn test_head_shapes() {
        let device = Default::default();
        let net: ClusterNet5g<TB> = tiny(1).init(&device);
        let x = Tensor::<TB, 4>::ones([2, 1, 8, 8], &device);

        let a = net.forward(x.clone(), Head::A);
        let b = net.forward(x, Head::B);
        assert_eq!(a.len(), 2);
        assert!(a.iter().all(|t| t.dims() == [2, 6]));
        assert!(b.iter().all(|t| t.dims() == [2, 3]));
        assert_eq!(net.num_sub_heads(), 2);
    }

    #[test]
    fn test_block_layout() {
        let device = Default::default();
        let net: ClusterNet5g<TB> = tiny(3).init(&device);
        assert_eq!(net.blocks.len(), 3);
        // first block keeps width and stride, the stage change projects
        assert!(net.blocks[0].downsample.is_none());
        assert!(net.blocks[1].downsample.is_some());
        assert!(net.blocks[2].downsample.is_none());
    }

    #[test]
    fn test_single_pixel_input() {
        let device = Default::default();
        let net: ClusterNet5g<TB> = tiny(3).init(&device);
        let x = Tensor::<TB, 4>::zeros([1, 3, 1, 1], &device);
        assert_eq!(net.features(x).dims(), [1, 8]);
    }
}
