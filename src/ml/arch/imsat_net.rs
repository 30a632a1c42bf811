// ============================================================
// Layer 5 — IMSAT Network
// ============================================================
// Fully connected clustering network from the IMSAT paper:
//
//   flatten → Linear(d, 1200) → BN → ReLU
//           → Linear(1200, 1200) → BN → ReLU
//           → Linear(1200, k)               logits
//
// Reference: Hu et al. (2017) "Learning Discrete Representations
//            via Information Maximizing Self-Augmented Training"

use burn::{
    nn::{BatchNorm, BatchNormConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::relu,
};

#[derive(Config, Debug)]
pub struct ImsatNetConfig {
    /// Flattened input size C·H·W
    pub input_dim:    usize,
    pub num_clusters: usize,
    #[config(default = 1200)]
    pub hidden_dim:   usize,
}

impl ImsatNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ImsatNet<B> {
        ImsatNet {
            fc1: LinearConfig::new(self.input_dim, self.hidden_dim).init(device),
            bn1: BatchNormConfig::new(self.hidden_dim).init(device),
            fc2: LinearConfig::new(self.hidden_dim, self.hidden_dim).init(device),
            bn2: BatchNormConfig::new(self.hidden_dim).init(device),
            fc3: LinearConfig::new(self.hidden_dim, self.num_clusters).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct ImsatNet<B: Backend> {
    pub fc1: Linear<B>,
    pub bn1: BatchNorm<B, 1>,
    pub fc2: Linear<B>,
    pub bn2: BatchNorm<B, 1>,
    pub fc3: Linear<B>,
}

impl<B: Backend> ImsatNet<B> {
    /// x: [batch, C, H, W] → logits [batch, k]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x: Tensor<B, 2> = x.flatten(1, 3);
        let x = relu(Self::normalize(&self.bn1, self.fc1.forward(x)));
        let x = relu(Self::normalize(&self.bn2, self.fc2.forward(x)));
        self.fc3.forward(x)
    }

    // BatchNorm expects a channel axis followed by at least one spatial axis
    fn normalize(bn: &BatchNorm<B, 1>, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, features] = x.dims();
        bn.forward(x.reshape([batch, features, 1])).reshape([batch, features])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TB = NdArray;

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let net: ImsatNet<TB> = ImsatNetConfig::new(2 * 4 * 4, 10)
            .with_hidden_dim(16)
            .init(&device);
        let x = Tensor::<TB, 4>::ones([3, 2, 4, 4], &device);
        assert_eq!(net.forward(x).dims(), [3, 10]);
    }
}
