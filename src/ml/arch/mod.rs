// ============================================================
// Layer 5 — Clustering Architectures
// ============================================================
//   cluster_net.rs   — IIC VGG-style "6c" net with two head groups
//   cluster_net5g.rs — IIC residual "5g" net with the same heads
//   imsat_net.rs     — IMSAT fully connected net
//
// ArchConfig names an architecture together with its
// hyperparameters; it is stored in config.json so that a saved
// run can rebuild exactly the network its weights belong to.

pub mod cluster_net;
pub mod cluster_net5g;
pub mod imsat_net;

use anyhow::{bail, ensure, Result};
use burn::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub use cluster_net::{ClusterNet, ClusterNetConfig};
pub use cluster_net5g::{ClusterNet5g, ClusterNet5gConfig};
pub use imsat_net::{ImsatNet, ImsatNetConfig};

/// Which head group of a ClusterNet to evaluate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Head {
    /// Over-clustering head
    A,
    /// Main clustering head
    B,
}

/// A network with head A / head B groups of sub-heads, as IIC trains.
pub trait MultiHeadNet<B: Backend> {
    /// One logits tensor [batch, k] per sub-head of `head`
    fn forward_head(&self, x: Tensor<B, 4>, head: Head) -> Vec<Tensor<B, 2>>;

    fn num_sub_heads(&self) -> usize;
}

/// Trunk used by the IIC networks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IicBackbone {
    /// VGG-style conv stack (ClusterNet)
    #[default]
    Vgg6c,
    /// ResNet-34 style residual stack (ClusterNet5g)
    Resnet5g,
}

impl FromStr for IicBackbone {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "6c" | "vgg" | "vgg6c" => Ok(Self::Vgg6c),
            "5g" | "resnet" | "resnet5g" => Ok(Self::Resnet5g),
            other => bail!("unknown backbone '{other}' (expected 6c or 5g)"),
        }
    }
}

impl fmt::Display for IicBackbone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vgg6c => "6c",
            Self::Resnet5g => "5g",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ArchConfig {
    ClusterNet(ClusterNetConfig),
    #[serde(rename = "cluster_net5g")]
    ClusterNet5g(ClusterNet5gConfig),
    Imsat(ImsatNetConfig),
}

impl ArchConfig {
    /// Number of clusters the evaluated head produces
    pub fn num_clusters(&self) -> usize {
        match self {
            Self::ClusterNet(c) => c.output_k_b,
            Self::ClusterNet5g(c) => c.output_k_b,
            Self::Imsat(c) => c.num_clusters,
        }
    }

    /// Smallest square image side the network can reduce without
    /// pooling a single pixel.
    pub fn min_input_size(&self) -> usize {
        match self {
            Self::ClusterNet(c) => c.min_input_size(),
            Self::ClusterNet5g(_) | Self::Imsat(_) => 1,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::ClusterNet(c) => {
                ensure!(c.in_channels > 0, "in_channels must be positive");
                ensure!(c.output_k_a > 1 && c.output_k_b > 1, "heads need at least 2 clusters");
                ensure!(c.num_sub_heads > 0, "at least one sub-head is required");
                ensure!(!c.widths.is_empty(), "at least one conv block is required");
                ensure!(c.widths.iter().all(|&w| w > 0), "conv widths must be positive");
            }
            Self::ClusterNet5g(c) => {
                ensure!(c.in_channels > 0, "in_channels must be positive");
                ensure!(c.output_k_a > 1 && c.output_k_b > 1, "heads need at least 2 clusters");
                ensure!(c.num_sub_heads > 0, "at least one sub-head is required");
                ensure!(
                    !c.widths.is_empty() && c.widths.len() == c.blocks.len(),
                    "one width per residual stage is required ({} widths, {} stages)",
                    c.widths.len(),
                    c.blocks.len()
                );
                ensure!(c.widths.iter().all(|&w| w > 0), "stage widths must be positive");
                ensure!(c.blocks.iter().all(|&n| n > 0), "every stage needs a block");
            }
            Self::Imsat(c) => {
                ensure!(c.input_dim > 0, "input_dim must be positive");
                ensure!(c.num_clusters > 1, "at least 2 clusters are required");
                ensure!(c.hidden_dim > 0, "hidden_dim must be positive");
            }
        }
        Ok(())
    }
}
