// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands and their flags:
//
//   train    — fit an IIC or IMSAT model on an image folder
//   evaluate — score a saved run
//   dataset  — inspect a PROSTATE / ACDC segmentation dataset
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::train_use_case::{DeviceKind, Method, TrainConfig};
use crate::data::segmentation::{SegmentationPreset, SplitMode};
use crate::infra::checkpoint::CheckpointTag;
use crate::ml::{
    arch::IicBackbone,
    iic_trainer::IicSettings,
    imsat_trainer::ImsatSettings,
    loss::Distance,
    scheduler::LrSchedule,
};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a clustering model on a class-per-directory image folder
    Train(TrainArgs),

    /// Report the Hungarian accuracy of a saved run
    Evaluate(EvaluateArgs),

    /// Summarise a segmentation dataset
    Dataset(DatasetArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Clustering method: iic or imsat
    #[arg(long, default_value = "iic")]
    pub method: Method,

    /// IIC trunk: 6c (VGG-style) or 5g (residual)
    #[arg(long, default_value = "6c")]
    pub backbone: IicBackbone,

    /// Image folder, one sub-directory per class
    #[arg(long, default_value = "data/images")]
    pub data_dir: String,

    /// Run directory for checkpoints, meters and config.json
    #[arg(long, default_value = "runs/default")]
    pub save_dir: String,

    /// Resume from the `last` checkpoint of this run directory
    #[arg(long)]
    pub checkpoint: Option<String>,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    /// Multiply the learning rate by --lr-gamma every N epochs (0 keeps it constant)
    #[arg(long, default_value_t = 0)]
    pub lr_step: usize,

    #[arg(long, default_value_t = 0.5)]
    pub lr_gamma: f64,

    /// Images are resized to image_size × image_size
    #[arg(long, default_value_t = 32)]
    pub image_size: usize,

    /// 1 (grayscale) or 3 (RGB)
    #[arg(long, default_value_t = 1)]
    pub channels: usize,

    #[arg(long, default_value_t = 10)]
    pub num_clusters: usize,

    /// Size of the IIC over-clustering head
    #[arg(long, default_value_t = 50)]
    pub overcluster_k: usize,

    /// Sub-heads per IIC head group
    #[arg(long, default_value_t = 5)]
    pub sub_heads: usize,

    /// Passes with IIC head A per epoch
    #[arg(long, default_value_t = 1)]
    pub head_a_epochs: usize,

    /// Passes with IIC head B per epoch
    #[arg(long, default_value_t = 2)]
    pub head_b_epochs: usize,

    /// IIC entropy weight λ
    #[arg(long, default_value_t = 1.0)]
    pub lambda: f64,

    /// IMSAT hidden layer width
    #[arg(long, default_value_t = 1200)]
    pub hidden_dim: usize,

    /// IMSAT marginal entropy weight
    #[arg(long, default_value_t = 4.0)]
    pub mu: f64,

    /// IMSAT self-augmentation weight
    #[arg(long, default_value_t = 0.1)]
    pub sat_weight: f64,

    /// IMSAT self-augmentation distance: kl or js
    #[arg(long, default_value = "kl")]
    pub distance: Distance,

    #[arg(long, default_value_t = 0.2)]
    pub val_fraction: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,

    /// wgpu or cpu
    #[arg(long, default_value = "wgpu")]
    pub device: DeviceKind,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        let schedule = if a.lr_step == 0 {
            LrSchedule::Constant
        } else {
            LrSchedule::Step { step_size: a.lr_step, gamma: a.lr_gamma }
        };
        TrainConfig {
            method:        a.method,
            backbone:      a.backbone,
            data_dir:      a.data_dir,
            save_dir:      a.save_dir,
            checkpoint:    a.checkpoint,
            epochs:        a.epochs,
            batch_size:    a.batch_size,
            lr:            a.lr,
            image_size:    a.image_size,
            channels:      a.channels,
            num_clusters:  a.num_clusters,
            overcluster_k: a.overcluster_k,
            sub_heads:     a.sub_heads,
            hidden_dim:    a.hidden_dim,
            val_fraction:  a.val_fraction,
            seed:          a.seed,
            num_workers:   a.num_workers,
            device:        a.device,
            iic: IicSettings {
                head_a_epochs: a.head_a_epochs,
                head_b_epochs: a.head_b_epochs,
                lambda:        a.lambda,
            },
            imsat: ImsatSettings {
                mu:         a.mu,
                sat_weight: a.sat_weight,
                distance:   a.distance,
            },
            schedule,
            ..TrainConfig::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Run directory written by `train`
    #[arg(long)]
    pub save_dir: String,

    /// Image folder to score on (defaults to the training folder)
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Checkpoint to load: best or last
    #[arg(long, default_value = "best")]
    pub tag: CheckpointTag,
}

#[derive(Args, Debug)]
pub struct DatasetArgs {
    /// Directory holding the extracted dataset folder
    #[arg(long)]
    pub root: String,

    /// prostate or acdc
    #[arg(long, default_value = "prostate")]
    pub preset: SegmentationPreset,

    /// train or val
    #[arg(long, default_value = "train")]
    pub mode: SplitMode,

    /// Subfolders to pair (repeatable); defaults to img and gt
    #[arg(long = "subfolder")]
    pub subfolders: Vec<String>,
}
