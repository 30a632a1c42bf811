// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a clustering run in order:
//
//   Step 1: Validate the configuration
//   Step 2: Load the image folder           (Layer 4 - data)
//   Step 3: Split train/validation          (Layer 4 - data)
//   Step 4: Build Burn datasets             (Layer 4 - data)
//   Step 5: Save config.json                (Layer 6 - infra)
//   Step 6: Pick a backend and train        (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{bail, ensure, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    optim::AdamConfig,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr, sync::Arc};

use crate::data::{
    augment::{AugmentConfig, Augmenter},
    batcher::{ClusterBatch, ClusterBatcher},
    dataset::ClusterDataset,
    loader::ImageFolder,
    splitter::split_train_val,
};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    arch::{ArchConfig, ClusterNet5gConfig, ClusterNetConfig, IicBackbone, ImsatNetConfig, MultiHeadNet},
    iic_trainer::{self, IicSettings, IicTrainer},
    imsat_trainer::{self, ImsatSettings, ImsatTrainer},
    model::ClusteringModel,
    scheduler::LrSchedule,
    trainer::{ClusteringTrainer, TrainerState},
};

// ─── Method / Device ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Iic,
    Imsat,
}

impl FromStr for Method {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "iic" => Ok(Self::Iic),
            "imsat" => Ok(Self::Imsat),
            other => bail!("unknown method '{other}' (expected iic or imsat)"),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Iic => "iic",
            Self::Imsat => "imsat",
        })
    }
}

/// Compute device for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// GPU through WGPU
    Wgpu,
    /// CPU through ndarray
    Cpu,
}

impl FromStr for DeviceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "wgpu" | "gpu" => Ok(Self::Wgpu),
            "cpu" | "ndarray" => Ok(Self::Cpu),
            other => bail!("unknown device '{other}' (expected wgpu or cpu)"),
        }
    }
}

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a run. Saved to config.json (inside
// RunConfig) so that `evaluate` can rebuild the same network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub method:        Method,
    /// Trunk of the IIC network
    #[serde(default)]
    pub backbone:      IicBackbone,
    pub data_dir:      String,
    pub save_dir:      String,
    /// Run directory to resume from
    pub checkpoint:    Option<String>,
    pub epochs:        usize,
    pub batch_size:    usize,
    pub lr:            f64,
    pub image_size:    usize,
    pub channels:      usize,
    pub num_clusters:  usize,
    /// Over-clustering head size (IIC head A)
    pub overcluster_k: usize,
    pub sub_heads:     usize,
    /// IMSAT hidden layer width
    pub hidden_dim:    usize,
    pub val_fraction:  f64,
    pub seed:          u64,
    pub num_workers:   usize,
    pub device:        DeviceKind,
    pub iic:           IicSettings,
    pub imsat:         ImsatSettings,
    pub schedule:      LrSchedule,
    pub augment:       AugmentConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            method:        Method::Iic,
            backbone:      IicBackbone::Vgg6c,
            data_dir:      "data/images".to_string(),
            save_dir:      "runs/default".to_string(),
            checkpoint:    None,
            epochs:        10,
            batch_size:    64,
            lr:            1e-4,
            image_size:    32,
            channels:      1,
            num_clusters:  10,
            overcluster_k: 50,
            sub_heads:     5,
            hidden_dim:    1200,
            val_fraction:  0.2,
            seed:          42,
            num_workers:   1,
            device:        DeviceKind::Wgpu,
            iic:           IicSettings::default(),
            imsat:         ImsatSettings::default(),
            schedule:      LrSchedule::Constant,
            augment:       AugmentConfig::default(),
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.epochs > 0, "epochs must be positive");
        ensure!(self.batch_size > 0, "batch_size must be positive");
        ensure!(self.image_size > 0, "image_size must be positive");
        ensure!(self.lr > 0.0 && self.lr.is_finite(), "lr must be positive, given {}", self.lr);
        ensure!(
            self.val_fraction > 0.0 && self.val_fraction < 1.0,
            "val_fraction must be in (0, 1), given {}",
            self.val_fraction
        );
        self.schedule.validate()?;

        let arch = self.arch();
        arch.validate()?;
        ensure!(
            self.image_size >= arch.min_input_size(),
            "image_size {} is too small for the {} backbone (needs at least {})",
            self.image_size,
            self.backbone,
            arch.min_input_size()
        );
        Ok(())
    }

    /// Network architecture implied by the method and sizes
    pub fn arch(&self) -> ArchConfig {
        match self.method {
            Method::Iic => match self.backbone {
                IicBackbone::Vgg6c => ArchConfig::ClusterNet(
                    ClusterNetConfig::new(self.channels, self.overcluster_k, self.num_clusters)
                        .with_num_sub_heads(self.sub_heads),
                ),
                IicBackbone::Resnet5g => ArchConfig::ClusterNet5g(
                    ClusterNet5gConfig::new(self.channels, self.overcluster_k, self.num_clusters)
                        .with_num_sub_heads(self.sub_heads),
                ),
            },
            Method::Imsat => ArchConfig::Imsat(
                ImsatNetConfig::new(
                    self.channels * self.image_size * self.image_size,
                    self.num_clusters,
                )
                .with_hidden_dim(self.hidden_dim),
            ),
        }
    }
}

/// What config.json holds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub train:       TrainConfig,
    pub arch:        ArchConfig,
    pub class_names: Vec<String>,
}

impl RunConfig {
    /// Size of the confusion matrices used for scoring
    pub fn num_classes(&self) -> usize {
        self.arch.num_clusters().max(self.class_names.len())
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Run training end to end; returns the best validation score.
    pub fn execute(&self) -> Result<f64> {
        let cfg = &self.config;

        // ── Step 1: Validate ─────────────────────────────────────────────────
        cfg.validate()?;

        // ── Step 2: Load images ──────────────────────────────────────────────
        tracing::info!("Loading images from '{}'", cfg.data_dir);
        let loaded = ImageFolder::new(&cfg.data_dir, cfg.image_size, cfg.channels).load_all()?;
        tracing::info!(
            "Loaded {} images in {} classes",
            loaded.samples.len(),
            loaded.class_names.len()
        );

        // ── Step 3: Train / validation split ─────────────────────────────────
        let (train_samples, val_samples) =
            split_train_val(loaded.samples, 1.0 - cfg.val_fraction, cfg.seed);
        if train_samples.is_empty() || val_samples.is_empty() {
            bail!(
                "split left {} train and {} validation images; add images or change val_fraction",
                train_samples.len(),
                val_samples.len()
            );
        }
        tracing::info!(
            "Split: {} train, {} validation",
            train_samples.len(),
            val_samples.len()
        );

        // ── Step 4: Build Burn datasets ──────────────────────────────────────
        let train_dataset = ClusterDataset::new(train_samples);
        let val_dataset = ClusterDataset::new(val_samples);

        // ── Step 5: Save config for evaluation ───────────────────────────────
        let run = RunConfig {
            train:       cfg.clone(),
            arch:        cfg.arch(),
            class_names: loaded.class_names,
        };
        CheckpointManager::create(&cfg.save_dir)?.save_config(&run)?;

        // ── Step 6: Train on the chosen backend ──────────────────────────────
        let best = match cfg.device {
            DeviceKind::Wgpu => {
                let device = WgpuDevice::default();
                tracing::info!("Using WGPU device: {:?}", device);
                run_training::<Autodiff<Wgpu>>(&run, train_dataset, val_dataset, device)?
            }
            DeviceKind::Cpu => {
                tracing::info!("Using ndarray CPU backend");
                run_training::<Autodiff<NdArray>>(&run, train_dataset, val_dataset, NdArrayDevice::Cpu)?
            }
        };

        tracing::info!("Best validation accuracy: {:.2}%", best * 100.0);
        Ok(best)
    }
}

/// Build loaders, network and trainer on backend `B`, then train.
pub fn run_training<B: AutodiffBackend>(
    run:           &RunConfig,
    train_dataset: ClusterDataset,
    val_dataset:   ClusterDataset,
    device:        B::Device,
) -> Result<f64> {
    let cfg = &run.train;
    let num_classes = run.num_classes();

    // ── Training loader (AutodiffBackend, augmented views) ───────────────────
    let train_batcher = ClusterBatcher::<B>::new(device.clone(), Augmenter::new(cfg.augment.clone()));
    let train_loader = DataLoaderBuilder::new(train_batcher)
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(cfg.num_workers)
        .build(train_dataset);

    // ── Validation loader (InnerBackend, no autodiff overhead) ───────────────
    let val_batcher = ClusterBatcher::<B::InnerBackend>::new(
        device.clone(),
        Augmenter::new(AugmentConfig::identity()),
    );
    let val_loader = DataLoaderBuilder::new(val_batcher)
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .build(val_dataset);

    let checkpoint = cfg.checkpoint.as_ref().map(PathBuf::from);
    let optim = AdamConfig::new().with_epsilon(1e-8);

    match &run.arch {
        ArchConfig::ClusterNet(arch) => {
            train_iic(run, arch.init::<B>(&device), train_loader, val_loader, device)
        }
        ArchConfig::ClusterNet5g(arch) => {
            train_iic(run, arch.init::<B>(&device), train_loader, val_loader, device)
        }
        ArchConfig::Imsat(arch) => {
            let network = arch.init::<B>(&device);
            let model = ClusteringModel::new(network, optim.init(), cfg.lr, cfg.schedule.clone());
            let state = TrainerState::new(
                &cfg.save_dir,
                cfg.epochs,
                checkpoint.as_deref(),
                &imsat_trainer::meter_config(num_classes),
            )?;
            let mut trainer = ImsatTrainer::new(
                model,
                train_loader,
                val_loader,
                cfg.imsat,
                num_classes,
                device,
                state,
            )?;
            tracing::info!(
                "IMSAT: d={}, hidden={}, k={}, mu={}",
                arch.input_dim,
                arch.hidden_dim,
                arch.num_clusters,
                cfg.imsat.mu
            );
            trainer.start_training()?;
            Ok(trainer.state().best_score())
        }
    }
}

/// IIC training shared by both trunks.
fn train_iic<B, M>(
    run:          &RunConfig,
    network:      M,
    train_loader: Arc<dyn DataLoader<ClusterBatch<B>>>,
    val_loader:   Arc<dyn DataLoader<ClusterBatch<B::InnerBackend>>>,
    device:       B::Device,
) -> Result<f64>
where
    B: AutodiffBackend,
    M: MultiHeadNet<B> + AutodiffModule<B>,
    M::InnerModule: MultiHeadNet<B::InnerBackend>,
{
    let cfg = &run.train;
    let num_classes = run.num_classes();
    tracing::info!(
        "IIC ({} backbone): {} sub-heads, k_A={}, k_B={}",
        cfg.backbone,
        network.num_sub_heads(),
        cfg.overcluster_k,
        cfg.num_clusters
    );

    let optim = AdamConfig::new().with_epsilon(1e-8).init();
    let model = ClusteringModel::new(network, optim, cfg.lr, cfg.schedule.clone());
    let checkpoint = cfg.checkpoint.as_ref().map(PathBuf::from);
    let state = TrainerState::new(
        &cfg.save_dir,
        cfg.epochs,
        checkpoint.as_deref(),
        &iic_trainer::meter_config(num_classes),
    )?;
    let mut trainer = IicTrainer::new(
        model,
        train_loader,
        val_loader,
        cfg.iic,
        num_classes,
        device,
        state,
    )?;
    trainer.start_training()?;
    Ok(trainer.state().best_score())
}
