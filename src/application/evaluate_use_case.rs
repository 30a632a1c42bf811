// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Scores a saved run on an image folder:
//
//   config.json ──► rebuild network ──► load {tag}_network weights
//        │
//        └──► image_size / channels ──► ImageFolder ──► predictions
//                                                         │
//                                          Hungarian-matched accuracy
//
// Runs on the inner (non-autodiff) backend only.

use anyhow::Result;
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, NdArray, Wgpu},
    data::dataloader::DataLoaderBuilder,
    prelude::*,
};

use crate::application::train_use_case::{DeviceKind, RunConfig};
use crate::data::{
    augment::{AugmentConfig, Augmenter},
    batcher::ClusterBatcher,
    dataset::ClusterDataset,
    loader::ImageFolder,
};
use crate::infra::checkpoint::{CheckpointManager, CheckpointTag};
use crate::ml::{
    arch::{ArchConfig, Head},
    evaluation::collect_predictions,
    model::load_network,
};

/// Outcome of one evaluation
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub tag:      CheckpointTag,
    pub samples:  usize,
    /// Index of the best-scoring sub-head
    pub head:     usize,
    pub accuracy: f64,
    /// mapping[cluster] = class
    pub mapping:  Vec<usize>,
}

pub struct EvaluateUseCase {
    manager:  CheckpointManager,
    run:      RunConfig,
    data_dir: Option<String>,
    tag:      CheckpointTag,
}

impl EvaluateUseCase {
    /// Open a trained run directory. `data_dir` defaults to the
    /// folder the run was trained on.
    pub fn new(save_dir: &str, data_dir: Option<String>, tag: CheckpointTag) -> Result<Self> {
        let manager = CheckpointManager::open(save_dir)?;
        let run: RunConfig = manager.load_config()?;
        Ok(Self { manager, run, data_dir, tag })
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run
    }

    pub fn execute(&self) -> Result<EvaluationReport> {
        let cfg = &self.run.train;
        let data_dir = self.data_dir.as_deref().unwrap_or(&cfg.data_dir);

        tracing::info!("Evaluating '{}' checkpoint on '{}'", self.tag, data_dir);
        let loaded = ImageFolder::new(data_dir, cfg.image_size, cfg.channels).load_all()?;
        let num_classes = self.run.num_classes().max(loaded.class_names.len());
        let dataset = ClusterDataset::new(loaded.samples);

        match cfg.device {
            DeviceKind::Wgpu => self.evaluate::<Wgpu>(dataset, num_classes, WgpuDevice::default()),
            DeviceKind::Cpu => self.evaluate::<NdArray>(dataset, num_classes, NdArrayDevice::Cpu),
        }
    }

    fn evaluate<B: Backend>(
        &self,
        dataset:     ClusterDataset,
        num_classes: usize,
        device:      B::Device,
    ) -> Result<EvaluationReport> {
        let samples = dataset.sample_count();
        let batcher = ClusterBatcher::<B>::new(device.clone(), Augmenter::new(AugmentConfig::identity()));
        let loader = DataLoaderBuilder::new(batcher)
            .batch_size(self.run.train.batch_size)
            .num_workers(self.run.train.num_workers)
            .build(dataset);

        let predictions = match &self.run.arch {
            ArchConfig::ClusterNet(arch) => {
                let network = load_network::<B, _>(arch.init::<B>(&device), &self.manager, self.tag, &device)?;
                collect_predictions(loader.as_ref(), |x| network.forward(x, Head::B))?
            }
            ArchConfig::ClusterNet5g(arch) => {
                let network = load_network::<B, _>(arch.init::<B>(&device), &self.manager, self.tag, &device)?;
                collect_predictions(loader.as_ref(), |x| network.forward(x, Head::B))?
            }
            ArchConfig::Imsat(arch) => {
                let network = load_network::<B, _>(arch.init::<B>(&device), &self.manager, self.tag, &device)?;
                collect_predictions(loader.as_ref(), |x| vec![network.forward(x)])?
            }
        };

        let best = predictions.best_head(num_classes)?;
        Ok(EvaluationReport {
            tag: self.tag,
            samples,
            head: best.head,
            accuracy: best.cluster.accuracy,
            mapping: best.cluster.mapping,
        })
    }
}
