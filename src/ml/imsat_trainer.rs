// ============================================================
// Layer 5 — IMSAT Trainer
// ============================================================
// Information Maximizing Self-Augmented Training (Hu et al., 2017).
//
// Per batch:
//   logits   = net(images)
//   logits_t = net(images_tf)
//   mi       = μ·H(mean p) − mean H(p)           (maximised)
//   sat      = distance(p_t, p)                  (minimised)
//   loss     = −mi + sat_weight · sat
//
// The score is the Hungarian accuracy of the single output head.

use anyhow::Result;
use burn::{
    data::dataloader::DataLoader,
    optim::Optimizer,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::data::batcher::ClusterBatch;
use crate::domain::meters::{MeterConfig, MeterKind};
use crate::infra::checkpoint::{CheckpointManager, CheckpointTag};
use crate::ml::{
    arch::ImsatNet,
    evaluation::{collect_predictions, finite_scalar},
    loss::{Distance, ImsatMutualInformation, PerturbationLoss, DEFAULT_EPS},
    model::ClusteringModel,
    trainer::{ClusteringTrainer, TrainerState},
};

pub const TRAIN_MI: &str = "train_mi";
pub const TRAIN_SAT: &str = "train_sat";
pub const TRAIN_LOSS: &str = "train_loss";
pub const VAL_ACC: &str = "val_acc";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImsatSettings {
    /// Weight of the marginal entropy in the MI term
    pub mu:         f64,
    pub sat_weight: f64,
    #[serde(default)]
    pub distance:   Distance,
}

impl Default for ImsatSettings {
    fn default() -> Self {
        Self { mu: 4.0, sat_weight: 0.1, distance: Distance::Kl }
    }
}

pub fn meter_config(num_classes: usize) -> MeterConfig {
    let mut config = MeterConfig::new();
    for name in [TRAIN_MI, TRAIN_SAT, TRAIN_LOSS] {
        config.insert(name.to_string(), MeterKind::AverageValue);
    }
    config.insert(VAL_ACC.to_string(), MeterKind::ConfusionMatrix { num_classes });
    config
}

pub struct ImsatTrainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<ImsatNet<B>, B>,
{
    model:        ClusteringModel<B, ImsatNet<B>, O>,
    train_loader: Arc<dyn DataLoader<ClusterBatch<B>>>,
    val_loader:   Arc<dyn DataLoader<ClusterBatch<B::InnerBackend>>>,
    mi:           ImsatMutualInformation,
    sat:          PerturbationLoss,
    sat_weight:   f64,
    num_classes:  usize,
    device:       B::Device,
    state:        TrainerState,
}

impl<B, O> ImsatTrainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<ImsatNet<B>, B>,
{
    pub fn new(
        model:        ClusteringModel<B, ImsatNet<B>, O>,
        train_loader: Arc<dyn DataLoader<ClusterBatch<B>>>,
        val_loader:   Arc<dyn DataLoader<ClusterBatch<B::InnerBackend>>>,
        settings:     ImsatSettings,
        num_classes:  usize,
        device:       B::Device,
        state:        TrainerState,
    ) -> Result<Self> {
        Self {
            model,
            train_loader,
            val_loader,
            mi: ImsatMutualInformation::new(settings.mu, DEFAULT_EPS)?,
            sat: PerturbationLoss::new(settings.distance),
            sat_weight: settings.sat_weight,
            num_classes,
            device,
            state,
        }
        .restore()
    }

    pub fn model(&self) -> &ClusteringModel<B, ImsatNet<B>, O> {
        &self.model
    }
}

impl<B, O> ClusteringTrainer for ImsatTrainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<ImsatNet<B>, B>,
{
    fn state(&self) -> &TrainerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut TrainerState {
        &mut self.state
    }

    fn train_loop(&mut self, epoch: usize) -> Result<()> {
        tracing::debug!("epoch {} lr={:.3e}", epoch + 1, self.model.lr());
        let loader = self.train_loader.clone();

        for batch in loader.iter() {
            let logits = self.model.network().forward(batch.images);
            let logits_t = self.model.network().forward(batch.images_tf);

            let mi = self.mi.forward(logits.clone())?;
            let sat = self.sat.forward(logits, logits_t)?;
            let loss = sat.clone().mul_scalar(self.sat_weight) - mi.clone();

            let meters = self.state.meters_mut();
            meters.add_value(TRAIN_MI, finite_scalar(&mi, "mutual information")?)?;
            meters.add_value(TRAIN_SAT, finite_scalar(&sat, "self-augmentation loss")?)?;
            meters.add_value(TRAIN_LOSS, finite_scalar(&loss, "IMSAT loss")?)?;

            self.model.step(loss);
        }
        Ok(())
    }

    fn eval_loop(&mut self, _epoch: usize) -> Result<f64> {
        let network = self.model.valid();
        let predictions = collect_predictions(self.val_loader.as_ref(), |x| vec![network.forward(x)])?;
        let best = predictions.best_head(self.num_classes)?;

        self.state
            .meters_mut()
            .add_predictions(VAL_ACC, &best.predictions, &predictions.targets)?;
        Ok(best.cluster.accuracy)
    }

    fn scheduler_step(&mut self) {
        self.model.scheduler_step();
    }

    fn scheduler_steps(&self) -> usize {
        self.model.scheduler_steps()
    }

    fn save_weights(&self, manager: &CheckpointManager, tag: CheckpointTag) -> Result<()> {
        self.model.save(manager, tag)
    }

    fn load_weights(self, manager: &CheckpointManager, tag: CheckpointTag) -> Result<Self> {
        let model = self.model.load(manager, tag, &self.device)?;
        Ok(Self { model, ..self })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        augment::{AugmentConfig, Augmenter},
        batcher::ClusterBatcher,
        dataset::{ClusterDataset, ImageSample},
    };
    use crate::ml::{arch::ImsatNetConfig, scheduler::LrSchedule};
    use burn::{
        backend::{Autodiff, NdArray},
        data::dataloader::DataLoaderBuilder,
        optim::AdamConfig,
        prelude::*,
    };
    use std::fs;

    type TB = Autodiff<NdArray>;
    type IB = NdArray;

    fn samples() -> Vec<ImageSample> {
        (0..12)
            .map(|i| {
                let label = i % 3;
                ImageSample {
                    pixels:   vec![label as f32 / 2.0; 4 * 4],
                    shape:    [1, 4, 4],
                    label,
                    filename: format!("img_{i}.png"),
                }
            })
            .collect()
    }

    #[test]
    fn test_epochs_record_all_meters() {
        let dir = std::env::temp_dir().join(format!("dc_imsat_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let device: <TB as Backend>::Device = Default::default();
        let augmenter = Augmenter::new(AugmentConfig::default());
        let train_loader = DataLoaderBuilder::new(ClusterBatcher::<TB>::new(device.clone(), augmenter.clone()))
            .batch_size(6)
            .shuffle(3)
            .build(ClusterDataset::new(samples()));
        let val_loader = DataLoaderBuilder::new(ClusterBatcher::<IB>::new(device.clone(), augmenter))
            .batch_size(6)
            .build(ClusterDataset::new(samples()));

        let network = ImsatNetConfig::new(16, 3).with_hidden_dim(32).init::<TB>(&device);
        let model = ClusteringModel::new(
            network,
            AdamConfig::new().init(),
            1e-3,
            LrSchedule::Step { step_size: 1, gamma: 0.5 },
        );
        let state = TrainerState::new(&dir, 2, None, &meter_config(3)).unwrap();
        let mut trainer = ImsatTrainer::new(
            model,
            train_loader,
            val_loader,
            ImsatSettings::default(),
            3,
            device,
            state,
        )
        .unwrap();
        trainer.start_training().unwrap();

        let history = trainer.state().meters().aggregated();
        for name in [TRAIN_MI, TRAIN_SAT, TRAIN_LOSS, VAL_ACC] {
            assert_eq!(history[name].len(), 2, "meter {name}");
        }
        assert_eq!(trainer.model().scheduler_steps(), 2);
        assert!((trainer.model().lr() - 2.5e-4).abs() < 1e-12);
        assert!(trainer.state().best_score() >= 1.0 / 3.0);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_rejects_non_positive_mu() {
        let dir = std::env::temp_dir().join(format!("dc_imsat_mu_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let device: <TB as Backend>::Device = Default::default();
        let augmenter = Augmenter::new(AugmentConfig::identity());
        let train_loader = DataLoaderBuilder::new(ClusterBatcher::<TB>::new(device.clone(), augmenter.clone()))
            .batch_size(4)
            .build(ClusterDataset::new(samples()));
        let val_loader = DataLoaderBuilder::new(ClusterBatcher::<IB>::new(device.clone(), augmenter))
            .batch_size(4)
            .build(ClusterDataset::new(samples()));
        let network = ImsatNetConfig::new(16, 3).with_hidden_dim(8).init::<TB>(&device);
        let model = ClusteringModel::new(network, AdamConfig::new().init(), 1e-3, LrSchedule::Constant);
        let state = TrainerState::new(&dir, 1, None, &meter_config(3)).unwrap();

        let settings = ImsatSettings { mu: 0.0, ..ImsatSettings::default() };
        let result = ImsatTrainer::new(model, train_loader, val_loader, settings, 3, device, state);
        assert!(result.is_err());

        fs::remove_dir_all(&dir).ok();
    }
}
