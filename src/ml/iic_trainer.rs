// ============================================================
// Layer 5 — IIC Trainer
// ============================================================
// Invariant Information Clustering (Ji et al., 2019).
//
// Each epoch alternates the two head groups of a multi-head net
// (ClusterNet or ClusterNet5g):
//
//   head A (over-clustering)  × head_a_epochs passes
//   head B (main clustering)  × head_b_epochs passes
//
// For every batch and every sub-head of the active group the
// IIC loss is computed between the image and its augmented view;
// the sub-head losses are averaged and the optimiser stepped once.
//
// Evaluation uses head B on the inner backend and reports the
// best sub-head's Hungarian accuracy as the epoch score.

use anyhow::{bail, Result};
use burn::{
    data::dataloader::DataLoader,
    module::AutodiffModule,
    optim::Optimizer,
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::data::batcher::ClusterBatch;
use crate::domain::meters::{MeterConfig, MeterKind};
use crate::infra::checkpoint::{CheckpointManager, CheckpointTag};
use crate::ml::{
    arch::{Head, MultiHeadNet},
    evaluation::{collect_predictions, finite_scalar},
    loss::IicLoss,
    model::ClusteringModel,
    trainer::{ClusteringTrainer, TrainerState},
};

pub const TRAIN_HEAD_A: &str = "train_head_a";
pub const TRAIN_HEAD_B: &str = "train_head_b";
pub const VAL_ACC: &str = "val_acc";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IicSettings {
    /// Passes over the training set with head A per epoch
    pub head_a_epochs: usize,
    /// Passes over the training set with head B per epoch
    pub head_b_epochs: usize,
    pub lambda:        f64,
}

impl Default for IicSettings {
    fn default() -> Self {
        Self { head_a_epochs: 1, head_b_epochs: 2, lambda: 1.0 }
    }
}

/// Meters recorded by the IIC trainer; `num_classes` sizes the
/// validation confusion matrix.
pub fn meter_config(num_classes: usize) -> MeterConfig {
    let mut config = MeterConfig::new();
    config.insert(TRAIN_HEAD_A.to_string(), MeterKind::AverageValue);
    config.insert(TRAIN_HEAD_B.to_string(), MeterKind::AverageValue);
    config.insert(VAL_ACC.to_string(), MeterKind::ConfusionMatrix { num_classes });
    config
}

pub struct IicTrainer<B, M, O>
where
    B: AutodiffBackend,
    M: MultiHeadNet<B> + AutodiffModule<B>,
    M::InnerModule: MultiHeadNet<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    model:        ClusteringModel<B, M, O>,
    train_loader: Arc<dyn DataLoader<ClusterBatch<B>>>,
    val_loader:   Arc<dyn DataLoader<ClusterBatch<B::InnerBackend>>>,
    criterion:    IicLoss,
    settings:     IicSettings,
    num_classes:  usize,
    device:       B::Device,
    state:        TrainerState,
}

impl<B, M, O> IicTrainer<B, M, O>
where
    B: AutodiffBackend,
    M: MultiHeadNet<B> + AutodiffModule<B>,
    M::InnerModule: MultiHeadNet<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    /// Build the trainer; weights are reloaded when `state` resumes a run.
    pub fn new(
        model:        ClusteringModel<B, M, O>,
        train_loader: Arc<dyn DataLoader<ClusterBatch<B>>>,
        val_loader:   Arc<dyn DataLoader<ClusterBatch<B::InnerBackend>>>,
        settings:     IicSettings,
        num_classes:  usize,
        device:       B::Device,
        state:        TrainerState,
    ) -> Result<Self> {
        if settings.head_a_epochs + settings.head_b_epochs == 0 {
            bail!("IIC needs at least one pass with head A or head B per epoch");
        }
        Self {
            model,
            train_loader,
            val_loader,
            criterion: IicLoss::new(settings.lambda),
            settings,
            num_classes,
            device,
            state,
        }
        .restore()
    }

    /// One pass over the training loader with the given head group.
    fn train_head(&mut self, head: Head, meter: &str) -> Result<()> {
        let loader = self.train_loader.clone();

        for batch in loader.iter() {
            let logits = self.model.network().forward_head(batch.images, head);
            let logits_t = self.model.network().forward_head(batch.images_tf, head);
            let num_sub_heads = logits.len();

            let mut total: Option<Tensor<B, 1>> = None;
            for (l, l_t) in logits.into_iter().zip(logits_t) {
                let out = self.criterion.forward(l, l_t)?;
                total = Some(match total {
                    Some(sum) => sum + out.loss,
                    None => out.loss,
                });
            }
            let Some(total) = total else {
                bail!("head {head:?} has no sub-heads");
            };
            let loss = total.div_scalar(num_sub_heads as f64);

            let value = finite_scalar(&loss, "IIC loss")?;
            self.state.meters_mut().add_value(meter, value)?;
            self.model.step(loss);
        }
        Ok(())
    }
}

impl<B, M, O> ClusteringTrainer for IicTrainer<B, M, O>
where
    B: AutodiffBackend,
    M: MultiHeadNet<B> + AutodiffModule<B>,
    M::InnerModule: MultiHeadNet<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    fn state(&self) -> &TrainerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut TrainerState {
        &mut self.state
    }

    fn train_loop(&mut self, epoch: usize) -> Result<()> {
        let schedule = [
            (Head::A, self.settings.head_a_epochs, TRAIN_HEAD_A),
            (Head::B, self.settings.head_b_epochs, TRAIN_HEAD_B),
        ];
        for (head, passes, meter) in schedule {
            for pass in 0..passes {
                tracing::debug!(
                    "epoch {} head {:?} pass {}/{} lr={:.3e}",
                    epoch + 1,
                    head,
                    pass + 1,
                    passes,
                    self.model.lr()
                );
                self.train_head(head, meter)?;
            }
        }
        Ok(())
    }

    fn eval_loop(&mut self, _epoch: usize) -> Result<f64> {
        let network = self.model.valid();
        let predictions =
            collect_predictions(self.val_loader.as_ref(), |x| network.forward_head(x, Head::B))?;
        let best = predictions.best_head(self.num_classes)?;

        self.state
            .meters_mut()
            .add_predictions(VAL_ACC, &best.predictions, &predictions.targets)?;
        tracing::debug!("best head B sub-head: {}", best.head);
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
