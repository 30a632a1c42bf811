// ============================================================
// Layer 5 — Clustering Model Wrapper
// ============================================================
// Bundles a network with its optimiser and learning-rate
// schedule so trainers only deal with one object:
//
//   loss ──► step() ──► backward ──► GradientsParams ──► optimiser
//
// The wrapper is generic over the optimiser so any burn
// optimiser (Adam by default) can drive any clustering network.
//
// Reference: Burn Book §5 (Training), Kingma & Ba (2015) Adam

use anyhow::Result;
use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::infra::checkpoint::{CheckpointManager, CheckpointTag};
use crate::ml::scheduler::LrSchedule;

pub const NETWORK_PART: &str = "network";
pub const OPTIMIZER_PART: &str = "optimizer";

/// Load only the network weights saved under `tag`, on any backend.
pub fn load_network<B, M>(
    network: M,
    manager: &CheckpointManager,
    tag:     CheckpointTag,
    device:  &B::Device,
) -> Result<M>
where
    B: Backend,
    M: Module<B>,
{
    let record = manager.load_record::<B, M::Record>(tag, NETWORK_PART, device)?;
    Ok(network.load_record(record))
}

pub struct ClusteringModel<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    network:         M,
    optim:           O,
    schedule:        LrSchedule,
    base_lr:         f64,
    scheduler_steps: usize,
    _backend:        std::marker::PhantomData<B>,
}

impl<B, M, O> ClusteringModel<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    pub fn new(network: M, optim: O, base_lr: f64, schedule: LrSchedule) -> Self {
        Self {
            network,
            optim,
            schedule,
            base_lr,
            scheduler_steps: 0,
            _backend: std::marker::PhantomData,
        }
    }

    pub fn network(&self) -> &M {
        &self.network
    }

    /// Copy of the network on the inner backend, for evaluation
    pub fn valid(&self) -> M::InnerModule {
        self.network.valid()
    }

    /// Learning rate for the current epoch
    pub fn lr(&self) -> f64 {
        self.schedule.lr_at(self.base_lr, self.scheduler_steps)
    }

    /// Backward pass and one optimiser update.
    pub fn step(&mut self, loss: Tensor<B, 1>) {
        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.network);
        self.network = self.optim.step(self.lr(), self.network.clone(), grads);
    }

    pub fn scheduler_step(&mut self) {
        self.scheduler_steps += 1;
        tracing::debug!("Learning rate now {:.3e}", self.lr());
    }

    pub fn scheduler_steps(&self) -> usize {
        self.scheduler_steps
    }

    /// Write network and optimiser records under `tag`.
    pub fn save(&self, manager: &CheckpointManager, tag: CheckpointTag) -> Result<()> {
        manager.save_record::<B, _>(self.network.clone().into_record(), tag, NETWORK_PART)?;
        manager.save_record::<B, _>(self.optim.to_record(), tag, OPTIMIZER_PART)?;
        Ok(())
    }

    /// Restore network, optimiser and schedule position from `tag`.
    ///
    /// The schedule position comes from the `{tag}.json` state file,
    /// so the state must have been written alongside the records.
    pub fn load(self, manager: &CheckpointManager, tag: CheckpointTag, device: &B::Device) -> Result<Self> {
        let network = load_network::<B, M>(self.network, manager, tag, device)?;
        let optim_record = manager.load_record::<B, O::Record>(tag, OPTIMIZER_PART, device)?;
        let snapshot = manager.load_state(tag)?;

        tracing::info!(
            "Restored '{}' checkpoint from '{}' (epoch {})",
            tag,
            manager.dir().display(),
            snapshot.epoch
        );

        Ok(Self {
            network,
            optim: self.optim.load_record(optim_record),
            scheduler_steps: snapshot.scheduler_steps,
            ..self
        })
    }
}
