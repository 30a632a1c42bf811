// ============================================================
// Layer 5 — Generic Training Loop
// ============================================================
// Template-method trainer shared by every clustering method.
//
// Concrete trainers supply the per-epoch hooks; the provided
// methods own the epoch loop, meter bookkeeping and checkpoints:
//
//   for epoch in start_epoch..max_epoch:
//       train_loop(epoch)            ← hook
//       score = eval_loop(epoch)     ← hook (inner backend)
//       meters.step()
//       scheduler_step()             ← hook
//       write meters/<name>.json + whole_meter.json
//       log newest summary row
//       save_checkpoint(epoch, score)
//
// Resuming: TrainerState::new reads `last.json` from the given
// checkpoint directory; restore() then reloads the weights.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use crate::domain::meters::{MeterConfig, MeterInterface};
use crate::infra::{
    checkpoint::{CheckpointManager, CheckpointTag, TrainingSnapshot},
    metrics::MeterWriter,
};

/// Everything the epoch loop needs that is not a network.
pub struct TrainerState {
    max_epoch:   usize,
    start_epoch: usize,
    best_score:  f64,
    meters:      MeterInterface,
    checkpoints: CheckpointManager,
    writer:      MeterWriter,
    resume_from: Option<CheckpointManager>,
}

impl TrainerState {
    /// Prepare `save_dir` (and `save_dir/meters`) for a run.
    ///
    /// With `checkpoint`, the directory must exist; its `last` state
    /// sets the start epoch, best score and meter history.
    pub fn new(
        save_dir:     impl Into<PathBuf>,
        max_epoch:    usize,
        checkpoint:   Option<&Path>,
        meter_config: &MeterConfig,
    ) -> Result<Self> {
        let save_dir = save_dir.into();
        let checkpoints = CheckpointManager::create(&save_dir)?;
        let writer = MeterWriter::new(&save_dir)?;

        let mut state = Self {
            max_epoch,
            start_epoch: 0,
            best_score: -1.0,
            meters: MeterInterface::new(meter_config),
            checkpoints,
            writer,
            resume_from: None,
        };

        if let Some(dir) = checkpoint {
            let source = CheckpointManager::open(dir)?;
            let snapshot = source
                .load_state(CheckpointTag::Last)
                .context("checkpoint directory has no 'last' state to resume from")?;
            state.apply_snapshot(snapshot)?;
            state.resume_from = Some(source);
        }

        Ok(state)
    }

    fn apply_snapshot(&mut self, snapshot: TrainingSnapshot) -> Result<()> {
        self.meters.load_state(snapshot.meters)?;
        self.start_epoch = snapshot.epoch + 1;
        self.best_score = snapshot.best_score;
        tracing::info!(
            "Resuming at epoch {} (best score so far {:.4})",
            self.start_epoch,
            self.best_score
        );
        Ok(())
    }

    pub fn max_epoch(&self) -> usize {
        self.max_epoch
    }

    pub fn start_epoch(&self) -> usize {
        self.start_epoch
    }

    pub fn best_score(&self) -> f64 {
        self.best_score
    }

    pub fn meters(&self) -> &MeterInterface {
        &self.meters
    }

    pub fn meters_mut(&mut self) -> &mut MeterInterface {
        &mut self.meters
    }

    /// Manager writing into `save_dir`
    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Checkpoint directory this run resumes from, if any
    pub fn resume_from(&self) -> Option<&CheckpointManager> {
        self.resume_from.as_ref()
    }
}

pub trait ClusteringTrainer: Sized {
    fn state(&self) -> &TrainerState;

    fn state_mut(&mut self) -> &mut TrainerState;

    /// One epoch of optimisation; records training meters.
    fn train_loop(&mut self, epoch: usize) -> Result<()>;

    /// Validation pass; records validation meters and returns the score
    /// used to pick the best checkpoint.
    fn eval_loop(&mut self, epoch: usize) -> Result<f64>;

    fn scheduler_step(&mut self);

    fn scheduler_steps(&self) -> usize;

    fn save_weights(&self, manager: &CheckpointManager, tag: CheckpointTag) -> Result<()>;

    fn load_weights(self, manager: &CheckpointManager, tag: CheckpointTag) -> Result<Self>;

    /// Reload weights from the resume directory, if the run has one.
    fn restore(self) -> Result<Self> {
        match self.state().resume_from().cloned() {
            Some(source) => self.load_weights(&source, CheckpointTag::Last),
            None => Ok(self),
        }
    }

    fn start_training(&mut self) -> Result<()> {
        let (start, max) = (self.state().start_epoch(), self.state().max_epoch());
        if start >= max {
            tracing::warn!("Nothing to train: start epoch {} >= max epoch {}", start, max);
            return Ok(());
        }

        for epoch in start..max {
            // ── Train + evaluate ──────────────────────────────────────────────
            self.train_loop(epoch)
                .with_context(|| format!("training failed at epoch {epoch}"))?;
            let score = self
                .eval_loop(epoch)
                .with_context(|| format!("evaluation failed at epoch {epoch}"))?;

            // ── Epoch boundary ────────────────────────────────────────────────
            self.state_mut().meters.step();
            self.scheduler_step();

            let state = self.state();
            state.writer.write(&state.meters)?;
            if let Some(row) = state.meters.summary().last() {
                let columns: Vec<String> = row
                    .iter()
                    .map(|(name, value)| format!("{name}={value:.4}"))
                    .collect();
                tracing::info!("Epoch {:>3}/{} | {}", epoch + 1, max, columns.join(" | "));
            }

            self.save_checkpoint(epoch, score)?;
        }

        tracing::info!("Training complete! Best score {:.4}", self.state().best_score());
        Ok(())
    }

    /// Always refresh `last`; refresh `best` when `score` beats the best so far.
    fn save_checkpoint(&mut self, epoch: usize, score: f64) -> Result<()> {
        if score.is_nan() {
            bail!("epoch {epoch} produced a NaN score");
        }
        let improved = score > self.state().best_score;
        if improved {
            self.state_mut().best_score = score;
        }

        let snapshot = TrainingSnapshot {
            epoch,
            best_score: self.state().best_score,
            scheduler_steps: self.scheduler_steps(),
            meters: self.state().meters.state(),
        };
        let manager = self.state().checkpoints.clone();

        self.save_weights(&manager, CheckpointTag::Last)?;
        manager.save_state(CheckpointTag::Last, &snapshot)?;

        if improved {
            self.save_weights(&manager, CheckpointTag::Best)?;
            manager.save_state(CheckpointTag::Best, &snapshot)?;
            tracing::info!("New best score {:.4} at epoch {}", score, epoch + 1);
        }
        Ok(())
    }
}
