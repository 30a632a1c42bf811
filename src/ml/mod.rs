// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All tensor code lives here.
//
//   arch/            — ClusterNet / ClusterNet5g (IIC) and ImsatNet (IMSAT)
//   loss.rs          — entropy, KL/JS, IMSAT MI, IIC loss
//   scheduler.rs     — epoch-level learning-rate schedules
//   model.rs         — network + optimiser + schedule bundle
//   evaluation.rs    — argmax predictions and Hungarian scoring
//   trainer.rs       — generic epoch loop with checkpoint/resume
//   iic_trainer.rs   — IIC training hooks
//   imsat_trainer.rs — IMSAT training hooks
//
// Training runs on an Autodiff backend; evaluation always runs
// on the inner backend through `valid()`.
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)

/// Clustering network architectures
pub mod arch;

/// Mutual-information losses
pub mod loss;

pub mod scheduler;

/// Network, optimiser and learning-rate schedule in one place
pub mod model;

pub mod evaluation;

/// Template-method trainer shared by all clustering methods
pub mod trainer;

pub mod iic_trainer;

pub mod imsat_trainer;
