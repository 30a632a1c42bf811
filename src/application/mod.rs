// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers for one user-facing goal each:
//
//   train_use_case.rs    — load images, split, train IIC or IMSAT
//   evaluate_use_case.rs — score a saved run's weights
//   dataset_use_case.rs  — inspect a segmentation dataset
//
// No tensor math here (Layer 5) and no printing (Layer 1);
// only workflow coordination and backend selection.
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

/// The training workflow
pub mod train_use_case;

/// Scoring a trained run
pub mod evaluate_use_case;

pub mod dataset_use_case;
