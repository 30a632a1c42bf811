// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the run directory on disk:
//
//   checkpoint.rs — network and optimiser records through
//                   Burn's CompactRecorder, plus the JSON
//                   training state (epoch, best score, meters)
//                   and the run's config.json
//
//   metrics.rs    — per-meter histories and the whole-meter
//                   table, rewritten after every epoch
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Meter history persistence
pub mod metrics;
