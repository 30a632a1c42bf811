// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust: no burn types, no file I/O.
//
//   assignment.rs — Hungarian matching of clusters to classes
//   meters.rs     — per-epoch metric accumulation and history
//
// Both are used by the trainers (Layer 5) and persisted by the
// infrastructure layer (Layer 6), but neither knows about them.

/// Hungarian cluster-to-class matching and cluster accuracy
pub mod assignment;

/// Meters and the MeterInterface
pub mod meters;
