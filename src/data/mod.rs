// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from image files on disk to tensor batches.
//
//   image folder
//       │
//       ▼
//   ImageFolder       → decodes, resizes, labels by directory
//       │
//       ▼
//   split_train_val   → seeded shuffle + split
//       │
//       ▼
//   ClusterDataset    → implements Burn's Dataset trait
//       │
//       ▼
//   ClusterBatcher    → stacks samples, adds augmented views
//       │
//       ▼
//   DataLoader        → feeds batches to the trainers
//
// The segmentation module is a separate adapter for paired
// image/ground-truth medical slices (PROSTATE, ACDC).
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Loads class-per-directory image collections
pub mod loader;

/// Random perturbations producing the second view of an image
pub mod augment;

/// Implements Burn's Dataset trait for image samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Shuffles and splits data into train/validation sets
pub mod splitter;

/// PROSTATE / ACDC segmentation slice datasets
pub mod segmentation;
