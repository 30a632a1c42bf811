#![recursion_limit = "256"]

//! Deep clustering toolkit built on Burn.
//!
//! Layers, outermost first:
//!
//! 1. [`cli`]: clap commands
//! 2. [`application`]: training, evaluation and dataset use cases
//! 3. [`domain`]: meters and Hungarian cluster matching
//! 4. [`data`]: image loading, augmentation, batching, segmentation sets
//! 5. [`ml`]: networks, losses, trainers
//! 6. [`infra`]: checkpoints and meter files

pub mod cli;
pub mod application;
pub mod domain;
pub mod data;
pub mod ml;
pub mod infra;
