// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// All work is delegated to Layer 2 (application); this layer
// only routes commands and prints results.
//
//   `train`    — trains IIC or IMSAT on an image folder
//   `evaluate` — reloads a run and reports cluster accuracy
//   `dataset`  — summarises a segmentation dataset
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, DatasetArgs, EvaluateArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "deep-clustering",
    version,
    about = "Train and evaluate deep clustering models (IIC, IMSAT)."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
            Commands::Dataset(args)  => run_dataset(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting {} training on images in: {}", args.method, args.data_dir);
    let save_dir = args.save_dir.clone();

    let best = TrainUseCase::new(args.into()).execute()?;

    println!("Training complete. Best accuracy {:.2}%, run saved in '{}'.", best * 100.0, save_dir);
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let use_case = EvaluateUseCase::new(&args.save_dir, args.data_dir, args.tag)?;
    let report = use_case.execute()?;
    let run = use_case.run_config();

    println!("Method     : {} ({} clusters)", run.train.method, run.arch.num_clusters());
    println!("Classes    : {}", run.class_names.join(", "));
    println!("Checkpoint : {}", report.tag);
    println!("Samples    : {}", report.samples);
    println!("Best head  : {}", report.head);
    println!("Accuracy   : {:.2}%", report.accuracy * 100.0);
    println!("Mapping    : {:?}", report.mapping);
    Ok(())
}

fn run_dataset(args: DatasetArgs) -> Result<()> {
    use crate::application::dataset_use_case::DatasetUseCase;

    let report = DatasetUseCase::new(args.root, args.preset, args.mode, args.subfolders).execute()?;

    println!("{} ({})", report.name, report.mode);
    println!("  slices : {}", report.slices);
    println!("  groups : {}", report.groups.len());
    for (group, count) in &report.groups {
        println!("    {group:<16} {count}");
    }
    if let (Some(stem), Some((w, h))) = (&report.first_slice, report.first_shape.first()) {
        println!("  first slice : {stem} ({w}×{h})");
    }
    Ok(())
}
