// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores training runs.
//
// What gets saved per checkpoint tag (`last` / `best`):
//   1. {tag}_network.mpk   — network weights (CompactRecorder)
//   2. {tag}_optimizer.mpk — optimiser state (CompactRecorder)
//   3. {tag}.json          — epoch, best score, schedule steps
//                            and the full meter state
//
// plus, once per run:
//   config.json            — the run configuration, used to
//                            rebuild the network for evaluation
//
// File layout:
//   runs/test/
//     config.json
//     last.json  last_network.mpk  last_optimizer.mpk
//     best.json  best_network.mpk  best_optimizer.mpk
//     meters/
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{bail, Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Record, Recorder},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{fmt, fs, path::{Path, PathBuf}};

use crate::domain::meters::MeterState;

const CONFIG_FILE: &str = "config.json";

/// Which checkpoint slot to read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointTag {
    Last,
    Best,
}

impl CheckpointTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Last => "last",
            Self::Best => "best",
        }
    }
}

impl fmt::Display for CheckpointTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CheckpointTag {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "last" => Ok(Self::Last),
            "best" => Ok(Self::Best),
            other => bail!("unknown checkpoint tag '{other}' (expected last or best)"),
        }
    }
}

/// Everything about a run that is not a tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSnapshot {
    /// Epoch that produced this checkpoint (0-based)
    pub epoch:           usize,
    pub best_score:      f64,
    pub scheduler_steps: usize,
    pub meters:          MeterState,
}

/// Reads and writes checkpoints inside one directory.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Manager for a new run; creates the directory (like `mkdir -p`).
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Manager for an existing run; the directory must already exist.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            bail!("checkpoint directory '{}' does not exist or is not a directory", dir.display());
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, tag: CheckpointTag, part: &str) -> PathBuf {
        // the recorder appends its own extension
        self.dir.join(format!("{tag}_{part}"))
    }

    /// Save any burn record (network or optimiser) under `{tag}_{part}`.
    pub fn save_record<B, R>(&self, record: R, tag: CheckpointTag, part: &str) -> Result<()>
    where
        B: Backend,
        R: Record<B>,
    {
        let path = self.record_path(tag, part);
        Recorder::<B>::record(&CompactRecorder::new(), record, path.clone())
            .with_context(|| format!("failed to save checkpoint to '{}'", path.display()))?;
        tracing::debug!("Saved {} record '{}'", tag, path.display());
        Ok(())
    }

    pub fn load_record<B, R>(&self, tag: CheckpointTag, part: &str, device: &B::Device) -> Result<R>
    where
        B: Backend,
        R: Record<B>,
    {
        let path = self.record_path(tag, part);
        Recorder::<B>::load(&CompactRecorder::new(), path.clone(), device)
            .with_context(|| format!("cannot load checkpoint '{}'", path.display()))
    }

    pub fn save_state(&self, tag: CheckpointTag, snapshot: &TrainingSnapshot) -> Result<()> {
        let path = self.dir.join(format!("{tag}.json"));
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&path, json)
            .with_context(|| format!("cannot write training state to '{}'", path.display()))
    }

    pub fn load_state(&self, tag: CheckpointTag) -> Result<TrainingSnapshot> {
        let path = self.dir.join(format!("{tag}.json"));
        let json = fs::read_to_string(&path)
            .with_context(|| format!("cannot read training state from '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("malformed training state in '{}'", path.display()))
    }

    /// Save the run configuration as pretty JSON.
    pub fn save_config<T: Serialize>(&self, cfg: &T) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved run config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config<T: DeserializeOwned>(&self) -> Result<T> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "cannot read config from '{}'. Has this run been trained?",
                path.display()
            )
        })?;
        serde_json::from_str(&json)
            .with_context(|| format!("malformed config in '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::meters::{MeterConfig, MeterInterface, MeterKind};
    use burn::{backend::NdArray, nn::LinearConfig};

    type TB = NdArray;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dc_ckpt_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_state_round_trip_keeps_meter_history() {
        let dir = temp_dir("state");
        let manager = CheckpointManager::create(&dir).unwrap();

        let mut config = MeterConfig::new();
        config.insert("loss".to_string(), MeterKind::AverageValue);
        let mut meters = MeterInterface::new(&config);
        meters.add_value("loss", 0.5).unwrap();
        meters.step();

        let snapshot = TrainingSnapshot {
            epoch:           3,
            best_score:      0.42,
            scheduler_steps: 4,
            meters:          meters.state(),
        };
        manager.save_state(CheckpointTag::Last, &snapshot).unwrap();
        assert_eq!(manager.load_state(CheckpointTag::Last).unwrap(), snapshot);
        assert!(manager.load_state(CheckpointTag::Best).is_err());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_record_round_trip() {
        let dir = temp_dir("record");
        let manager = CheckpointManager::create(&dir).unwrap();
        let device = Default::default();

        let linear = LinearConfig::new(3, 2).init::<TB>(&device);
        manager
            .save_record::<TB, _>(linear.clone().into_record(), CheckpointTag::Best, "network")
            .unwrap();
        assert!(dir.join("best_network.mpk").exists());

        let fresh = LinearConfig::new(3, 2).init::<TB>(&device);
        let record = manager
            .load_record::<TB, _>(CheckpointTag::Best, "network", &device)
            .unwrap();
        let restored = fresh.load_record(record);

        let x = Tensor::<TB, 2>::ones([1, 3], &device);
        let a: Vec<f32> = linear.forward(x.clone()).into_data().convert::<f32>().to_vec().unwrap();
        let b: Vec<f32> = restored.forward(x).into_data().convert::<f32>().to_vec().unwrap();
        // CompactRecorder stores half precision
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-2);
        }

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_open_requires_existing_directory() {
        assert!(CheckpointManager::open(temp_dir("nope")).is_err());
    }

    #[test]
    fn test_tag_parsing() {
        assert_eq!("best".parse::<CheckpointTag>().unwrap(), CheckpointTag::Best);
        assert!("first".parse::<CheckpointTag>().is_err());
    }
}
