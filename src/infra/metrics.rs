// ============================================================
// Layer 6 — Meter Writer
// ============================================================
// Persists meter histories to disk after every epoch.
//
// Output files:
//   <save_dir>/meters/<meter>.json  — one summary per epoch
//   <save_dir>/whole_meter.json     — one row per epoch, columns
//                                     named <meter>_<field>
//
// Example whole_meter.json:
//   [
//     { "train_loss_mean": 2.31, "train_loss_std": 0.12, "val_acc_hungarian_acc": 0.41 },
//     { "train_loss_mean": 2.02, "train_loss_std": 0.09, "val_acc_hungarian_acc": 0.55 }
//   ]
//
// Both are rewritten in full each epoch, so after a resume the
// files still hold the complete history.

use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::meters::MeterInterface;

const METER_DIR: &str = "meters";
const WHOLE_METER_FILE: &str = "whole_meter.json";

#[derive(Debug, Clone)]
pub struct MeterWriter {
    meter_dir:  PathBuf,
    whole_path: PathBuf,
}

impl MeterWriter {
    /// Creates `<save_dir>/meters` if missing.
    pub fn new(save_dir: &Path) -> Result<Self> {
        let meter_dir = save_dir.join(METER_DIR);
        fs::create_dir_all(&meter_dir)
            .with_context(|| format!("cannot create meter directory '{}'", meter_dir.display()))?;
        Ok(Self {
            meter_dir,
            whole_path: save_dir.join(WHOLE_METER_FILE),
        })
    }

    pub fn meter_dir(&self) -> &Path {
        &self.meter_dir
    }

    pub fn whole_path(&self) -> &Path {
        &self.whole_path
    }

    pub fn write(&self, meters: &MeterInterface) -> Result<()> {
        for (name, history) in meters.aggregated() {
            write_json(&self.meter_dir.join(format!("{name}.json")), history)?;
        }
        write_json(&self.whole_path, &meters.summary())?;
        tracing::debug!(
            "Wrote {} epochs of meter history to '{}'",
            meters.epochs_recorded(),
            self.meter_dir.display()
        );
        Ok(())
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("cannot write '{}'", path.display()))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::meters::{MeterConfig, MeterKind, MeterSummary};

    #[test]
    fn test_writes_per_meter_and_whole_tables() {
        let dir = std::env::temp_dir().join(format!("dc_meters_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let writer = MeterWriter::new(&dir).unwrap();
        assert!(writer.meter_dir().is_dir());

        let mut config = MeterConfig::new();
        config.insert("train_loss".to_string(), MeterKind::AverageValue);
        let mut meters = MeterInterface::new(&config);
        for epoch in 0..2 {
            meters.add_value("train_loss", 1.0 / (epoch + 1) as f64).unwrap();
            meters.step();
        }
        writer.write(&meters).unwrap();

        let json = fs::read_to_string(dir.join("meters").join("train_loss.json")).unwrap();
        let history: Vec<MeterSummary> = serde_json::from_str(&json).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1]["mean"], 0.5);

        let json = fs::read_to_string(writer.whole_path()).unwrap();
        let rows: Vec<MeterSummary> = serde_json::from_str(&json).unwrap();
        assert_eq!(rows[0]["train_loss_mean"], 1.0);

        fs::remove_dir_all(&dir).ok();
    }
}
