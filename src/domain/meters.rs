// ============================================================
// Layer 3 — Meters
// ============================================================
// A meter accumulates values during one epoch and reduces them
// to a handful of named numbers at the end of it.
//
// MeterInterface owns a named set of meters plus the per-epoch
// history of their summaries:
//
//   add_value / add_predictions   during the epoch
//   step()                        epoch boundary: snapshot + reset
//   summary()                     one row per finished epoch
//
// The whole interface (live meters + history) serialises to a
// MeterState, which is what checkpoints carry so that a resumed
// run continues the same history.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::assignment::matched_accuracy;

/// One reduced row: field name → value
pub type MeterSummary = BTreeMap<String, f64>;

/// Common behaviour of all meters.
pub trait Meter {
    /// Clear everything accumulated so far
    fn reset(&mut self);

    /// Reduce the accumulated values. Empty meters return an empty map.
    fn summary(&self) -> MeterSummary;
}

// ─── AverageValueMeter ────────────────────────────────────────────────────────
/// Running mean and sample standard deviation of scalar values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AverageValueMeter {
    n: u64,
    sum: f64,
    sum_sq: f64,
}

impl AverageValueMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.n += 1;
        self.sum += value;
        self.sum_sq += value * value;
    }

    pub fn count(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> Option<f64> {
        (self.n > 0).then(|| self.sum / self.n as f64)
    }

    pub fn std(&self) -> Option<f64> {
        let mean = self.mean()?;
        if self.n < 2 {
            return Some(0.0);
        }
        let n = self.n as f64;
        let var = (self.sum_sq - n * mean * mean) / (n - 1.0);
        Some(var.max(0.0).sqrt())
    }
}

impl Meter for AverageValueMeter {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn summary(&self) -> MeterSummary {
        let mut out = MeterSummary::new();
        if let (Some(mean), Some(std)) = (self.mean(), self.std()) {
            out.insert("mean".to_string(), mean);
            out.insert("std".to_string(), std);
        }
        out
    }
}

// ─── ConfusionMatrixMeter ─────────────────────────────────────────────────────
/// Counts (prediction, target) pairs in a square matrix.
/// Rows are predictions (cluster ids), columns are targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrixMeter {
    num_classes: usize,
    matrix: Vec<Vec<u64>>,
}

impl ConfusionMatrixMeter {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![vec![0; num_classes]; num_classes],
        }
    }

    pub fn add(&mut self, preds: &[usize], targets: &[usize]) -> Result<()> {
        if preds.len() != targets.len() {
            bail!(
                "confusion matrix: {} predictions but {} targets",
                preds.len(),
                targets.len()
            );
        }
        if let Some((p, t)) = preds
            .iter()
            .zip(targets)
            .find(|(p, t)| **p >= self.num_classes || **t >= self.num_classes)
        {
            bail!(
                "confusion matrix: pair ({p}, {t}) outside {} classes",
                self.num_classes
            );
        }
        for (&p, &t) in preds.iter().zip(targets) {
            self.matrix[p][t] += 1;
        }
        Ok(())
    }

    pub fn total(&self) -> u64 {
        self.matrix.iter().flatten().sum()
    }
}

impl Meter for ConfusionMatrixMeter {
    fn reset(&mut self) {
        self.matrix = vec![vec![0; self.num_classes]; self.num_classes];
    }

    fn summary(&self) -> MeterSummary {
        let mut out = MeterSummary::new();
        let total = self.total();
        if total == 0 {
            return out;
        }
        let diag: u64 = (0..self.num_classes).map(|i| self.matrix[i][i]).sum();
        out.insert("acc".to_string(), diag as f64 / total as f64);

        match matched_accuracy(&self.matrix) {
            Ok(m) => {
                out.insert("hungarian_acc".to_string(), m.accuracy);
            }
            Err(e) => tracing::warn!("hungarian matching failed: {e:#}"),
        }
        out
    }
}

// ─── MeterInterface ───────────────────────────────────────────────────────────
/// What kind of meter to create under a name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeterKind {
    AverageValue,
    ConfusionMatrix { num_classes: usize },
}

/// Meter name → kind
pub type MeterConfig = BTreeMap<String, MeterKind>;

/// A live meter of any supported kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnyMeter {
    AverageValue(AverageValueMeter),
    ConfusionMatrix(ConfusionMatrixMeter),
}

impl AnyMeter {
    fn from_kind(kind: &MeterKind) -> Self {
        match kind {
            MeterKind::AverageValue => Self::AverageValue(AverageValueMeter::new()),
            MeterKind::ConfusionMatrix { num_classes } => {
                Self::ConfusionMatrix(ConfusionMatrixMeter::new(*num_classes))
            }
        }
    }
}

impl Meter for AnyMeter {
    fn reset(&mut self) {
        match self {
            Self::AverageValue(m) => m.reset(),
            Self::ConfusionMatrix(m) => m.reset(),
        }
    }

    fn summary(&self) -> MeterSummary {
        match self {
            Self::AverageValue(m) => m.summary(),
            Self::ConfusionMatrix(m) => m.summary(),
        }
    }
}

/// Serialisable snapshot of a MeterInterface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterState {
    pub meters: BTreeMap<String, AnyMeter>,
    pub history: BTreeMap<String, Vec<MeterSummary>>,
}

/// Named meters plus their per-epoch history.
#[derive(Debug, Clone)]
pub struct MeterInterface {
    meters: BTreeMap<String, AnyMeter>,
    history: BTreeMap<String, Vec<MeterSummary>>,
}

impl MeterInterface {
    pub fn new(config: &MeterConfig) -> Self {
        let meters = config
            .iter()
            .map(|(name, kind)| (name.clone(), AnyMeter::from_kind(kind)))
            .collect();
        let history = config.keys().map(|name| (name.clone(), Vec::new())).collect();
        Self { meters, history }
    }

    pub fn add_value(&mut self, name: &str, value: f64) -> Result<()> {
        match self.meters.get_mut(name) {
            Some(AnyMeter::AverageValue(m)) => {
                m.add(value);
                Ok(())
            }
            Some(_) => bail!("meter '{name}' does not accept scalar values"),
            None => bail!("unknown meter '{name}'"),
        }
    }

    pub fn add_predictions(&mut self, name: &str, preds: &[usize], targets: &[usize]) -> Result<()> {
        match self.meters.get_mut(name) {
            Some(AnyMeter::ConfusionMatrix(m)) => m
                .add(preds, targets)
                .with_context(|| format!("meter '{name}'")),
            Some(_) => bail!("meter '{name}' does not accept predictions"),
            None => bail!("unknown meter '{name}'"),
        }
    }

    /// Epoch boundary: append every meter's summary to its history and reset it.
    pub fn step(&mut self) {
        for (name, meter) in self.meters.iter_mut() {
            self.history
                .entry(name.clone())
                .or_default()
                .push(meter.summary());
            meter.reset();
        }
    }

    /// Number of completed epochs recorded
    pub fn epochs_recorded(&self) -> usize {
        self.history.values().map(Vec::len).max().unwrap_or(0)
    }

    /// Per-meter history, one summary per epoch
    pub fn aggregated(&self) -> &BTreeMap<String, Vec<MeterSummary>> {
        &self.history
    }

    /// Whole-meter table: one row per epoch, columns `<meter>_<field>`.
    pub fn summary(&self) -> Vec<MeterSummary> {
        let mut rows = vec![MeterSummary::new(); self.epochs_recorded()];
        for (name, epochs) in &self.history {
            for (row, summary) in rows.iter_mut().zip(epochs) {
                for (field, value) in summary {
                    row.insert(format!("{name}_{field}"), *value);
                }
            }
        }
        rows
    }

    pub fn state(&self) -> MeterState {
        MeterState {
            meters: self.meters.clone(),
            history: self.history.clone(),
        }
    }

    /// Restore from a checkpoint. Every configured meter must be present.
    pub fn load_state(&mut self, state: MeterState) -> Result<()> {
        if let Some(missing) = self.meters.keys().find(|k| !state.meters.contains_key(*k)) {
            bail!("checkpoint has no state for meter '{missing}'");
        }
        self.meters = state.meters;
        self.history = state.history;
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MeterConfig {
        let mut c = MeterConfig::new();
        c.insert("loss".to_string(), MeterKind::AverageValue);
        c.insert(
            "val".to_string(),
            MeterKind::ConfusionMatrix { num_classes: 2 },
        );
        c
    }

    #[test]
    fn test_average_value_meter() {
        let mut m = AverageValueMeter::new();
        assert!(m.summary().is_empty());
        for v in [1.0, 2.0, 3.0] {
            m.add(v);
        }
        let s = m.summary();
        assert!((s["mean"] - 2.0).abs() < 1e-12);
        assert!((s["std"] - 1.0).abs() < 1e-12);
        m.reset();
        assert_eq!(m.count(), 0);
    }

    #[test]
    fn test_confusion_matrix_accuracies() {
        let mut m = ConfusionMatrixMeter::new(2);
        // every prediction is the swapped class
        m.add(&[1, 1, 0], &[0, 0, 1]).unwrap();
        let s = m.summary();
        assert_eq!(s["acc"], 0.0);
        assert_eq!(s["hungarian_acc"], 1.0);
    }

    #[test]
    fn test_confusion_matrix_rejects_bad_input() {
        let mut m = ConfusionMatrixMeter::new(2);
        assert!(m.add(&[2], &[0]).is_err());
        assert!(m.add(&[0, 1], &[0]).is_err());
        assert_eq!(m.total(), 0);
    }

    #[test]
    fn test_step_records_history_and_resets() {
        let mut mi = MeterInterface::new(&config());
        mi.add_value("loss", 4.0).unwrap();
        mi.add_predictions("val", &[0, 1], &[0, 1]).unwrap();
        mi.step();
        mi.add_value("loss", 2.0).unwrap();
        mi.step();

        assert_eq!(mi.epochs_recorded(), 2);
        let rows = mi.summary();
        assert_eq!(rows[0]["loss_mean"], 4.0);
        assert_eq!(rows[1]["loss_mean"], 2.0);
        assert_eq!(rows[0]["val_acc"], 1.0);
        // nothing was added to "val" during epoch 2
        assert!(!rows[1].contains_key("val_acc"));
    }

    #[test]
    fn test_kind_mismatch_and_unknown_meter() {
        let mut mi = MeterInterface::new(&config());
        assert!(mi.add_value("val", 1.0).is_err());
        assert!(mi.add_predictions("loss", &[0], &[0]).is_err());
        assert!(mi.add_value("missing", 1.0).is_err());
    }

    #[test]
    fn test_state_survives_json() {
        let mut mi = MeterInterface::new(&config());
        mi.add_value("loss", 1.5).unwrap();
        mi.step();
        mi.add_value("loss", 0.5).unwrap();

        let json = serde_json::to_string(&mi.state()).unwrap();
        let state: MeterState = serde_json::from_str(&json).unwrap();

        let mut restored = MeterInterface::new(&config());
        restored.load_state(state).unwrap();
        assert_eq!(restored.summary(), mi.summary());
        restored.step();
        assert_eq!(restored.summary()[1]["loss_mean"], 0.5);
    }

    #[test]
    fn test_load_state_requires_all_meters() {
        let mut mi = MeterInterface::new(&config());
        assert!(mi.load_state(MeterState::default()).is_err());
    }
}
