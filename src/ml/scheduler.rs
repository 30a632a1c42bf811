//! Epoch-level learning-rate schedules.
//!
//! The schedule is a pure function of the number of scheduler
//! steps taken so far, so resuming a run only needs that count.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LrSchedule {
    /// Keep the base learning rate
    #[default]
    Constant,
    /// Multiply by `gamma` every `step_size` epochs
    Step { step_size: usize, gamma: f64 },
    /// Multiply by `gamma` at each milestone epoch
    MultiStep { milestones: Vec<usize>, gamma: f64 },
}

impl LrSchedule {
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Constant => {}
            Self::Step { step_size, gamma } => {
                ensure!(*step_size > 0, "step_size must be positive");
                ensure!(*gamma > 0.0, "gamma must be positive, given {gamma}");
            }
            Self::MultiStep { milestones, gamma } => {
                ensure!(*gamma > 0.0, "gamma must be positive, given {gamma}");
                ensure!(
                    milestones.windows(2).all(|w| w[0] < w[1]),
                    "milestones must be strictly increasing: {milestones:?}"
                );
            }
        }
        Ok(())
    }

    /// Learning rate after `steps` scheduler steps
    pub fn lr_at(&self, base_lr: f64, steps: usize) -> f64 {
        match self {
            Self::Constant => base_lr,
            Self::Step { step_size, gamma } => {
                base_lr * gamma.powi((steps / (*step_size).max(1)) as i32)
            }
            Self::MultiStep { milestones, gamma } => {
                let passed = milestones.iter().filter(|&&m| m <= steps).count();
                base_lr * gamma.powi(passed as i32)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant() {
        assert_eq!(LrSchedule::Constant.lr_at(0.1, 100), 0.1);
    }

    #[test]
    fn test_step_decay() {
        let s = LrSchedule::Step { step_size: 3, gamma: 0.5 };
        assert_eq!(s.lr_at(1.0, 0), 1.0);
        assert_eq!(s.lr_at(1.0, 2), 1.0);
        assert_eq!(s.lr_at(1.0, 3), 0.5);
        assert_eq!(s.lr_at(1.0, 7), 0.25);
    }

    #[test]
    fn test_multi_step() {
        let s = LrSchedule::MultiStep { milestones: vec![2, 5], gamma: 0.1 };
        assert_eq!(s.lr_at(1.0, 1), 1.0);
        assert!((s.lr_at(1.0, 2) - 0.1).abs() < 1e-12);
        assert!((s.lr_at(1.0, 6) - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_validate() {
        assert!(LrSchedule::Step { step_size: 0, gamma: 0.5 }.validate().is_err());
        assert!(LrSchedule::MultiStep { milestones: vec![5, 2], gamma: 0.5 }.validate().is_err());
        assert!(LrSchedule::MultiStep { milestones: vec![2, 5], gamma: 0.5 }.validate().is_ok());
    }

    #[test]
    fn test_json_shape() {
        let s: LrSchedule = serde_json::from_str(r#"{"kind":"step","step_size":10,"gamma":0.9}"#).unwrap();
        assert_eq!(s, LrSchedule::Step { step_size: 10, gamma: 0.9 });
    }
}
