// ============================================================
// Layer 5 — Cluster Evaluation
// ============================================================
// Runs a network over a validation loader and scores each
// output head by Hungarian-matched accuracy.
//
//   batch.images ──► forward ──► [logits per head]
//                                   │ argmax(1)
//                                   ▼
//                       predictions per head + targets
//                                   │ cluster_accuracy
//                                   ▼
//                            best head, its accuracy
//
// Used both by the trainers' eval loops and by `evaluate`.

use anyhow::{anyhow, bail, ensure, Result};
use burn::{data::dataloader::DataLoader, prelude::*};

use crate::data::batcher::ClusterBatch;
use crate::domain::assignment::{cluster_accuracy, ClusterMatch};

/// Hard assignments for every head over a whole loader.
#[derive(Debug, Clone, Default)]
pub struct Predictions {
    pub per_head: Vec<Vec<usize>>,
    pub targets:  Vec<usize>,
}

/// Score of the best head in a Predictions set.
#[derive(Debug, Clone)]
pub struct HeadScore {
    pub head:        usize,
    pub cluster:     ClusterMatch,
    pub predictions: Vec<usize>,
}

/// Integer tensor → Vec<usize>
pub fn to_labels<B: Backend>(t: Tensor<B, 1, Int>) -> Result<Vec<usize>> {
    let values: Vec<i64> = t
        .into_data()
        .convert::<i64>()
        .to_vec()
        .map_err(|e| anyhow!("cannot read label tensor: {e:?}"))?;
    values
        .into_iter()
        .map(|v| usize::try_from(v).map_err(|_| anyhow!("negative label {v}")))
        .collect()
}

/// Cluster id per row: [batch, k] → batch labels
pub fn argmax_labels<B: Backend>(logits: Tensor<B, 2>) -> Result<Vec<usize>> {
    let [batch, _] = logits.dims();
    to_labels(logits.argmax(1).reshape([batch]))
}

/// Read a one-element tensor as f64, rejecting NaN/inf.
pub fn finite_scalar<B: Backend>(t: &Tensor<B, 1>, what: &str) -> Result<f64> {
    let value = t.clone().into_scalar().elem::<f64>();
    ensure!(value.is_finite(), "{what} is not finite ({value})");
    Ok(value)
}

/// Run `forward` over every batch, collecting argmax predictions per head.
pub fn collect_predictions<B, F>(
    loader:  &dyn DataLoader<ClusterBatch<B>>,
    forward: F,
) -> Result<Predictions>
where
    B: Backend,
    F: Fn(Tensor<B, 4>) -> Vec<Tensor<B, 2>>,
{
    let mut out = Predictions::default();

    for batch in loader.iter() {
        let heads = forward(batch.images);
        if out.per_head.is_empty() {
            out.per_head = vec![Vec::new(); heads.len()];
        }
        ensure!(
            heads.len() == out.per_head.len(),
            "network returned {} heads, expected {}",
            heads.len(),
            out.per_head.len()
        );
        for (preds, logits) in out.per_head.iter_mut().zip(heads) {
            preds.extend(argmax_labels(logits)?);
        }
        out.targets.extend(to_labels(batch.labels)?);
    }

    Ok(out)
}

impl Predictions {
    /// Head with the highest Hungarian accuracy. Ties keep the first head.
    pub fn best_head(&self, num_classes: usize) -> Result<HeadScore> {
        if self.targets.is_empty() {
            bail!("no validation samples to evaluate");
        }
        let mut best: Option<HeadScore> = None;
        for (head, preds) in self.per_head.iter().enumerate() {
            let cluster = cluster_accuracy(preds, &self.targets, num_classes)?;
            tracing::debug!("head {} accuracy {:.4}", head, cluster.accuracy);
            if best.as_ref().map_or(true, |b| cluster.accuracy > b.cluster.accuracy) {
                best = Some(HeadScore { head, cluster, predictions: preds.clone() });
            }
        }
        best.ok_or_else(|| anyhow!("network produced no heads"))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TB = NdArray;

    #[test]
    fn test_argmax_labels() {
        let device = Default::default();
        let logits = Tensor::<TB, 2>::from_floats([[0.1, 2.0, 0.3], [5.0, 1.0, 0.0]], &device);
        assert_eq!(argmax_labels(logits).unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_finite_scalar_rejects_nan() {
        let device = Default::default();
        let ok = Tensor::<TB, 1>::from_floats([1.5], &device);
        assert_eq!(finite_scalar(&ok, "loss").unwrap(), 1.5);
        let nan = Tensor::<TB, 1>::from_floats([f32::NAN], &device);
        assert!(finite_scalar(&nan, "loss").is_err());
    }

    #[test]
    fn test_best_head_picks_highest_accuracy() {
        let preds = Predictions {
            // head 0 is a permutation of the targets; head 1 is constant
            per_head: vec![vec![1, 1, 0, 0], vec![0, 0, 0, 0]],
            targets:  vec![0, 0, 1, 1],
        };
        let best = preds.best_head(2).unwrap();
        assert_eq!(best.head, 0);
        assert_eq!(best.cluster.accuracy, 1.0);
    }

    #[test]
    fn test_best_head_requires_samples() {
        assert!(Predictions::default().best_head(2).is_err());
    }
}
