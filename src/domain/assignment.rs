// ============================================================
// Layer 3 — Cluster-to-Class Assignment
// ============================================================
// Clustering outputs are permutation-invariant: cluster 3 may
// correspond to class 7. Accuracy is therefore measured after
// the best one-to-one relabelling of clusters, found with the
// Hungarian (Kuhn–Munkres) algorithm on the contingency table.
//
//   contingency[c][t] = #samples predicted as cluster c
//                       whose ground truth is class t
//
// Maximising matches == minimising (max_count - count).
//
// Reference: Kuhn (1955), Munkres (1957)

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Result of matching clusters to classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMatch {
    /// Fraction of samples whose matched cluster equals the target, in [0, 1]
    pub accuracy: f64,

    /// mapping[cluster] = class
    pub mapping: Vec<usize>,
}

/// Minimum-cost assignment on a square cost matrix.
///
/// Returns `assignment` where `assignment[row] = column`.
/// Runs in O(n³) using row/column potentials.
pub fn hungarian(cost: &[Vec<f64>]) -> Result<Vec<usize>> {
    let n = cost.len();
    if let Some(row) = cost.iter().position(|r| r.len() != n) {
        bail!(
            "cost matrix must be square: row {} has {} columns, expected {}",
            row,
            cost[row].len(),
            n
        );
    }
    if cost.iter().flatten().any(|c| !c.is_finite()) {
        bail!("cost matrix contains non-finite entries");
    }
    if n == 0 {
        return Ok(Vec::new());
    }

    // 1-based indexing; column 0 is a virtual column used as the
    // augmenting path root.
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; n + 1];
    let mut owner = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for row in 1..=n {
        owner[0] = row;
        let mut col0 = 0usize;
        let mut min_slack = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[col0] = true;
            let row0 = owner[col0];
            let mut delta = f64::INFINITY;
            let mut col1 = 0usize;

            for col in 1..=n {
                if used[col] {
                    continue;
                }
                let slack = cost[row0 - 1][col - 1] - u[row0] - v[col];
                if slack < min_slack[col] {
                    min_slack[col] = slack;
                    way[col] = col0;
                }
                if min_slack[col] < delta {
                    delta = min_slack[col];
                    col1 = col;
                }
            }

            for col in 0..=n {
                if used[col] {
                    u[owner[col]] += delta;
                    v[col] -= delta;
                } else {
                    min_slack[col] -= delta;
                }
            }

            col0 = col1;
            if owner[col0] == 0 {
                break;
            }
        }

        // Flip the augmenting path
        loop {
            let col1 = way[col0];
            owner[col0] = owner[col1];
            col0 = col1;
            if col0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![0usize; n];
    for col in 1..=n {
        if owner[col] != 0 {
            assignment[owner[col] - 1] = col - 1;
        }
    }
    Ok(assignment)
}

/// Best achievable accuracy for a square contingency table
/// (rows = clusters, columns = classes).
pub fn matched_accuracy(contingency: &[Vec<u64>]) -> Result<ClusterMatch> {
    let total: u64 = contingency.iter().flatten().sum();
    let max_count = contingency.iter().flatten().copied().max().unwrap_or(0);

    let cost: Vec<Vec<f64>> = contingency
        .iter()
        .map(|row| row.iter().map(|&c| (max_count - c) as f64).collect())
        .collect();
    let mapping = hungarian(&cost)?;

    let correct: u64 = mapping
        .iter()
        .enumerate()
        .map(|(cluster, &class)| contingency[cluster][class])
        .sum();

    let accuracy = if total > 0 { correct as f64 / total as f64 } else { 0.0 };
    Ok(ClusterMatch { accuracy, mapping })
}

/// Cluster accuracy of `preds` against `targets` after optimal matching.
///
/// `k` is the side of the contingency table and must exceed every
/// cluster id and every class id.
pub fn cluster_accuracy(preds: &[usize], targets: &[usize], k: usize) -> Result<ClusterMatch> {
    if preds.len() != targets.len() {
        bail!(
            "prediction/target length mismatch: {} vs {}",
            preds.len(),
            targets.len()
        );
    }

    let mut contingency = vec![vec![0u64; k]; k];
    for (&p, &t) in preds.iter().zip(targets) {
        if p >= k || t >= k {
            bail!("label out of range: prediction {p}, target {t}, k = {k}");
        }
        contingency[p][t] += 1;
    }

    matched_accuracy(&contingency)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hungarian_identity_is_optimal() {
        let cost = vec![
            vec![0.0, 5.0, 5.0],
            vec![5.0, 0.0, 5.0],
            vec![5.0, 5.0, 0.0],
        ];
        assert_eq!(hungarian(&cost).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_hungarian_classic_example() {
        // Unique optimum: 15 + 25 + 30
        let cost = vec![
            vec![40.0, 60.0, 15.0],
            vec![25.0, 30.0, 45.0],
            vec![55.0, 30.0, 25.0],
        ];
        let a = hungarian(&cost).unwrap();
        let total: f64 = a.iter().enumerate().map(|(r, &c)| cost[r][c]).sum();
        assert_eq!(total, 70.0);
        assert_eq!(a, vec![2, 0, 1]);
    }

    #[test]
    fn test_hungarian_rejects_non_square() {
        let cost = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(hungarian(&cost).is_err());
    }

    #[test]
    fn test_hungarian_empty() {
        assert!(hungarian(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_permuted_clusters_score_perfectly() {
        // Clusters relabel the classes: cluster 0→2, 1→0, 2→1
        let targets = vec![0, 0, 1, 1, 2, 2];
        let preds = vec![1, 1, 2, 2, 0, 0];
        let m = cluster_accuracy(&preds, &targets, 3).unwrap();
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.mapping, vec![2, 0, 1]);
    }

    #[test]
    fn test_partial_accuracy() {
        let targets = vec![0, 0, 0, 1];
        let preds = vec![1, 1, 0, 0];
        // best: cluster1→class0 (2 hits), cluster0→class1 (1 hit)
        let m = cluster_accuracy(&preds, &targets, 2).unwrap();
        assert!((m.accuracy - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_empty_predictions_score_zero() {
        let m = cluster_accuracy(&[], &[], 4).unwrap();
        assert_eq!(m.accuracy, 0.0);
    }

    #[test]
    fn test_out_of_range_label_is_rejected() {
        assert!(cluster_accuracy(&[3], &[0], 3).is_err());
        assert!(cluster_accuracy(&[0, 1], &[0], 3).is_err());
    }
}
