// ============================================================
// Layer 5 — Information-Theoretic Losses
// ============================================================
// All losses work on [batch, k] tensors.
//
//   Entropy                 H(p) = -Σ_k p·ln p               per row
//   KlDivergence            Σ_k -t·ln(p / t)                 per row / mean
//   JsDivergence            ½ KL(p‖m) + ½ KL(q‖m),  m = (p+q)/2
//   ImsatMutualInformation  μ·H(mean p) − mean H(p)          (maximise)
//   PerturbationLoss        D(softmax(z_t), softmax(z))      (minimise)
//   IicLoss                 −I(z; z_t) from the joint table  (minimise)
//
// Losses that take logits refuse inputs that are already
// probability distributions: feeding softmax outputs twice is the
// most common way to silently break these objectives.
//
// Reference: Hu et al. (2017) IMSAT, Ji et al. (2019) IIC

use anyhow::{bail, ensure, Result};
use burn::{prelude::*, tensor::activation::softmax};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Tolerance used when checking that rows sum to one
const SIMPLEX_TOLERANCE: f32 = 1e-4;

/// Default numerical floor inside logarithms
pub const DEFAULT_EPS: f64 = 1e-8;

/// True when every row of `t` is non-negative and sums to one.
pub fn is_simplex<B: Backend>(t: &Tensor<B, 2>) -> bool {
    let sums = t.clone().sum_dim(1).into_data().convert::<f32>();
    let min = t.clone().min().into_data().convert::<f32>();
    match (sums.to_vec::<f32>(), min.to_vec::<f32>()) {
        (Ok(sums), Ok(min)) => {
            min.first().is_some_and(|&m| m >= 0.0)
                && sums.iter().all(|s| (s - 1.0).abs() < SIMPLEX_TOLERANCE)
        }
        _ => false,
    }
}

fn ensure_logits<B: Backend>(t: &Tensor<B, 2>, what: &str) -> Result<()> {
    if is_simplex(t) {
        bail!("{what} must be logits, but every row is already a probability distribution");
    }
    Ok(())
}

// ─── Entropy ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy)]
pub struct Entropy {
    pub eps: f64,
}

impl Default for Entropy {
    fn default() -> Self {
        Self { eps: DEFAULT_EPS }
    }
}

impl Entropy {
    pub fn new(eps: f64) -> Self {
        Self { eps }
    }

    /// probs: [batch, k] (rows on the simplex) → [batch]
    pub fn forward<B: Backend>(&self, probs: Tensor<B, 2>) -> Tensor<B, 1> {
        debug_assert!(is_simplex(&probs), "entropy input must be a probability simplex");
        let [batch, _] = probs.dims();
        (probs.clone() * probs.add_scalar(self.eps).log())
            .sum_dim(1)
            .neg()
            .reshape([batch])
    }
}

// ─── KL / JS divergence ───────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy)]
pub struct KlDivergence {
    pub eps:    f64,
    pub reduce: bool,
}

impl Default for KlDivergence {
    fn default() -> Self {
        Self { eps: DEFAULT_EPS, reduce: true }
    }
}

impl KlDivergence {
    /// KL(target ‖ prob). Returns [1] when reducing, [batch] otherwise.
    pub fn forward<B: Backend>(&self, prob: Tensor<B, 2>, target: Tensor<B, 2>) -> Tensor<B, 1> {
        let [batch, _] = target.dims();
        let ratio = prob.add_scalar(self.eps) / target.clone().add_scalar(self.eps);
        let kl = (target.neg() * ratio.log()).sum_dim(1).reshape([batch]);
        if self.reduce {
            kl.mean()
        } else {
            kl
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsDivergence {
    pub kl: KlDivergence,
}

impl JsDivergence {
    pub fn forward<B: Backend>(&self, p: Tensor<B, 2>, q: Tensor<B, 2>) -> Tensor<B, 1> {
        let mixture = (p.clone() + q.clone()).div_scalar(2.0);
        (self.kl.forward(mixture.clone(), p) + self.kl.forward(mixture, q)).div_scalar(2.0)
    }
}

/// Distance between two prediction distributions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distance {
    #[default]
    Kl,
    Js,
}

impl FromStr for Distance {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "kl" => Ok(Self::Kl),
            "js" => Ok(Self::Js),
            other => bail!("unknown distance '{other}' (expected kl or js)"),
        }
    }
}

impl Distance {
    /// Batch-averaged distance between `prob` and `target`: [1]
    pub fn forward<B: Backend>(&self, prob: Tensor<B, 2>, target: Tensor<B, 2>) -> Tensor<B, 1> {
        match self {
            Self::Kl => KlDivergence::default().forward(prob, target),
            Self::Js => JsDivergence::default().forward(prob, target),
        }
    }
}

// ─── IMSAT ────────────────────────────────────────────────────────────────────
/// MI(X, Y) = H(Y) − H(Y|X), estimated on a batch as
/// μ·H(mean_batch(p)) − mean_batch(H(p)).
#[derive(Debug, Clone, Copy)]
pub struct ImsatMutualInformation {
    mu:      f64,
    entropy: Entropy,
}

impl ImsatMutualInformation {
    pub fn new(mu: f64, eps: f64) -> Result<Self> {
        ensure!(mu > 0.0, "mu should be positive, given {mu}");
        Ok(Self { mu, entropy: Entropy::new(eps) })
    }

    /// logits: [batch, k] → [1]
    pub fn forward<B: Backend>(&self, logits: Tensor<B, 2>) -> Result<Tensor<B, 1>> {
        ensure_logits(&logits, "IMSAT input")?;
        let probs = softmax(logits, 1);
        let p_average = probs.clone().mean_dim(0);

        let marginal_entropy = self.entropy.forward(p_average).mul_scalar(self.mu);
        let conditional_entropy = self.entropy.forward(probs).mean();
        Ok(marginal_entropy - conditional_entropy)
    }
}

/// Self-augmentation term: distance between predictions on an
/// image and on its perturbed copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerturbationLoss {
    pub distance: Distance,
}

impl PerturbationLoss {
    pub fn new(distance: Distance) -> Self {
        Self { distance }
    }

    pub fn forward<B: Backend>(
        &self,
        logits:   Tensor<B, 2>,
        logits_t: Tensor<B, 2>,
    ) -> Result<Tensor<B, 1>> {
        ensure_logits(&logits, "original prediction")?;
        ensure_logits(&logits_t, "transformed prediction")?;
        let pred = softmax(logits, 1);
        let pred_t = softmax(logits_t, 1);
        Ok(self.distance.forward(pred_t, pred))
    }
}

// ─── IIC ──────────────────────────────────────────────────────────────────────
pub struct IicLossOutput<B: Backend> {
    /// Loss with the configured λ; this is what gets minimised
    pub loss:           Tensor<B, 1>,
    /// Loss with λ = 1, i.e. the negative mutual information
    pub loss_no_lambda: Tensor<B, 1>,
}

#[derive(Debug, Clone, Copy)]
pub struct IicLoss {
    pub lambda: f64,
    pub eps:    f64,
}

impl Default for IicLoss {
    fn default() -> Self {
        Self { lambda: 1.0, eps: f64::EPSILON }
    }
}

impl IicLoss {
    pub fn new(lambda: f64) -> Self {
        Self { lambda, ..Self::default() }
    }

    /// Symmetric, normalised joint distribution of the two views: [k, k]
    pub fn joint<B: Backend>(&self, probs: Tensor<B, 2>, probs_t: Tensor<B, 2>) -> Tensor<B, 2> {
        let joint = probs.transpose().matmul(probs_t);
        let joint = (joint.clone() + joint.transpose()).div_scalar(2.0);
        let total = joint.clone().sum().reshape([1, 1]);
        joint / total
    }

    pub fn forward<B: Backend>(
        &self,
        logits:   Tensor<B, 2>,
        logits_t: Tensor<B, 2>,
    ) -> Result<IicLossOutput<B>> {
        ensure!(
            logits.dims() == logits_t.dims(),
            "IIC views disagree in shape: {:?} vs {:?}",
            logits.dims(),
            logits_t.dims()
        );
        ensure_logits(&logits, "IIC input")?;
        ensure_logits(&logits_t, "IIC transformed input")?;

        let [_, k] = logits.dims();
        let joint = self.joint(softmax(logits, 1), softmax(logits_t, 1));

        let p_i = joint.clone().sum_dim(1).clamp_min(self.eps).expand([k, k]);
        let p_j = joint.clone().sum_dim(0).clamp_min(self.eps).expand([k, k]);
        let joint = joint.clamp_min(self.eps);

        let (log_joint, log_p_i, log_p_j) = (joint.clone().log(), p_i.log(), p_j.log());

        let loss = (joint.clone()
            * (log_joint.clone()
                - log_p_j.clone().mul_scalar(self.lambda)
                - log_p_i.clone().mul_scalar(self.lambda)))
            .sum()
            .neg();
        let loss_no_lambda = (joint * (log_joint - log_p_j - log_p_i)).sum().neg();

        Ok(IicLossOutput { loss, loss_no_lambda })
    }
}
