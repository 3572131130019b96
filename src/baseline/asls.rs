use super::params::BaselineParams;
use crate::error::{BaselineError, Result};

/// Shortest input the second-difference penalty is defined for.
pub const MIN_POINTS: usize = 3;

/// Weights are clamped into `[WEIGHT_EPS, 1 - WEIGHT_EPS]`; also the
/// denominator guard in the relative-change test.
pub const WEIGHT_EPS: f64 = 1e-8;

const SECOND_DIFFERENCE: [f64; 3] = [1.0, -2.0, 1.0];

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Outcome of one AsLS solve.
#[derive(Debug, Clone, PartialEq)]
pub struct AslsFit {
    pub baseline: Vec<f64>,
    /// Iterations actually run (at most `niter`).
    pub iterations: usize,
    /// Whether the tolerance test stopped the loop early. Never set by an
    /// iteration whose solve failed.
    pub converged: bool,
    /// Iterations whose linear solve failed and reused the previous estimate.
    pub recovered: usize,
}

/// Fit an asymmetric least-squares baseline and return only the baseline.
pub fn asls(y: &[f64], params: &BaselineParams) -> Result<Vec<f64>> {
    fit(y, params).map(|fit| fit.baseline)
}

/// Eilers–Boelens asymmetric least squares.
///
/// Each iteration solves `(W + lam·DᵀD) z = W y` with `D` the second-difference
/// operator, then reweights: points above `z` get weight `p`, points on or
/// below get `1 - p`. A failed solve keeps the previous `z` instead of
/// aborting. Inputs shorter than [`MIN_POINTS`] are rejected up front.
pub fn fit(y: &[f64], params: &BaselineParams) -> Result<AslsFit> {
    check_input(y)?;
    params.validate()?;

    let penalty = BandedPenalty::second_difference(y.len(), params.lam);
    Ok(iterate(y, params, |weights, rhs| penalty.solve(weights, rhs)))
}

fn check_input(y: &[f64]) -> Result<()> {
    if y.len() < MIN_POINTS {
        return Err(BaselineError::DegenerateInput {
            len: y.len(),
            min: MIN_POINTS,
        });
    }
    if let Some(index) = y.iter().position(|v| !v.is_finite()) {
        return Err(BaselineError::NonFinite { index });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reweighting loop
// ---------------------------------------------------------------------------

fn iterate<F>(y: &[f64], params: &BaselineParams, mut solve: F) -> AslsFit
where
    F: FnMut(&[f64], &[f64]) -> Result<Vec<f64>>,
{
    let mut weights = vec![1.0; y.len()];
    let mut current: Option<Vec<f64>> = None;
    let mut iterations = 0;
    let mut recovered = 0;
    let mut converged = false;

    while iterations < params.niter {
        iterations += 1;

        let rhs: Vec<f64> = weights.iter().zip(y).map(|(w, v)| w * v).collect();
        let (z, solved) = match solve(&weights, &rhs) {
            Ok(z) => (z, true),
            Err(err) => {
                recovered += 1;
                log::warn!("AsLS iteration {iterations}: {err}, keeping previous estimate");
                // Nothing to fall back on in the first iteration but the signal itself.
                (current.clone().unwrap_or_else(|| y.to_vec()), false)
            }
        };

        update_weights(&mut weights, y, &z, params.p);

        // A reused estimate has zero change and says nothing about convergence.
        let done = solved
            && current
                .as_deref()
                .is_some_and(|prev| has_converged(prev, &z, params));
        current = Some(z);
        if done {
            log::debug!("AsLS converged after {iterations} iterations");
            converged = true;
            break;
        }
    }

    AslsFit {
        baseline: current.unwrap_or_else(|| y.to_vec()),
        iterations,
        converged,
        recovered,
    }
}

fn update_weights(weights: &mut [f64], y: &[f64], z: &[f64], p: f64) {
    for ((w, &yi), &zi) in weights.iter_mut().zip(y).zip(z) {
        let raw = if yi > zi { p } else { 1.0 - p };
        *w = raw.clamp(WEIGHT_EPS, 1.0 - WEIGHT_EPS);
    }
}

fn has_converged(prev: &[f64], next: &[f64], params: &BaselineParams) -> bool {
    let delta = prev
        .iter()
        .zip(next)
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f64>()
        .sqrt();
    let scale = prev.iter().map(|v| v * v).sum::<f64>().sqrt();

    params.tol.is_some_and(|tol| delta / (scale + WEIGHT_EPS) < tol)
        || params.min_delta.is_some_and(|min| delta < min)
}

// ---------------------------------------------------------------------------
// Banded penalty and solver
// ---------------------------------------------------------------------------

/// Symmetric matrix with half-bandwidth 2, stored by diagonals:
/// `diag[i] = A[i][i]`, `sub1[i] = A[i][i-1]`, `sub2[i] = A[i][i-2]`.
#[derive(Debug, Clone)]
struct BandedPenalty {
    diag: Vec<f64>,
    sub1: Vec<f64>,
    sub2: Vec<f64>,
}

impl BandedPenalty {
    /// `lam · DᵀD` for the second-difference operator on `n` points.
    fn second_difference(n: usize, lam: f64) -> Self {
        let mut diag = vec![0.0; n];
        let mut sub1 = vec![0.0; n];
        let mut sub2 = vec![0.0; n];

        // Each row of D is the stencil [1, -2, 1] starting at `row`; DᵀD is
        // the sum of the stencil's outer products.
        for row in 0..n.saturating_sub(2) {
            for a in 0..3 {
                let sa = SECOND_DIFFERENCE[a];
                diag[row + a] += lam * sa * sa;
                for (b, &sb) in SECOND_DIFFERENCE.iter().enumerate().take(a) {
                    let v = lam * sa * sb;
                    if a - b == 1 {
                        sub1[row + a] += v;
                    } else {
                        sub2[row + a] += v;
                    }
                }
            }
        }

        Self { diag, sub1, sub2 }
    }

    /// Solve `(diag(weights) + self) · z = rhs` with a banded Cholesky
    /// factorisation `L·Lᵀ`, `L` lower triangular with two sub-diagonals.
    fn solve(&self, weights: &[f64], rhs: &[f64]) -> Result<Vec<f64>> {
        let n = self.diag.len();
        let mut l0 = vec![0.0; n];
        let mut l1 = vec![0.0; n];
        let mut l2 = vec![0.0; n];

        for i in 0..n {
            let a0 = self.diag[i] + weights[i];
            if i >= 2 {
                l2[i] = self.sub2[i] / l0[i - 2];
            }
            if i >= 1 {
                let carry = if i >= 2 { l2[i] * l1[i - 1] } else { 0.0 };
                l1[i] = (self.sub1[i] - carry) / l0[i - 1];
            }
            let pivot = a0 - l1[i] * l1[i] - l2[i] * l2[i];
            if !pivot.is_finite() || pivot <= f64::EPSILON * a0.abs() {
                return Err(BaselineError::Singular { row: i });
            }
            l0[i] = pivot.sqrt();
        }

        // L·u = rhs
        let mut u = vec![0.0; n];
        for i in 0..n {
            let mut acc = rhs[i];
            if i >= 1 {
                acc -= l1[i] * u[i - 1];
            }
            if i >= 2 {
                acc -= l2[i] * u[i - 2];
            }
            u[i] = acc / l0[i];
        }

        // Lᵀ·z = u
        let mut z = vec![0.0; n];
        for i in (0..n).rev() {
            let mut acc = u[i];
            if i + 1 < n {
                acc -= l1[i + 1] * z[i + 1];
            }
            if i + 2 < n {
                acc -= l2[i + 2] * z[i + 2];
            }
            z[i] = acc / l0[i];
        }

        if let Some(row) = z.iter().position(|v| !v.is_finite()) {
            return Err(BaselineError::Singular { row });
        }
        Ok(z)
    }
}
