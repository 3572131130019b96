use serde::{Deserialize, Serialize};

use crate::error::{BaselineError, Result};

/// AsLS fitting parameters. Missing fields take the defaults below when
/// deserialised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineParams {
    /// Smoothness; larger gives a stiffer baseline.
    pub lam: f64,
    /// Asymmetry in (0, 1); small values make the baseline hug the low points.
    pub p: f64,
    /// Iteration cap.
    pub niter: usize,
    /// Relative-change tolerance for early stopping.
    pub tol: Option<f64>,
    /// Absolute-change threshold for early stopping.
    pub min_delta: Option<f64>,
    /// Points below this wavenumber are not fitted and get a zero baseline.
    pub start_wavenumber: Option<f64>,
}

impl Default for BaselineParams {
    fn default() -> Self {
        Self {
            lam: 1e5,
            p: 0.01,
            niter: 10,
            tol: None,
            min_delta: None,
            start_wavenumber: None,
        }
    }
}

impl BaselineParams {
    pub fn new(lam: f64, p: f64, niter: usize) -> Self {
        Self {
            lam,
            p,
            niter,
            ..Self::default()
        }
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = Some(tol);
        self
    }

    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.min_delta = Some(min_delta);
        self
    }

    pub fn with_start_wavenumber(mut self, start: f64) -> Self {
        self.start_wavenumber = Some(start);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.lam.is_finite() && self.lam > 0.0) {
            return Err(BaselineError::InvalidParams(format!("lam must be positive, got {}", self.lam)));
        }
        if !(self.p > 0.0 && self.p < 1.0) {
            return Err(BaselineError::InvalidParams(format!("p must lie in (0, 1), got {}", self.p)));
        }
        if self.niter == 0 {
            return Err(BaselineError::InvalidParams("niter must be at least 1".into()));
        }
        for (name, value) in [("tol", self.tol), ("min_delta", self.min_delta)] {
            if let Some(v) = value {
                if !(v.is_finite() && v >= 0.0) {
                    return Err(BaselineError::InvalidParams(format!("{name} must be non-negative, got {v}")));
                }
            }
        }
        if let Some(start) = self.start_wavenumber {
            if start.is_nan() {
                return Err(BaselineError::InvalidParams("start_wavenumber is NaN".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let params = BaselineParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.lam, 1e5);
        assert_eq!(params.p, 0.01);
        assert_eq!(params.niter, 10);
    }

    #[test]
    fn rejects_out_of_range_values() {
        for bad in [
            BaselineParams::new(0.0, 0.01, 10),
            BaselineParams::new(-1.0, 0.01, 10),
            BaselineParams::new(f64::INFINITY, 0.01, 10),
            BaselineParams::new(1e5, 0.0, 10),
            BaselineParams::new(1e5, 1.0, 10),
            BaselineParams::new(1e5, 0.01, 0),
            BaselineParams::default().with_tol(-1e-3),
            BaselineParams::default().with_start_wavenumber(f64::NAN),
        ] {
            assert!(
                matches!(bad.validate(), Err(BaselineError::InvalidParams(_))),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let params: BaselineParams = serde_json::from_str(r#"{"lam": 1000.0, "start_wavenumber": 250.0}"#).unwrap();
        assert_eq!(params.lam, 1000.0);
        assert_eq!(params.p, 0.01);
        assert_eq!(params.start_wavenumber, Some(250.0));
        assert_eq!(params.tol, None);
    }
}
