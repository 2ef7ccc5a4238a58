//! Significance of a Pearson correlation coefficient.
//!
//! Two-tailed test of H0: ρ = 0 using Student's t with `n - 2` degrees of
//! freedom:
//!
//!   t = r·√(df / (1 − r²)),   p = 2·P(T > |t|)

use crate::config::AnalysisConfig;
use crate::model::SnowlagError;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Significance {
    pub p_value: f64,
    pub significant: bool,
}

#[derive(Debug, Clone)]
pub struct SignificanceTester {
    alpha: f64,
    min_sample_size: usize,
}

impl SignificanceTester {
    pub fn new(alpha: f64, min_sample_size: usize) -> Self {
        Self { alpha, min_sample_size }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.significance_alpha, config.min_sample_size)
    }

    /// p-value and verdict for `correlation` measured over `sample_size` pairs.
    ///
    /// Fails with `DataInsufficient` below three pairs, where the test has
    /// no degrees of freedom. A result is significant only if `p < alpha`
    /// and the sample reaches the configured minimum.
    pub fn test(&self, correlation: f64, sample_size: usize) -> Result<Significance, SnowlagError> {
        if sample_size < 3 {
            return Err(SnowlagError::DataInsufficient {
                context: "significance test".to_string(),
                available: sample_size,
                required: 3,
            });
        }
        let p_value = two_tailed_p_value(correlation, sample_size)?;
        Ok(Significance {
            p_value,
            significant: p_value < self.alpha && sample_size >= self.min_sample_size,
        })
    }
}

/// Two-tailed p-value for Pearson `r` over `n >= 3` pairs.
pub fn two_tailed_p_value(r: f64, n: usize) -> Result<f64, SnowlagError> {
    let df = n.saturating_sub(2) as f64;
    let r = if r.is_finite() { r.clamp(-1.0, 1.0) } else { 0.0 };
    let r2 = r * r;
    if r2 >= 1.0 {
        return Ok(0.0);
    }
    let t = (r2 * df / (1.0 - r2)).sqrt();
    let dist = StudentsT::new(0.0, 1.0, df).map_err(|e| SnowlagError::DataInsufficient {
        context: format!("t distribution with {} degrees of freedom: {}", df, e),
        available: n,
        required: 3,
    })?;
    Ok((2.0 * dist.sf(t)).clamp(0.0, 1.0))
}
