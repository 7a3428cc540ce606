//! Robust feature scaling.
//!
//! Centers each feature on its median and scales by the interquartile
//! range. Fitting is GLOBAL: the scaler is fit once over the entire
//! training set and the fitted state is persisted and reused verbatim for
//! every inference request. Refitting per sequence group or per request is
//! undefined for a single window and is deliberately unsupported.

use serde::{Deserialize, Serialize};

/// Errors from fitting or applying a scaler.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScaleError {
    #[error("feature width mismatch: block of {got} values is not a multiple of {expected} features")]
    WidthMismatch { expected: usize, got: usize },

    #[error("cannot fit a scaler on an empty block")]
    EmptyBlock,
}

/// Median/IQR scaler over a flat row-major block.
///
/// A feature whose interquartile range is zero keeps unit scale so constant
/// columns pass through centered but unscaled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustScaler {
    centers: Vec<f32>,
    scales: Vec<f32>,
}

impl RobustScaler {
    /// Fit on a flat row-major block of `n_features` columns.
    pub fn fit(rows: &[f32], n_features: usize) -> Result<Self, ScaleError> {
        if rows.is_empty() {
            return Err(ScaleError::EmptyBlock);
        }
        if rows.len() % n_features != 0 {
            return Err(ScaleError::WidthMismatch {
                expected: n_features,
                got: rows.len(),
            });
        }

        let n_rows = rows.len() / n_features;
        let mut centers = Vec::with_capacity(n_features);
        let mut scales = Vec::with_capacity(n_features);

        let mut column = vec![0.0f32; n_rows];
        for feature in 0..n_features {
            for (r, slot) in column.iter_mut().enumerate() {
                *slot = rows[r * n_features + feature];
            }
            column.sort_by(|a, b| a.total_cmp(b));

            let median = quantile(&column, 0.5);
            let iqr = quantile(&column, 0.75) - quantile(&column, 0.25);

            centers.push(median);
            scales.push(if iqr > 0.0 { iqr } else { 1.0 });
        }

        Ok(Self { centers, scales })
    }

    /// Number of feature columns this scaler was fit on.
    pub fn n_features(&self) -> usize {
        self.centers.len()
    }

    /// Apply the fitted transform in place to a flat row-major block.
    pub fn transform(&self, rows: &mut [f32]) -> Result<(), ScaleError> {
        let n_features = self.n_features();
        if rows.len() % n_features != 0 {
            return Err(ScaleError::WidthMismatch {
                expected: n_features,
                got: rows.len(),
            });
        }

        for (i, value) in rows.iter_mut().enumerate() {
            let feature = i % n_features;
            *value = (*value - self.centers[feature]) / self.scales[feature];
        }

        Ok(())
    }
}

/// Linear-interpolation quantile of an ascending-sorted slice.
fn quantile(sorted: &[f32], q: f64) -> f32 {
    debug_assert!(!sorted.is_empty());

    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;

    if lower == upper {
        sorted[lower]
    } else {
        let weight = (position - lower as f64) as f32;
        sorted[lower] * (1.0 - weight) + sorted[upper] * weight
    }
}

/// The persisted pair of fitted scalers: one for the static block, one for
/// the temporal block. Created once at training time; inference must reuse
/// it, never refit on request data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingState {
    pub static_scaler: RobustScaler,
    pub temporal_scaler: RobustScaler,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_approx_eq;

    #[test]
    fn quantiles_interpolate() {
        let sorted = [1.0f32, 2.0, 3.0, 4.0];
        assert_approx_eq!(quantile(&sorted, 0.5), 2.5, 1e-6);
        assert_approx_eq!(quantile(&sorted, 0.25), 1.75, 1e-6);
        assert_approx_eq!(quantile(&sorted, 1.0), 4.0, 1e-6);
    }

    #[test]
    fn fit_then_transform_centers_the_median() {
        // Two features: a spread column and a constant column.
        let rows = vec![
            1.0, 7.0, //
            2.0, 7.0, //
            3.0, 7.0, //
            4.0, 7.0, //
            5.0, 7.0,
        ];
        let scaler = RobustScaler::fit(&rows, 2).unwrap();

        let mut probe = vec![3.0, 7.0];
        scaler.transform(&mut probe).unwrap();
        assert_approx_eq!(probe[0], 0.0, 1e-6);
        // Zero IQR keeps unit scale, so the constant column centers to zero.
        assert_approx_eq!(probe[1], 0.0, 1e-6);

        let mut above = vec![5.0, 8.0];
        scaler.transform(&mut above).unwrap();
        assert_approx_eq!(above[0], 1.0, 1e-6);
        assert_approx_eq!(above[1], 1.0, 1e-6);
    }

    #[test]
    fn fitted_state_survives_serde() {
        let rows = vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0];
        let scaler = RobustScaler::fit(&rows, 2).unwrap();

        let json = serde_json::to_string(&scaler).unwrap();
        let restored: RobustScaler = serde_json::from_str(&json).unwrap();
        assert_eq!(scaler, restored);
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let rows = vec![1.0, 2.0, 3.0, 4.0];
        let scaler = RobustScaler::fit(&rows, 2).unwrap();

        let mut bad = vec![1.0, 2.0, 3.0];
        assert!(matches!(
            scaler.transform(&mut bad),
            Err(ScaleError::WidthMismatch { expected: 2, got: 3 })
        ));
        assert!(matches!(
            RobustScaler::fit(&rows, 3),
            Err(ScaleError::WidthMismatch { .. })
        ));
        assert!(matches!(
            RobustScaler::fit(&[], 2),
            Err(ScaleError::EmptyBlock)
        ));
    }
}
