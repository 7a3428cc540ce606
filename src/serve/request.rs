//! Request schema and validation.
//!
//! The raw request deserializes every field as optional so schema problems
//! surface as structured validation failures naming the offending field,
//! not as deserialization errors or panics deep inside numeric code.
//! Downstream code only ever sees the typed [`ValidatedRequest`], which is
//! constructed exclusively by [`validate`].

use serde::{Deserialize, Serialize};

use crate::ensemble::{Confidence, PredictionSummary};
use crate::{N_STATIC_FEATURES, N_TEMPORAL_FEATURES, SEQ_LEN};

/// Incoming prediction request, exactly as posted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictRequest {
    pub elevation: Option<f64>,
    pub impervious_pct: Option<f64>,
    pub drainage_capacity: Option<f64>,
    pub avg_slope: Option<f64>,

    pub rainfall: Option<Vec<f64>>,
    pub temperature: Option<Vec<f64>>,
    pub antecedent_precipitation: Option<Vec<f64>>,
    pub river_level: Option<Vec<f64>>,
    pub groundwater_depth: Option<Vec<f64>>,
}

/// Validation failures, one variant per schema rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing static parameter `{field}`")]
    MissingStatic { field: &'static str },

    #[error("missing temporal parameter `{field}`")]
    MissingTemporal { field: &'static str },

    #[error("temporal parameter `{field}` must contain exactly {expected} values, got {got}")]
    TemporalLength {
        field: &'static str,
        expected: usize,
        got: usize,
    },
}

/// A schema-checked request.
///
/// The temporal block is timestep-major with the drivers in canonical
/// column order (rainfall, temperature, antecedent precipitation, river
/// level, groundwater depth), matching the training windows.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub static_features: [f32; N_STATIC_FEATURES],
    temporal: Vec<f32>,
}

impl ValidatedRequest {
    /// The timestep-major temporal block
    /// (`SEQ_LEN * N_TEMPORAL_FEATURES` values).
    pub fn temporal_block(&self) -> &[f32] {
        &self.temporal
    }
}

fn require_static(value: Option<f64>, field: &'static str) -> Result<f32, ValidationError> {
    value
        .map(|v| v as f32)
        .ok_or(ValidationError::MissingStatic { field })
}

fn require_temporal<'a>(
    value: &'a Option<Vec<f64>>,
    field: &'static str,
) -> Result<&'a [f64], ValidationError> {
    let values = value
        .as_deref()
        .ok_or(ValidationError::MissingTemporal { field })?;
    if values.len() != SEQ_LEN {
        return Err(ValidationError::TemporalLength {
            field,
            expected: SEQ_LEN,
            got: values.len(),
        });
    }
    Ok(values)
}

/// Check a raw request against the fixed schema.
///
/// Runs before any model or scaler is touched; on success the returned
/// struct carries fully shaped feature blocks.
pub fn validate(request: &PredictRequest) -> Result<ValidatedRequest, ValidationError> {
    let static_features = [
        require_static(request.elevation, "elevation")?,
        require_static(request.impervious_pct, "impervious_pct")?,
        require_static(request.drainage_capacity, "drainage_capacity")?,
        require_static(request.avg_slope, "avg_slope")?,
    ];

    let drivers: [&[f64]; N_TEMPORAL_FEATURES] = [
        require_temporal(&request.rainfall, "rainfall")?,
        require_temporal(&request.temperature, "temperature")?,
        require_temporal(&request.antecedent_precipitation, "antecedent_precipitation")?,
        require_temporal(&request.river_level, "river_level")?,
        require_temporal(&request.groundwater_depth, "groundwater_depth")?,
    ];

    let mut temporal = Vec::with_capacity(SEQ_LEN * N_TEMPORAL_FEATURES);
    for step in 0..SEQ_LEN {
        for driver in &drivers {
            temporal.push(driver[step] as f32);
        }
    }

    Ok(ValidatedRequest {
        static_features,
        temporal,
    })
}

/// Successful prediction response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictResponse {
    pub predictions: Vec<f32>,
    pub average_rise: f32,
    pub max_rise: f32,
    pub confidence: Confidence,
}

impl From<PredictionSummary> for PredictResponse {
    fn from(summary: PredictionSummary) -> Self {
        Self {
            predictions: summary.predictions,
            average_rise: summary.average_rise,
            max_rise: summary.max_rise,
            confidence: summary.confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_request() -> PredictRequest {
        PredictRequest {
            elevation: Some(10.0),
            impervious_pct: Some(40.0),
            drainage_capacity: Some(0.5),
            avg_slope: Some(2.0),
            rainfall: Some(vec![1.0; 5]),
            temperature: Some(vec![15.0; 5]),
            antecedent_precipitation: Some(vec![0.3; 5]),
            river_level: Some(vec![2.1; 5]),
            groundwater_depth: Some(vec![4.0; 5]),
        }
    }

    #[test]
    fn complete_request_validates() {
        let validated = validate(&complete_request()).unwrap();
        assert_eq!(validated.static_features, [10.0, 40.0, 0.5, 2.0]);
        assert_eq!(validated.temporal_block().len(), SEQ_LEN * N_TEMPORAL_FEATURES);
        // First timestep row is the five drivers in canonical order.
        assert_eq!(
            &validated.temporal_block()[..N_TEMPORAL_FEATURES],
            &[1.0, 15.0, 0.3, 2.1, 4.0]
        );
    }

    #[test]
    fn missing_static_field_names_the_field() {
        let mut request = complete_request();
        request.avg_slope = None;

        let err = validate(&request).unwrap_err();
        assert_eq!(err, ValidationError::MissingStatic { field: "avg_slope" });
        assert!(err.to_string().contains("avg_slope"));
    }

    #[test]
    fn missing_temporal_field_names_the_field() {
        let mut request = complete_request();
        request.river_level = None;

        let err = validate(&request).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingTemporal { field: "river_level" }
        );
    }

    #[test]
    fn wrong_temporal_length_is_rejected() {
        let mut request = complete_request();
        request.rainfall = Some(vec![1.0; 4]);

        let err = validate(&request).unwrap_err();
        assert_eq!(
            err,
            ValidationError::TemporalLength {
                field: "rainfall",
                expected: 5,
                got: 4
            }
        );
        assert!(err.to_string().contains("rainfall"));
    }

    #[test]
    fn request_deserializes_with_missing_fields() {
        // Missing fields must parse (as None) so validation can name them.
        let request: PredictRequest = serde_json::from_str(r#"{"elevation": 1.0}"#).unwrap();
        assert_eq!(request.elevation, Some(1.0));
        assert!(request.rainfall.is_none());
    }

    #[test]
    fn confidence_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Confidence::High).unwrap(),
            r#""high""#
        );
        assert_eq!(
            serde_json::to_string(&Confidence::Medium).unwrap(),
            r#""medium""#
        );
    }
}
