//! Request handlers.
//!
//! Handlers are generic over [`RisePredictor`] so tests can substitute a
//! mock for the trained model and assert, for example, that invalid
//! requests never reach it. The core request flow lives in [`run_predict`],
//! a plain function the axum handlers wrap.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::request::{validate, PredictRequest, PredictResponse, ValidationError};
use super::AppState;
use crate::ensemble::PredictionSummary;
use crate::model::{HybridModel, PredictError};

/// Anything that can predict per-step rise from a validated request.
///
/// Implementations must be safe to call concurrently; the trained model
/// satisfies this because prediction never mutates shared state.
pub trait RisePredictor: Send + Sync + 'static {
    fn predict_rise(&self, request: &super::ValidatedRequest)
        -> Result<PredictionSummary, PredictError>;
}

impl RisePredictor for HybridModel {
    fn predict_rise(
        &self,
        request: &super::ValidatedRequest,
    ) -> Result<PredictionSummary, PredictError> {
        self.predict(request)
    }
}

/// Handler-level failures, split by who caused them.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("prediction failed: {0}")]
    Predict(#[from] PredictError),
}

impl ServeError {
    /// HTTP status for this failure: user-caused schema problems are 400,
    /// everything past validation is 500.
    pub fn status(&self) -> StatusCode {
        match self {
            ServeError::Validation(_) => StatusCode::BAD_REQUEST,
            ServeError::Predict(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

/// Validate and predict. Validation runs to completion before the
/// predictor is touched, so a schema failure costs no model work.
pub fn run_predict<P: RisePredictor>(
    predictor: &P,
    request: &PredictRequest,
) -> Result<PredictResponse, ServeError> {
    let validated = validate(request)?;
    let summary = predictor.predict_rise(&validated)?;
    Ok(summary.into())
}

/// `POST /predict`
pub async fn predict<P: RisePredictor>(
    State(state): State<AppState<P>>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, ServeError> {
    run_predict(state.predictor.as_ref(), &request).map(Json)
}

/// `GET /health`
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::Confidence;
    use crate::serve::ValidatedRequest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock predictor counting how often it is invoked.
    struct CountingPredictor {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingPredictor {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RisePredictor for CountingPredictor {
        fn predict_rise(
            &self,
            _request: &ValidatedRequest,
        ) -> Result<PredictionSummary, PredictError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PredictError::NonFinite { index: 0 });
            }
            Ok(PredictionSummary {
                predictions: vec![0.1; 5],
                average_rise: 0.1,
                max_rise: 0.1,
                confidence: Confidence::High,
            })
        }
    }

    fn complete_request() -> PredictRequest {
        PredictRequest {
            elevation: Some(10.0),
            impervious_pct: Some(40.0),
            drainage_capacity: Some(0.5),
            avg_slope: Some(2.0),
            rainfall: Some(vec![1.0; 5]),
            temperature: Some(vec![1.0; 5]),
            antecedent_precipitation: Some(vec![1.0; 5]),
            river_level: Some(vec![1.0; 5]),
            groundwater_depth: Some(vec![1.0; 5]),
        }
    }

    #[test]
    fn valid_request_reaches_the_predictor_once() {
        let predictor = CountingPredictor::new(false);
        let response = run_predict(&predictor, &complete_request()).unwrap();
        assert_eq!(response.predictions.len(), 5);
        assert_eq!(predictor.calls(), 1);
    }

    #[test]
    fn invalid_request_never_reaches_the_predictor() {
        let predictor = CountingPredictor::new(false);
        let mut request = complete_request();
        request.temperature = Some(vec![1.0; 4]);

        let err = run_predict(&predictor, &request).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(predictor.calls(), 0);
    }

    #[test]
    fn missing_field_maps_to_bad_request_naming_the_field() {
        let predictor = CountingPredictor::new(false);
        let mut request = complete_request();
        request.avg_slope = None;

        let err = run_predict(&predictor, &request).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("avg_slope"));
        assert_eq!(predictor.calls(), 0);
    }

    #[test]
    fn predictor_failure_maps_to_internal_error() {
        let predictor = CountingPredictor::new(true);
        let err = run_predict(&predictor, &complete_request()).unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(predictor.calls(), 1);
    }
}
