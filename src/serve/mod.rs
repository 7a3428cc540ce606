//! HTTP serving layer.
//!
//! Thin glue over the trained model: schema validation, error-to-status
//! mapping, and the axum router. The trained artifacts are loaded once at
//! startup into an [`AppState`] and shared read-only across requests.

mod handlers;
mod request;

pub use handlers::{health, predict, run_predict, RisePredictor, ServeError};
pub use request::{validate, PredictRequest, PredictResponse, ValidatedRequest, ValidationError};

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state: the loaded predictor behind an `Arc`.
///
/// Requests only ever read through it, so handler clones are cheap and no
/// locking is needed.
#[derive(Debug)]
pub struct AppState<P> {
    pub predictor: Arc<P>,
}

impl<P> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            predictor: Arc::clone(&self.predictor),
        }
    }
}

impl<P> AppState<P> {
    /// Wrap a predictor for sharing across handlers.
    pub fn new(predictor: P) -> Self {
        Self {
            predictor: Arc::new(predictor),
        }
    }
}

/// Build the application router.
pub fn router<P: RisePredictor>(state: AppState<P>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/predict", post(predict::<P>))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
