//! Inference server.
//!
//! Loads the trained artifact bundle before binding the listener; a bundle
//! that fails to load is fatal to startup, never a per-request error.
//!
//! Configuration comes from the environment: `ARTIFACTS_DIR` (default
//! `artifacts`), `HOST` (default `0.0.0.0`), `PORT` (default `8080`).

use std::env;
use std::net::SocketAddr;

use floodcast::artifacts;
use floodcast::serve::{router, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file (optional - won't fail if missing)
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "serve=info,floodcast=info,tower_http=info".into()),
        )
        .init();

    let artifacts_dir = env::var("ARTIFACTS_DIR").unwrap_or_else(|_| "artifacts".to_string());
    let model = match artifacts::load(&artifacts_dir) {
        Ok(model) => model,
        Err(err) => {
            tracing::error!(%err, dir = %artifacts_dir, "artifact load failed, refusing to start");
            std::process::exit(1);
        }
    };
    tracing::info!(
        n_trees = model.forest().n_trees(),
        policy = ?model.policy(),
        "model ready"
    );

    let app = router(AppState::new(model));

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .expect("PORT must be a valid number");
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .expect("Invalid HOST:PORT configuration");

    tracing::info!("floodcast v{} listening on {}", env!("CARGO_PKG_VERSION"), addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listener");
    axum::serve(listener, app).await.expect("server error");
}
