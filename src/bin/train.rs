//! Offline training pipeline.
//!
//! Loads a dated observation CSV, runs the linear pipeline (window, scale,
//! fit static forest, compute residuals, train temporal model), and
//! persists the artifact bundle.
//!
//! Example:
//!   `cargo run --bin train --release -- --data cleaned_data.csv --out artifacts --trees 200 --epochs 30`

use std::path::PathBuf;
use std::process::ExitCode;

use floodcast::artifacts;
use floodcast::data::ObservationTable;
use floodcast::forest::BaggedForestTrainer;
use floodcast::model::{HybridModel, HybridTrainParams};
use floodcast::temporal::TemporalTrainer;

#[derive(Debug)]
struct Args {
    data: PathBuf,
    out: PathBuf,
    trees: u32,
    epochs: usize,
    hidden: usize,
    seed: u64,
    weighted: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut data = PathBuf::from("cleaned_data.csv");
    let mut out = PathBuf::from("artifacts");
    let mut trees = 200u32;
    let mut epochs = 30usize;
    let mut hidden = 64usize;
    let mut seed = 42u64;
    let mut weighted = false;

    let mut argv = std::env::args().skip(1);
    while let Some(flag) = argv.next() {
        let mut value = |name: &str| {
            argv.next().ok_or_else(|| format!("{name} requires a value"))
        };
        match flag.as_str() {
            "--data" => data = PathBuf::from(value("--data")?),
            "--out" => out = PathBuf::from(value("--out")?),
            "--trees" => {
                trees = value("--trees")?
                    .parse()
                    .map_err(|e| format!("--trees: {e}"))?
            }
            "--epochs" => {
                epochs = value("--epochs")?
                    .parse()
                    .map_err(|e| format!("--epochs: {e}"))?
            }
            "--hidden" => {
                hidden = value("--hidden")?
                    .parse()
                    .map_err(|e| format!("--hidden: {e}"))?
            }
            "--seed" => {
                seed = value("--seed")?
                    .parse()
                    .map_err(|e| format!("--seed: {e}"))?
            }
            "--weighted" => weighted = true,
            other => return Err(format!("unknown flag: {other}")),
        }
    }

    Ok(Args {
        data,
        out,
        trees,
        epochs,
        hidden,
        seed,
        weighted,
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "train=info,floodcast=info".into()),
        )
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(data = %args.data.display(), "loading observation table");
    let table = match ObservationTable::from_csv_path(&args.data) {
        Ok(table) => table,
        Err(err) => {
            tracing::error!(%err, "failed to load training data");
            return ExitCode::FAILURE;
        }
    };

    let params = HybridTrainParams {
        forest: BaggedForestTrainer::builder()
            .n_trees(args.trees)
            .seed(args.seed)
            .build()
            .expect("forest defaults are valid"),
        temporal: TemporalTrainer::builder()
            .epochs(args.epochs)
            .hidden_dim(args.hidden)
            .seed(args.seed)
            .build()
            .expect("temporal defaults are valid"),
        weighted_ensemble: args.weighted,
    };

    let model = match HybridModel::train(&table, &params) {
        Ok(model) => model,
        Err(err) => {
            tracing::error!(%err, "training failed");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = artifacts::save(&args.out, &model) {
        tracing::error!(%err, "failed to persist artifacts");
        return ExitCode::FAILURE;
    }

    tracing::info!(out = %args.out.display(), "training complete");
    ExitCode::SUCCESS
}
