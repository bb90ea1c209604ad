//! Command line client for the classify server.
//!
use std::{fs, path::PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use classify_server::sensors::open_camera;
use common::data_url;
use env_logger::{Env, TimestampPrecision};
use predict_client::{
    history::{default_state_dir, HistoryEntry, PredictionStore},
    PredictClient,
};

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Cli {
    /// Base URL of the classify server
    #[clap(long, env = "CLASSIFY_SERVER", default_value = "http://127.0.0.1:5000")]
    server: String,

    /// Directory holding the prediction cache and history
    #[clap(long)]
    state_dir: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify an image file or a camera snapshot
    Predict(Source),
    /// Show the most recent predictions
    History,
    /// Forget cached predictions, keep the history
    ClearCache,
}

#[derive(Args, Debug)]
#[clap(group(clap::ArgGroup::new("input").required(true).args(["image", "camera"])))]
struct Source {
    /// Image file to classify
    #[clap(long)]
    image: Option<PathBuf>,

    /// Index of the camera to take a snapshot from
    #[clap(long)]
    camera: Option<u32>,

    /// Always ask the server, even for a cached image
    #[clap(long)]
    no_cache: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let state_dir = cli
        .state_dir
        .or_else(default_state_dir)
        .ok_or_else(|| anyhow!("no cache directory available, pass --state-dir"))?;
    let mut store = PredictionStore::load(&state_dir)?;

    match cli.command {
        Command::Predict(source) => {
            let client = PredictClient::new(cli.server);
            predict(&client, &mut store, source).await?;
            store.save(&state_dir)?;
        }
        Command::History => {
            for entry in store.history() {
                println!(
                    "{}\t{}\t{:.1}%\t{}{}",
                    entry.timestamp,
                    entry.class,
                    entry.confidence * 100.0,
                    entry.source,
                    if entry.cached { "\t(cached)" } else { "" },
                );
            }
        }
        Command::ClearCache => {
            log::info!("Removing {} cached predictions", store.cache_len());
            store.clear_cache();
            store.save(&state_dir)?;
        }
    }

    Ok(())
}

async fn predict(client: &PredictClient, store: &mut PredictionStore, source: Source) -> Result<()> {
    let (bytes, origin) = match (source.image, source.camera) {
        (Some(path), _) => {
            let bytes = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            (bytes, path.display().to_string())
        }
        (None, Some(index)) => {
            let camera = open_camera(index)?;
            let frame = camera
                .capture()
                .await
                .ok_or_else(|| anyhow!("camera {} returned no frame", camera.name()))?;
            (frame, camera.name().to_owned())
        }
        (None, None) => bail!("either --image or --camera is required"),
    };

    let mime = data_url::guess_mime(&bytes)
        .ok_or_else(|| anyhow!("{origin} is not a supported image"))?;
    let url = data_url::encode(mime, &bytes);

    log::info!("Classifying {} with {}", origin, client.base_url());
    let (prediction, cached) = client.predict_cached(store, &url, source.no_cache).await?;

    match prediction.processing_time {
        Some(secs) if !cached => println!(
            "{} ({:.1}%) in {:.3}s",
            prediction.class,
            prediction.confidence * 100.0,
            secs
        ),
        _ => println!(
            "{} ({:.1}%)",
            prediction.class,
            prediction.confidence * 100.0
        ),
    }

    store.record(HistoryEntry::new(&prediction, origin, cached));
    Ok(())
}
