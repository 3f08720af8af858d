//! Signed Uploadr - batch uploader for pre-signed object storage URLs
//!
//! Reads an upload description, signs every file in one request and uploads
//! them in order, printing the per-file outcomes as JSON.

use clap::Parser;
use signed_uploadr::config::Config;
use signed_uploadr::signing::SignedUrlClient;
use signed_uploadr::upload::HttpObjectUploader;
use signed_uploadr::{logging, metrics, UploadTask};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Signed Uploadr - upload files through pre-signed URLs
#[derive(Parser, Debug)]
#[command(name = "signed-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "upload.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Print Prometheus metrics to stderr when done
    #[arg(long)]
    print_metrics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logging::init_subscriber(&args.log_level.to_lowercase(), args.json_logs)?;

    info!("Starting Signed Uploadr v{}", signed_uploadr::VERSION);

    let config = Config::load(&args.config)?;
    info!("Loaded configuration from {:?}", args.config);

    let request = config.build_request().await?;
    let http_client = reqwest::Client::builder().build()?;
    let signer = SignedUrlClient::with_http_client(config.signing_endpoint(), http_client.clone());
    let uploader =
        HttpObjectUploader::with_http_client(http_client).with_chunk_size(config.upload.chunk_size);
    info!(
        signing_url = signer.endpoint().url(),
        chunk_size = uploader.chunk_size(),
        "Upload clients ready"
    );

    let task = UploadTask::with_clients(request, Arc::new(signer), Arc::new(uploader));
    task.on_progress(|p| {
        info!(
            loaded_bytes = p.loaded_bytes,
            total_bytes = p.total_bytes,
            "Progress {:.1}%",
            p.loaded_percent
        );
    });

    let stop = task.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping upload");
            stop.stop();
        }
    });

    let result = task.start().await;

    if args.print_metrics {
        eprintln!("{}", metrics::gather_text());
    }

    let outcomes = result?;
    println!("{}", serde_json::to_string_pretty(&outcomes)?);

    Ok(())
}
