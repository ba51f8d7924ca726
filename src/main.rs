//! pooled-http command line
//!
//! Issues GET requests through a configured client and reports status, body
//! size and pool statistics.
//!
//! ```text
//! pooled-http --config client.toml --secure https://internal.example/health
//! ```

use std::path::PathBuf;

use clap::Parser;

use pooled_http::config::{load_config, BackendKind, ClientConfig};
use pooled_http::observability::init_logging;
use pooled_http::ClientFactory;

#[derive(Parser)]
#[command(name = "pooled-http")]
#[command(about = "Send requests through a pooled HTTP client", long_about = None)]
struct Cli {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the secure client (configured trust store, allow-list, client identity)
    #[arg(short, long)]
    secure: bool,

    /// Override the configured backend (pooled, hyper)
    #[arg(short, long)]
    backend: Option<BackendKind>,

    /// Print pool statistics as JSON after the requests
    #[arg(long)]
    json: bool,

    /// Absolute URLs to GET, in order
    #[arg(required = true)]
    urls: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };
    init_logging(&config.observability.log_level)?;

    let mut builder = ClientFactory::builder(config);
    if let Some(backend) = cli.backend {
        builder = builder.backend(backend);
    }
    let factory = builder.build()?;
    let client = if cli.secure {
        factory.create_secure_client()?
    } else {
        factory.create_client()?
    };

    let mut failures = 0;
    for url in &cli.urls {
        match client.get(url).await {
            Ok(response) => {
                println!("{} {} ({} bytes)", response.status(), url, response.body().len());
            }
            Err(e) => {
                failures += 1;
                eprintln!("error {}: {}", url, e);
            }
        }
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&client.stats())?);
    }

    for e in factory.close().await {
        tracing::warn!(error = %e, "Release failed");
    }

    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
