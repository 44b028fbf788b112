//! Reconcile the file catalog against what the storage devices report.
//!
//! One invocation is one run. Everything besides the optional config file
//! comes from configuration (`ARCHIVIST_*` environment variables override
//! the file).

mod error;

use crate::error::{ErrorKind, Result};
use archivist_catalog::{Database, Repository};
use archivist_config::Config;
use archivist_reconcile::{Context, Engine};
use archivist_source::{HttpSource, SourceHandle};
use clap::Parser;
use exn::ResultExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "archivist", version, about = "Reconcile storage device snapshots with the file catalog")]
struct Cli {
    /// Configuration file (YAML, TOML or JSON).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        error!(retryable = err.is_retryable(), "{err:?}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    info!(
        api_url = %config.api_url,
        database = %config.database.display(),
        apply = ?config.apply,
        dry_run = config.dry_run,
        "Configuration loaded"
    );

    if let Some(parent) = config.database.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Store)?;
    }
    let db = Database::connect(&config.database).await.or_raise(|| ErrorKind::Store)?;
    let repo = Repository::from(&db).with_dry_run(config.dry_run);

    let base = config.api_url().or_raise(|| ErrorKind::Config)?;
    let source: SourceHandle = Arc::new(
        HttpSource::new(base, Duration::from_secs(config.request_timeout)).or_raise(|| ErrorKind::Source)?,
    );

    let engine = Engine::new(repo, source, Context::from(&config));
    let outcome = engine.run().await.or_raise(|| ErrorKind::Run);
    db.close().await;
    outcome.map(|_| ())
}
