mod cli;

use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Commands, ConfigCommand, StateCommand};
use logbox::collector::Collector;
use logbox::config::Config;
use logbox::observability::Metrics;
use logbox::registry::SourceRegistry;
use logbox::runner::{run_sources, shutdown_signal};
use logbox::sink::{JsonLinesSink, RowSink};
use logbox::state::StateStore;
use logbox::state::keys::last_run_meta;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    // Rows go to stdout, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Collect(args) => collect(&config, &args.sources).await?,
        Commands::Discover(args) => discover(&config, &args.source, args.directories).await?,
        Commands::State(StateCommand::Show { source }) => show_state(&config, source.as_deref())?,
        Commands::State(StateCommand::Reset { source }) => {
            let store = StateStore::open(&config.state.path)?;
            if store.reset(&source)? {
                println!("reset state for '{source}'");
            } else {
                println!("no state recorded for '{source}'");
            }
        }
        Commands::Config(ConfigCommand::Check) => print!("{}", config.to_toml()?),
    }

    Ok(())
}

async fn collect(config: &Config, selected: &[String]) -> Result<(), AnyError> {
    let metrics = Arc::new(Metrics::new());
    let registry = SourceRegistry::from_config(config, metrics.clone())?;

    let collectors: Vec<Arc<dyn Collector>> = if selected.is_empty() {
        registry.collectors().cloned().collect()
    } else {
        selected
            .iter()
            .map(|name| registry.get(name))
            .collect::<Result<Vec<_>, _>>()?
    };
    if collectors.is_empty() {
        warn!("No sources configured");
        return Ok(());
    }

    let store = StateStore::open(&config.state.path)?;
    let sink: Arc<dyn RowSink> = match &config.output.path {
        Some(path) => Arc::new(JsonLinesSink::file(path).await?),
        None => Arc::new(JsonLinesSink::stdout()),
    };

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let outcomes = run_sources(collectors, sink, store, cancel.clone()).await;
    let failed = outcomes.iter().filter(|outcome| !outcome.is_ok()).count();

    let totals = metrics.snapshot();
    info!(
        sources = outcomes.len(),
        failed,
        rows = totals.rows_emitted,
        skipped = totals.rows_skipped,
        pages = totals.pages_fetched,
        retries = totals.retries,
        artifacts = totals.artifacts_discovered,
        "Collection finished"
    );

    cancel.cancel();
    if failed > 0 {
        return Err(format!("{failed} of {} source(s) failed", outcomes.len()).into());
    }
    Ok(())
}

async fn discover(config: &Config, source: &str, directories: bool) -> Result<(), AnyError> {
    let registry = SourceRegistry::from_config(config, Arc::new(Metrics::new()))?;
    let bucket = registry.bucket(source)?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let mut discovery = bucket.discover(&cancel, directories);
    while let Some(artifact) = discovery.next().await {
        let line = json!({
            "path": artifact.path,
            "is_directory": artifact.is_directory,
            "size": artifact.size,
            "fields": artifact.matched_fields,
        });
        println!("{line}");
    }

    let outcome = discovery.finish().await;
    cancel.cancel();
    let stats = outcome?;
    info!(
        listed = stats.directories_listed,
        pruned = stats.directories_pruned,
        artifacts = stats.artifacts,
        "Discovery complete"
    );
    Ok(())
}

fn show_state(config: &Config, source: Option<&str>) -> Result<(), AnyError> {
    let store = StateStore::open(&config.state.path)?;

    let snapshots = match source {
        Some(name) => store
            .load(name)?
            .map(|snapshot| vec![(name.to_string(), snapshot)])
            .unwrap_or_default(),
        None => store.list()?,
    };

    for (name, snapshot) in snapshots {
        let entry = json!({
            "source": name,
            "snapshot": snapshot,
            "artifacts": store.artifact_count(&name)?,
            "last_run": store.get_meta(&last_run_meta(&name))?,
        });
        println!("{}", serde_json::to_string_pretty(&entry)?);
    }
    Ok(())
}
