use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use veneer_runtime::adapter::store::AdapterStore;
use veneer_runtime::config::RuntimeConfig;
use veneer_runtime::discovery::fetcher::HttpPageSource;
use veneer_runtime::inject::agent;
use veneer_runtime::job::runner::{JobManager, SubmitRequest};
use veneer_runtime::job::{JobOptions, JobPriority, JobStatus, PageTarget};
use veneer_runtime::rest::{self, AppState};

#[derive(Parser)]
#[command(
    name = "veneer",
    about = "Veneer — theme mapping and variant injection for storefront campaign pages",
    version
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the operator REST API
    Serve {
        /// Port to listen on (overrides VENEER_HTTP_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one mapping job against a product page and print the adapter
    Map {
        /// Product page URL to analyze
        url: String,
        /// Confidence floor for low-confidence annotation
        #[arg(long)]
        floor: Option<f32>,
        /// Skip adapter reuse and re-run discovery
        #[arg(long)]
        fresh: bool,
        /// Fetch deadline in milliseconds
        #[arg(long, default_value = "10000")]
        timeout: u64,
    },
    /// Apply a page's embedded variant payload to a local HTML file
    Inject {
        /// Path to the HTML file
        file: PathBuf,
    },
    /// Manage stored theme adapters
    Adapters {
        #[command(subcommand)]
        action: AdaptersAction,
    },
}

#[derive(Subcommand)]
enum AdaptersAction {
    /// List stored adapters
    List,
    /// Remove stored adapters (all, or one fingerprint)
    Clear {
        /// Fingerprint to invalidate (omit to clear everything)
        fingerprint: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let result = match cli.command {
        Commands::Serve { port } => serve(port).await,
        Commands::Map {
            url,
            floor,
            fresh,
            timeout,
        } => map(&url, floor, fresh, timeout).await,
        Commands::Inject { file } => inject(&file),
        Commands::Adapters { action } => adapters(action),
    };

    if let Err(e) = &result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    result
}

async fn serve(port: Option<u16>) -> Result<()> {
    let config = RuntimeConfig::from_env();
    let store = Arc::new(AdapterStore::open(config.adapter_dir.clone())?);
    let source = Arc::new(HttpPageSource::new(config.fetch_timeout_ms));
    let manager = JobManager::new(Arc::clone(&store), source, config.runner());

    let state = Arc::new(AppState { manager, store });
    rest::start(port.unwrap_or(config.http_port), state).await
}

async fn map(url: &str, floor: Option<f32>, fresh: bool, timeout: u64) -> Result<()> {
    let parsed = url::Url::parse(url).context("target must be a valid absolute URL")?;
    let shop_id = parsed
        .host_str()
        .context("target URL has no host")?
        .to_string();

    let mut config = RuntimeConfig::from_env();
    config.fetch_timeout_ms = timeout;

    let store = Arc::new(AdapterStore::open(config.adapter_dir.clone())?);
    let source = Arc::new(HttpPageSource::new(config.fetch_timeout_ms));
    let manager = JobManager::new(Arc::clone(&store), source, config.runner());

    let job = manager
        .submit(SubmitRequest {
            shop_id,
            target: PageTarget::ProductUrl(url.to_string()),
            theme_id: None,
            priority: JobPriority::Normal,
            options: JobOptions {
                confidence_floor: floor.unwrap_or(config.confidence_floor),
                refresh: fresh,
                ..JobOptions::default()
            },
        })
        .await;

    let mut last_progress = 0u8;
    loop {
        let snapshot = manager
            .poll(&job.id)
            .await
            .context("job vanished while polling")?;

        if snapshot.progress > last_progress {
            last_progress = snapshot.progress;
            eprintln!("  {}% ({})", snapshot.progress, snapshot.status);
        }

        match snapshot.status {
            JobStatus::Completed => {
                let adapter = snapshot.result.context("completed job carries a result")?;
                println!("{}", serde_json::to_string_pretty(&adapter.persisted())?);
                return Ok(());
            }
            JobStatus::Failed => {
                anyhow::bail!(
                    "mapping failed: {}",
                    snapshot.error.unwrap_or_else(|| "unknown cause".into())
                );
            }
            JobStatus::Cancelled => anyhow::bail!("mapping cancelled"),
            _ => tokio::time::sleep(Duration::from_millis(100)).await,
        }
    }
}

fn inject(file: &PathBuf) -> Result<()> {
    let html = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;

    let outcome = agent::apply(&html);
    for d in &outcome.diagnostics {
        eprintln!("  skipped {}: {} ({})", d.field, d.selector, d.reason);
    }
    eprintln!("  applied fields: {:?}", outcome.applied);
    println!("{}", outcome.html);
    Ok(())
}

fn adapters(action: AdaptersAction) -> Result<()> {
    let config = RuntimeConfig::from_env();
    let store = AdapterStore::open(config.adapter_dir.clone())?;

    match action {
        AdaptersAction::List => {
            let mut fingerprints = store.fingerprints();
            fingerprints.sort();
            if fingerprints.is_empty() {
                println!("no stored adapters in {}", store.dir().display());
                return Ok(());
            }
            for fp in fingerprints {
                if let Some(adapter) = store.get(&fp) {
                    println!(
                        "{fp}  {} fields ({} confident)  updated {}",
                        adapter.selectors.len(),
                        adapter.confident_fields(),
                        adapter.updated_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }
        AdaptersAction::Clear { fingerprint } => match fingerprint {
            Some(fp) => {
                if store.invalidate(&fp) {
                    println!("invalidated {fp}");
                } else {
                    println!("no adapter for {fp}");
                }
            }
            None => {
                let n = store.len();
                store.clear();
                println!("cleared {n} adapters");
            }
        },
    }
    Ok(())
}
