mod chain_file;
mod jobs;

use crate::chain_file::ChainFile;
use crate::jobs::builtin_registry;
use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use jobchain_core::{Chain, ChainStatus};
use jobchain_engine::{ChainService, ChainSnapshot, ServiceConfig};
use jobchain_runner::DefaultRunnerFactory;
use jobchain_store::{ChainRepo, LocalFsChainRepo, MemoryChainRepo};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "jobchain")]
#[command(about = "Run job chains locally")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a chain file and print its jobs in dispatch order.
    Validate(ValidateArgs),
    /// Run a chain file to completion.
    Run(RunArgs),
    /// Print a chain stored in a local repository.
    Status(StatusArgs),
}

#[derive(Args)]
struct ValidateArgs {
    #[arg(long)]
    chain_file: PathBuf,
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    chain_file: PathBuf,
    #[arg(long, default_value = "memory")]
    store_type: String,
    #[arg(long, env = "JOBCHAIN_STORE_PATH")]
    store_path: Option<PathBuf>,
    #[arg(long, default_value_t = 1000)]
    status_interval_ms: u64,
}

#[derive(Args)]
struct StatusArgs {
    /// Omit to list the stored request ids.
    #[arg(long)]
    request_id: Option<String>,
    #[arg(long, env = "JOBCHAIN_STORE_PATH")]
    store_path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Validate(args) => run_validate_command(args).await,
        Commands::Run(args) => run_run_command(args).await,
        Commands::Status(args) => run_status_command(args).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "jobchain=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run_validate_command(args: ValidateArgs) -> Result<()> {
    let spec = ChainFile::load(&args.chain_file).await?.into_spec()?;
    let chain = Chain::new(spec).context("invalid chain")?;

    println!(
        "Chain {} is valid ({} jobs)",
        chain.request_id(),
        chain.len()
    );
    for job in chain.jobs() {
        if job.predecessors().is_empty() {
            println!("  {} [{}]", job.id(), job.job_type());
        } else {
            println!(
                "  {} [{}] after {}",
                job.id(),
                job.job_type(),
                job.predecessors().join(", ")
            );
        }
    }
    Ok(())
}

async fn run_run_command(args: RunArgs) -> Result<()> {
    let spec = ChainFile::load(&args.chain_file).await?.into_spec()?;
    let repo = build_repo(&args.store_type, args.store_path.as_ref())?;
    let factory = Arc::new(DefaultRunnerFactory::new(Arc::new(builtin_registry())));
    let service = ChainService::new(ServiceConfig::new(), repo, factory);

    let traverser = service.create(spec).await?;
    let request_id = traverser.request_id().to_string();
    service.start(&request_id)?;

    let mut ticker = tokio::time::interval(Duration::from_millis(args.status_interval_ms.max(1)));
    ticker.tick().await;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stop_requested = false;

    let status = loop {
        tokio::select! {
            status = traverser.wait() => break status,
            _ = ticker.tick() => println!("{}", traverser.status()),
            signal = &mut ctrl_c, if !stop_requested => {
                signal.context("failed to listen for ctrl-c")?;
                warn!(request_id = %request_id, "interrupted, stopping chain");
                stop_requested = true;
                service.stop(&request_id)?;
            }
        }
    };

    println!("{}", traverser.status());
    if status != ChainStatus::Complete {
        return Err(anyhow!("chain {request_id} finished {status}"));
    }
    info!(request_id = %request_id, "chain complete");
    Ok(())
}

async fn run_status_command(args: StatusArgs) -> Result<()> {
    let repo = LocalFsChainRepo::new(&args.store_path);

    let Some(request_id) = args.request_id else {
        for request_id in repo.list().await? {
            println!("{request_id}");
        }
        return Ok(());
    };

    let chain = repo
        .get(&request_id)
        .await
        .with_context(|| format!("failed to read chain {request_id}"))?;
    println!("{}", ChainSnapshot::from_chain(&chain));
    Ok(())
}

fn build_repo(store_type: &str, store_path: Option<&PathBuf>) -> Result<Arc<dyn ChainRepo>> {
    match store_type {
        "memory" => Ok(Arc::new(MemoryChainRepo::new())),
        "local" => {
            let path =
                store_path.ok_or_else(|| anyhow!("--store-path is required for --store-type local"))?;
            Ok(Arc::new(LocalFsChainRepo::new(path)))
        }
        other => Err(anyhow!("unsupported --store-type {other}")),
    }
}
