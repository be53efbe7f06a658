//! ctr-studio CLI - serve the API or run a single CTR estimate

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ctr_studio::StudioConfig;
use ctr_studio::api::{AppState, router};
use ctr_studio::engine::pipeline::{
    DEFAULT_BATCH_SIZE, DEFAULT_PROVIDER, DEFAULT_SEED, PredictionRequest,
};
use ctr_studio::engine::{PredictorRegistry, export_details, run_prediction};
use ctr_types::{ExecutionMode, Platform};
use silicon_sampler::IdentityBank;
use tracing::info;

#[derive(Parser)]
#[command(name = "ctr-studio")]
#[command(about = "Estimate ad click-through rates with synthetic identities")]
struct Cli {
    /// Identity bank file
    #[arg(long, global = true, env = "CTR_BANK_PATH")]
    bank: Option<PathBuf>,

    /// Concurrent batches per request
    #[arg(long, global = true, env = "CTR_MAX_IN_FLIGHT")]
    max_in_flight: Option<usize>,

    /// Per-call provider timeout in seconds
    #[arg(long, global = true, env = "CTR_PROVIDER_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Whole-request deadline in seconds; late batches use the mock
    #[arg(long, global = true, env = "CTR_DEADLINE_SECS")]
    deadline_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(long, env = "CTR_HOST")]
        host: Option<String>,

        #[arg(short, long, env = "CTR_PORT")]
        port: Option<u16>,
    },
    /// Run one prediction and print the summary
    Predict {
        /// Advertisement text
        #[arg(value_name = "AD_TEXT")]
        ad_text: String,

        /// facebook, tiktok or amazon
        #[arg(long, default_value = "facebook")]
        platform: Platform,

        #[arg(short = 'n', long, default_value_t = 1000)]
        population: usize,

        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,

        #[arg(long, default_value = DEFAULT_PROVIDER)]
        provider: String,

        #[arg(long)]
        model: Option<String>,

        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Use the offline heuristic instead of a provider
        #[arg(long)]
        mock: bool,

        /// Submit batches one at a time
        #[arg(long)]
        sync: bool,

        /// Write per-identity records as JSON
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = StudioConfig::from_env();
    if let Some(bank) = cli.bank {
        config = config.with_bank_path(bank);
    }
    if let Some(n) = cli.max_in_flight {
        config = config.with_max_in_flight(n);
    }
    if let Some(secs) = cli.timeout_secs {
        config = config.with_provider_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = cli.deadline_secs {
        config = config.with_deadline(Some(Duration::from_secs(secs)));
    }

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config = config.with_host(host);
            }
            if let Some(port) = port {
                config = config.with_port(port);
            }
            serve(config).await?;
        }
        Commands::Predict {
            ad_text,
            platform,
            population,
            seed,
            provider,
            model,
            batch_size,
            mock,
            sync,
            out,
        } => {
            let bank = IdentityBank::from_path(&config.bank_path)
                .with_context(|| format!("loading {}", config.bank_path.display()))?;
            let request = PredictionRequest::new(ad_text, platform, population)
                .with_seed(seed)
                .with_provider(provider)
                .with_model(model)
                .with_batch_size(batch_size)
                .with_mock(mock)
                .with_mode(ExecutionMode::from_use_sync(sync));

            let registry = PredictorRegistry::with_defaults();
            let outcome = run_prediction(&request, &bank, &registry, &config).await?;
            println!("{}", serde_json::to_string_pretty(&outcome.summary)?);

            if let Some(path) = out {
                let records = outcome.details()?;
                export_details(&path, &records)?;
                info!("Detail records written to {}", path.display());
            }
        }
    }

    Ok(())
}

async fn serve(config: StudioConfig) -> anyhow::Result<()> {
    let addr = config.addr();
    let state = AppState::new(config);

    // Surface a broken bank at startup; requests retry the load lazily.
    if let Err(e) = state.store.get() {
        tracing::warn!(error = %e, "identity bank not loaded at startup");
    }

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("CTR Studio API listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
