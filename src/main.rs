//! Clip Arena Settlement Engine
//!
//! Background engine that polls YouTube and TikTok for clip engagement,
//! evaluates contest win conditions and settles winners into creator
//! balances. Ships with a small HTTP surface for health checks, manual
//! sync triggers and contest inspection.

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, time::interval};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cliparena_backend::{
    api::create_router,
    credentials::CredentialCache,
    engine::SyncOrchestrator,
    middleware::request_logging,
    models::Config,
    platforms::{MetricsAdapter, TiktokAdapter, YoutubeAdapter},
    store::ContestStore,
};

#[derive(Parser, Debug)]
#[command(
    name = "cliparena",
    about = "Contest settlement engine for short-form clips"
)]
struct Args {
    /// Run a single sync cycle, print the report and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let args = Args::parse();
    let config = Config::from_env()?;

    info!("🚀 Clip Arena settlement engine starting");

    if config.youtube_client_id.is_none() {
        warn!("⚠️ YOUTUBE_CLIENT_ID not set - YouTube tokens must be seeded manually");
    }
    if config.tiktok_client_key.is_none() {
        warn!("⚠️ TIKTOK_CLIENT_KEY not set - TikTok tokens must be seeded manually");
    }

    let store = ContestStore::new(&config.database_path)
        .with_context(|| format!("Failed to open contest store at {}", config.database_path))?;
    let credentials = Arc::new(CredentialCache::new(store.clone(), &config)?);

    let adapters: Vec<Arc<dyn MetricsAdapter>> = vec![
        Arc::new(YoutubeAdapter::new()?),
        Arc::new(TiktokAdapter::new()?),
    ];
    let orchestrator = SyncOrchestrator::new(
        store.clone(),
        credentials,
        adapters,
        config.sync_concurrency,
    );

    if args.once {
        let report = orchestrator.run_cycle().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    {
        let orchestrator = orchestrator.clone();
        let interval_secs = config.sync_interval_secs;
        tokio::spawn(async move {
            sync_scheduler(orchestrator, interval_secs).await;
        });
    }

    let app = create_router(store, orchestrator)
        .layer(axum::middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("🎯 API server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

async fn sync_scheduler(orchestrator: SyncOrchestrator, interval_secs: u64) {
    info!("⏱️ Sync scheduler running every {}s", interval_secs);
    let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        ticker.tick().await;
        if let Err(e) = orchestrator.run_cycle().await {
            error!("🚨 Sync cycle failed: {}", e);
        }
    }
}

fn load_env() {
    // Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // Also try the manifest-relative .env when launched from elsewhere
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}

/// Initialize tracing with env-filter overrides
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cliparena_backend=info,cliparena=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
