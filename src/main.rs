use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use worker_fleet::config::FleetConfig;
use worker_fleet::context::FleetContext;
use worker_fleet::identity::Identity;
use worker_fleet::inputs::Inputs;
use worker_fleet::prompt::ask_use_proxy;
use worker_fleet::proxy::ProxyPool;
use worker_fleet::shutdown;
use worker_fleet::store::{IdentityStore, JsonFile};
use worker_fleet::worker::Scheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let config = FleetConfig::from_env();

    // Initialize tracing; keep the guard so the file writer flushes on exit
    let (file_layer, _log_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "worker-fleet.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    eprintln!("⚙️  Worker Fleet v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Orchestrator: {}", config.endpoints.ws_url);
    eprintln!("   Accounts: {}", config.paths.accounts.display());
    eprintln!("   Store: {}", config.paths.store.display());
    eprintln!("   Press Ctrl-C to stop.\n");

    // ── Inputs ──────────────────────────────────────────────────────────
    let inputs = Inputs::load(&config.paths).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    let use_proxy = ask_use_proxy(tokio::io::BufReader::new(tokio::io::stdin())).await?;

    let pool = ProxyPool::parse_all(&inputs.proxies, use_proxy).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
    let endpoints = Arc::new(config.endpoints.clone());
    let identities = Identity::from_credentials(&inputs.credentials, &pool, endpoints)
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        });
    eprintln!(
        "   Identities: {} (proxies {})\n",
        identities.len(),
        if use_proxy && !pool.is_empty() { "on" } else { "off" }
    );

    // ── Store ───────────────────────────────────────────────────────────
    let store = IdentityStore::open(Arc::new(JsonFile::new(&config.paths.store)))
        .await
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        });

    // ── Fleet ───────────────────────────────────────────────────────────
    let (trigger, shutdown) = shutdown::channel();
    let ctx = FleetContext::new(config, store, inputs.catalogue, shutdown);
    let scheduler = Arc::new(Scheduler::new(ctx, identities, trigger));

    let runner = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run().await })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    scheduler.shutdown().await;
    runner.abort();

    Ok(())
}
