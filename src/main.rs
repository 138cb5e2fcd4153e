use clap::Parser;
use sandboxd::container::DockerRuntime;
use sandboxd::http::{self, AppState};
use sandboxd::{
    CommandPolicy, Orchestrator, RateLimiter, Reaper, Runtime, SessionStore, Settings,
    WorkspaceService,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Multi-tenant command execution service with per-session sandbox
/// containers.
#[derive(Debug, Parser)]
#[command(name = "sandboxd", version, about)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address override (host:port)
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        settings.bind_addr = bind;
    }

    let default_filter = if settings.debug {
        "sandboxd=debug"
    } else {
        "sandboxd=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    info!("Starting sandboxd");

    let runtime: Arc<dyn Runtime> = Arc::new(DockerRuntime::connect().await?);
    let store = SessionStore::connect(&settings.redis_url(), settings.session_ttl_seconds).await?;
    let rate = RateLimiter::new(
        store.connection(),
        settings.rate_limit_requests,
        settings.rate_limit_window_seconds,
    );
    let policy = CommandPolicy::from_csv(&settings.allowed_commands);
    let settings = Arc::new(settings);

    let orchestrator = Orchestrator::new(runtime.clone(), store.clone(), settings.clone());
    let workspace = WorkspaceService::new(runtime.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = Reaper::new(runtime.clone(), store.clone(), &settings);
    let reaper_handle = reaper.spawn(shutdown_rx);

    let state = Arc::new(AppState {
        settings: settings.clone(),
        store,
        rate,
        orchestrator,
        workspace,
        policy,
    });

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!("Listening on {}", settings.bind_addr);

    axum::serve(listener, http::build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = reaper_handle.await;
    info!("sandboxd stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
