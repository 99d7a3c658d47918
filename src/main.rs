mod cli;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use machinesd::config::ServerConfig;
use machinesd::{AppState, LoginMessages, RegistryService, UserSnapshot, build_router};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    init_tracing();

    let config = cli::Cli::parse().into_config();
    config
        .validate()
        .map_err(|e| anyhow!(e))
        .context("invalid configuration")?;

    // SAFETY: single-threaded here, the runtime is built below.
    let login_messages = unsafe { LoginMessages::from_env(&config.login_messages_var) };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(serve(config, login_messages))
}

async fn serve(config: ServerConfig, login_messages: LoginMessages) -> Result<()> {
    let user = UserSnapshot::current().context("failed to look up the current user")?;
    let machines = RegistryService::spawn(&config.registry)
        .context("failed to start the machines registry")?;

    let app = build_router(AppState::new(machines.clone(), login_messages, user));

    let addr = config.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(address = %addr, directory = %machines.directory().display(), "machinesd started");

    // Stopping the registry ends open change streams, which lets the
    // graceful shutdown complete.
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            if let Err(err) = machines.shutdown().await {
                error!(error = %err, "failed to stop the machines registry");
            }
        })
        .await
        .context("server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("machinesd=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
