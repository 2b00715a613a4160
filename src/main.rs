use crate::cluster::KubeCluster;
use crate::state::{ControllerContext, ControllerState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod bearer_token;
mod cluster;
mod config;
mod credentials;
mod error;
mod image_reference;
mod oci_registry;
mod reconcile;
mod secret_string;
mod selector;
mod staleness;
mod state;
#[cfg(test)]
mod test_support;
mod webserver;
mod workload;

#[cfg(target_env = "musl")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("Starting kube-restarter {}", env!("CARGO_PKG_VERSION"));

    let config = config::load()?;
    info!(
        "Checking every {} seconds in {}",
        config.check_interval_seconds,
        config.namespace.as_deref().unwrap_or("all namespaces")
    );

    let cluster = KubeCluster::connect().await?;
    let http_client = oci_registry::create_client(&config)?;
    let ctx = ControllerContext {
        cluster: Arc::new(cluster),
        http: Arc::new(http_client),
        namespace: config.namespace.clone(),
    };
    let state = Arc::new(ControllerState::default());
    let shutdown = CancellationToken::new();

    // Run immediately on startup, then on every interval
    tokio::spawn(run_pass(ctx.clone(), state.clone(), shutdown.clone()));

    let mut scheduler = JobScheduler::new().await?;
    let job = {
        let (ctx, state, shutdown) = (ctx.clone(), state.clone(), shutdown.clone());
        Job::new_repeated_async(config.check_interval(), move |_uuid, _l| {
            Box::pin(run_pass(ctx.clone(), state.clone(), shutdown.clone()))
        })?
    };
    scheduler.add(job).await?;
    scheduler.start().await?;

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    let app = webserver::create_app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.webserver.port));
    info!("Starting webserver on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    scheduler.shutdown().await?;
    info!("kube-restarter stopped");
    Ok(())
}

/// Runs one pass unless another is still in flight. The pass is abandoned at its next
/// await point once `shutdown` is cancelled.
async fn run_pass(ctx: ControllerContext, state: Arc<ControllerState>, shutdown: CancellationToken) {
    let Ok(_guard) = state.pass_lock.try_lock() else {
        warn!("Previous reconciliation pass is still running, skipping this trigger");
        return;
    };

    tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
            info!("Shutdown requested, abandoning reconciliation pass");
        }
        result = reconcile::run(&ctx) => match result {
            Ok(report) => state.record(report).await,
            Err(e) => error!("Error running reconciliation pass: {:?}", e),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
