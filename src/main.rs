use std::env;
use std::path::Path;

use pd_harness::ApiHandler;
use pd_harness::HarnessConfig;
use pd_harness::InstanceConfig;
use pd_harness::Result;
use pd_harness::Server;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

/// Instance config file, when not given as the first argument
const INSTANCE_CONFIG_ENV: &str = "PD_INSTANCE_CONFIG";

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = HarnessConfig::new()?.validate()?;
    let instance_path = env::args()
        .nth(1)
        .or_else(|| env::var(INSTANCE_CONFIG_ENV).ok());
    let cfg = match instance_path {
        Some(path) => InstanceConfig::load(&path)?,
        None => InstanceConfig::new_test_config(&settings.cluster),
    };

    // Initializing Logs
    let _guard = init_observability(&cfg.name, &cfg.data_dir)?;

    let server = Server::create(cfg);
    server.start_subsystems(ApiHandler::new(server.clone())).await?;

    info!("[{}] serving on {}. Waiting for CTRL+C signal...", server.name(), server.addr());
    let closer = server.clone();
    tokio::spawn(async move {
        if let Err(e) = graceful_shutdown().await {
            error!("Failed to listen for shutdown signal: {:?}", e);
        }
        closer.close();
    });

    if let Err(e) = server.run().await {
        error!("server stops: {:?}", e);
    }

    info!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown() -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }
    Ok(())
}

fn init_observability(
    name: &str,
    data_dir: &Path,
) -> Result<WorkerGuard> {
    std::fs::create_dir_all(data_dir)?;
    let log_file = tracing_appender::rolling::never(data_dir, format!("{name}.log"));

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
