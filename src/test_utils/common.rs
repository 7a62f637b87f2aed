use std::path::Path;
use std::time::Duration;

use crate::utils::async_task::spawn_task;
use crate::ApiHandler;
use crate::HarnessConfig;
use crate::InstanceConfig;
use crate::LeaderPollConfig;
use crate::Server;
use crate::TestClusterConfig;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
}

/// Cluster settings rooted in `root` with a fast election tick
pub(crate) fn test_cluster_settings(root: &Path) -> TestClusterConfig {
    TestClusterConfig {
        root_dir: root.to_path_buf(),
        tick_interval_ms: 20,
        ..Default::default()
    }
}

/// Harness settings for unit tests: fast election and leader polling.
pub(crate) fn test_harness_config(root: &Path) -> HarnessConfig {
    HarnessConfig {
        leader_poll: LeaderPollConfig {
            interval_ms: 20,
            max_attempts: 250,
        },
        cluster: test_cluster_settings(root),
        ..Default::default()
    }
}

pub(crate) fn test_instance_config(root: &Path) -> InstanceConfig {
    InstanceConfig::new_test_config(&test_cluster_settings(root))
}

/// Starts `cfg` with the default api handler and runs it in the background.
pub(crate) async fn start_server(cfg: InstanceConfig) -> Server {
    let server = Server::create(cfg);
    server
        .start_subsystems(ApiHandler::new(server.clone()))
        .await
        .expect("start subsystems");
    let runner = server.clone();
    spawn_task(server.name(), move || async move { runner.run().await });
    server
}

/// Starts a single instance and waits until it leads.
pub(crate) async fn start_leader(root: &Path) -> Server {
    let server = start_server(test_instance_config(root)).await;
    for _ in 0..200 {
        if server.is_leader() {
            return server;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} did not become leader", server.name());
}
