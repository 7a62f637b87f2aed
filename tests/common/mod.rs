use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use pd_harness::HarnessConfig;
use pd_harness::InstanceConfig;
use pd_harness::LeaderPollConfig;
use pd_harness::Server;
use pd_harness::TestCluster;
use pd_harness::TestClusterConfig;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
}

/// Election tick used by every integration cluster
pub const TICK_INTERVAL_MS: u64 = 20;

pub fn cluster_settings(root: &Path) -> TestClusterConfig {
    TestClusterConfig {
        root_dir: root.to_path_buf(),
        tick_interval_ms: TICK_INTERVAL_MS,
        ..Default::default()
    }
}

/// Harness settings rooted in `root`; the leader poll keeps its default
/// budget but checks more often.
pub fn harness_config(root: &Path) -> HarnessConfig {
    HarnessConfig {
        leader_poll: LeaderPollConfig {
            interval_ms: 50,
            ..Default::default()
        },
        cluster: cluster_settings(root),
        ..Default::default()
    }
}

pub fn artifacts(configs: &[InstanceConfig]) -> Vec<PathBuf> {
    configs.iter().flat_map(|c| c.artifact_paths()).collect()
}

pub fn assert_removed(paths: &[PathBuf]) {
    for path in paths {
        assert!(!path.exists(), "{path:?} still exists");
    }
}

/// Waits until the lowest ranked member is the only leader. Right after
/// launch a higher ranked member may lead briefly until the lower ranked one
/// is reachable.
pub async fn wait_settled_leader(cluster: &TestCluster) -> Server {
    let first = &cluster.configs()[0].name;
    for _ in 0..250 {
        let leaders: Vec<&Server> = cluster.servers().iter().filter(|s| s.is_leader()).collect();
        if leaders.len() == 1 && leaders[0].name() == first {
            return leaders[0].clone();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{first} did not settle as the only leader");
}
