//! Cluster lifecycle controller.
//!
//! A [`TestCluster`] moves through
//! `Unstarted -> Launching -> AwaitingLeader -> Ready -> TornDown`.
//! Only a `Ready` cluster is handed to the caller; when launch or leader
//! convergence fails the partially built cluster is torn down before the
//! error is returned.

use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use config::ConfigError;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::launcher::launch_instances;
use super::leader::wait_leader;
use crate::transport::UnixHttpClient;
use crate::ApiHandler;
use crate::HarnessConfig;
use crate::InstanceConfig;
use crate::Result;
use crate::Server;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    Unstarted,
    Launching,
    AwaitingLeader,
    Ready,
    TornDown,
}

/// Handles of a running cluster plus everything needed to clean it up.
///
/// [`TestCluster::teardown`] runs at most once; `Drop` runs it if the test
/// did not.
#[derive(Debug)]
pub struct TestCluster {
    settings: HarnessConfig,
    configs: Vec<InstanceConfig>,
    servers: Vec<Server>,
    leader: Option<Server>,
    state: ClusterState,
    /// Directories created for this cluster only, removed once empty
    run_dirs: Vec<PathBuf>,
}

impl TestCluster {
    /// Launches `num` instances with unique sockets and data directories
    /// under `settings.cluster.root_dir` and waits for a leader.
    pub async fn start(
        num: usize,
        settings: HarnessConfig,
    ) -> Result<Self> {
        let settings = settings.validate()?;
        let configs = InstanceConfig::new_test_multi_config(num, &settings.cluster);
        let mut run_dirs: Vec<PathBuf> = configs
            .iter()
            .filter_map(|c| c.data_dir.parent().map(Path::to_path_buf))
            .collect();
        run_dirs.dedup();

        let mut cluster = Self::unstarted(configs, settings);
        cluster.run_dirs = run_dirs;
        cluster.converge().await?;
        Ok(cluster)
    }

    /// Same as [`TestCluster::start`] with caller supplied configs.
    pub async fn start_with_configs(
        configs: Vec<InstanceConfig>,
        settings: HarnessConfig,
    ) -> Result<Self> {
        let settings = settings.validate()?;
        let mut cluster = Self::unstarted(configs, settings);
        cluster.converge().await?;
        Ok(cluster)
    }

    fn unstarted(
        configs: Vec<InstanceConfig>,
        settings: HarnessConfig,
    ) -> Self {
        Self {
            settings,
            configs,
            servers: Vec::new(),
            leader: None,
            state: ClusterState::Unstarted,
            run_dirs: Vec::new(),
        }
    }

    async fn converge(&mut self) -> Result<()> {
        if self.configs.is_empty() {
            return Err(ConfigError::Message("a test cluster needs at least one instance".into()).into());
        }

        self.state = ClusterState::Launching;
        let outcome = launch_instances(self.configs.clone(), ApiHandler::new).await;
        let failure = (!outcome.is_complete()).then(|| outcome.launch_error());
        self.servers = outcome.started;
        if let Some(e) = failure {
            self.teardown();
            return Err(e.into());
        }
        debug!("all {} instance(s) reported", self.servers.len());

        self.state = ClusterState::AwaitingLeader;
        match wait_leader(&self.servers, &self.settings.leader_poll).await {
            Ok(leader) => {
                self.leader = Some(leader);
                self.state = ClusterState::Ready;
                Ok(())
            }
            Err(e) => {
                self.teardown();
                Err(e)
            }
        }
    }

    pub fn state(&self) -> ClusterState {
        self.state
    }

    pub fn configs(&self) -> &[InstanceConfig] {
        &self.configs
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    /// Leader found by the last convergence poll. Leadership may have moved
    /// since; see [`TestCluster::refresh_leader`].
    pub fn leader(&self) -> Option<&Server> {
        self.leader.as_ref()
    }

    /// Polls again and records whichever instance leads now.
    pub async fn refresh_leader(&mut self) -> Result<Server> {
        let leader = wait_leader(&self.servers, &self.settings.leader_poll).await?;
        self.leader = Some(leader.clone());
        Ok(leader)
    }

    pub fn cluster_id(&self) -> u64 {
        self.configs.first().map(|c| c.cluster_id).unwrap_or_default()
    }

    pub fn settings(&self) -> &HarnessConfig {
        &self.settings
    }

    /// A fresh HTTP client configured from the harness settings.
    pub fn http_client(&self) -> UnixHttpClient {
        UnixHttpClient::new(&self.settings.http)
    }

    /// Closes every instance and removes every artifact its config names.
    ///
    /// Individual failures are logged and never stop the remaining cleanup.
    /// Calling it again is a no-op.
    pub fn teardown(&mut self) {
        if self.state == ClusterState::TornDown {
            return;
        }
        let from = self.state;
        self.state = ClusterState::TornDown;

        for server in &self.servers {
            server.close();
        }
        for cfg in &self.configs {
            for path in cfg.artifact_paths() {
                remove_artifact(&path);
            }
        }
        for dir in &self.run_dirs {
            if let Err(e) = std::fs::remove_dir(dir) {
                debug!(?dir, "run dir kept: {}", e);
            }
        }
        info!("cluster {} torn down from {:?}", self.cluster_id(), from);
    }
}

impl Drop for TestCluster {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn remove_artifact(path: &Path) {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => debug!(?path, "removed"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(?path, "failed to remove: {}", e),
    }
}

/// Starts a `num` instance cluster with settings from the environment and
/// waits for its leader, panicking on any failure.
pub async fn must_new_cluster(num: usize) -> TestCluster {
    let settings = HarnessConfig::new().unwrap_or_else(|e| panic!("invalid harness config: {e}"));
    TestCluster::start(num, settings)
        .await
        .unwrap_or_else(|e| panic!("failed to start {num} instance cluster: {e}"))
}

/// One instance cluster; returns the leading instance next to its cluster.
pub async fn must_new_server() -> (Server, TestCluster) {
    let cluster = must_new_cluster(1).await;
    let server = cluster
        .leader()
        .cloned()
        .unwrap_or_else(|| panic!("ready cluster without leader"));
    (server, cluster)
}
