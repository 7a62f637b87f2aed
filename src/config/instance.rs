use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use config::Config;
use config::File;
use rand::Rng;
use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::transport::socket_path;
use crate::Result;
use crate::UNIX_SCHEME;

/// Where test clusters put their sockets and data directories
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TestClusterConfig {
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// Election tick of every launched instance
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for TestClusterConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            name_prefix: default_name_prefix(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl TestClusterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(invalid("cluster.root_dir path cannot be empty"));
        }
        if self.name_prefix.is_empty() {
            return Err(invalid("cluster.name_prefix cannot be empty"));
        }
        if self.tick_interval_ms == 0 {
            return Err(invalid("cluster.tick_interval_ms must be greater than 0"));
        }
        Ok(())
    }
}

/// One member of the initial cluster, as seen by every instance
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ClusterMember {
    pub name: String,
    pub peer_url: String,
}

/// Addressing and storage of one instance.
///
/// Immutable for the lifetime of the instance; the harness reads it again at
/// teardown to find the artifacts the instance left behind.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct InstanceConfig {
    pub name: String,
    pub data_dir: PathBuf,

    pub peer_urls: String,
    pub client_urls: String,
    pub advertise_peer_urls: String,
    pub advertise_client_urls: String,

    pub cluster_id: u64,
    /// Ordered by rank; the lowest ranked live member leads
    pub initial_cluster: Vec<ClusterMember>,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl InstanceConfig {
    /// Loads an instance description from a toml file
    pub fn load(path: &str) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(File::with_name(path).required(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Single instance config with fresh, unique paths
    pub fn new_test_config(settings: &TestClusterConfig) -> Self {
        Self::new_test_multi_config(1, settings).remove(0)
    }

    /// `num` configs forming one cluster, sharing a cluster id and a run directory
    pub fn new_test_multi_config(
        num: usize,
        settings: &TestClusterConfig,
    ) -> Vec<Self> {
        let run_dir = new_run_dir(settings);
        let cluster_id = new_cluster_id();

        let names: Vec<String> = (0..num).map(|i| format!("{}{}", settings.name_prefix, i)).collect();
        let initial_cluster: Vec<ClusterMember> = names
            .iter()
            .map(|name| ClusterMember {
                name: name.clone(),
                peer_url: unix_url(&run_dir, name, "peer"),
            })
            .collect();

        names
            .into_iter()
            .map(|name| {
                let peer_urls = unix_url(&run_dir, &name, "peer");
                let client_urls = unix_url(&run_dir, &name, "client");
                Self {
                    data_dir: run_dir.join(&name),
                    advertise_peer_urls: peer_urls.clone(),
                    advertise_client_urls: client_urls.clone(),
                    peer_urls,
                    client_urls,
                    name,
                    cluster_id,
                    initial_cluster: initial_cluster.clone(),
                    tick_interval_ms: settings.tick_interval_ms,
                }
            })
            .collect()
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Position of this instance in `initial_cluster`
    pub fn rank(&self) -> Option<usize> {
        self.initial_cluster.iter().position(|m| m.name == self.name)
    }

    /// Validates configuration consistency
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(invalid("name cannot be empty"));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(invalid(format!("{}: data_dir path cannot be empty", self.name)));
        }
        if self.cluster_id == 0 {
            return Err(invalid(format!("{}: cluster_id cannot be 0", self.name)));
        }
        if self.tick_interval_ms == 0 {
            return Err(invalid(format!("{}: tick_interval_ms must be greater than 0", self.name)));
        }

        for url in [
            &self.peer_urls,
            &self.client_urls,
            &self.advertise_peer_urls,
            &self.advertise_client_urls,
        ] {
            socket_path(url).map_err(|e| invalid(format!("{}: {}", self.name, e)))?;
        }

        let mut names = std::collections::HashSet::new();
        for member in &self.initial_cluster {
            if !names.insert(member.name.as_str()) {
                return Err(invalid(format!("Duplicate member {} in initial_cluster", member.name)));
            }
        }
        if self.rank().is_none() {
            return Err(invalid(format!("Current instance {} not found in initial_cluster", self.name)));
        }

        Ok(())
    }

    /// Filesystem artifacts owned by this instance: the data directory and the
    /// socket files behind each of its four urls. Duplicates are kept; removal
    /// of an already removed path is a no-op.
    pub fn artifact_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.data_dir.clone()];
        paths.extend(
            [
                &self.peer_urls,
                &self.client_urls,
                &self.advertise_peer_urls,
                &self.advertise_client_urls,
            ]
            .into_iter()
            .filter_map(|url| socket_path(url).ok()),
        );
        paths
    }
}

/// Time based with random low bits so that clusters created in the same
/// second still differ.
pub fn new_cluster_id() -> u64 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let salt: u16 = rand::thread_rng().gen_range(1..=u16::MAX);
    (secs << 16) | salt as u64
}

fn new_run_dir(settings: &TestClusterConfig) -> PathBuf {
    settings.root_dir.join(nanoid::nanoid!(10, &nanoid::alphabet::SAFE[2..]))
}

fn unix_url(
    run_dir: &Path,
    name: &str,
    kind: &str,
) -> String {
    format!("{}{}", UNIX_SCHEME, run_dir.join(format!("{name}.{kind}.sock")).display())
}

fn default_root_dir() -> PathBuf {
    std::env::temp_dir().join("pd-harness")
}
fn default_name_prefix() -> String {
    "pd".to_string()
}
fn default_tick_interval_ms() -> u64 {
    100
}
