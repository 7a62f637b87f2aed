use std::collections::HashSet;
use std::time::Duration;

use pd_harness::must_new_server;
use pd_harness::ClusterState;
use pd_harness::TestCluster;

use crate::common::artifacts;
use crate::common::assert_removed;
use crate::common::enable_logger;
use crate::common::harness_config;
use crate::common::wait_settled_leader;

async fn assert_single_leader(cluster: &TestCluster) {
    let mut leaders = 0;
    for _ in 0..100 {
        leaders = cluster.servers().iter().filter(|s| s.is_leader()).count();
        if leaders == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(leaders, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cluster_sizes_yield_distinct_handles_and_one_leader() {
    enable_logger();
    for num in [1usize, 3, 5] {
        let dir = tempfile::tempdir().unwrap();
        let mut cluster = TestCluster::start(num, harness_config(dir.path())).await.unwrap();
        assert_eq!(cluster.state(), ClusterState::Ready);

        let names: HashSet<&str> = cluster.servers().iter().map(|s| s.name()).collect();
        assert_eq!(names.len(), num);
        let ids: HashSet<u64> = cluster.servers().iter().map(|s| s.cluster_id()).collect();
        assert_eq!(ids.len(), 1);
        let addrs: HashSet<&str> = cluster.servers().iter().map(|s| s.addr()).collect();
        assert_eq!(addrs.len(), num);

        assert_single_leader(&cluster).await;

        let paths = artifacts(cluster.configs());
        cluster.teardown();
        assert_removed(&paths);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_instance_elects_within_first_rounds() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = harness_config(dir.path());
    settings.leader_poll.interval_ms = 500;
    settings.leader_poll.max_attempts = 4;

    let start = std::time::Instant::now();
    let cluster = TestCluster::start(1, settings).await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(cluster.leader().unwrap().is_leader());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_must_new_server_returns_leader() {
    let (server, cluster) = must_new_server().await;
    assert!(server.is_leader());
    assert_eq!(server.cluster_id(), cluster.cluster_id());

    let paths = artifacts(cluster.configs());
    drop(cluster);
    assert!(server.is_closed());
    assert_removed(&paths);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_leadership_moves_when_leader_closes() {
    let dir = tempfile::tempdir().unwrap();
    let mut cluster = TestCluster::start(3, harness_config(dir.path())).await.unwrap();
    let old = wait_settled_leader(&cluster).await;
    old.close();

    let mut new = None;
    for _ in 0..200 {
        new = cluster.servers().iter().find(|s| s.is_leader()).cloned();
        if new.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let new = new.expect("a surviving member takes over");
    assert_ne!(new.name(), old.name());
    assert_eq!(cluster.refresh_leader().await.unwrap().name(), new.name());
}
