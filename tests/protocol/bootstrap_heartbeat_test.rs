use std::time::Duration;
use std::time::Instant;

use pd_harness::bootstrap_cluster;
use pd_harness::must_bootstrap_cluster;
use pd_harness::must_new_pd_client;
use pd_harness::must_new_server;
use pd_harness::must_put_store;
use pd_harness::must_region_heartbeat;
use pd_harness::proto::pdpb::ErrorType;
use pd_harness::put_store;
use pd_harness::Error;
use pd_harness::Fixtures;
use pd_harness::HarnessError;
use pd_harness::HeartbeatSession;
use pd_harness::TestCluster;

use crate::common::enable_logger;
use crate::common::harness_config;
use crate::common::wait_settled_leader;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bootstrap_then_heartbeat_on_fresh_cluster() {
    enable_logger();
    let (server, cluster) = must_new_server().await;
    let fixtures = Fixtures::new(server.cluster_id());
    let mut client = must_new_pd_client(server.addr()).await;

    must_bootstrap_cluster(&mut client, fixtures.cluster_id, fixtures.store.clone(), fixtures.region.clone()).await;

    let session = HeartbeatSession::open(&mut client).await.unwrap();
    let settle = cluster.settings().heartbeat.settle_delay();
    assert_eq!(settle, Duration::from_millis(200));
    let start = Instant::now();
    must_region_heartbeat(&session, fixtures.cluster_id, &fixtures.region_info(), settle).await;
    assert!(start.elapsed() >= settle);

    let info = server.get_region(fixtures.region.id).unwrap();
    assert_eq!(info.region, fixtures.region);
    assert!(info.leader.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_put_store_with_new_id_after_bootstrap() {
    let (server, _cluster) = must_new_server().await;
    let fixtures = Fixtures::new(server.cluster_id());
    let mut client = must_new_pd_client(server.addr()).await;

    must_bootstrap_cluster(&mut client, fixtures.cluster_id, fixtures.store.clone(), fixtures.region.clone()).await;
    must_put_store(&mut client, fixtures.cluster_id, fixtures.extra_store(2)).await;

    let ids: Vec<u64> = server.stores().iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rejections_are_protocol_errors() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = TestCluster::start(1, harness_config(dir.path())).await.unwrap();
    let leader = cluster.leader().unwrap();
    let fixtures = Fixtures::new(cluster.cluster_id());
    let mut client = must_new_pd_client(leader.addr()).await;

    let err = put_store(&mut client, fixtures.cluster_id, fixtures.extra_store(2))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Harness(HarnessError::Protocol {
            error_type: ErrorType::NotBootstrapped,
            ..
        })
    ));

    must_bootstrap_cluster(&mut client, fixtures.cluster_id, fixtures.store.clone(), fixtures.region.clone()).await;
    let err = bootstrap_cluster(&mut client, fixtures.cluster_id, fixtures.store.clone(), fixtures.region.clone())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Harness(HarnessError::Protocol {
            error_type: ErrorType::AlreadyBootstrapped,
            ..
        })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_followers_reject_at_transport_level() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = TestCluster::start(3, harness_config(dir.path())).await.unwrap();
    let leader = wait_settled_leader(&cluster).await;
    let follower = cluster
        .servers()
        .iter()
        .find(|s| s.name() != leader.name())
        .cloned()
        .unwrap();
    let fixtures = Fixtures::new(cluster.cluster_id());

    let mut client = must_new_pd_client(follower.addr()).await;
    let err = bootstrap_cluster(&mut client, fixtures.cluster_id, fixtures.store.clone(), fixtures.region.clone())
        .await
        .unwrap_err();
    match err {
        Error::Harness(HarnessError::Rpc { call, status }) => {
            assert_eq!(call, "Bootstrap");
            assert_eq!(status.code(), tonic::Code::Unavailable);
        }
        e => panic!("unexpected error: {e:?}"),
    }
}
