use pd_harness::must_bootstrap_cluster;
use pd_harness::must_new_pd_client;
use pd_harness::must_region_heartbeat;
use pd_harness::proto::metapb::Cluster;
use pd_harness::proto::metapb::Peer;
use pd_harness::transport::read_json_with_url;
use pd_harness::wait_region_reported;
use pd_harness::Error;
use pd_harness::Fixtures;
use pd_harness::HeartbeatSession;
use pd_harness::MembersInfo;
use pd_harness::NetworkError;
use pd_harness::RegionInfo;
use pd_harness::RegionsInfo;
use pd_harness::StoresInfo;
use pd_harness::TestCluster;
use pd_harness::API_PREFIX;

use crate::common::enable_logger;
use crate::common::harness_config;
use crate::common::wait_settled_leader;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_members_and_cluster_over_unix_socket() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let cluster = TestCluster::start(3, harness_config(dir.path())).await.unwrap();
    let leader = wait_settled_leader(&cluster).await;
    let http = cluster.http_client();

    let info: MembersInfo = read_json_with_url(&http, leader.addr(), &format!("{API_PREFIX}/members"))
        .await
        .unwrap();
    assert_eq!(info.members.len(), 3);
    assert_eq!(info.leader.map(|m| m.name), Some(leader.name().to_string()));

    let meta: Cluster = read_json_with_url(&http, leader.addr(), &format!("{API_PREFIX}/cluster"))
        .await
        .unwrap();
    assert_eq!(meta.id, cluster.cluster_id());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stores_and_regions_follow_the_protocol() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = TestCluster::start(1, harness_config(dir.path())).await.unwrap();
    let leader = cluster.leader().unwrap();
    let fixtures = Fixtures::new(cluster.cluster_id());
    let http = cluster.http_client();
    let mut client = must_new_pd_client(leader.addr()).await;

    must_bootstrap_cluster(&mut client, fixtures.cluster_id, fixtures.store.clone(), fixtures.region.clone()).await;
    let stores: StoresInfo = read_json_with_url(&http, leader.addr(), &format!("{API_PREFIX}/stores"))
        .await
        .unwrap();
    assert_eq!(stores.count, 1);
    assert_eq!(stores.stores[0], fixtures.store);

    let session = HeartbeatSession::open(&mut client).await.unwrap();
    let with_leader = RegionInfo::new(fixtures.region.clone(), Some(Peer::new(2, 1)));
    let settle = cluster.settings().heartbeat.settle_delay();
    must_region_heartbeat(&session, fixtures.cluster_id, &with_leader, settle).await;

    let reported = wait_region_reported(&http, leader.addr(), 8, &cluster.settings().heartbeat)
        .await
        .unwrap();
    assert_eq!(reported, with_leader);

    let regions: RegionsInfo = read_json_with_url(&http, leader.addr(), &format!("{API_PREFIX}/regions"))
        .await
        .unwrap();
    assert_eq!(regions.count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_region_is_http_404() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = TestCluster::start(1, harness_config(dir.path())).await.unwrap();
    let leader = cluster.leader().unwrap();

    let err = read_json_with_url::<RegionInfo>(&cluster.http_client(), leader.addr(), &format!("{API_PREFIX}/region/77"))
        .await
        .unwrap_err();
    match err {
        Error::Network(NetworkError::HttpStatus { status, .. }) => assert_eq!(status, 404),
        e => panic!("unexpected error: {e:?}"),
    }
}
