use pd_harness::Error;
use pd_harness::HarnessError;
use pd_harness::InstanceConfig;
use pd_harness::TestCluster;

use crate::common::artifacts;
use crate::common::assert_removed;
use crate::common::cluster_settings;
use crate::common::harness_config;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_launch_failure_is_reported_and_cleaned_up() {
    let dir = tempfile::tempdir().unwrap();
    let mut configs = InstanceConfig::new_test_multi_config(3, &cluster_settings(dir.path()));
    configs[2].client_urls = "tcp://127.0.0.1:2379".into();

    let err = TestCluster::start_with_configs(configs.clone(), harness_config(dir.path()))
        .await
        .unwrap_err();
    match err {
        Error::Harness(HarnessError::Launch { failed, .. }) => {
            assert_eq!(failed, vec![configs[2].name.clone()]);
        }
        e => panic!("unexpected error: {e:?}"),
    }
    assert_removed(&artifacts(&configs));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_leader_is_fatal_and_cleaned_up() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = harness_config(dir.path());
    settings.leader_poll.max_attempts = 5;
    // the first member and a ghost never start, so the two live members lack a quorum
    let mut configs = InstanceConfig::new_test_multi_config(3, &settings.cluster);
    let absent = configs.remove(0);
    for cfg in configs.iter_mut() {
        cfg.initial_cluster.retain(|m| m.name != absent.name);
        cfg.initial_cluster.push(pd_harness::ClusterMember {
            name: absent.name.clone(),
            peer_url: absent.peer_urls.clone(),
        });
        cfg.initial_cluster.push(pd_harness::ClusterMember {
            name: "pd-ghost".into(),
            peer_url: format!("unix://{}/ghost.peer.sock", dir.path().display()),
        });
    }

    let err = TestCluster::start_with_configs(configs.clone(), settings)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Harness(HarnessError::NoLeader { attempts: 5, .. })));
    assert_removed(&artifacts(&configs));
}
