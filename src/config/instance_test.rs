use std::collections::HashSet;

use super::*;
use crate::UNIX_SCHEME;

fn settings() -> TestClusterConfig {
    TestClusterConfig {
        root_dir: std::env::temp_dir().join("pd-harness-config-test"),
        ..Default::default()
    }
}

#[test]
fn test_multi_config_shares_cluster_and_membership() {
    let configs = InstanceConfig::new_test_multi_config(3, &settings());

    assert_eq!(configs.len(), 3);
    let cluster_id = configs[0].cluster_id;
    for (i, cfg) in configs.iter().enumerate() {
        assert_eq!(cfg.name, format!("pd{i}"));
        assert_eq!(cfg.cluster_id, cluster_id);
        assert_eq!(cfg.initial_cluster.len(), 3);
        assert_eq!(cfg.rank(), Some(i));
        assert_eq!(cfg.peer_urls, cfg.advertise_peer_urls);
        assert_eq!(cfg.client_urls, cfg.advertise_client_urls);
        assert!(cfg.peer_urls.starts_with(UNIX_SCHEME));
        assert!(cfg.validate().is_ok());
    }
}

#[test]
fn test_configs_never_share_paths() {
    let mut configs = InstanceConfig::new_test_multi_config(3, &settings());
    configs.extend(InstanceConfig::new_test_multi_config(2, &settings()));

    let mut seen = HashSet::new();
    for cfg in &configs {
        assert!(seen.insert(cfg.data_dir.clone()));
        assert!(seen.insert(cfg.peer_urls.clone().into()));
        assert!(seen.insert(cfg.client_urls.clone().into()));
    }
}

#[test]
fn test_single_config_is_its_own_cluster() {
    let cfg = InstanceConfig::new_test_config(&settings());

    assert_eq!(cfg.initial_cluster.len(), 1);
    assert_eq!(cfg.initial_cluster[0].name, cfg.name);
    assert_eq!(cfg.initial_cluster[0].peer_url, cfg.peer_urls);
    assert_ne!(cfg.cluster_id, 0);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_artifact_paths_cover_data_dir_and_all_sockets() {
    let cfg = InstanceConfig::new_test_config(&settings());
    let paths = cfg.artifact_paths();

    assert_eq!(paths.len(), 5);
    assert_eq!(paths[0], cfg.data_dir);
    let client = cfg.client_urls.trim_start_matches(UNIX_SCHEME);
    let peer = cfg.peer_urls.trim_start_matches(UNIX_SCHEME);
    assert!(paths.iter().any(|p| p.to_str() == Some(client)));
    assert!(paths.iter().any(|p| p.to_str() == Some(peer)));
}

#[test]
fn test_artifact_paths_skip_non_socket_urls() {
    let mut cfg = InstanceConfig::new_test_config(&settings());
    cfg.advertise_client_urls = "http://127.0.0.1:2379".to_string();

    assert_eq!(cfg.artifact_paths().len(), 4);
}

#[test]
fn test_validate_rejects_bad_configs() {
    let base = InstanceConfig::new_test_config(&settings());

    let mut cfg = base.clone();
    cfg.client_urls = "tcp://127.0.0.1:2379".to_string();
    assert!(cfg.validate().is_err());

    let mut cfg = base.clone();
    cfg.cluster_id = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = base.clone();
    cfg.initial_cluster.clear();
    assert!(cfg.validate().is_err());

    let mut cfg = base.clone();
    cfg.initial_cluster.push(cfg.initial_cluster[0].clone());
    assert!(cfg.validate().is_err());
}

#[test]
fn test_load_reads_toml_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("pd0.toml");
    std::fs::write(
        &path,
        r#"
        name = "pd0"
        data_dir = "/tmp/pd0"
        peer_urls = "unix:///tmp/pd0.peer.sock"
        client_urls = "unix:///tmp/pd0.client.sock"
        advertise_peer_urls = "unix:///tmp/pd0.peer.sock"
        advertise_client_urls = "unixs:///tmp/pd0.client.sock"
        cluster_id = 11
        initial_cluster = [ { name = "pd0", peer_url = "unix:///tmp/pd0.peer.sock" } ]
        "#,
    )
    .unwrap();

    let cfg = InstanceConfig::load(path.to_str().unwrap()).unwrap();
    assert_eq!(cfg.name, "pd0");
    assert_eq!(cfg.cluster_id, 11);
    assert_eq!(cfg.tick_interval_ms, 100);
    assert_eq!(cfg.rank(), Some(0));
}

#[test]
fn test_cluster_ids_differ() {
    let ids: HashSet<u64> = (0..16).map(|_| new_cluster_id()).collect();
    assert!(ids.len() > 1);
    assert!(!ids.contains(&0));
}
