mod bootstrap_heartbeat_test;
