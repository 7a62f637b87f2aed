mod launch_failure_test;
mod start_stop_test;
