use tracing::info;
use tracing::warn;

use crate::utils::async_task::poll_with_fixed_interval;
use crate::HarnessError;
use crate::LeaderPollConfig;
use crate::Result;
use crate::Server;

/// Polls `servers` until one reports leadership.
///
/// Each round scans in slice order and the first leader found wins. Running
/// out of attempts is [`HarnessError::NoLeader`].
pub async fn wait_leader(
    servers: &[Server],
    cfg: &LeaderPollConfig,
) -> Result<Server> {
    let found = poll_with_fixed_interval(cfg.interval(), cfg.max_attempts, move || async move {
        servers.iter().find(|s| s.is_leader()).cloned()
    })
    .await;

    match found {
        Some(leader) => {
            info!("[{}] elected as leader", leader.name());
            Ok(leader)
        }
        None => {
            warn!(
                "no leader among {} instance(s) after {} attempts",
                servers.len(),
                cfg.max_attempts
            );
            Err(HarnessError::NoLeader {
                attempts: cfg.max_attempts,
                interval: cfg.interval(),
            }
            .into())
        }
    }
}

pub async fn must_wait_leader(
    servers: &[Server],
    cfg: &LeaderPollConfig,
) -> Server {
    wait_leader(servers, cfg).await.unwrap_or_else(|e| panic!("{e}"))
}
