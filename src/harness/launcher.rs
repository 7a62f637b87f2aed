//! Concurrent start of a set of instances.
//!
//! Each config gets its own task: create the instance, start its subsystems
//! and, only once that succeeded, spawn its run loop. Results are fanned in
//! through a channel sized to the instance count; the launcher waits until
//! every task has reported.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::utils::async_task::spawn_task;
use crate::ApiHandler;
use crate::Error;
use crate::HarnessError;
use crate::InstanceConfig;
use crate::Result;
use crate::Server;

/// What came back from a launch. Arrival order, not config order.
#[derive(Debug, Default)]
pub struct LaunchOutcome {
    pub started: Vec<Server>,
    pub failed: Vec<(String, Error)>,
}

impl LaunchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Started handles, or a [`HarnessError::Launch`] naming every failed
    /// instance. Started instances are closed on failure.
    pub fn into_result(self) -> Result<Vec<Server>> {
        if self.is_complete() {
            return Ok(self.started);
        }
        for server in &self.started {
            server.close();
        }
        Err(self.launch_error().into())
    }

    pub(crate) fn launch_error(&self) -> HarnessError {
        HarnessError::Launch {
            failed: self.failed.iter().map(|(name, _)| name.clone()).collect(),
            reason: self
                .failed
                .iter()
                .map(|(name, e)| format!("{name}: {e}"))
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

/// Starts every config concurrently. `handler_factory` builds the api handler
/// each instance serves next to its gRPC services.
pub async fn launch_instances<F>(
    configs: Vec<InstanceConfig>,
    handler_factory: F,
) -> LaunchOutcome
where
    F: Fn(Server) -> ApiHandler + Send + Sync + 'static,
{
    let expected: Vec<String> = configs.iter().map(|c| c.name.clone()).collect();
    let factory = Arc::new(handler_factory);
    let (tx, mut rx) = mpsc::channel::<(String, Result<Server>)>(expected.len().max(1));

    for cfg in configs {
        let tx = tx.clone();
        let factory = factory.clone();
        tokio::spawn(async move {
            let name = cfg.name.clone();
            let result = start_instance(cfg, factory.as_ref()).await;
            if tx.send((name.clone(), result)).await.is_err() {
                error!("[{}] launch result dropped, launcher gone", name);
            }
        });
    }
    drop(tx);

    let mut outcome = LaunchOutcome::default();
    let mut reported = Vec::with_capacity(expected.len());
    while reported.len() < expected.len() {
        let Some((name, result)) = rx.recv().await else {
            break;
        };
        match result {
            Ok(server) => {
                debug!("[{}] launched", name);
                outcome.started.push(server);
            }
            Err(e) => {
                error!("[{}] failed to launch: {:?}", name, e);
                outcome.failed.push((name.clone(), e));
            }
        }
        reported.push(name);
    }

    // A task that died without reporting still counts as a failure.
    for name in expected.into_iter().filter(|n| !reported.contains(n)) {
        error!("[{}] launch task exited without reporting", name);
        outcome.failed.push((
            name.clone(),
            HarnessError::Launch {
                failed: vec![name],
                reason: "launch task exited without reporting".into(),
            }
            .into(),
        ));
    }

    info!(
        "launched {} instance(s), {} failed",
        outcome.started.len(),
        outcome.failed.len()
    );
    outcome
}

async fn start_instance<F>(
    cfg: InstanceConfig,
    handler_factory: &F,
) -> Result<Server>
where
    F: Fn(Server) -> ApiHandler,
{
    let server = Server::create(cfg);
    if let Err(e) = server.start_subsystems(handler_factory(server.clone())).await {
        // Stops whatever listener got bound before the failure.
        server.close();
        return Err(e);
    }

    let runner = server.clone();
    spawn_task(server.name(), move || async move { runner.run().await });
    Ok(server)
}
