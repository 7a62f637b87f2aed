//! A minimal placement driver instance.
//!
//! ## Key Responsibilities
//! - Serves `peerpb.Peer` on its peer socket for leader election
//! - Serves `pdpb.PD` and the JSON api (HTTP/1.1 on the same socket) on its
//!   client socket
//! - Keeps the cluster metadata under its data directory
//!
//! ## Lifecycle
//! ```rust,ignore
//! let server = Server::create(cfg);
//! server.start_subsystems(ApiHandler::new(server.clone())).await?;
//! tokio::spawn({
//!     let server = server.clone();
//!     async move { server.run().await }
//! });
//! // ...
//! server.close();
//! ```

mod cluster;
mod election;
mod grpc_service;

pub use cluster::*;
pub use election::PeerProber;
pub use election::PeerStatus;


use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixListener;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::UnixListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server as RpcServer;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use self::election::Elector;
use self::election::GrpcPeerProber;
use crate::proto::pdpb::pd_server::PdServer;
use crate::proto::pdpb::Member;
use crate::proto::peerpb::peer_server::PeerServer;
use crate::transport::socket_path;
use crate::ApiHandler;
use crate::InstanceConfig;
use crate::Result;
use crate::ServerError;
use crate::CLUSTER_META_FILE;

const MIN_PROBE_TIMEOUT: Duration = Duration::from_millis(200);

/// Handle to one instance. Cloning is cheap; all clones drive the same
/// instance.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    cfg: InstanceConfig,
    cluster: ClusterStore,
    leader: AtomicBool,
    started: AtomicBool,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Server {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.name())
            .field("addr", &self.addr())
            .field("is_leader", &self.is_leader())
            .finish()
    }
}

impl Server {
    /// Builds the instance; nothing is bound or written until
    /// [`Server::start_subsystems`].
    pub fn create(cfg: InstanceConfig) -> Self {
        let cluster = ClusterStore::new(cfg.data_dir.join(CLUSTER_META_FILE));
        Self {
            inner: Arc::new(ServerInner {
                cfg,
                cluster,
                leader: AtomicBool::new(false),
                started: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Creates the data directory, loads persisted metadata and starts
    /// serving on the peer and client sockets. `handler` serves the JSON api
    /// next to the gRPC services.
    pub async fn start_subsystems(
        &self,
        handler: ApiHandler,
    ) -> Result<()> {
        let cfg = &self.inner.cfg;
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyStarted(cfg.name.clone()).into());
        }
        cfg.validate()?;

        tokio::fs::create_dir_all(&cfg.data_dir).await?;
        self.inner.cluster.load()?;

        let peer_listener = bind(&socket_path(&cfg.peer_urls)?)?;
        let client_listener = bind(&socket_path(&cfg.client_urls)?)?;

        let name = cfg.name.clone();
        let shutdown = self.inner.shutdown.clone();
        let peer_service = PeerServer::new(self.clone());
        tokio::spawn(async move {
            if let Err(e) = RpcServer::builder()
                .add_service(peer_service)
                .serve_with_incoming_shutdown(UnixListenerStream::new(peer_listener), shutdown.cancelled_owned())
                .await
            {
                error!("[{}] peer server stopped with error: {:?}", name, e);
            }
            debug!("[{}] peer server finished", name);
        });

        let name = cfg.name.clone();
        let shutdown = self.inner.shutdown.clone();
        let pd_service = PdServer::new(self.clone());
        tokio::spawn(async move {
            if let Err(e) = RpcServer::builder()
                .accept_http1(true)
                .add_service(pd_service)
                .add_service(handler)
                .serve_with_incoming_shutdown(UnixListenerStream::new(client_listener), shutdown.cancelled_owned())
                .await
            {
                error!("[{}] client server stopped with error: {:?}", name, e);
            }
            debug!("[{}] client server finished", name);
        });

        info!("[{}] subsystems started, client url {}", cfg.name, cfg.client_urls);
        Ok(())
    }

    /// Runs the election loop until [`Server::close`].
    pub async fn run(&self) -> Result<()> {
        let cfg = &self.inner.cfg;
        if !self.inner.started.load(Ordering::SeqCst) {
            return Err(ServerError::NotStarted(cfg.name.clone()).into());
        }
        let rank = cfg
            .rank()
            .ok_or_else(|| ServerError::Task(cfg.name.clone(), "not a member of initial_cluster".into()))?;
        let probe_timeout = cfg.tick_interval().max(MIN_PROBE_TIMEOUT);
        let prober = GrpcPeerProber::new(cfg.name.clone(), cfg.cluster_id, probe_timeout);
        let elector = Elector::new(rank, cfg.initial_cluster.clone(), prober);

        let mut ticker = tokio::time::interval(cfg.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let was_leader = self.is_leader();
                    let lead = elector.tick(was_leader).await;
                    if !self.apply_tick(was_leader, lead) {
                        break;
                    }
                }
            }
        }

        self.set_leader(false);
        debug!("[{}] run loop exited", cfg.name);
        Ok(())
    }

    /// Stores the outcome of an election round. Returns false once the
    /// instance is closed; a closed instance never reports leadership.
    pub(crate) fn apply_tick(
        &self,
        was_leader: bool,
        lead: bool,
    ) -> bool {
        if self.is_closed() {
            return false;
        }
        if lead != was_leader {
            info!("[{}] leadership changed: {} -> {}", self.name(), was_leader, lead);
        }
        self.set_leader(lead);
        true
    }

    /// Stops the run loop and both servers. Safe to call more than once.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.set_leader(false);
        self.inner.shutdown.cancel();
        info!("[{}] closed", self.name());
    }

    pub fn is_leader(&self) -> bool {
        self.inner.leader.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn cluster_id(&self) -> u64 {
        self.inner.cfg.cluster_id
    }

    /// Externally reachable address of the client socket
    pub fn addr(&self) -> &str {
        &self.inner.cfg.advertise_client_urls
    }

    pub fn name(&self) -> &str {
        &self.inner.cfg.name
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.inner.cfg
    }

    /// Members of the initial cluster. Only this instance's client url is
    /// known locally.
    pub fn members(&self) -> Vec<Member> {
        let cfg = &self.inner.cfg;
        cfg.initial_cluster
            .iter()
            .map(|m| Member {
                name: m.name.clone(),
                peer_urls: vec![m.peer_url.clone()],
                client_urls: if m.name == cfg.name {
                    vec![cfg.advertise_client_urls.clone()]
                } else {
                    vec![]
                },
            })
            .collect()
    }

    /// This instance as a member, if it currently leads
    pub fn leader_member(&self) -> Option<Member> {
        if !self.is_leader() {
            return None;
        }
        self.members().into_iter().find(|m| m.name == self.name())
    }

    pub fn stores(&self) -> Vec<crate::proto::metapb::Store> {
        self.inner.cluster.stores()
    }

    pub fn get_store(
        &self,
        store_id: u64,
    ) -> Option<crate::proto::metapb::Store> {
        self.inner.cluster.get_store(store_id)
    }

    pub fn regions(&self) -> Vec<RegionInfo> {
        self.inner.cluster.regions()
    }

    pub fn get_region(
        &self,
        region_id: u64,
    ) -> Option<RegionInfo> {
        self.inner.cluster.get_region(region_id)
    }

    pub(crate) fn set_leader(
        &self,
        lead: bool,
    ) {
        self.inner.leader.store(lead, Ordering::SeqCst);
    }

    pub(crate) fn cluster(&self) -> &ClusterStore {
        &self.inner.cluster
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }
}

/// Binds a unix listener, replacing a stale socket file left by a previous
/// run.
fn bind(path: &Path) -> Result<UnixListener> {
    if path.exists() {
        warn!(?path, "removing stale socket file");
        std::fs::remove_file(path).map_err(|source| ServerError::Bind {
            path: path.to_path_buf(),
            source,
        })?;
    }
    UnixListener::bind(path).map_err(|source| {
        ServerError::Bind {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}
