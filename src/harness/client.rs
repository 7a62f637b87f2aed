//! Protocol client factory and the control-plane drivers.
//!
//! Every driver embeds a [`RequestHeader`] with the target cluster id and
//! checks two things: the call completed at the transport level
//! ([`HarnessError::Rpc`] otherwise) and the response header carries
//! `ErrorType::Ok` ([`HarnessError::Protocol`] otherwise).

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::Streaming;
use tracing::debug;
use tracing::trace;

use crate::proto::metapb::Region;
use crate::proto::metapb::Store;
use crate::proto::pdpb::pd_client::PdClient;
use crate::proto::pdpb::BootstrapRequest;
use crate::proto::pdpb::PutStoreRequest;
use crate::proto::pdpb::RegionHeartbeatRequest;
use crate::proto::pdpb::RegionHeartbeatResponse;
use crate::proto::pdpb::RequestHeader;
use crate::proto::pdpb::ResponseHeader;
use crate::transport::read_json_with_url;
use crate::transport::unix_channel;
use crate::transport::UnixHttpClient;
use crate::utils::async_task::poll_with_fixed_interval;
use crate::HarnessError;
use crate::HeartbeatConfig;
use crate::RegionInfo;
use crate::Result;
use crate::API_PREFIX;

const HEARTBEAT_SEND_BUFFER: usize = 16;

/// Plaintext `pdpb.PD` client dialed through the unix socket behind `addr`.
pub async fn new_pd_client(addr: &str) -> Result<PdClient<Channel>> {
    let channel = unix_channel(addr).await?;
    debug!(addr, "pd client connected");
    Ok(PdClient::new(channel))
}

pub async fn must_new_pd_client(addr: &str) -> PdClient<Channel> {
    new_pd_client(addr)
        .await
        .unwrap_or_else(|e| panic!("failed to create pd client for {addr}: {e}"))
}

pub fn new_request_header(cluster_id: u64) -> RequestHeader {
    RequestHeader::new(cluster_id)
}

pub(crate) fn check_response(
    call: &'static str,
    header: Option<ResponseHeader>,
) -> Result<()> {
    let header = header.ok_or(HarnessError::MissingHeader(call))?;
    if header.is_ok() {
        return Ok(());
    }
    Err(HarnessError::Protocol {
        call,
        error_type: header.error_type(),
        code: header.error_code(),
        message: header.error_message().to_string(),
    }
    .into())
}

fn rpc_error(
    call: &'static str,
    status: tonic::Status,
) -> HarnessError {
    HarnessError::Rpc {
        call,
        status: Box::new(status),
    }
}

/// Seeds the cluster with its first store and region.
pub async fn bootstrap_cluster(
    client: &mut PdClient<Channel>,
    cluster_id: u64,
    store: Store,
    region: Region,
) -> Result<()> {
    let request = BootstrapRequest {
        header: Some(new_request_header(cluster_id)),
        store: Some(store),
        region: Some(region),
    };
    let resp = client
        .bootstrap(request)
        .await
        .map_err(|s| rpc_error("Bootstrap", s))?
        .into_inner();
    check_response("Bootstrap", resp.header)
}

pub async fn must_bootstrap_cluster(
    client: &mut PdClient<Channel>,
    cluster_id: u64,
    store: Store,
    region: Region,
) {
    bootstrap_cluster(client, cluster_id, store, region)
        .await
        .unwrap_or_else(|e| panic!("{e}"));
}

/// Registers one more store on a bootstrapped cluster.
pub async fn put_store(
    client: &mut PdClient<Channel>,
    cluster_id: u64,
    store: Store,
) -> Result<()> {
    let request = PutStoreRequest {
        header: Some(new_request_header(cluster_id)),
        store: Some(store),
    };
    let resp = client
        .put_store(request)
        .await
        .map_err(|s| rpc_error("PutStore", s))?
        .into_inner();
    check_response("PutStore", resp.header)
}

pub async fn must_put_store(
    client: &mut PdClient<Channel>,
    cluster_id: u64,
    store: Store,
) {
    put_store(client, cluster_id, store)
        .await
        .unwrap_or_else(|e| panic!("{e}"));
}

/// An open `RegionHeartbeat` stream, owned by one test.
///
/// The server only answers rejected heartbeats, so `responses` stays silent
/// while everything is accepted.
#[derive(Debug)]
pub struct HeartbeatSession {
    tx: mpsc::Sender<RegionHeartbeatRequest>,
    responses: Streaming<RegionHeartbeatResponse>,
}

impl HeartbeatSession {
    pub async fn open(client: &mut PdClient<Channel>) -> Result<Self> {
        let (tx, rx) = mpsc::channel(HEARTBEAT_SEND_BUFFER);
        let responses = client
            .region_heartbeat(ReceiverStream::new(rx))
            .await
            .map_err(|s| rpc_error("RegionHeartbeat", s))?
            .into_inner();
        Ok(Self { tx, responses })
    }

    pub async fn send(
        &self,
        request: RegionHeartbeatRequest,
    ) -> Result<()> {
        self.tx
            .send(request)
            .await
            .map_err(|_| HarnessError::HeartbeatClosed.into())
    }

    /// Next server response, or `None` if nothing arrives within `wait`.
    pub async fn next_response(
        &mut self,
        wait: Duration,
    ) -> Result<Option<RegionHeartbeatResponse>> {
        match tokio::time::timeout(wait, self.responses.message()).await {
            Err(_) => Ok(None),
            Ok(Ok(Some(resp))) => Ok(Some(resp)),
            Ok(Ok(None)) => Err(HarnessError::HeartbeatClosed.into()),
            Ok(Err(status)) => Err(rpc_error("RegionHeartbeat", status).into()),
        }
    }
}

/// Sends one heartbeat for `info`, then waits `settle` so the server has
/// applied it before the caller looks at side effects.
pub async fn region_heartbeat(
    session: &HeartbeatSession,
    cluster_id: u64,
    info: &RegionInfo,
    settle: Duration,
) -> Result<()> {
    session
        .send(RegionHeartbeatRequest {
            header: Some(new_request_header(cluster_id)),
            region: Some(info.region.clone()),
            leader: info.leader.clone(),
        })
        .await?;
    trace!(region_id = info.region.id, "heartbeat sent, settling for {:?}", settle);
    tokio::time::sleep(settle).await;
    Ok(())
}

pub async fn must_region_heartbeat(
    session: &HeartbeatSession,
    cluster_id: u64,
    info: &RegionInfo,
    settle: Duration,
) {
    region_heartbeat(session, cluster_id, info, settle)
        .await
        .unwrap_or_else(|e| panic!("{e}"));
}

/// Polls the api at `addr` until region `region_id` is reported, bounded by
/// the observe budget of `cfg`.
pub async fn wait_region_reported(
    http: &UnixHttpClient,
    addr: &str,
    region_id: u64,
    cfg: &HeartbeatConfig,
) -> Result<RegionInfo> {
    let path = format!("{API_PREFIX}/region/{region_id}");
    poll_with_fixed_interval(cfg.observe_interval(), cfg.observe_attempts, move || {
        let path = path.clone();
        async move { read_json_with_url::<RegionInfo>(http, addr, &path).await.ok() }
    })
    .await
    .ok_or_else(|| {
        HarnessError::NotObserved {
            what: format!("region {region_id} at {addr}"),
            attempts: cfg.observe_attempts,
        }
        .into()
    })
}
