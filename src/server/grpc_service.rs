//! gRPC services of an instance: the `pdpb.PD` control plane on the client
//! socket and the `peerpb.Peer` probe on the peer socket.
//!
//! Calls addressed to another cluster are answered with a
//! `CLUSTER_ID_MISMATCH` header, metadata rejections with the matching
//! error type. Only transport-level problems (not leader, closed) become a
//! gRPC status.

use std::pin::Pin;

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Request;
use tonic::Response;
use tonic::Status;
use tonic::Streaming;
use tracing::debug;
use tracing::warn;

use super::ProtoError;
use super::ProtoResult;
use super::Server;
use crate::proto::pdpb::pd_server::Pd;
use crate::proto::pdpb::AllocIdRequest;
use crate::proto::pdpb::AllocIdResponse;
use crate::proto::pdpb::BootstrapRequest;
use crate::proto::pdpb::BootstrapResponse;
use crate::proto::pdpb::ErrorType;
use crate::proto::pdpb::GetMembersRequest;
use crate::proto::pdpb::GetMembersResponse;
use crate::proto::pdpb::GetRegionByIdRequest;
use crate::proto::pdpb::GetRegionResponse;
use crate::proto::pdpb::GetStoreRequest;
use crate::proto::pdpb::GetStoreResponse;
use crate::proto::pdpb::IsBootstrappedRequest;
use crate::proto::pdpb::IsBootstrappedResponse;
use crate::proto::pdpb::PutStoreRequest;
use crate::proto::pdpb::PutStoreResponse;
use crate::proto::pdpb::RegionHeartbeatRequest;
use crate::proto::pdpb::RegionHeartbeatResponse;
use crate::proto::pdpb::RequestHeader;
use crate::proto::pdpb::ResponseHeader;
use crate::proto::peerpb::peer_server::Peer;
use crate::proto::peerpb::PingRequest;
use crate::proto::peerpb::PingResponse;

const HEARTBEAT_RESPONSE_BUFFER: usize = 16;

impl Server {
    fn check_leader(&self) -> Result<(), Status> {
        if self.is_closed() {
            return Err(Status::unavailable(format!("{} is closed", self.name())));
        }
        if !self.is_leader() {
            return Err(Status::unavailable(format!("{} is not leader", self.name())));
        }
        Ok(())
    }

    fn check_header(
        &self,
        header: Option<&RequestHeader>,
    ) -> ProtoResult<()> {
        let got = header.map(|h| h.cluster_id).unwrap_or_default();
        if got != self.cluster_id() {
            return Err(ProtoError::new(
                ErrorType::ClusterIdMismatch,
                format!("mismatch cluster id, need {} but got {}", self.cluster_id(), got),
            ));
        }
        Ok(())
    }

    fn response_header<T>(
        &self,
        result: &ProtoResult<T>,
    ) -> ResponseHeader {
        match result {
            Ok(_) => ResponseHeader::ok(self.cluster_id()),
            Err(e) => ResponseHeader::error(self.cluster_id(), e.error_type, e.message.clone()),
        }
    }

    /// Applies one heartbeat; only rejections produce a response.
    fn handle_region_heartbeat(
        &self,
        req: RegionHeartbeatRequest,
    ) -> Option<RegionHeartbeatResponse> {
        let region_id = req.region.as_ref().map(|r| r.id).unwrap_or_default();
        let result = self
            .check_header(req.header.as_ref())
            .and_then(|_| self.cluster().region_heartbeat(req.region, req.leader));
        match result {
            Ok(()) => {
                debug!("[{}] region {} heartbeat applied", self.name(), region_id);
                None
            }
            Err(e) => {
                warn!("[{}] region {} heartbeat rejected: {:?}", self.name(), region_id, e);
                Some(RegionHeartbeatResponse {
                    header: Some(ResponseHeader::error(self.cluster_id(), e.error_type, e.message)),
                    region_id,
                })
            }
        }
    }
}

#[tonic::async_trait]
impl Pd for Server {
    type RegionHeartbeatStream =
        Pin<Box<dyn Stream<Item = std::result::Result<RegionHeartbeatResponse, Status>> + Send + 'static>>;

    async fn get_members(
        &self,
        request: Request<GetMembersRequest>,
    ) -> std::result::Result<Response<GetMembersResponse>, Status> {
        let req = request.into_inner();
        let result = self.check_header(req.header.as_ref());
        let mut resp = GetMembersResponse {
            header: Some(self.response_header(&result)),
            ..Default::default()
        };
        if result.is_ok() {
            resp.members = self.members();
            resp.leader = self.leader_member();
        }
        Ok(Response::new(resp))
    }

    async fn is_bootstrapped(
        &self,
        request: Request<IsBootstrappedRequest>,
    ) -> std::result::Result<Response<IsBootstrappedResponse>, Status> {
        self.check_leader()?;
        let req = request.into_inner();
        let result = self.check_header(req.header.as_ref());
        Ok(Response::new(IsBootstrappedResponse {
            header: Some(self.response_header(&result)),
            bootstrapped: result.is_ok() && self.cluster().is_bootstrapped(),
        }))
    }

    async fn bootstrap(
        &self,
        request: Request<BootstrapRequest>,
    ) -> std::result::Result<Response<BootstrapResponse>, Status> {
        self.check_leader()?;
        let req = request.into_inner();
        let result = self
            .check_header(req.header.as_ref())
            .and_then(|_| self.cluster().bootstrap(req.store, req.region));
        if result.is_ok() {
            debug!("[{}] cluster {} bootstrapped", self.name(), self.cluster_id());
        }
        Ok(Response::new(BootstrapResponse {
            header: Some(self.response_header(&result)),
        }))
    }

    async fn alloc_id(
        &self,
        request: Request<AllocIdRequest>,
    ) -> std::result::Result<Response<AllocIdResponse>, Status> {
        self.check_leader()?;
        let req = request.into_inner();
        let result = self
            .check_header(req.header.as_ref())
            .and_then(|_| self.cluster().alloc_id());
        Ok(Response::new(AllocIdResponse {
            header: Some(self.response_header(&result)),
            id: result.unwrap_or_default(),
        }))
    }

    async fn put_store(
        &self,
        request: Request<PutStoreRequest>,
    ) -> std::result::Result<Response<PutStoreResponse>, Status> {
        self.check_leader()?;
        let req = request.into_inner();
        let result = self
            .check_header(req.header.as_ref())
            .and_then(|_| self.cluster().put_store(req.store));
        Ok(Response::new(PutStoreResponse {
            header: Some(self.response_header(&result)),
        }))
    }

    async fn get_store(
        &self,
        request: Request<GetStoreRequest>,
    ) -> std::result::Result<Response<GetStoreResponse>, Status> {
        self.check_leader()?;
        let req = request.into_inner();
        let result = self.check_header(req.header.as_ref()).and_then(|_| {
            self.cluster().get_store(req.store_id).ok_or_else(|| {
                ProtoError::new(ErrorType::Unknown, format!("invalid store ID {}, not found", req.store_id))
            })
        });
        Ok(Response::new(GetStoreResponse {
            header: Some(self.response_header(&result)),
            store: result.ok(),
        }))
    }

    async fn get_region_by_id(
        &self,
        request: Request<GetRegionByIdRequest>,
    ) -> std::result::Result<Response<GetRegionResponse>, Status> {
        self.check_leader()?;
        let req = request.into_inner();
        let result = self
            .check_header(req.header.as_ref())
            .map(|_| self.cluster().get_region(req.region_id));
        let header = self.response_header(&result);
        let info = result.ok().flatten();
        Ok(Response::new(GetRegionResponse {
            header: Some(header),
            region: info.as_ref().map(|i| i.region.clone()),
            leader: info.and_then(|i| i.leader),
        }))
    }

    async fn region_heartbeat(
        &self,
        request: Request<Streaming<RegionHeartbeatRequest>>,
    ) -> std::result::Result<Response<Self::RegionHeartbeatStream>, Status> {
        self.check_leader()?;
        let mut inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(HEARTBEAT_RESPONSE_BUFFER);
        let server = self.clone();

        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = server.shutdown_token().cancelled() => break,
                    next = inbound.message() => next,
                };
                match next {
                    Ok(Some(req)) => {
                        if let Some(resp) = server.handle_region_heartbeat(req) {
                            if tx.send(Ok(resp)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(status) => {
                        debug!("[{}] heartbeat stream error: {}", server.name(), status);
                        break;
                    }
                }
            }
            debug!("[{}] heartbeat stream closed", server.name());
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}

#[tonic::async_trait]
impl Peer for Server {
    async fn ping(
        &self,
        request: Request<PingRequest>,
    ) -> std::result::Result<Response<PingResponse>, Status> {
        if self.is_closed() {
            return Err(Status::unavailable(format!("{} is closed", self.name())));
        }
        let req = request.into_inner();
        if req.cluster_id != self.cluster_id() {
            return Err(Status::failed_precondition(format!(
                "{} belongs to cluster {}, ping from {} for cluster {}",
                self.name(),
                self.cluster_id(),
                req.from,
                req.cluster_id
            )));
        }
        Ok(Response::new(PingResponse {
            name: self.name().to_string(),
            is_leader: self.is_leader(),
        }))
    }
}
