//! JSON api served over HTTP/1.1 on an instance's client socket.
//!
//! [`ApiHandler`] is registered on the same tonic router as `pdpb.PD` and
//! receives every request under `/pd/`; it hands them to an axum [`Router`]
//! nested at [`API_PREFIX`]. Routes (GET only):
//!
//! | path                        | body                 |
//! |-----------------------------|----------------------|
//! | `/pd/api/v1/cluster`        | [`Cluster`]          |
//! | `/pd/api/v1/members`        | [`MembersInfo`]      |
//! | `/pd/api/v1/leader`         | [`Member`]           |
//! | `/pd/api/v1/stores`         | [`StoresInfo`]       |
//! | `/pd/api/v1/store/{id}`     | [`Store`]            |
//! | `/pd/api/v1/regions`        | [`RegionsInfo`]      |
//! | `/pd/api/v1/region/{id}`    | [`RegionInfo`]       |


use std::convert::Infallible;
use std::task::Context;
use std::task::Poll;

use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::Uri;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::Json;
use axum::Router;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde::Serialize;
use tonic::body::BoxBody;
use tonic::server::NamedService;
use tower::Service;
use tower::ServiceExt;
use tracing::debug;

use crate::proto::metapb::Cluster;
use crate::proto::metapb::Store;
use crate::proto::pdpb::Member;
use crate::RegionInfo;
use crate::Server;
use crate::API_PREFIX;

const DEFAULT_MAX_PEER_COUNT: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembersInfo {
    pub members: Vec<Member>,
    pub leader: Option<Member>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoresInfo {
    pub count: usize,
    pub stores: Vec<Store>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionsInfo {
    pub count: usize,
    pub regions: Vec<RegionInfo>,
}

/// Body of every non-2xx answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Builds the JSON api of one instance.
pub(crate) fn router(server: Server) -> Router {
    let v1 = Router::new()
        .route("/cluster", get(cluster))
        .route("/members", get(members))
        .route("/leader", get(leader))
        .route("/stores", get(stores))
        .route("/store/:id", get(store))
        .route("/regions", get(regions))
        .route("/region/:id", get(region));

    Router::new()
        .nest(API_PREFIX, v1)
        .fallback(no_route)
        .with_state(server)
}

async fn cluster(State(server): State<Server>) -> Json<Cluster> {
    Json(Cluster {
        id: server.cluster_id(),
        max_peer_count: DEFAULT_MAX_PEER_COUNT,
    })
}

async fn members(State(server): State<Server>) -> Json<MembersInfo> {
    Json(MembersInfo {
        members: server.members(),
        leader: server.leader_member(),
    })
}

async fn leader(State(server): State<Server>) -> ApiResult<Json<Member>> {
    server
        .leader_member()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("{} is not leader", server.name())))
}

async fn stores(State(server): State<Server>) -> Json<StoresInfo> {
    let stores = server.stores();
    Json(StoresInfo {
        count: stores.len(),
        stores,
    })
}

async fn store(
    State(server): State<Server>,
    Path(id): Path<String>,
) -> ApiResult<Json<Store>> {
    let id = parse_id("store", &id)?;
    server
        .get_store(id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("store {id} not found")))
}

async fn regions(State(server): State<Server>) -> Json<RegionsInfo> {
    let regions = server.regions();
    Json(RegionsInfo {
        count: regions.len(),
        regions,
    })
}

async fn region(
    State(server): State<Server>,
    Path(id): Path<String>,
) -> ApiResult<Json<RegionInfo>> {
    let id = parse_id("region", &id)?;
    server
        .get_region(id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("region {id} not found")))
}

async fn no_route(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("no route for {}", uri.path()))
}

fn parse_id(
    kind: &str,
    raw: &str,
) -> ApiResult<u64> {
    raw.parse::<u64>()
        .map_err(|_| ApiError::BadRequest(format!("invalid {kind} id {raw}")))
}

/// Tonic-mountable handler for the JSON api of one instance
#[derive(Clone)]
pub struct ApiHandler {
    router: Router,
}

impl ApiHandler {
    pub fn new(server: Server) -> Self {
        Self {
            router: router(server),
        }
    }
}

impl NamedService for ApiHandler {
    // Routes every `/pd/*` request here.
    const NAME: &'static str = "pd";
}

impl Service<http::Request<BoxBody>> for ApiHandler {
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(
        &mut self,
        req: http::Request<BoxBody>,
    ) -> Self::Future {
        let router = self.router.clone();
        Box::pin(async move {
            let method = req.method().clone();
            let path = req.uri().path().to_string();
            let resp = match router.oneshot(req).await {
                Ok(resp) => resp,
                Err(never) => match never {},
            };
            debug!(%method, %path, status = %resp.status(), "api request");
            Ok(resp.map(tonic::body::boxed))
        })
    }
}
