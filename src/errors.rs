//! Harness Error Hierarchy
//!
//! Errors are grouped by the layer that produced them: configuration,
//! transport, the reference server and the harness drivers. Harness errors
//! keep transport failures (the call never completed) apart from protocol
//! failures (the server answered with a non-OK error type).

use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;

use crate::proto::pdpb::ErrorType;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Socket, HTTP and gRPC channel failures
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Reference server lifecycle and metadata failures
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Cluster lifecycle and protocol driver failures
    #[error(transparent)]
    Harness(#[from] HarnessError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Address is not a `unix://` or `unixs://` url
    #[error("Invalid unix socket address: {0}")]
    InvalidAddress(String),

    /// gRPC channel could not be established
    #[error("Failed to connect to {addr}")]
    Connect {
        addr: String,
        #[source]
        source: Box<tonic::transport::Error>,
    },

    /// Raw socket failure
    #[error("Socket error on {path}: {source}")]
    Socket {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Request to {addr} timed out after {duration:?}")]
    Timeout { addr: String, duration: Duration },

    #[error(transparent)]
    Http(#[from] hyper::Error),

    #[error(transparent)]
    HttpRequest(#[from] http::Error),

    /// Non 2xx answer from the HTTP surface
    #[error("HTTP {status} from {url}: {body}")]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Server {0} subsystems already started")]
    AlreadyStarted(String),

    #[error("Server {0} subsystems not started")]
    NotStarted(String),

    #[error("Failed to bind {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to persist cluster metadata: {0}")]
    Snapshot(#[from] bincode::Error),

    #[error("Server {0} task failed: {1}")]
    Task(String, String),
}

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// One or more instances failed during subsystem initialization
    #[error("Failed to launch {failed:?}: {reason}")]
    Launch { failed: Vec<String>, reason: String },

    /// No instance reported leadership within the polling budget
    #[error("No leader after {attempts} attempts every {interval:?}")]
    NoLeader { attempts: usize, interval: Duration },

    /// The call failed before a response was produced
    #[error("{call} failed at transport level: {status}")]
    Rpc {
        call: &'static str,
        status: Box<tonic::Status>,
    },

    /// The server answered, but rejected the request
    #[error("{call} rejected with {error_type:?} ({code}): {message}")]
    Protocol {
        call: &'static str,
        error_type: ErrorType,
        code: i32,
        message: String,
    },

    #[error("{0} response carried no header")]
    MissingHeader(&'static str),

    /// The heartbeat stream was closed by the server
    #[error("Region heartbeat session closed")]
    HeartbeatClosed,

    /// A bounded wait on a server-side post condition ran out
    #[error("{what} not observed after {attempts} attempts")]
    NotObserved { what: String, attempts: usize },
}
