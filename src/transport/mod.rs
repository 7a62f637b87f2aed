//! Transport adapter for filesystem-path addressed endpoints.
//!
//! Every address handed out by an instance looks like `unix:///path/to.sock`
//! (or `unixs://`). This module strips the scheme marker and dials the socket
//! file with a [`UnixStream`], either as the connector of a tonic
//! [`Channel`] or underneath the small HTTP/1.1 client in [`UnixHttpClient`].
//!
//! Failures are surfaced to the caller as-is; nothing here retries.

mod http_client;
pub use http_client::*;


use std::path::PathBuf;

use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tonic::transport::Channel;
use tonic::transport::Endpoint;
use tonic::transport::Uri;
use tower::service_fn;
use tracing::debug;

use crate::NetworkError;
use crate::Result;
use crate::UNIX_CHANNEL_ENDPOINT;
use crate::UNIX_SCHEME;
use crate::UNIX_SECURE_SCHEME;

/// Strips either local socket scheme marker from `addr`.
pub fn strip_unix_scheme(addr: &str) -> Option<&str> {
    addr.strip_prefix(UNIX_SCHEME)
        .or_else(|| addr.strip_prefix(UNIX_SECURE_SCHEME))
        .filter(|path| !path.is_empty())
}

/// Resolves a socket url into the path of its socket file.
pub fn socket_path(addr: &str) -> std::result::Result<PathBuf, NetworkError> {
    strip_unix_scheme(addr)
        .map(PathBuf::from)
        .ok_or_else(|| NetworkError::InvalidAddress(addr.to_string()))
}

/// Opens a raw stream to the socket behind `addr`.
pub async fn connect_unix(addr: &str) -> Result<UnixStream> {
    let path = socket_path(addr)?;
    UnixStream::connect(&path)
        .await
        .map_err(|source| NetworkError::Socket { path, source }.into())
}

/// Builds a plaintext gRPC channel whose dialer is the unix socket behind
/// `addr`. The connection is established eagerly so that a missing or
/// refusing socket fails here.
pub async fn unix_channel(addr: &str) -> Result<Channel> {
    let path = socket_path(addr)?;
    debug!(?path, "dialing unix socket channel");

    Endpoint::from_static(UNIX_CHANNEL_ENDPOINT)
        .connect_with_connector(service_fn(move |_: Uri| {
            let path = path.clone();
            async move { Ok::<_, std::io::Error>(TokioIo::new(UnixStream::connect(path).await?)) }
        }))
        .await
        .map_err(|e| {
            NetworkError::Connect {
                addr: addr.to_string(),
                source: Box::new(e),
            }
            .into()
        })
}
