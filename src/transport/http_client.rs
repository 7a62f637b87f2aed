//! Minimal HTTP/1.1 client over unix sockets for the JSON api.

use std::time::Duration;

use bytes::Bytes;
use http::header;
use http::Method;
use http::Request;
use http_body_util::BodyExt;
use http_body_util::Empty;
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use tracing::debug;
use tracing::warn;

use super::connect_unix;
use crate::HttpClientConfig;
use crate::NetworkError;
use crate::Result;

/// HTTP client whose connections are unix socket streams.
///
/// Each request opens its own connection; the client holds no shared state
/// and is cheap to build per test.
#[derive(Debug, Clone)]
pub struct UnixHttpClient {
    timeout: Duration,
}

/// Status and body of one response
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl Default for UnixHttpClient {
    fn default() -> Self {
        Self::new(&HttpClientConfig::default())
    }
}

impl UnixHttpClient {
    pub fn new(config: &HttpClientConfig) -> Self {
        Self {
            timeout: config.request_timeout(),
        }
    }

    /// Issues `GET path` against the socket behind `addr`.
    pub async fn get(
        &self,
        addr: &str,
        path: &str,
    ) -> Result<HttpResponse> {
        match tokio::time::timeout(self.timeout, self.send(addr, path)).await {
            Ok(r) => r,
            Err(_) => Err(NetworkError::Timeout {
                addr: addr.to_string(),
                duration: self.timeout,
            }
            .into()),
        }
    }

    /// GET + JSON decode. Non 2xx answers become [`NetworkError::HttpStatus`].
    pub async fn get_json<T>(
        &self,
        addr: &str,
        path: &str,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let resp = self.get(addr, path).await?;
        if !(200..300).contains(&resp.status) {
            return Err(NetworkError::HttpStatus {
                url: format!("{addr}{path}"),
                status: resp.status,
                body: String::from_utf8_lossy(&resp.body).into_owned(),
            }
            .into());
        }
        serde_json::from_slice(&resp.body).map_err(|e| NetworkError::from(e).into())
    }

    async fn send(
        &self,
        addr: &str,
        path: &str,
    ) -> Result<HttpResponse> {
        let stream = connect_unix(addr).await?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(NetworkError::from)?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                warn!("unix http connection closed with error: {:?}", e);
            }
        });

        let req = Request::builder()
            .method(Method::GET)
            .uri(path)
            .header(header::HOST, "localhost")
            .body(Empty::<Bytes>::new())
            .map_err(NetworkError::from)?;

        let resp = sender.send_request(req).await.map_err(NetworkError::from)?;
        let status = resp.status().as_u16();
        let body = resp.into_body().collect().await.map_err(NetworkError::from)?.to_bytes();
        debug!(addr, path, status, "http get");

        Ok(HttpResponse { status, body })
    }
}

/// Reads a JSON document from the api served at `addr`.
pub async fn read_json_with_url<T>(
    client: &UnixHttpClient,
    addr: &str,
    path: &str,
) -> Result<T>
where
    T: DeserializeOwned,
{
    client.get_json(addr, path).await
}
