//! HTTP transport seam.
//!
//! The MCP client and the completion driver both speak to the network
//! through [`HttpTransport`], so tests can substitute a scripted transport.
//! A response body is either an incremental byte stream or a complete
//! string, depending on what the transport supports.

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tracing::debug;

/// Errors raised below the HTTP status level.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection could not be established or was dropped
    #[error("Network error: {0}")]
    Network(String),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,

    /// Body could not be read
    #[error("Failed to read response body: {0}")]
    Body(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_body() || e.is_decode() {
            TransportError::Body(e.to_string())
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

/// Incremental response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

/// An outgoing POST request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpRequest {
    /// Create a JSON POST request.
    pub fn json(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: body.into(),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up a header value (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Response body variants.
pub enum ResponseBody {
    /// The transport exposes incremental reads
    Stream(ByteStream),
    /// The transport only returns the complete body
    Full(String),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Stream(_) => f.write_str("ResponseBody::Stream(..)"),
            ResponseBody::Full(body) => f.debug_tuple("ResponseBody::Full").field(body).finish(),
        }
    }
}

/// A received response.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    /// Header map with lowercased names
    pub headers: HashMap<String, String>,
    pub body: ResponseBody,
}

impl HttpResponse {
    /// Build a complete-body response (used by scripted transports).
    pub fn full(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: ResponseBody::Full(body.into()),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Look up a header value (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Read the whole body as text.
    pub async fn text(self) -> Result<String, TransportError> {
        match self.body {
            ResponseBody::Full(body) => Ok(body),
            ResponseBody::Stream(mut stream) => {
                let mut bytes = Vec::new();
                while let Some(chunk) = stream.next().await {
                    bytes.extend_from_slice(&chunk?);
                }
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
        }
    }
}

/// Trait for HTTP transport implementations.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a POST request and return the response head plus body.
    ///
    /// Non-2xx statuses are returned as responses, not errors.
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Default time allowed to establish a connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time allowed between two reads of a response.
pub const READ_TIMEOUT: Duration = Duration::from_secs(120);

fn client_builder(connect: Duration, read: Duration) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(connect)
        .read_timeout(read)
}

/// [`HttpTransport`] backed by `reqwest` with streaming bodies.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with the default connect and idle-read timeouts.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeouts(CONNECT_TIMEOUT, READ_TIMEOUT)
    }

    /// Create a transport with custom timeouts.
    ///
    /// `read` bounds the gap between body chunks, not the whole response,
    /// so long streamed completions are never cut off while data flows.
    pub fn with_timeouts(connect: Duration, read: Duration) -> Result<Self, TransportError> {
        let client = client_builder(connect, read)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        debug!(url = %request.url, bytes = request.body.len(), "POST");

        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.body(request.body).send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(TransportError::from));

        Ok(HttpResponse {
            status,
            headers,
            body: ResponseBody::Stream(Box::pin(stream)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_header_lookup() {
        let request = HttpRequest::json("http://localhost", "{}").with_header("Mcp-Session-Id", "abc");
        assert_eq!(request.header("mcp-session-id"), Some("abc"));
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.header("authorization"), None);
    }

    #[test]
    fn test_response_header_lookup() {
        let response = HttpResponse::full(200, "").with_header("Mcp-Session-Id", "s-1");
        assert_eq!(response.header("MCP-SESSION-ID"), Some("s-1"));
        assert!(response.is_success());
        assert!(!HttpResponse::full(404, "").is_success());
    }

    #[tokio::test]
    async fn test_slow_stream_outlives_read_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n")
                .await
                .unwrap();
            // Total time exceeds the read timeout; each gap stays under it.
            for _ in 0..4 {
                socket.write_all(b"6\r\nchunk \r\n").await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(150)).await;
            }
            socket.write_all(b"0\r\n\r\n").await.unwrap();
        });

        let client = client_builder(Duration::from_secs(5), Duration::from_millis(400))
            .no_proxy()
            .build()
            .unwrap();
        let transport = ReqwestTransport::from_client(client);
        let response = transport
            .post(HttpRequest::json(format!("http://{}/v1/chat/completions", addr), "{}"))
            .await
            .unwrap();
        assert_eq!(response.text().await.unwrap(), "chunk chunk chunk chunk ");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_body_text() {
        let chunks: Vec<Result<Vec<u8>, TransportError>> =
            vec![Ok(b"hello ".to_vec()), Ok(b"world".to_vec())];
        let response = HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: ResponseBody::Stream(Box::pin(futures::stream::iter(chunks))),
        };
        assert_eq!(response.text().await.unwrap(), "hello world");
    }
}
