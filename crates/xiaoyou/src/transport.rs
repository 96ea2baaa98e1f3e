use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{HeaderName, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::Client;
use std::time::Duration;

use crate::errors::{NetworkErrorKind, StreamError, StreamResult};
use crate::request::StreamRequest;

#[cfg(test)]
pub mod mock;

pub type ByteStream = BoxStream<'static, StreamResult<Bytes>>;

/// The response head plus a body that is read lazily
pub struct StreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub www_authenticate: Option<String>,
    pub body: ByteStream,
}

impl StreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Opens streaming responses; one call per attempt.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, request: &StreamRequest) -> StreamResult<StreamResponse>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(connect_timeout: Duration) -> StreamResult<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| StreamError::InvalidRequest(format!("cannot build http client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn open(&self, request: &StreamRequest) -> StreamResult<StreamResponse> {
        let send = self
            .client
            .get(request.url.clone())
            .headers(request.headers.clone())
            .send();

        // the timeout covers waiting for the head; body reads are timed per read
        let response = tokio::time::timeout(request.timeout, send)
            .await
            .map_err(|_| {
                StreamError::network(
                    NetworkErrorKind::TimedOut,
                    format!("no response within {:?}", request.timeout),
                )
            })??;

        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(CONTENT_TYPE);
        let www_authenticate = header(WWW_AUTHENTICATE);

        Ok(StreamResponse {
            status: response.status().as_u16(),
            content_type,
            www_authenticate,
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map_err(StreamError::from))
                .boxed(),
        })
    }
}
