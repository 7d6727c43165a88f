use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::error::TransportError;
use crate::intercept::{FetchTransport, MockContentFetcher};

/// Plain http/1 client used for real calls, rule service pulls and remote
/// mock content.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
}

impl HyperTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self { client, timeout }
    }

    pub async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        let (parts, body) = request.into_parts();
        let request = Request::from_parts(parts, Full::new(body));

        let call = async {
            let resp = self
                .client
                .request(request)
                .await
                .map_err(|e| TransportError::Send(e.to_string()))?;
            let (parts, body) = resp.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| TransportError::Body(e.to_string()))?
                .to_bytes();
            Ok::<_, TransportError>(Response::from_parts(parts, body))
        };

        match tokio::time::timeout(self.timeout, call).await {
            Ok(res) => res,
            Err(_) => Err(TransportError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    /// GET `url`; any status is returned, the body read as lossy utf-8.
    pub async fn get_text(&self, url: &str) -> Result<(u16, String), TransportError> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(url)
            .body(Bytes::new())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        let resp = self.send(request).await?;
        let status = resp.status().as_u16();
        Ok((status, String::from_utf8_lossy(resp.body()).into_owned()))
    }
}

#[async_trait]
impl FetchTransport for HyperTransport {
    type Error = TransportError;

    async fn fetch(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        self.send(request).await
    }
}

#[async_trait]
impl MockContentFetcher for HyperTransport {
    async fn fetch_text(&self, url: &str) -> Result<String, TransportError> {
        let (status, text) = self.get_text(url).await?;
        if !(200..300).contains(&status) {
            return Err(TransportError::Status(status));
        }
        Ok(text)
    }
}
