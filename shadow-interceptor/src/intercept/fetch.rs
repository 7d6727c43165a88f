use std::borrow::Cow;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, Request, Response};
use serde::de::DeserializeOwned;

use super::decision::{Decision, Outcome, SynthesisFailurePolicy};
use super::engine::InterceptEngine;
use super::request::{RequestBody, RequestDescriptor};
use super::synthesizer::Synthesizer;
use crate::error::{FetchError, SynthesisError};
use crate::rules::Rule;

const ADAPTER: &str = "fetch";

/// The real promise-style network primitive.
#[async_trait]
pub trait FetchTransport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn fetch(&self, request: Request<Bytes>) -> Result<Response<Bytes>, Self::Error>;
}

/// First argument of a fetch call: a URL or a prepared request.
#[derive(Debug)]
pub enum FetchInput {
    Url(String),
    Request(Request<Bytes>),
}

impl From<&str> for FetchInput {
    fn from(s: &str) -> Self {
        FetchInput::Url(s.to_string())
    }
}

impl From<String> for FetchInput {
    fn from(s: String) -> Self {
        FetchInput::Url(s)
    }
}

impl From<Request<Bytes>> for FetchInput {
    fn from(r: Request<Bytes>) -> Self {
        FetchInput::Request(r)
    }
}

/// Optional call options. Set fields override the input request.
#[derive(Debug, Default)]
pub struct FetchInit {
    pub method: Option<Method>,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

impl FetchInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Body helpers on a fetch result, mocked or real.
pub trait ResponseExt {
    fn text(&self) -> Cow<'_, str>;
    fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T>;
}

impl ResponseExt for Response<Bytes> {
    fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.body())
    }

    fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(self.body())
    }
}

/// Promise-style adapter with the same call shape as the transport it wraps.
pub struct FetchInterceptor<T> {
    engine: InterceptEngine,
    transport: T,
    synthesizer: Synthesizer,
    policy: SynthesisFailurePolicy,
}

impl<T: FetchTransport> FetchInterceptor<T> {
    pub fn new(engine: InterceptEngine, transport: T) -> Self {
        Self {
            engine,
            transport,
            synthesizer: Synthesizer::new(),
            policy: SynthesisFailurePolicy::default(),
        }
    }

    pub fn with_synthesizer(mut self, synthesizer: Synthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    pub fn with_policy(mut self, policy: SynthesisFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn fetch(
        &self,
        input: impl Into<FetchInput>,
        init: Option<FetchInit>,
    ) -> Result<Response<Bytes>, FetchError<T::Error>> {
        let input = input.into();
        let init = init.unwrap_or_default();
        let descriptor = describe(&input, &init);

        let rule = match self.engine.evaluate(&descriptor) {
            Decision::Passthrough => {
                self.engine
                    .record(ADAPTER, &descriptor, Outcome::Passthrough, None, None, None);
                return self.forward(input, init).await;
            }
            Decision::Mock { rule } => rule,
        };

        let synthesized = self
            .synthesizer
            .resolve(&rule)
            .await
            .and_then(|r| r.into_http().map_err(SynthesisError::Build));
        self.settle(&descriptor, &rule, synthesized, input, init).await
    }

    /// Deliver a synthesized response, or apply the failure policy.
    async fn settle(
        &self,
        descriptor: &RequestDescriptor,
        rule: &Rule,
        synthesized: Result<Response<Bytes>, SynthesisError>,
        input: FetchInput,
        init: FetchInit,
    ) -> Result<Response<Bytes>, FetchError<T::Error>> {
        match synthesized {
            Ok(resp) => {
                let status = resp.status().as_u16();
                self.engine
                    .record(ADAPTER, descriptor, Outcome::Mock, Some(rule.id.as_str()), Some(status), None);
                Ok(resp)
            }
            Err(e) => match self.policy {
                SynthesisFailurePolicy::Passthrough => {
                    self.engine.record(
                        ADAPTER,
                        descriptor,
                        Outcome::Fallback,
                        Some(rule.id.as_str()),
                        None,
                        Some(e.to_string()),
                    );
                    self.forward(input, init).await
                }
                SynthesisFailurePolicy::Reject => {
                    self.engine.record(
                        ADAPTER,
                        descriptor,
                        Outcome::Rejected,
                        Some(rule.id.as_str()),
                        None,
                        Some(e.to_string()),
                    );
                    Err(FetchError::Rejected(e))
                }
            },
        }
    }

    async fn forward(
        &self,
        input: FetchInput,
        init: FetchInit,
    ) -> Result<Response<Bytes>, FetchError<T::Error>> {
        let request = build_request(input, init)?;
        self.transport
            .fetch(request)
            .await
            .map_err(FetchError::Transport)
    }
}

fn describe(input: &FetchInput, init: &FetchInit) -> RequestDescriptor {
    let (url, method, body) = match input {
        FetchInput::Url(u) => (u.clone(), Method::GET, None),
        FetchInput::Request(r) => {
            let body = (!r.body().is_empty()).then(|| RequestBody::Bytes(r.body().clone()));
            (r.uri().to_string(), r.method().clone(), body)
        }
    };
    RequestDescriptor {
        url,
        method: init.method.clone().unwrap_or(method),
        body: init.body.clone().or(body),
    }
}

fn build_request(input: FetchInput, init: FetchInit) -> Result<Request<Bytes>, http::Error> {
    let mut request = match input {
        FetchInput::Url(url) => Request::builder()
            .method(Method::GET)
            .uri(url)
            .body(Bytes::new())?,
        FetchInput::Request(r) => r,
    };

    if let Some(m) = init.method {
        *request.method_mut() = m;
    }
    if let Some(b) = init.body {
        *request.body_mut() = b.to_bytes();
    }
    let mut last: Option<HeaderName> = None;
    for (name, value) in init.headers {
        // HeaderMap yields the name once per run of values
        let name = match name {
            Some(n) => {
                request.headers_mut().remove(&n);
                last = Some(n.clone());
                n
            }
            None => match &last {
                Some(n) => n.clone(),
                None => continue,
            },
        };
        request.headers_mut().append(name, value);
    }
    Ok(request)
}
