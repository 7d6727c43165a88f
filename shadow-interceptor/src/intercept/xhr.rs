use http::Method;
use thiserror::Error;

use super::decision::{Decision, Outcome};
use super::engine::InterceptEngine;
use super::lifecycle::{
    CallLifecycle, CallState, EventDispatcher, EventSnapshot, InvalidTransition, LifecycleEvent,
    Listener,
};
use super::request::{RequestBody, RequestDescriptor};
use super::synthesizer::{SyntheticResponse, Synthesizer};

const ADAPTER: &str = "xhr";
const MOCK_FAILURE_MESSAGE: &str = "Failed to load mock data";

/// Host request object with `open`/`send` semantics.
///
/// Only used for calls no rule matched, and for `open`, which is always
/// forwarded so the host object is ready if the call ends up delegated.
pub trait XhrTransport: Send {
    fn open(
        &mut self,
        method: &str,
        url: &str,
        is_async: bool,
        user: Option<&str>,
        password: Option<&str>,
    );
    fn send(&mut self, body: Option<RequestBody>);
    fn abort(&mut self) {}

    fn ready_state(&self) -> u16;
    fn status(&self) -> u16;
    fn response_text(&self) -> String;
    fn get_all_response_headers(&self) -> String;
    fn get_response_header(&self, name: &str) -> Option<String>;
}

#[derive(Debug, Error)]
pub enum XhrError {
    #[error(transparent)]
    InvalidState(#[from] InvalidTransition),

    #[error("invalid method {0:?}")]
    InvalidMethod(String),
}

/// Event-driven adapter: wraps a host request object and answers matched
/// calls with a synthetic response without touching the host transport.
pub struct InterceptedXhr<T: XhrTransport> {
    inner: T,
    engine: InterceptEngine,
    synthesizer: Synthesizer,
    lifecycle: CallLifecycle,
    events: EventDispatcher,
    method: Method,
    url: String,
    response: Option<SyntheticResponse>,
}

impl<T: XhrTransport> InterceptedXhr<T> {
    pub fn new(inner: T, engine: InterceptEngine, synthesizer: Synthesizer) -> Self {
        Self {
            inner,
            engine,
            synthesizer,
            lifecycle: CallLifecycle::new(),
            events: EventDispatcher::new(),
            method: Method::GET,
            url: String::new(),
            response: None,
        }
    }

    pub fn open(&mut self, method: &str, url: &str) -> Result<(), XhrError> {
        self.open_with(method, url, true, None, None)
    }

    /// Starts a new call, dropping whatever the previous one produced.
    pub fn open_with(
        &mut self,
        method: &str,
        url: &str,
        is_async: bool,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<(), XhrError> {
        let upper = method.trim().to_ascii_uppercase();
        let parsed = Method::from_bytes(upper.as_bytes())
            .map_err(|_| XhrError::InvalidMethod(method.to_string()))?;

        self.lifecycle.advance(CallState::Opened)?;
        self.method = parsed;
        self.url = url.to_string();
        self.response = None;
        self.inner.open(method, url, is_async, user, password);
        Ok(())
    }

    /// Match the captured call. On a match the synthetic response is
    /// delivered and the terminal events fire before this returns; otherwise
    /// the host `send` runs.
    pub async fn send(&mut self, body: Option<RequestBody>) -> Result<(), XhrError> {
        self.lifecycle.advance(CallState::Sent)?;

        let request = RequestDescriptor {
            url: self.url.clone(),
            method: self.method.clone(),
            body: body.clone(),
        };

        let rule = match self.engine.evaluate(&request) {
            Decision::Passthrough => {
                self.lifecycle.advance(CallState::Delegated)?;
                self.engine
                    .record(ADAPTER, &request, Outcome::Passthrough, None, None, None);
                self.inner.send(body);
                return Ok(());
            }
            Decision::Mock { rule } => rule,
        };

        self.lifecycle.advance(CallState::Matched)?;
        self.lifecycle.advance(CallState::Responding)?;

        match self.synthesizer.resolve(&rule).await {
            Ok(resp) => {
                let status = resp.status.as_u16();
                self.response = Some(resp);
                self.finish(CallState::Done)?;
                self.engine
                    .record(ADAPTER, &request, Outcome::Mock, Some(rule.id.as_str()), Some(status), None);
            }
            Err(e) => {
                self.response = Some(SyntheticResponse::error(MOCK_FAILURE_MESSAGE));
                self.finish(CallState::Failed)?;
                self.engine.record(
                    ADAPTER,
                    &request,
                    Outcome::Error,
                    Some(rule.id.as_str()),
                    Some(500),
                    Some(e.to_string()),
                );
            }
        }
        Ok(())
    }

    /// Forwarded to the host unless a rule already matched; a matched call
    /// always runs to completion.
    pub fn abort(&mut self) {
        match self.lifecycle.state() {
            CallState::Matched | CallState::Responding | CallState::Done | CallState::Failed => {
                tracing::debug!(url = %self.url, "abort ignored on mocked call");
            }
            _ => self.inner.abort(),
        }
    }

    fn finish(&mut self, terminal: CallState) -> Result<(), InvalidTransition> {
        self.lifecycle.advance(terminal)?;
        for event in terminal.entry_events() {
            let snapshot = EventSnapshot {
                event: *event,
                ready_state: self.ready_state(),
                status: self.status(),
                response_text: self.response_text(),
            };
            self.events.dispatch(&snapshot);
        }
        Ok(())
    }

    fn delegated(&self) -> bool {
        self.lifecycle.state() == CallState::Delegated
    }

    pub fn state(&self) -> CallState {
        self.lifecycle.state()
    }

    pub fn ready_state(&self) -> u16 {
        if self.delegated() {
            return self.inner.ready_state();
        }
        self.lifecycle.state().ready_state()
    }

    pub fn status(&self) -> u16 {
        if self.delegated() {
            return self.inner.status();
        }
        self.response.as_ref().map(|r| r.status.as_u16()).unwrap_or(0)
    }

    pub fn response_text(&self) -> String {
        if self.delegated() {
            return self.inner.response_text();
        }
        self.response
            .as_ref()
            .map(|r| r.text().into_owned())
            .unwrap_or_default()
    }

    /// Same content as [`Self::response_text`].
    pub fn response(&self) -> String {
        self.response_text()
    }

    pub fn get_all_response_headers(&self) -> String {
        if self.delegated() {
            return self.inner.get_all_response_headers();
        }
        self.response
            .as_ref()
            .map(SyntheticResponse::header_lines)
            .unwrap_or_default()
    }

    pub fn get_response_header(&self, name: &str) -> Option<String> {
        if self.delegated() {
            return self.inner.get_response_header(name);
        }
        self.response
            .as_ref()
            .and_then(|r| r.header(name))
            .map(str::to_string)
    }

    pub fn on_readystatechange(&mut self, hook: Option<Listener>) {
        self.events.set_hook(LifecycleEvent::ReadyStateChange, hook);
    }

    pub fn on_load(&mut self, hook: Option<Listener>) {
        self.events.set_hook(LifecycleEvent::Load, hook);
    }

    pub fn on_loadend(&mut self, hook: Option<Listener>) {
        self.events.set_hook(LifecycleEvent::LoadEnd, hook);
    }

    pub fn on_error(&mut self, hook: Option<Listener>) {
        self.events.set_hook(LifecycleEvent::Error, hook);
    }

    pub fn add_event_listener(&mut self, event: LifecycleEvent, listener: Listener) {
        self.events.add_listener(event, listener);
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}
