//! Call interception: the engine that decides, the synthesizer that answers,
//! and the two adapters that sit in front of the host network primitives.

pub mod decision;
pub mod engine;
pub mod fetch;
pub mod lifecycle;
pub mod request;
pub mod synthesizer;
pub mod xhr;

pub use decision::{Decision, Outcome, SynthesisFailurePolicy};
pub use engine::InterceptEngine;
pub use fetch::{FetchInit, FetchInput, FetchInterceptor, FetchTransport, ResponseExt};
pub use lifecycle::{CallState, EventSnapshot, LifecycleEvent, Listener};
pub use request::{RequestBody, RequestDescriptor};
pub use synthesizer::{synthesize, MockContentFetcher, SyntheticResponse, Synthesizer};
pub use xhr::{InterceptedXhr, XhrError, XhrTransport};
