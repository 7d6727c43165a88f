//! Request interception engine: rules decide which outgoing calls get a
//! synthetic response instead of reaching the network.

pub mod app;
pub mod config;
pub mod error;
pub mod intercept;
pub mod metrics;
pub mod obs;
pub mod rules;
pub mod source;
pub mod telemetry;
pub mod transport;

pub use app::App;
pub use config::AppConfig;
pub use error::{FetchError, MatchError, SourceError, SynthesisError, TransportError};
pub use intercept::{
    Decision, FetchInterceptor, InterceptEngine, InterceptedXhr, RequestDescriptor,
    SyntheticResponse, Synthesizer,
};
pub use rules::{Rule, RuleSet};
