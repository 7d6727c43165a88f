use std::sync::Arc;

use anyhow::{bail, Result};

use crate::config::AppConfig;
use crate::intercept::{
    FetchInterceptor, InterceptEngine, InterceptedXhr, SynthesisFailurePolicy, Synthesizer,
    XhrTransport,
};
use crate::obs::ObsSink;
use crate::source::{FileRuleSource, HttpRuleSource, RuleRefresher, RuleSource};
use crate::transport::HyperTransport;

/// Everything wired from one [`AppConfig`]: engine, rule source, and the
/// pieces adapters are built from.
#[derive(Clone)]
pub struct App {
    pub engine: InterceptEngine,
    pub source: Arc<dyn RuleSource>,
    pub synthesizer: Synthesizer,
    pub transport: HyperTransport,
    pub policy: SynthesisFailurePolicy,
    refresh_interval: std::time::Duration,
}

impl App {
    /// Starts with no rules; call [`RuleRefresher::refresh`] (or run it) to
    /// load them.
    pub fn from_config(cfg: &AppConfig, obs: Option<ObsSink>) -> Result<Self> {
        cfg.validate()?;

        let transport = HyperTransport::new(cfg.remote_mock_timeout());
        let source: Arc<dyn RuleSource> = match (&cfg.rules.path, &cfg.rules.url) {
            (Some(path), None) => Arc::new(FileRuleSource::new(path.clone())),
            (None, Some(url)) => Arc::new(HttpRuleSource::new(url.clone(), transport.clone())),
            _ => bail!("rules: exactly one of `path` or `url` is required"),
        };

        let mut engine = InterceptEngine::default();
        if let Some(obs) = obs {
            engine = engine.with_obs(obs);
        }
        engine.set_enabled(cfg.enabled);

        let synthesizer =
            Synthesizer::with_fetcher(Arc::new(transport.clone()), cfg.remote_mock_timeout());

        Ok(Self {
            engine,
            source,
            synthesizer,
            transport,
            policy: cfg.synthesis_failure,
            refresh_interval: cfg.refresh_interval(),
        })
    }

    pub fn refresher(&self) -> RuleRefresher {
        RuleRefresher::new(self.engine.clone(), self.source.clone(), self.refresh_interval)
    }

    pub fn fetch_interceptor(&self) -> FetchInterceptor<HyperTransport> {
        FetchInterceptor::new(self.engine.clone(), self.transport.clone())
            .with_synthesizer(self.synthesizer.clone())
            .with_policy(self.policy)
    }

    pub fn xhr<T: XhrTransport>(&self, inner: T) -> InterceptedXhr<T> {
        InterceptedXhr::new(inner, self.engine.clone(), self.synthesizer.clone())
    }
}
