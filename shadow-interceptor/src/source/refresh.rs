use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;

use super::RuleSource;
use crate::error::SourceError;
use crate::intercept::InterceptEngine;
use crate::metrics;
use crate::rules::RuleSet;

/// Pulls rules from a [`RuleSource`] into an [`InterceptEngine`].
///
/// A failed pull never touches the engine: the previous snapshot (possibly
/// empty, meaning every call passes through) stays in effect.
pub struct RuleRefresher {
    engine: InterceptEngine,
    source: Arc<dyn RuleSource>,
    interval: Duration,
    last_hash: Option<u64>,
}

impl RuleRefresher {
    pub fn new(engine: InterceptEngine, source: Arc<dyn RuleSource>, interval: Duration) -> Self {
        Self {
            engine,
            source,
            interval,
            last_hash: None,
        }
    }

    pub fn engine(&self) -> &InterceptEngine {
        &self.engine
    }

    /// Fetch, sanitize and swap in a new snapshot.
    pub async fn refresh(&mut self) -> Result<Arc<RuleSet>, SourceError> {
        let values = self.fetch().await?;
        self.last_hash = Some(content_hash(&values));
        Ok(self.install(values))
    }

    /// Like [`Self::refresh`] but leaves the engine alone when the content
    /// has not changed. Returns whether a swap happened.
    pub async fn poll(&mut self) -> Result<bool, SourceError> {
        let values = self.fetch().await?;
        let hash = content_hash(&values);
        if self.last_hash == Some(hash) {
            metrics::counters::inc_reload("unchanged");
            return Ok(false);
        }
        self.last_hash = Some(hash);
        self.install(values);
        Ok(true)
    }

    /// Poll on the configured interval until `shutdown` changes or its
    /// sender goes away. The first poll runs immediately.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!(source = %self.source.describe(), "rule refresher shutdown");
                    return;
                }
                _ = ticker.tick() => {
                    // failures are logged and counted in fetch()
                    let _ = self.poll().await;
                }
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<Value>, SourceError> {
        match self.source.fetch_rules().await {
            Ok(v) => Ok(v),
            Err(e) => {
                metrics::counters::inc_reload("error");
                tracing::error!(source = %self.source.describe(), "rules reload failed (keep old): {}", e);
                Err(e)
            }
        }
    }

    fn install(&self, values: Vec<Value>) -> Arc<RuleSet> {
        let rs = RuleSet::from_values(values);
        let kept = rs.len();
        let dropped = rs.dropped.len();
        let snapshot = self.engine.swap_rules(rs);
        metrics::counters::inc_reload("ok");
        tracing::info!(source = %self.source.describe(), kept, dropped, "rules reloaded");
        snapshot
    }
}

fn content_hash(values: &[Value]) -> u64 {
    let mut h = 0xcbf29ce484222325u64;
    for v in values {
        // serde_json maps serialize with sorted keys
        let bytes = serde_json::to_vec(v).unwrap_or_default();
        h = fnv1a_mix(h, &bytes);
        h = fnv1a_mix(h, &[0]);
    }
    h
}

fn fnv1a_mix(mut h: u64, data: &[u8]) -> u64 {
    for &b in data {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intercept::RequestDescriptor;
    use crate::source::StaticRuleSource;
    use async_trait::async_trait;
    use http::Method;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves queued results in order, then repeats the last one.
    struct ScriptedSource {
        script: Mutex<Vec<Result<Vec<Value>, String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Vec<Value>, String>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RuleSource for ScriptedSource {
        async fn fetch_rules(&self) -> Result<Vec<Value>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            let next = if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            };
            next.map_err(|reason| SourceError::Parse {
                origin: "scripted".into(),
                reason,
            })
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    fn rule(id: &str, url: &str) -> Value {
        json!({"id": id, "url": url, "response": "{}"})
    }

    #[tokio::test]
    async fn refresh_swaps_snapshot() {
        let engine = InterceptEngine::default();
        let src = Arc::new(StaticRuleSource::new(vec![rule("a", "api/a")]));
        let mut r = RuleRefresher::new(engine.clone(), src, Duration::from_secs(30));

        let snap = r.refresh().await.unwrap();
        assert_eq!(snap.len(), 1);
        assert!(engine
            .evaluate(&RequestDescriptor::new(Method::GET, "https://x/api/a"))
            .is_mock());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_rules() {
        let engine = InterceptEngine::default();
        let src = ScriptedSource::new(vec![Ok(vec![rule("a", "api/a")]), Err("down".into())]);
        let mut r = RuleRefresher::new(engine.clone(), src, Duration::from_secs(30));

        r.refresh().await.unwrap();
        assert!(r.refresh().await.is_err());
        assert_eq!(engine.rules_snapshot().len(), 1);
    }

    #[tokio::test]
    async fn unavailable_source_means_no_rules() {
        let engine = InterceptEngine::default();
        let src = ScriptedSource::new(vec![Err("down".into())]);
        let mut r = RuleRefresher::new(engine.clone(), src, Duration::from_secs(30));

        assert!(r.poll().await.is_err());
        assert!(!engine
            .evaluate(&RequestDescriptor::new(Method::GET, "https://x/api/a"))
            .is_mock());
    }

    #[tokio::test]
    async fn poll_skips_unchanged_content() {
        let engine = InterceptEngine::default();
        let src = ScriptedSource::new(vec![
            Ok(vec![rule("a", "api/a")]),
            Ok(vec![rule("a", "api/a")]),
            Ok(vec![rule("b", "api/b")]),
        ]);
        let mut r = RuleRefresher::new(engine.clone(), src, Duration::from_secs(30));

        assert!(r.poll().await.unwrap());
        let first = engine.rules_snapshot();
        assert!(!r.poll().await.unwrap());
        assert!(Arc::ptr_eq(&first, &engine.rules_snapshot()));
        assert!(r.poll().await.unwrap());
        assert_eq!(engine.rules_snapshot().rules[0].id, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn run_polls_until_shutdown() {
        let engine = InterceptEngine::default();
        let src = ScriptedSource::new(vec![Ok(vec![rule("a", "api/a")])]);
        let r = RuleRefresher::new(engine.clone(), src.clone(), Duration::from_secs(10));

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(r.run(rx));

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(src.calls.load(Ordering::SeqCst), 3);
        assert_eq!(engine.rules_snapshot().len(), 1);

        tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[test]
    fn hash_is_order_sensitive() {
        let a = vec![rule("a", "x"), rule("b", "y")];
        let b = vec![rule("b", "y"), rule("a", "x")];
        assert_ne!(content_hash(&a), content_hash(&b));
        assert_eq!(content_hash(&a), content_hash(&a.clone()));
    }
}
