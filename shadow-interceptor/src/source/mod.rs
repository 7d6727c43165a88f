//! Where rule lists come from.
//!
//! A source only delivers loosely typed rules; sanitizing and swapping them
//! into the engine is [`refresh::RuleRefresher`]'s job.

pub mod refresh;

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SourceError;
use crate::rules::compiler::split_document;
use crate::transport::HyperTransport;

pub use refresh::RuleRefresher;

#[async_trait]
pub trait RuleSource: Send + Sync {
    /// Current rule list, unsanitized.
    async fn fetch_rules(&self) -> Result<Vec<Value>, SourceError>;

    /// Short human-readable origin, used in logs and errors.
    fn describe(&self) -> String;
}

/// Fixed in-memory list.
#[derive(Debug, Clone, Default)]
pub struct StaticRuleSource {
    rules: Vec<Value>,
}

impl StaticRuleSource {
    pub fn new(rules: Vec<Value>) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl RuleSource for StaticRuleSource {
    async fn fetch_rules(&self) -> Result<Vec<Value>, SourceError> {
        Ok(self.rules.clone())
    }

    fn describe(&self) -> String {
        format!("static({} rules)", self.rules.len())
    }
}

/// yaml or json file holding a list, `{rules: [...]}` or `{data: [...]}`.
#[derive(Debug, Clone)]
pub struct FileRuleSource {
    path: PathBuf,
}

impl FileRuleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RuleSource for FileRuleSource {
    async fn fetch_rules(&self) -> Result<Vec<Value>, SourceError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        parse_rules_text(&text, &self.describe())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Rule service endpoint answering `{status, message, data: [...]}` or a
/// bare list.
#[derive(Clone)]
pub struct HttpRuleSource {
    url: String,
    client: HyperTransport,
}

impl HttpRuleSource {
    pub fn new(url: impl Into<String>, client: HyperTransport) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl RuleSource for HttpRuleSource {
    async fn fetch_rules(&self) -> Result<Vec<Value>, SourceError> {
        let (status, text) =
            self.client
                .get_text(&self.url)
                .await
                .map_err(|source| SourceError::Transport {
                    url: self.url.clone(),
                    source,
                })?;

        if !(200..300).contains(&status) {
            return Err(SourceError::Status {
                url: self.url.clone(),
                status,
            });
        }

        let doc: Value = serde_json::from_str(&text).map_err(|e| SourceError::Parse {
            origin: self.url.clone(),
            reason: e.to_string(),
        })?;

        if doc.get("status").and_then(Value::as_str) == Some("error") {
            let message = doc
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(SourceError::Service {
                url: self.url.clone(),
                message,
            });
        }

        rules_from_document(doc, &self.url)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// json first, then yaml.
pub fn parse_rules_text(text: &str, origin: &str) -> Result<Vec<Value>, SourceError> {
    let doc: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => serde_yaml::from_str(text).map_err(|e| SourceError::Parse {
            origin: origin.to_string(),
            reason: e.to_string(),
        })?,
    };
    rules_from_document(doc, origin)
}

fn rules_from_document(doc: Value, origin: &str) -> Result<Vec<Value>, SourceError> {
    split_document(doc)
        .map(|(_, list)| list)
        .map_err(|e| SourceError::Parse {
            origin: origin.to_string(),
            reason: format!("{e:#}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[tokio::test]
    async fn static_source_returns_its_rules() {
        let src = StaticRuleSource::new(vec![json!({"url": "api"})]);
        assert_eq!(src.fetch_rules().await.unwrap(), vec![json!({"url": "api"})]);
        assert_eq!(src.describe(), "static(1 rules)");
    }

    #[tokio::test]
    async fn file_source_reads_yaml() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            "rules:\n  - id: a\n    url: api/a\n    response: '{{}}'\n  - id: b\n    url: api/b\n    response: '[]'"
        )
        .unwrap();

        let list = FileRuleSource::new(f.path()).fetch_rules().await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["id"], "a");
    }

    #[tokio::test]
    async fn file_source_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileRuleSource::new(dir.path().join("nope.json"))
            .fetch_rules()
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));
    }

    #[test]
    fn envelope_and_bare_list() {
        let env = r#"{"status":"success","message":"ok","data":[{"url":"x"}]}"#;
        assert_eq!(parse_rules_text(env, "t").unwrap().len(), 1);
        assert_eq!(parse_rules_text(r#"[{"url":"x"},{"url":"y"}]"#, "t").unwrap().len(), 2);
    }

    #[test]
    fn garbage_is_parse_error() {
        let err = parse_rules_text(r#"{"data": 3}"#, "t").unwrap_err();
        assert!(matches!(err, SourceError::Parse { ref origin, .. } if origin == "t"));
        assert!(parse_rules_text("- [unclosed", "t").is_err());
    }
}
