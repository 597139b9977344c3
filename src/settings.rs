// settings.rs — Runtime settings supplied at init, defaulted from config.

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

use crate::config;

/// Runtime settings, supplied by the caller at `init` and defaulted from `config`.
/// The API key is never part of these; it comes from the environment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub knowledge_dir: PathBuf,
    pub top_k: usize,
    pub min_fragment_chars: usize,
    pub embedding_model: String,
    pub completion_model: String,
    pub base_url: String,
    /// SQLite snapshot cache location; `None` keeps snapshots in memory only.
    pub cache_path: Option<PathBuf>,
    pub context_preamble: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            knowledge_dir: PathBuf::from(config::corpus::DEFAULT_KNOWLEDGE_DIR),
            top_k: config::retrieval::DEFAULT_TOP_K,
            min_fragment_chars: config::embedding::MIN_FRAGMENT_CHARS,
            embedding_model: config::embedding::DEFAULT_MODEL.to_string(),
            completion_model: config::completion::DEFAULT_MODEL.to_string(),
            base_url: config::http::DEFAULT_BASE_URL.to_string(),
            cache_path: None,
            context_preamble: config::completion::DEFAULT_CONTEXT_PREAMBLE.to_string(),
        }
    }
}

impl Settings {
    /// Parse request params; `null` or a missing object means all defaults.
    pub fn from_params(params: &Value) -> Result<Self, serde_json::Error> {
        if params.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(params.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_null() {
        let s = Settings::from_params(&Value::Null).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.top_k, 3);
        assert_eq!(s.completion_model, "gpt-4o-mini");
    }

    #[test]
    fn test_partial_params_override() {
        let s = Settings::from_params(&serde_json::json!({
            "knowledgeDir": "/srv/kb",
            "topK": 5,
            "cachePath": "/tmp/kb.db",
            "somethingElse": true
        }))
        .unwrap();
        assert_eq!(s.knowledge_dir, PathBuf::from("/srv/kb"));
        assert_eq!(s.top_k, 5);
        assert_eq!(s.cache_path, Some(PathBuf::from("/tmp/kb.db")));
        assert_eq!(s.embedding_model, config::embedding::DEFAULT_MODEL);
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        assert!(Settings::from_params(&serde_json::json!({ "topK": "three" })).is_err());
    }
}
