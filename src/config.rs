// src/config.rs
//! Process configuration read once at startup. Everything is environment-driven;
//! missing values fall back to safe defaults so the service always boots.

use std::env;

pub const ENV_API_SECRET: &str = "API_SECRET";
pub const ENV_HF_TOKENS_JSON: &str = "HF_TOKENS_JSON";
pub const ENV_HF_USE_ENDPOINTS: &str = "HF_USE_ENDPOINTS";
pub const ENV_MAX_HF_ENRICH: &str = "MAX_HF_ENRICH";
pub const ENV_ENRICH_TTL_SECS: &str = "ENRICH_TTL_SECS";
pub const ENV_BIND_ADDR: &str = "BIND_ADDR";
pub const ENV_FEEDS_PATH: &str = "FEEDS_PATH";

pub const DEFAULT_MAX_ENRICH: usize = 25;
pub const DEFAULT_ENRICH_TTL_SECS: u64 = 3600;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Model identifiers used by the enrichment tasks. With `HF_USE_ENDPOINTS=true`
/// these may be full endpoint URLs instead of hub model ids.
#[derive(Debug, Clone)]
pub struct HfModels {
    pub language: String,
    pub translation: String,
    pub zero_shot: String,
    pub summary: String,
    pub sentiment: String,
    pub ner: String,
}

impl Default for HfModels {
    fn default() -> Self {
        Self {
            language: "papluca/xlm-roberta-base-language-detection".into(),
            translation: "Helsinki-NLP/opus-mt-mul-en".into(),
            zero_shot: "facebook/bart-large-mnli".into(),
            summary: "facebook/bart-large-cnn".into(),
            sentiment: "cardiffnlp/twitter-xlm-roberta-base-sentiment".into(),
            ner: "Davlan/bert-base-multilingual-cased-ner-hrl".into(),
        }
    }
}

impl HfModels {
    fn from_env() -> Self {
        let mut m = Self::default();
        let over = |name: &str, slot: &mut String| {
            if let Ok(v) = env::var(name) {
                let v = v.trim().to_string();
                if !v.is_empty() {
                    *slot = v;
                }
            }
        };
        over("HF_MODEL_LANGUAGE", &mut m.language);
        over("HF_MODEL_TRANSLATION", &mut m.translation);
        over("HF_MODEL_ZERO_SHOT", &mut m.zero_shot);
        over("HF_MODEL_SUMMARY", &mut m.summary);
        over("HF_MODEL_SENTIMENT", &mut m.sentiment);
        over("HF_MODEL_NER", &mut m.ner);
        m
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HMAC signing key for the signed API routes. Absent → responses unsigned.
    pub api_secret: Option<String>,
    /// Ordered enrichment credential pool.
    pub hf_tokens: Vec<String>,
    /// When true, model identifiers are treated as full endpoint URLs.
    pub hf_use_endpoints: bool,
    pub max_enrich: usize,
    pub enrich_ttl_secs: u64,
    pub bind_addr: String,
    pub models: HfModels,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_secret: None,
            hf_tokens: Vec::new(),
            hf_use_endpoints: false,
            max_enrich: DEFAULT_MAX_ENRICH,
            enrich_ttl_secs: DEFAULT_ENRICH_TTL_SECS,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            models: HfModels::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let api_secret = env::var(ENV_API_SECRET)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let hf_use_endpoints = env::var(ENV_HF_USE_ENDPOINTS)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let max_enrich = env::var(ENV_MAX_HF_ENRICH)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_ENRICH);

        let enrich_ttl_secs = env::var(ENV_ENRICH_TTL_SECS)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_ENRICH_TTL_SECS);

        let bind_addr =
            env::var(ENV_BIND_ADDR).unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

        Self {
            api_secret,
            hf_tokens: load_hf_tokens(),
            hf_use_endpoints,
            max_enrich,
            enrich_ttl_secs,
            bind_addr,
            models: HfModels::from_env(),
        }
    }
}

/// Credential pool loading: `HF_TOKENS_JSON` (JSON array, ordered) wins;
/// otherwise numbered scalars `HF_TOKEN_A`, `HF_TOKEN_B`, … are collected
/// until the first missing letter.
pub fn load_hf_tokens() -> Vec<String> {
    if let Ok(raw) = env::var(ENV_HF_TOKENS_JSON) {
        if let Ok(list) = serde_json::from_str::<Vec<String>>(&raw) {
            let cleaned: Vec<String> = list
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            if !cleaned.is_empty() {
                return cleaned;
            }
        }
    }

    let mut out = Vec::new();
    for letter in 'A'..='Z' {
        match env::var(format!("HF_TOKEN_{letter}")) {
            Ok(v) if !v.trim().is_empty() => out.push(v.trim().to_string()),
            _ => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[serial_test::serial]
    #[test]
    fn tokens_json_takes_precedence() {
        env::set_var(ENV_HF_TOKENS_JSON, r#"["t1"," t2 ",""]"#);
        env::set_var("HF_TOKEN_A", "scalar");
        let tokens = load_hf_tokens();
        assert_eq!(tokens, vec!["t1".to_string(), "t2".to_string()]);
        env::remove_var(ENV_HF_TOKENS_JSON);
        env::remove_var("HF_TOKEN_A");
    }

    #[serial_test::serial]
    #[test]
    fn numbered_scalars_stop_at_gap() {
        env::remove_var(ENV_HF_TOKENS_JSON);
        env::set_var("HF_TOKEN_A", "a");
        env::set_var("HF_TOKEN_B", "b");
        env::remove_var("HF_TOKEN_C");
        env::set_var("HF_TOKEN_D", "unreachable");
        let tokens = load_hf_tokens();
        assert_eq!(tokens, vec!["a".to_string(), "b".to_string()]);
        for l in ["A", "B", "D"] {
            env::remove_var(format!("HF_TOKEN_{l}"));
        }
    }

    #[serial_test::serial]
    #[test]
    fn defaults_when_env_is_empty() {
        for name in [
            ENV_API_SECRET,
            ENV_HF_TOKENS_JSON,
            ENV_HF_USE_ENDPOINTS,
            ENV_MAX_HF_ENRICH,
            ENV_ENRICH_TTL_SECS,
        ] {
            env::remove_var(name);
        }
        env::remove_var("HF_TOKEN_A");
        let cfg = AppConfig::from_env();
        assert!(cfg.api_secret.is_none());
        assert!(cfg.hf_tokens.is_empty());
        assert!(!cfg.hf_use_endpoints);
        assert_eq!(cfg.max_enrich, DEFAULT_MAX_ENRICH);
        assert_eq!(cfg.enrich_ttl_secs, DEFAULT_ENRICH_TTL_SECS);
    }
}
