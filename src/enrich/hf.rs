// src/enrich/hf.rs
//! Hugging Face inference client. One `call` path owns credential rotation,
//! transient retry and auth fail-fast; task helpers wrap it with the payload
//! and response shape of each model family. The transport is a trait so tests
//! script responses instead of hitting the network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{AppConfig, HfModels};
use crate::retry::Backoff;

pub const HF_MAX_ATTEMPTS: u32 = 4;
pub const ZS_MIN_SCORE: f64 = 0.35;
pub const ZS_MAX_LABELS: usize = 5;
pub const SUMMARY_MAX_LENGTH: u32 = 120;
pub const SUMMARY_MIN_LENGTH: u32 = 40;

const INFERENCE_BASE: &str = "https://api-inference.huggingface.co/models";
const BACKOFF_BASE_MS: u64 = 1000;
const BACKOFF_CAP_MS: u64 = 8000;
const BACKOFF_JITTER_MS: u64 = 200;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, thiserror::Error)]
pub enum HfError {
    /// 401/403: the credential is rejected, rotation will not help.
    #[error("credentials rejected with HTTP {status}")]
    Auth { status: u16 },
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("unexpected response shape: {0}")]
    Shape(String),
}

/// Ordered, process-wide credential pool advanced by an atomic counter.
pub struct TokenPool {
    tokens: Vec<String>,
    counter: AtomicUsize,
}

impl TokenPool {
    pub fn new(tokens: Vec<String>) -> Self {
        Self {
            tokens,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn next(&self) -> Option<&str> {
        if self.tokens.is_empty() {
            return None;
        }
        let idx = self.counter.fetch_add(1, Ordering::Relaxed) % self.tokens.len();
        Some(&self.tokens[idx])
    }
}

/// Network seam: returns status + parsed JSON body, or a transport-level
/// error message (treated as transient).
#[async_trait]
pub trait HfTransport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        token: Option<&str>,
        payload: &Value,
    ) -> Result<(u16, Value), String>;
}

pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .user_agent("intel-aggregator/0.1 (+enrich)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self { http }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HfTransport for ReqwestTransport {
    async fn post(
        &self,
        url: &str,
        token: Option<&str>,
        payload: &Value,
    ) -> Result<(u16, Value), String> {
        let mut req = self.http.post(url).json(payload);
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        let resp = req.send().await.map_err(|e| e.to_string())?;
        let status = resp.status().as_u16();
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, body))
    }
}

pub struct HfClient {
    transport: Arc<dyn HfTransport>,
    pool: TokenPool,
    models: HfModels,
    use_endpoints: bool,
    backoff: Backoff,
}

impl HfClient {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::with_transport(
            Arc::new(ReqwestTransport::new()),
            cfg.hf_tokens.clone(),
            cfg.models.clone(),
            cfg.hf_use_endpoints,
        )
    }

    pub fn with_transport(
        transport: Arc<dyn HfTransport>,
        tokens: Vec<String>,
        models: HfModels,
        use_endpoints: bool,
    ) -> Self {
        Self {
            transport,
            pool: TokenPool::new(tokens),
            models,
            use_endpoints,
            backoff: Backoff::exponential(BACKOFF_BASE_MS, BACKOFF_CAP_MS, BACKOFF_JITTER_MS),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    /// In endpoints mode a model identifier may already be a full URL.
    fn url_for(&self, model: &str) -> String {
        if self.use_endpoints && model.starts_with("http") {
            model.to_string()
        } else {
            format!("{INFERENCE_BASE}/{model}")
        }
    }

    /// One logical inference call: rotate credentials per attempt, back off on
    /// 429/5xx/transport errors, fail fast on 401/403.
    pub async fn call(&self, model: &str, payload: Value) -> Result<Value, HfError> {
        let url = self.url_for(model);
        let mut last_err = String::from("no attempt made");

        for attempt in 0..HF_MAX_ATTEMPTS {
            let token = self.pool.next();
            metrics::counter!("enrich_upstream_calls_total").increment(1);
            match self.transport.post(&url, token, &payload).await {
                Ok((status, body)) => {
                    if (200..300).contains(&status) {
                        return Ok(body);
                    }
                    if status == 401 || status == 403 {
                        return Err(HfError::Auth { status });
                    }
                    if status == 429 || (500..600).contains(&status) {
                        last_err = format!("HTTP {status}");
                        debug!(target: "enrich", model, attempt, status, "transient upstream status");
                    } else {
                        return Err(HfError::Upstream(format!("HTTP {status}")));
                    }
                }
                Err(e) => {
                    last_err = e;
                    debug!(target: "enrich", model, attempt, error = %last_err, "transport error");
                }
            }
            if attempt + 1 < HF_MAX_ATTEMPTS {
                self.backoff.sleep(attempt).await;
            }
        }
        Err(HfError::Upstream(format!(
            "{last_err} after {HF_MAX_ATTEMPTS} attempts"
        )))
    }

    /// Top ISO language code for the text.
    pub async fn detect_language(&self, text: &str) -> Result<String, HfError> {
        let body = self
            .call(&self.models.language, json!({ "inputs": text }))
            .await?;
        top_label(&body)
            .map(|l| l.to_lowercase())
            .ok_or_else(|| HfError::Shape("no language label".into()))
    }

    pub async fn translate(&self, text: &str) -> Result<String, HfError> {
        let body = self
            .call(&self.models.translation, json!({ "inputs": text }))
            .await?;
        body.get(0)
            .and_then(|v| v.get("translation_text"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| HfError::Shape("no translation_text".into()))
    }

    /// Labels scoring at least `ZS_MIN_SCORE`, strongest first, capped at
    /// `ZS_MAX_LABELS`.
    pub async fn zero_shot(&self, text: &str, labels: &[&str]) -> Result<Vec<String>, HfError> {
        let payload = json!({
            "inputs": text,
            "parameters": { "candidate_labels": labels, "multi_label": true },
        });
        let body = self.call(&self.models.zero_shot, payload).await?;
        let names = body
            .get("labels")
            .and_then(Value::as_array)
            .ok_or_else(|| HfError::Shape("no labels".into()))?;
        let scores = body
            .get("scores")
            .and_then(Value::as_array)
            .ok_or_else(|| HfError::Shape("no scores".into()))?;
        Ok(names
            .iter()
            .zip(scores.iter())
            .filter_map(|(l, s)| {
                let score = s.as_f64()?;
                if score < ZS_MIN_SCORE {
                    return None;
                }
                l.as_str().map(str::to_string)
            })
            .take(ZS_MAX_LABELS)
            .collect())
    }

    pub async fn summarize(&self, text: &str) -> Result<String, HfError> {
        let payload = json!({
            "inputs": text,
            "parameters": {
                "max_length": SUMMARY_MAX_LENGTH,
                "min_length": SUMMARY_MIN_LENGTH,
            },
        });
        let body = self.call(&self.models.summary, payload).await?;
        body.get(0)
            .and_then(|v| v.get("summary_text"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| HfError::Shape("no summary_text".into()))
    }

    /// Provider-opaque sentiment payload, stored as-is.
    pub async fn sentiment(&self, text: &str) -> Result<Value, HfError> {
        self.call(&self.models.sentiment, json!({ "inputs": text }))
            .await
    }

    pub async fn ner(&self, text: &str) -> Result<Value, HfError> {
        let payload = json!({
            "inputs": text,
            "parameters": { "aggregation_strategy": "simple" },
        });
        self.call(&self.models.ner, payload).await
    }
}

/// Classification responses arrive either as `[{label, score}, …]` or
/// wrapped once more as `[[{label, score}, …]]`.
fn top_label(body: &Value) -> Option<String> {
    let first = body.get(0)?;
    let entry = if first.is_array() { first.get(0)? } else { first };
    entry.get("label").and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted transport: pops canned responses and records every call.
    pub struct ScriptedTransport {
        responses: Mutex<Vec<Result<(u16, Value), String>>>,
        pub calls: Mutex<Vec<(String, Option<String>)>>,
    }

    impl ScriptedTransport {
        pub fn new(mut responses: Vec<Result<(u16, Value), String>>) -> Self {
            responses.reverse(); // pop from the back in script order
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HfTransport for ScriptedTransport {
        async fn post(
            &self,
            url: &str,
            token: Option<&str>,
            _payload: &Value,
        ) -> Result<(u16, Value), String> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), token.map(str::to_string)));
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err("script exhausted".into()))
        }
    }

    fn client(
        transport: Arc<ScriptedTransport>,
        tokens: Vec<String>,
        use_endpoints: bool,
    ) -> HfClient {
        // zero jitter keeps retry tests fast under paused time
        let mut c = HfClient::with_transport(transport, tokens, HfModels::default(), use_endpoints);
        c.backoff = Backoff::exponential(1, 1, 0);
        c
    }

    #[tokio::test]
    async fn rotation_retries_through_the_pool_in_order() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok((429, Value::Null)),
            Ok((429, Value::Null)),
            Ok((200, json!({"ok": true}))),
        ]));
        let c = client(
            Arc::clone(&transport),
            vec!["tok-a".into(), "tok-b".into()],
            false,
        );

        let out = c.call("some/model", json!({"inputs": "x"})).await.unwrap();
        assert_eq!(out, json!({"ok": true}));

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        let tokens: Vec<_> = calls.iter().map(|(_, t)| t.clone().unwrap()).collect();
        assert_eq!(tokens, vec!["tok-a", "tok-b", "tok-a"]);
    }

    #[tokio::test]
    async fn auth_errors_fail_fast_without_rotation() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok((401, Value::Null))]));
        let c = client(
            Arc::clone(&transport),
            vec!["tok-a".into(), "tok-b".into()],
            false,
        );
        let err = c.call("some/model", json!({})).await.unwrap_err();
        assert!(matches!(err, HfError::Auth { status: 401 }));
        assert_eq!(transport.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transient_failures_exhaust_attempts() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok((503, Value::Null)),
            Err("connection reset".into()),
            Ok((500, Value::Null)),
            Ok((429, Value::Null)),
        ]));
        let c = client(Arc::clone(&transport), vec!["tok".into()], false);
        let err = c.call("some/model", json!({})).await.unwrap_err();
        assert!(matches!(err, HfError::Upstream(_)));
        assert_eq!(
            transport.calls.lock().unwrap().len(),
            HF_MAX_ATTEMPTS as usize
        );
    }

    #[tokio::test]
    async fn non_transient_status_does_not_retry() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok((400, Value::Null))]));
        let c = client(Arc::clone(&transport), vec!["tok".into()], false);
        assert!(c.call("some/model", json!({})).await.is_err());
        assert_eq!(transport.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn endpoints_mode_accepts_full_urls() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok((200, json!([])))]));
        let c = client(Arc::clone(&transport), vec![], true);
        c.call("https://my-endpoint.test/invoke", json!({}))
            .await
            .unwrap();
        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls[0].0, "https://my-endpoint.test/invoke");
        assert_eq!(calls[0].1, None); // empty pool → anonymous call
    }

    #[tokio::test]
    async fn hub_model_ids_resolve_to_inference_api() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok((200, json!([])))]));
        let c = client(Arc::clone(&transport), vec![], false);
        c.call("org/model", json!({})).await.unwrap();
        assert_eq!(
            transport.calls.lock().unwrap()[0].0,
            format!("{INFERENCE_BASE}/org/model")
        );
    }

    #[tokio::test]
    async fn zero_shot_filters_and_caps_labels() {
        let body = json!({
            "labels": ["Cyber/Security", "Energy", "Maritime", "Diplomacy", "Terrorism", "Aviation", "Space/EO"],
            "scores": [0.9, 0.8, 0.7, 0.6, 0.5, 0.4, 0.2],
        });
        let transport = Arc::new(ScriptedTransport::new(vec![Ok((200, body))]));
        let c = client(transport, vec!["tok".into()], false);
        let labels = c.zero_shot("text", &["unused"]).await.unwrap();
        assert_eq!(
            labels,
            vec!["Cyber/Security", "Energy", "Maritime", "Diplomacy", "Terrorism"]
        );
    }

    #[tokio::test]
    async fn language_label_parses_both_shapes() {
        let nested = json!([[{"label": "FR", "score": 0.99}, {"label": "en", "score": 0.01}]]);
        let transport = Arc::new(ScriptedTransport::new(vec![Ok((200, nested))]));
        let c = client(transport, vec!["tok".into()], false);
        assert_eq!(c.detect_language("bonjour").await.unwrap(), "fr");

        let flat = json!([{"label": "en", "score": 0.97}]);
        let transport = Arc::new(ScriptedTransport::new(vec![Ok((200, flat))]));
        let c = client(transport, vec!["tok".into()], false);
        assert_eq!(c.detect_language("hello").await.unwrap(), "en");
    }

    #[tokio::test]
    async fn token_pool_wraps_around() {
        let pool = TokenPool::new(vec!["a".into(), "b".into(), "c".into()]);
        let seq: Vec<_> = (0..5).map(|_| pool.next().unwrap().to_string()).collect();
        assert_eq!(seq, vec!["a", "b", "c", "a", "b"]);
        assert!(TokenPool::new(vec![]).next().is_none());
    }
}
