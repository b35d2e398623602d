use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use revo_config::LlmConfig;
use revo_core::AppError;
use serde_json::{Value, json};
use tracing::warn;

use crate::model::{GenerationRequest, ModelManager};

const DEFAULT_COOLDOWN: Duration = Duration::from_secs(600);
const MAX_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

/// OpenAI-compatible `/chat/completions` client with model failover.
///
/// On a 429 or quota error the current model is put in cooldown (honouring
/// `Retry-After`) and the request is retried on the next available model.
#[derive(Debug)]
pub struct ApiModelManager {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    rotator: Mutex<ModelRotator>,
}

impl ApiModelManager {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, models: Vec<String>) -> Result<Self> {
        if models.is_empty() {
            bail!("at least one model is required for ApiModelManager");
        }

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
            rotator: Mutex::new(ModelRotator::new(models)),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::new(
            config.base_url.clone(),
            config.api_key.clone(),
            config.model_list(),
        )
    }

    fn lock_rotator(&self) -> Result<std::sync::MutexGuard<'_, ModelRotator>> {
        self.rotator
            .lock()
            .map_err(|_| anyhow!("model rotator poisoned"))
    }

    async fn run_chat_completion(&self, request: &GenerationRequest) -> Result<String> {
        loop {
            let model = self.lock_rotator()?.checkout()?;

            let url = format!("{}/chat/completions", self.base_url);
            let mut http_request = self.client.post(&url).json(&json!({
                "model": model,
                "messages": [
                    {"role": "system", "content": request.system_prompt},
                    {"role": "user", "content": request.prompt}
                ],
                "temperature": request.temperature,
                "max_tokens": request.max_tokens
            }));
            if !self.api_key.is_empty() {
                http_request = http_request.bearer_auth(&self.api_key);
            }
            let response = http_request
                .send()
                .await
                .with_context(|| format!("model request failed for model {model}"))?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .text()
                .await
                .with_context(|| format!("failed to read response body for model {model}"))?;

            if status.is_success() {
                return parse_completion_content(&body);
            }

            if is_rate_or_quota_error(status, &body) {
                let cooldown = parse_retry_after(&headers).unwrap_or(DEFAULT_COOLDOWN);
                let next_model = self.lock_rotator()?.cool_down(&model, cooldown);
                match next_model {
                    Some(new_model) => {
                        warn!(
                            from = %model,
                            to = %new_model,
                            cooldown_secs = cooldown.as_secs(),
                            "model failover after rate/quota limit"
                        );
                        continue;
                    }
                    None => return Err(AppError::ModelsExhausted { last_model: model }.into()),
                }
            }

            return Err(anyhow!(
                "model request failed for model {model}: status {status}, body {body}"
            ));
        }
    }
}

#[async_trait]
impl ModelManager for ApiModelManager {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.run_chat_completion(request).await
    }

    fn describe(&self) -> String {
        match self.lock_rotator() {
            Ok(rotator) => format!("api[{}]", rotator.models().collect::<Vec<_>>().join(",")),
            Err(_) => "api".to_string(),
        }
    }
}

/// Failover order for the configured models.
///
/// Models are handed out round-robin. A model that hit a rate or quota limit
/// cools down and is skipped until its cooldown passes.
#[derive(Debug, Clone)]
pub struct ModelRotator {
    slots: Vec<ModelSlot>,
    cursor: usize,
}

#[derive(Debug, Clone)]
struct ModelSlot {
    model: String,
    cooling_until: Option<Instant>,
}

impl ModelSlot {
    fn usable(&self, now: Instant) -> bool {
        self.cooling_until.is_none_or(|until| until <= now)
    }
}

impl ModelRotator {
    pub fn new(models: Vec<String>) -> Self {
        Self {
            slots: models
                .into_iter()
                .map(|model| ModelSlot {
                    model,
                    cooling_until: None,
                })
                .collect(),
            cursor: 0,
        }
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|slot| slot.model.as_str())
    }

    /// Hand out the next usable model and move the cursor past it.
    /// `ModelsExhausted` when every model is cooling down.
    pub fn checkout(&mut self) -> Result<String, AppError> {
        let index = self.find_usable(Instant::now()).ok_or_else(|| self.exhausted())?;
        self.cursor = index + 1;
        Ok(self.slots[index].model.clone())
    }

    /// Put `model` in cooldown. Returns the model the next checkout will
    /// use, if any is left.
    pub fn cool_down(&mut self, model: &str, cooldown: Duration) -> Option<String> {
        let now = Instant::now();
        let until = now.checked_add(cooldown.min(MAX_COOLDOWN));
        for slot in self.slots.iter_mut().filter(|slot| slot.model == model) {
            slot.cooling_until = until;
        }
        self.find_usable(now).map(|index| self.slots[index].model.clone())
    }

    pub fn usable_count(&self) -> usize {
        let now = Instant::now();
        self.slots.iter().filter(|slot| slot.usable(now)).count()
    }

    fn find_usable(&self, now: Instant) -> Option<usize> {
        let total = self.slots.len();
        (0..total)
            .map(|offset| (self.cursor + offset) % total)
            .find(|&index| self.slots[index].usable(now))
    }

    fn exhausted(&self) -> AppError {
        let last_model = self
            .cursor
            .checked_sub(1)
            .and_then(|index| self.slots.get(index % self.slots.len().max(1)))
            .or_else(|| self.slots.first())
            .map(|slot| slot.model.clone())
            .unwrap_or_default();
        AppError::ModelsExhausted { last_model }
    }
}

fn is_rate_or_quota_error(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }

    let body_lower = body.to_ascii_lowercase();
    body_lower.contains("rate_limit") || body_lower.contains("quota")
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let retry_at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let seconds = (retry_at - Utc::now()).num_seconds().max(0) as u64;
    Some(Duration::from_secs(seconds))
}

fn parse_completion_content(body: &str) -> Result<String> {
    let value: Value =
        serde_json::from_str(body).context("failed to parse completion response JSON")?;
    value
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("missing choices[0].message.content in completion response"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn rotator(models: &[&str]) -> ModelRotator {
        ModelRotator::new(models.iter().map(|m| m.to_string()).collect())
    }

    #[test]
    fn test_checkout_round_robin() {
        let mut rotator = rotator(&["gpt-a", "gpt-b"]);
        assert_eq!(rotator.checkout().unwrap(), "gpt-a");
        assert_eq!(rotator.checkout().unwrap(), "gpt-b");
        assert_eq!(rotator.checkout().unwrap(), "gpt-a");
    }

    #[test]
    fn test_cool_down_names_next_model() {
        let mut rotator = rotator(&["gpt-a", "gpt-b", "gpt-c"]);
        let first = rotator.checkout().unwrap();
        assert_eq!(
            rotator.cool_down(&first, Duration::from_secs(60)).as_deref(),
            Some("gpt-b")
        );
        assert_eq!(rotator.checkout().unwrap(), "gpt-b");
        assert_eq!(rotator.checkout().unwrap(), "gpt-c");
        assert_eq!(rotator.checkout().unwrap(), "gpt-b");
        assert_eq!(rotator.usable_count(), 2);
    }

    #[test]
    fn test_expired_cooldown_is_usable_again() {
        let mut rotator = rotator(&["gpt-a", "gpt-b"]);
        rotator.cool_down("gpt-a", Duration::ZERO);
        assert_eq!(rotator.usable_count(), 2);
        assert_eq!(rotator.checkout().unwrap(), "gpt-a");
    }

    #[test]
    fn test_all_cooling_is_models_exhausted() {
        let mut rotator = rotator(&["gpt-a", "gpt-b"]);
        assert_eq!(rotator.checkout().unwrap(), "gpt-a");
        assert!(rotator.cool_down("gpt-a", Duration::from_secs(60)).is_some());
        assert!(rotator.cool_down("gpt-b", Duration::MAX).is_none());
        match rotator.checkout() {
            Err(AppError::ModelsExhausted { last_model }) => assert_eq!(last_model, "gpt-a"),
            other => panic!("expected ModelsExhausted, got {other:?}"),
        }
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(is_rate_or_quota_error(StatusCode::TOO_MANY_REQUESTS, ""));
        assert!(is_rate_or_quota_error(
            StatusCode::FORBIDDEN,
            r#"{"error":{"code":"insufficient_quota"}}"#
        ));
        assert!(!is_rate_or_quota_error(StatusCode::BAD_REQUEST, "bad prompt"));
    }

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("120"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_retry_after_http_date_in_past() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), Some(Duration::ZERO));
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);
    }

    #[test]
    fn test_parse_completion_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hi"}}]}"#;
        assert_eq!(parse_completion_content(body).unwrap(), "hi");
        assert!(parse_completion_content(r#"{"choices":[]}"#).is_err());
    }

    #[test]
    fn test_new_requires_models() {
        let err = ApiModelManager::new("http://localhost", "", Vec::new()).unwrap_err();
        assert!(err.to_string().contains("at least one model"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let manager =
            ApiModelManager::new("http://127.0.0.1:9", "", vec!["m".to_string()]).unwrap();
        let err = manager
            .generate(&GenerationRequest::new("sys", "hi"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model request failed for model m"));
    }
}
