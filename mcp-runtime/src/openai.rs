//! LLM ranker backed by the OpenAI chat completions API.

use std::time::Duration;

use dd_core::error::{ErrorPayload, codes};
use dd_core::matching::{build_candidates, parse_match_response, system_prompt, user_prompt};
use dd_core::site::SiteRecord;
use serde::Deserialize;
use serde_json::json;

use crate::config::RuntimeSettings;
use crate::resolve::CandidateRanker;
use crate::util::{http_client, truncate_for_error};

const OPENAI_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum RankerError {
    #[error("Failed to reach OpenAI: {0}")]
    Connection(#[source] reqwest::Error),
    #[error("OpenAI API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("OpenAI response could not be used: {0}")]
    Response(String),
}

impl From<RankerError> for ErrorPayload {
    fn from(err: RankerError) -> Self {
        let message = err.to_string();
        let payload = ErrorPayload::new(codes::MATCHER_ERROR, message)
            .with_docs_hint("Unset OPENAI_API_KEY to fall back to similarity matching.");
        match err {
            RankerError::Api { status, .. } => {
                payload.with_details(json!({ "service": "openai", "status": status }))
            }
            _ => payload,
        }
    }
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Clone)]
pub struct OpenAiRanker {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiRanker {
    pub fn new(api_key: &str, model: &str, base_url: &str) -> Self {
        Self {
            http: http_client(OPENAI_TIMEOUT),
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// `None` when no API key is configured.
    pub fn from_settings(settings: &RuntimeSettings) -> Option<Self> {
        settings
            .openai_key()
            .map(|key| Self::new(key, &settings.openai_model, &settings.openai_api_url))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn chat_json(&self, system: &str, user: &str) -> Result<String, RankerError> {
        let body = json!({
            "model": &self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ],
            "temperature": 0.1,
            "response_format": { "type": "json_object" }
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(RankerError::Connection)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RankerError::Api {
                status,
                body: truncate_for_error(&body),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RankerError::Response(format!("invalid completion body: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RankerError::Response("OpenAI returned no choices".to_string()))
    }

    pub async fn pick_match(
        &self,
        query: &str,
        records: &[SiteRecord],
    ) -> Result<Option<String>, RankerError> {
        if records.is_empty() {
            return Ok(None);
        }
        let candidates = build_candidates(records);
        tracing::info!(
            query,
            candidates = candidates.len(),
            model = %self.model,
            "asking LLM to rank site records"
        );

        let content = self
            .chat_json(system_prompt(), &user_prompt(query, &candidates))
            .await?;
        let decision = parse_match_response(&content)
            .map_err(|e| RankerError::Response(format!("match decision was not JSON: {e}")))?;

        tracing::info!(
            matched_id = decision.matched_id(),
            reasoning = %decision.reasoning,
            "LLM match decision"
        );
        Ok(decision.matched_id().map(str::to_string))
    }
}

impl CandidateRanker for OpenAiRanker {
    async fn pick(&self, query: &str, records: &[SiteRecord]) -> Result<Option<String>, ErrorPayload> {
        Ok(self.pick_match(query, records).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SiteRecord {
        serde_json::from_value(json!({ "id": "IDAUSTIN0001", "title": "Alpha Austin" })).unwrap()
    }

    #[test]
    fn ranker_only_built_with_api_key() {
        assert!(OpenAiRanker::from_settings(&RuntimeSettings::default()).is_none());
        let settings = RuntimeSettings {
            openai_api_key: Some("sk-test".to_string()),
            ..RuntimeSettings::default()
        };
        let ranker = OpenAiRanker::from_settings(&settings).unwrap();
        assert_eq!(ranker.model(), "gpt-4o-mini");
    }

    #[tokio::test]
    async fn empty_candidate_set_skips_the_call() {
        let ranker = OpenAiRanker::new("sk-test", "gpt-4o-mini", "http://127.0.0.1:9");
        assert_eq!(ranker.pick_match("austin", &[]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn connection_failure_is_matcher_error() {
        let ranker = OpenAiRanker::new("sk-test", "gpt-4o-mini", "http://127.0.0.1:9/v1/");
        let err = ranker
            .pick_match("austin", &[record()])
            .await
            .expect_err("nothing listens on port 9");
        assert!(matches!(err, RankerError::Connection(_)));
        let payload = ErrorPayload::from(err);
        assert_eq!(payload.error, codes::MATCHER_ERROR);
        assert!(payload.docs_hint.is_some());
    }
}
