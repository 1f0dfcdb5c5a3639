//! Google Gemini GenerateContent client.

use anyhow::Context;
use lingqian_types::LuckLevel;
use serde::Deserialize;
use serde_json::{Value, json};
use std::future::Future;

use crate::{
    GEMINI_API_BASE_URL, GenerationClient, GenerationRequest, http_client, read_capped_error_body,
};

/// Model used when the configuration names none.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Client for the non-streaming `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

// Manual Debug impl to prevent leaking API keys in logs.
impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_client(http_client().clone(), GEMINI_API_BASE_URL, api_key, model)
    }

    /// Build against an explicit client and base URL. Tests use this to point
    /// at a local mock server over plain HTTP.
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

/// Response schema descriptor constraining `generateContent` output to the
/// fortune record shape. Field casing follows the Gemini `Schema` type
/// (uppercase type names, camelCase keys).
#[must_use]
pub fn fortune_response_schema() -> Value {
    let levels: Vec<&str> = LuckLevel::ALL.iter().map(|level| level.as_str()).collect();
    json!({
        "type": "OBJECT",
        "properties": {
            "level": {
                "type": "STRING",
                "enum": levels,
                "description": "The luck level.",
            },
            "title": {
                "type": "STRING",
                "description": "A 4-character philosophical title, e.g. '静水流深', '否极泰来'.",
            },
            "poem": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "minItems": 2,
                "maxItems": 2,
                "description": "A traditional Chinese poem consisting of EXACTLY 2 lines.",
            },
            "interpretation": {
                "type": "STRING",
                "description": "A concise, colloquial (大白话) explanation.",
            },
            "advice": {
                "type": "OBJECT",
                "properties": {
                    "career": { "type": "STRING" },
                    "love": { "type": "STRING" },
                    "health": { "type": "STRING" },
                    "wealth": { "type": "STRING" },
                },
                "required": ["career", "love", "health", "wealth"],
            },
        },
        "required": ["level", "title", "poem", "interpretation", "advice"],
    })
}

/// Build the request body. Gemini's `generationConfig` keys are camelCase.
fn build_request_body(request: &GenerationRequest) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": request.prompt }]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": request.response_schema,
            "temperature": request.temperature,
        }
    })
}

// Typed response payload: only the fields this client reads.

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    parts: Option<Vec<Part>>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

fn extract_text(response: GenerateContentResponse) -> anyhow::Result<String> {
    let text: String = response
        .candidates
        .into_iter()
        .flatten()
        .filter_map(|candidate| candidate.content)
        .filter_map(|content| content.parts)
        .flatten()
        .filter_map(|part| part.text)
        .collect();

    if text.trim().is_empty() {
        anyhow::bail!("empty response from generation service");
    }
    Ok(text)
}

impl GenerationClient for GeminiClient {
    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl Future<Output = anyhow::Result<String>> + Send {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = build_request_body(request);

        async move {
            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
                .context("generation request failed")?;

            if !response.status().is_success() {
                let status = response.status();
                let error_text = read_capped_error_body(response).await;
                anyhow::bail!("generation API error {status}: {error_text}");
            }

            let payload: GenerateContentResponse = response
                .json()
                .await
                .context("invalid generation response body")?;
            extract_text(payload)
        }
    }
}


#[cfg(test)]
mod integration_tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_request() -> GenerationRequest {
        GenerationRequest {
            prompt: "generate".to_string(),
            response_schema: fortune_response_schema(),
            temperature: 1.0,
        }
    }

    fn test_client(server: &MockServer) -> GeminiClient {
        GeminiClient::with_client(
            reqwest::Client::new(),
            server.uri(),
            "test-key",
            DEFAULT_MODEL,
        )
    }

    #[tokio::test]
    async fn returns_text_from_successful_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("/models/{DEFAULT_MODEL}:generateContent")))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "{\"ok\":true}" }] }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let text = client.generate(&test_request()).await.unwrap();

        assert_eq!(text, "{\"ok\":true}");
    }

    #[tokio::test]
    async fn surfaces_api_error_with_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.generate(&test_request()).await.unwrap_err();

        let message = format!("{err:#}");
        assert!(message.contains("500"), "unexpected error: {message}");
        assert!(message.contains("boom"), "unexpected error: {message}");
    }

    #[tokio::test]
    async fn rejects_response_without_candidates() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        assert!(client.generate(&test_request()).await.is_err());
    }
}
