//! Fortune acquisition for Lingqian.
//!
//! # Architecture
//!
//! The crate is organized around a bounded-latency request/fallback protocol:
//!
//! - [`FortuneProvider`] - races a generation call against a fixed timeout
//!   and substitutes a fallback fortune on any failure path
//! - [`GenerationClient`] - injected boundary to the external generation
//!   service, so tests can substitute fakes without touching the network
//! - [`gemini`] - Google Gemini client (GenerateContent API, non-streaming)
//! - [`theme`] - fixed thematic bias table with uniform random selection
//! - [`fallback`] - fixed pool of pre-authored fortunes
//!
//! # Error Handling
//!
//! [`FortuneProvider::request_fortune`] never fails: transport errors,
//! non-2xx responses, malformed payloads, schema violations, and timeouts
//! are all absorbed, logged via `tracing`, and replaced with a draw from the
//! fallback pool. The caller always receives a valid
//! [`FortuneRecord`](lingqian_types::FortuneRecord).

pub mod fallback;
pub mod theme;

/// Google Gemini API implementation.
///
/// Communicates with
/// `https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent`.
/// A fortune is a single small JSON document, so the non-streaming endpoint
/// is used and structured output is delegated to the service via a
/// `responseSchema` descriptor.
pub mod gemini;

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use lingqian_types::{FortuneRecord, Theme};
use serde_json::Value;

/// Canonical Gemini API base URL.
pub const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Ceiling on how long a live generation attempt may run before the
/// provider abandons it. Chosen to leave minimal buffer beyond the
/// shake-and-reveal animation window without a long wait.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_millis(3500);

const CONNECT_TIMEOUT_SECS: u64 = 30;
const TCP_KEEPALIVE_SECS: u64 = 60;
const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// Shared hardened HTTP client: TLS only, no redirects, bounded connect time.
pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        base_client_builder().build().unwrap_or_else(|e| {
            tracing::error!(
                "Failed to build hardened HTTP client: {e}. Attempting minimal hardened fallback."
            );
            reqwest::Client::builder()
                .https_only(true)
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .expect("Minimal hardened HTTP client must build; cannot proceed without TLS")
        })
    })
}

fn base_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .https_only(true)
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
}

/// Read an error response body, capped so a hostile or broken server cannot
/// balloon log output.
pub(crate) async fn read_capped_error_body(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(mut body) => {
            if body.len() > MAX_ERROR_BODY_BYTES {
                let mut end = MAX_ERROR_BODY_BYTES;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
                body.push_str("...(truncated)");
            }
            body
        }
        Err(_) => String::from("<unreadable body>"),
    }
}

// ============================================================================
// Generation boundary
// ============================================================================

/// A single generation request: prompt text plus the structured-output
/// constraints the service is asked to honor.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Response schema descriptor in the service's own schema dialect.
    pub response_schema: Value,
    pub temperature: f64,
}

/// Boundary to the external generation service.
///
/// Injected into [`FortuneProvider`] so the live [`gemini::GeminiClient`]
/// and test fakes are interchangeable. Implementations return the raw
/// response text; parsing and validation stay with the provider.
pub trait GenerationClient: Send + Sync {
    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl Future<Output = anyhow::Result<String>> + Send;
}

// ============================================================================
// Fortune provider
// ============================================================================

/// Why a live generation attempt was abandoned. Logged for observability,
/// never surfaced to the caller.
#[derive(Debug, thiserror::Error)]
enum AcquisitionFailure {
    #[error("generation call failed: {0:#}")]
    Call(anyhow::Error),
    #[error("generation payload failed validation: {0}")]
    InvalidPayload(serde_json::Error),
    #[error("generation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// Issues one generation attempt per ritual, racing it against a fixed
/// timeout, and falls back to the curated pool on any non-success.
///
/// Exactly one attempt per request; total latency never exceeds `timeout`.
#[derive(Debug)]
pub struct FortuneProvider<C> {
    client: C,
    timeout: Duration,
}

impl<C: GenerationClient> FortuneProvider<C> {
    pub fn new(client: C) -> Self {
        Self::with_timeout(client, DEFAULT_GENERATION_TIMEOUT)
    }

    pub fn with_timeout(client: C, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Acquire a fortune. Infallible: every failure path resolves to a
    /// fallback draw, so the result is always a valid record.
    pub async fn request_fortune(&self) -> FortuneRecord {
        let theme = theme::pick_theme();
        tracing::debug!(theme = theme.name, "requesting fortune generation");

        match self.attempt_live(theme).await {
            Ok(record) => {
                tracing::debug!(level = %record.level, "live fortune accepted");
                record
            }
            Err(failure) => {
                tracing::warn!(%failure, "drawing from fallback pool");
                fallback::draw()
            }
        }
    }

    /// One live attempt. `tokio::time::timeout` drops the client future when
    /// the deadline wins the race, which cancels the outstanding call.
    async fn attempt_live(&self, theme: &Theme) -> Result<FortuneRecord, AcquisitionFailure> {
        let request = build_generation_request(theme);
        let text = tokio::time::timeout(self.timeout, self.client.generate(&request))
            .await
            .map_err(|_| AcquisitionFailure::Timeout(self.timeout))?
            .map_err(AcquisitionFailure::Call)?;

        serde_json::from_str(text.trim()).map_err(AcquisitionFailure::InvalidPayload)
    }
}

/// Fixed contextual framing carried by every generation request.
const PROMPT_CONTEXT: &str = "2026 (Year of the Fire Horse)";

fn build_generation_request(theme: &Theme) -> GenerationRequest {
    let allowed: Vec<&str> = theme.levels.iter().map(|level| level.as_str()).collect();
    let prompt = format!(
        "Context: {PROMPT_CONTEXT}.\n\
         Theme: {} ({}).\n\
         Keywords: {}.\n\
         Allowed Levels: {:?}.\n\
         \n\
         Task: Generate a Chinese spiritual fortune (Lingqian).\n\
         1. Poem: 2 lines, classical style.\n\
         2. Interpretation: Simple, colloquial (大白话).\n\
         3. Advice: Specific to Career, Love, Health, Wealth.\n\
         \n\
         Return valid JSON only.",
        theme.name, theme.direction, theme.keywords, allowed,
    );

    GenerationRequest {
        prompt,
        response_schema: gemini::fortune_response_schema(),
        temperature: 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lingqian_types::LuckLevel;

    #[test]
    fn prompt_carries_theme_guidance_and_allowed_levels() {
        let theme = &theme::THEMES[0];
        let request = build_generation_request(theme);

        assert!(request.prompt.contains(PROMPT_CONTEXT));
        assert!(request.prompt.contains(theme.name));
        assert!(request.prompt.contains(theme.direction));
        assert!(request.prompt.contains(theme.keywords));
        for level in theme.levels {
            assert!(request.prompt.contains(level.as_str()));
        }
    }

    #[test]
    fn prompt_restricts_levels_to_theme_subset() {
        // Extreme Caution may only request the two low tiers.
        let caution = theme::THEMES
            .iter()
            .find(|t| t.name == "Extreme Caution")
            .unwrap();
        let request = build_generation_request(caution);

        let allowed_section = request
            .prompt
            .lines()
            .find(|line| line.starts_with("Allowed Levels:"))
            .unwrap()
            .to_string();
        assert!(allowed_section.contains(LuckLevel::GreatMisfortune.as_str()));
        assert!(allowed_section.contains(LuckLevel::Neutral.as_str()));
        assert!(!allowed_section.contains(LuckLevel::GreatBlessing.as_str()));
    }
}

#[cfg(test)]
mod provider_tests {
    use super::*;
    use lingqian_types::LuckLevel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const VALID_PAYLOAD: &str = r#"{
        "level": "上上签",
        "title": "X",
        "poem": ["a", "b"],
        "interpretation": "i",
        "advice": {"career": "c", "love": "l", "health": "h", "wealth": "w"}
    }"#;

    /// Resolves immediately with a canned payload, counting calls.
    struct StaticClient {
        payload: &'static str,
        calls: AtomicUsize,
    }

    impl StaticClient {
        fn new(payload: &'static str) -> Self {
            Self {
                payload,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl GenerationClient for StaticClient {
        fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> impl Future<Output = anyhow::Result<String>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let payload = self.payload.to_string();
            async move { Ok(payload) }
        }
    }

    /// Rejects every call.
    struct FailingClient;

    impl GenerationClient for FailingClient {
        fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> impl Future<Output = anyhow::Result<String>> + Send {
            async move { Err(anyhow::anyhow!("service unavailable")) }
        }
    }

    /// Resolves only after a delay (to exercise the timeout race).
    struct SlowClient {
        delay: Duration,
    }

    impl GenerationClient for SlowClient {
        fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> impl Future<Output = anyhow::Result<String>> + Send {
            let delay = self.delay;
            async move {
                tokio::time::sleep(delay).await;
                Ok(VALID_PAYLOAD.to_string())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn schema_valid_response_is_returned_verbatim() {
        let client = StaticClient::new(VALID_PAYLOAD);
        let provider = FortuneProvider::new(client);

        let record = provider.request_fortune().await;

        assert_eq!(record.level, LuckLevel::GreatBlessing);
        assert_eq!(record.title.as_str(), "X");
        assert_eq!(record.poem.lines(), ["a", "b"]);
        assert_eq!(record.interpretation.as_str(), "i");
        assert_eq!(record.advice.career.as_str(), "c");
        assert_eq!(record.advice.wealth.as_str(), "w");
        assert!(!fallback::pool().contains(&record));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_substitutes_a_fallback_record() {
        let provider = FortuneProvider::new(SlowClient {
            delay: DEFAULT_GENERATION_TIMEOUT + Duration::from_secs(10),
        });

        let record = provider.request_fortune().await;

        assert!(fallback::pool().contains(&record));
    }

    #[tokio::test(start_paused = true)]
    async fn response_slower_than_custom_timeout_falls_back() {
        let provider = FortuneProvider::with_timeout(
            SlowClient {
                delay: Duration::from_millis(50),
            },
            Duration::from_millis(10),
        );

        let record = provider.request_fortune().await;

        assert!(fallback::pool().contains(&record));
    }

    #[tokio::test(start_paused = true)]
    async fn response_faster_than_timeout_is_not_substituted() {
        let provider = FortuneProvider::with_timeout(
            SlowClient {
                delay: Duration::from_millis(10),
            },
            Duration::from_millis(50),
        );

        let record = provider.request_fortune().await;

        assert!(!fallback::pool().contains(&record));
        assert_eq!(record.title.as_str(), "X");
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_call_substitutes_a_fallback_record() {
        let provider = FortuneProvider::new(FailingClient);

        let record = provider.request_fortune().await;

        assert!(fallback::pool().contains(&record));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_payload_substitutes_a_fallback_record() {
        let provider = FortuneProvider::new(StaticClient::new("not json at all"));

        let record = provider.request_fortune().await;

        assert!(fallback::pool().contains(&record));
    }

    #[tokio::test(start_paused = true)]
    async fn schema_invalid_payload_substitutes_a_fallback_record() {
        // Parses as JSON but the poem has three lines.
        let payload = r#"{
            "level": "上上签",
            "title": "X",
            "poem": ["a", "b", "c"],
            "interpretation": "i",
            "advice": {"career": "c", "love": "l", "health": "h", "wealth": "w"}
        }"#;
        let provider = FortuneProvider::new(StaticClient::new(payload));

        let record = provider.request_fortune().await;

        assert!(fallback::pool().contains(&record));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_payload_substitutes_a_fallback_record() {
        let provider = FortuneProvider::new(StaticClient::new(""));

        let record = provider.request_fortune().await;

        assert!(fallback::pool().contains(&record));
    }

    #[tokio::test(start_paused = true)]
    async fn exactly_one_attempt_per_request() {
        let client = StaticClient::new("not json");
        let provider = FortuneProvider::new(client);

        let _ = provider.request_fortune().await;

        assert_eq!(provider.client.calls.load(Ordering::SeqCst), 1);
    }
}
