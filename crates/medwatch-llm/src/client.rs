//! Text-analysis client trait and implementations.
//!
//! Detectors depend on [`TextAnalysisClient`] rather than a concrete service,
//! so tests substitute a [`ScriptedClient`] instead of network calls.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::{
    parse_insights_summary, parse_interaction_judgment, parse_side_effect_assessment,
    AnalysisError, AnalysisResult, InsightsInput, InsightsSummary, InteractionJudgment,
    InteractionQuery, SideEffectAssessment, SideEffectInput,
};
use crate::prompts;

/// Structured clinical text analysis.
///
/// Every call is synchronous and bounded by the implementation's timeout;
/// callers map errors to the documented fallback values.
pub trait TextAnalysisClient {
    /// Assess a single side-effect report.
    fn analyze_side_effect(&self, input: &SideEffectInput) -> AnalysisResult<SideEffectAssessment>;

    /// Judge a potential interaction between two drugs.
    fn analyze_drug_interaction(
        &self,
        query: &InteractionQuery,
    ) -> AnalysisResult<InteractionJudgment>;

    /// Summarize aggregated drug statistics into narrative insights.
    fn generate_insights(&self, input: &InsightsInput) -> AnalysisResult<InsightsSummary>;
}

// =========================================================================
// HTTP client (OpenAI-compatible chat completions)
// =========================================================================

/// Configuration for [`HttpTextAnalysisClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL of the OpenAI-compatible API (e.g. "https://api.groq.com/openai/v1")
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Hard timeout for each request
    pub timeout: Duration,
}

impl HttpClientConfig {
    /// Read configuration from the environment. Returns `None` when no API
    /// key is configured, in which case the application runs without
    /// text analysis and relies on fallback judgments.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("TEXT_ANALYSIS_API_KEY").ok()?;
        if api_key.is_empty() {
            return None;
        }

        let base_url = std::env::var("TEXT_ANALYSIS_BASE_URL")
            .unwrap_or_else(|_| "https://api.groq.com/openai/v1".into());
        let model = std::env::var("TEXT_ANALYSIS_MODEL")
            .unwrap_or_else(|_| "llama-3.1-8b-instant".into());
        let timeout_secs = std::env::var("TEXT_ANALYSIS_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Some(Self {
            base_url,
            api_key,
            model,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Client for an OpenAI-compatible chat-completions endpoint.
pub struct HttpTextAnalysisClient {
    http: reqwest::blocking::Client,
    config: HttpClientConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl HttpTextAnalysisClient {
    /// Build a client with the configured request timeout.
    pub fn new(config: HttpClientConfig) -> AnalysisResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Run one chat completion and return the raw assistant text.
    fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> AnalysisResult<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature,
            max_tokens,
        };

        debug!(model = %self.config.model, "text-analysis request");

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .map_err(map_transport_error)?
            .error_for_status()
            .map_err(map_transport_error)?;

        let parsed: ChatResponse = response.json().map_err(map_transport_error)?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AnalysisError::InvalidFormat("no choices in response".into()))
    }
}

fn map_transport_error(e: reqwest::Error) -> AnalysisError {
    if e.is_timeout() {
        AnalysisError::Timeout
    } else {
        AnalysisError::Transport(e.to_string())
    }
}

impl TextAnalysisClient for HttpTextAnalysisClient {
    fn analyze_side_effect(&self, input: &SideEffectInput) -> AnalysisResult<SideEffectAssessment> {
        let text = self.complete(
            prompts::SIDE_EFFECT_SYSTEM_PROMPT,
            &prompts::make_side_effect_prompt(input),
            0.3,
            1000,
        )?;
        parse_side_effect_assessment(&text)
    }

    fn analyze_drug_interaction(
        &self,
        query: &InteractionQuery,
    ) -> AnalysisResult<InteractionJudgment> {
        let text = self.complete(
            prompts::INTERACTION_SYSTEM_PROMPT,
            &prompts::make_interaction_prompt(query),
            0.2,
            800,
        )?;
        parse_interaction_judgment(&text)
    }

    fn generate_insights(&self, input: &InsightsInput) -> AnalysisResult<InsightsSummary> {
        let text = self.complete(
            prompts::INSIGHTS_SYSTEM_PROMPT,
            &prompts::make_insights_prompt(input),
            0.3,
            1500,
        )?;
        parse_insights_summary(&text)
    }
}

// =========================================================================
// Scripted client (for tests, no network)
// =========================================================================

/// Deterministic client for tests.
///
/// Methods return the configured response, or queued one-shot responses
/// first when present. Unconfigured methods fail with a transport error,
/// which exercises the callers' fallback paths. Call counts are recorded so
/// tests can assert the client was (or was not) consulted.
#[derive(Default)]
pub struct ScriptedClient {
    side_effect: Option<SideEffectAssessment>,
    interaction: Option<InteractionJudgment>,
    insights: Option<InsightsSummary>,
    queued_interactions: Mutex<VecDeque<InteractionJudgment>>,
    side_effect_calls: AtomicUsize,
    interaction_calls: AtomicUsize,
    insights_calls: AtomicUsize,
}

impl ScriptedClient {
    /// Client where every call fails (service unavailable).
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Client that always returns the given interaction judgment.
    pub fn with_interaction_judgment(judgment: InteractionJudgment) -> Self {
        Self {
            interaction: Some(judgment),
            ..Self::default()
        }
    }

    /// Client that always returns the given insights summary.
    pub fn with_insights(insights: InsightsSummary) -> Self {
        Self {
            insights: Some(insights),
            ..Self::default()
        }
    }

    /// Set the standing side-effect assessment response.
    pub fn set_side_effect_assessment(&mut self, assessment: SideEffectAssessment) {
        self.side_effect = Some(assessment);
    }

    /// Queue a one-shot interaction judgment, consumed before the standing
    /// response.
    pub fn queue_interaction_judgment(&self, judgment: InteractionJudgment) {
        self.queued_interactions
            .lock()
            .expect("scripted client lock")
            .push_back(judgment);
    }

    pub fn side_effect_calls(&self) -> usize {
        self.side_effect_calls.load(Ordering::SeqCst)
    }

    pub fn interaction_calls(&self) -> usize {
        self.interaction_calls.load(Ordering::SeqCst)
    }

    pub fn insights_calls(&self) -> usize {
        self.insights_calls.load(Ordering::SeqCst)
    }

    fn scripted_failure() -> AnalysisError {
        AnalysisError::Transport("scripted: service unavailable".into())
    }
}

impl TextAnalysisClient for ScriptedClient {
    fn analyze_side_effect(&self, _input: &SideEffectInput) -> AnalysisResult<SideEffectAssessment> {
        self.side_effect_calls.fetch_add(1, Ordering::SeqCst);
        self.side_effect.clone().ok_or_else(Self::scripted_failure)
    }

    fn analyze_drug_interaction(
        &self,
        _query: &InteractionQuery,
    ) -> AnalysisResult<InteractionJudgment> {
        self.interaction_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(queued) = self
            .queued_interactions
            .lock()
            .expect("scripted client lock")
            .pop_front()
        {
            return Ok(queued);
        }

        self.interaction.clone().ok_or_else(Self::scripted_failure)
    }

    fn generate_insights(&self, _input: &InsightsInput) -> AnalysisResult<InsightsSummary> {
        self.insights_calls.fetch_add(1, Ordering::SeqCst);
        self.insights.clone().ok_or_else(Self::scripted_failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{DrugSummary, JudgedSeverity};

    fn sample_query() -> InteractionQuery {
        InteractionQuery {
            drug_1: DrugSummary {
                name: "Warfarin".into(),
                description: "anticoagulant".into(),
            },
            drug_2: DrugSummary {
                name: "Aspirin".into(),
                description: "NSAID".into(),
            },
            report_excerpts: vec![],
        }
    }

    #[test]
    fn test_scripted_unavailable() {
        let client = ScriptedClient::unavailable();
        assert!(matches!(
            client.analyze_drug_interaction(&sample_query()),
            Err(AnalysisError::Transport(_))
        ));
        assert_eq!(client.interaction_calls(), 1);
    }

    #[test]
    fn test_scripted_standing_response() {
        let client = ScriptedClient::with_interaction_judgment(InteractionJudgment {
            has_interaction: true,
            severity: JudgedSeverity::Major,
            description: "bleeding risk".into(),
            confidence: 0.9,
        });

        let first = client.analyze_drug_interaction(&sample_query()).unwrap();
        let second = client.analyze_drug_interaction(&sample_query()).unwrap();
        assert_eq!(first.severity, JudgedSeverity::Major);
        assert_eq!(second.severity, JudgedSeverity::Major);
        assert_eq!(client.interaction_calls(), 2);
    }

    #[test]
    fn test_scripted_queue_precedes_standing() {
        let client = ScriptedClient::with_interaction_judgment(InteractionJudgment::fallback());
        client.queue_interaction_judgment(InteractionJudgment {
            has_interaction: true,
            severity: JudgedSeverity::Contraindicated,
            description: "do not combine".into(),
            confidence: 0.95,
        });

        let first = client.analyze_drug_interaction(&sample_query()).unwrap();
        assert_eq!(first.severity, JudgedSeverity::Contraindicated);

        let second = client.analyze_drug_interaction(&sample_query()).unwrap();
        assert!(!second.has_interaction);
    }

    #[test]
    fn test_endpoint_join() {
        let client = HttpTextAnalysisClient::new(HttpClientConfig {
            base_url: "https://api.example.com/v1/".into(),
            api_key: "key".into(),
            model: "test-model".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();

        assert_eq!(client.endpoint(), "https://api.example.com/v1/chat/completions");
    }
}
