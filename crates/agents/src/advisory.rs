//! Advisory client implementations.
//!
//! [`HttpAdvisor`] talks to an OpenAI-compatible chat-completions endpoint
//! and demands strict JSON back. Every failure mode (missing credentials,
//! transport error, non-2xx status, malformed body, timeout) collapses to
//! the deterministic silent verdict so the agents degrade to "no automated
//! action" instead of erroring.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use tiller_core::advisory::{Advisor, AdvisoryRequest, AdvisoryVerdict};
use tiller_core::config::AdvisoryConfig;
use tiller_core::errors::EngineError;

const SYSTEM_PREAMBLE: &str = "You are a project-delivery advisor embedded in an automated \
engine. Evaluate the situation described by the user and respond with STRICT JSON only, \
matching: {\"shouldAct\": bool, \"reasoning\": string, \"confidence\": number in [0,1], \
\"recommendation\"?: object, \"priority\"?: \"low\"|\"medium\"|\"high\"}. Recommend acting \
only when the intervention is clearly worthwhile.";

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

pub struct HttpAdvisor {
    client: reqwest::Client,
    config: AdvisoryConfig,
}

impl HttpAdvisor {
    pub fn new(config: AdvisoryConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Integration(format!("advisory client init: {e}")))?;

        Ok(Self { client, config })
    }

    fn system_message(request: &AdvisoryRequest) -> String {
        let context = request
            .project_context
            .as_deref()
            .unwrap_or("No project context available.");
        format!("{SYSTEM_PREAMBLE}\n\n{context}")
    }

    fn user_message(request: &AdvisoryRequest) -> String {
        format!("{}\n\nData:\n{}", request.prompt, request.data)
    }

    async fn call(&self, request: &AdvisoryRequest) -> Result<AdvisoryVerdict, String> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| "no advisory credentials configured".to_string())?;

        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: Self::system_message(request) },
                ChatMessage { role: "user".to_string(), content: Self::user_message(request) },
            ],
            temperature: 0.2,
            response_format: ResponseFormat { format_type: "json_object".to_string() },
        };

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("advisory transport failure: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("advisory service returned {status}"));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| format!("advisory response decode failure: {e}"))?;

        let content = parsed
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| "advisory response carried no choices".to_string())?;

        let verdict: AdvisoryVerdict = serde_json::from_str(content)
            .map_err(|e| format!("advisory verdict violated the JSON contract: {e}"))?;

        Ok(verdict.clamped())
    }
}

#[async_trait]
impl Advisor for HttpAdvisor {
    async fn advise(&self, request: AdvisoryRequest) -> AdvisoryVerdict {
        if !self.config.is_configured() {
            tracing::debug!("advisory unconfigured; returning silent verdict");
            return AdvisoryVerdict::silent("no advisory credentials configured");
        }

        match self.call(&request).await {
            Ok(verdict) => verdict,
            Err(reason) => {
                tracing::warn!(%reason, "advisory call degraded to silent verdict");
                AdvisoryVerdict::silent(reason)
            }
        }
    }
}

/// Test double: hands out queued verdicts in order, then a fixed fallback.
/// Records every request it saw.
pub struct ScriptedAdvisor {
    verdicts: Mutex<VecDeque<AdvisoryVerdict>>,
    fallback: AdvisoryVerdict,
    requests: Mutex<Vec<AdvisoryRequest>>,
}

impl ScriptedAdvisor {
    pub fn new(fallback: AdvisoryVerdict) -> Self {
        Self {
            verdicts: Mutex::new(VecDeque::new()),
            fallback,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Advisor that always answers with the silent verdict, mimicking the
    /// unconfigured production client.
    pub fn silent() -> Self {
        Self::new(AdvisoryVerdict::silent("scripted: unconfigured"))
    }

    /// Advisor that always recommends acting at the given confidence.
    pub fn confident(confidence: f64) -> Self {
        Self::new(AdvisoryVerdict {
            should_act: true,
            reasoning: "scripted: act".to_string(),
            confidence,
            recommendation: None,
            priority: None,
        })
    }

    pub async fn push(&self, verdict: AdvisoryVerdict) {
        self.verdicts.lock().await.push_back(verdict);
    }

    pub async fn requests(&self) -> Vec<AdvisoryRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl Advisor for ScriptedAdvisor {
    async fn advise(&self, request: AdvisoryRequest) -> AdvisoryVerdict {
        self.requests.lock().await.push(request);
        let queued = self.verdicts.lock().await.pop_front();
        queued.unwrap_or_else(|| self.fallback.clone()).clamped()
    }
}
