use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::action::Priority;

/// Minimum advisory confidence before a nudge candidate becomes a real
/// notification. The boundary is inclusive.
pub const NUDGE_CONFIDENCE_FLOOR: f64 = 0.5;

/// Minimum advisory confidence before scope deferral proceeds. Stricter than
/// the nudge floor; deferral has a larger blast radius.
pub const DEFERRAL_CONFIDENCE_FLOOR: f64 = 0.6;

/// Confidence-scored recommendation returned by the advisory service.
///
/// The advisory boundary is never a hard dependency: a missing credential or
/// a failed call degrades to [`AdvisoryVerdict::silent`], which callers must
/// treat as "stay silent", never as an error to propagate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisoryVerdict {
    pub should_act: bool,
    pub reasoning: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl AdvisoryVerdict {
    /// Deterministic no-op verdict used whenever the advisory service is
    /// unconfigured or unreachable.
    pub fn silent(reasoning: impl Into<String>) -> Self {
        Self {
            should_act: false,
            reasoning: reasoning.into(),
            confidence: 0.0,
            recommendation: None,
            priority: None,
        }
    }

    /// Clamp confidence into [0, 1] even when the advisory service violates
    /// the contract. Non-finite values collapse to zero.
    pub fn clamped(mut self) -> Self {
        self.confidence = if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    pub fn recommends_acting_with(&self, floor: f64) -> bool {
        self.should_act && self.confidence >= floor
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryRequest {
    /// Caller-supplied natural-language question.
    pub prompt: String,
    /// Structured situation payload handed to the service verbatim.
    pub data: serde_json::Value,
    /// Textual project-context summary, fetched once per analysis by the
    /// caller. Implementations degrade to a "no context" line when absent.
    pub project_context: Option<String>,
}

impl AdvisoryRequest {
    pub fn new(prompt: impl Into<String>, data: serde_json::Value) -> Self {
        Self { prompt: prompt.into(), data, project_context: None }
    }

    pub fn with_project_context(mut self, context: impl Into<String>) -> Self {
        self.project_context = Some(context.into());
        self
    }
}

#[async_trait]
pub trait Advisor: Send + Sync {
    /// Infallible by contract: every failure mode inside an implementation
    /// must collapse to the silent verdict.
    async fn advise(&self, request: AdvisoryRequest) -> AdvisoryVerdict;
}
