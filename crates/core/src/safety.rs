use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Ceiling on actions created per configuration inside the trailing window.
pub const RATE_LIMIT_CEILING: u32 = 10;

/// Trailing window the rate limit counts over, in minutes.
pub const RATE_LIMIT_WINDOW_MINUTES: i64 = 60;

/// Hour-of-day window `[start, end)` during which a configuration may not
/// act. A window may wrap past midnight (start=22, end=6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl QuietHours {
    pub fn contains(&self, hour: u8) -> bool {
        let start = self.start_hour % 24;
        let end = self.end_hour % 24;
        let hour = hour % 24;

        if start == end {
            // Equal bounds describe an empty window, not a full day.
            return false;
        }

        if start < end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Denied { reason_code: &'static str, detail: String },
}

impl GateDecision {
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }
}

pub fn rate_limit_window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::minutes(RATE_LIMIT_WINDOW_MINUTES)
}

/// Pre-execution safety gate. Both checks must pass before an agent may
/// generate interventions; a denial guarantees zero side effects for the
/// cycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct SafetyGate;

impl SafetyGate {
    pub fn check(
        quiet_hours: Option<&QuietHours>,
        current_hour: u8,
        recent_action_count: u32,
    ) -> GateDecision {
        if let Some(window) = quiet_hours {
            if window.contains(current_hour) {
                return GateDecision::Denied {
                    reason_code: "quiet_hours",
                    detail: format!(
                        "hour {current_hour} falls inside quiet window [{}, {})",
                        window.start_hour, window.end_hour
                    ),
                };
            }
        }

        if recent_action_count >= RATE_LIMIT_CEILING {
            return GateDecision::Denied {
                reason_code: "rate_limited",
                detail: format!(
                    "{recent_action_count} actions created in the trailing {RATE_LIMIT_WINDOW_MINUTES} minutes (ceiling {RATE_LIMIT_CEILING})"
                ),
            };
        }

        GateDecision::Proceed
    }
}
