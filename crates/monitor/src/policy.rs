//! Trend policies evaluated against a sensor's sliding window.
//!
//! Both policies are pure: the decision depends only on the window contents
//! and the timestamp of the reading that was just pushed.

use std::fmt;

use pitwatch_core::PolicySpec;

use crate::window::SlidingWindow;

pub const RATE_OF_CHANGE_REASON: &str = "rate-of-change exceeded tolerance";
pub const STALL_REASON: &str = "stall detected";

#[derive(Debug, Clone, PartialEq)]
pub enum TrendDecision {
    NoAlert,
    Alert { reason: String, timestamp: String },
}

impl TrendDecision {
    pub fn is_alert(&self) -> bool {
        matches!(self, TrendDecision::Alert { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrendPolicy {
    /// Smoker: any earlier value swinging more than `tolerance` from the latest.
    RateOfChange { tolerance: f64 },
    /// Food probe: a full window whose first-to-last span stays under `min_span`.
    Stall { min_span: f64 },
}

impl From<PolicySpec> for TrendPolicy {
    fn from(policy: PolicySpec) -> Self {
        match policy {
            PolicySpec::RateOfChange { tolerance } => TrendPolicy::RateOfChange { tolerance },
            PolicySpec::Stall { min_span } => TrendPolicy::Stall { min_span },
        }
    }
}

impl fmt::Display for TrendPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendPolicy::RateOfChange { tolerance } => write!(f, "rate_of_change(tolerance={tolerance})"),
            TrendPolicy::Stall { min_span } => write!(f, "stall(min_span={min_span})"),
        }
    }
}

impl TrendPolicy {
    pub fn kind(&self) -> &'static str {
        match self {
            TrendPolicy::RateOfChange { .. } => "rate_of_change",
            TrendPolicy::Stall { .. } => "stall",
        }
    }

    pub fn threshold(&self) -> f64 {
        match self {
            TrendPolicy::RateOfChange { tolerance } => *tolerance,
            TrendPolicy::Stall { min_span } => *min_span,
        }
    }

    pub fn evaluate(&self, window: &SlidingWindow, timestamp: &str) -> TrendDecision {
        self.evaluate_values(&window.snapshot(), window.is_full(), timestamp)
    }

    /// Evaluate an ordered snapshot. `full` tells whether the snapshot
    /// reached the window capacity.
    pub fn evaluate_values(&self, values: &[f64], full: bool, timestamp: &str) -> TrendDecision {
        let triggered = match *self {
            TrendPolicy::RateOfChange { tolerance } => match values.split_last() {
                Some((last, earlier)) if !earlier.is_empty() => {
                    earlier.iter().any(|v| (v - last).abs() > tolerance)
                }
                _ => false,
            },
            TrendPolicy::Stall { min_span } => {
                if !full {
                    false
                } else {
                    match (values.first(), values.last()) {
                        (Some(first), Some(last)) => (last - first).abs() < min_span,
                        _ => false,
                    }
                }
            }
        };

        if triggered {
            let reason = match self {
                TrendPolicy::RateOfChange { .. } => RATE_OF_CHANGE_REASON,
                TrendPolicy::Stall { .. } => STALL_REASON,
            };
            TrendDecision::Alert {
                reason: reason.to_string(),
                timestamp: timestamp.to_string(),
            }
        } else {
            TrendDecision::NoAlert
        }
    }
}
