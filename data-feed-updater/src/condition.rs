//! Decides whether a candidate data feed value is worth publishing on-chain

use crate::{
    math::{calculate_update_in_percentage, deviation_threshold_to_fixed_point},
    types::DataFeedValue,
};

/// The outcome of an update condition check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateDecision {
    /// The candidate is not newer than the on-chain value, an update would
    /// revert
    StaleCandidate,
    /// The on-chain value is older than the heartbeat interval
    HeartbeatExpired,
    /// The candidate deviates from the on-chain value by more than the
    /// threshold
    DeviationExceeded,
    /// The candidate is within the deviation threshold
    WithinThreshold,
}

impl UpdateDecision {
    /// Whether the decision calls for an on-chain update
    pub fn should_update(&self) -> bool {
        matches!(self, UpdateDecision::HeartbeatExpired | UpdateDecision::DeviationExceeded)
    }
}

/// The per data feed thresholds that trigger an update
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UpdateThresholds {
    /// The minimum relative change, in percent
    pub deviation_threshold: f64,
    /// The maximum on-chain staleness, in seconds
    pub heartbeat_interval: u64,
}

/// Check the update condition for a candidate against the on-chain value
///
/// Checks are ordered: freshness, then heartbeat, then deviation.
pub fn check_update_condition(
    on_chain: &DataFeedValue,
    candidate: &DataFeedValue,
    thresholds: &UpdateThresholds,
    now: u64,
) -> UpdateDecision {
    if candidate.timestamp <= on_chain.timestamp {
        return UpdateDecision::StaleCandidate;
    }

    if now.saturating_sub(on_chain.timestamp) > thresholds.heartbeat_interval {
        return UpdateDecision::HeartbeatExpired;
    }

    let change = calculate_update_in_percentage(on_chain.value, candidate.value);
    let threshold = deviation_threshold_to_fixed_point(thresholds.deviation_threshold);
    if change > threshold {
        UpdateDecision::DeviationExceeded
    } else {
        UpdateDecision::WithinThreshold
    }
}
