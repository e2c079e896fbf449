//! Numeric helpers for aggregating and comparing data feed values
//!
//! Percentages are fixed-point integers where [`HUNDRED_PERCENT`] represents
//! 100%, so deviation checks never go through floating point arithmetic on
//! on-chain amounts.

use alloy_primitives::{I256, U256};

/// The fixed-point representation of 100%
pub const HUNDRED_PERCENT: u64 = 100_000_000;

/// The median of the given values, `None` when empty
///
/// For an even count, the two middle values are averaged with truncating
/// division.
pub fn median(values: &[I256]) -> Option<I256> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        return Some(sorted[mid]);
    }

    let sum = sorted[mid - 1].saturating_add(sorted[mid]);
    Some(sum / I256::from_raw(U256::from(2)))
}

/// The mean of the given timestamps with floor division, `None` when empty
pub fn mean_timestamp(timestamps: &[u64]) -> Option<u64> {
    if timestamps.is_empty() {
        return None;
    }

    let sum: u128 = timestamps.iter().map(|t| u128::from(*t)).sum();
    let mean = sum / timestamps.len() as u128;
    Some(mean as u64)
}

/// The relative change from `initial` to `updated`, scaled so that
/// [`HUNDRED_PERCENT`] is a 100% change
///
/// A zero initial value uses a denominator of one.
pub fn calculate_update_in_percentage(initial: I256, updated: I256) -> U256 {
    let delta = updated.saturating_sub(initial).unsigned_abs();
    let denominator = if initial.is_zero() { U256::from(1) } else { initial.unsigned_abs() };

    delta.saturating_mul(U256::from(HUNDRED_PERCENT)) / denominator
}

/// Convert a deviation threshold given in percent into the fixed-point scale
/// of [`calculate_update_in_percentage`]
pub fn deviation_threshold_to_fixed_point(threshold_percent: f64) -> U256 {
    let scaled = (threshold_percent * (HUNDRED_PERCENT as f64 / 100.0)).trunc();
    if scaled <= 0.0 {
        U256::ZERO
    } else {
        U256::from(scaled as u128)
    }
}
