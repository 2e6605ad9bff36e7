//! Integer proportion helpers.
//!
//! All proportional splits in the protocol are `value * numerator /
//! denominator` with truncation toward zero, computed in `u128` so the
//! intermediate product cannot overflow.

use crate::constants::PERCENT_DENOMINATOR;

/// `value * numerator / denominator`, truncated.
///
/// Returns `None` when `denominator == 0` or the result does not fit in
/// `u64`. Callers decide what a zero divisor means in their context.
pub fn mul_div(value: u64, numerator: u64, denominator: u64) -> Option<u64> {
    if denominator == 0 {
        return None;
    }
    let product = (value as u128) * (numerator as u128);
    u64::try_from(product / denominator as u128).ok()
}

/// Apply a fixed-point percentage: `value * percent / PERCENT_DENOMINATOR`.
pub fn apply_percent(value: u64, percent: u64) -> Option<u64> {
    mul_div(value, percent, PERCENT_DENOMINATOR)
}

/// Compound a sequence of fixed-point percentages by multiplication,
/// truncating after each step.
///
/// An empty sequence yields 100%.
pub fn compound_percents<I>(percents: I) -> Option<u64>
where
    I: IntoIterator<Item = u64>,
{
    percents
        .into_iter()
        .try_fold(PERCENT_DENOMINATOR, |acc, p| apply_percent(acc, p))
}
