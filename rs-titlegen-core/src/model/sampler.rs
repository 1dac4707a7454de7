use std::fmt;

use rand::Rng;

use crate::error::{Result, TitleGenError};

/// Sampling temperature.
///
/// Low values (`< 1`) sharpen the distribution toward its most likely
/// character, high values (`> 1`) flatten it, and `1` leaves it unchanged.
///
/// # Invariants
/// - Always finite and strictly positive
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Temperature(f64);

impl Temperature {
	/// Temperatures used to print samples after every training epoch.
	pub const MONITORING: [f64; 4] = [0.2, 0.5, 1.0, 1.2];

	/// Validates a temperature.
	///
	/// # Errors
	/// Returns `InvalidTemperature` if `value` is not finite or `<= 0`.
	pub fn new(value: f64) -> Result<Self> {
		if !value.is_finite() || value <= 0.0 {
			return Err(TitleGenError::InvalidTemperature(value));
		}
		Ok(Self(value))
	}

	pub fn value(self) -> f64 {
		self.0
	}
}

impl Default for Temperature {
	fn default() -> Self {
		Self(1.0)
	}
}

impl fmt::Display for Temperature {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Rescales a probability distribution by `temperature`.
///
/// Computes `exp(ln(p) / t)` for each entry and renormalises. The largest
/// log-probability is subtracted before exponentiating, which leaves the
/// normalised result unchanged and keeps very low temperatures from
/// underflowing. Zero probabilities stay at zero.
///
/// # Errors
/// Returns `DegenerateDistribution` if the rescaled entries have no finite,
/// positive total.
pub fn adjust(probabilities: &[f32], temperature: Temperature) -> Result<Vec<f64>> {
	let t = temperature.value();
	let logits: Vec<f64> = probabilities.iter().map(|&p| f64::from(p).ln() / t).collect();
	let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
	let scaled: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();

	let total: f64 = scaled.iter().sum();
	if !total.is_finite() || total <= 0.0 {
		return Err(TitleGenError::DegenerateDistribution);
	}
	Ok(scaled.into_iter().map(|p| p / total).collect())
}

/// Draws one index from `probabilities` after applying `temperature`.
///
/// The returned index is always in `0..probabilities.len()`.
///
/// # Errors
/// Returns `DegenerateDistribution` if the distribution is empty or has no
/// mass left after rescaling.
pub fn sample<R: Rng>(probabilities: &[f32], temperature: Temperature, rng: &mut R) -> Result<usize> {
	let adjusted = adjust(probabilities, temperature)?;

	// Single categorical draw: walk the cumulative distribution
	let mut r: f64 = rng.random();
	let mut fallback = None;
	for (index, &p) in adjusted.iter().enumerate() {
		if p <= 0.0 {
			continue;
		}
		if r < p {
			return Ok(index);
		}
		r -= p;
		fallback = Some(index);
	}

	// Rounding left `r` slightly above the total: last category with mass
	fallback.ok_or(TitleGenError::DegenerateDistribution)
}
