use std::path::PathBuf;

use super::sampler::Temperature;
use crate::error::{Result, TitleGenError};

/// Characters generated per sequence unless told otherwise.
pub const DEFAULT_LENGTH: usize = 400;

/// Input parameters for [`Generator::generate_until`].
///
/// `GenerationInput` carries both the sampling parameters (temperature,
/// sequence length) and the stopping rules of the title collection loop.
///
/// # Invariants
/// - `temperature` is strictly positive (enforced by [`Temperature`])
/// - `length` is at least 1
///
/// [`Generator::generate_until`]: super::generator::Generator::generate_until
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationInput {
	/// Sampling temperature.
	temperature: Temperature,

	/// Characters generated after the seed window, per iteration.
	length: usize,

	/// Number of distinct titles to collect.
	pub target_count: usize,

	/// Upper bound on the number of generated sequences.
	pub max_iterations: usize,

	/// Drop titles that match a corpus record, ignoring case.
	pub skip_known: bool,

	/// Drop the first and last piece of every sequence. The first one starts
	/// at the random seed offset and the last one is cut by `length`.
	pub drop_partial: bool,

	/// Re-read the model from this path before every iteration.
	pub reload_from: Option<PathBuf>,
}

impl Default for GenerationInput {
	fn default() -> Self {
		Self {
			temperature: Temperature::default(),
			length: DEFAULT_LENGTH,
			target_count: 10,
			max_iterations: 100,
			skip_known: false,
			drop_partial: false,
			reload_from: None,
		}
	}
}

impl GenerationInput {
	/// Returns the current temperature.
	pub fn temperature(&self) -> Temperature {
		self.temperature
	}

	/// Sets the sampling temperature.
	///
	/// # Errors
	/// Returns `InvalidTemperature` if the value is not a finite number `> 0`.
	pub fn set_temperature(&mut self, temperature: f64) -> Result<()> {
		self.temperature = Temperature::new(temperature)?;
		Ok(())
	}

	/// Returns the number of characters generated per sequence.
	pub fn length(&self) -> usize {
		self.length
	}

	/// Sets the number of characters generated per sequence.
	///
	/// # Errors
	/// Returns `InvalidParameter` if `length` is zero.
	pub fn set_length(&mut self, length: usize) -> Result<()> {
		if length == 0 {
			return Err(TitleGenError::invalid_parameter("length", "must be >= 1"));
		}
		self.length = length;
		Ok(())
	}
}
