use std::collections::HashSet;
use std::path::Path;

use log::{debug, info, warn};
use rand::Rng;
use rand::rngs::StdRng;

use super::corpus::{Corpus, RECORD_SEPARATOR};
use super::generation_input::GenerationInput;
use super::sampler::{sample, Temperature};
use super::seeded_rng;
use super::sequence_model::SequenceModel;
use super::vectorizer::encode_window;
use super::vocabulary::Vocabulary;
use crate::error::{Result, TitleGenError};

/// High-level generator driving a trained model over a corpus.
///
/// # Responsibilities
/// - Draw seed windows from the corpus
/// - Extend a seed one sampled character at a time (`generate_once`)
/// - Collect distinct titles from repeated generations (`generate_until`)
///
/// The model is loaded once and reused across iterations, unless
/// [`GenerationInput::reload_from`] asks for a fresh read every time.
#[derive(Debug)]
pub struct Generator<'a> {
	model: SequenceModel,
	corpus: &'a Corpus,
	rng: StdRng,
}

impl<'a> Generator<'a> {
	/// Creates a generator for `model` seeded from `corpus`.
	///
	/// `seed` fixes the RNG used for seed offsets and sampling; `None` seeds
	/// from the OS.
	///
	/// # Errors
	/// - `CorpusTooShort` if the corpus is not longer than the model window
	/// - `VocabularyMismatch` if the corpus has characters the model never saw
	pub fn new(model: SequenceModel, corpus: &'a Corpus, seed: Option<u64>) -> Result<Self> {
		check_compatible(&model, corpus)?;
		Ok(Self {
			model,
			corpus,
			rng: seeded_rng(seed),
		})
	}

	pub fn model(&self) -> &SequenceModel {
		&self.model
	}

	/// Returns a window of the corpus at a uniformly random offset.
	pub fn random_seed_window(&mut self) -> Result<String> {
		let maxlen = self.model.maxlen();
		let too_short = TitleGenError::CorpusTooShort {
			corpus_len: self.corpus.len(),
			maxlen,
		};
		if self.corpus.len() <= maxlen {
			return Err(too_short);
		}

		let offset = self.rng.random_range(0..self.corpus.len() - maxlen);
		self.corpus.window(offset, maxlen).ok_or(too_short)
	}

	/// Extends `seed_window` by `length` sampled characters.
	///
	/// Each step encodes the current window, predicts the next character
	/// distribution, samples it at `temperature`, appends the character and
	/// slides the window by one. The result is the seed followed by exactly
	/// `length` generated characters.
	///
	/// # Errors
	/// - `ShapeMismatch` if the seed is not `maxlen` characters long
	/// - `UnknownCharacter` if the seed has a character outside the vocabulary
	pub fn generate_once(&mut self, seed_window: &str, temperature: Temperature, length: usize) -> Result<String> {
		let vocabulary = self.model.vocabulary();
		let mut window = vocabulary.encode(seed_window)?;
		if window.len() != self.model.maxlen() {
			return Err(TitleGenError::shape_mismatch(&[self.model.maxlen()], &[window.len()]));
		}

		let mut generated = String::with_capacity(seed_window.len() + length);
		generated.push_str(seed_window);

		for _ in 0..length {
			let probs = self.model.predict(&encode_window(&window, vocabulary.len()))?;
			let next = sample(&probs.to_vec(), temperature, &mut self.rng)?;
			let c = vocabulary.char_at(next).ok_or(TitleGenError::UnknownIndex {
				index: next,
				size: vocabulary.len(),
			})?;

			generated.push(c);
			window.rotate_left(1);
			if let Some(last) = window.last_mut() {
				*last = next;
			}
		}

		Ok(generated)
	}

	/// Collects distinct titles from repeated generations.
	///
	/// Every iteration seeds a sequence at a random corpus offset, generates
	/// `input.length()` characters, splits the result on the record
	/// separator and keeps the trimmed, non-empty pieces. Stops once
	/// `input.target_count` titles are collected or after
	/// `input.max_iterations` sequences, whichever comes first.
	///
	/// Returns at most `input.target_count` titles, in no particular order.
	///
	/// # Errors
	/// Any error from reloading the model or from `generate_once`.
	pub fn generate_until(&mut self, input: &GenerationInput) -> Result<Vec<String>> {
		let (titles, iterations) = self.collect_titles(input)?;

		if titles.len() < input.target_count {
			warn!(
				"Collected {} of {} titles after {} iterations",
				titles.len(),
				input.target_count,
				iterations
			);
		} else {
			info!("Collected {} titles in {} iterations", input.target_count, iterations);
		}

		Ok(titles.into_iter().take(input.target_count).collect())
	}

	/// Runs the collection loop and returns the distinct titles together with
	/// the number of sequences generated.
	fn collect_titles(&mut self, input: &GenerationInput) -> Result<(HashSet<String>, usize)> {
		let mut titles: HashSet<String> = HashSet::new();
		let mut iterations = 0;

		while titles.len() < input.target_count && iterations < input.max_iterations {
			iterations += 1;
			if let Some(path) = &input.reload_from {
				self.reload(path)?;
			}

			let seed = self.random_seed_window()?;
			let generated = self.generate_once(&seed, input.temperature(), input.length())?;

			for title in split_titles(&generated, input.drop_partial) {
				if input.skip_known && self.corpus.contains_record(title) {
					continue;
				}
				titles.insert(title.to_owned());
			}
			debug!("Iteration {iterations}: {} distinct titles", titles.len());
		}

		Ok((titles, iterations))
	}

	/// Replaces the model with the one stored at `filepath`.
	fn reload(&mut self, filepath: &Path) -> Result<()> {
		let model = SequenceModel::load(filepath)?;
		check_compatible(&model, self.corpus)?;
		self.model = model;
		Ok(())
	}
}

/// Splits generated text on the record separator into trimmed, non-empty
/// titles.
///
/// With `drop_partial`, the first and last pieces are discarded: the first
/// starts at an arbitrary seed offset and the last is cut by the length limit.
fn split_titles(generated: &str, drop_partial: bool) -> Vec<&str> {
	let pieces: Vec<&str> = generated.split(RECORD_SEPARATOR).collect();
	let pieces = if drop_partial {
		pieces.get(1..pieces.len().saturating_sub(1)).unwrap_or_default()
	} else {
		&pieces[..]
	};
	pieces.iter().copied().map(str::trim).filter(|title| !title.is_empty()).collect()
}

/// Checks that `model` can be seeded from `corpus`.
fn check_compatible(model: &SequenceModel, corpus: &Corpus) -> Result<()> {
	if corpus.len() <= model.maxlen() {
		return Err(TitleGenError::CorpusTooShort {
			corpus_len: corpus.len(),
			maxlen: model.maxlen(),
		});
	}

	let corpus_vocabulary = Vocabulary::build(corpus.text());
	let known = model.vocabulary();
	if corpus_vocabulary.chars().iter().any(|&c| known.index_of(c).is_none()) {
		return Err(TitleGenError::VocabularyMismatch {
			model: known.len(),
			corpus: corpus_vocabulary.len(),
		});
	}
	Ok(())
}
