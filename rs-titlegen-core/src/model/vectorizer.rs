use ndarray::{Array1, Array2, Array3};

use super::corpus::Corpus;
use super::vocabulary::Vocabulary;
use crate::error::{Result, TitleGenError};

/// Default window length, in characters.
pub const DEFAULT_MAXLEN: usize = 40;

/// Default stride between two consecutive windows.
pub const DEFAULT_STEP: usize = 3;

/// One (window, next character) pair cut from the corpus.
///
/// Characters are stored as vocabulary indices; the one-hot tensors are
/// built on demand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrainingExample {
	window: Vec<usize>,
	target: usize,
}

impl TrainingExample {
	/// Vocabulary indices of the window characters.
	pub fn window(&self) -> &[usize] {
		&self.window
	}

	/// Vocabulary index of the character following the window.
	pub fn target(&self) -> usize {
		self.target
	}

	/// One-hot `(maxlen, vocab_size)` encoding of the window.
	pub fn window_tensor(&self, vocab_size: usize) -> Array2<f32> {
		encode_window(&self.window, vocab_size)
	}

	/// One-hot `vocab_size` encoding of the target.
	pub fn target_vector(&self, vocab_size: usize) -> Array1<f32> {
		one_hot(self.target, vocab_size)
	}
}

/// Training data of a sequence model.
///
/// All windows have the same length (`maxlen`) and all indices are below
/// `vocab_size`.
#[derive(Clone, Debug)]
pub struct TrainingSet {
	examples: Vec<TrainingExample>,
	maxlen: usize,
	vocab_size: usize,
}

impl TrainingSet {
	/// Slides a window of `maxlen` characters across the corpus, `step`
	/// characters at a time, and records the character that follows each
	/// window.
	///
	/// A corpus that is not longer than `maxlen` yields an empty set.
	///
	/// # Errors
	/// - `InvalidParameter` if `maxlen` or `step` is zero
	/// - `UnknownCharacter` if the corpus has a character missing from `vocabulary`
	pub fn build(corpus: &Corpus, vocabulary: &Vocabulary, maxlen: usize, step: usize) -> Result<Self> {
		if maxlen == 0 {
			return Err(TitleGenError::invalid_parameter("maxlen", "must be >= 1"));
		}
		if step == 0 {
			return Err(TitleGenError::invalid_parameter("step", "must be >= 1"));
		}

		let encoded = vocabulary.encode(corpus.text())?;
		let examples = (0..encoded.len().saturating_sub(maxlen))
			.step_by(step)
			.map(|i| TrainingExample {
				window: encoded[i..i + maxlen].to_vec(),
				target: encoded[i + maxlen],
			})
			.collect();

		Ok(Self {
			examples,
			maxlen,
			vocab_size: vocabulary.len(),
		})
	}

	pub fn len(&self) -> usize {
		self.examples.len()
	}

	pub fn is_empty(&self) -> bool {
		self.examples.is_empty()
	}

	pub fn maxlen(&self) -> usize {
		self.maxlen
	}

	pub fn vocab_size(&self) -> usize {
		self.vocab_size
	}

	pub fn examples(&self) -> &[TrainingExample] {
		&self.examples
	}

	/// Encodes the examples at `indices` as a mini-batch.
	///
	/// Returns the `(batch, maxlen, vocab_size)` input tensor and the
	/// `(batch, vocab_size)` target matrix.
	///
	/// # Panics
	/// Panics if an index is out of bounds.
	pub fn batch(&self, indices: &[usize]) -> (Array3<f32>, Array2<f32>) {
		let mut inputs = Array3::zeros((indices.len(), self.maxlen, self.vocab_size));
		let mut targets = Array2::zeros((indices.len(), self.vocab_size));
		for (row, &index) in indices.iter().enumerate() {
			let example = &self.examples[index];
			for (t, &c) in example.window.iter().enumerate() {
				inputs[[row, t, c]] = 1.0;
			}
			targets[[row, example.target]] = 1.0;
		}
		(inputs, targets)
	}
}

/// One-hot encodes a window of vocabulary indices into a
/// `(window.len(), vocab_size)` tensor.
pub fn encode_window(window: &[usize], vocab_size: usize) -> Array2<f32> {
	let mut tensor = Array2::zeros((window.len(), vocab_size));
	for (t, &c) in window.iter().enumerate() {
		tensor[[t, c]] = 1.0;
	}
	tensor
}

/// One-hot vector of length `size` with `index` set.
pub fn one_hot(index: usize, size: usize) -> Array1<f32> {
	let mut vector = Array1::zeros(size);
	vector[index] = 1.0;
	vector
}

#[cfg(test)]
mod tests {
	use super::*;

	fn abc_set(step: usize) -> (Vocabulary, TrainingSet) {
		let corpus = Corpus::from_records(["abcabcabcabc"], None).unwrap();
		let vocabulary = Vocabulary::build(corpus.text());
		let set = TrainingSet::build(&corpus, &vocabulary, 3, step).unwrap();
		(vocabulary, set)
	}

	#[test]
	fn test_windows_and_targets() {
		let (vocabulary, set) = abc_set(1);
		assert_eq!(set.len(), 9);

		let windows: Vec<String> = set
			.examples()
			.iter()
			.map(|e| vocabulary.decode(e.window()).unwrap())
			.collect();
		let targets: Vec<char> = set
			.examples()
			.iter()
			.map(|e| vocabulary.char_at(e.target()).unwrap())
			.collect();

		assert_eq!(&windows[..4], &["abc", "bca", "cab", "abc"]);
		assert_eq!(&targets[..4], &['a', 'b', 'c', 'a']);
		assert_eq!(windows.last().unwrap(), "cab");
		assert_eq!(*targets.last().unwrap(), 'c');
	}

	#[test]
	fn test_step_skips_windows() {
		let (_, set) = abc_set(3);
		assert_eq!(set.len(), 3);
		for example in set.examples() {
			assert_eq!(example.window(), &[0, 1, 2]);
			assert_eq!(example.target(), 0);
		}
	}

	#[test]
	fn test_short_corpus_yields_empty_set() {
		let corpus = Corpus::from_records(["abc"], None).unwrap();
		let vocabulary = Vocabulary::build(corpus.text());
		assert!(TrainingSet::build(&corpus, &vocabulary, 3, 1).unwrap().is_empty());
		assert!(TrainingSet::build(&corpus, &vocabulary, 10, 1).unwrap().is_empty());
	}

	#[test]
	fn test_zero_parameters_are_rejected() {
		let corpus = Corpus::from_records(["abcdef"], None).unwrap();
		let vocabulary = Vocabulary::build(corpus.text());
		assert!(TrainingSet::build(&corpus, &vocabulary, 0, 1).is_err());
		assert!(TrainingSet::build(&corpus, &vocabulary, 2, 0).is_err());
	}

	#[test]
	fn test_foreign_vocabulary_is_rejected() {
		let corpus = Corpus::from_records(["abcdef"], None).unwrap();
		let vocabulary = Vocabulary::build("abc");
		assert!(matches!(
			TrainingSet::build(&corpus, &vocabulary, 2, 1),
			Err(TitleGenError::UnknownCharacter('d'))
		));
	}

	#[test]
	fn test_one_hot_shapes() {
		let (vocabulary, set) = abc_set(1);
		for example in set.examples() {
			let window = example.window_tensor(vocabulary.len());
			assert_eq!(window.dim(), (3, 3));
			for row in window.rows() {
				assert_eq!(row.sum(), 1.0);
			}
			let target = example.target_vector(vocabulary.len());
			assert_eq!(target.len(), 3);
			assert_eq!(target.sum(), 1.0);
			assert_eq!(target[example.target()], 1.0);
		}
	}

	#[test]
	fn test_batch_matches_examples() {
		let (_, set) = abc_set(1);
		let (inputs, targets) = set.batch(&[1, 4]);
		assert_eq!(inputs.dim(), (2, 3, 3));
		assert_eq!(targets.dim(), (2, 3));

		// Example 1 is "bca" → 'b'
		assert_eq!(inputs[[0, 0, 1]], 1.0);
		assert_eq!(inputs[[0, 1, 2]], 1.0);
		assert_eq!(inputs[[0, 2, 0]], 1.0);
		assert_eq!(targets[[0, 1]], 1.0);
		assert_eq!(inputs.sum(), 6.0);
		assert_eq!(targets.sum(), 2.0);
	}
}
