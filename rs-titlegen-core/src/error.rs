use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for title generation operations.
pub type Result<T> = std::result::Result<T, TitleGenError>;

/// Errors raised by the title generation pipeline.
///
/// Every error is fatal to the current invocation (a training run or a
/// generation run). Nothing in the crate retries.
#[derive(Debug, Error)]
pub enum TitleGenError {
	/// The corpus source supplied no records.
	#[error("corpus is empty: no records were supplied")]
	EmptyCorpus,

	/// The vocabulary has no characters.
	#[error("vocabulary is empty")]
	EmptyVocabulary,

	/// No training example could be cut from the corpus.
	#[error("training set is empty")]
	EmptyTrainingSet,

	/// The corpus is not longer than the window, so no seed window exists.
	#[error("corpus of {corpus_len} characters is too short for a window of {maxlen}")]
	CorpusTooShort { corpus_len: usize, maxlen: usize },

	/// Temperature must be strictly positive and finite.
	#[error("temperature must be a finite number > 0, got {0}")]
	InvalidTemperature(f64),

	/// A numeric parameter is outside its valid range.
	#[error("invalid parameter '{name}': {reason}")]
	InvalidParameter { name: &'static str, reason: String },

	/// A character is not part of the vocabulary.
	#[error("character {0:?} is not in the vocabulary")]
	UnknownCharacter(char),

	/// An index is outside the vocabulary.
	#[error("index {index} is outside a vocabulary of {size} characters")]
	UnknownIndex { index: usize, size: usize },

	/// A tensor does not have the shape the model expects.
	#[error("shape mismatch: expected {expected}, got {actual}")]
	ShapeMismatch { expected: String, actual: String },

	/// The model was trained on a different character set than the corpus.
	#[error("vocabulary mismatch: model knows {model} characters, corpus has {corpus}")]
	VocabularyMismatch { model: usize, corpus: usize },

	/// The adjusted distribution has no finite, positive mass to sample from.
	#[error("cannot sample from a distribution with no probability mass")]
	DegenerateDistribution,

	/// No persisted model at the given path.
	#[error("model not found: {}", path.display())]
	ModelNotFound { path: PathBuf },

	/// I/O error while reading a corpus or a model.
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),

	/// Checkpoint encoding or decoding failed.
	#[error("serialization error: {0}")]
	Serialization(#[from] postcard::Error),
}

impl TitleGenError {
	/// Creates an invalid parameter error.
	#[must_use]
	pub fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
		Self::InvalidParameter {
			name,
			reason: reason.into(),
		}
	}

	/// Creates a shape mismatch error from two shapes.
	#[must_use]
	pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
		Self::ShapeMismatch {
			expected: format!("{expected:?}"),
			actual: format!("{actual:?}"),
		}
	}
}
