//! Top-level module for the character-level title generator.
//!
//! This module provides the whole pipeline, leaves first:
//! - Corpus loading (`Corpus`)
//! - Character vocabulary (`Vocabulary`)
//! - Sliding-window vectorization (`TrainingSet`)
//! - LSTM next-character model (`SequenceModel`)
//! - Temperature sampling (`sample`, `Temperature`)
//! - Title generation (`Generator`, `GenerationInput`)

use rand::SeedableRng;
use rand::rngs::StdRng;

/// Immutable corpus built from source records.
///
/// Loads records from memory or a flat file and joins them with the record
/// separator.
pub mod corpus;

/// Sorted character set and index lookup tables.
pub mod vocabulary;

/// Sliding-window training data and one-hot encoding.
pub mod vectorizer;

/// LSTM + dense softmax network with its backward pass.
///
/// Not exposed outside the crate beyond `SequenceModel`.
mod network;

/// RMSprop updates and gradient clipping.
mod optimizer;

/// Next-character model: training, prediction and persistence.
pub mod sequence_model;

/// Temperature-scaled categorical sampling.
pub mod sampler;

/// Generation parameters with validated setters.
pub mod generation_input;

/// High-level generation interface.
///
/// Drives the model and the sampler to extend seed windows and to collect
/// distinct titles.
pub mod generator;

/// Returns an RNG seeded from `seed`, or from the OS when `None`.
pub(crate) fn seeded_rng(seed: Option<u64>) -> StdRng {
	match seed {
		Some(seed) => StdRng::seed_from_u64(seed),
		None => StdRng::from_os_rng(),
	}
}
