use std::fs;
use std::path::Path;
use std::sync::mpsc;
use std::thread;

use log::{debug, error, info};
use ndarray::{s, Array1, Array2, Array3, Axis};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::network::{Gradients, Network};
use super::optimizer::{clip_gradients, RmsProp};
use super::seeded_rng;
use super::vectorizer::{encode_window, TrainingSet};
use super::vocabulary::Vocabulary;
use crate::error::{Result, TitleGenError};

pub use super::optimizer::DEFAULT_LEARNING_RATE;

/// Default number of LSTM units.
pub const DEFAULT_HIDDEN_SIZE: usize = 128;

/// Batch rows per gradient chunk handed to a worker thread.
const GRADIENT_CHUNK_ROWS: usize = 16;

/// Training hyper-parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainConfig {
	/// Examples per gradient step.
	pub batch_size: usize,
	/// Passes over the whole training set.
	pub epochs: usize,
	/// Fixed RMSprop learning rate.
	pub learning_rate: f32,
	/// Rescale gradients whose global norm exceeds this value.
	pub clip_norm: Option<f32>,
	/// Shuffle the examples before every epoch.
	pub shuffle: bool,
	/// Seed of the shuffling RNG; `None` seeds from the OS.
	pub seed: Option<u64>,
}

impl Default for TrainConfig {
	fn default() -> Self {
		Self {
			batch_size: 128,
			epochs: 60,
			learning_rate: DEFAULT_LEARNING_RATE,
			clip_norm: None,
			shuffle: true,
			seed: None,
		}
	}
}

impl TrainConfig {
	/// Checks every field is in range.
	///
	/// # Errors
	/// Returns `InvalidParameter` for the first invalid field.
	pub fn validate(&self) -> Result<()> {
		if self.batch_size == 0 {
			return Err(TitleGenError::invalid_parameter("batch_size", "must be >= 1"));
		}
		if self.epochs == 0 {
			return Err(TitleGenError::invalid_parameter("epochs", "must be >= 1"));
		}
		if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
			return Err(TitleGenError::invalid_parameter(
				"learning_rate",
				format!("must be a finite number > 0, got {}", self.learning_rate),
			));
		}
		if let Some(clip) = self.clip_norm {
			if !clip.is_finite() || clip <= 0.0 {
				return Err(TitleGenError::invalid_parameter(
					"clip_norm",
					format!("must be a finite number > 0, got {clip}"),
				));
			}
		}
		Ok(())
	}
}

/// Summary of one training epoch, handed to the end-of-epoch callback.
#[derive(Clone, Debug, PartialEq)]
pub struct EpochReport {
	/// Epoch number, starting at 1.
	pub epoch: usize,
	/// Total number of epochs of the run.
	pub epochs: usize,
	/// Mean cross-entropy loss over the epoch's examples.
	pub loss: f64,
	/// Gradient steps taken.
	pub batches: usize,
}

/// Next-character predictor.
///
/// Owns the network parameters and the vocabulary they were trained with.
/// The rest of the crate only sees the parameters through [`predict`],
/// [`train`] and the [`save`]/[`load`] pair.
///
/// [`predict`]: SequenceModel::predict
/// [`train`]: SequenceModel::train
/// [`save`]: SequenceModel::save
/// [`load`]: SequenceModel::load
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SequenceModel {
	vocabulary: Vocabulary,
	maxlen: usize,
	network: Network,
}

impl SequenceModel {
	/// Creates an untrained model.
	///
	/// # Errors
	/// - `EmptyVocabulary` if `vocabulary` has no character
	/// - `InvalidParameter` if `maxlen` or `hidden_size` is zero
	pub fn new(vocabulary: Vocabulary, maxlen: usize, hidden_size: usize, seed: Option<u64>) -> Result<Self> {
		if vocabulary.is_empty() {
			return Err(TitleGenError::EmptyVocabulary);
		}
		if maxlen == 0 {
			return Err(TitleGenError::invalid_parameter("maxlen", "must be >= 1"));
		}
		if hidden_size == 0 {
			return Err(TitleGenError::invalid_parameter("hidden_size", "must be >= 1"));
		}

		let mut rng = seeded_rng(seed);
		let network = Network::new(vocabulary.len(), hidden_size, &mut rng);
		info!(
			"Created model: {} characters, window {}, {} units, {} parameters",
			vocabulary.len(),
			maxlen,
			hidden_size,
			network.parameter_count()
		);

		Ok(Self {
			vocabulary,
			maxlen,
			network,
		})
	}

	pub fn vocabulary(&self) -> &Vocabulary {
		&self.vocabulary
	}

	/// Window length the model reads.
	pub fn maxlen(&self) -> usize {
		self.maxlen
	}

	pub fn hidden_size(&self) -> usize {
		self.network.hidden_size()
	}

	pub fn parameter_count(&self) -> usize {
		self.network.parameter_count()
	}

	/// Fits the parameters to `training_set`.
	///
	/// Minimises categorical cross-entropy with mini-batch RMSprop.
	/// `on_epoch_end` runs after every epoch with the epoch summary and the
	/// model as trained so far; an error from it stops training.
	///
	/// Returns one report per epoch.
	///
	/// # Errors
	/// - `InvalidParameter` if `config` is invalid
	/// - `EmptyTrainingSet` if there is nothing to learn from
	/// - `ShapeMismatch` if the set was built for another window length or vocabulary
	/// - any error returned by `on_epoch_end`
	pub fn train<F>(&mut self, training_set: &TrainingSet, config: &TrainConfig, mut on_epoch_end: F) -> Result<Vec<EpochReport>>
	where
		F: FnMut(&EpochReport, &SequenceModel) -> Result<()>,
	{
		config.validate()?;
		if training_set.is_empty() {
			return Err(TitleGenError::EmptyTrainingSet);
		}
		let expected = [self.maxlen, self.vocabulary.len()];
		let actual = [training_set.maxlen(), training_set.vocab_size()];
		if expected != actual {
			return Err(TitleGenError::shape_mismatch(&expected, &actual));
		}

		let mut rng = seeded_rng(config.seed);
		let mut optimizer = RmsProp::new(config.learning_rate);
		let mut order: Vec<usize> = (0..training_set.len()).collect();
		let workers = num_cpus::get().max(1);

		info!(
			"Training on {} examples: {} epochs, batch size {}, learning rate {}, {} workers",
			training_set.len(),
			config.epochs,
			config.batch_size,
			optimizer.learning_rate(),
			workers
		);

		let mut reports = Vec::with_capacity(config.epochs);
		for epoch in 1..=config.epochs {
			if config.shuffle {
				order.shuffle(&mut rng);
			}

			let mut total_loss = 0.0_f64;
			let mut batches = 0;
			for batch in order.chunks(config.batch_size) {
				let (inputs, targets) = training_set.batch(batch);
				let (loss, mut gradients) = self.batch_gradients(&inputs, &targets, workers);
				if let Some(max_norm) = config.clip_norm {
					let norm = clip_gradients(&mut gradients, max_norm);
					if norm > max_norm {
						debug!("Clipped gradient norm {norm:.3} to {max_norm}");
					}
				}
				optimizer.step(&mut self.network, &gradients);

				total_loss += loss;
				batches += 1;
				debug!("Epoch {epoch} batch {batches}: loss {:.4}", loss / batch.len() as f64);
			}

			let report = EpochReport {
				epoch,
				epochs: config.epochs,
				loss: total_loss / training_set.len() as f64,
				batches,
			};
			info!("Epoch {}/{}: loss {:.4}", report.epoch, report.epochs, report.loss);

			on_epoch_end(&report, self)?;
			reports.push(report);
		}

		Ok(reports)
	}

	/// Summed loss and mean-loss gradients of one mini-batch.
	///
	/// Rows are cut into chunks of `GRADIENT_CHUNK_ROWS` and spread over at
	/// most `workers` scoped threads. The partition does not depend on
	/// `workers` and partial gradients are merged in chunk order, so a seeded
	/// run gives the same parameters on any machine.
	fn batch_gradients(&self, inputs: &Array3<f32>, targets: &Array2<f32>, workers: usize) -> (f64, Gradients) {
		let rows = targets.nrows();
		let scale = 1.0 / rows as f32;

		if rows <= GRADIENT_CHUNK_ROWS {
			let (loss, gradients) = self.network.loss_and_gradients(inputs.view(), targets, scale);
			return (f64::from(loss), gradients);
		}

		let starts: Vec<usize> = (0..rows).step_by(GRADIENT_CHUNK_ROWS).collect();
		let threads = workers.clamp(1, starts.len());

		let (tx, rx) = mpsc::channel();
		let network = &self.network;
		thread::scope(|scope| {
			for worker in 0..threads {
				let tx = tx.clone();
				let starts = &starts;
				scope.spawn(move || {
					for &start in starts.iter().skip(worker).step_by(threads) {
						let end = (start + GRADIENT_CHUNK_ROWS).min(rows);
						let chunk_targets = targets.slice(s![start..end, ..]).to_owned();
						let (loss, gradients) =
							network.loss_and_gradients(inputs.slice(s![start..end, .., ..]), &chunk_targets, scale);
						if tx.send((start, loss, gradients)).is_err() {
							error!("Gradient receiver dropped before chunk {start} was merged");
							return;
						}
					}
				});
			}
		});
		drop(tx);

		let mut partials: Vec<(usize, f32, Gradients)> = rx.iter().collect();
		partials.sort_by_key(|(start, _, _)| *start);

		let mut total = Gradients::zeros(&self.network);
		let mut loss = 0.0_f64;
		for (_, chunk_loss, gradients) in &partials {
			loss += f64::from(*chunk_loss);
			total.accumulate(gradients);
		}
		(loss, total)
	}

	/// Distribution of the character following `window`.
	///
	/// `window` is a one-hot `(maxlen, vocab_size)` tensor. The result has
	/// `vocab_size` non-negative entries summing to 1. Deterministic.
	///
	/// # Errors
	/// Returns `ShapeMismatch` if `window` has the wrong shape.
	pub fn predict(&self, window: &Array2<f32>) -> Result<Array1<f32>> {
		let expected = (self.maxlen, self.vocabulary.len());
		if window.dim() != expected {
			return Err(TitleGenError::shape_mismatch(&[expected.0, expected.1], window.shape()));
		}

		let probs = self.network.predict_batch(window.view().insert_axis(Axis(0)));
		Ok(probs.row(0).to_owned())
	}

	/// Encodes a window of characters and predicts the next one.
	///
	/// # Errors
	/// - `UnknownCharacter` if `window` has a character missing from the vocabulary
	/// - `ShapeMismatch` if `window` is not `maxlen` characters long
	pub fn predict_text(&self, window: &str) -> Result<Array1<f32>> {
		let indices = self.vocabulary.encode(window)?;
		self.predict(&encode_window(&indices, self.vocabulary.len()))
	}

	/// Writes the model to `filepath`, creating parent directories.
	pub fn save<P: AsRef<Path>>(&self, filepath: P) -> Result<()> {
		let path = filepath.as_ref();
		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() {
				fs::create_dir_all(parent)?;
			}
		}

		let bytes = postcard::to_stdvec(self)?;
		fs::write(path, bytes)?;
		debug!("Saved model to {}", path.display());
		Ok(())
	}

	/// Reads a model written by [`save`](SequenceModel::save).
	///
	/// # Errors
	/// - `ModelNotFound` if nothing exists at `filepath`
	/// - I/O and decoding errors
	/// - `InvalidParameter` if the stored window length or hidden size is zero
	/// - `ShapeMismatch` if a stored parameter array disagrees with the
	///   vocabulary or with the other arrays
	pub fn load<P: AsRef<Path>>(filepath: P) -> Result<Self> {
		let path = filepath.as_ref();
		if !path.exists() {
			return Err(TitleGenError::ModelNotFound {
				path: path.to_path_buf(),
			});
		}

		let bytes = fs::read(path)?;
		let model: Self = postcard::from_bytes(&bytes)?;
		if model.maxlen == 0 {
			return Err(TitleGenError::invalid_parameter("maxlen", "stored window length is zero"));
		}
		if model.network.hidden_size() == 0 {
			return Err(TitleGenError::invalid_parameter("hidden_size", "stored network has no units"));
		}
		if model.network.vocab_size() != model.vocabulary.len() {
			return Err(TitleGenError::shape_mismatch(
				&[model.vocabulary.len()],
				&[model.network.vocab_size()],
			));
		}
		model.network.check_shapes()?;

		info!(
			"Loaded model from {}: {} characters, window {}",
			path.display(),
			model.vocabulary.len(),
			model.maxlen
		);
		Ok(model)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::corpus::Corpus;

	fn periodic_setup(maxlen: usize) -> (SequenceModel, TrainingSet) {
		let corpus = Corpus::from_records(["abcd".repeat(50)], None).unwrap();
		let vocabulary = Vocabulary::build(corpus.text());
		let set = TrainingSet::build(&corpus, &vocabulary, maxlen, 1).unwrap();
		let model = SequenceModel::new(vocabulary, maxlen, 16, Some(42)).unwrap();
		(model, set)
	}

	fn argmax(probs: &Array1<f32>) -> usize {
		probs
			.iter()
			.enumerate()
			.max_by(|a, b| a.1.total_cmp(b.1))
			.map(|(i, _)| i)
			.unwrap()
	}

	#[test]
	fn test_new_rejects_degenerate_inputs() {
		assert!(matches!(
			SequenceModel::new(Vocabulary::build(""), 4, 8, Some(1)),
			Err(TitleGenError::EmptyVocabulary)
		));
		assert!(SequenceModel::new(Vocabulary::build("ab"), 0, 8, Some(1)).is_err());
		assert!(SequenceModel::new(Vocabulary::build("ab"), 4, 0, Some(1)).is_err());
	}

	#[test]
	fn test_predict_returns_distribution() {
		let (model, _) = periodic_setup(3);
		let probs = model.predict_text("abc").unwrap();
		assert_eq!(probs.len(), 4);
		assert!((probs.sum() - 1.0).abs() < 1e-5);
		assert!(probs.iter().all(|&p| p >= 0.0));
		assert_eq!(probs, model.predict_text("abc").unwrap());
	}

	#[test]
	fn test_predict_rejects_wrong_shape() {
		let (model, _) = periodic_setup(3);
		assert!(matches!(
			model.predict(&Array2::zeros((2, 4))),
			Err(TitleGenError::ShapeMismatch { .. })
		));
		assert!(matches!(model.predict_text("abx"), Err(TitleGenError::UnknownCharacter('x'))));
	}

	#[test]
	fn test_train_rejects_empty_set() {
		let corpus = Corpus::from_records(["abc"], None).unwrap();
		let vocabulary = Vocabulary::build(corpus.text());
		let set = TrainingSet::build(&corpus, &vocabulary, 3, 1).unwrap();
		let mut model = SequenceModel::new(vocabulary, 3, 4, Some(1)).unwrap();
		let result = model.train(&set, &TrainConfig::default(), |_, _| Ok(()));
		assert!(matches!(result, Err(TitleGenError::EmptyTrainingSet)));
	}

	#[test]
	fn test_train_rejects_mismatched_set() {
		let (mut model, _) = periodic_setup(3);
		let (_, other_set) = periodic_setup(5);
		let result = model.train(&other_set, &TrainConfig::default(), |_, _| Ok(()));
		assert!(matches!(result, Err(TitleGenError::ShapeMismatch { .. })));
	}

	#[test]
	fn test_train_rejects_invalid_config() {
		let (mut model, set) = periodic_setup(3);
		let config = TrainConfig {
			batch_size: 0,
			..TrainConfig::default()
		};
		assert!(model.train(&set, &config, |_, _| Ok(())).is_err());
	}

	#[test]
	fn test_train_learns_periodic_sequence() {
		let (mut model, set) = periodic_setup(3);
		let config = TrainConfig {
			batch_size: 32,
			epochs: 40,
			seed: Some(7),
			..TrainConfig::default()
		};

		let mut seen = Vec::new();
		let reports = model
			.train(&set, &config, |report, _| {
				seen.push(report.epoch);
				Ok(())
			})
			.unwrap();

		assert_eq!(seen, (1..=40).collect::<Vec<_>>());
		assert_eq!(reports.len(), 40);
		assert!(reports.last().unwrap().loss < reports[0].loss);

		let vocabulary = model.vocabulary().clone();
		for (window, next) in [("abc", 'd'), ("bcd", 'a'), ("cda", 'b'), ("dab", 'c')] {
			let probs = model.predict_text(window).unwrap();
			assert_eq!(vocabulary.char_at(argmax(&probs)), Some(next), "after {window}");
		}
	}

	#[test]
	fn test_callback_error_stops_training() {
		let (mut model, set) = periodic_setup(3);
		let config = TrainConfig {
			epochs: 5,
			seed: Some(1),
			..TrainConfig::default()
		};
		let mut calls = 0;
		let result = model.train(&set, &config, |_, _| {
			calls += 1;
			Err(TitleGenError::invalid_parameter("callback", "stop"))
		});
		assert!(result.is_err());
		assert_eq!(calls, 1);
	}

	#[test]
	fn test_save_load_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("models").join("titles.bin");

		let (model, _) = periodic_setup(3);
		model.save(&path).unwrap();
		let restored = SequenceModel::load(&path).unwrap();

		assert_eq!(restored.vocabulary(), model.vocabulary());
		assert_eq!(restored.maxlen(), 3);
		assert_eq!(restored.predict_text("bcd").unwrap(), model.predict_text("bcd").unwrap());
	}

	#[test]
	fn test_load_missing_model() {
		let dir = tempfile::tempdir().unwrap();
		let result = SequenceModel::load(dir.path().join("missing.bin"));
		assert!(matches!(result, Err(TitleGenError::ModelNotFound { .. })));
	}

	#[test]
	fn test_load_garbage_fails() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("garbage.bin");
		fs::write(&path, [0xff, 0x01, 0x02]).unwrap();
		assert!(SequenceModel::load(&path).is_err());
	}

	#[test]
	fn test_load_rejects_inconsistent_checkpoint() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("inconsistent.bin");

		let (mut model, _) = periodic_setup(3);
		model.network.u = Array2::zeros((5, 64));
		model.save(&path).unwrap();

		assert!(matches!(
			SequenceModel::load(&path),
			Err(TitleGenError::ShapeMismatch { .. })
		));
	}

	#[test]
	fn test_batch_gradients_ignore_worker_count() {
		let (model, set) = periodic_setup(3);
		let indices: Vec<usize> = (0..70).collect();
		let (inputs, targets) = set.batch(&indices);

		let (single_loss, single) = model.batch_gradients(&inputs, &targets, 1);
		for workers in [2, 3, 16] {
			let (loss, gradients) = model.batch_gradients(&inputs, &targets, workers);
			assert_eq!(loss, single_loss);
			assert_eq!(gradients.w, single.w);
			assert_eq!(gradients.u, single.u);
			assert_eq!(gradients.b, single.b);
			assert_eq!(gradients.wd, single.wd);
			assert_eq!(gradients.bd, single.bd);
		}
	}
}
