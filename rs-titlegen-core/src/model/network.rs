use ndarray::{s, Array1, Array2, ArrayView3, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TitleGenError};

/// Lower bound applied to probabilities before taking their log.
const PROBABILITY_FLOOR: f32 = 1e-7;

/// Single-layer LSTM followed by a dense softmax layer.
///
/// Reads a one-hot window `(maxlen, vocab_size)` character by character and
/// maps the last hidden state to a distribution over the next character.
///
/// Gates are packed in the order input, forget, cell, output along the last
/// axis of `w`, `u` and `b`.
///
/// # Invariants
/// - `w`: `(vocab_size, 4 * hidden)`
/// - `u`: `(hidden, 4 * hidden)`
/// - `b`: `4 * hidden`
/// - `wd`: `(hidden, vocab_size)`
/// - `bd`: `vocab_size`
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Network {
	pub(crate) w: Array2<f32>,
	pub(crate) u: Array2<f32>,
	pub(crate) b: Array1<f32>,
	pub(crate) wd: Array2<f32>,
	pub(crate) bd: Array1<f32>,
}

/// Gradients of the loss, one array per network parameter.
#[derive(Clone, Debug)]
pub struct Gradients {
	pub(crate) w: Array2<f32>,
	pub(crate) u: Array2<f32>,
	pub(crate) b: Array1<f32>,
	pub(crate) wd: Array2<f32>,
	pub(crate) bd: Array1<f32>,
}

/// Activations of one time step, kept for the backward pass.
struct StepCache {
	h_prev: Array2<f32>,
	c_prev: Array2<f32>,
	i: Array2<f32>,
	f: Array2<f32>,
	g: Array2<f32>,
	o: Array2<f32>,
	tanh_c: Array2<f32>,
}

struct ForwardCache {
	steps: Vec<StepCache>,
	h_last: Array2<f32>,
	probs: Array2<f32>,
}

fn sigmoid(x: f32) -> f32 {
	1.0 / (1.0 + (-x).exp())
}

/// Glorot-uniform initialisation of a `(fan_in, fan_out)` kernel.
fn glorot_uniform<R: Rng>(fan_in: usize, fan_out: usize, rng: &mut R) -> Array2<f32> {
	let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
	Array2::from_shape_fn((fan_in, fan_out), |_| rng.random_range(-limit..limit))
}

/// Row-wise, numerically stable softmax.
fn softmax_rows(mut logits: Array2<f32>) -> Array2<f32> {
	for mut row in logits.rows_mut() {
		let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
		row.mapv_inplace(|v| (v - max).exp());
		let sum = row.sum();
		row /= sum;
	}
	logits
}

impl Network {
	/// Creates a randomly initialised network.
	///
	/// Kernels use Glorot-uniform initialisation, biases start at zero except
	/// the forget gate bias which starts at one.
	pub fn new<R: Rng>(vocab_size: usize, hidden_size: usize, rng: &mut R) -> Self {
		let mut b = Array1::<f32>::zeros(4 * hidden_size);
		b.slice_mut(s![hidden_size..2 * hidden_size]).fill(1.0);

		Self {
			w: glorot_uniform(vocab_size, 4 * hidden_size, rng),
			u: glorot_uniform(hidden_size, 4 * hidden_size, rng),
			b,
			wd: glorot_uniform(hidden_size, vocab_size, rng),
			bd: Array1::zeros(vocab_size),
		}
	}

	pub fn vocab_size(&self) -> usize {
		self.w.nrows()
	}

	pub fn hidden_size(&self) -> usize {
		self.u.nrows()
	}

	/// Total number of trainable parameters.
	pub fn parameter_count(&self) -> usize {
		self.w.len() + self.u.len() + self.b.len() + self.wd.len() + self.bd.len()
	}

	/// Checks that all five parameter arrays agree on the vocabulary and
	/// hidden sizes implied by `w` and `u`.
	///
	/// # Errors
	/// Returns `ShapeMismatch` for the first inconsistent array.
	pub fn check_shapes(&self) -> Result<()> {
		let (vocab, hidden) = (self.vocab_size(), self.hidden_size());
		let expected_shapes: [(&[usize], Vec<usize>); 5] = [
			(self.w.shape(), vec![vocab, 4 * hidden]),
			(self.u.shape(), vec![hidden, 4 * hidden]),
			(self.b.shape(), vec![4 * hidden]),
			(self.wd.shape(), vec![hidden, vocab]),
			(self.bd.shape(), vec![vocab]),
		];
		for (actual, expected) in expected_shapes {
			if actual != expected.as_slice() {
				return Err(TitleGenError::shape_mismatch(&expected, actual));
			}
		}
		Ok(())
	}

	/// Next-character distributions for a `(batch, maxlen, vocab_size)` input.
	///
	/// Returns a `(batch, vocab_size)` matrix whose rows sum to 1.
	pub fn predict_batch(&self, inputs: ArrayView3<f32>) -> Array2<f32> {
		self.forward(inputs).probs
	}

	fn forward(&self, inputs: ArrayView3<f32>) -> ForwardCache {
		let (batch, steps, _) = inputs.dim();
		let hidden = self.hidden_size();

		let mut h = Array2::<f32>::zeros((batch, hidden));
		let mut c = Array2::<f32>::zeros((batch, hidden));
		let mut cache = Vec::with_capacity(steps);

		for t in 0..steps {
			let x_t = inputs.index_axis(Axis(1), t);
			let z = x_t.dot(&self.w) + h.dot(&self.u) + &self.b;

			let i = z.slice(s![.., 0..hidden]).mapv(sigmoid);
			let f = z.slice(s![.., hidden..2 * hidden]).mapv(sigmoid);
			let g = z.slice(s![.., 2 * hidden..3 * hidden]).mapv(f32::tanh);
			let o = z.slice(s![.., 3 * hidden..]).mapv(sigmoid);

			let c_next = &f * &c + &i * &g;
			let tanh_c = c_next.mapv(f32::tanh);
			let h_next = &o * &tanh_c;

			cache.push(StepCache {
				h_prev: h,
				c_prev: c,
				i,
				f,
				g,
				o,
				tanh_c,
			});
			h = h_next;
			c = c_next;
		}

		let logits = h.dot(&self.wd) + &self.bd;
		ForwardCache {
			steps: cache,
			h_last: h,
			probs: softmax_rows(logits),
		}
	}

	/// Categorical cross-entropy loss and its gradients for a mini-batch.
	///
	/// Returns the loss summed over the batch rows, and gradients multiplied by
	/// `scale`. Callers splitting a batch into chunks pass `1 / full_batch` so
	/// that summing the chunk gradients yields the gradient of the mean loss.
	pub fn loss_and_gradients(&self, inputs: ArrayView3<f32>, targets: &Array2<f32>, scale: f32) -> (f32, Gradients) {
		let cache = self.forward(inputs);
		let hidden = self.hidden_size();
		let batch = targets.nrows();

		let loss = -(targets * &cache.probs.mapv(|p| p.max(PROBABILITY_FLOOR).ln())).sum();

		let d_logits = (&cache.probs - targets) * scale;
		let mut grads = Gradients::zeros(self);
		grads.wd = cache.h_last.t().dot(&d_logits);
		grads.bd = d_logits.sum_axis(Axis(0));

		let mut dh = d_logits.dot(&self.wd.t());
		let mut dc = Array2::<f32>::zeros((batch, hidden));

		for (t, step) in cache.steps.iter().enumerate().rev() {
			let x_t = inputs.index_axis(Axis(1), t);

			let d_o = &dh * &step.tanh_c;
			dc += &(&(&dh * &step.o) * &step.tanh_c.mapv(|v| 1.0 - v * v));

			let dz_i = &dc * &step.g * &step.i.mapv(|v| v * (1.0 - v));
			let dz_f = &dc * &step.c_prev * &step.f.mapv(|v| v * (1.0 - v));
			let dz_g = &dc * &step.i * &step.g.mapv(|v| 1.0 - v * v);
			let dz_o = d_o * &step.o.mapv(|v| v * (1.0 - v));

			let mut dz = Array2::<f32>::zeros((batch, 4 * hidden));
			dz.slice_mut(s![.., 0..hidden]).assign(&dz_i);
			dz.slice_mut(s![.., hidden..2 * hidden]).assign(&dz_f);
			dz.slice_mut(s![.., 2 * hidden..3 * hidden]).assign(&dz_g);
			dz.slice_mut(s![.., 3 * hidden..]).assign(&dz_o);

			grads.w += &x_t.t().dot(&dz);
			grads.u += &step.h_prev.t().dot(&dz);
			grads.b += &dz.sum_axis(Axis(0));

			dh = dz.dot(&self.u.t());
			dc = &dc * &step.f;
		}

		(loss, grads)
	}
}

impl Gradients {
	/// Zero gradients shaped like `network`.
	pub fn zeros(network: &Network) -> Self {
		Self {
			w: Array2::zeros(network.w.raw_dim()),
			u: Array2::zeros(network.u.raw_dim()),
			b: Array1::zeros(network.b.raw_dim()),
			wd: Array2::zeros(network.wd.raw_dim()),
			bd: Array1::zeros(network.bd.raw_dim()),
		}
	}

	/// Accumulates `other` into `self`.
	pub fn accumulate(&mut self, other: &Self) {
		self.w += &other.w;
		self.u += &other.u;
		self.b += &other.b;
		self.wd += &other.wd;
		self.bd += &other.bd;
	}

	pub fn scale(&mut self, factor: f32) {
		self.w *= factor;
		self.u *= factor;
		self.b *= factor;
		self.wd *= factor;
		self.bd *= factor;
	}

	/// L2 norm over all gradient entries.
	pub fn global_norm(&self) -> f32 {
		let squares = self.w.mapv(|g| g * g).sum()
			+ self.u.mapv(|g| g * g).sum()
			+ self.b.mapv(|g| g * g).sum()
			+ self.wd.mapv(|g| g * g).sum()
			+ self.bd.mapv(|g| g * g).sum();
		squares.sqrt()
	}
}
