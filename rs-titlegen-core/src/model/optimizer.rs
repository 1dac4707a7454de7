use ndarray::{Array, Dimension, Zip};

use super::network::{Gradients, Network};

/// Default RMSprop learning rate.
pub const DEFAULT_LEARNING_RATE: f32 = 0.01;

const RHO: f32 = 0.9;
const EPSILON: f32 = 1e-7;

/// RMSprop optimizer with a fixed learning rate.
///
/// Keeps a moving average of squared gradients per parameter and divides
/// each update by its square root.
#[derive(Clone, Debug)]
pub struct RmsProp {
	learning_rate: f32,
	rho: f32,
	epsilon: f32,
	/// Squared-gradient averages, created on the first step
	mean_square: Option<Gradients>,
}

impl RmsProp {
	pub fn new(learning_rate: f32) -> Self {
		Self {
			learning_rate,
			rho: RHO,
			epsilon: EPSILON,
			mean_square: None,
		}
	}

	pub fn learning_rate(&self) -> f32 {
		self.learning_rate
	}

	/// Applies one update of `gradients` to `network`.
	pub fn step(&mut self, network: &mut Network, gradients: &Gradients) {
		let mean_square = self.mean_square.get_or_insert_with(|| Gradients::zeros(network));
		let (lr, rho, eps) = (self.learning_rate, self.rho, self.epsilon);

		update(&mut network.w, &gradients.w, &mut mean_square.w, lr, rho, eps);
		update(&mut network.u, &gradients.u, &mut mean_square.u, lr, rho, eps);
		update(&mut network.b, &gradients.b, &mut mean_square.b, lr, rho, eps);
		update(&mut network.wd, &gradients.wd, &mut mean_square.wd, lr, rho, eps);
		update(&mut network.bd, &gradients.bd, &mut mean_square.bd, lr, rho, eps);
	}
}

fn update<D: Dimension>(
	params: &mut Array<f32, D>,
	grads: &Array<f32, D>,
	mean_square: &mut Array<f32, D>,
	lr: f32,
	rho: f32,
	eps: f32,
) {
	Zip::from(params).and(grads).and(mean_square).for_each(|p, &g, ms| {
		*ms = rho * *ms + (1.0 - rho) * g * g;
		*p -= lr * g / (ms.sqrt() + eps);
	});
}

/// Rescales `gradients` so their global L2 norm is at most `max_norm`.
///
/// Returns the norm before clipping.
pub fn clip_gradients(gradients: &mut Gradients, max_norm: f32) -> f32 {
	let norm = gradients.global_norm();
	if norm > max_norm {
		gradients.scale(max_norm / norm);
	}
	norm
}
