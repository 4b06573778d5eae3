use burn_core as burn;

use burn::tensor::{backend::Backend, Tensor, TensorData};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Seeded standard-normal generator for initial noise and ancestral steps.
///
/// Draws happen on the host so a given seed yields the same values on every
/// backend.
#[derive(Debug, Clone)]
pub struct NoiseSource {
    rng: StdRng,
}

impl NoiseSource {
    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    pub fn standard_normal<B: Backend, const D: usize>(
        &mut self,
        shape: [usize; D],
        device: &B::Device,
    ) -> Tensor<B, D> {
        let numel = shape.iter().product::<usize>();
        let values: Vec<f32> = (0..numel).map(|_| self.rng.sample(StandardNormal)).collect();
        Tensor::from_data(TensorData::new(values, shape), device)
    }

    /// Noise with the same shape and device as `like`.
    pub fn like<B: Backend, const D: usize>(&mut self, like: &Tensor<B, D>) -> Tensor<B, D> {
        self.standard_normal(like.dims(), &like.device())
    }
}
