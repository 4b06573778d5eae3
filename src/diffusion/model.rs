use burn_core as burn;

use core::cell::Cell;

use burn::tensor::{backend::Backend, Tensor};

use crate::error::Result;

/// Conditional denoising network seen by the samplers.
///
/// `timestep` is on the discrete training scale `[0, T)`; the fast solver may
/// pass fractional values. The output has the shape of `x_t` and is either the
/// clean residual or the noise, depending on the configured prediction target.
pub trait Denoiser<B: Backend> {
    fn denoise(&self, x_t: Tensor<B, 4>, timestep: f32, condition: Tensor<B, 4>) -> Result<Tensor<B, 4>>;
}

impl<B, F> Denoiser<B> for F
where
    B: Backend,
    F: Fn(Tensor<B, 4>, f32, Tensor<B, 4>) -> Result<Tensor<B, 4>>,
{
    fn denoise(&self, x_t: Tensor<B, 4>, timestep: f32, condition: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        self(x_t, timestep, condition)
    }
}

/// First-stage network producing the coarse estimate used as conditioning.
pub trait InitialPredictor<B: Backend> {
    fn predict(&self, image: Tensor<B, 4>) -> Result<Tensor<B, 4>>;
}

impl<B, F> InitialPredictor<B> for F
where
    B: Backend,
    F: Fn(Tensor<B, 4>) -> Result<Tensor<B, 4>>,
{
    fn predict(&self, image: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        self(image)
    }
}

/// Counts how often the wrapped denoiser is called.
pub struct CountingDenoiser<'a, D> {
    inner: &'a D,
    calls: Cell<usize>,
}

impl<'a, D> CountingDenoiser<'a, D> {
    pub fn new(inner: &'a D) -> Self {
        Self { inner, calls: Cell::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl<B: Backend, D: Denoiser<B>> Denoiser<B> for CountingDenoiser<'_, D> {
    fn denoise(&self, x_t: Tensor<B, 4>, timestep: f32, condition: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        self.calls.set(self.calls.get() + 1);
        self.inner.denoise(x_t, timestep, condition)
    }
}
