use burn_core as burn;

use burn::tensor::{backend::Backend, Tensor};

use crate::config::PredictionTarget;
use crate::error::{BinarizeError, Result};

use super::model::Denoiser;
use super::noise::NoiseSource;
use super::schedule::NoiseSchedule;

/// Full-length reverse-process sampler.
///
/// Walks `t = T-1, ..., 0`, calling the denoiser once per step. Each step turns
/// the prediction into a `(x0, eps)` pair and applies the generalized DDIM
/// update
///
/// `x_{t-1} = sqrt(abar_{t-1}) x0 + sqrt(1 - abar_{t-1} - sigma_t^2) eps + sigma_t z`
///
/// with `sigma_t = eta * sqrt(posterior_variance_t)`. `eta = 1` samples the DDPM
/// posterior, `eta = 0` is deterministic. The last step never injects noise.
#[derive(Debug, Clone)]
pub struct DdimSampler {
    schedule: NoiseSchedule,
    target: PredictionTarget,
    eta: f64,
}

impl DdimSampler {
    pub fn new(schedule: NoiseSchedule, target: PredictionTarget, eta: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&eta) {
            return Err(BinarizeError::config(format!("eta must lie in [0, 1], got {eta}")));
        }
        Ok(Self { schedule, target, eta })
    }

    pub fn schedule(&self) -> &NoiseSchedule {
        &self.schedule
    }

    pub fn prediction_target(&self) -> PredictionTarget {
        self.target
    }

    /// Number of denoiser calls made by [`DdimSampler::sample`].
    pub fn num_steps(&self) -> usize {
        self.schedule.len()
    }

    /// Standard deviation of the noise injected when stepping from `t` to `t-1`.
    pub fn posterior_std(&self, t: usize) -> f64 {
        if t == 0 {
            return 0.0;
        }
        self.eta * self.schedule.posterior_variance()[t].sqrt()
    }

    /// Split a model output at step `t` into `(x0, eps)`.
    fn split_prediction<B: Backend>(
        &self,
        x_t: Tensor<B, 4>,
        prediction: Tensor<B, 4>,
        t: usize,
    ) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let sqrt_ab = self.schedule.sqrt_alphas_cumprod()[t];
        let sqrt_one_minus_ab = self.schedule.sqrt_one_minus_alphas_cumprod()[t];
        match self.target {
            PredictionTarget::PredictNoise => {
                let x0 = (x_t - prediction.clone().mul_scalar(sqrt_one_minus_ab))
                    .div_scalar(sqrt_ab);
                (x0, prediction)
            }
            PredictionTarget::PredictOriginal => {
                let eps = (x_t - prediction.clone().mul_scalar(sqrt_ab))
                    .div_scalar(sqrt_one_minus_ab);
                (prediction, eps)
            }
        }
    }

    /// One reverse transition `x_t -> x_{t-1}` given the denoiser output.
    pub fn step<B: Backend>(
        &self,
        x_t: Tensor<B, 4>,
        prediction: Tensor<B, 4>,
        t: usize,
        noise: &mut NoiseSource,
    ) -> Tensor<B, 4> {
        let (x0, eps) = self.split_prediction(x_t, prediction, t);
        if t == 0 {
            return x0;
        }

        let ab_prev = self.schedule.alphas_cumprod_prev()[t];
        let sigma = self.posterior_std(t);
        let dir = (1.0 - ab_prev - sigma * sigma).max(0.0).sqrt();

        let mean = x0.mul_scalar(ab_prev.sqrt()) + eps.mul_scalar(dir);
        if sigma > 0.0 {
            let z = noise.like(&mean);
            mean + z.mul_scalar(sigma)
        } else {
            mean
        }
    }

    /// Run the whole reverse process from `x_t` (pure noise at `t = T-1`).
    ///
    /// Returns the final residual `x_0`. Errors from the denoiser abort the loop.
    pub fn sample<B: Backend, M: Denoiser<B>>(
        &self,
        model: &M,
        mut x_t: Tensor<B, 4>,
        condition: Tensor<B, 4>,
        noise: &mut NoiseSource,
    ) -> Result<Tensor<B, 4>> {
        for t in (0..self.schedule.len()).rev() {
            let prediction = model.denoise(x_t.clone(), t as f32, condition.clone())?;
            check_same_dims(&x_t, &prediction)?;
            x_t = self.step(x_t, prediction, t, noise);
        }
        Ok(x_t)
    }
}

pub(crate) fn check_same_dims<B: Backend>(x: &Tensor<B, 4>, prediction: &Tensor<B, 4>) -> Result<()> {
    if x.dims() != prediction.dims() {
        return Err(BinarizeError::shape(format!(
            "denoiser returned {:?} for an input of {:?}",
            prediction.dims(),
            x.dims()
        )));
    }
    Ok(())
}
