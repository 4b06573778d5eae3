use burn_core as burn;

use std::collections::VecDeque;

use burn::tensor::{backend::Backend, Tensor, TensorData};

use crate::config::PredictionTarget;
use crate::error::{BinarizeError, Result};

use super::ddim::check_same_dims;
use super::model::Denoiser;
use super::schedule::NoiseSchedule;
use super::utils::{interpolate, linspace};

/// Continuous-time view of a discrete schedule.
///
/// Timestep `n` maps to `t = (n + 1) / N` in `(0, 1]`; `log(alpha_t)` is
/// interpolated linearly between the knots. Everything the solver needs
/// (alpha, sigma, the half log-SNR lambda) is derived from it.
#[derive(Debug, Clone)]
pub struct ContinuousSchedule {
    t_knots: Vec<f64>,
    log_alpha_knots: Vec<f64>,
}

impl ContinuousSchedule {
    pub fn from_discrete(schedule: &NoiseSchedule) -> Self {
        let n = schedule.len();
        Self {
            t_knots: (1..=n).map(|i| i as f64 / n as f64).collect(),
            log_alpha_knots: schedule.log_alphas().to_vec(),
        }
    }

    pub fn total_n(&self) -> usize {
        self.t_knots.len()
    }

    /// Largest time, pure noise.
    pub fn t_max(&self) -> f64 {
        1.0
    }

    /// Smallest time the discrete schedule covers, `1/N`.
    pub fn t_min(&self) -> f64 {
        1.0 / self.total_n() as f64
    }

    pub fn log_alpha(&self, t: f64) -> f64 {
        interpolate(t, &self.t_knots, &self.log_alpha_knots)
    }

    pub fn alpha(&self, t: f64) -> f64 {
        self.log_alpha(t).exp()
    }

    pub fn sigma(&self, t: f64) -> f64 {
        (1.0 - (2.0 * self.log_alpha(t)).exp()).sqrt()
    }

    /// `lambda_t = log(alpha_t / sigma_t)`.
    pub fn lambda(&self, t: f64) -> f64 {
        let log_alpha = self.log_alpha(t);
        log_alpha - 0.5 * (1.0 - (2.0 * log_alpha).exp()).ln()
    }

    /// Time value handed to the denoiser, on the discrete index scale `[0, N)`.
    pub fn model_time(&self, t: f64) -> f32 {
        ((t - self.t_min()) * self.total_n() as f64) as f32
    }
}

/// Post-processing applied to each `x0` estimate before it enters an update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Thresholding {
    None,
    /// Per sample: `s = max(quantile(|x0|, ratio), max_val)`, then
    /// `x0 = clamp(x0, -s, s) / s`.
    Dynamic { ratio: f64, max_val: f64 },
}

impl Thresholding {
    pub fn dynamic() -> Self {
        Self::Dynamic { ratio: 0.995, max_val: 1.0 }
    }
}

/// Options of the multistep solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DpmSolverOptions {
    /// Number of intervals `K` in the time partition.
    pub steps: usize,
    /// How many stored evaluations each update uses (1..=3).
    pub order: usize,
    /// Lower the order on the last steps of short runs (`K < 10`).
    pub lower_order_final: bool,
    pub thresholding: Thresholding,
    pub target: PredictionTarget,
}

impl Default for DpmSolverOptions {
    fn default() -> Self {
        Self {
            steps: 20,
            order: 1,
            lower_order_final: true,
            thresholding: Thresholding::dynamic(),
            target: PredictionTarget::PredictOriginal,
        }
    }
}

/// Past data predictions, newest last, bounded by the solver order.
#[derive(Debug, Clone)]
pub struct SolverHistory<B: Backend> {
    capacity: usize,
    entries: VecDeque<(f64, Tensor<B, 4>)>,
}

impl<B: Backend> SolverHistory<B> {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: VecDeque::with_capacity(capacity) }
    }

    pub fn push(&mut self, t: f64, x0: Tensor<B, 4>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((t, x0));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry `back` places before the newest one (`0` is the newest).
    fn back(&self, back: usize) -> &(f64, Tensor<B, 4>) {
        &self.entries[self.entries.len() - 1 - back]
    }
}

/// Multistep DPM-Solver++ in data-prediction form.
///
/// Integrates the diffusion ODE from `t = 1` down to `t = 1/N` over a uniform
/// time partition of `K` intervals, using up to `order` stored `x0`
/// predictions per update. With `order = 1` each update is the first-order
/// exponential integrator
/// `x_t = (sigma_t / sigma_s) x_s - alpha_t expm1(-h) x0_s`.
#[derive(Debug, Clone)]
pub struct DpmSolver {
    schedule: ContinuousSchedule,
    options: DpmSolverOptions,
}

impl DpmSolver {
    pub fn new(schedule: &NoiseSchedule, options: DpmSolverOptions) -> Result<Self> {
        if schedule.len() < 2 {
            return Err(BinarizeError::config(format!(
                "fast solver needs at least 2 timesteps to span a time interval, got {}",
                schedule.len()
            )));
        }
        if !(1..=3).contains(&options.order) {
            return Err(BinarizeError::config(format!(
                "solver order must be 1, 2 or 3, got {}",
                options.order
            )));
        }
        if options.steps < options.order {
            return Err(BinarizeError::config(format!(
                "solver needs at least {} steps for order {}, got {}",
                options.order, options.order, options.steps
            )));
        }
        if let Thresholding::Dynamic { ratio, max_val } = options.thresholding {
            if !(ratio > 0.0 && ratio <= 1.0) || max_val <= 0.0 {
                return Err(BinarizeError::config(format!(
                    "invalid dynamic thresholding (ratio {ratio}, max {max_val})"
                )));
            }
        }
        Ok(Self { schedule: ContinuousSchedule::from_discrete(schedule), options })
    }

    pub fn options(&self) -> &DpmSolverOptions {
        &self.options
    }

    pub fn continuous_schedule(&self) -> &ContinuousSchedule {
        &self.schedule
    }

    /// Uniform time partition of `K + 1` points from `1` to `1/N`.
    pub fn time_steps(&self) -> Vec<f64> {
        linspace(self.schedule.t_max(), self.schedule.t_min(), self.options.steps + 1)
    }

    /// Number of denoiser calls made by [`DpmSolver::sample`].
    pub fn num_model_evaluations(&self) -> usize {
        self.options.steps
    }

    fn data_prediction<B: Backend, M: Denoiser<B>>(
        &self,
        model: &M,
        x: Tensor<B, 4>,
        t: f64,
        condition: Tensor<B, 4>,
    ) -> Result<Tensor<B, 4>> {
        let output = model.denoise(x.clone(), self.schedule.model_time(t), condition)?;
        check_same_dims(&x, &output)?;
        let x0 = match self.options.target {
            PredictionTarget::PredictOriginal => output,
            PredictionTarget::PredictNoise => {
                let alpha = self.schedule.alpha(t);
                let sigma = self.schedule.sigma(t);
                (x - output.mul_scalar(sigma)).div_scalar(alpha)
            }
        };
        match self.options.thresholding {
            Thresholding::None => Ok(x0),
            Thresholding::Dynamic { ratio, max_val } => dynamic_threshold_cpu(x0, ratio, max_val),
        }
    }

    /// Advance `x` from the newest history time to `t` with an update of `order`.
    fn multistep_update<B: Backend>(
        &self,
        x: Tensor<B, 4>,
        history: &SolverHistory<B>,
        t: f64,
        order: usize,
    ) -> Tensor<B, 4> {
        let sch = &self.schedule;
        let (t0, m0) = history.back(0);
        let lambda_t = sch.lambda(t);
        let lambda_0 = sch.lambda(*t0);
        let h = lambda_t - lambda_0;
        let alpha_t = sch.alpha(t);
        let phi_1 = (-h).exp_m1();

        let base = x.mul_scalar(sch.sigma(t) / sch.sigma(*t0)) - m0.clone().mul_scalar(alpha_t * phi_1);

        match order {
            1 => base,
            2 => {
                let (t1, m1) = history.back(1);
                let r0 = (lambda_0 - sch.lambda(*t1)) / h;
                let d1 = (m0.clone() - m1.clone()).div_scalar(r0);
                base - d1.mul_scalar(0.5 * alpha_t * phi_1)
            }
            _ => {
                let (t1, m1) = history.back(1);
                let (t2, m2) = history.back(2);
                let lambda_1 = sch.lambda(*t1);
                let lambda_2 = sch.lambda(*t2);
                let r0 = (lambda_0 - lambda_1) / h;
                let r1 = (lambda_1 - lambda_2) / h;
                let d1_0 = (m0.clone() - m1.clone()).div_scalar(r0);
                let d1_1 = (m1.clone() - m2.clone()).div_scalar(r1);
                let d1 = d1_0.clone() + (d1_0.clone() - d1_1.clone()).mul_scalar(r0 / (r0 + r1));
                let d2 = (d1_0 - d1_1).div_scalar(r0 + r1);
                let phi_2 = phi_1 / h + 1.0;
                let phi_3 = phi_2 / h - 0.5;
                base + d1.mul_scalar(alpha_t * phi_2) - d2.mul_scalar(alpha_t * phi_3)
            }
        }
    }

    /// Integrate from the noise `x_t` at `t = 1` and return the final residual.
    pub fn sample<B: Backend, M: Denoiser<B>>(
        &self,
        model: &M,
        mut x: Tensor<B, 4>,
        condition: Tensor<B, 4>,
    ) -> Result<Tensor<B, 4>> {
        let steps = self.options.steps;
        let order = self.options.order;
        let times = self.time_steps();

        let mut history = SolverHistory::new(order);
        history.push(times[0], self.data_prediction(model, x.clone(), times[0], condition.clone())?);

        for (step, &t) in times.iter().enumerate().skip(1) {
            let step_order = if step < order {
                // Warm-up: not enough history yet.
                step
            } else if self.options.lower_order_final && steps < 10 {
                order.min(steps + 1 - step)
            } else {
                order
            };
            x = self.multistep_update(x, &history, t, step_order);
            if step < steps {
                history.push(t, self.data_prediction(model, x.clone(), t, condition.clone())?);
            }
        }
        Ok(x)
    }
}

/// Dynamic thresholding of an `x0` batch, computed per sample on the host.
pub fn dynamic_threshold_cpu<B: Backend>(
    x0: Tensor<B, 4>,
    ratio: f64,
    max_val: f64,
) -> Result<Tensor<B, 4>> {
    let dims = x0.dims();
    let device = x0.device();
    let per_sample = dims[1] * dims[2] * dims[3];
    if per_sample == 0 {
        return Ok(x0);
    }
    let mut values = x0
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| BinarizeError::TensorData(format!("{err:?}")))?;

    let mut scratch = Vec::with_capacity(per_sample);
    for sample in values.chunks_mut(per_sample) {
        scratch.clear();
        scratch.extend(sample.iter().map(|v| v.abs() as f64));
        let s = quantile(&mut scratch, ratio).max(max_val);
        for v in sample.iter_mut() {
            *v = ((*v as f64).clamp(-s, s) / s) as f32;
        }
    }
    Ok(Tensor::from_data(TensorData::new(values, dims), &device))
}

/// Linear-interpolated quantile, sorting `values` in place.
fn quantile(values: &mut [f64], q: f64) -> f64 {
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let pos = q * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    values[lo] + (values[hi] - values[lo]) * (pos - lo as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScheduleKind;

    #[test]
    fn quantile_interpolates() {
        let mut v = vec![4.0, 1.0, 3.0, 2.0];
        assert_eq!(quantile(&mut v, 0.5), 2.5);
        assert_eq!(quantile(&mut v, 1.0), 4.0);
        assert_eq!(quantile(&mut v, 0.0), 1.0);
    }

    #[test]
    fn continuous_schedule_matches_discrete_knots() {
        let discrete = NoiseSchedule::new(ScheduleKind::Linear, 100).unwrap();
        let cont = ContinuousSchedule::from_discrete(&discrete);
        for n in [0usize, 17, 99] {
            let t = (n + 1) as f64 / 100.0;
            let expected = discrete.sqrt_alphas_cumprod()[n];
            assert!((cont.alpha(t) - expected).abs() < 1e-12);
            assert!((cont.model_time(t) - n as f32).abs() < 1e-4);
        }
        assert!(cont.lambda(0.2) > cont.lambda(0.8));
    }

    #[test]
    fn history_is_bounded_by_capacity() {
        use burn_ndarray::NdArray;
        let device = Default::default();
        let mut h = SolverHistory::<NdArray<f32>>::new(2);
        for i in 0..5 {
            h.push(i as f64, Tensor::zeros([1, 1, 2, 2], &device));
        }
        assert_eq!(h.len(), 2);
        assert_eq!(h.back(0).0, 4.0);
        assert_eq!(h.back(1).0, 3.0);
    }
}
