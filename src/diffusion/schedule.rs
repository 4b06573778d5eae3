use core::f64::consts::FRAC_PI_2;

use crate::config::ScheduleKind;
use crate::error::{BinarizeError, Result};

use super::utils::linspace;

/// Betas are capped below 1 so every `alpha = 1 - beta` stays positive.
const MAX_BETA: f64 = 0.9999;
const MIN_COSINE_BETA: f64 = 1e-4;
const COSINE_OFFSET: f64 = 0.008;

/// Discrete variance schedule with every derived constant precomputed.
///
/// Built once, then only read. All arrays have length `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseSchedule {
    kind: ScheduleKind,
    betas: Vec<f64>,
    alphas: Vec<f64>,
    alphas_cumprod: Vec<f64>,
    alphas_cumprod_prev: Vec<f64>,
    sqrt_alphas_cumprod: Vec<f64>,
    sqrt_one_minus_alphas_cumprod: Vec<f64>,
    posterior_variance: Vec<f64>,
    log_alphas: Vec<f64>,
}

impl NoiseSchedule {
    pub fn new(kind: ScheduleKind, num_timesteps: usize) -> Result<Self> {
        if num_timesteps == 0 {
            return Err(BinarizeError::config("schedule needs at least one timestep"));
        }
        Ok(Self::from_betas(kind, betas_for(kind, num_timesteps)))
    }

    /// Parse the schedule kind from its config name.
    pub fn from_name(kind: &str, num_timesteps: usize) -> Result<Self> {
        Self::new(kind.parse()?, num_timesteps)
    }

    fn from_betas(kind: ScheduleKind, betas: Vec<f64>) -> Self {
        let n = betas.len();
        let alphas: Vec<f64> = betas.iter().map(|b| 1.0 - b).collect();

        let mut alphas_cumprod = Vec::with_capacity(n);
        let mut log_alphas = Vec::with_capacity(n);
        let mut cumprod = 1.0;
        let mut log_sum = 0.0;
        for &a in &alphas {
            cumprod *= a;
            log_sum += 0.5 * a.ln();
            alphas_cumprod.push(cumprod);
            log_alphas.push(log_sum);
        }

        let mut alphas_cumprod_prev = Vec::with_capacity(n);
        alphas_cumprod_prev.push(1.0);
        alphas_cumprod_prev.extend_from_slice(&alphas_cumprod[..n - 1]);

        let posterior_variance = (0..n)
            .map(|t| {
                if t == 0 {
                    0.0
                } else {
                    betas[t] * (1.0 - alphas_cumprod_prev[t]) / (1.0 - alphas_cumprod[t])
                }
            })
            .collect();

        Self {
            kind,
            sqrt_alphas_cumprod: alphas_cumprod.iter().map(|a| a.sqrt()).collect(),
            sqrt_one_minus_alphas_cumprod: alphas_cumprod.iter().map(|a| (1.0 - a).sqrt()).collect(),
            betas,
            alphas,
            alphas_cumprod,
            alphas_cumprod_prev,
            posterior_variance,
            log_alphas,
        }
    }

    pub fn kind(&self) -> ScheduleKind {
        self.kind
    }

    /// Number of discrete timesteps `T`.
    pub fn len(&self) -> usize {
        self.betas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.betas.is_empty()
    }

    pub fn betas(&self) -> &[f64] {
        &self.betas
    }

    pub fn alphas(&self) -> &[f64] {
        &self.alphas
    }

    /// Cumulative signal retention `alpha_bar_t`.
    pub fn alphas_cumprod(&self) -> &[f64] {
        &self.alphas_cumprod
    }

    /// `alpha_bar_{t-1}`, with 1.0 at `t = 0`.
    pub fn alphas_cumprod_prev(&self) -> &[f64] {
        &self.alphas_cumprod_prev
    }

    pub fn sqrt_alphas_cumprod(&self) -> &[f64] {
        &self.sqrt_alphas_cumprod
    }

    pub fn sqrt_one_minus_alphas_cumprod(&self) -> &[f64] {
        &self.sqrt_one_minus_alphas_cumprod
    }

    /// Variance of `q(x_{t-1} | x_t, x_0)`; exactly zero at `t = 0`.
    pub fn posterior_variance(&self) -> &[f64] {
        &self.posterior_variance
    }

    /// `log(sqrt(alpha_bar_t))`, the knots of the continuous-time schedule.
    pub fn log_alphas(&self) -> &[f64] {
        &self.log_alphas
    }
}

fn betas_for(kind: ScheduleKind, n: usize) -> Vec<f64> {
    match kind {
        ScheduleKind::Linear => {
            let scale = 1000.0 / n as f64;
            linspace(1e-4 * scale, 0.02 * scale, n)
                .into_iter()
                .map(|b| b.min(MAX_BETA))
                .collect()
        }
        ScheduleKind::Cosine => {
            let f = |t: usize| {
                let x = (t as f64 / n as f64 + COSINE_OFFSET) / (1.0 + COSINE_OFFSET);
                (x * FRAC_PI_2).cos().powi(2)
            };
            (0..n)
                .map(|t| (1.0 - f(t + 1) / f(t)).clamp(MIN_COSINE_BETA, MAX_BETA))
                .collect()
        }
        ScheduleKind::Quadratic => linspace(1e-4f64.sqrt(), 0.02f64.sqrt(), n)
            .into_iter()
            .map(|b| b * b)
            .collect(),
        ScheduleKind::Sigmoid => linspace(-6.0, 6.0, n)
            .into_iter()
            .map(|x| 1.0 / (1.0 + (-x).exp()) * (0.02 - 1e-4) + 1e-4)
            .collect(),
    }
}
