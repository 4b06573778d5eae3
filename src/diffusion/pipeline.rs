use burn_core as burn;

use burn::tensor::{backend::Backend, Tensor};

use crate::config::{BinarizeConfig, SolverKind};
use crate::error::Result;

use super::{DdimSampler, Denoiser, DpmSolver, DpmSolverOptions, NoiseSchedule, NoiseSource, Thresholding};

/// The reverse-process integrator chosen for a run.
#[derive(Debug, Clone)]
pub enum Sampler {
    Iterative(DdimSampler),
    FastOde(DpmSolver),
}

impl Sampler {
    pub fn kind(&self) -> SolverKind {
        match self {
            Self::Iterative(_) => SolverKind::Iterative,
            Self::FastOde(_) => SolverKind::FastOde,
        }
    }

    /// Denoiser calls per sampled batch.
    pub fn num_model_evaluations(&self) -> usize {
        match self {
            Self::Iterative(s) => s.num_steps(),
            Self::FastOde(s) => s.num_model_evaluations(),
        }
    }
}

/// Drives one sampler from initial noise to the refined residual.
///
/// Every option is resolved when the pipeline is built; sampling itself only
/// reads the precomputed schedule.
#[derive(Debug, Clone)]
pub struct DiffusionPipeline {
    pub sampler: Sampler,
}

impl DiffusionPipeline {
    pub fn new(sampler: Sampler) -> Self {
        Self { sampler }
    }

    pub fn from_config(cfg: &BinarizeConfig) -> Result<Self> {
        cfg.validate()?;
        let schedule = NoiseSchedule::new(cfg.schedule, cfg.timesteps)?;
        let sampler = match cfg.solver {
            SolverKind::Iterative => {
                Sampler::Iterative(DdimSampler::new(schedule, cfg.prediction_target, cfg.eta)?)
            }
            SolverKind::FastOde => {
                let thresholding = if cfg.dynamic_thresholding {
                    Thresholding::Dynamic {
                        ratio: cfg.thresholding_ratio,
                        max_val: cfg.thresholding_max_val,
                    }
                } else {
                    Thresholding::None
                };
                let options = DpmSolverOptions {
                    steps: cfg.solver_steps,
                    order: cfg.solver_order,
                    lower_order_final: cfg.lower_order_final,
                    thresholding,
                    target: cfg.prediction_target,
                };
                Sampler::FastOde(DpmSolver::new(&schedule, options)?)
            }
        };
        Ok(Self::new(sampler))
    }

    /// Draw the initial noise shaped like `condition` and sample a residual.
    pub fn run<B: Backend, M: Denoiser<B>>(
        &self,
        model: &M,
        condition: Tensor<B, 4>,
        noise: &mut NoiseSource,
    ) -> Result<Tensor<B, 4>> {
        let x_t = noise.like(&condition);
        self.run_from(model, x_t, condition, noise)
    }

    /// Sample a residual starting from a caller-supplied `x_T`.
    pub fn run_from<B: Backend, M: Denoiser<B>>(
        &self,
        model: &M,
        x_t: Tensor<B, 4>,
        condition: Tensor<B, 4>,
        noise: &mut NoiseSource,
    ) -> Result<Tensor<B, 4>> {
        match &self.sampler {
            Sampler::Iterative(s) => s.sample(model, x_t, condition, noise),
            Sampler::FastOde(s) => s.sample(model, x_t, condition),
        }
    }
}
