use burn_core as burn;

use core::fmt;
use core::str::FromStr;
use std::path::Path;

use burn::config::Config;
use serde::{Deserialize, Serialize};

use crate::error::{BinarizeError, Result};

/// Variance schedule family used to build the betas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleKind {
    Linear,
    Cosine,
    Quadratic,
    Sigmoid,
}

/// Which reverse-process integrator drives sampling. Exactly one per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolverKind {
    /// Full-length ancestral / DDIM loop over every training timestep.
    Iterative,
    /// Multistep DPM-Solver++ over a short time partition.
    FastOde,
}

/// What the denoiser was trained to output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PredictionTarget {
    /// The clean residual `x_0`.
    #[serde(alias = "original")]
    PredictOriginal,
    /// The injected noise `eps`.
    #[serde(alias = "noise")]
    PredictNoise,
}

macro_rules! string_enum {
    ($ty:ident, $what:literal, { $($name:literal $(| $alias:literal)* => $variant:ident),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = BinarizeError;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($name $(| $alias)* => Ok(Self::$variant),)+
                    other => Err(BinarizeError::config(format!(
                        concat!("unrecognized ", $what, " `{}`"),
                        other
                    ))),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let name = match self {
                    $(Self::$variant => $name,)+
                };
                f.write_str(name)
            }
        }
    };
}

string_enum!(ScheduleKind, "schedule kind", {
    "linear" => Linear,
    "cosine" => Cosine,
    "quadratic" => Quadratic,
    "sigmoid" => Sigmoid,
});

string_enum!(SolverKind, "solver", {
    "iterative" | "ddim" => Iterative,
    "fast-ode" | "dpm-solver" => FastOde,
});

string_enum!(PredictionTarget, "prediction target", {
    "predict-original" | "original" | "x_start" => PredictOriginal,
    "predict-noise" | "noise" | "eps" => PredictNoise,
});

/// Options consumed by the sampling core.
#[derive(Config, Debug)]
pub struct BinarizeConfig {
    #[config(default = "ScheduleKind::Linear")]
    pub schedule: ScheduleKind,
    /// Number of training timesteps `T`.
    #[config(default = 100)]
    pub timesteps: usize,
    #[config(default = "SolverKind::Iterative")]
    pub solver: SolverKind,
    /// Step count `K` for the fast solver.
    #[config(default = 20)]
    pub solver_steps: usize,
    /// Number of stored model evaluations used per fast-solver update (1..=3).
    #[config(default = 1)]
    pub solver_order: usize,
    #[config(default = true)]
    pub lower_order_final: bool,
    #[config(default = "PredictionTarget::PredictOriginal")]
    pub prediction_target: PredictionTarget,
    /// Scale on the posterior standard deviation of the iterative sampler:
    /// 1.0 is ancestral DDPM sampling, 0.0 is deterministic DDIM.
    #[config(default = 1.0)]
    pub eta: f64,
    #[config(default = true)]
    pub dynamic_thresholding: bool,
    #[config(default = 0.995)]
    pub thresholding_ratio: f64,
    #[config(default = 1.0)]
    pub thresholding_max_val: f64,
    /// Process images at their own size by tiling instead of resizing.
    #[config(default = true)]
    pub native_resolution: bool,
    #[config(default = 256)]
    pub tile_size: usize,
    /// Square size images are resized to when `native_resolution` is off.
    #[config(default = 256)]
    pub image_size: usize,
    /// Value written into tile padding (white background).
    #[config(default = 1.0)]
    pub pad_fill: f32,
    /// Refined pixels strictly above this value are written as white.
    #[config(default = 0.5)]
    pub binarize_threshold: f32,
    #[config(default = 0)]
    pub seed: u64,
}

impl BinarizeConfig {
    /// Load a JSON config and validate it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let cfg = Self::load(path).map_err(|err| {
            BinarizeError::config(format!("cannot load {}: {err}", path.display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject option combinations the samplers cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.timesteps == 0 {
            return Err(BinarizeError::config("timesteps must be positive"));
        }
        if self.tile_size == 0 {
            return Err(BinarizeError::config("tile_size must be positive"));
        }
        if self.image_size == 0 {
            return Err(BinarizeError::config("image_size must be positive"));
        }
        if !(0.0..=1.0).contains(&self.eta) {
            return Err(BinarizeError::config(format!("eta must lie in [0, 1], got {}", self.eta)));
        }
        if self.solver == SolverKind::FastOde {
            if self.timesteps < 2 {
                return Err(BinarizeError::config("fast-ode solver needs at least 2 timesteps"));
            }
            if !(1..=3).contains(&self.solver_order) {
                return Err(BinarizeError::config(format!(
                    "solver_order must be 1, 2 or 3, got {}",
                    self.solver_order
                )));
            }
            if self.solver_steps < self.solver_order {
                return Err(BinarizeError::config(format!(
                    "solver_steps ({}) must be at least solver_order ({})",
                    self.solver_steps, self.solver_order
                )));
            }
            if self.dynamic_thresholding
                && (!(self.thresholding_ratio > 0.0 && self.thresholding_ratio <= 1.0)
                    || self.thresholding_max_val <= 0.0)
            {
                return Err(BinarizeError::config(
                    "dynamic thresholding needs ratio in (0, 1] and a positive max value",
                ));
            }
        }
        Ok(())
    }
}

/// Where images come from, where masks go, and which checkpoints to load.
#[derive(Config, Debug)]
pub struct DataConfig {
    pub image_dir: String,
    pub output_dir: String,
    #[config(default = "None")]
    pub ground_truth_dir: Option<String>,
    #[config(default = "None")]
    pub initial_predictor_weights: Option<String>,
    #[config(default = "None")]
    pub denoiser_weights: Option<String>,
    /// Apply the PyTorch → burn adapter when reading checkpoints.
    #[config(default = true)]
    pub from_pytorch: bool,
}

/// Top-level run description read by the `binarize` binary.
#[derive(Config, Debug)]
pub struct RunConfig {
    pub data: DataConfig,
    #[config(default = "BinarizeConfig::new()")]
    pub binarize: BinarizeConfig,
    #[config(default = "crate::models::ReferenceModelsConfig::new()")]
    pub models: crate::models::ReferenceModelsConfig,
}

impl RunConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let cfg = Self::load(path).map_err(|err| {
            BinarizeError::config(format!("cannot load {}: {err}", path.display()))
        })?;
        cfg.binarize.validate()?;
        Ok(cfg)
    }
}
