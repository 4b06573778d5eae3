//! Document image binarization with a conditional diffusion model on burn.
//!
//! An initial predictor produces a coarse mask; a diffusion sampler refines
//! the residual between that estimate and the clean binarization. Large pages
//! are tiled so fixed-size networks can run at native resolution.

// Alias burn-core as `burn` so derive macros and internal paths match expectations.
use burn_core as burn;

pub mod binarizer;
pub mod config;
pub mod data;
pub mod diffusion;
pub mod error;
pub mod image;
pub mod loader;
pub mod models;
pub mod telemetry;

pub use binarizer::{Binarized, Binarizer, TilingOptions};
pub use config::{BinarizeConfig, DataConfig, PredictionTarget, RunConfig, ScheduleKind, SolverKind};
pub use error::{BinarizeError, Result};
