//! Small reference networks satisfying the predictor and denoiser contracts.
//!
//! The sampling core only sees the [`crate::diffusion::InitialPredictor`] and
//! [`crate::diffusion::Denoiser`] traits; any network with the same tensor
//! contract can replace these.

use burn_core as burn;

use burn::config::Config;
use burn::tensor::backend::Backend;

mod conv;

pub use conv::*;

/// Both reference networks of the two-stage model.
#[derive(Config, Debug)]
pub struct ReferenceModelsConfig {
    #[config(default = "ConvPredictorConfig::new()")]
    pub predictor: ConvPredictorConfig,
    #[config(default = "ConvDenoiserConfig::new()")]
    pub denoiser: ConvDenoiserConfig,
}

impl ReferenceModelsConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> (ConvPredictor<B>, ConvDenoiser<B>) {
        (self.predictor.init::<B>(device), self.denoiser.init::<B>(device))
    }
}
