use burn_core as burn;

use burn::module::Module;
use burn_store::SafetensorsStoreError;
use burn_store::{ApplyResult, ModuleSnapshot, PyTorchToBurnAdapter, SafetensorsStore};
use burn_tensor::backend::Backend;

use std::path::Path;

use crate::error::{BinarizeError, Result};

/// How a checkpoint is mapped onto a module.
#[derive(Clone, Debug)]
pub struct CheckpointConfig {
    pub allow_partial: bool,
    pub validate: bool,
    /// Apply the PyTorch → burn adapter (linear weight transpose, norm renames).
    pub from_pytorch: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self { allow_partial: false, validate: true, from_pytorch: true }
    }
}

/// Load a SafeTensors checkpoint into `model`. Must complete before sampling.
///
/// The adapter is on by default because the binarization weights are trained
/// and exported from PyTorch.
pub fn load_checkpoint<B: Backend, M>(
    model: &mut M,
    path: &Path,
    cfg: &CheckpointConfig,
) -> Result<ApplyResult>
where
    M: Module<B> + Clone,
{
    let bytes = std::fs::read(path)
        .map_err(|source| BinarizeError::Io { path: path.to_path_buf(), source })?;
    let mut store = SafetensorsStore::from_bytes(Some(bytes));
    if cfg.from_pytorch {
        store = store.with_from_adapter(PyTorchToBurnAdapter);
    }
    if cfg.allow_partial {
        store = store.allow_partial(true);
    }
    store = store.validate(cfg.validate);
    let result = model
        .load_from(&mut store)
        .map_err(|err: SafetensorsStoreError| BinarizeError::Checkpoint {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    tracing::info!(path = %path.display(), "loaded checkpoint");
    Ok(result)
}
