use burn_core as burn;

use std::time::Instant;

use burn::tensor::{backend::Backend, Tensor};

use crate::config::BinarizeConfig;
use crate::diffusion::{CountingDenoiser, Denoiser, DiffusionPipeline, InitialPredictor, NoiseSource};
use crate::error::{BinarizeError, Result};
use crate::image::{merge, split_with_fill, TileGrid};
use crate::telemetry::{ImageRecord, RunContext};

/// Native-resolution tiling parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilingOptions {
    pub tile_size: usize,
    pub fill: f32,
}

/// Outputs of one binarization, all at the input resolution.
#[derive(Debug, Clone)]
pub struct Binarized<B: Backend> {
    /// Coarse estimate of the initial predictor.
    pub initial: Tensor<B, 4>,
    /// Residual produced by the diffusion sampler.
    pub residual: Tensor<B, 4>,
    /// `clamp(initial + residual, 0, 1)`.
    pub refined: Tensor<B, 4>,
    /// `refined > threshold` as 0.0 / 1.0.
    pub mask: Tensor<B, 4>,
}

/// Two-stage binarizer: initial prediction, diffusion refinement of the
/// residual, optional tiling around both, and final thresholding.
pub struct Binarizer<P, D> {
    predictor: P,
    denoiser: D,
    diffusion: DiffusionPipeline,
    tiling: Option<TilingOptions>,
    threshold: f32,
}

impl<P, D> Binarizer<P, D> {
    pub fn new(
        predictor: P,
        denoiser: D,
        diffusion: DiffusionPipeline,
        tiling: Option<TilingOptions>,
        threshold: f32,
    ) -> Self {
        Self { predictor, denoiser, diffusion, tiling, threshold }
    }

    pub fn from_config(predictor: P, denoiser: D, cfg: &BinarizeConfig) -> Result<Self> {
        let diffusion = DiffusionPipeline::from_config(cfg)?;
        let tiling = cfg
            .native_resolution
            .then_some(TilingOptions { tile_size: cfg.tile_size, fill: cfg.pad_fill });
        Ok(Self::new(predictor, denoiser, diffusion, tiling, cfg.binarize_threshold))
    }

    pub fn diffusion(&self) -> &DiffusionPipeline {
        &self.diffusion
    }

    pub fn tiling(&self) -> Option<TilingOptions> {
        self.tiling
    }

    /// Binarize a `[B, C, H, W]` image in `[0, 1]`.
    ///
    /// Any model error aborts this image and is returned unchanged.
    pub fn binarize<B>(
        &self,
        name: &str,
        image: Tensor<B, 4>,
        noise: &mut NoiseSource,
        ctx: &mut RunContext,
    ) -> Result<Binarized<B>>
    where
        B: Backend,
        P: InitialPredictor<B>,
        D: Denoiser<B>,
    {
        let started = Instant::now();
        let [_, _, height, width] = image.dims();
        let _span = tracing::debug_span!("binarize", image = name, height, width).entered();

        let (input, grid) = match self.tiling {
            Some(t) => {
                let (tiles, grid) = split_with_fill(image, t.tile_size, t.fill)?;
                tracing::debug!(rows = grid.rows, cols = grid.cols, "split into tiles");
                (tiles, Some(grid))
            }
            None => (image, None),
        };

        let initial = self.predictor.predict(input.clone())?;
        check_prediction(&input, &initial)?;

        let denoiser = CountingDenoiser::new(&self.denoiser);
        let residual = self.diffusion.run(&denoiser, initial.clone(), noise)?;
        let refined = residual.clone() + initial.clone();

        let restore = |t: Tensor<B, 4>, grid: &Option<TileGrid>| match grid {
            Some(g) => merge(g, t),
            None => Ok(t),
        };
        let refined = restore(refined, &grid)?.clamp(0.0, 1.0);
        let initial = restore(initial, &grid)?;
        let residual = restore(residual, &grid)?;
        let mask = refined.clone().greater_elem(self.threshold).float();

        ctx.record(ImageRecord {
            name: name.to_string(),
            height,
            width,
            tiles: grid.map_or(1, |g| g.num_tiles()),
            model_evaluations: denoiser.calls(),
            elapsed: started.elapsed(),
        });
        Ok(Binarized { initial, residual, refined, mask })
    }
}

fn check_prediction<B: Backend>(input: &Tensor<B, 4>, initial: &Tensor<B, 4>) -> Result<()> {
    let [b, _, h, w] = input.dims();
    let [pb, _, ph, pw] = initial.dims();
    if (b, h, w) != (pb, ph, pw) {
        return Err(BinarizeError::shape(format!(
            "initial predictor returned {:?} for an input of {:?}",
            initial.dims(),
            input.dims()
        )));
    }
    Ok(())
}
