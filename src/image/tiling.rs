use burn_core as burn;

use burn::tensor::{backend::Backend, Tensor};

use crate::error::{BinarizeError, Result};

/// White, the background of a scanned page.
pub const DEFAULT_PAD_FILL: f32 = 1.0;

/// Partition of a `[B, C, H, W]` image into `rows x cols` square tiles.
///
/// The grid remembers the unpadded size so [`merge`] can crop the padding
/// back off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub batch: usize,
    pub height: usize,
    pub width: usize,
    pub tile_size: usize,
    pub rows: usize,
    pub cols: usize,
}

impl TileGrid {
    pub fn new(batch: usize, height: usize, width: usize, tile_size: usize) -> Result<Self> {
        if tile_size == 0 {
            return Err(BinarizeError::config("tile size must be at least 1"));
        }
        if batch == 0 || height == 0 || width == 0 {
            return Err(BinarizeError::shape(format!(
                "cannot tile an empty image ({batch}x{height}x{width})"
            )));
        }
        Ok(Self {
            batch,
            height,
            width,
            tile_size,
            rows: height.div_ceil(tile_size),
            cols: width.div_ceil(tile_size),
        })
    }

    pub fn num_tiles(&self) -> usize {
        self.rows * self.cols
    }

    /// Batch size of the stacked tile tensor.
    pub fn tile_batch(&self) -> usize {
        self.num_tiles() * self.batch
    }

    pub fn padded_height(&self) -> usize {
        self.rows * self.tile_size
    }

    pub fn padded_width(&self) -> usize {
        self.cols * self.tile_size
    }
}

/// [`split_with_fill`] padding with white.
pub fn split<B: Backend>(image: Tensor<B, 4>, tile_size: usize) -> Result<(Tensor<B, 4>, TileGrid)> {
    split_with_fill(image, tile_size, DEFAULT_PAD_FILL)
}

/// Pad `image` up to a multiple of `tile_size` with `fill` and cut it into
/// non-overlapping tiles stacked along the batch axis.
///
/// Tiles are ordered row-major; tile `(i, j)` holds batch entries
/// `[(i * cols + j) * B, (i * cols + j + 1) * B)`.
pub fn split_with_fill<B: Backend>(
    image: Tensor<B, 4>,
    tile_size: usize,
    fill: f32,
) -> Result<(Tensor<B, 4>, TileGrid)> {
    let [b, c, h, w] = image.dims();
    let grid = TileGrid::new(b, h, w, tile_size)?;
    let (ph, pw) = (grid.padded_height(), grid.padded_width());

    let padded = if ph == h && pw == w {
        image
    } else {
        Tensor::<B, 4>::full([b, c, ph, pw], fill, &image.device())
            .slice_assign([0..b, 0..c, 0..h, 0..w], image)
    };

    let s = tile_size;
    let tiles = padded
        .reshape([b, c, grid.rows, s, grid.cols, s])
        .permute([2, 4, 0, 1, 3, 5])
        .reshape([grid.tile_batch(), c, s, s]);
    Ok((tiles, grid))
}

/// Reassemble tiles produced by [`split`] (or a model applied to them) and
/// crop back to the original height and width.
///
/// The channel count is taken from `tiles`, so per-tile model outputs with a
/// different channel count than the source image merge the same way.
pub fn merge<B: Backend>(grid: &TileGrid, tiles: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
    let [n, c, th, tw] = tiles.dims();
    let s = grid.tile_size;
    if n != grid.tile_batch() {
        return Err(BinarizeError::shape(format!(
            "expected {} tiles ({} x {} grid, batch {}), got {n}",
            grid.tile_batch(),
            grid.rows,
            grid.cols,
            grid.batch
        )));
    }
    if th != s || tw != s {
        return Err(BinarizeError::shape(format!("expected {s}x{s} tiles, got {th}x{tw}")));
    }

    let b = grid.batch;
    let canvas = tiles
        .reshape([grid.rows, grid.cols, b, c, s, s])
        .permute([2, 3, 0, 4, 1, 5])
        .reshape([b, c, grid.padded_height(), grid.padded_width()]);
    if grid.padded_height() == grid.height && grid.padded_width() == grid.width {
        return Ok(canvas);
    }
    Ok(canvas.slice([0..b, 0..c, 0..grid.height, 0..grid.width]))
}
