use burn_core as burn;

use std::path::{Path, PathBuf};

use burn::tensor::{backend::Backend, Tensor, TensorData};
use ::image::imageops::FilterType;
use ::image::{DynamicImage, GrayImage};

use crate::error::{BinarizeError, Result};

fn open(path: &Path) -> Result<DynamicImage> {
    ::image::open(path).map_err(|source| BinarizeError::Image { path: path.to_path_buf(), source })
}

fn rgb_to_tensor<B: Backend>(img: &::image::RgbImage, device: &B::Device) -> Tensor<B, 4> {
    let (w, h) = img.dimensions();
    let (w, h) = (w as usize, h as usize);
    let mut values = vec![0.0f32; 3 * h * w];
    for (x, y, px) in img.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for ch in 0..3 {
            values[ch * h * w + y * w + x] = px[ch] as f32 / 255.0;
        }
    }
    Tensor::from_data(TensorData::new(values, [1, 3, h, w]), device)
}

/// Read an image file as a `[1, 3, H, W]` tensor in `[0, 1]`.
pub fn load_image<B: Backend>(path: &Path, device: &B::Device) -> Result<Tensor<B, 4>> {
    Ok(rgb_to_tensor(&open(path)?.to_rgb8(), device))
}

/// Read an image and resize it to `size x size`.
pub fn load_image_resized<B: Backend>(path: &Path, size: usize, device: &B::Device) -> Result<Tensor<B, 4>> {
    let img = open(path)?.resize_exact(size as u32, size as u32, FilterType::Triangle);
    Ok(rgb_to_tensor(&img.to_rgb8(), device))
}

/// Read a single-channel image as a `[1, 1, H, W]` tensor in `[0, 1]`.
pub fn load_mask<B: Backend>(path: &Path, device: &B::Device) -> Result<Tensor<B, 4>> {
    let img = open(path)?.to_luma8();
    let (w, h) = img.dimensions();
    let values: Vec<f32> = img.into_raw().into_iter().map(|v| v as f32 / 255.0).collect();
    Ok(Tensor::from_data(TensorData::new(values, [1, 1, h as usize, w as usize]), device))
}

/// Turn a `[1, C, H, W]` tensor into an 8-bit grayscale image.
///
/// Channels are averaged; pixels strictly above `threshold` become 255 and
/// everything else 0.
pub fn to_binary_image<B: Backend>(mask: Tensor<B, 4>, threshold: f32) -> Result<GrayImage> {
    let [b, c, h, w] = mask.dims();
    if b != 1 || c == 0 {
        return Err(BinarizeError::shape(format!(
            "binary output expects one image with channels, got {:?}",
            mask.dims()
        )));
    }
    let gray = if c == 1 { mask } else { mask.mean_dim(1) };
    let values = gray
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| BinarizeError::TensorData(format!("{err:?}")))?;
    let pixels = values.into_iter().map(|v| if v > threshold { 255u8 } else { 0u8 }).collect();
    GrayImage::from_raw(w as u32, h as u32, pixels)
        .ok_or_else(|| BinarizeError::shape(format!("cannot build a {w}x{h} image")))
}

/// `<dir>/<stem of name>.png`.
pub fn output_path(dir: &Path, name: &str) -> PathBuf {
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    dir.join(format!("{stem}.png"))
}

/// Threshold `mask` and write it to `<dir>/<stem>.png`, creating `dir`.
pub fn save_binary_mask<B: Backend>(mask: Tensor<B, 4>, threshold: f32, dir: &Path, name: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|source| BinarizeError::Io { path: dir.to_path_buf(), source })?;
    let path = output_path(dir, name);
    to_binary_image(mask, threshold)?
        .save(&path)
        .map_err(|source| BinarizeError::Image { path: path.clone(), source })?;
    Ok(path)
}
