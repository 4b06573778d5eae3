use burn_core as burn;

use std::path::{Path, PathBuf};

use burn::tensor::{backend::Backend, Tensor};

use crate::error::{BinarizeError, Result};
use crate::image::{load_image, load_image_resized, load_mask};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// One entry of a test directory: an input page and its optional ground truth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSample {
    pub name: String,
    pub image_path: PathBuf,
    pub ground_truth_path: Option<PathBuf>,
}

/// Tensors of a loaded [`DocumentSample`].
#[derive(Debug, Clone)]
pub struct LoadedSample<B: Backend> {
    pub name: String,
    /// `[1, 3, H, W]` in `[0, 1]`.
    pub image: Tensor<B, 4>,
    /// `[1, 1, H, W]` in `[0, 1]`.
    pub ground_truth: Option<Tensor<B, 4>>,
}

impl DocumentSample {
    /// Load the page, resized to `resize x resize` when given.
    pub fn load<B: Backend>(&self, resize: Option<usize>, device: &B::Device) -> Result<LoadedSample<B>> {
        let image = match resize {
            Some(size) => load_image_resized(&self.image_path, size, device)?,
            None => load_image(&self.image_path, device)?,
        };
        let ground_truth = self.ground_truth_path.as_deref().map(|p| load_mask(p, device)).transpose()?;
        Ok(LoadedSample { name: self.name.clone(), image, ground_truth })
    }
}

/// Image files of a directory, sorted by file name, paired with same-named
/// files of an optional ground-truth directory.
#[derive(Debug, Clone, Default)]
pub struct DocumentDataset {
    samples: Vec<DocumentSample>,
}

impl DocumentDataset {
    pub fn open(image_dir: &Path, ground_truth_dir: Option<&Path>) -> Result<Self> {
        let entries = std::fs::read_dir(image_dir)
            .map_err(|source| BinarizeError::Io { path: image_dir.to_path_buf(), source })?;

        let mut samples = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| BinarizeError::Io { path: image_dir.to_path_buf(), source })?;
            let path = entry.path();
            if !path.is_file() || !has_image_extension(&path) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let ground_truth_path = ground_truth_dir.map(|dir| dir.join(&name)).filter(|p| p.is_file());
            samples.push(DocumentSample { name, image_path: path, ground_truth_path });
        }
        samples.sort_by(|a, b| a.name.cmp(&b.name));
        tracing::debug!(dir = %image_dir.display(), count = samples.len(), "opened document dataset");
        Ok(Self { samples })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DocumentSample> {
        self.samples.iter()
    }
}

impl<'a> IntoIterator for &'a DocumentDataset {
    type Item = &'a DocumentSample;
    type IntoIter = core::slice::Iter<'a, DocumentSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
