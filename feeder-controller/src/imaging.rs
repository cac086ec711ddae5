use std::path::{Path, PathBuf};

use feeder_core::{ArtifactName, MaxDimension, compute_target_size};
use image::imageops::FilterType;
use tracing::debug;

use crate::error::ImageError;

/// A downscaled copy of a photo, stored next to it as `<prefix><name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeVariant {
    pub prefix: String,
    pub max: MaxDimension,
}

/// Write every variant of `dir/original` and return the new files.
///
/// The original is decoded once and never modified. Decoding and Lanczos3
/// resampling run on the blocking thread pool.
pub async fn create_variants(
    dir: &Path,
    original: &ArtifactName,
    variants: &[ResizeVariant],
) -> Result<Vec<(ArtifactName, PathBuf)>, ImageError> {
    let source = dir.join(original.as_str());
    let targets: Vec<_> = variants
        .iter()
        .map(|variant| {
            let name = original.with_prefix(&variant.prefix);
            let path = dir.join(name.as_str());
            (name, path, variant.max)
        })
        .collect();

    tokio::task::spawn_blocking(move || {
        let image = image::open(&source)?;
        let (width, height) = (image.width(), image.height());

        let mut written = Vec::with_capacity(targets.len());
        for (name, path, max) in targets {
            let size = compute_target_size(width, height, max);
            debug!(file = %name, width = size.width, height = size.height, "Writing resized variant");

            if size.width == width && size.height == height {
                image.save(&path)?;
            } else {
                image
                    .resize_exact(size.width, size.height, FilterType::Lanczos3)
                    .save(&path)?;
            }
            written.push((name, path));
        }
        Ok::<_, ImageError>(written)
    })
    .await
    .map_err(|e| ImageError::Worker(e.to_string()))?
}
