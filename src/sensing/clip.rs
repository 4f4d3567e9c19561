//! CLIP ViT-B/32 encoders through fastembed.
//!
//! Image and text towers share one 512-dimensional space, so screens can be
//! scored directly against label text. Weights are downloaded on first use
//! into the configured cache directory.

use crate::core::embedding::Embedding;
use crate::sensing::embedder::{EmbedError, Embedder};
use fastembed::{
    EmbeddingModel, ImageEmbedding, ImageEmbeddingModel, ImageInitOptions, InitOptions,
    TextEmbedding,
};
use image::RgbImage;
use std::path::PathBuf;
use tracing::info;

/// Output dimension of both CLIP towers.
pub const CLIP_DIM: usize = 512;

pub struct ClipEmbedder {
    text: TextEmbedding,
    image: ImageEmbedding,
    /// fastembed reads images from disk
    scratch: PathBuf,
}

impl ClipEmbedder {
    /// Load both towers, downloading weights into `cache_dir` if needed.
    pub fn new(cache_dir: PathBuf, scratch: PathBuf) -> Result<Self, EmbedError> {
        let text = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::ClipVitB32)
                .with_cache_dir(cache_dir.clone())
                .with_show_download_progress(true),
        )
        .map_err(model_error)?;
        let image = ImageEmbedding::try_new(
            ImageInitOptions::new(ImageEmbeddingModel::ClipVitB32)
                .with_cache_dir(cache_dir.clone())
                .with_show_download_progress(true),
        )
        .map_err(model_error)?;

        info!(cache = %cache_dir.display(), "CLIP encoders loaded");
        Ok(Self {
            text,
            image,
            scratch,
        })
    }
}

impl Embedder for ClipEmbedder {
    fn dim(&self) -> usize {
        CLIP_DIM
    }

    fn embed_image(&self, image: &RgbImage) -> Result<Embedding, EmbedError> {
        image
            .save(&self.scratch)
            .map_err(|e| EmbedError::Image(e.to_string()))?;
        let vector = self
            .image
            .embed(vec![&self.scratch], None)
            .map_err(model_error)?
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Model("image encoder returned no vector".into()))?;
        Ok(Embedding::with_dim(vector, CLIP_DIM)?)
    }

    fn embed_text(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbedError> {
        self.text
            .embed(texts.to_vec(), None)
            .map_err(model_error)?
            .into_iter()
            .map(|vector| Ok(Embedding::with_dim(vector, CLIP_DIM)?))
            .collect()
    }
}

fn model_error(err: impl std::fmt::Display) -> EmbedError {
    EmbedError::Model(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    #[ignore = "downloads CLIP weights"]
    fn test_clip_vectors_share_one_space() {
        let dir = tempfile::tempdir().unwrap();
        let embedder =
            ClipEmbedder::new(dir.path().join("models"), dir.path().join("scratch.png")).unwrap();

        let red = embedder
            .embed_image(&RgbImage::from_pixel(64, 64, Rgb([220, 20, 20])))
            .unwrap();
        let labels = embedder
            .embed_text(&["a plain red square".to_string(), "a dog".to_string()])
            .unwrap();

        assert_eq!(red.dim(), CLIP_DIM);
        assert!(red.dot(&labels[0]).unwrap() > red.dot(&labels[1]).unwrap());
    }
}
