//! Embedding backends.
//!
//! The recorder and classifier only see the [`Embedder`] trait. Any inference
//! backend that maps screenshots and strings into one shared vector space can
//! sit behind it.

use crate::core::embedding::{Embedding, EmbeddingError, EMBEDDING_DIM};
use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;

/// Embedding failures. Recoverable per event.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("cannot embed image: {0}")]
    Image(String),
    #[error("model invocation failed: {0}")]
    Model(String),
    #[error(transparent)]
    Invalid(#[from] EmbeddingError),
}

/// Vision/text encoder with a shared output space.
///
/// Implementations must be deterministic for identical input and return
/// unit-normalised vectors of length [`Embedder::dim`].
pub trait Embedder: Send {
    fn dim(&self) -> usize;

    fn embed_image(&self, image: &RgbImage) -> Result<Embedding, EmbedError>;

    fn embed_text(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbedError>;
}

/// Model-free embedder.
///
/// Images become a mean-centred luminance thumbnail with one cell per
/// dimension; text becomes signed hashed character trigrams. Screens that
/// look alike land close together, which is what change detection needs.
/// Image/text similarity is not meaningful, so labels assigned with this
/// backend are placeholders. Build with the `clip` feature and set
/// `"embedder": "clip"` for real labels.
#[derive(Debug, Clone)]
pub struct SketchEmbedder {
    dim: usize,
    grid: (u32, u32),
}

impl SketchEmbedder {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self {
            dim,
            grid: grid_for(dim),
        }
    }

    fn embed_one_text(&self, text: &str) -> Result<Embedding, EmbedError> {
        let mut values = vec![0.0f32; self.dim];
        let chars: Vec<char> = std::iter::once(' ')
            .chain(text.to_lowercase().chars())
            .chain(std::iter::once(' '))
            .collect();

        for gram in chars.windows(3) {
            let hash = fnv1a(gram);
            let slot = (hash % self.dim as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            values[slot] += sign;
        }

        normalized_or_uniform(values)
    }
}

impl Default for SketchEmbedder {
    fn default() -> Self {
        Self::new(EMBEDDING_DIM)
    }
}

impl Embedder for SketchEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_image(&self, image: &RgbImage) -> Result<Embedding, EmbedError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(EmbedError::Image("image has no pixels".to_string()));
        }

        let (w, h) = self.grid;
        let thumb = imageops::resize(image, w, h, FilterType::Triangle);
        let luma: Vec<f32> = thumb
            .pixels()
            .map(|p| {
                let [r, g, b] = p.0;
                (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32) / 255.0
            })
            .collect();

        let mean = luma.iter().sum::<f32>() / luma.len() as f32;
        normalized_or_uniform(luma.into_iter().map(|v| v - mean).collect())
    }

    fn embed_text(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbedError> {
        texts.iter().map(|t| self.embed_one_text(t)).collect()
    }
}

/// Thumbnail grid with exactly `dim` cells, as square as the factors allow.
fn grid_for(dim: usize) -> (u32, u32) {
    let mut h = (dim as f64).sqrt() as usize;
    while h > 1 && dim % h != 0 {
        h -= 1;
    }
    let h = h.max(1);
    ((dim / h) as u32, h as u32)
}

/// Flat inputs (blank screens, empty strings) map to the uniform vector.
fn normalized_or_uniform(values: Vec<f32>) -> Result<Embedding, EmbedError> {
    let len = values.len();
    match Embedding::normalized(values) {
        Ok(e) => Ok(e),
        Err(EmbeddingError::ZeroNorm) => Ok(Embedding::normalized(vec![1.0; len])?),
        Err(e) => Err(e.into()),
    }
}

fn fnv1a(chars: &[char]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for c in chars {
        let mut buf = [0u8; 4];
        for byte in c.encode_utf8(&mut buf).as_bytes() {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_grid_matches_dim() {
        assert_eq!(grid_for(512), (32, 16));
        assert_eq!(grid_for(4), (2, 2));
        assert_eq!(grid_for(7), (7, 1));
    }

    #[test]
    fn test_image_embedding_is_deterministic_and_normalized() {
        let embedder = SketchEmbedder::new(64);
        let img = RgbImage::from_fn(40, 30, |x, y| Rgb([(x * 6) as u8, (y * 8) as u8, 10]));
        let a = embedder.embed_image(&img).unwrap();
        let b = embedder.embed_image(&img).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dim(), 64);
        assert!((a.dot(&a).unwrap() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_blank_image_embeds() {
        let embedder = SketchEmbedder::new(16);
        let img = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));
        assert!(embedder.embed_image(&img).is_ok());
        assert!(embedder.embed_image(&RgbImage::new(0, 0)).is_err());
    }

    #[test]
    fn test_different_screens_are_far_apart() {
        let embedder = SketchEmbedder::new(64);
        let shade = |lit: bool| if lit { Rgb([255; 3]) } else { Rgb([0; 3]) };
        let left = RgbImage::from_fn(32, 32, |x, _| shade(x < 16));
        let top = RgbImage::from_fn(32, 32, |_, y| shade(y < 16));
        let a = embedder.embed_image(&left).unwrap();
        let b = embedder.embed_image(&top).unwrap();
        assert!(a.distance(&b).unwrap() > 0.5);
    }

    #[test]
    fn test_text_similarity_prefers_overlap() {
        let embedder = SketchEmbedder::new(256);
        let vecs = embedder
            .embed_text(&[
                "fix the login bug".to_string(),
                "fixing a login bug".to_string(),
                "quarterly revenue spreadsheet".to_string(),
            ])
            .unwrap();
        let near = vecs[0].dot(&vecs[1]).unwrap();
        let far = vecs[0].dot(&vecs[2]).unwrap();
        assert!(near > far);
    }
}
