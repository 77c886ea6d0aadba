//! Embedding model interface and the built-in Harmonic Token Projection model
//!
//! The matcher never owns a global model: every build, query and
//! classification receives an `EmbeddingModel` explicitly.
//!
//! `HarmonicEmbedder` is a deterministic, training-free projection:
//! - No neural network required
//! - Deterministic (same input → same output)
//! - Text is tokenized into words, images into fixed byte windows
//! - Every vector is L2 normalized
//!
//! It is not a visual model. It satisfies the collaborator contract so the
//! index lifecycle runs end to end without an external inference service.

use std::f64::consts::PI;

use super::error::EmbeddingError;
use crate::core::image::ImageData;

/// Embedding dimension (2 * number of coprime moduli)
pub const EMBEDDING_DIM: usize = 384;

/// Model identifier recorded in persisted indexes
pub const HARMONIC_MODEL_ID: &str = "htp-v1";

/// Number of coprime moduli for harmonic projection
const NUM_MODULI: usize = EMBEDDING_DIM / 2;

/// Maximum token length (Unicode code points)
const MAX_TOKEN_LENGTH: usize = 64;

/// Bytes per image token
const IMAGE_WINDOW: usize = 8;

/// Tolerance used when checking unit normalization
pub const UNIT_NORM_TOLERANCE: f32 = 1e-3;

/// Coprime moduli for modular decomposition
/// Using first NUM_MODULI primes for guaranteed coprimality
static COPRIME_MODULI: &[u64] = &[
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71,
    73, 79, 83, 89, 97, 101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151,
    157, 163, 167, 173, 179, 181, 191, 193, 197, 199, 211, 223, 227, 229, 233,
    239, 241, 251, 257, 263, 269, 271, 277, 281, 283, 293, 307, 311, 313, 317,
    331, 337, 347, 349, 353, 359, 367, 373, 379, 383, 389, 397, 401, 409, 419,
    421, 431, 433, 439, 443, 449, 457, 461, 463, 467, 479, 487, 491, 499, 503,
    509, 521, 523, 541, 547, 557, 563, 569, 571, 577, 587, 593, 599, 601, 607,
    613, 617, 619, 631, 641, 643, 647, 653, 659, 661, 673, 677, 683, 691, 701,
    709, 719, 727, 733, 739, 743, 751, 757, 761, 769, 773, 787, 797, 809, 811,
    821, 823, 827, 829, 839, 853, 857, 859, 863, 877, 881, 883, 887, 907, 911,
    919, 929, 937, 941, 947, 953, 967, 971, 977, 983, 991, 997, 1009, 1013,
    1019, 1021, 1031, 1033, 1039, 1049, 1051, 1061, 1063, 1069, 1087, 1091,
    1093, 1097, 1103, 1109, 1117, 1123, 1129, 1151, 1153, 1163, 1171, 1181,
];

/// Trait for embedding models.
///
/// Implementations must be deterministic for a fixed `model_id`, and must
/// return unit-normalized vectors of length `dimension()`.
pub trait EmbeddingModel {
    /// Identifier stored in the persisted index
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Embed a single image.
    fn embed_image(&self, image: &ImageData) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a batch of images.
    ///
    /// The outer error means the model could not serve the batch at all;
    /// inner errors belong to individual images. Default implementation
    /// calls `embed_image` for each image and promotes collaborator-level
    /// failures to the outer error.
    #[allow(clippy::type_complexity)]
    fn embed_image_batch(
        &self,
        images: &[ImageData],
    ) -> Result<Vec<Result<Vec<f32>, EmbeddingError>>, EmbeddingError> {
        let mut out = Vec::with_capacity(images.len());
        for image in images {
            match self.embed_image(image) {
                Err(e) if e.is_collaborator_failure() => return Err(e),
                result => out.push(result),
            }
        }
        Ok(out)
    }

    /// Embed a text prompt (used by classification).
    fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Harmonic Token Projection embedder
pub struct HarmonicEmbedder {
    moduli: Vec<u64>,
}

impl HarmonicEmbedder {
    pub fn new() -> Self {
        Self {
            moduli: COPRIME_MODULI[..NUM_MODULI].to_vec(),
        }
    }

    /// Mean-pool harmonic projections of integer tokens, then L2 normalize
    fn project<I>(&self, tokens: I) -> Option<Vec<f32>>
    where
        I: IntoIterator<Item = u64>,
    {
        let mut sum_embedding = vec![0.0f64; EMBEDDING_DIM];
        let mut count = 0usize;

        for n in tokens {
            for (i, &m) in self.moduli.iter().enumerate() {
                let r = n % m;
                let theta = 2.0 * PI * (r as f64) / (m as f64);
                sum_embedding[2 * i] += theta.sin();
                sum_embedding[2 * i + 1] += theta.cos();
            }
            count += 1;
        }

        if count == 0 {
            return None;
        }

        for val in &mut sum_embedding {
            *val /= count as f64;
        }

        let norm: f64 = sum_embedding.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm == 0.0 {
            return None;
        }

        Some(sum_embedding.iter().map(|x| (*x / norm) as f32).collect())
    }
}

impl Default for HarmonicEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingModel for HarmonicEmbedder {
    fn model_id(&self) -> &str {
        HARMONIC_MODEL_ID
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    fn embed_image(&self, image: &ImageData) -> Result<Vec<f32>, EmbeddingError> {
        let tokens = image.bytes.chunks(IMAGE_WINDOW).map(window_to_integer);
        self.project(tokens)
            .ok_or_else(|| EmbeddingError::InvalidInput(format!("empty image: {}", image.source)))
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let tokens = tokenize(text);
        self.project(tokens.iter().map(|t| token_to_integer(t)))
            .ok_or_else(|| EmbeddingError::InvalidInput(format!("no tokens in text: {:?}", text)))
    }
}

/// N = Σ u_j * B^(L-j) where B = 2^16
fn token_to_integer(token: &str) -> u64 {
    token
        .chars()
        .take(MAX_TOKEN_LENGTH)
        .fold(0u64, |n, c| n.wrapping_mul(65536).wrapping_add(c as u64))
}

fn window_to_integer(window: &[u8]) -> u64 {
    window
        .iter()
        .fold(0u64, |n, &b| n.wrapping_mul(256).wrapping_add(b as u64))
}

/// Splits text into lowercase words
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

/// Dot product; equals cosine similarity for unit vectors
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

pub fn is_unit(v: &[f32]) -> bool {
    (l2_norm(v) - 1.0).abs() <= UNIT_NORM_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(bytes: &[u8]) -> ImageData {
        ImageData {
            source: "test.jpg".to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_image_embedding_deterministic() {
        let model1 = HarmonicEmbedder::new();
        let model2 = HarmonicEmbedder::new();

        let img = image(b"\xFF\xD8\xFF\xE0 some jpeg payload bytes");
        let emb1 = model1.embed_image(&img).unwrap();
        let emb2 = model2.embed_image(&img).unwrap();

        assert_eq!(emb1, emb2);
        assert_eq!(emb1.len(), EMBEDDING_DIM);
        assert!(is_unit(&emb1));
    }

    #[test]
    fn test_different_images_differ() {
        let model = HarmonicEmbedder::new();
        let a = model.embed_image(&image(b"red sneaker pixels")).unwrap();
        let b = model.embed_image(&image(b"blue laptop pixels")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_image_rejected() {
        let model = HarmonicEmbedder::new();
        let err = model.embed_image(&image(b"")).unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidInput(_)));
        assert!(!err.is_collaborator_failure());
    }

    #[test]
    fn test_text_embedding() {
        let model = HarmonicEmbedder::new();

        let emb1 = model.embed_text("a photo of Shoes").unwrap();
        let emb2 = model.embed_text("A photo of shoes!").unwrap();
        assert_eq!(emb1, emb2);
        assert!(is_unit(&emb1));

        assert!(model.embed_text("  ...  ").is_err());
    }

    #[test]
    fn test_batch_default_keeps_order() {
        let model = HarmonicEmbedder::new();
        let images = vec![image(b"first"), image(b""), image(b"third")];

        let results = model.embed_image_batch(&images).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(
            results[0].as_ref().unwrap(),
            &model.embed_image(&images[0]).unwrap()
        );
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_dot_product() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((dot(&a, &[1.0, 0.0, 0.0]) - 1.0).abs() < 0.001);
        assert!(dot(&a, &[0.0, 1.0, 0.0]).abs() < 0.001);
        assert!((dot(&a, &[-1.0, 0.0, 0.0]) + 1.0).abs() < 0.001);
    }
}
