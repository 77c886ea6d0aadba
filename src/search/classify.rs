//! Zero-shot category classification
//!
//! Scores `"a photo of {category}"` prompts against an image embedding and
//! picks the closest category. Independent of the product index.

use serde::{Deserialize, Serialize};

use super::embedding::{dot, EmbeddingModel};
use super::error::EmbeddingError;
use crate::core::image::ImageData;

pub const DEFAULT_CATEGORIES: &[&str] = &[
    "Shirts",
    "Shoes",
    "Laptops",
    "Smartphones",
    "Headphones",
    "Watches",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    pub name: String,
}

pub fn prompt_for(category: &str) -> String {
    format!("a photo of {}", category)
}

/// Pick the category whose prompt is most similar to the image.
///
/// Ties go to the earlier category.
pub fn classify(
    model: &dyn EmbeddingModel,
    image: &ImageData,
    categories: &[&str],
) -> Result<Classification, EmbeddingError> {
    if categories.is_empty() {
        return Err(EmbeddingError::InvalidInput("no categories given".into()));
    }

    let image_embedding = model.embed_image(image)?;

    let mut best: Option<(&str, f32)> = None;
    for &category in categories {
        let text_embedding = model.embed_text(&prompt_for(category))?;
        let score = dot(&image_embedding, &text_embedding);
        match best {
            Some((_, best_score)) if best_score >= score => {}
            _ => best = Some((category, score)),
        }
    }

    let category = best.map(|(c, _)| c).unwrap_or(categories[0]);
    Ok(Classification {
        category: category.to_string(),
        name: format!("Uploaded {}", category),
    })
}
