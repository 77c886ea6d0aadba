//! Brute-force cosine similarity search
//!
//! All vectors are unit normalized, so cosine similarity is a plain dot
//! product. Every retained vector is scored (O(N·D)); there is no
//! approximate index.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::embedding::dot;
use super::error::IndexError;
use super::store::{Index, VectorRecord};
use crate::core::catalog::{by_id, CatalogItem};

/// A matched product with its similarity score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub name: String,
    pub category: String,
    pub image_url: String,
    pub score: f32,
}

impl SearchResult {
    fn from_catalog(item: &CatalogItem, score: f32) -> Self {
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            category: item.category.clone(),
            image_url: item.image_url.clone(),
            score,
        }
    }
}

/// Query result as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub count: usize,
    pub results: Vec<SearchResult>,
}

impl From<Vec<SearchResult>> for SearchResponse {
    fn from(results: Vec<SearchResult>) -> Self {
        Self {
            count: results.len(),
            results,
        }
    }
}

struct Scored<'a> {
    position: usize,
    score: f32,
    item: &'a CatalogItem,
}

/// Score descending, then earlier index position first
fn rank(a: &Scored<'_>, b: &Scored<'_>) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.position.cmp(&b.position))
}

/// Rank index records against a unit query vector.
///
/// Records whose id is no longer in the catalog are ignored. The `top_k`
/// best are selected first, then anything below `min_score` is dropped,
/// so fewer than `top_k` results may come back.
pub fn query(
    q: &[f32],
    index: &Index,
    catalog: &[CatalogItem],
    top_k: usize,
    min_score: f32,
) -> Result<Vec<SearchResult>, IndexError> {
    if top_k == 0 {
        return Err(IndexError::InvalidQuery("top_k must be at least 1".into()));
    }

    let products = by_id(catalog);
    let retained: Vec<(&VectorRecord, &CatalogItem)> = index
        .items
        .iter()
        .filter_map(|record| products.get(record.id.as_str()).map(|item| (record, *item)))
        .collect();

    if retained.is_empty() {
        return Err(IndexError::EmptyIndex);
    }

    let expected = retained[0].0.embedding.len();
    if q.len() != expected {
        return Err(IndexError::DimensionMismatch {
            expected,
            actual: q.len(),
        });
    }

    let mut scored: Vec<Scored<'_>> = retained
        .iter()
        .enumerate()
        .filter_map(|(position, &(record, item))| {
            // + 0.0 folds -0.0 into 0.0 so exact ties compare equal
            let score = dot(q, &record.embedding) + 0.0;
            if score.is_nan() {
                debug!(id = %record.id, "Skipping record with NaN score");
                return None;
            }
            Some(Scored {
                position,
                score,
                item,
            })
        })
        .collect();

    let k = top_k.min(scored.len());
    if k > 0 && k < scored.len() {
        scored.select_nth_unstable_by(k - 1, rank);
        scored.truncate(k);
    }
    scored.sort_unstable_by(rank);

    debug!(
        candidates = retained.len(),
        top_k,
        min_score,
        "Ranked similarity candidates"
    );

    Ok(scored
        .into_iter()
        .filter(|s| s.score >= min_score)
        .map(|s| SearchResult::from_catalog(s.item, s.score))
        .collect())
}
