//! Product catalog
//!
//! The catalog is owned elsewhere; this crate only reads `products.json`.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse catalog {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("Duplicate product id in catalog: {0}")]
    DuplicateId(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    pub category: String,
    pub image_url: String,
}

/// Load the catalog in file order, rejecting duplicate ids
pub fn load_catalog(path: &Path) -> Result<Vec<CatalogItem>, CatalogError> {
    let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let items: Vec<CatalogItem> =
        serde_json::from_str(&content).map_err(|source| CatalogError::Parse {
            path: path.display().to_string(),
            source,
        })?;

    let mut seen = HashSet::with_capacity(items.len());
    for item in &items {
        if !seen.insert(item.id.as_str()) {
            return Err(CatalogError::DuplicateId(item.id.clone()));
        }
    }

    Ok(items)
}

/// Index catalog items by id for metadata joins
pub fn by_id(catalog: &[CatalogItem]) -> HashMap<&str, &CatalogItem> {
    catalog.iter().map(|item| (item.id.as_str(), item)).collect()
}
