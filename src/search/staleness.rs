//! Index staleness policy
//!
//! Decides whether a persisted index may be reused for the current catalog
//! and model. The check is count based: an index with at least as many
//! records as the catalog has items is considered fresh. Replacing catalog
//! items without changing the count is not detected; a forced rebuild is
//! required in that case.

use std::fmt;

use super::store::Index;
use crate::core::catalog::CatalogItem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildReason {
    Forced,
    Missing,
    ModelChanged { indexed: String, current: String },
    CatalogGrew { indexed: usize, catalog: usize },
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebuildReason::Forced => write!(f, "rebuild requested"),
            RebuildReason::Missing => write!(f, "no persisted index"),
            RebuildReason::ModelChanged { indexed, current } => {
                write!(f, "model changed from {} to {}", indexed, current)
            }
            RebuildReason::CatalogGrew { indexed, catalog } => {
                write!(f, "index has {} items, catalog has {}", indexed, catalog)
            }
        }
    }
}

/// Why the index must be rebuilt, or `None` if it can be reused
pub fn rebuild_reason(
    index: Option<&Index>,
    catalog: &[CatalogItem],
    current_model_id: &str,
    force: bool,
) -> Option<RebuildReason> {
    if force {
        return Some(RebuildReason::Forced);
    }

    let index = match index {
        Some(index) => index,
        None => return Some(RebuildReason::Missing),
    };

    if index.model_id != current_model_id {
        return Some(RebuildReason::ModelChanged {
            indexed: index.model_id.clone(),
            current: current_model_id.to_string(),
        });
    }

    if index.count < catalog.len() {
        return Some(RebuildReason::CatalogGrew {
            indexed: index.count,
            catalog: catalog.len(),
        });
    }

    None
}

pub fn needs_rebuild(
    index: Option<&Index>,
    catalog: &[CatalogItem],
    current_model_id: &str,
    force: bool,
) -> bool {
    rebuild_reason(index, catalog, current_model_id, force).is_some()
}
