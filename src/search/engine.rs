//! Match Engine - ties catalog, index lifecycle and similarity search together
//!
//! Every top-level operation re-reads the catalog. The persisted index is
//! reused unless the staleness policy asks for a rebuild.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use super::builder::{BuildReport, IndexBuilder};
use super::classify::{classify, Classification, DEFAULT_CATEGORIES};
use super::embedding::{EmbeddingModel, HarmonicEmbedder};
use super::error::{EmbeddingError, IndexError};
use super::similarity::{query, SearchResponse};
use super::staleness::{rebuild_reason, RebuildReason};
use super::store::{EmbeddingStore, Index};
use crate::core::catalog::{load_catalog, CatalogError, CatalogItem};
use crate::core::config::MatcherConfig;
use crate::core::image::{FsImageSource, ImageError, ImageSource};
use crate::core::paths::DataPaths;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("Query image: {0}")]
    Image(#[from] ImageError),

    #[error("Query embedding: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// Index ready for querying, plus the build report if it was just rebuilt
#[derive(Debug)]
pub struct EnsuredIndex {
    pub index: Index,
    pub rebuilt: Option<(RebuildReason, BuildReport)>,
}

/// Persisted index state relative to the live catalog
#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexStatus {
    pub exists: bool,
    pub model: Option<String>,
    pub count: usize,
    pub created_at: Option<i64>,
    pub file_size_bytes: u64,
    pub catalog_items: usize,
    pub current_model: String,
    /// Why the next query would rebuild, if it would
    pub stale: Option<String>,
}

/// Visual product matcher
pub struct MatchEngine {
    paths: DataPaths,
    store: EmbeddingStore,
    builder: IndexBuilder,
    model: Box<dyn EmbeddingModel>,
    images: Box<dyn ImageSource>,
}

impl MatchEngine {
    pub fn new(
        paths: DataPaths,
        config: &MatcherConfig,
        model: Box<dyn EmbeddingModel>,
        images: Box<dyn ImageSource>,
    ) -> Self {
        let store = EmbeddingStore::new(paths.embeddings.clone());
        Self {
            paths,
            store,
            builder: IndexBuilder::new(config.batch_size),
            model,
            images,
        }
    }

    /// Engine with the built-in harmonic embedder and filesystem image source
    pub fn with_defaults(paths: DataPaths, config: &MatcherConfig) -> Result<Self, EngineError> {
        let images = FsImageSource::new(
            &paths.image_cache,
            Duration::from_secs(config.fetch_timeout_secs),
        )?;
        Ok(Self::new(
            paths,
            config,
            Box::new(HarmonicEmbedder::new()),
            Box::new(images),
        ))
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    pub fn load_catalog(&self) -> Result<Vec<CatalogItem>, EngineError> {
        Ok(load_catalog(&self.paths.products)?)
    }

    /// Load the persisted index, treating a corrupt file as missing
    fn load_or_discard(&self) -> Result<Option<Index>, IndexError> {
        match self.store.load() {
            Err(IndexError::CorruptIndex { path, reason }) => {
                warn!(%path, %reason, "Discarding corrupt index");
                Ok(None)
            }
            other => other,
        }
    }

    /// Return a usable index for the catalog, rebuilding it when stale
    pub fn ensure_index(
        &self,
        catalog: &[CatalogItem],
        force: bool,
    ) -> Result<EnsuredIndex, IndexError> {
        let persisted = self.load_or_discard()?;

        let reason = rebuild_reason(persisted.as_ref(), catalog, self.model_id(), force);

        match (reason, persisted) {
            (None, Some(index)) => Ok(EnsuredIndex {
                index,
                rebuilt: None,
            }),
            (reason, _) => {
                let reason = reason.unwrap_or(RebuildReason::Missing);
                info!(%reason, "Rebuilding embeddings index");
                let (index, report) = self.rebuild(catalog)?;
                Ok(EnsuredIndex {
                    index,
                    rebuilt: Some((reason, report)),
                })
            }
        }
    }

    /// Build and persist a fresh index
    pub fn rebuild(&self, catalog: &[CatalogItem]) -> Result<(Index, BuildReport), IndexError> {
        self.builder
            .rebuild(catalog, self.images.as_ref(), self.model.as_ref(), &self.store)
    }

    /// Find the products most similar to the image at `image_ref`
    pub fn search(
        &self,
        image_ref: &str,
        top_k: usize,
        min_score: f32,
        force_rebuild: bool,
    ) -> Result<SearchResponse, EngineError> {
        let catalog = self.load_catalog()?;
        let ensured = self.ensure_index(&catalog, force_rebuild)?;

        let image = self.images.resolve(image_ref)?;
        let q = self.model.embed_image(&image)?;

        let results = query(&q, &ensured.index, &catalog, top_k, min_score)?;
        info!(image = image_ref, results = results.len(), "Search complete");
        Ok(SearchResponse::from(results))
    }

    /// Guess the category of the image at `image_ref`
    pub fn classify(&self, image_ref: &str) -> Result<Classification, EngineError> {
        let image = self.images.resolve(image_ref)?;
        Ok(classify(self.model.as_ref(), &image, DEFAULT_CATEGORIES)?)
    }

    pub fn status(&self) -> Result<IndexStatus, EngineError> {
        let catalog = self.load_catalog()?;
        let persisted = self.store.load()?;

        let stale = rebuild_reason(persisted.as_ref(), &catalog, self.model_id(), false)
            .map(|r| r.to_string());
        let file_size_bytes = std::fs::metadata(self.store.path())
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(IndexStatus {
            exists: persisted.is_some(),
            model: persisted.as_ref().map(|i| i.model_id.clone()),
            count: persisted.as_ref().map(|i| i.count).unwrap_or(0),
            created_at: persisted.as_ref().map(|i| i.created_at),
            file_size_bytes,
            catalog_items: catalog.len(),
            current_model: self.model_id().to_string(),
            stale,
        })
    }
}
