//! product-match library
//!
//! Finds catalog products that look like a query image by cosine
//! similarity over precomputed embeddings.
//!
//! # Modules
//!
//! - `core`: Catalog, configuration, data paths, image resolution
//! - `search`: Embedding index lifecycle and similarity search

pub mod core;
pub mod search;

// Re-exports for convenience
pub use core::catalog::{load_catalog, CatalogItem};
pub use core::config::MatcherConfig;
pub use core::image::{FsImageSource, ImageData, ImageSource};
pub use core::paths::DataPaths;
pub use search::{
    EmbeddingModel, EmbeddingStore, Index, IndexBuilder, IndexError, MatchEngine, SearchResponse,
    SearchResult, VectorRecord,
};
