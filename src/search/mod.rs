//! Visual similarity search over product embeddings
//!
//! Index lifecycle: build (`builder`), persist (`store`), reuse or rebuild
//! (`staleness`), then rank (`similarity`). `engine` wires them together.

pub mod builder;
pub mod classify;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod similarity;
pub mod staleness;
pub mod store;

pub use builder::{BuildReport, IndexBuilder};
pub use embedding::{EmbeddingModel, HarmonicEmbedder};
pub use engine::{EngineError, MatchEngine};
pub use error::{CollaboratorError, EmbeddingError, IndexError, ItemBuildFailure};
pub use similarity::{SearchResponse, SearchResult};
pub use staleness::{needs_rebuild, RebuildReason};
pub use store::{EmbeddingStore, Index, VectorRecord};
