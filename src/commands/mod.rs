pub mod classify;
pub mod index;
pub mod search;

use anyhow::{Context, Result};

use product_match::{DataPaths, MatchEngine, MatcherConfig};

/// Open the engine with the built-in embedder and image source
pub fn open_engine(paths: DataPaths, config: &MatcherConfig) -> Result<MatchEngine> {
    MatchEngine::with_defaults(paths, config).context("Failed to initialize match engine")
}
