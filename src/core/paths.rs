use std::path::PathBuf;

pub const PRODUCTS_FILE: &str = "products.json";
pub const EMBEDDINGS_FILE: &str = "embeddings.json";
pub const CONFIG_FILE: &str = "matcher.yaml";
pub const IMAGE_CACHE_DIR: &str = "images_cache";

pub struct DataPaths {
    pub root: PathBuf,
    pub products: PathBuf,
    pub embeddings: PathBuf,
    pub config: PathBuf,
    pub image_cache: PathBuf,
}

impl DataPaths {
    pub fn new() -> Self {
        let root = std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("data");
        Self::from_root(root)
    }

    pub fn from_root(root: PathBuf) -> Self {
        Self {
            products: root.join(PRODUCTS_FILE),
            embeddings: root.join(EMBEDDINGS_FILE),
            config: root.join(CONFIG_FILE),
            image_cache: root.join(IMAGE_CACHE_DIR),
            root,
        }
    }
}

impl Default for DataPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_from_root() {
        let paths = DataPaths::from_root(PathBuf::from("/srv/shop"));
        assert_eq!(paths.products, PathBuf::from("/srv/shop/products.json"));
        assert_eq!(paths.embeddings, PathBuf::from("/srv/shop/embeddings.json"));
        assert_eq!(paths.config, PathBuf::from("/srv/shop/matcher.yaml"));
        assert_eq!(paths.image_cache, PathBuf::from("/srv/shop/images_cache"));
    }
}
