//! Index builder
//!
//! Resolves and embeds every catalog item, batch by batch. A failing item
//! is logged and skipped; only a collaborator failing as a whole (the
//! embedding model or the image source) aborts the build. Records keep catalog order regardless of batching.

use std::time::Instant;

use tracing::{debug, info, warn};

use super::embedding::{is_unit, EmbeddingModel};
use super::error::{EmbeddingError, IndexError, ItemBuildFailure};
use super::store::{EmbeddingStore, Index, VectorRecord};
use crate::core::catalog::CatalogItem;
use crate::core::image::{ImageData, ImageSource};

pub const DEFAULT_BATCH_SIZE: usize = 16;

type ItemOutcome = Result<VectorRecord, ItemBuildFailure>;

/// Statistics from an index build
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Catalog items seen
    pub processed: usize,
    /// Items that made it into the index
    pub embedded: usize,
    pub failures: Vec<ItemBuildFailure>,
    pub duration_ms: u128,
}

impl BuildReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

#[derive(Debug, Clone)]
pub struct IndexBuilder {
    batch_size: usize,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl IndexBuilder {
    /// A zero batch size is treated as 1
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Build a fresh index for the catalog.
    ///
    /// Never fails because of individual items; an all-failing catalog
    /// yields a valid, empty index.
    pub fn build(
        &self,
        catalog: &[CatalogItem],
        images: &dyn ImageSource,
        model: &dyn EmbeddingModel,
    ) -> Result<(Index, BuildReport), IndexError> {
        let start = Instant::now();
        info!(
            items = catalog.len(),
            batch_size = self.batch_size,
            model = model.model_id(),
            "Building embeddings index"
        );

        let outcomes = catalog.chunks(self.batch_size).try_fold(
            Vec::with_capacity(catalog.len()),
            |mut acc, batch| {
                acc.extend(self.process_batch(batch, images, model)?);
                Ok::<_, IndexError>(acc)
            },
        )?;

        let mut records = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(record) => records.push(record),
                Err(failure) => {
                    warn!(id = %failure.id, reason = %failure.reason, "Failed product");
                    failures.push(failure);
                }
            }
        }

        let report = BuildReport {
            processed: catalog.len(),
            embedded: records.len(),
            failures,
            duration_ms: start.elapsed().as_millis(),
        };

        info!(
            embedded = report.embedded,
            failed = report.failed(),
            duration_ms = report.duration_ms as u64,
            "Index built"
        );

        Ok((Index::new(model.model_id(), records), report))
    }

    /// Build and persist. A fatal build error leaves the stored index untouched.
    pub fn rebuild(
        &self,
        catalog: &[CatalogItem],
        images: &dyn ImageSource,
        model: &dyn EmbeddingModel,
        store: &EmbeddingStore,
    ) -> Result<(Index, BuildReport), IndexError> {
        let (mut index, report) = self.build(catalog, images, model)?;
        store.save(&mut index)?;
        Ok((index, report))
    }

    /// Resolve and embed one batch, returning one outcome per item in order
    fn process_batch(
        &self,
        batch: &[CatalogItem],
        images: &dyn ImageSource,
        model: &dyn EmbeddingModel,
    ) -> Result<Vec<ItemOutcome>, IndexError> {
        let mut ready = Vec::with_capacity(batch.len());
        let mut resolved: Vec<Result<(), ItemBuildFailure>> = Vec::with_capacity(batch.len());
        for item in batch {
            match images.resolve(&item.image_url) {
                Ok(image) => {
                    ready.push(image);
                    resolved.push(Ok(()));
                }
                Err(e) if e.is_collaborator_failure() => {
                    return Err(IndexError::CollaboratorFailure(e.into()));
                }
                Err(e) => resolved.push(Err(ItemBuildFailure::new(&item.id, e))),
            }
        }

        debug!(batch = batch.len(), resolved = ready.len(), "Embedding batch");

        let mut embedded = embed_batch(model, &ready)?.into_iter();

        let outcomes = batch
            .iter()
            .zip(resolved)
            .map(|(item, status)| -> ItemOutcome {
                status?;
                embedded
                    .next()
                    .unwrap_or_else(|| Err(EmbeddingError::Unavailable("missing embedding".into())))
                    .and_then(|v| check_vector(model, v))
                    .map(|embedding| VectorRecord {
                        id: item.id.clone(),
                        embedding,
                    })
                    .map_err(|e| ItemBuildFailure::new(&item.id, e))
            })
            .collect();

        Ok(outcomes)
    }
}

/// Call the model for a batch, normalizing its error shape.
///
/// Collaborator-level failures become fatal, whether reported for the whole
/// batch or for a single image; any other batch-wide error is charged to
/// every item of the batch.
fn embed_batch(
    model: &dyn EmbeddingModel,
    images: &[ImageData],
) -> Result<Vec<Result<Vec<f32>, EmbeddingError>>, IndexError> {
    if images.is_empty() {
        return Ok(Vec::new());
    }

    match model.embed_image_batch(images) {
        Ok(results) if results.len() != images.len() => Err(IndexError::CollaboratorFailure(
            EmbeddingError::Unavailable(format!(
                "model returned {} embeddings for {} images",
                results.len(),
                images.len()
            ))
            .into(),
        )),
        Ok(results) => {
            if let Some(e) = results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .find(|e| e.is_collaborator_failure())
            {
                return Err(IndexError::CollaboratorFailure(e.clone().into()));
            }
            Ok(results)
        }
        Err(e) if e.is_collaborator_failure() => Err(IndexError::CollaboratorFailure(e.into())),
        Err(e) => Ok(images.iter().map(|_| Err(e.clone())).collect()),
    }
}

fn check_vector(model: &dyn EmbeddingModel, v: Vec<f32>) -> Result<Vec<f32>, EmbeddingError> {
    if v.len() != model.dimension() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: model.dimension(),
            actual: v.len(),
        });
    }
    if !is_unit(&v) {
        debug!(model = model.model_id(), "Embedding is not unit normalized");
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::image::ImageError;
    use crate::search::error::CollaboratorError;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Serves image bytes from memory; unknown references fail
    struct MemImages(HashMap<String, Vec<u8>>);

    impl ImageSource for MemImages {
        fn resolve(&self, reference: &str) -> Result<ImageData, ImageError> {
            self.0
                .get(reference)
                .map(|bytes| ImageData {
                    source: reference.to_string(),
                    bytes: bytes.clone(),
                })
                .ok_or_else(|| ImageError::NotFound(reference.to_string()))
        }
    }

    /// Embeds the first byte as a one-hot direction; records batch sizes
    struct OneHot {
        dim: usize,
        batches: RefCell<Vec<usize>>,
        unavailable: bool,
    }

    impl OneHot {
        fn new(dim: usize) -> Self {
            Self {
                dim,
                batches: RefCell::new(Vec::new()),
                unavailable: false,
            }
        }
    }

    impl EmbeddingModel for OneHot {
        fn model_id(&self) -> &str {
            "one-hot"
        }

        fn dimension(&self) -> usize {
            self.dim
        }

        fn embed_image(&self, image: &ImageData) -> Result<Vec<f32>, EmbeddingError> {
            if self.unavailable {
                return Err(EmbeddingError::Unavailable("model offline".into()));
            }
            match image.bytes.first() {
                Some(0) | None => Err(EmbeddingError::InvalidInput(image.source.clone())),
                Some(&b) if (b as usize) > self.dim => {
                    Ok(vec![1.0; 1]) // wrong dimension
                }
                Some(&b) => {
                    let mut v = vec![0.0; self.dim];
                    v[b as usize - 1] = 1.0;
                    Ok(v)
                }
            }
        }

        fn embed_image_batch(
            &self,
            images: &[ImageData],
        ) -> Result<Vec<Result<Vec<f32>, EmbeddingError>>, EmbeddingError> {
            self.batches.borrow_mut().push(images.len());
            if self.unavailable {
                return Err(EmbeddingError::Unavailable("model offline".into()));
            }
            Ok(images.iter().map(|i| self.embed_image(i)).collect())
        }

        fn embed_text(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::InvalidInput("text unsupported".into()))
        }
    }

    /// Answers the batch call but reports the model as down for every image
    struct DownPerImage;

    impl EmbeddingModel for DownPerImage {
        fn model_id(&self) -> &str {
            "one-hot"
        }

        fn dimension(&self) -> usize {
            4
        }

        fn embed_image(&self, _image: &ImageData) -> Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::Unavailable("inference server gone".into()))
        }

        fn embed_image_batch(
            &self,
            images: &[ImageData],
        ) -> Result<Vec<Result<Vec<f32>, EmbeddingError>>, EmbeddingError> {
            Ok(images.iter().map(|i| self.embed_image(i)).collect())
        }

        fn embed_text(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::InvalidInput("text unsupported".into()))
        }
    }

    /// Fails every reference with a fixed error
    struct FailingImages(fn(&str) -> ImageError);

    impl ImageSource for FailingImages {
        fn resolve(&self, reference: &str) -> Result<ImageData, ImageError> {
            Err((self.0)(reference))
        }
    }

    fn item(id: &str) -> CatalogItem {
        CatalogItem {
            id: id.to_string(),
            name: format!("Product {}", id),
            category: "Watches".to_string(),
            image_url: format!("img/{}.jpg", id),
        }
    }

    fn images(entries: &[(&str, u8)]) -> MemImages {
        MemImages(
            entries
                .iter()
                .map(|(id, b)| (format!("img/{}.jpg", id), vec![*b]))
                .collect(),
        )
    }

    fn ids(index: &Index) -> Vec<&str> {
        index.items.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_build_preserves_catalog_order_across_batches() {
        let catalog: Vec<CatalogItem> = (1..=5).map(|i| item(&format!("p{}", i))).collect();
        let imgs = images(&[("p1", 5), ("p2", 4), ("p3", 3), ("p4", 2), ("p5", 1)]);
        let model = OneHot::new(8);

        let (index, report) = IndexBuilder::new(2).build(&catalog, &imgs, &model).unwrap();

        assert_eq!(ids(&index), vec!["p1", "p2", "p3", "p4", "p5"]);
        assert_eq!(index.count, 5);
        assert_eq!(index.model_id, "one-hot");
        assert_eq!(*model.batches.borrow(), vec![2, 2, 1]);
        assert_eq!(report.embedded, 5);
        assert_eq!(report.failed(), 0);
    }

    #[test]
    fn test_failed_items_are_skipped() {
        let catalog = vec![item("p1"), item("p2"), item("p3"), item("p4")];
        // p2 has no image, p3 cannot be embedded, p4 has the wrong dimension
        let imgs = images(&[("p1", 1), ("p3", 0), ("p4", 200)]);
        let model = OneHot::new(4);

        let (index, report) = IndexBuilder::new(16).build(&catalog, &imgs, &model).unwrap();

        assert_eq!(ids(&index), vec!["p1"]);
        assert_eq!(index.count, 1);
        assert_eq!(report.processed, 4);
        let failed: Vec<&str> = report.failures.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(failed, vec!["p2", "p3", "p4"]);
    }

    #[test]
    fn test_all_failures_yield_empty_index() {
        let catalog = vec![item("p1"), item("p2")];
        let (index, report) = IndexBuilder::default()
            .build(&catalog, &images(&[]), &OneHot::new(4))
            .unwrap();

        assert!(index.is_empty());
        assert_eq!(index.count, 0);
        assert_eq!(report.failed(), 2);
    }

    #[test]
    fn test_unavailable_model_aborts_without_saving() {
        let dir = tempfile::tempdir().unwrap();
        let store = EmbeddingStore::new(dir.path().join("embeddings.json"));

        let catalog = vec![item("p1")];
        let imgs = images(&[("p1", 1)]);

        let good = OneHot::new(4);
        let (previous, _) = IndexBuilder::default()
            .rebuild(&catalog, &imgs, &good, &store)
            .unwrap();

        let mut broken = OneHot::new(4);
        broken.unavailable = true;
        let result = IndexBuilder::default().rebuild(&catalog, &imgs, &broken, &store);

        assert!(matches!(result, Err(IndexError::CollaboratorFailure(_))));
        assert_eq!(store.load().unwrap(), Some(previous));
    }

    #[test]
    fn test_per_image_unavailable_aborts_without_saving() {
        let dir = tempfile::tempdir().unwrap();
        let store = EmbeddingStore::new(dir.path().join("embeddings.json"));
        let catalog = vec![item("p1"), item("p2"), item("p3")];
        let imgs = images(&[("p1", 1), ("p2", 2), ("p3", 3)]);

        let (previous, _) = IndexBuilder::default()
            .rebuild(&catalog, &imgs, &OneHot::new(4), &store)
            .unwrap();
        assert_eq!(previous.count, 3);

        let result = IndexBuilder::default().rebuild(&catalog, &imgs, &DownPerImage, &store);

        assert!(matches!(
            result,
            Err(IndexError::CollaboratorFailure(CollaboratorError::Embedding(
                EmbeddingError::Unavailable(_)
            )))
        ));
        assert_eq!(store.load().unwrap(), Some(previous));
    }

    #[test]
    fn test_unreachable_image_source_aborts_without_saving() {
        let dir = tempfile::tempdir().unwrap();
        let store = EmbeddingStore::new(dir.path().join("embeddings.json"));
        let catalog = vec![item("p1"), item("p2"), item("p3")];

        let (previous, _) = IndexBuilder::default()
            .rebuild(
                &catalog,
                &images(&[("p1", 1), ("p2", 2), ("p3", 3)]),
                &OneHot::new(4),
                &store,
            )
            .unwrap();

        let offline = FailingImages(|reference| {
            ImageError::Unavailable(format!("{}: dns error: network unreachable", reference))
        });
        let model = OneHot::new(4);
        let result = IndexBuilder::default().rebuild(&catalog, &offline, &model, &store);

        assert!(matches!(
            result,
            Err(IndexError::CollaboratorFailure(CollaboratorError::Image(
                ImageError::Unavailable(_)
            )))
        ));
        assert!(model.batches.borrow().is_empty());
        assert_eq!(store.load().unwrap(), Some(previous));
    }

    #[test]
    fn test_timed_out_fetches_are_skipped_per_item() {
        let timed_out = FailingImages(|reference| ImageError::Fetch {
            url: reference.to_string(),
            reason: "operation timed out".to_string(),
        });
        let catalog = vec![item("p1"), item("p2")];

        let (index, report) = IndexBuilder::default()
            .build(&catalog, &timed_out, &OneHot::new(4))
            .unwrap();

        assert!(index.is_empty());
        assert_eq!(report.failed(), 2);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = EmbeddingStore::new(dir.path().join("embeddings.json"));
        let catalog: Vec<CatalogItem> = (1..=6).map(|i| item(&format!("p{}", i))).collect();
        let imgs = images(&[("p1", 1), ("p2", 2), ("p3", 3), ("p5", 1), ("p6", 2)]);
        let model = OneHot::new(4);
        let builder = IndexBuilder::new(4);

        let (first, _) = builder.rebuild(&catalog, &imgs, &model, &store).unwrap();
        let (second, _) = builder.rebuild(&catalog, &imgs, &model, &store).unwrap();

        assert_eq!(first.items, second.items);
        assert_eq!(store.load().unwrap().unwrap().items, first.items);
    }

    #[test]
    fn test_zero_batch_size_clamped() {
        assert_eq!(IndexBuilder::new(0).batch_size(), 1);
    }
}
