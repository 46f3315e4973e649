pub mod api;
pub mod cache;
pub mod common;
pub mod extractor;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod testing;

pub use api::RepositoryApi;
pub use cache::{CachedExtractor, FeatureCache};
pub use extractor::{Extracted, ExtractorKind, FeatureExtractor};
pub use pipeline::{Extraction, FeatureExtractionPipeline, WorkerPool};
