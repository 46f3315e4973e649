use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::extraction::extractor::{Extracted, ExtractorKind, FeatureExtractor};
use crate::models::{Feature, RepoId};

pub type CacheKey = (ExtractorKind, RepoId);

/// Extraction results keyed by extractor kind and repository identity.
///
/// Entries live as long as the cache; nothing is evicted.
#[derive(Default)]
pub struct FeatureCache {
    entries: RwLock<HashMap<CacheKey, Vec<Feature>>>,
}

impl FeatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, kind: ExtractorKind, repo: &RepoId) -> Option<Vec<Feature>> {
        self.entries
            .read()
            .await
            .get(&(kind, repo.clone()))
            .cloned()
    }

    pub async fn insert(&self, kind: ExtractorKind, repo: &RepoId, features: Vec<Feature>) {
        self.entries
            .write()
            .await
            .insert((kind, repo.clone()), features);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

/// Serves an extractor's result from the shared cache when present,
/// otherwise runs it and stores a successful, non-defaulted result.
pub struct CachedExtractor {
    inner: Box<dyn FeatureExtractor>,
    cache: Arc<FeatureCache>,
}

impl CachedExtractor {
    pub fn new(inner: Box<dyn FeatureExtractor>, cache: Arc<FeatureCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl FeatureExtractor for CachedExtractor {
    fn kind(&self) -> ExtractorKind {
        self.inner.kind()
    }

    fn repository(&self) -> &RepoId {
        self.inner.repository()
    }

    async fn extract(&self) -> Result<Extracted> {
        let kind = self.inner.kind();
        let repo = self.inner.repository();

        if let Some(features) = self.cache.get(kind, repo).await {
            tracing::debug!("Cache hit for {} on {}", kind, repo);
            return Ok(Extracted::complete(features));
        }

        let extracted = self.inner.extract().await?;
        // Zeros standing in for a failed call must not outlive the failure
        if !extracted.defaulted {
            self.cache.insert(kind, repo, extracted.features.clone()).await;
        }
        Ok(extracted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::extraction::api::RepositoryApi;
    use crate::extraction::testing::StubRepository;

    #[tokio::test]
    async fn test_second_call_hits_cache() {
        let stub = Arc::new(StubRepository::new("octo/hello"));
        let repo: Arc<dyn RepositoryApi> = stub.clone();
        let cache = Arc::new(FeatureCache::new());

        for _ in 0..2 {
            // A fresh instance per call, as the pipeline does
            let extractor = CachedExtractor::new(ExtractorKind::Branches.build(repo.clone()), cache.clone());
            let features = extractor.extract().await.unwrap().features;
            assert_eq!(features, vec![Feature::with_value("Number of branches", 3.0)]);
        }

        assert_eq!(stub.calls(), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_key_includes_kind_and_repository() {
        let first = Arc::new(StubRepository::new("octo/one"));
        let second = Arc::new(StubRepository::new("octo/two"));
        let cache = Arc::new(FeatureCache::new());

        for (stub, kind) in [
            (&first, ExtractorKind::Stars),
            (&first, ExtractorKind::Forks),
            (&second, ExtractorKind::Stars),
        ] {
            let repo: Arc<dyn RepositoryApi> = stub.clone();
            CachedExtractor::new(kind.build(repo), cache.clone())
                .extract()
                .await
                .unwrap();
        }

        assert_eq!(first.calls(), 2);
        assert_eq!(second.calls(), 1);
        assert_eq!(cache.len().await, 3);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let stub = Arc::new(StubRepository::new("octo/hello"));
        stub.fail_tree(Error::NotFound("tree".into()));
        let repo: Arc<dyn RepositoryApi> = stub.clone();
        let cache = Arc::new(FeatureCache::new());

        let extractor = CachedExtractor::new(ExtractorKind::TotalFiles.build(repo), cache.clone());
        assert!(extractor.extract().await.is_err());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_defaulted_results_are_not_cached() {
        let stub = Arc::new(StubRepository::new("octo/hello"));
        stub.fail_dir_contents(Error::RateLimited(30));
        let repo: Arc<dyn RepositoryApi> = stub.clone();
        let cache = Arc::new(FeatureCache::new());

        for _ in 0..2 {
            let extractor = CachedExtractor::new(ExtractorKind::HasBuildFile.build(repo.clone()), cache.clone());
            let extracted = extractor.extract().await.unwrap();
            assert!(extracted.defaulted);
        }

        assert_eq!(stub.calls(), 2);
        assert!(cache.is_empty().await);
    }
}
