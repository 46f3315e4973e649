use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::extraction::api::RepositoryApi;
use crate::extraction::cache::{CachedExtractor, FeatureCache};
use crate::extraction::extractor::{Extracted, ExtractorKind, FeatureExtractor};
use crate::models::Feature;

/// Fixed number of worker slots shared by every run of one pipeline.
///
/// Extractor tasks run on the multi-threaded tokio runtime and hold one slot
/// while executing. Closing the pool waits for busy slots to be released and
/// rejects later work.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    async fn acquire(permits: Arc<Semaphore>) -> Result<OwnedSemaphorePermit> {
        permits.acquire_owned().await.map_err(|_| Error::PoolClosed)
    }

    pub async fn close(&self) {
        if self.is_closed() {
            return;
        }
        // Wait for every busy worker to hand its slot back
        let drained = self.permits.acquire_many(self.size as u32).await;
        self.permits.close();
        drop(drained);
        tracing::debug!("Worker pool of {} closed", self.size);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.permits.close();
    }
}

/// Features of one repository, plus the extractors whose contribution is
/// missing (`failed`) or zero-filled after a remote failure (`defaulted`).
#[derive(Debug, Clone)]
pub struct Extraction {
    pub features: Vec<Feature>,
    pub failed: Vec<ExtractorKind>,
    pub defaulted: Vec<ExtractorKind>,
}

impl Extraction {
    /// Whether any feature is absent or was not actually observed.
    pub fn is_degraded(&self) -> bool {
        !self.failed.is_empty() || !self.defaulted.is_empty()
    }

    /// Every feature is present, though some may be defaulted.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

type ChunkOutcome = Vec<(usize, ExtractorKind, Result<Extracted>)>;

/// Runs every registered extractor against a repository concurrently and
/// merges their features in registration order.
pub struct FeatureExtractionPipeline {
    kinds: Vec<ExtractorKind>,
    cache: Arc<FeatureCache>,
    pool: WorkerPool,
    config: PipelineConfig,
}

impl FeatureExtractionPipeline {
    pub fn new(kinds: Vec<ExtractorKind>, cache: Arc<FeatureCache>, config: PipelineConfig) -> Self {
        let pool = WorkerPool::new(kinds.len());
        tracing::debug!("Feature pipeline opened with {} workers", pool.size());
        Self {
            kinds,
            cache,
            pool,
            config,
        }
    }

    /// All registered extractors, a private cache and default configuration.
    pub fn with_defaults() -> Self {
        Self::new(
            ExtractorKind::ALL.to_vec(),
            Arc::new(FeatureCache::new()),
            PipelineConfig::default(),
        )
    }

    pub fn kinds(&self) -> &[ExtractorKind] {
        &self.kinds
    }

    /// Names of every feature a successful run returns, in order.
    pub fn feature_names(&self) -> Vec<String> {
        self.kinds.iter().flat_map(|k| k.feature_names()).collect()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn cache(&self) -> &Arc<FeatureCache> {
        &self.cache
    }

    pub async fn extract_features(&self, repo: Arc<dyn RepositoryApi>) -> Result<Vec<Feature>> {
        Ok(self.extract(repo).await?.features)
    }

    /// Extracts all features of `repo`.
    ///
    /// In strict mode the first failing extractor aborts the remaining tasks
    /// and the run returns `Error::ExtractionFailed`. Otherwise the failing
    /// extractor's features are left out and reported in `Extraction::failed`.
    /// Extractors that absorbed a remote failure are listed in
    /// `Extraction::defaulted` in either mode.
    /// Dropping the returned future aborts all of its tasks.
    pub async fn extract(&self, repo: Arc<dyn RepositoryApi>) -> Result<Extraction> {
        if self.pool.is_closed() {
            return Err(Error::PoolClosed);
        }

        tracing::info!("Extracting {} feature groups for {}", self.kinds.len(), repo.id());

        let strict = self.config.strict;
        let indexed: Vec<(usize, ExtractorKind)> = self.kinds.iter().copied().enumerate().collect();
        let mut tasks: JoinSet<Result<ChunkOutcome>> = JoinSet::new();

        for chunk in indexed.chunks(self.config.chunk_size.max(1)) {
            let chunk = chunk.to_vec();
            let repo = repo.clone();
            let cache = self.cache.clone();
            let permits = self.pool.permits.clone();

            tasks.spawn(async move {
                let _permit = WorkerPool::acquire(permits).await?;
                let mut outcomes = Vec::with_capacity(chunk.len());
                for (index, kind) in chunk {
                    let extractor = CachedExtractor::new(kind.build(repo.clone()), cache.clone());
                    let outcome = extractor.extract().await;
                    let failed = outcome.is_err();
                    outcomes.push((index, kind, outcome));
                    if failed && strict {
                        break;
                    }
                }
                Ok::<_, Error>(outcomes)
            });
        }

        let mut slots: Vec<Option<Vec<Feature>>> = vec![None; self.kinds.len()];
        let mut failed: Vec<(usize, ExtractorKind)> = Vec::new();
        let mut defaulted: Vec<(usize, ExtractorKind)> = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            let outcomes = match joined {
                Ok(Ok(outcomes)) => outcomes,
                Ok(Err(e)) => {
                    tasks.shutdown().await;
                    return Err(e);
                }
                Err(e) => {
                    tasks.shutdown().await;
                    return Err(Error::TaskJoin(e.to_string()));
                }
            };

            for (index, kind, outcome) in outcomes {
                match outcome {
                    Ok(extracted) => {
                        if extracted.defaulted {
                            defaulted.push((index, kind));
                        }
                        slots[index] = Some(extracted.features);
                    }
                    Err(e) if strict => {
                        tasks.shutdown().await;
                        tracing::warn!("Extraction of {} aborted by {}: {}", repo.id(), kind, e);
                        return Err(Error::ExtractionFailed {
                            extractor: kind.to_string(),
                            source: Box::new(e),
                        });
                    }
                    Err(e) => {
                        tracing::warn!("Omitting {} features for {}: {}", kind, repo.id(), e);
                        failed.push((index, kind));
                    }
                }
            }
        }

        let features: Vec<Feature> = slots.into_iter().flatten().flatten().collect();
        tracing::info!("Extracted {} features for {}", features.len(), repo.id());

        Ok(Extraction {
            features,
            failed: in_registration_order(failed),
            defaulted: in_registration_order(defaulted),
        })
    }

    /// Waits for in-flight work and shuts the worker pool down.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn in_registration_order(mut kinds: Vec<(usize, ExtractorKind)>) -> Vec<ExtractorKind> {
    kinds.sort_by_key(|(index, _)| *index);
    kinds.into_iter().map(|(_, kind)| kind).collect()
}
