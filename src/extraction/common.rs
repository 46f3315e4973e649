use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::extraction::api::RepositoryApi;
use crate::extraction::extractor::{Extracted, ExtractorKind, FeatureExtractor};
use crate::models::{Feature, GitTree, RepoAttributes, RepoId};

/// Hard cap on entries the hosting API returns for one recursive tree listing.
/// Repositories with more entries are undercounted.
pub const MAX_TREE_ENTRIES: usize = 1000;

pub const BUILD_FILES: [&str; 4] = ["build.gradle", "composer.json", "package.json", "pom.xml"];

pub const DESCRIPTION_KEYWORDS: [&str; 4] = ["homework", "lecture", "course", "framework"];

pub fn keyword_feature_name(keyword: &str) -> String {
    format!("Contains keyword \"{}\"", keyword)
}

/// Replaces a remote failure with zero-valued features marked as defaulted.
fn zero_on_remote_error(
    kind: ExtractorKind,
    repo: &RepoId,
    result: Result<Extracted>,
) -> Result<Extracted> {
    match result {
        Err(e) if e.is_remote() => {
            tracing::warn!("{} unavailable for {}, defaulting to 0: {}", kind, repo, e);
            Ok(Extracted::defaulted(kind))
        }
        other => other,
    }
}

/// Reads a single scalar attribute; booleans are coerced to 0/1 by `read`.
pub struct AttributeExtractor {
    kind: ExtractorKind,
    repo: Arc<dyn RepositoryApi>,
    read: fn(&RepoAttributes) -> f64,
}

impl AttributeExtractor {
    pub fn new(kind: ExtractorKind, repo: Arc<dyn RepositoryApi>, read: fn(&RepoAttributes) -> f64) -> Self {
        Self { kind, repo, read }
    }
}

#[async_trait]
impl FeatureExtractor for AttributeExtractor {
    fn kind(&self) -> ExtractorKind {
        self.kind
    }

    fn repository(&self) -> &RepoId {
        self.repo.id()
    }

    async fn extract(&self) -> Result<Extracted> {
        let result = self
            .repo
            .attributes()
            .await
            .map(|attrs| Extracted::valued(self.kind, (self.read)(&attrs)));
        zero_on_remote_error(self.kind, self.repo.id(), result)
    }
}

pub struct BranchExtractor {
    repo: Arc<dyn RepositoryApi>,
}

impl BranchExtractor {
    pub fn new(repo: Arc<dyn RepositoryApi>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl FeatureExtractor for BranchExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Branches
    }

    fn repository(&self) -> &RepoId {
        self.repo.id()
    }

    async fn extract(&self) -> Result<Extracted> {
        let result = self
            .repo
            .get_branches()
            .await
            .map(|branches| Extracted::valued(self.kind(), branches.len() as f64));
        zero_on_remote_error(self.kind(), self.repo.id(), result)
    }
}

pub struct ContributorsExtractor {
    repo: Arc<dyn RepositoryApi>,
}

impl ContributorsExtractor {
    pub fn new(repo: Arc<dyn RepositoryApi>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl FeatureExtractor for ContributorsExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Contributors
    }

    fn repository(&self) -> &RepoId {
        self.repo.id()
    }

    async fn extract(&self) -> Result<Extracted> {
        let result = self
            .repo
            .get_contributors()
            .await
            .map(|contributors| Extracted::valued(self.kind(), contributors.len() as f64));
        zero_on_remote_error(self.kind(), self.repo.id(), result)
    }
}

/// Commits on the default branch, summed over contributor contribution counts.
pub struct CommitCountExtractor {
    repo: Arc<dyn RepositoryApi>,
}

impl CommitCountExtractor {
    pub fn new(repo: Arc<dyn RepositoryApi>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl FeatureExtractor for CommitCountExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::CommitCount
    }

    fn repository(&self) -> &RepoId {
        self.repo.id()
    }

    async fn extract(&self) -> Result<Extracted> {
        let result = self.repo.get_contributors().await.map(|contributors| {
            let total: u64 = contributors.iter().map(|c| c.contributions).sum();
            Extracted::valued(self.kind(), total as f64)
        });
        zero_on_remote_error(self.kind(), self.repo.id(), result)
    }
}

/// Flags repositories whose top-level directory holds a known build file.
pub struct BuildFileExtractor {
    repo: Arc<dyn RepositoryApi>,
}

impl BuildFileExtractor {
    pub fn new(repo: Arc<dyn RepositoryApi>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl FeatureExtractor for BuildFileExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::HasBuildFile
    }

    fn repository(&self) -> &RepoId {
        self.repo.id()
    }

    async fn extract(&self) -> Result<Extracted> {
        let result = self.repo.get_dir_contents("").await.map(|entries| {
            let found = entries.iter().any(|entry| {
                let name = entry.name.to_lowercase();
                BUILD_FILES.contains(&name.as_str())
            });
            Extracted::valued(self.kind(), if found { 1.0 } else { 0.0 })
        });
        zero_on_remote_error(self.kind(), self.repo.id(), result)
    }
}

/// One 0/1 feature per education-related keyword found in the description.
pub struct DescriptionKeywordExtractor {
    repo: Arc<dyn RepositoryApi>,
}

impl DescriptionKeywordExtractor {
    pub fn new(repo: Arc<dyn RepositoryApi>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl FeatureExtractor for DescriptionKeywordExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::DescriptionKeywords
    }

    fn repository(&self) -> &RepoId {
        self.repo.id()
    }

    async fn extract(&self) -> Result<Extracted> {
        let result = self.repo.attributes().await.map(|attrs| {
            let description = attrs.description.unwrap_or_default().to_lowercase();
            Extracted::complete(
                DESCRIPTION_KEYWORDS
                    .iter()
                    .map(|kw| Feature::flag(keyword_feature_name(kw), description.contains(kw)))
                    .collect(),
            )
        });
        zero_on_remote_error(self.kind(), self.repo.id(), result)
    }
}

/// Counts files on the default branch with a single recursive tree request.
///
/// Only `blob` entries are counted; directories appear in the flattened
/// listing too but would double count. At most [`MAX_TREE_ENTRIES`] entries
/// are examined, so very large repositories yield an undercount. Remote
/// failures propagate since there is no meaningful default.
pub struct TotalFilesExtractor {
    repo: Arc<dyn RepositoryApi>,
}

impl TotalFilesExtractor {
    pub fn new(repo: Arc<dyn RepositoryApi>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl FeatureExtractor for TotalFilesExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::TotalFiles
    }

    fn repository(&self) -> &RepoId {
        self.repo.id()
    }

    async fn extract(&self) -> Result<Extracted> {
        let branch = self.repo.attributes().await?.default_branch;
        let tree = self.repo.get_tree(&branch, true).await?;

        if tree.truncated || tree.entries.len() > MAX_TREE_ENTRIES {
            tracing::warn!(
                "Tree listing of {} exceeds {} entries, file count is a lower bound",
                self.repo.id(),
                MAX_TREE_ENTRIES
            );
        }

        let count = count_blobs(&tree, MAX_TREE_ENTRIES);
        Ok(Extracted::valued(self.kind(), count as f64))
    }
}

/// Number of blob entries among the first `budget` entries of a flattened tree.
pub fn count_blobs(tree: &GitTree, budget: usize) -> usize {
    tree.entries
        .iter()
        .take(budget)
        .filter(|entry| entry.is_blob())
        .count()
}
