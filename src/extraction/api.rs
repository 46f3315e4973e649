use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Branch, ContentEntry, Contributor, GitTree, RepoAttributes, RepoId};

/// Capabilities of a remote repository that feature extractors rely on.
///
/// Implementations must be safe to call concurrently from several workers and
/// paginate collection endpoints transparently.
#[async_trait]
pub trait RepositoryApi: Send + Sync {
    fn id(&self) -> &RepoId;

    /// Scalar metadata (stars, forks, flags, description, default branch...).
    async fn attributes(&self) -> Result<RepoAttributes>;

    async fn get_branches(&self) -> Result<Vec<Branch>>;

    async fn get_contributors(&self) -> Result<Vec<Contributor>>;

    async fn get_tree(&self, reference: &str, recursive: bool) -> Result<GitTree>;

    async fn get_dir_contents(&self, path: &str) -> Result<Vec<ContentEntry>>;
}
