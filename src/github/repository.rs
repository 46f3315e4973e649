use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::error::Result;
use crate::extraction::RepositoryApi;
use crate::github::GitHubClient;
use crate::models::{Branch, ContentEntry, Contributor, GitTree, RepoAttributes, RepoId};

/// A GitHub-hosted repository. Metadata is fetched on first use and shared
/// by every extractor reading a scalar attribute.
pub struct GitHubRepository {
    client: Arc<GitHubClient>,
    id: RepoId,
    attributes: OnceCell<RepoAttributes>,
}

impl GitHubRepository {
    pub fn new(client: Arc<GitHubClient>, id: RepoId) -> Self {
        Self {
            client,
            id,
            attributes: OnceCell::new(),
        }
    }
}

#[async_trait]
impl RepositoryApi for GitHubRepository {
    fn id(&self) -> &RepoId {
        &self.id
    }

    async fn attributes(&self) -> Result<RepoAttributes> {
        let attributes = self
            .attributes
            .get_or_try_init(|| self.client.get_repository(&self.id))
            .await?;
        Ok(attributes.clone())
    }

    async fn get_branches(&self) -> Result<Vec<Branch>> {
        self.client.get_branches(&self.id).await
    }

    async fn get_contributors(&self) -> Result<Vec<Contributor>> {
        self.client.get_contributors(&self.id).await
    }

    async fn get_tree(&self, reference: &str, recursive: bool) -> Result<GitTree> {
        self.client.get_tree(&self.id, reference, recursive).await
    }

    async fn get_dir_contents(&self, path: &str) -> Result<Vec<ContentEntry>> {
        self.client.get_dir_contents(&self.id, path).await
    }
}
