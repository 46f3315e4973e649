//! In-memory `RepositoryApi` used by the extraction tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rand::Rng;

use crate::error::{Error, Result};
use crate::extraction::api::RepositoryApi;
use crate::models::{
    Branch, ContentEntry, Contributor, EntryKind, GitTree, RepoAttributes, RepoId, TreeEntry,
};

pub struct StubRepository {
    id: RepoId,
    attributes: Mutex<RepoAttributes>,
    tree: Mutex<GitTree>,
    dir_contents: Mutex<Vec<ContentEntry>>,
    attributes_error: Mutex<Option<Error>>,
    tree_error: Mutex<Option<Error>>,
    dir_error: Mutex<Option<Error>>,
    tree_requests: Mutex<Vec<(String, bool)>>,
    max_delay_ms: Option<u64>,
    calls: AtomicUsize,
    active: Arc<AtomicUsize>,
}

/// Counts a call as active until dropped, including when its task is aborted.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StubRepository {
    pub fn new(full_name: &str) -> Self {
        let id: RepoId = full_name.parse().expect("valid repository name");
        let attributes = RepoAttributes {
            full_name: full_name.to_string(),
            description: Some("Homework for the compilers course".to_string()),
            default_branch: "main".to_string(),
            stargazers_count: 42,
            forks_count: 3,
            watchers_count: 42,
            open_issues_count: 1,
            size: 2048,
            fork: false,
            has_wiki: true,
            has_issues: true,
            has_downloads: false,
            created_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            pushed_at: Some(Utc.with_ymd_and_hms(2020, 1, 11, 0, 0, 0).unwrap()),
        };

        let stub = Self {
            id,
            attributes: Mutex::new(attributes),
            tree: Mutex::new(nested_tree(25, 3)),
            dir_contents: Mutex::new(Vec::new()),
            attributes_error: Mutex::new(None),
            tree_error: Mutex::new(None),
            dir_error: Mutex::new(None),
            tree_requests: Mutex::new(Vec::new()),
            max_delay_ms: None,
            calls: AtomicUsize::new(0),
            active: Arc::new(AtomicUsize::new(0)),
        };
        stub.set_dir_contents(&["README.md", "Cargo.toml"]);
        stub
    }

    /// Every remote call sleeps for a random duration up to `max_ms`.
    pub fn with_random_delay(mut self, max_ms: u64) -> Self {
        self.max_delay_ms = Some(max_ms);
        self
    }

    pub fn set_description(&self, description: Option<&str>) {
        self.attributes.lock().unwrap().description = description.map(str::to_string);
    }

    pub fn set_tree(&self, tree: GitTree) {
        *self.tree.lock().unwrap() = tree;
    }

    pub fn set_dir_contents(&self, names: &[&str]) {
        *self.dir_contents.lock().unwrap() = names
            .iter()
            .map(|name| ContentEntry {
                name: name.to_string(),
                path: name.to_string(),
                entry_type: "file".to_string(),
            })
            .collect();
    }

    pub fn fail_attributes(&self, error: Error) {
        *self.attributes_error.lock().unwrap() = Some(error);
    }

    pub fn fail_tree(&self, error: Error) {
        *self.tree_error.lock().unwrap() = Some(error);
    }

    pub fn fail_dir_contents(&self, error: Error) {
        *self.dir_error.lock().unwrap() = Some(error);
    }

    /// Total number of remote calls served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls currently in progress.
    pub fn active_calls(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn tree_requests(&self) -> Vec<(String, bool)> {
        self.tree_requests.lock().unwrap().clone()
    }

    async fn enter(&self) -> ActiveGuard {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        let guard = ActiveGuard(self.active.clone());
        if let Some(max) = self.max_delay_ms {
            let delay = rand::thread_rng().gen_range(0..=max);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        guard
    }
}

fn replay(slot: &Mutex<Option<Error>>) -> Result<()> {
    match slot.lock().unwrap().as_ref() {
        None => Ok(()),
        Some(Error::NotFound(what)) => Err(Error::NotFound(what.clone())),
        Some(Error::RateLimited(secs)) => Err(Error::RateLimited(*secs)),
        Some(Error::InvalidInput(msg)) => Err(Error::InvalidInput(msg.clone())),
        Some(other) => Err(Error::GitHubApi(other.to_string())),
    }
}

#[async_trait]
impl RepositoryApi for StubRepository {
    fn id(&self) -> &RepoId {
        &self.id
    }

    async fn attributes(&self) -> Result<RepoAttributes> {
        let _guard = self.enter().await;
        replay(&self.attributes_error)?;
        Ok(self.attributes.lock().unwrap().clone())
    }

    async fn get_branches(&self) -> Result<Vec<Branch>> {
        let _guard = self.enter().await;
        Ok(["main", "develop", "feature/x"]
            .iter()
            .map(|name| Branch {
                name: name.to_string(),
            })
            .collect())
    }

    async fn get_contributors(&self) -> Result<Vec<Contributor>> {
        let _guard = self.enter().await;
        Ok(vec![
            Contributor {
                login: Some("alice".to_string()),
                contributions: 10,
            },
            Contributor {
                login: Some("bob".to_string()),
                contributions: 7,
            },
        ])
    }

    async fn get_tree(&self, reference: &str, recursive: bool) -> Result<GitTree> {
        let _guard = self.enter().await;
        self.tree_requests
            .lock()
            .unwrap()
            .push((reference.to_string(), recursive));
        replay(&self.tree_error)?;
        Ok(self.tree.lock().unwrap().clone())
    }

    async fn get_dir_contents(&self, _path: &str) -> Result<Vec<ContentEntry>> {
        let _guard = self.enter().await;
        replay(&self.dir_error)?;
        Ok(self.dir_contents.lock().unwrap().clone())
    }
}

/// A flattened recursive listing with `files` blobs spread over a chain of
/// `depth` nested directories.
pub fn nested_tree(files: usize, depth: usize) -> GitTree {
    let dirs: Vec<String> = (0..depth)
        .map(|level| {
            (0..=level)
                .map(|d| format!("dir{}", d))
                .collect::<Vec<_>>()
                .join("/")
        })
        .collect();

    let mut entries: Vec<TreeEntry> = dirs
        .iter()
        .enumerate()
        .map(|(i, path)| TreeEntry {
            path: path.clone(),
            kind: EntryKind::Tree,
            sha: format!("t{}", i),
        })
        .collect();

    for i in 0..files {
        let path = match dirs.get(i % (depth + 1)) {
            Some(dir) => format!("{}/file{}.txt", dir, i),
            None => format!("file{}.txt", i),
        };
        entries.push(TreeEntry {
            path,
            kind: EntryKind::Blob,
            sha: format!("b{}", i),
        });
    }

    GitTree {
        sha: "root".to_string(),
        entries,
        truncated: false,
    }
}
