use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const DEFAULT_HOST: &str = "github.com";

/// Identity of a hosted repository: host, owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoId {
    pub host: String,
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host == DEFAULT_HOST {
            write!(f, "{}/{}", self.owner, self.name)
        } else {
            write!(f, "{}/{}/{}", self.host, self.owner, self.name)
        }
    }
}

impl FromStr for RepoId {
    type Err = Error;

    /// Accepts `owner/name`, `host/owner/name` or a full `https://host/owner/name` URL.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .trim_end_matches(".git");

        let parts: Vec<&str> = trimmed.split('/').filter(|p| !p.is_empty()).collect();
        match parts.as_slice() {
            [owner, name] => Ok(Self::new(*owner, *name)),
            [host, owner, name] => Ok(Self {
                host: host.to_string(),
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(Error::InvalidInput(format!(
                "Invalid repository identifier: {}",
                s
            ))),
        }
    }
}

/// Scalar repository metadata as returned by `GET /repos/{owner}/{repo}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoAttributes {
    pub full_name: String,
    pub description: Option<String>,
    pub default_branch: String,
    pub stargazers_count: u64,
    pub forks_count: u64,
    pub watchers_count: u64,
    pub open_issues_count: u64,
    pub size: u64,
    pub fork: bool,
    pub has_wiki: bool,
    pub has_issues: bool,
    pub has_downloads: bool,
    pub created_at: DateTime<Utc>,
    pub pushed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contributor {
    pub login: Option<String>,
    pub contributions: u64,
}

/// One entry of a directory listing (`GET /repos/{owner}/{repo}/contents/{path}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
    Commit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub sha: String,
}

impl TreeEntry {
    pub fn is_blob(&self) -> bool {
        self.kind == EntryKind::Blob
    }
}

/// A git tree listing. `truncated` is set by the API when a recursive
/// listing exceeded its entry limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitTree {
    pub sha: String,
    #[serde(rename = "tree")]
    pub entries: Vec<TreeEntry>,
    #[serde(default)]
    pub truncated: bool,
}
