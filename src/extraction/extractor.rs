use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::extraction::api::RepositoryApi;
use crate::extraction::common::{
    self, AttributeExtractor, BranchExtractor, BuildFileExtractor, CommitCountExtractor,
    ContributorsExtractor, DescriptionKeywordExtractor, TotalFilesExtractor,
};
use crate::models::{Feature, RepoAttributes, RepoId};

/// One strategy turning remote repository data into named features.
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    fn kind(&self) -> ExtractorKind;

    fn repository(&self) -> &RepoId;

    /// Runs the remote queries and returns one feature per declared name.
    async fn extract(&self) -> Result<Extracted>;
}

/// Features produced by one extractor run.
///
/// `defaulted` is set when a remote failure was absorbed and the features
/// carry zeros rather than observed values.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub features: Vec<Feature>,
    pub defaulted: bool,
}

impl Extracted {
    pub fn complete(features: Vec<Feature>) -> Self {
        Self {
            features,
            defaulted: false,
        }
    }

    /// Every declared feature of `kind` set to `value`.
    pub fn valued(kind: ExtractorKind, value: f64) -> Self {
        Self::complete(
            kind.feature_names()
                .into_iter()
                .map(|name| Feature::with_value(name, value))
                .collect(),
        )
    }

    pub fn defaulted(kind: ExtractorKind) -> Self {
        Self {
            defaulted: true,
            ..Self::valued(kind, 0.0)
        }
    }
}

/// The registered extractor signals, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExtractorKind {
    ActiveTime,
    Branches,
    CommitCount,
    Contributors,
    Forks,
    HasBuildFile,
    HasDownloads,
    HasIssues,
    HasWiki,
    IsFork,
    DescriptionKeywords,
    OpenIssues,
    Size,
    Stars,
    TotalFiles,
    Watchers,
}

impl ExtractorKind {
    pub const ALL: [ExtractorKind; 16] = [
        ExtractorKind::ActiveTime,
        ExtractorKind::Branches,
        ExtractorKind::CommitCount,
        ExtractorKind::Contributors,
        ExtractorKind::Forks,
        ExtractorKind::HasBuildFile,
        ExtractorKind::HasDownloads,
        ExtractorKind::HasIssues,
        ExtractorKind::HasWiki,
        ExtractorKind::IsFork,
        ExtractorKind::DescriptionKeywords,
        ExtractorKind::OpenIssues,
        ExtractorKind::Size,
        ExtractorKind::Stars,
        ExtractorKind::TotalFiles,
        ExtractorKind::Watchers,
    ];

    /// Feature names this kind produces, known before anything runs.
    pub fn feature_names(self) -> Vec<String> {
        match self {
            ExtractorKind::DescriptionKeywords => common::DESCRIPTION_KEYWORDS
                .iter()
                .map(|kw| common::keyword_feature_name(kw))
                .collect(),
            other => other
                .single_feature_name()
                .map(|name| vec![name.to_string()])
                .unwrap_or_default(),
        }
    }

    /// Valueless placeholders for every declared feature.
    pub fn declared_features(self) -> Vec<Feature> {
        self.feature_names().into_iter().map(Feature::new).collect()
    }

    /// Name of the one feature a scalar kind produces; `None` for kinds
    /// declaring several features.
    fn single_feature_name(self) -> Option<&'static str> {
        let name = match self {
            ExtractorKind::ActiveTime => "Active time in days",
            ExtractorKind::Branches => "Number of branches",
            ExtractorKind::CommitCount => "Number of commits",
            ExtractorKind::Contributors => "Number of contributors",
            ExtractorKind::Forks => "Number of forks",
            ExtractorKind::HasBuildFile => "Has build file",
            ExtractorKind::HasDownloads => "Has downloads",
            ExtractorKind::HasIssues => "Has issues",
            ExtractorKind::HasWiki => "Has wiki",
            ExtractorKind::IsFork => "Is a fork",
            ExtractorKind::DescriptionKeywords => return None,
            ExtractorKind::OpenIssues => "Number of open issues",
            ExtractorKind::Size => "Size of repo",
            ExtractorKind::Stars => "Number of stars",
            ExtractorKind::TotalFiles => "Number of files",
            ExtractorKind::Watchers => "Number of watchers",
        };
        Some(name)
    }

    /// Builds a fresh extractor instance of this kind for `repo`.
    pub fn build(self, repo: Arc<dyn RepositoryApi>) -> Box<dyn FeatureExtractor> {
        let read: fn(&RepoAttributes) -> f64 = match self {
            ExtractorKind::Branches => return Box::new(BranchExtractor::new(repo)),
            ExtractorKind::CommitCount => return Box::new(CommitCountExtractor::new(repo)),
            ExtractorKind::Contributors => return Box::new(ContributorsExtractor::new(repo)),
            ExtractorKind::HasBuildFile => return Box::new(BuildFileExtractor::new(repo)),
            ExtractorKind::DescriptionKeywords => {
                return Box::new(DescriptionKeywordExtractor::new(repo))
            }
            ExtractorKind::TotalFiles => return Box::new(TotalFilesExtractor::new(repo)),
            ExtractorKind::ActiveTime => |a| {
                a.pushed_at
                    .map(|pushed| (pushed - a.created_at).num_days().max(0) as f64)
                    .unwrap_or(0.0)
            },
            ExtractorKind::Forks => |a| a.forks_count as f64,
            ExtractorKind::HasDownloads => |a| flag(a.has_downloads),
            ExtractorKind::HasIssues => |a| flag(a.has_issues),
            ExtractorKind::HasWiki => |a| flag(a.has_wiki),
            ExtractorKind::IsFork => |a| flag(a.fork),
            ExtractorKind::OpenIssues => |a| a.open_issues_count as f64,
            ExtractorKind::Size => |a| a.size as f64,
            ExtractorKind::Stars => |a| a.stargazers_count as f64,
            ExtractorKind::Watchers => |a| a.watchers_count as f64,
        };
        Box::new(AttributeExtractor::new(self, repo, read))
    }
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

fn flag(set: bool) -> f64 {
    if set {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_feature_names_are_unique() {
        let names: Vec<String> = ExtractorKind::ALL
            .iter()
            .flat_map(|k| k.feature_names())
            .collect();
        let unique: HashSet<&String> = names.iter().collect();
        assert_eq!(names.len(), unique.len());
        assert_eq!(names.len(), ExtractorKind::ALL.len() - 1 + common::DESCRIPTION_KEYWORDS.len());
    }

    #[test]
    fn test_declared_features_have_no_value() {
        let declared = ExtractorKind::DescriptionKeywords.declared_features();
        assert_eq!(declared.len(), 4);
        assert!(declared.iter().all(|f| !f.is_set()));
        assert_eq!(declared[0].name, "Contains keyword \"homework\"");
    }

    #[test]
    fn test_only_scalar_kinds_have_a_single_name() {
        assert_eq!(ExtractorKind::DescriptionKeywords.single_feature_name(), None);
        for kind in ExtractorKind::ALL {
            if kind != ExtractorKind::DescriptionKeywords {
                assert_eq!(kind.feature_names().len(), 1, "{}", kind);
            }
        }
    }

    #[tokio::test]
    async fn test_extracted_names_match_declared_names() {
        use crate::extraction::testing::StubRepository;

        let repo: Arc<dyn RepositoryApi> = Arc::new(StubRepository::new("octo/hello"));
        for kind in ExtractorKind::ALL {
            let extracted = kind.build(repo.clone()).extract().await.unwrap();
            let names: Vec<String> = extracted.features.into_iter().map(|f| f.name).collect();
            assert_eq!(names, kind.feature_names(), "{}", kind);
        }
    }

    #[test]
    fn test_defaulted_features_are_zero() {
        let extracted = Extracted::defaulted(ExtractorKind::DescriptionKeywords);
        assert!(extracted.defaulted);
        assert_eq!(extracted.features.len(), 4);
        assert!(extracted.features.iter().all(|f| f.value == Some(0.0)));
    }
}
