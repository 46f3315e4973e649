pub mod config;
pub mod error;
pub mod models;
pub mod github;
pub mod extraction;
pub mod classifier;
pub mod storage;

pub use config::{Config, PipelineConfig};
pub use error::{Error, Result};
pub use github::{GitHubClient, GitHubRepository};
pub use extraction::{ExtractorKind, FeatureCache, FeatureExtractionPipeline, RepositoryApi};
pub use classifier::{Classifier, Label};
pub use models::{Feature, RepoId};
pub use storage::FeatureStore;
