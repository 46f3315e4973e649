use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("GitHub API error: {0}")]
    GitHubApi(String),

    #[error("Rate limit exceeded, retry after {0} seconds")]
    RateLimited(u64),

    #[error("Not found or not accessible: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Classifier has not been fitted")]
    ModelNotFitted,

    #[error("Extractor '{extractor}' failed: {source}")]
    ExtractionFailed {
        extractor: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Worker pool is closed")]
    PoolClosed,

    #[error("Worker task did not complete: {0}")]
    TaskJoin(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the same request may succeed later, looking through
    /// extractor failures to their cause.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::RateLimited(_) | Error::Network(_) => true,
            Error::ExtractionFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// True for failures of the remote hosting API, as opposed to local errors.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::GitHubApi(_) | Error::RateLimited(_) | Error::NotFound(_) | Error::Network(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
