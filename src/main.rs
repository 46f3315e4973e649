use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use repoclass::extraction::Extraction;
use repoclass::{
    Classifier, Config, ExtractorKind, Feature, FeatureCache, FeatureExtractionPipeline,
    FeatureStore, GitHubClient, GitHubRepository, Label, PipelineConfig, RepoId, RepositoryApi,
};

/// Repositories extracted at the same time while building a training set
const CONCURRENT_REPOS: usize = 4;

#[derive(Parser, Debug)]
#[command(name = "repoclass")]
#[command(version = "0.1.0")]
#[command(about = "Extract repository features from GitHub and classify repositories")]
struct Args {
    /// Database path for stored features (defaults to DATABASE_PATH or repoclass.db)
    #[arg(long, global = true)]
    database: Option<String>,

    /// Omit features of failing extractors instead of aborting
    #[arg(long, global = true)]
    lenient: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract and store features of one or more repositories
    Extract {
        /// Repositories as owner/name or URL
        #[arg(required = true)]
        repos: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Train on labelled repositories, then classify the given ones
    Classify {
        /// File with one "owner/name label" pair per line
        #[arg(short, long)]
        training: PathBuf,

        /// Learning algorithm
        #[arg(short, long, value_enum, default_value = "tree")]
        algorithm: AlgorithmChoice,

        /// Re-extract training repositories even if features are stored
        #[arg(long)]
        refresh: bool,

        /// Repositories to classify
        #[arg(required = true)]
        repos: Vec<String>,
    },

    /// Manage stored features
    Features {
        #[command(subcommand)]
        action: FeaturesAction,
    },
}

#[derive(Subcommand, Debug)]
enum FeaturesAction {
    /// List distinct stored feature names
    List,
    /// List stored repositories with the time of their last extraction
    Repos,
    /// Delete stored features by name, or all of them
    Delete {
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        name: Option<String>,
        #[arg(long)]
        all: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Text,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum AlgorithmChoice {
    Tree,
    Knn,
}

#[derive(Serialize)]
struct ExtractionOutput<'a> {
    repository: String,
    features: &'a [Feature],
    failed: &'a [ExtractorKind],
    defaulted: &'a [ExtractorKind],
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("repoclass=info".parse()?)
                .add_directive("reqwest=warn".parse()?),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let database = args
        .database
        .clone()
        .or_else(|| std::env::var("DATABASE_PATH").ok())
        .unwrap_or_else(|| "repoclass.db".to_string());
    let store = FeatureStore::new(&database)?;

    match args.command {
        Command::Features { action } => manage_features(&store, action),
        Command::Extract { ref repos, format } => {
            let repos = parse_repos(repos)?;
            let (client, pipeline) = connect(args.lenient)?;
            let result = run_extract(&client, &pipeline, &store, &repos, format).await;
            pipeline.close().await;
            result
        }
        Command::Classify {
            ref training,
            algorithm,
            refresh,
            ref repos,
        } => {
            let targets = parse_repos(repos)?;
            let training_set = read_training_file(training)?;
            let (client, pipeline) = connect(args.lenient)?;
            let result = run_classify(
                &client,
                &pipeline,
                &store,
                &training_set,
                &targets,
                algorithm,
                refresh,
            )
            .await;
            pipeline.close().await;
            result
        }
    }
}

fn connect(lenient: bool) -> anyhow::Result<(Arc<GitHubClient>, FeatureExtractionPipeline)> {
    let mut config = Config::from_env()?;
    if lenient {
        config.strict = false;
    }

    let client = Arc::new(GitHubClient::with_base_url(&config.github_token, &config.api_url)?);
    let pipeline = FeatureExtractionPipeline::new(
        ExtractorKind::ALL.to_vec(),
        Arc::new(FeatureCache::new()),
        PipelineConfig::from(&config),
    );
    Ok((client, pipeline))
}

fn parse_repos(repos: &[String]) -> anyhow::Result<Vec<RepoId>> {
    repos
        .iter()
        .map(|r| r.parse::<RepoId>().map_err(Into::into))
        .collect()
}

fn read_training_file(path: &Path) -> anyhow::Result<Vec<(RepoId, Label)>> {
    let text = std::fs::read_to_string(path)?;
    let mut pairs = Vec::new();

    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(repo), Some(label)) => pairs.push((repo.parse()?, label.to_string())),
            _ => anyhow::bail!("{}:{}: expected \"owner/name label\"", path.display(), number + 1),
        }
    }

    if pairs.is_empty() {
        anyhow::bail!("{} contains no training repositories", path.display());
    }
    Ok(pairs)
}

async fn extract_one(
    client: &Arc<GitHubClient>,
    pipeline: &FeatureExtractionPipeline,
    repo: &RepoId,
) -> repoclass::Result<Extraction> {
    let remote: Arc<dyn RepositoryApi> = Arc::new(GitHubRepository::new(client.clone(), repo.clone()));
    pipeline.extract(remote).await
}

async fn run_extract(
    client: &Arc<GitHubClient>,
    pipeline: &FeatureExtractionPipeline,
    store: &FeatureStore,
    repos: &[RepoId],
    format: Format,
) -> anyhow::Result<()> {
    for repo in repos {
        let extraction = extract_one(client, pipeline, repo).await?;
        if extraction.is_degraded() {
            tracing::warn!(
                "Features of {} are not stored, missing: {:?}, defaulted: {:?}",
                repo,
                extraction.failed,
                extraction.defaulted
            );
        } else {
            store.save_features(repo, &extraction.features)?;
        }

        match format {
            Format::Json => {
                let output = ExtractionOutput {
                    repository: repo.to_string(),
                    features: &extraction.features,
                    failed: &extraction.failed,
                    defaulted: &extraction.defaulted,
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            Format::Text => print!("{}", format_text(repo, &extraction)),
        }
    }
    Ok(())
}

fn format_text(repo: &RepoId, extraction: &Extraction) -> String {
    let mut output = format!("\n=== {} ===\n", repo);
    for feature in &extraction.features {
        let value = feature
            .value
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        output.push_str(&format!("  {}: {}\n", feature.name, value));
    }
    if !extraction.failed.is_empty() {
        output.push_str(&format!("  (unavailable: {:?})\n", extraction.failed));
    }
    if !extraction.defaulted.is_empty() {
        output.push_str(&format!("  (defaulted to 0: {:?})\n", extraction.defaulted));
    }
    output
}

async fn run_classify(
    client: &Arc<GitHubClient>,
    pipeline: &FeatureExtractionPipeline,
    store: &FeatureStore,
    training_set: &[(RepoId, Label)],
    targets: &[RepoId],
    algorithm: AlgorithmChoice,
    refresh: bool,
) -> anyhow::Result<()> {
    let names = pipeline.feature_names();
    let mut samples: Vec<Vec<Feature>> = Vec::new();
    let mut labels: Vec<Label> = Vec::new();
    let mut pending: Vec<&(RepoId, Label)> = Vec::new();

    for entry in training_set {
        let stored = if refresh {
            None
        } else {
            store.load_matching(&entry.0, &names)?
        };
        match stored {
            Some(features) => {
                samples.push(features);
                labels.push(entry.1.clone());
            }
            None => pending.push(entry),
        }
    }
    tracing::info!(
        "{} training repositories stored, {} to extract",
        samples.len(),
        pending.len()
    );

    let pb = ProgressBar::new(pending.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} repos")?
            .progress_chars("#>-"),
    );

    let extracted: Vec<_> = stream::iter(pending)
        .map(|(repo, label)| {
            let pb = pb.clone();
            async move {
                let result = extract_one(client, pipeline, repo).await;
                pb.inc(1);
                (repo, label, result)
            }
        })
        .buffered(CONCURRENT_REPOS)
        .collect()
        .await;
    pb.finish_with_message("Training features extracted");

    for (repo, label, result) in extracted {
        match result {
            Ok(extraction) if !extraction.is_degraded() => {
                store.save_features(repo, &extraction.features)?;
                samples.push(extraction.features);
                labels.push(label.clone());
            }
            Ok(extraction) => {
                tracing::warn!(
                    "Skipping {}: missing {:?}, defaulted {:?}",
                    repo,
                    extraction.failed,
                    extraction.defaulted
                );
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!("Skipping {}, retry later: {}", repo, e)
            }
            Err(e) => tracing::warn!("Skipping {}: {}", repo, e),
        }
    }

    let mut classifier = match algorithm {
        AlgorithmChoice::Tree => Classifier::decision_tree(),
        AlgorithmChoice::Knn => Classifier::k_nearest_neighbors(),
    };
    classifier.fit(&samples, &labels)?;
    tracing::info!("Trained {} on {} repositories", classifier.name(), samples.len());

    for repo in targets {
        let extraction = extract_one(client, pipeline, repo).await?;
        if !extraction.is_complete() {
            tracing::warn!("Cannot classify {}, missing {:?}", repo, extraction.failed);
            println!("{}\t(unavailable)", repo);
            continue;
        }
        if extraction.is_degraded() {
            tracing::warn!(
                "Classifying {} with defaulted features {:?}",
                repo,
                extraction.defaulted
            );
        } else {
            store.save_features(repo, &extraction.features)?;
        }
        let prediction = classifier.predict(&[extraction.features])?;
        println!("{}\t{}", repo, prediction.join(","));
    }

    Ok(())
}

fn manage_features(store: &FeatureStore, action: FeaturesAction) -> anyhow::Result<()> {
    match action {
        FeaturesAction::List => {
            for name in store.distinct_names()? {
                println!("{}", name);
            }
        }
        FeaturesAction::Repos => {
            for repo in store.repositories()? {
                let at = store.last_extracted(&repo)?.unwrap_or_else(|| "-".to_string());
                println!("{}\t{}", repo, at);
            }
        }
        FeaturesAction::Delete { name: Some(name), .. } => {
            let deleted = store.delete_by_name(&name)?;
            println!("{} features have been deleted.", deleted);
        }
        FeaturesAction::Delete { name: None, all } => {
            if all {
                let deleted = store.delete_all()?;
                println!("{} features have been deleted.", deleted);
            }
        }
    }
    Ok(())
}
