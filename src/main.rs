use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use crosswind::config::BotConfig;
use crosswind::git::GitCli;
use crosswind::github::{GithubClient, RepoSlug};
use crosswind::manifest::ManifestStore;
use crosswind::metrics;
use crosswind::models::{ImageReference, ReconcileOutcome, VersionSeries, split_image};
use crosswind::notifications::NotificationManager;
use crosswind::reconciler::{BatchSummary, ReconcilerSettings, UpdateReconciler, UpdateRequest};
use crosswind::registry::{DockerAuth, TagResolver};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "crosswind")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Proposes container image updates as pull requests", long_about = None)]
struct Cli {
    /// Emit JSON log lines and JSON results
    #[arg(long, global = true, env = "CROSSWIND_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile one image against one or more base branches
    Update {
        /// Image to propose, e.g. bitnami/redis:7.0.8-r0. Without a tag the newest
        /// published build is looked up in the registry.
        image: String,

        /// Base branch to update; repeat for several branches
        #[arg(short, long = "base", required = true)]
        bases: Vec<String>,

        /// Component name used in branch names (default: last segment of the image name)
        #[arg(short, long)]
        component: Option<String>,

        /// Decide and report without pushing, committing or opening pull requests
        #[arg(long)]
        dry_run: bool,
    },

    /// List the images pinned by the manifest in the work directory
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = BotConfig::from_env();
    init_tracing(cli.json || config.log_json);

    match cli.command {
        Commands::Update {
            image,
            bases,
            component,
            dry_run,
        } => update(&config, &image, &bases, component, dry_run, cli.json).await,
        Commands::List => list(&config, cli.json),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "crosswind=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn update(
    config: &BotConfig,
    image: &str,
    bases: &[String],
    component: Option<String>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    config.validate()?;
    metrics::register_metrics();

    info!("Starting crosswind for {} on {}", image, bases.join(", "));

    let git = Arc::new(GitCli::prepare(config).await?);

    let upstream = RepoSlug::from_url(&config.upstream_repo_url)?;
    let head_owner = RepoSlug::from_url(&config.development_repo_url)?.owner;
    let github = Arc::new(GithubClient::new(&config.github, upstream, head_owner)?);

    let reconciler = UpdateReconciler::new(
        git,
        github,
        ManifestStore::new(config.manifest_path()),
        NotificationManager::new(&config.notifications),
        ReconcilerSettings {
            pr_label: Some(config.pr_label.clone()),
            maintainers_file: Some(config.maintainers_path()),
        },
    );

    let resolver = match split_image(image) {
        (_, Some(_)) => None,
        (_, None) => Some(TagResolver::new(DockerAuth::load(
            config.docker_config.as_deref(),
        )?)),
    };

    let mut summary = BatchSummary::default();
    let mut requests = Vec::with_capacity(bases.len());
    for base in bases {
        match resolve_candidate(image, base, resolver.as_ref()).await {
            Ok(candidate) => {
                let mut request = UpdateRequest::new(candidate, base.as_str()).dry_run(dry_run);
                if let Some(component) = &component {
                    request = request.with_component(component.as_str());
                }
                requests.push(request);
            },
            Err(e) => {
                error!("Cannot determine a candidate for {} on {}: {:#}", image, base, e);
                summary.record_failure(base.as_str(), format!("{:#}", e));
            },
        }
    }

    reconciler.run_batch(requests, &mut summary).await;

    for outcome in &summary.outcomes {
        report(outcome, json)?;
    }

    if let Some(path) = &config.metrics_textfile {
        metrics::write_textfile(path)?;
    }

    if !summary.is_success() {
        bail!(
            "{} of {} base branch(es) failed",
            summary.failure_count(),
            bases.len()
        );
    }

    Ok(())
}

/// The tagged image as given, or the newest build from the registry. A release base only
/// considers builds from its own series.
async fn resolve_candidate(
    image: &str,
    base: &str,
    resolver: Option<&TagResolver>,
) -> Result<ImageReference> {
    match (split_image(image), resolver) {
        ((_, Some(_)), _) => image
            .parse()
            .with_context(|| format!("Invalid image reference '{}'", image)),
        ((name, None), Some(resolver)) => {
            let series = VersionSeries::from_release_branch(base);
            Ok(resolver.latest(name, series).await?)
        },
        ((_, None), None) => bail!("No registry resolver available for '{}'", image),
    }
}

fn report(outcome: &ReconcileOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(outcome)?);
        return Ok(());
    }

    let mut line = format!(
        "{} on {}: {}",
        outcome.component, outcome.base_branch, outcome.decision
    );
    if let Some(branch) = &outcome.branch {
        line.push_str(&format!(" [{}]", branch));
    }
    if let Some(pull_request) = &outcome.pull_request {
        line.push_str(&format!(" {}", pull_request.url));
    }
    if !outcome.pruned.is_empty() {
        line.push_str(&format!(" (pruned {})", outcome.pruned.join(", ")));
    }
    if outcome.dry_run {
        line.push_str(" (dry run)");
    }
    println!("{}", line);
    Ok(())
}

fn list(config: &BotConfig, json: bool) -> Result<()> {
    let store = ManifestStore::new(config.manifest_path());
    let images = store.tracked_images()?;

    if json {
        println!("{}", serde_json::to_string(&images)?);
    } else {
        for image in &images {
            println!("{}", image.full_name());
        }
    }

    Ok(())
}
