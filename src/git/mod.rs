use crate::config::BotConfig;
use crate::models::VcsError;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Remote the base branches are read from
pub const UPSTREAM_REMOTE: &str = "upstream";
/// Remote update branches are pushed to
pub const DEVELOPMENT_REMOTE: &str = "development";

lazy_static! {
    static ref URL_CREDENTIALS: Regex = Regex::new(r"(https?://)[^/@\s]+@").unwrap();
}

/// Version-control operations the reconciler drives.
///
/// Every failure is reported as an opaque [`VcsError`] carrying the operation and the
/// tool's own message.
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Short names of the branches known locally for `remote`.
    async fn remote_branches(&self, remote: &str) -> Result<Vec<String>, VcsError>;
    /// Check out `branch`, (re)creating it at `start_point`.
    async fn checkout(&self, branch: &str, start_point: &str) -> Result<(), VcsError>;
    async fn pull(&self, remote: &str, branch: &str) -> Result<(), VcsError>;
    /// Stage `paths` and commit them. Returns `false` when there was nothing to commit.
    async fn commit(&self, paths: &[PathBuf], message: &str) -> Result<bool, VcsError>;
    async fn push(&self, remote: &str, branch: &str, force: bool) -> Result<(), VcsError>;
    async fn delete_remote_branch(&self, remote: &str, branch: &str) -> Result<(), VcsError>;
    async fn delete_local_branch(&self, branch: &str) -> Result<(), VcsError>;
}

/// [`Vcs`] backed by the `git` command line inside a scratch clone.
pub struct GitCli {
    repo_dir: PathBuf,
}

impl GitCli {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Clone the upstream repository if needed, register both remotes, set the author
    /// identity and fetch. This is the only point where remote refs are read over the
    /// network.
    pub async fn prepare(config: &BotConfig) -> Result<Self, VcsError> {
        let git = Self::new(&config.workdir);
        let upstream_url = config.authenticated_url(&config.upstream_repo_url);
        let development_url = config.authenticated_url(&config.development_repo_url);

        if !config.workdir.join(".git").exists() {
            info!(
                "Cloning {} into {}",
                config.upstream_repo_url,
                config.workdir.display()
            );
            let target = config.workdir.to_string_lossy().into_owned();
            run_git(
                Path::new("."),
                &["clone", "--origin", UPSTREAM_REMOTE, &upstream_url, &target],
            )
            .await?;
        }

        git.ensure_remote(UPSTREAM_REMOTE, &upstream_url).await?;
        git.ensure_remote(DEVELOPMENT_REMOTE, &development_url)
            .await?;
        git.run(&["config", "user.name", &config.author.name])
            .await?;
        git.run(&["config", "user.email", &config.author.email])
            .await?;

        git.fetch(UPSTREAM_REMOTE).await?;
        git.fetch(DEVELOPMENT_REMOTE).await?;

        Ok(git)
    }

    pub async fn fetch(&self, remote: &str) -> Result<(), VcsError> {
        info!("Fetching {}", remote);
        self.run(&["fetch", "--prune", remote]).await.map(|_| ())
    }

    async fn ensure_remote(&self, name: &str, url: &str) -> Result<(), VcsError> {
        if run_git_status(&self.repo_dir, &["remote", "get-url", name]).await? {
            self.run(&["remote", "set-url", name, url]).await?;
        } else {
            self.run(&["remote", "add", name, url]).await?;
        }
        debug!("Remote {} points to {}", name, redact_credentials(url));
        Ok(())
    }

    async fn run(&self, args: &[&str]) -> Result<String, VcsError> {
        run_git(&self.repo_dir, args).await
    }
}

#[async_trait]
impl Vcs for GitCli {
    async fn remote_branches(&self, remote: &str) -> Result<Vec<String>, VcsError> {
        let prefix = format!("refs/remotes/{}/", remote);
        let output = self
            .run(&["for-each-ref", "--format=%(refname)", &prefix])
            .await?;

        Ok(output
            .lines()
            .filter_map(|line| line.trim().strip_prefix(&prefix))
            .filter(|branch| *branch != "HEAD")
            .filter_map(|branch| branch.rsplit('/').next())
            .map(String::from)
            .collect())
    }

    async fn checkout(&self, branch: &str, start_point: &str) -> Result<(), VcsError> {
        debug!("Checking out {} at {}", branch, start_point);
        self.run(&["checkout", "--force", "-B", branch, start_point])
            .await
            .map(|_| ())
    }

    async fn pull(&self, remote: &str, branch: &str) -> Result<(), VcsError> {
        self.run(&["pull", "--ff-only", remote, branch])
            .await
            .map(|_| ())
    }

    async fn commit(&self, paths: &[PathBuf], message: &str) -> Result<bool, VcsError> {
        let mut add: Vec<String> = vec!["add".to_string(), "--".to_string()];
        // git runs inside the clone, so paths must be relative to it
        add.extend(paths.iter().map(|p| {
            p.strip_prefix(&self.repo_dir)
                .unwrap_or(p)
                .to_string_lossy()
                .into_owned()
        }));
        let add: Vec<&str> = add.iter().map(String::as_str).collect();
        self.run(&add).await?;

        if run_git_status(&self.repo_dir, &["diff", "--cached", "--quiet"]).await? {
            debug!("Nothing to commit");
            return Ok(false);
        }

        self.run(&["commit", "--message", message]).await?;
        info!("Committed: {}", message);
        Ok(true)
    }

    async fn push(&self, remote: &str, branch: &str, force: bool) -> Result<(), VcsError> {
        let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);
        let mut args = vec!["push"];
        if force {
            args.push("--force");
        }
        args.extend([remote, refspec.as_str()]);

        self.run(&args).await?;
        info!("Pushed {} to {}", branch, remote);
        Ok(())
    }

    async fn delete_remote_branch(&self, remote: &str, branch: &str) -> Result<(), VcsError> {
        self.run(&["push", remote, "--delete", branch]).await?;
        info!("Deleted {} from {}", branch, remote);
        Ok(())
    }

    async fn delete_local_branch(&self, branch: &str) -> Result<(), VcsError> {
        self.run(&["branch", "-D", branch]).await.map(|_| ())
    }
}

async fn run_git(dir: &Path, args: &[&str]) -> Result<String, VcsError> {
    let operation = args.first().copied().unwrap_or("git");
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .await
        .map_err(|e| VcsError::new(operation, format!("failed to run git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VcsError::new(
            operation,
            redact_credentials(stderr.trim()),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run git and report whether it exited successfully.
async fn run_git_status(dir: &Path, args: &[&str]) -> Result<bool, VcsError> {
    let operation = args.first().copied().unwrap_or("git");
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .map(|output| output.status.success())
        .map_err(|e| VcsError::new(operation, format!("failed to run git: {}", e)))
}

/// Replace `user:token@` in URLs with `***@`.
pub fn redact_credentials(text: &str) -> String {
    URL_CREDENTIALS.replace_all(text, "${1}***@").into_owned()
}
