// Common test utilities for integration tests
//
// In-memory stand-ins for the git and pull-request collaborators. The fake git
// keeps one manifest snapshot per branch and writes it to disk on checkout, so
// the reconciler reads and mutates a real file exactly as it would in a clone.

#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use crosswind::git::{DEVELOPMENT_REMOTE, UPSTREAM_REMOTE, Vcs};
use crosswind::github::{PullRequestApi, PullRequestRequest};
use crosswind::models::{PullRequestRef, VcsError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const MANIFEST_NAME: &str = "containers.yaml";

#[derive(Default)]
struct RepoState {
    /// `<remote>/<branch>` -> manifest content
    remote: BTreeMap<String, String>,
    /// local branch -> manifest content
    local: BTreeMap<String, String>,
    current: Option<String>,
    commits: Vec<String>,
    pushes: Vec<String>,
    deleted_remote: Vec<String>,
    deleted_local: Vec<String>,
    pulls: Vec<String>,
    fail_push: bool,
    fail_pull: bool,
}

pub struct FakeVcs {
    manifest: PathBuf,
    state: Mutex<RepoState>,
}

impl FakeVcs {
    pub fn new(manifest: &Path) -> Self {
        Self {
            manifest: manifest.to_path_buf(),
            state: Mutex::new(RepoState::default()),
        }
    }

    /// Publish `content` as `branch` on the upstream remote
    pub fn with_upstream_branch(self, branch: &str, content: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .remote
            .insert(format!("{}/{}", UPSTREAM_REMOTE, branch), content.to_string());
        self
    }

    /// Publish `content` as `branch` on the development remote
    pub fn with_development_branch(self, branch: &str, content: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .remote
            .insert(format!("{}/{}", DEVELOPMENT_REMOTE, branch), content.to_string());
        self
    }

    /// Also keep a local copy of `branch`, as a previous run in this clone would
    pub fn with_local_branch(self, branch: &str, content: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .local
            .insert(branch.to_string(), content.to_string());
        self
    }

    pub fn failing_push(self) -> Self {
        self.state.lock().unwrap().fail_push = true;
        self
    }

    pub fn failing_pull(self) -> Self {
        self.state.lock().unwrap().fail_pull = true;
        self
    }

    pub fn pulls(&self) -> Vec<String> {
        self.state.lock().unwrap().pulls.clone()
    }

    pub fn commits(&self) -> Vec<String> {
        self.state.lock().unwrap().commits.clone()
    }

    pub fn pushes(&self) -> Vec<String> {
        self.state.lock().unwrap().pushes.clone()
    }

    pub fn deleted_remote(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_remote.clone()
    }

    pub fn deleted_local(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_local.clone()
    }

    pub fn local_branches(&self) -> Vec<String> {
        self.state.lock().unwrap().local.keys().cloned().collect()
    }

    pub fn development_content(&self, branch: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .remote
            .get(&format!("{}/{}", DEVELOPMENT_REMOTE, branch))
            .cloned()
    }
}

#[async_trait]
impl Vcs for FakeVcs {
    async fn remote_branches(&self, remote: &str) -> Result<Vec<String>, VcsError> {
        let prefix = format!("{}/", remote);
        Ok(self
            .state
            .lock()
            .unwrap()
            .remote
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .map(String::from)
            .collect())
    }

    async fn checkout(&self, branch: &str, start_point: &str) -> Result<(), VcsError> {
        let mut state = self.state.lock().unwrap();
        let content = state
            .remote
            .get(start_point)
            .or_else(|| state.local.get(start_point))
            .cloned()
            .ok_or_else(|| VcsError::new("checkout", format!("invalid reference: {}", start_point)))?;

        std::fs::write(&self.manifest, &content)
            .map_err(|e| VcsError::new("checkout", e.to_string()))?;
        state.local.insert(branch.to_string(), content);
        state.current = Some(branch.to_string());
        Ok(())
    }

    async fn pull(&self, _remote: &str, branch: &str) -> Result<(), VcsError> {
        let mut state = self.state.lock().unwrap();
        state.pulls.push(branch.to_string());
        if state.fail_pull {
            return Err(VcsError::new("pull", "Not possible to fast-forward, aborting."));
        }
        Ok(())
    }

    async fn commit(&self, _paths: &[PathBuf], message: &str) -> Result<bool, VcsError> {
        let mut state = self.state.lock().unwrap();
        let current = state
            .current
            .clone()
            .ok_or_else(|| VcsError::new("commit", "no branch checked out"))?;
        let content = std::fs::read_to_string(&self.manifest)
            .map_err(|e| VcsError::new("commit", e.to_string()))?;

        if state.local.get(&current) == Some(&content) {
            return Ok(false);
        }

        state.local.insert(current, content);
        state.commits.push(message.to_string());
        Ok(true)
    }

    async fn push(&self, remote: &str, branch: &str, _force: bool) -> Result<(), VcsError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_push {
            return Err(VcsError::new("push", "remote rejected"));
        }

        let content = state
            .local
            .get(branch)
            .cloned()
            .ok_or_else(|| VcsError::new("push", format!("src refspec {} does not match any", branch)))?;
        state.remote.insert(format!("{}/{}", remote, branch), content);
        state.pushes.push(branch.to_string());
        Ok(())
    }

    async fn delete_remote_branch(&self, remote: &str, branch: &str) -> Result<(), VcsError> {
        let mut state = self.state.lock().unwrap();
        state
            .remote
            .remove(&format!("{}/{}", remote, branch))
            .ok_or_else(|| VcsError::new("push", format!("remote ref does not exist: {}", branch)))?;
        state.deleted_remote.push(branch.to_string());
        Ok(())
    }

    async fn delete_local_branch(&self, branch: &str) -> Result<(), VcsError> {
        let mut state = self.state.lock().unwrap();
        state
            .local
            .remove(branch)
            .ok_or_else(|| VcsError::new("branch", format!("branch '{}' not found", branch)))?;
        state.deleted_local.push(branch.to_string());
        Ok(())
    }
}

/// Records pull requests instead of opening them
#[derive(Default)]
pub struct FakePullRequests {
    opened: Mutex<Vec<PullRequestRequest>>,
    fail: bool,
}

impl FakePullRequests {
    pub fn failing() -> Self {
        Self {
            opened: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn opened(&self) -> Vec<PullRequestRequest> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl PullRequestApi for FakePullRequests {
    async fn create_pull_request(&self, request: &PullRequestRequest) -> Result<PullRequestRef> {
        if self.fail {
            return Err(anyhow!("GitHub returned 502 Bad Gateway"));
        }

        let mut opened = self.opened.lock().unwrap();
        opened.push(request.clone());
        let number = opened.len() as u64;
        Ok(PullRequestRef {
            number,
            url: format!("https://github.com/bitnami/charts/pull/{}", number),
        })
    }
}

/// A manifest pinning one image per line, the way the chart repository does
pub fn manifest_with(images: &[(&str, &str)]) -> String {
    images
        .iter()
        .map(|(key, image)| format!("{}: {}\n", key, image))
        .collect()
}
