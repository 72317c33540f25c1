use crate::git::Vcs;
use crate::models::{UpdateBranch, VcsError};
use std::sync::Arc;
use tracing::debug;

/// Answers questions about remote branches from the locally cached remote-tracking refs.
///
/// Nothing here touches the network: refs are refreshed once, when the workspace is
/// prepared, and every query reads that snapshot.
#[derive(Clone)]
pub struct BranchRegistry {
    vcs: Arc<dyn Vcs>,
}

impl BranchRegistry {
    pub fn new(vcs: Arc<dyn Vcs>) -> Self {
        Self { vcs }
    }

    /// Short names of the branches on `remote` matching the glob `pattern`.
    pub async fn list_branches(&self, remote: &str, pattern: &str) -> Result<Vec<String>, VcsError> {
        let mut branches: Vec<String> = self
            .vcs
            .remote_branches(remote)
            .await?
            .into_iter()
            .filter(|branch| glob_match(pattern, branch))
            .collect();
        branches.sort();
        branches.dedup();

        debug!(
            "Found {} branch(es) on {} matching '{}'",
            branches.len(),
            remote,
            pattern
        );

        Ok(branches)
    }

    pub async fn exists(&self, remote: &str, branch: &str) -> Result<bool, VcsError> {
        Ok(!self.list_branches(remote, branch).await?.is_empty())
    }

    /// Update branches for other versions of the same component on the same base.
    pub async fn superseded_by(
        &self,
        remote: &str,
        branch: &UpdateBranch,
    ) -> Result<Vec<String>, VcsError> {
        Ok(self
            .list_branches(remote, &branch.sibling_pattern())
            .await?
            .into_iter()
            .filter(|name| branch.is_sibling(name))
            .collect())
    }
}

/// Shell-style glob matching: `*` matches any run of characters, `?` exactly one.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // Position of the last '*' seen and the text position it was tried against
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            },
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            },
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                },
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
