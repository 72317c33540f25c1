use serde::{Deserialize, Serialize};
use std::fmt;

pub const UPDATE_BRANCH_PREFIX: &str = "autoupdate";

/// Deterministically named branch carrying one proposed image bump.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpdateBranch {
    pub base_branch: String,
    pub component: String,
    pub version: String,
}

impl UpdateBranch {
    pub fn new(base_branch: &str, component: &str, version: &str) -> Self {
        Self {
            base_branch: base_branch.to_string(),
            component: component.to_string(),
            version: version.to_string(),
        }
    }

    pub fn name(&self) -> String {
        format!("{}{}", self.sibling_prefix(), self.version)
    }

    /// Glob matching every update branch for the same base and component.
    pub fn sibling_pattern(&self) -> String {
        format!("{}*", self.sibling_prefix())
    }

    fn sibling_prefix(&self) -> String {
        format!(
            "{}-{}-{}-",
            UPDATE_BRANCH_PREFIX, self.base_branch, self.component
        )
    }

    /// Whether `branch` proposes another version of the same component on the same base.
    ///
    /// The remainder after the prefix must look like a version so that component `app`
    /// never claims `autoupdate-main-app-exporter-1.0.0`.
    pub fn is_sibling(&self, branch: &str) -> bool {
        if branch == self.name() {
            return false;
        }

        branch
            .strip_prefix(&self.sibling_prefix())
            .is_some_and(|version| {
                !version.is_empty()
                    && version
                        .split('.')
                        .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
            })
    }
}

impl fmt::Display for UpdateBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
    NoOp,
    CreateNew,
    RefreshExisting,
    RejectPolicy,
}

impl UpdateAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoOp => "no_op",
            Self::CreateNew => "create_new",
            Self::RefreshExisting => "refresh_existing",
            Self::RejectPolicy => "reject_policy",
        }
    }
}

impl fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the policy engine reached its decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    NotTracked,
    TrackedVersionNewer,
    NoNewRevision,
    AlreadyProposed,
    RevisionOnlySuppressed,
    RevisionRefresh,
    ReleaseSeriesMismatch,
    VersionBumpRefresh,
    VersionBump,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotTracked => "image not referenced by this manifest",
            Self::TrackedVersionNewer => "tracked version already newer",
            Self::NoNewRevision => "no new revision",
            Self::AlreadyProposed => "update branch already pins this build",
            Self::RevisionOnlySuppressed => {
                "revision-only update suppressed unless a PR is already open"
            },
            Self::RevisionRefresh => "new revision for an open update",
            Self::ReleaseSeriesMismatch => "release branches accept only patch-level bumps",
            Self::VersionBumpRefresh => "newer version for an open update",
            Self::VersionBump => "newer version available",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDecision {
    pub action: UpdateAction,
    pub reason: DecisionReason,
}

impl UpdateDecision {
    pub fn new(action: UpdateAction, reason: DecisionReason) -> Self {
        Self { action, reason }
    }

    pub fn no_op(reason: DecisionReason) -> Self {
        Self::new(UpdateAction::NoOp, reason)
    }

    /// Whether this decision leads to a commit on an update branch.
    pub fn mutates(&self) -> bool {
        matches!(
            self.action,
            UpdateAction::CreateNew | UpdateAction::RefreshExisting
        )
    }
}

impl fmt::Display for UpdateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.action, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub number: u64,
    pub url: String,
}

/// What a single reconciliation did.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub component: String,
    pub base_branch: String,
    pub candidate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracked: Option<String>,
    pub decision: UpdateDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestRef>,
    pub pruned: Vec<String>,
    pub dry_run: bool,
}
