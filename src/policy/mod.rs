use crate::models::{
    DecisionReason, ImageReference, UpdateAction, UpdateDecision, VersionSeries,
};
use std::cmp::Ordering;
use tracing::{debug, info};

/// Everything the decision needs, fetched up front by the reconciler.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    /// Reference currently pinned in the manifest, if the image is tracked at all
    pub tracked: Option<&'a ImageReference>,
    pub candidate: &'a ImageReference,
    pub base_branch: &'a str,
    /// Whether the update branch for the candidate version already exists on the remote
    pub update_branch_exists: bool,
}

pub struct PolicyEngine;

impl PolicyEngine {
    /// Decide whether and how the candidate image should be proposed.
    ///
    /// Pure: the decision only depends on `input` and never touches the outside world.
    pub fn decide(&self, input: &DecisionInput<'_>) -> UpdateDecision {
        let Some(tracked) = input.tracked else {
            debug!(
                "Image {} is not tracked by the manifest",
                input.candidate.name
            );
            return UpdateDecision::no_op(DecisionReason::NotTracked);
        };

        let decision = match input.candidate.compare_version(tracked) {
            Ordering::Less => UpdateDecision::no_op(DecisionReason::TrackedVersionNewer),
            Ordering::Equal => self.same_version_decision(input, tracked),
            Ordering::Greater => self.version_bump_decision(input, tracked),
        };

        info!(
            "Policy decision for {} on {}: tracked={}, candidate={}, branch_exists={}, decision={}",
            input.candidate.name,
            input.base_branch,
            tracked.tag(),
            input.candidate.tag(),
            input.update_branch_exists,
            decision
        );

        decision
    }

    fn same_version_decision(
        &self,
        input: &DecisionInput<'_>,
        tracked: &ImageReference,
    ) -> UpdateDecision {
        if input.candidate.revision <= tracked.revision {
            return UpdateDecision::no_op(DecisionReason::NoNewRevision);
        }

        self.revision_only_decision(input.update_branch_exists)
    }

    /// A rebuild of the same version only refreshes an update that is already open;
    /// it never opens a new pull request on its own.
    fn revision_only_decision(&self, update_branch_exists: bool) -> UpdateDecision {
        if update_branch_exists {
            UpdateDecision::new(
                UpdateAction::RefreshExisting,
                DecisionReason::RevisionRefresh,
            )
        } else {
            UpdateDecision::no_op(DecisionReason::RevisionOnlySuppressed)
        }
    }

    fn version_bump_decision(
        &self,
        input: &DecisionInput<'_>,
        tracked: &ImageReference,
    ) -> UpdateDecision {
        if is_release_branch(input.base_branch)
            && input.candidate.version.series() != tracked.version.series()
        {
            return UpdateDecision::new(
                UpdateAction::RejectPolicy,
                DecisionReason::ReleaseSeriesMismatch,
            );
        }

        if input.update_branch_exists {
            UpdateDecision::new(
                UpdateAction::RefreshExisting,
                DecisionReason::VersionBumpRefresh,
            )
        } else {
            UpdateDecision::new(UpdateAction::CreateNew, DecisionReason::VersionBump)
        }
    }
}

/// Whether `branch` follows the `release-<major>.<minor>` convention.
pub fn is_release_branch(branch: &str) -> bool {
    VersionSeries::from_release_branch(branch).is_some()
}
