use crate::branches::BranchRegistry;
use crate::git::{DEVELOPMENT_REMOTE, UPSTREAM_REMOTE, Vcs};
use crate::github::{PullRequestApi, PullRequestRequest, read_maintainers};
use crate::manifest::ManifestStore;
use crate::metrics::{
    BRANCHES_PRUNED, BRANCHES_PUSHED, DECISIONS_TOTAL, POLICY_REJECTIONS_TOTAL,
    PULL_REQUESTS_OPENED, RECONCILE_DURATION, RECONCILE_ERRORS,
};
use crate::models::{
    DecisionReason, ImageReference, PullRequestRef, ReconcileOutcome, UpdateAction, UpdateBranch,
    UpdateDecision, UpdateError,
};
use crate::notifications::{NotificationEvent, NotificationManager, NotificationPayload};
use crate::policy::{DecisionInput, PolicyEngine};
use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Settings the reconciler needs beyond its collaborators.
#[derive(Debug, Clone, Default)]
pub struct ReconcilerSettings {
    /// Label applied to new pull requests
    pub pr_label: Option<String>,
    /// Plain-text reviewer list, one handle per line
    pub maintainers_file: Option<PathBuf>,
}

/// One candidate image proposed for one base branch.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub candidate: ImageReference,
    pub base_branch: String,
    /// Component name used in branch names and messages; defaults to the image's last
    /// path segment
    pub component: Option<String>,
    /// Decide and report without touching any branch, file or pull request
    pub dry_run: bool,
}

impl UpdateRequest {
    pub fn new(candidate: ImageReference, base_branch: impl Into<String>) -> Self {
        Self {
            candidate,
            base_branch: base_branch.into(),
            component: None,
            dry_run: false,
        }
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn component(&self) -> &str {
        self.component
            .as_deref()
            .unwrap_or_else(|| self.candidate.component_name())
    }
}

/// A base branch that did not reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub base_branch: String,
    pub reason: String,
    /// Refused by the release policy rather than an operational failure
    pub rejected: bool,
}

/// Results of reconciling one image against several base branches.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub outcomes: Vec<ReconcileOutcome>,
    pub failures: Vec<BatchFailure>,
}

impl BatchSummary {
    pub fn record_failure(&mut self, base_branch: impl Into<String>, reason: impl Into<String>) {
        self.failures.push(BatchFailure {
            base_branch: base_branch.into(),
            reason: reason.into(),
            rejected: false,
        });
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Whether the process should exit zero: no base was rejected or failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Drives branches, the manifest and pull requests according to the policy decision.
///
/// Every query is re-derived from repository state on each call, so re-running the same
/// request after a partial failure converges instead of duplicating work.
pub struct UpdateReconciler {
    vcs: Arc<dyn Vcs>,
    pull_requests: Arc<dyn PullRequestApi>,
    branches: BranchRegistry,
    manifest: ManifestStore,
    policy: PolicyEngine,
    notifications: NotificationManager,
    settings: ReconcilerSettings,
}

impl UpdateReconciler {
    pub fn new(
        vcs: Arc<dyn Vcs>,
        pull_requests: Arc<dyn PullRequestApi>,
        manifest: ManifestStore,
        notifications: NotificationManager,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            branches: BranchRegistry::new(vcs.clone()),
            vcs,
            pull_requests,
            manifest,
            policy: PolicyEngine,
            notifications,
            settings,
        }
    }

    pub async fn reconcile(&self, request: &UpdateRequest) -> Result<ReconcileOutcome, UpdateError> {
        let timer = RECONCILE_DURATION.start_timer();
        let result = self.reconcile_inner(request).await;
        timer.observe_duration();

        if let Err(e) = &result
            && !e.is_policy_rejection()
        {
            RECONCILE_ERRORS.inc();
            error!(
                "Failed to reconcile {} on {}: {}",
                request.component(),
                request.base_branch,
                e
            );
        }

        result
    }

    /// Reconcile every request in order. A rejection or failure on one base branch is
    /// recorded and the remaining bases still run.
    pub async fn run_batch(
        &self,
        requests: impl IntoIterator<Item = UpdateRequest>,
        summary: &mut BatchSummary,
    ) {
        for request in requests {
            match self.reconcile(&request).await {
                Ok(outcome) => summary.outcomes.push(outcome),
                Err(e) => {
                    let rejected = e.is_policy_rejection();
                    if rejected {
                        warn!("{}", e);
                    }
                    summary.failures.push(BatchFailure {
                        base_branch: request.base_branch.clone(),
                        reason: e.to_string(),
                        rejected,
                    });
                },
            }
        }
    }

    async fn reconcile_inner(&self, request: &UpdateRequest) -> Result<ReconcileOutcome, UpdateError> {
        let candidate = &request.candidate;
        let base = request.base_branch.as_str();
        let component = request.component();
        let update_branch = UpdateBranch::new(base, component, candidate.version_text());
        let branch_name = update_branch.name();

        info!(
            "Reconciling {} on {} (candidate {})",
            component,
            base,
            candidate.full_name()
        );

        let branch_exists = self.branches.exists(DEVELOPMENT_REMOTE, &branch_name).await?;

        // The base branch is the source of truth for what is pinned; an update branch may
        // be stale or hand-made and must not widen what the policy allows
        self.vcs
            .checkout(base, &remote_ref(UPSTREAM_REMOTE, base))
            .await?;

        let tracked = self.manifest.tracked_reference(&candidate.name)?;
        if tracked.is_none() {
            warn!(
                "{} is not referenced by {}; nothing to update on {}",
                candidate.name,
                self.manifest.path().display(),
                base
            );
        }

        let mut decision = self.policy.decide(&DecisionInput {
            tracked: tracked.as_ref(),
            candidate,
            base_branch: base,
            update_branch_exists: branch_exists,
        });

        if decision.action == UpdateAction::RefreshExisting
            && self.already_proposed(&branch_name, candidate).await?
        {
            decision = UpdateDecision::no_op(DecisionReason::AlreadyProposed);
        }

        DECISIONS_TOTAL
            .with_label_values(&[decision.action.as_str()])
            .inc();

        let mut outcome = ReconcileOutcome {
            component: component.to_string(),
            base_branch: base.to_string(),
            candidate: candidate.full_name(),
            tracked: tracked.as_ref().map(ImageReference::full_name),
            decision,
            branch: decision.mutates().then(|| branch_name.clone()),
            pull_request: None,
            pruned: Vec::new(),
            dry_run: request.dry_run,
        };

        match decision.action {
            UpdateAction::NoOp => {
                info!("Nothing to do for {} on {}: {}", component, base, decision.reason);
                return Ok(outcome);
            },
            UpdateAction::RejectPolicy => {
                POLICY_REJECTIONS_TOTAL.inc();
                if !request.dry_run {
                    self.notify(NotificationEvent::UpdateRejected, request, &outcome)
                        .await;
                }
                return Err(UpdateError::PolicyRejection {
                    component: component.to_string(),
                    base_branch: base.to_string(),
                    reason: decision.reason.to_string(),
                });
            },
            _ if request.dry_run => {
                info!(
                    "Dry run: would {} {} for {} on {}",
                    decision.action, branch_name, component, base
                );
                return Ok(outcome);
            },
            UpdateAction::CreateNew => {
                let old = outcome.tracked.clone().unwrap_or_default();
                outcome.pull_request = Some(
                    self.create_update(&update_branch, candidate, &old, &decision)
                        .await?,
                );
                self.notify(NotificationEvent::UpdateProposed, request, &outcome)
                    .await;
            },
            UpdateAction::RefreshExisting => {
                self.refresh_update(&update_branch, candidate).await?;
                self.notify(NotificationEvent::UpdateRefreshed, request, &outcome)
                    .await;
            },
        }

        outcome.pruned = self.prune_superseded(&update_branch).await?;
        Ok(outcome)
    }

    /// Check out the open update branch and report whether it already pins `candidate`
    /// or a newer build of the same version.
    async fn already_proposed(
        &self,
        branch_name: &str,
        candidate: &ImageReference,
    ) -> Result<bool, UpdateError> {
        self.vcs
            .checkout(branch_name, &remote_ref(DEVELOPMENT_REMOTE, branch_name))
            .await?;

        let proposed = self.manifest.tracked_reference(&candidate.name)?;
        debug!(
            "{} pins {}",
            branch_name,
            proposed
                .as_ref()
                .map_or_else(|| "nothing".to_string(), ImageReference::full_name)
        );

        Ok(proposed.is_some_and(|proposed| proposed.compare_build(candidate) != Ordering::Less))
    }

    async fn create_update(
        &self,
        branch: &UpdateBranch,
        candidate: &ImageReference,
        old_image: &str,
        decision: &UpdateDecision,
    ) -> Result<PullRequestRef, UpdateError> {
        let name = branch.name();
        self.vcs
            .checkout(&name, &remote_ref(UPSTREAM_REMOTE, &branch.base_branch))
            .await?;

        self.apply_and_push(branch, candidate).await?;

        let request = PullRequestRequest {
            base: branch.base_branch.clone(),
            head_branch: name,
            title: pull_request_title(branch, old_image, &candidate.full_name()),
            body: pull_request_body(old_image, candidate, decision),
            label: self.settings.pr_label.clone(),
            reviewers: self.reviewers(),
        };

        let pull_request = self
            .pull_requests
            .create_pull_request(&request)
            .await
            .map_err(|e| UpdateError::PullRequest(format!("{:#}", e)))?;
        PULL_REQUESTS_OPENED.inc();

        Ok(pull_request)
    }

    async fn refresh_update(
        &self,
        branch: &UpdateBranch,
        candidate: &ImageReference,
    ) -> Result<(), UpdateError> {
        let name = branch.name();

        // The branch is already checked out by `already_proposed`.
        // Pick up manual edits pushed to it; a failure here is not fatal
        if let Err(e) = self.vcs.pull(DEVELOPMENT_REMOTE, &name).await {
            warn!("Could not pull {} before refreshing it: {}", name, e);
        }

        self.apply_and_push(branch, candidate).await
    }

    /// Mutate the manifest, commit, then force-push. Committing before pushing means an
    /// interrupted run leaves at most an unpushed local commit behind.
    async fn apply_and_push(
        &self,
        branch: &UpdateBranch,
        candidate: &ImageReference,
    ) -> Result<(), UpdateError> {
        let name = branch.name();
        self.manifest.set_component_image(candidate)?;

        let message = commit_message(&branch.component, &candidate.full_name());
        let committed = self
            .vcs
            .commit(&[self.manifest.path().to_path_buf()], &message)
            .await?;
        if !committed {
            debug!("Manifest on {} already pins {}", name, candidate.full_name());
        }

        self.vcs.push(DEVELOPMENT_REMOTE, &name, true).await?;
        BRANCHES_PUSHED.inc();
        Ok(())
    }

    /// Delete update branches for other versions of the same component on the same base.
    async fn prune_superseded(&self, branch: &UpdateBranch) -> Result<Vec<String>, UpdateError> {
        let superseded = self
            .branches
            .superseded_by(DEVELOPMENT_REMOTE, branch)
            .await?;

        for name in &superseded {
            info!("Pruning superseded update branch {}", name);
            self.vcs.delete_remote_branch(DEVELOPMENT_REMOTE, name).await?;

            // The local copy only exists when this clone created or refreshed the branch
            if let Err(e) = self.vcs.delete_local_branch(name).await {
                debug!("No local branch {} to delete: {}", name, e);
            }
            BRANCHES_PRUNED.inc();
        }

        Ok(superseded)
    }

    fn reviewers(&self) -> Vec<String> {
        let Some(path) = &self.settings.maintainers_file else {
            return Vec::new();
        };

        read_maintainers(path).unwrap_or_else(|e| {
            warn!("Ignoring maintainers file: {:#}", e);
            Vec::new()
        })
    }

    async fn notify(&self, event: NotificationEvent, request: &UpdateRequest, outcome: &ReconcileOutcome) {
        let mut payload = NotificationPayload::new(
            event,
            &outcome.component,
            &outcome.base_branch,
            request.candidate.full_name(),
            outcome.decision.reason.as_str(),
        );
        if let Some(tracked) = &outcome.tracked {
            payload = payload.with_current_image(tracked);
        }
        if let Some(branch) = &outcome.branch {
            payload = payload.with_branch(branch);
        }
        if let Some(pull_request) = &outcome.pull_request {
            payload = payload.with_pull_request_url(&pull_request.url);
        }

        self.notifications.notify(&payload).await;
    }
}

fn remote_ref(remote: &str, branch: &str) -> String {
    format!("{}/{}", remote, branch)
}

pub fn commit_message(component: &str, full_name: &str) -> String {
    format!("{}: component image updated to '{}'", component, full_name)
}

pub fn pull_request_title(branch: &UpdateBranch, old_image: &str, new_image: &str) -> String {
    format!(
        "[maintenance/{}] '{}' updated '{}' -> '{}'",
        branch.base_branch, branch.component, old_image, new_image
    )
}

fn pull_request_body(old_image: &str, candidate: &ImageReference, decision: &UpdateDecision) -> String {
    format!(
        "Automated update of `{}`.\n\n\
         | | Image |\n\
         |---|---|\n\
         | Current | `{}` |\n\
         | Proposed | `{}` |\n\n\
         Decision: {}\n",
        candidate.name,
        old_image,
        candidate.full_name(),
        decision
    )
}
