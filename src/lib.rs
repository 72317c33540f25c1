// Library exports for the binary and for integration testing
//
// The binary entrypoint in main.rs only wires configuration, logging and the
// collaborators together; everything it drives lives here.

pub mod branches;
pub mod config;
pub mod git;
pub mod github;
pub mod manifest;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod policy;
pub mod reconciler;
pub mod registry;
pub mod version;

// Re-export commonly used types
pub use config::BotConfig;
pub use models::{ImageReference, UpdateAction, UpdateDecision, UpdateError};
pub use reconciler::{UpdateReconciler, UpdateRequest};

/// Convenience wrapper around the policy engine taking full image references,
/// e.g. `decide("bitnami/app:1.9.0-r1", "bitnami/app:1.9.5-r0", "release-1.9", false)`.
pub fn decide(
    tracked: Option<&str>,
    candidate: &str,
    base_branch: &str,
    update_branch_exists: bool,
) -> Result<UpdateDecision, models::ReferenceError> {
    let tracked: Option<ImageReference> = tracked.map(str::parse).transpose()?;
    let candidate: ImageReference = candidate.parse()?;

    Ok(policy::PolicyEngine.decide(&policy::DecisionInput {
        tracked: tracked.as_ref(),
        candidate: &candidate,
        base_branch,
        update_branch_exists,
    }))
}
