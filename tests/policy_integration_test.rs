// Integration tests for the update policy
//
// These verify the decision for real-world tag scenarios, including the
// revision-only and release-branch rules that are easiest to get wrong

use crosswind::models::DecisionReason;
use crosswind::version::compare;
use crosswind::{UpdateAction, decide};
use std::cmp::Ordering;

fn action(tracked: Option<&str>, candidate: &str, base: &str, exists: bool) -> UpdateAction {
    decide(tracked, candidate, base, exists).unwrap().action
}

#[test]
fn test_version_comparison_integration() {
    let versions = ["0.9", "1.0.0", "1.2", "1.2.3", "1.2.3.1", "1.10.0", "2.0.0"];
    for a in versions {
        assert_eq!(compare(a, a), Ordering::Equal);
        for b in versions {
            assert_eq!(compare(a, b), compare(b, a).reverse(), "{} vs {}", a, b);
        }
    }

    assert_eq!(compare("1.2.3", "1.2"), compare("1.2.3", "1.2.0"));
    assert_eq!(compare("1.10.0", "1.9.9"), Ordering::Greater);
    assert_eq!(compare("1.2.3.1", "1.2.3"), Ordering::Greater);
    // Only four components take part
    assert_eq!(compare("1.2.3.4.5", "1.2.3.4.9"), Ordering::Equal);
}

#[test]
fn test_debian_tag_revisions() {
    let tracked = Some("bitnami/app:2.0.0-debian-10-r3");

    // Same revision
    assert_eq!(
        action(tracked, "bitnami/app:2.0.0-debian-10-r3", "main", false),
        UpdateAction::NoOp
    );

    // Newer revision refreshes an open update
    assert_eq!(
        action(tracked, "bitnami/app:2.0.0-debian-10-r4", "main", true),
        UpdateAction::RefreshExisting
    );

    // But never opens one on its own
    let decision = decide(tracked, "bitnami/app:2.0.0-debian-10-r4", "main", false).unwrap();
    assert_eq!(decision.action, UpdateAction::NoOp);
    assert_eq!(decision.reason, DecisionReason::RevisionOnlySuppressed);

    // Older revision
    assert_eq!(
        action(tracked, "bitnami/app:2.0.0-debian-10-r2", "main", true),
        UpdateAction::NoOp
    );
}

#[test]
fn test_release_branch_integration() {
    let tracked = Some("bitnami/app:1.9.0-r1");

    // Patch bump allowed
    assert_eq!(
        action(tracked, "bitnami/app:1.9.5-r0", "release-1.9", false),
        UpdateAction::CreateNew
    );
    assert_eq!(
        action(tracked, "bitnami/app:1.9.5-r0", "release-1.9", true),
        UpdateAction::RefreshExisting
    );

    // Minor and major bumps rejected
    assert_eq!(
        action(tracked, "bitnami/app:1.10.0-r0", "release-1.9", false),
        UpdateAction::RejectPolicy
    );
    assert_eq!(
        action(tracked, "bitnami/app:2.0.0-r0", "release-1.9", true),
        UpdateAction::RejectPolicy
    );

    // Downgrades are ignored rather than rejected
    assert_eq!(
        action(tracked, "bitnami/app:1.8.0-r0", "release-1.9", false),
        UpdateAction::NoOp
    );
}

#[test]
fn test_mainline_accepts_any_bump() {
    let tracked = Some("bitnami/app:1.9.0-r1");

    assert_eq!(
        action(tracked, "bitnami/app:2.0.0-r0", "main", false),
        UpdateAction::CreateNew
    );
    assert_eq!(
        action(tracked, "bitnami/app:1.10.0-r0", "main", true),
        UpdateAction::RefreshExisting
    );

    // Branches that only look like release branches follow mainline rules
    assert_eq!(
        action(tracked, "bitnami/app:2.0.0-r0", "release-next", false),
        UpdateAction::CreateNew
    );
}

#[test]
fn test_short_versions() {
    // 2.0 and 2.0.0 are the same version
    assert_eq!(
        action(Some("bitnami/app:2.0-r7"), "bitnami/app:2.0.0-r7", "main", true),
        UpdateAction::NoOp
    );
    assert_eq!(
        action(Some("bitnami/app:2.0-r7"), "bitnami/app:2.0.1-r0", "main", false),
        UpdateAction::CreateNew
    );
}

#[test]
fn test_untracked_and_invalid_input() {
    assert_eq!(
        action(None, "bitnami/app:1.0.0-r0", "main", true),
        UpdateAction::NoOp
    );

    assert!(decide(None, "bitnami/app:latest", "main", false).is_err());
    assert!(decide(None, "bitnami/app", "main", false).is_err());
}
