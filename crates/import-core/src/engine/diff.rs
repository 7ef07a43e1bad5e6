//! Action decision
//!
//! Pure functions, no I/O: given the desired state of a record and what the
//! directory holds, pick the one action for this run.

use crate::config::GracePeriodConfig;
use crate::models::{AttributeDiff, DirectoryUserState, ExistingUser, ImportAction};

/// Action for a record present in the input
///
/// A different school means a move, carrying the remaining differences;
/// otherwise any difference outside `machine_managed` is a modify.
pub fn decide_action(
    desired: &DirectoryUserState,
    existing: Option<&ExistingUser>,
    machine_managed: &[String],
) -> ImportAction {
    let Some(existing) = existing else {
        return ImportAction::Create;
    };

    let diff = attribute_diff(desired, existing, machine_managed);
    if existing.school != desired.school {
        ImportAction::Move {
            from: existing.school.clone(),
            to: desired.school.clone(),
            diff,
        }
    } else if diff.is_empty() {
        ImportAction::NoOp
    } else {
        ImportAction::Modify(diff)
    }
}

/// Differences other than the school
///
/// Only attributes the desired state sets are compared. The engine fills
/// the desired state with the directory values of attributes the input does
/// not carry, so those never differ.
pub fn attribute_diff(
    desired: &DirectoryUserState,
    existing: &ExistingUser,
    machine_managed: &[String],
) -> AttributeDiff {
    let mut diff = AttributeDiff::default();

    if desired.role != existing.role {
        diff.push("role", existing.role.as_str(), desired.role.as_str());
    }

    let mut before = existing.schools.clone();
    let mut after = desired.schools.clone();
    before.sort();
    after.sort();
    if before != after {
        diff.push("schools", existing.schools.join(","), desired.schools.join(","));
    }

    if desired.disabled != existing.disabled {
        diff.push(
            "disabled",
            existing.disabled.to_string(),
            desired.disabled.to_string(),
        );
    }

    for (name, value) in &desired.attributes {
        if machine_managed.contains(name) {
            continue;
        }
        let current = existing.attributes.get(name).map(String::as_str).unwrap_or("");
        if current != value {
            diff.push(name.as_str(), current, value.as_str());
        }
    }

    diff
}

/// Action for a known user missing from the input for `elapsed_days`
///
/// Both periods count from the first run the user was missing. Removal wins
/// once its period is over; deactivation happens once.
pub fn decide_missing(
    elapsed_days: i64,
    grace: &GracePeriodConfig,
    already_disabled: bool,
) -> ImportAction {
    if elapsed_days >= i64::from(grace.deletion) {
        ImportAction::Remove
    } else if elapsed_days >= i64::from(grace.deactivation) && !already_disabled {
        ImportAction::Deactivate
    } else {
        ImportAction::NoOp
    }
}
