//! Mapping of a before/after interaction state diff onto an [`OutcomeKind`].
//!
//! The decision order is fixed: popup, URL change, modal, DOM change, and
//! finally "no effect". Console and network signals are applied afterwards as
//! amplifiers, and only to outcomes where the page stayed in place.

use crate::result::OutcomeKind;
use serde::{Deserialize, Serialize};
use url::Url;

/// Observable page state captured immediately before or after a click.
///
/// Counters are cumulative for the lifetime of the interaction's event tap,
/// so the classifier works on the difference between `pre` and `post`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionSnapshot {
    pub url: String,
    pub dom_hash: String,
    pub console_issues: usize,
    pub network_errors: usize,
    pub popup_opened: bool,
    pub modal_present: bool,
}

/// Classify an interaction. Pure: identical inputs give identical outputs.
pub fn classify(pre: &InteractionSnapshot, post: &InteractionSnapshot) -> OutcomeKind {
    amplify(primary_outcome(pre, post), pre, post)
}

/// The primary decision, before amplifiers.
pub fn primary_outcome(pre: &InteractionSnapshot, post: &InteractionSnapshot) -> OutcomeKind {
    if post.popup_opened && !pre.popup_opened {
        return OutcomeKind::OkNewTab;
    }

    if !same_location(&pre.url, &post.url) {
        return if is_full_navigation(&pre.url, &post.url) {
            OutcomeKind::OkNavigated
        } else {
            OutcomeKind::OkClientRoute
        };
    }

    if post.modal_present && !pre.modal_present {
        return OutcomeKind::OkModal;
    }

    if post.dom_hash != pre.dom_hash {
        return OutcomeKind::OkInplaceAction;
    }

    OutcomeKind::FailNoEffect
}

fn amplify(
    outcome: OutcomeKind,
    pre: &InteractionSnapshot,
    post: &InteractionSnapshot,
) -> OutcomeKind {
    if !matches!(
        outcome,
        OutcomeKind::OkModal | OutcomeKind::OkInplaceAction | OutcomeKind::FailNoEffect
    ) {
        return outcome;
    }

    if post.console_issues > pre.console_issues {
        OutcomeKind::FailConsoleIssue
    } else if post.network_errors > pre.network_errors {
        OutcomeKind::FailApiError
    } else {
        outcome
    }
}

/// URLs equal up to an empty trailing fragment; `href="#"` leaves the page where it was.
fn same_location(a: &str, b: &str) -> bool {
    a.strip_suffix('#').unwrap_or(a) == b.strip_suffix('#').unwrap_or(b)
}

/// A change of origin or path to an absolute http(s) URL. Fragment-only and
/// query-only changes, or non-http targets, count as client-side routing.
fn is_full_navigation(pre: &str, post: &str) -> bool {
    let Ok(post_url) = Url::parse(post) else {
        return false;
    };
    if !matches!(post_url.scheme(), "http" | "https") {
        return false;
    }

    match Url::parse(pre) {
        Ok(pre_url) => pre_url.origin() != post_url.origin() || pre_url.path() != post_url.path(),
        Err(_) => true,
    }
}

/// Short explanation recorded in the result notes.
pub fn describe(outcome: OutcomeKind, pre: &InteractionSnapshot, post: &InteractionSnapshot) -> String {
    match outcome {
        OutcomeKind::OkNewTab => "Opened a new tab or popup".to_string(),
        OutcomeKind::OkNavigated => format!("Navigated to {}", post.url),
        OutcomeKind::OkClientRoute => format!("Client-side route change to {}", post.url),
        OutcomeKind::OkModal => "Opened a modal or dialog".to_string(),
        OutcomeKind::OkInplaceAction => "Updated the page in place".to_string(),
        OutcomeKind::FailNoEffect => "No navigation, no modal, no DOM change".to_string(),
        OutcomeKind::FailConsoleIssue => format!(
            "{}; {} console error(s)/warning(s)",
            primary_note(pre, post),
            post.console_issues.saturating_sub(pre.console_issues)
        ),
        OutcomeKind::FailApiError => format!(
            "{}; {} HTTP response(s) >= 400",
            primary_note(pre, post),
            post.network_errors.saturating_sub(pre.network_errors)
        ),
        OutcomeKind::FailHidden => "Element has a zero-size bounding box".to_string(),
        OutcomeKind::FailNotVisible => "Element is not visible".to_string(),
        OutcomeKind::FailClickError => "Click failed".to_string(),
        OutcomeKind::FailElementError => "Element Error".to_string(),
    }
}

fn primary_note(pre: &InteractionSnapshot, post: &InteractionSnapshot) -> String {
    describe(primary_outcome(pre, post), pre, post)
}
