use serde::{Deserialize, Serialize};
use std::fmt;

/// Result category of a single element interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    OkNewTab,
    OkNavigated,
    OkClientRoute,
    OkModal,
    OkInplaceAction,
    FailNoEffect,
    FailConsoleIssue,
    FailApiError,
    FailHidden,
    FailNotVisible,
    FailClickError,
    FailElementError,
}

impl OutcomeKind {
    /// Every variant, in report order.
    pub const ALL: [OutcomeKind; 12] = [
        OutcomeKind::OkNewTab,
        OutcomeKind::OkNavigated,
        OutcomeKind::OkClientRoute,
        OutcomeKind::OkModal,
        OutcomeKind::OkInplaceAction,
        OutcomeKind::FailNoEffect,
        OutcomeKind::FailConsoleIssue,
        OutcomeKind::FailApiError,
        OutcomeKind::FailHidden,
        OutcomeKind::FailNotVisible,
        OutcomeKind::FailClickError,
        OutcomeKind::FailElementError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::OkNewTab => "OK_NEW_TAB",
            OutcomeKind::OkNavigated => "OK_NAVIGATED",
            OutcomeKind::OkClientRoute => "OK_CLIENT_ROUTE",
            OutcomeKind::OkModal => "OK_MODAL",
            OutcomeKind::OkInplaceAction => "OK_INPLACE_ACTION",
            OutcomeKind::FailNoEffect => "FAIL_NO_EFFECT",
            OutcomeKind::FailConsoleIssue => "FAIL_CONSOLE_ISSUE",
            OutcomeKind::FailApiError => "FAIL_API_ERROR",
            OutcomeKind::FailHidden => "FAIL_HIDDEN",
            OutcomeKind::FailNotVisible => "FAIL_NOT_VISIBLE",
            OutcomeKind::FailClickError => "FAIL_CLICK_ERROR",
            OutcomeKind::FailElementError => "FAIL_ELEMENT_ERROR",
        }
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            OutcomeKind::OkNewTab
                | OutcomeKind::OkNavigated
                | OutcomeKind::OkClientRoute
                | OutcomeKind::OkModal
                | OutcomeKind::OkInplaceAction
        )
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A page discovered by the crawler. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub depth: usize,
    pub discovered_from: Option<String>,
    pub http_status: Option<u16>,
    pub error: Option<String>,
}

impl PageRecord {
    pub fn new(url: String, depth: usize, discovered_from: Option<String>) -> Self {
        Self {
            url,
            depth,
            discovered_from,
            http_status: None,
            error: None,
        }
    }

    pub fn with_status(mut self, status: Option<u16>) -> Self {
        self.http_status = status;
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }

    /// True when the page loaded and did not answer with an HTTP error.
    pub fn is_reachable(&self) -> bool {
        self.error.is_none() && self.http_status.is_none_or(|status| status < 400)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractiveElement {
    pub selector: String,
    pub tag_name: String,
    pub text: String,
    pub aria_label: Option<String>,
    pub href: Option<String>,
    pub target: Option<String>,
    pub input_type: Option<String>,
}

impl InteractiveElement {
    /// Tag name qualified by the input type, e.g. `input[submit]`.
    pub fn element_type(&self) -> String {
        match &self.input_type {
            Some(kind) if self.tag_name == "input" => format!("input[{}]", kind),
            _ => self.tag_name.clone(),
        }
    }

    pub fn opens_new_tab(&self) -> bool {
        self.target.as_deref() == Some("_blank")
    }

    /// Short human label: visible text, then aria-label, then selector.
    pub fn label(&self) -> &str {
        if !self.text.is_empty() {
            &self.text
        } else if let Some(aria) = self.aria_label.as_deref().filter(|a| !a.is_empty()) {
            aria
        } else {
            &self.selector
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionResult {
    pub page_url: String,
    pub viewport: String,
    pub element_index: usize,
    pub element: InteractiveElement,
    pub pre_url: String,
    pub post_url: String,
    pub http_status: Option<String>,
    pub outcome: OutcomeKind,
    pub dom_changed: bool,
    pub modal_opened: bool,
    pub opened_popup: bool,
    pub console_issue_count: usize,
    pub notes: String,
    pub duration_ms: u64,
}

impl InteractionResult {
    /// A result for an element that was never clicked.
    pub fn without_interaction(
        page_url: &str,
        viewport: &str,
        element_index: usize,
        element: InteractiveElement,
        outcome: OutcomeKind,
        notes: String,
    ) -> Self {
        Self {
            page_url: page_url.to_string(),
            viewport: viewport.to_string(),
            element_index,
            element,
            pre_url: page_url.to_string(),
            post_url: page_url.to_string(),
            http_status: None,
            outcome,
            dom_changed: false,
            modal_opened: false,
            opened_popup: false,
            console_issue_count: 0,
            notes,
            duration_ms: 0,
        }
    }

    /// HTTP status as a number, when one was recorded.
    pub fn status_code(&self) -> Option<u16> {
        self.http_status.as_deref().and_then(|s| s.parse().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FakeDataFinding {
    pub page: String,
    pub viewport: String,
    pub pattern: String,
    pub matched_text: String,
    pub surrounding_context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrokenLink {
    /// Page the failing link was reached from (the target itself for crawl failures).
    pub route: String,
    pub viewport: String,
    pub target: String,
    pub status: Option<u16>,
    pub error: Option<String>,
}

impl BrokenLink {
    /// One-line description, e.g. `404 - http://host/missing`.
    pub fn describe(&self) -> String {
        let status = match (self.status, &self.error) {
            (Some(code), _) => code.to_string(),
            (None, Some(_)) => "ERROR".to_string(),
            (None, None) => "UNKNOWN".to_string(),
        };

        let mut line = format!("{} - {}", status, self.target);
        if self.route != self.target {
            line.push_str(&format!(" (from {} @ {})", self.route, self.viewport));
        }
        if self.status.is_none()
            && let Some(ref error) = self.error
        {
            line.push_str(&format!(": {}", error));
        }
        line
    }
}

/// Timing and element counts for one page in one viewport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRun {
    pub url: String,
    pub viewport: String,
    pub elements_found: usize,
    pub elements_tested: usize,
    pub duration_ms: u64,
}
