//! Per-element interaction testing.
//!
//! Element identity across reloads is positional: the page is reloaded before
//! every click and the element is looked up again by its index in the
//! enumeration. An element that moved out of range is reported as an
//! `Element Error` result instead of aborting the page.

use crate::browser::{EventTap, INTERACTIVE_SELECTOR, PageHandle};
use crate::classify::{InteractionSnapshot, classify, describe};
use crate::context::RunContext;
use crate::error::{Result, ScanError};
use crate::fake_data;
use crate::normalize::{is_same_origin, page_slug};
use crate::result::{
    BrokenLink, FakeDataFinding, InteractionResult, InteractiveElement, OutcomeKind, PageRun,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct InteractionTester {
    viewport: String,
    nav_timeout: Duration,
    click_timeout: Duration,
    settle_timeout: Duration,
    idle_timeout: Duration,
    max_elements: usize,
    screenshot_root: Option<PathBuf>,
}

impl InteractionTester {
    pub fn new(viewport: impl Into<String>) -> Self {
        Self {
            viewport: viewport.into(),
            nav_timeout: Duration::from_secs(15),
            click_timeout: Duration::from_secs(5),
            settle_timeout: Duration::from_secs(3),
            idle_timeout: Duration::from_secs(5),
            max_elements: 100,
            screenshot_root: None,
        }
    }

    pub fn with_nav_timeout(mut self, timeout: Duration) -> Self {
        self.nav_timeout = timeout;
        self
    }

    pub fn with_click_timeout(mut self, timeout: Duration) -> Self {
        self.click_timeout = timeout;
        self
    }

    pub fn with_settle_timeout(mut self, timeout: Duration) -> Self {
        self.settle_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_elements(mut self, max: usize) -> Self {
        self.max_elements = max;
        self
    }

    /// Save before/after screenshots under `root/<viewport>/`. `None` disables them.
    pub fn with_screenshots(mut self, root: Option<PathBuf>) -> Self {
        self.screenshot_root = root;
        self
    }

    /// Exercise every interactive element on `page_url`, then scan the page
    /// for placeholder content. Results, findings and the page timing are
    /// appended to `ctx`; nothing here fails the run.
    ///
    /// A page that fails to load, answers with an HTTP error or lands on
    /// another origin is recorded as a broken link and none of its elements
    /// are clicked.
    pub async fn test_page(
        &self,
        page: &dyn PageHandle,
        page_url: &str,
        ctx: &mut RunContext,
    ) -> PageRun {
        let started = Instant::now();
        info!("Testing {} @ {}", page_url, self.viewport);

        let status = match self.load(page, page_url).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Could not load {} for testing: {}", page_url, e);
                return self.abandon(page_url, None, Some(&e), started, ctx);
            }
        };
        if let Some(code) = status.filter(|code| *code >= 400) {
            warn!("{} answered {} while testing, skipping its elements", page_url, code);
            return self.abandon(page_url, Some(code), None, started, ctx);
        }

        let elements: Vec<InteractiveElement> =
            match page.query_elements(INTERACTIVE_SELECTOR).await {
                Ok(probes) => probes.into_iter().map(|p| p.element).collect(),
                Err(e) => {
                    warn!("Could not enumerate elements on {}: {}", page_url, e);
                    return self.abandon(page_url, None, Some(&e), started, ctx);
                }
            };

        let found = elements.len();
        if found > self.max_elements {
            info!(
                "{} has {} interactive elements, testing the first {}",
                page_url, found, self.max_elements
            );
        }

        let mut tested = 0;
        for (index, element) in elements.into_iter().take(self.max_elements).enumerate() {
            let result = self.test_element(page, page_url, index, element).await;
            debug!(
                "[{}] #{} {} -> {}",
                self.viewport, index, result.element.selector, result.outcome
            );
            ctx.record_result(result);
            tested += 1;
        }

        match self.scan_for_fake_data(page, page_url).await {
            Ok(findings) => {
                if !findings.is_empty() {
                    info!("{} placeholder finding(s) on {}", findings.len(), page_url);
                }
                ctx.record_fake_data(findings);
            }
            Err(e) => warn!("Fake-data scan of {} failed: {}", page_url, e),
        }

        let run = self.page_run(page_url, found, tested, started);
        ctx.record_page_run(run.clone());
        run
    }

    /// Record `page_url` as broken for this viewport and close its run empty.
    fn abandon(
        &self,
        page_url: &str,
        status: Option<u16>,
        error: Option<&ScanError>,
        started: Instant,
        ctx: &mut RunContext,
    ) -> PageRun {
        let target = match error {
            Some(ScanError::OffOrigin { landed, .. }) => landed.clone(),
            _ => page_url.to_string(),
        };
        ctx.record_broken_link(BrokenLink {
            route: page_url.to_string(),
            viewport: self.viewport.clone(),
            target,
            status,
            error: error.map(|e| e.to_string()),
        });

        let run = self.page_run(page_url, 0, 0, started);
        ctx.record_page_run(run.clone());
        run
    }

    /// Navigate to `page_url` and return its document status. Landing on
    /// another origin is an error.
    async fn load(&self, page: &dyn PageHandle, page_url: &str) -> Result<Option<u16>> {
        let status = page.goto(page_url, self.nav_timeout).await?;
        let landed = page.current_url().await?;
        if !is_same_origin(page_url, &landed) {
            return Err(ScanError::OffOrigin {
                url: page_url.to_string(),
                landed,
            });
        }
        if let Err(e) = page.wait_for_network_idle(self.idle_timeout).await {
            debug!("{} did not go idle: {}", page_url, e);
        }
        Ok(status)
    }

    async fn test_element(
        &self,
        page: &dyn PageHandle,
        page_url: &str,
        index: usize,
        original: InteractiveElement,
    ) -> InteractionResult {
        let started = Instant::now();
        let skipped = |element: InteractiveElement, outcome: OutcomeKind, notes: String| {
            let mut result = InteractionResult::without_interaction(
                page_url,
                &self.viewport,
                index,
                element,
                outcome,
                notes,
            );
            result.duration_ms = started.elapsed().as_millis() as u64;
            result
        };

        if let Err(e) = self.load(page, page_url).await {
            return skipped(
                original,
                OutcomeKind::FailElementError,
                format!("Element Error: reload failed: {}", e),
            );
        }

        let probe = match page.query_elements(INTERACTIVE_SELECTOR).await {
            Ok(mut probes) if index < probes.len() => probes.swap_remove(index),
            Ok(probes) => {
                return skipped(
                    original,
                    OutcomeKind::FailElementError,
                    format!(
                        "Element Error: element #{} missing after reload ({} found)",
                        index,
                        probes.len()
                    ),
                );
            }
            Err(e) => {
                return skipped(
                    original,
                    OutcomeKind::FailElementError,
                    format!("Element Error: {}", e),
                );
            }
        };

        let element = probe.element.clone();
        if !probe.has_size() {
            let notes = describe(OutcomeKind::FailHidden, &Default::default(), &Default::default());
            return skipped(element, OutcomeKind::FailHidden, notes);
        }
        if !probe.visible {
            let notes =
                describe(OutcomeKind::FailNotVisible, &Default::default(), &Default::default());
            return skipped(element, OutcomeKind::FailNotVisible, notes);
        }

        // Dropped on every return below, which detaches the listeners
        let mut tap = match page.subscribe().await {
            Ok(tap) => tap,
            Err(e) => {
                return skipped(
                    element,
                    OutcomeKind::FailClickError,
                    format!("Could not observe page events: {}", e),
                );
            }
        };

        let pre = snapshot(page, &mut tap).await;
        self.capture(page, page_url, index, "before").await;

        let click_error = match tokio::time::timeout(
            self.click_timeout,
            page.click(INTERACTIVE_SELECTOR, index),
        )
        .await
        {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("Click failed: {}", e)),
            Err(_) => Some(format!("Click timed out after {:?}", self.click_timeout)),
        };
        if let Some(notes) = click_error {
            return skipped(element, OutcomeKind::FailClickError, notes);
        }

        self.settle(page).await;

        let post = snapshot(page, &mut tap).await;
        self.capture(page, page_url, index, "after").await;
        let totals = tap.drain().clone();
        drop(tap);

        let outcome = classify(&pre, &post);
        let mut notes = describe(outcome, &pre, &post);
        match outcome {
            OutcomeKind::FailConsoleIssue => {
                if let Some(message) = &totals.first_console_message {
                    notes.push_str(&format!(": {}", message));
                }
            }
            OutcomeKind::FailApiError => {
                if let Some((url, status)) = &totals.first_failed_response {
                    notes.push_str(&format!(" ({} {})", status, url));
                }
            }
            _ => {}
        }

        let http_status = totals
            .document_status
            .or(totals.first_failed_response.as_ref().map(|(_, status)| *status))
            .map(|status| status.to_string());

        InteractionResult {
            page_url: page_url.to_string(),
            viewport: self.viewport.clone(),
            element_index: index,
            element,
            dom_changed: pre.dom_hash != post.dom_hash,
            modal_opened: post.modal_present && !pre.modal_present,
            opened_popup: post.popup_opened,
            console_issue_count: post.console_issues.saturating_sub(pre.console_issues),
            pre_url: pre.url,
            post_url: post.url,
            http_status,
            outcome,
            notes,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Whichever comes first: a committed navigation, network idle, or the
    /// settle delay. A waiter that errors drops out of the race.
    async fn settle(&self, page: &dyn PageHandle) {
        let navigation = async {
            if page.wait_for_navigation(self.settle_timeout).await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        let idle = async {
            if page.wait_for_network_idle(self.settle_timeout).await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = navigation => debug!("Settled on navigation"),
            _ = idle => debug!("Settled on network idle"),
            _ = tokio::time::sleep(self.settle_timeout) => debug!("Settled on delay"),
        }
    }

    async fn capture(&self, page: &dyn PageHandle, page_url: &str, index: usize, phase: &str) {
        let Some(path) = self.screenshot_path(page_url, index, phase) else {
            return;
        };
        match page.screenshot(&path).await {
            Ok(()) => {}
            Err(ScanError::Unsupported(what)) => debug!("Skipping screenshot: {} unsupported", what),
            Err(e) => warn!("Screenshot {} failed: {}", path.display(), e),
        }
    }

    /// `<root>/<viewport>/<page-slug>-<index>-<phase>.png`
    pub fn screenshot_path(&self, page_url: &str, index: usize, phase: &str) -> Option<PathBuf> {
        self.screenshot_root.as_ref().map(|root| {
            root.join(&self.viewport)
                .join(format!("{}-{}-{}.png", page_slug(page_url), index, phase))
        })
    }

    async fn scan_for_fake_data(
        &self,
        page: &dyn PageHandle,
        page_url: &str,
    ) -> Result<Vec<FakeDataFinding>> {
        self.load(page, page_url).await?;
        let text = page.rendered_text().await?;
        let html = page.html().await?;
        Ok(fake_data::scan_page(page_url, &self.viewport, &text, &html))
    }

    fn page_run(&self, url: &str, found: usize, tested: usize, started: Instant) -> PageRun {
        PageRun {
            url: url.to_string(),
            viewport: self.viewport.clone(),
            elements_found: found,
            elements_tested: tested,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Current page state plus the tap's running totals.
async fn snapshot(page: &dyn PageHandle, tap: &mut EventTap) -> InteractionSnapshot {
    let url = page.current_url().await.unwrap_or_default();
    let dom_hash = page.dom_fingerprint().await.unwrap_or_default();
    let modal_present = page.modal_present().await.unwrap_or(false);
    let totals = tap.drain();

    InteractionSnapshot {
        url,
        dom_hash,
        console_issues: totals.console_issues,
        network_errors: totals.network_errors,
        popup_opened: totals.popups > 0,
        modal_present,
    }
}
