use crate::result::{BrokenLink, FakeDataFinding, InteractionResult, PageRecord, PageRun};
use std::collections::HashSet;

/// Append-only collections for one audit run.
///
/// The orchestrator owns one context per viewport and merges them in
/// configuration order once every viewport has finished.
#[derive(Debug, Default, Clone)]
pub struct RunContext {
    pages: Vec<PageRecord>,
    page_urls: HashSet<String>,
    results: Vec<InteractionResult>,
    fake_data: Vec<FakeDataFinding>,
    broken_links: Vec<BrokenLink>,
    page_runs: Vec<PageRun>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a crawled page. Returns `false` if the URL was already recorded.
    pub fn record_page(&mut self, page: PageRecord) -> bool {
        if !self.page_urls.insert(page.url.clone()) {
            return false;
        }
        self.pages.push(page);
        true
    }

    pub fn record_result(&mut self, result: InteractionResult) {
        self.results.push(result);
    }

    pub fn record_fake_data(&mut self, findings: impl IntoIterator<Item = FakeDataFinding>) {
        self.fake_data.extend(findings);
    }

    pub fn record_broken_link(&mut self, link: BrokenLink) {
        self.broken_links.push(link);
    }

    pub fn record_page_run(&mut self, run: PageRun) {
        self.page_runs.push(run);
    }

    pub fn pages(&self) -> &[PageRecord] {
        &self.pages
    }

    /// Pages that loaded without an error status, in discovery order.
    pub fn reachable_pages(&self) -> impl Iterator<Item = &PageRecord> {
        self.pages.iter().filter(|p| p.is_reachable())
    }

    pub fn has_page(&self, url: &str) -> bool {
        self.page_urls.contains(url)
    }

    pub fn results(&self) -> &[InteractionResult] {
        &self.results
    }

    pub fn fake_data(&self) -> &[FakeDataFinding] {
        &self.fake_data
    }

    pub fn broken_links(&self) -> &[BrokenLink] {
        &self.broken_links
    }

    pub fn page_runs(&self) -> &[PageRun] {
        &self.page_runs
    }

    /// Append everything from `other`. Pages already present are skipped.
    pub fn merge(&mut self, other: RunContext) {
        for page in other.pages {
            self.record_page(page);
        }
        self.results.extend(other.results);
        self.fake_data.extend(other.fake_data);
        self.broken_links.extend(other.broken_links);
        self.page_runs.extend(other.page_runs);
    }
}
