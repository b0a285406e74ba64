use chrono::{DateTime, Utc};
use clicktrail_scanner::{
    BrokenLink, FakeDataFinding, InteractionResult, OutcomeKind, PageRecord, PageRun, RunContext,
    Viewport,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const CLICK_RESULTS_FILE: &str = "click-results.csv";
pub const BROKEN_LINKS_FILE: &str = "broken-links.txt";
pub const FAKE_DATA_FILE: &str = "fake-data-findings.json";
pub const SUMMARY_FILE: &str = "audit-summary.txt";
pub const JSON_REPORT_FILE: &str = "audit-report.json";

const CSV_HEADER: [&str; 13] = [
    "Page_URL",
    "Viewport",
    "Element_Text",
    "Aria_Label",
    "Selector",
    "Element_Type",
    "Href",
    "Opens_New_Tab",
    "Pre_Click_URL",
    "Post_Click_URL",
    "HTTP_Status",
    "Result",
    "Notes",
];

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";
const SLOWEST_PAGES: usize = 5;

/// Everything one audit run produced. Built once, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub run_id: String,
    pub base_url: String,
    pub viewports: Vec<Viewport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pages: Vec<PageRecord>,
    pub results: Vec<InteractionResult>,
    pub fake_data: Vec<FakeDataFinding>,
    pub broken_links: Vec<BrokenLink>,
    pub page_runs: Vec<PageRun>,
    pub summary: AuditSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCount {
    pub outcome: OutcomeKind,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub total_pages: usize,
    pub reachable_pages: usize,
    pub total_interactions: usize,
    pub successes: usize,
    pub failures: usize,
    /// One entry per outcome kind, zero counts included, in report order.
    pub outcome_counts: Vec<OutcomeCount>,
    pub broken_links: usize,
    pub fake_data_findings: usize,
}

impl AuditSummary {
    pub fn count(&self, outcome: OutcomeKind) -> usize {
        self.outcome_counts
            .iter()
            .find(|c| c.outcome == outcome)
            .map_or(0, |c| c.count)
    }

    pub fn success_rate(&self) -> f64 {
        percentage(self.successes, self.total_interactions)
    }

    pub fn failure_rate(&self) -> f64 {
        percentage(self.failures, self.total_interactions)
    }
}

impl AuditReport {
    /// Assemble the final report from the merged run context.
    ///
    /// Broken links are the crawl's own failures plus every interaction that
    /// navigated somewhere answering with an HTTP error.
    pub fn build(
        run_id: String,
        base_url: String,
        viewports: Vec<Viewport>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        ctx: RunContext,
    ) -> Self {
        let pages = ctx.pages().to_vec();
        let results = ctx.results().to_vec();
        let fake_data = ctx.fake_data().to_vec();
        let page_runs = ctx.page_runs().to_vec();

        let mut broken_links = ctx.broken_links().to_vec();
        broken_links.extend(results.iter().filter_map(navigation_failure));
        let mut seen = HashSet::new();
        broken_links.retain(|link| seen.insert(link.clone()));

        let summary = summarize(&pages, &results, &fake_data, &broken_links);

        Self {
            run_id,
            base_url,
            viewports,
            started_at,
            finished_at,
            pages,
            results,
            fake_data,
            broken_links,
            page_runs,
            summary,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn viewport_names(&self) -> Vec<&str> {
        self.viewports.iter().map(|v| v.name.as_str()).collect()
    }
}

fn navigation_failure(result: &InteractionResult) -> Option<BrokenLink> {
    let status = result.status_code()?;
    if status < 400 || result.post_url == result.pre_url {
        return None;
    }
    Some(BrokenLink {
        route: result.page_url.clone(),
        viewport: result.viewport.clone(),
        target: result.post_url.clone(),
        status: Some(status),
        error: None,
    })
}

fn summarize(
    pages: &[PageRecord],
    results: &[InteractionResult],
    fake_data: &[FakeDataFinding],
    broken_links: &[BrokenLink],
) -> AuditSummary {
    let outcome_counts = OutcomeKind::ALL
        .iter()
        .map(|&outcome| OutcomeCount {
            outcome,
            count: results.iter().filter(|r| r.outcome == outcome).count(),
        })
        .collect();
    let successes = results.iter().filter(|r| r.outcome.is_success()).count();

    AuditSummary {
        total_pages: pages.len(),
        reachable_pages: pages.iter().filter(|p| p.is_reachable()).count(),
        total_interactions: results.len(),
        successes,
        failures: results.len() - successes,
        outcome_counts,
        broken_links: broken_links.len(),
        fake_data_findings: fake_data.len(),
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

/// Files written (or not) by [`generate`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReportOutcome {
    pub written: Vec<PathBuf>,
    /// File name and the reason it could not be written.
    pub failed: Vec<(String, String)>,
}

impl ReportOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Write every report file into `out_dir`. Each file is written on its own;
/// a failure is logged and recorded without stopping the rest.
pub fn generate(report: &AuditReport, out_dir: &Path) -> ReportOutcome {
    let mut outcome = ReportOutcome::default();

    if let Err(e) = fs::create_dir_all(out_dir) {
        error!("Could not create output directory {}: {}", out_dir.display(), e);
    }

    let files: [(&str, Result<String, String>); 5] = [
        (CLICK_RESULTS_FILE, Ok(generate_click_results_csv(&report.results))),
        (BROKEN_LINKS_FILE, Ok(generate_broken_links(&report.broken_links))),
        (
            FAKE_DATA_FILE,
            generate_fake_data_json(&report.fake_data).map_err(|e| e.to_string()),
        ),
        (SUMMARY_FILE, Ok(generate_text_summary(report))),
        (
            JSON_REPORT_FILE,
            generate_json_report(report).map_err(|e| e.to_string()),
        ),
    ];

    for (name, content) in files {
        let path = out_dir.join(name);
        match content.and_then(|c| save_report(&c, &path).map_err(|e| e.to_string())) {
            Ok(()) => {
                info!("Wrote {}", path.display());
                outcome.written.push(path);
            }
            Err(e) => {
                error!("Failed to write {}: {}", path.display(), e);
                outcome.failed.push((name.to_string(), e));
            }
        }
    }

    outcome
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// Quote a CSV field, doubling embedded quotes.
pub fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn csv_row<S: AsRef<str>>(fields: &[S]) -> String {
    fields
        .iter()
        .map(|f| csv_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn generate_click_results_csv(results: &[InteractionResult]) -> String {
    let mut csv = csv_row(&CSV_HEADER);
    csv.push('\n');

    for r in results {
        let row = [
            r.page_url.clone(),
            r.viewport.clone(),
            r.element.text.clone(),
            r.element.aria_label.clone().unwrap_or_default(),
            r.element.selector.clone(),
            r.element.element_type(),
            r.element.href.clone().unwrap_or_default(),
            r.element.opens_new_tab().to_string(),
            r.pre_url.clone(),
            r.post_url.clone(),
            r.http_status.clone().unwrap_or_default(),
            r.outcome.to_string(),
            r.notes.clone(),
        ];
        csv.push_str(&csv_row(&row));
        csv.push('\n');
    }

    csv
}

pub fn generate_broken_links(links: &[BrokenLink]) -> String {
    links
        .iter()
        .map(|link| format!("{}\n", link.describe()))
        .collect()
}

pub fn generate_fake_data_json(findings: &[FakeDataFinding]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(findings)
}

fn section(report: &mut String, title: &str) {
    report.push_str(RULE);
    report.push('\n');
    report.push_str(title);
    report.push('\n');
    report.push_str(RULE);
    report.push_str("\n\n");
}

pub fn generate_text_summary(data: &AuditReport) -> String {
    let summary = &data.summary;
    let mut report = String::new();

    // Header
    report.push_str(RULE);
    report.push('\n');
    report.push_str("                         CLICKTRAIL AUDIT SUMMARY\n");
    report.push_str(RULE);
    report.push_str("\n\n");

    report.push_str(&format!("Run ID:       {}\n", data.run_id));
    report.push_str(&format!("Base URL:     {}\n", data.base_url));
    let viewports: Vec<String> = data.viewports.iter().map(|v| v.to_string()).collect();
    report.push_str(&format!("Viewports:    {}\n", viewports.join(", ")));
    report.push_str(&format!("Started:      {}\n", format_timestamp(data.started_at)));
    report.push_str(&format!("Finished:     {}\n", format_timestamp(data.finished_at)));
    report.push_str(&format!("Duration:     {:.1} seconds\n", data.duration_seconds()));
    report.push_str(&format!(
        "Pages Found:  {} ({} reachable)\n\n",
        summary.total_pages, summary.reachable_pages
    ));

    section(&mut report, "RESULTS BY OUTCOME");
    for count in &summary.outcome_counts {
        report.push_str(&format!("  {:<20} {}\n", count.outcome.as_str(), count.count));
    }
    report.push('\n');
    report.push_str(&format!("Total Interactions: {}\n", summary.total_interactions));
    report.push_str(&format!(
        "Success Rate:       {:.1}% ({})\n",
        summary.success_rate(),
        summary.successes
    ));
    report.push_str(&format!(
        "Failure Rate:       {:.1}% ({})\n\n",
        summary.failure_rate(),
        summary.failures
    ));

    section(&mut report, "SLOWEST PAGES");
    let mut runs: Vec<&PageRun> = data.page_runs.iter().collect();
    runs.sort_by(|a, b| {
        b.duration_ms
            .cmp(&a.duration_ms)
            .then_with(|| a.url.cmp(&b.url))
            .then_with(|| a.viewport.cmp(&b.viewport))
    });
    if runs.is_empty() {
        report.push_str("  (none)\n");
    }
    for run in runs.iter().take(SLOWEST_PAGES) {
        report.push_str(&format!(
            "  {:>8} ms  {} [{}] ({}/{} elements tested)\n",
            run.duration_ms, run.url, run.viewport, run.elements_tested, run.elements_found
        ));
    }
    report.push('\n');

    section(&mut report, "PAGES NEEDING ATTENTION");
    let attention = pages_needing_attention(&data.results);
    if attention.is_empty() {
        report.push_str("  (none)\n");
    }
    for page in &attention {
        let kinds: Vec<String> = page
            .failures
            .iter()
            .map(|(kind, n)| format!("{} x{}", kind, n))
            .collect();
        report.push_str(&format!(
            "  {} [{}]: {} failure(s) - {}\n",
            page.url,
            page.viewport,
            page.total,
            kinds.join(", ")
        ));
    }
    report.push('\n');

    section(&mut report, "TOTALS");
    report.push_str(&format!("Broken Links:        {}\n", summary.broken_links));
    report.push_str(&format!("Fake Data Findings:  {}\n\n", summary.fake_data_findings));

    // Footer
    report.push_str(RULE);
    report.push('\n');
    report.push_str("                              End of Summary\n");
    report.push_str(RULE);
    report.push('\n');

    report
}

struct AttentionPage {
    url: String,
    viewport: String,
    total: usize,
    failures: Vec<(OutcomeKind, usize)>,
}

/// Pages with at least one failed interaction, worst first.
fn pages_needing_attention(results: &[InteractionResult]) -> Vec<AttentionPage> {
    let mut by_page: HashMap<(&str, &str), HashMap<OutcomeKind, usize>> = HashMap::new();
    for r in results.iter().filter(|r| r.outcome.is_failure()) {
        *by_page
            .entry((r.page_url.as_str(), r.viewport.as_str()))
            .or_default()
            .entry(r.outcome)
            .or_default() += 1;
    }

    let mut pages: Vec<AttentionPage> = by_page
        .into_iter()
        .map(|((url, viewport), counts)| {
            let failures: Vec<(OutcomeKind, usize)> = OutcomeKind::ALL
                .iter()
                .filter_map(|kind| counts.get(kind).map(|&n| (*kind, n)))
                .collect();
            AttentionPage {
                url: url.to_string(),
                viewport: viewport.to_string(),
                total: failures.iter().map(|(_, n)| n).sum(),
                failures,
            }
        })
        .collect();

    pages.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then_with(|| a.url.cmp(&b.url))
            .then_with(|| a.viewport.cmp(&b.viewport))
    });
    pages
}

pub fn generate_json_report(data: &AuditReport) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "clicktrail",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": data.finished_at.to_rfc3339(),
                "format": "json"
            },
            "run": {
                "id": data.run_id,
                "base_url": data.base_url,
                "viewports": data.viewports,
                "start_time": data.started_at.to_rfc3339(),
                "end_time": data.finished_at.to_rfc3339(),
                "duration_seconds": data.duration_seconds()
            },
            "summary": data.summary,
            "pages": data.pages,
            "results": data.results,
            "broken_links": data.broken_links,
            "fake_data": data.fake_data,
            "page_runs": data.page_runs
        }
    });

    serde_json::to_string_pretty(&json_report)
}

/// Flat sitemap of crawled pages with a status marker per line.
pub fn generate_sitemap(pages: &[PageRecord]) -> String {
    if pages.is_empty() {
        return "  (empty)\n".to_string();
    }

    let mut result = String::new();
    for (i, page) in pages.iter().enumerate() {
        let prefix = if i == pages.len() - 1 { "└── " } else { "├── " };

        let status_indicator = match page.http_status {
            Some(200..=299) => "✓",
            Some(300..=399) => "→",
            Some(400..=499) => "⚠",
            Some(500..=599) => "✗",
            _ => "?",
        };
        let status = page
            .http_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "---".to_string());

        let indent = "  ".repeat(page.depth);
        result.push_str(&format!(
            "{}{}{}  [{} {}]",
            prefix, indent, page.url, status_indicator, status
        ));
        if let Some(ref error) = page.error {
            result.push_str(&format!(" {}", error));
        }
        result.push('\n');
    }

    result
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
