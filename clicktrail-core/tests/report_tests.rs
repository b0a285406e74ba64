// Tests for report assembly and file generation

use chrono::{TimeZone, Utc};
use clicktrail_core::report::{
    self, AuditReport, BROKEN_LINKS_FILE, CLICK_RESULTS_FILE, FAKE_DATA_FILE, JSON_REPORT_FILE,
    SUMMARY_FILE,
};
use clicktrail_scanner::{
    BrokenLink, FakeDataFinding, InteractionResult, InteractiveElement, OutcomeKind, PageRecord,
    PageRun, RunContext, Viewport,
};
use std::fs;
use tempfile::TempDir;

const HOME: &str = "http://shop.test/";

fn element(text: &str, selector: &str, href: Option<&str>) -> InteractiveElement {
    InteractiveElement {
        selector: selector.to_string(),
        tag_name: if href.is_some() { "a" } else { "button" }.to_string(),
        text: text.to_string(),
        href: href.map(String::from),
        ..Default::default()
    }
}

fn clicked(
    viewport: &str,
    index: usize,
    element: InteractiveElement,
    post_url: &str,
    status: Option<&str>,
    outcome: OutcomeKind,
) -> InteractionResult {
    let mut result = InteractionResult::without_interaction(
        HOME,
        viewport,
        index,
        element,
        outcome,
        format!("{} note", outcome),
    );
    result.post_url = post_url.to_string();
    result.http_status = status.map(String::from);
    result
}

fn sample_context() -> RunContext {
    let mut ctx = RunContext::new();
    ctx.record_page(PageRecord::new(HOME.into(), 0, None).with_status(Some(200)));
    ctx.record_page(
        PageRecord::new("http://shop.test/old-page".into(), 1, Some(HOME.into()))
            .with_status(Some(404)),
    );
    ctx.record_broken_link(BrokenLink {
        route: "http://shop.test/old-page".into(),
        viewport: "desktop".into(),
        target: "http://shop.test/old-page".into(),
        status: Some(404),
        error: None,
    });

    ctx.record_result(clicked(
        "desktop",
        0,
        element("Pricing", "a", Some("/pricing")),
        "http://shop.test/pricing",
        Some("200"),
        OutcomeKind::OkNavigated,
    ));
    ctx.record_result(clicked(
        "desktop",
        1,
        element("Say \"hi\"", "button.btn", None),
        HOME,
        None,
        OutcomeKind::FailNoEffect,
    ));
    ctx.record_result(clicked(
        "desktop",
        2,
        element("Old link", "a", Some("/old-page")),
        "http://shop.test/old-page",
        Some("404"),
        OutcomeKind::OkNavigated,
    ));
    ctx.record_result(clicked(
        "mobile",
        1,
        element("Save", "button.btn", None),
        HOME,
        Some("500"),
        OutcomeKind::FailApiError,
    ));

    ctx.record_fake_data([FakeDataFinding {
        page: HOME.into(),
        viewport: "desktop".into(),
        pattern: "placeholder_email".into(),
        matched_text: "your@email.com".into(),
        surrounding_context: "Contact us at your@email.com".into(),
    }]);

    ctx.record_page_run(PageRun {
        url: HOME.into(),
        viewport: "desktop".into(),
        elements_found: 3,
        elements_tested: 3,
        duration_ms: 900,
    });
    ctx.record_page_run(PageRun {
        url: HOME.into(),
        viewport: "mobile".into(),
        elements_found: 1,
        elements_tested: 1,
        duration_ms: 1500,
    });
    ctx
}

fn sample_report() -> AuditReport {
    AuditReport::build(
        "run-1".into(),
        HOME.into(),
        vec![Viewport::desktop(), Viewport::mobile()],
        Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        Utc.with_ymd_and_hms(2026, 1, 2, 3, 5, 5).unwrap(),
        sample_context(),
    )
}

// ============================================================================
// Report Assembly Tests
// ============================================================================

#[test]
fn test_summary_counts_every_outcome() {
    let report = sample_report();
    let summary = &report.summary;

    assert_eq!(summary.total_pages, 2);
    assert_eq!(summary.reachable_pages, 1);
    assert_eq!(summary.total_interactions, 4);
    assert_eq!(summary.successes, 2);
    assert_eq!(summary.failures, 2);
    assert_eq!(summary.count(OutcomeKind::OkNavigated), 2);
    assert_eq!(summary.count(OutcomeKind::FailApiError), 1);
    assert_eq!(summary.count(OutcomeKind::OkModal), 0);
    assert_eq!(summary.success_rate(), 50.0);
    assert_eq!(summary.fake_data_findings, 1);
}

/// Navigations that land on an error page become broken links; API errors
/// on the same page do not.
#[test]
fn test_broken_links_include_failed_navigations() {
    let report = sample_report();
    let described: Vec<String> = report.broken_links.iter().map(|b| b.describe()).collect();

    assert_eq!(
        described,
        vec![
            "404 - http://shop.test/old-page".to_string(),
            "404 - http://shop.test/old-page (from http://shop.test/ @ desktop)".to_string(),
        ]
    );
    assert_eq!(report.summary.broken_links, 2);
}

#[test]
fn test_duplicate_broken_links_are_collapsed() {
    let mut ctx = sample_context();
    let link = ctx.broken_links()[0].clone();
    ctx.record_broken_link(link);

    let report = AuditReport::build(
        "run-2".into(),
        HOME.into(),
        vec![Viewport::desktop()],
        Utc::now(),
        Utc::now(),
        ctx,
    );
    assert_eq!(report.broken_links.len(), 2);
}

// ============================================================================
// CSV Tests
// ============================================================================

#[test]
fn test_csv_has_fixed_header_and_one_row_per_result() {
    let report = sample_report();
    let csv = report::generate_click_results_csv(&report.results);
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(
        lines[0],
        "\"Page_URL\",\"Viewport\",\"Element_Text\",\"Aria_Label\",\"Selector\",\"Element_Type\",\"Href\",\"Opens_New_Tab\",\"Pre_Click_URL\",\"Post_Click_URL\",\"HTTP_Status\",\"Result\",\"Notes\""
    );
    assert_eq!(lines.len(), report.results.len() + 1);
}

#[test]
fn test_csv_escapes_quotes() {
    let report = sample_report();
    let csv = report::generate_click_results_csv(&report.results);
    let row = csv.lines().nth(2).unwrap();

    assert!(row.contains("\"Say \"\"hi\"\"\""));
    assert!(row.contains("\"FAIL_NO_EFFECT\""));
    assert!(row.starts_with("\"http://shop.test/\",\"desktop\","));
}

#[test]
fn test_csv_of_no_results_is_header_only() {
    let csv = report::generate_click_results_csv(&[]);
    assert_eq!(csv.lines().count(), 1);
}

// ============================================================================
// Text and JSON Tests
// ============================================================================

#[test]
fn test_text_summary_sections() {
    let summary = report::generate_text_summary(&sample_report());

    assert!(summary.contains("CLICKTRAIL AUDIT SUMMARY"));
    assert!(summary.contains("Run ID:       run-1"));
    assert!(summary.contains("Duration:     60.0 seconds"));
    assert!(summary.contains("OK_NAVIGATED         2"));
    assert!(summary.contains("FAIL_ELEMENT_ERROR   0"));
    assert!(summary.contains("Success Rate:       50.0% (2)"));
    assert!(summary.contains("Broken Links:        2"));
    assert!(summary.contains("Fake Data Findings:  1"));
}

#[test]
fn test_text_summary_orders_slowest_pages_first() {
    let summary = report::generate_text_summary(&sample_report());
    let mobile = summary.find("1500 ms").unwrap();
    let desktop = summary.find("900 ms").unwrap();
    assert!(mobile < desktop);
}

#[test]
fn test_text_summary_lists_pages_needing_attention() {
    let summary = report::generate_text_summary(&sample_report());
    assert!(summary.contains("http://shop.test/ [desktop]: 1 failure(s) - FAIL_NO_EFFECT x1"));
    assert!(summary.contains("http://shop.test/ [mobile]: 1 failure(s) - FAIL_API_ERROR x1"));
}

#[test]
fn test_text_summary_is_deterministic() {
    let report = sample_report();
    assert_eq!(
        report::generate_text_summary(&report),
        report::generate_text_summary(&report)
    );
}

#[test]
fn test_json_report_shape() {
    let report = sample_report();
    let json = report::generate_json_report(&report).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

    let root = &parsed["report"];
    assert_eq!(root["metadata"]["generator"], "clicktrail");
    assert_eq!(root["metadata"]["format"], "json");
    assert_eq!(root["metadata"]["generated_at"], report.finished_at.to_rfc3339());
    assert_eq!(root["run"]["id"], "run-1");
    assert_eq!(root["run"]["duration_seconds"], 60.0);
    assert_eq!(root["summary"]["total_interactions"], 4);
    assert_eq!(root["results"].as_array().unwrap().len(), 4);
    assert_eq!(root["results"][0]["outcome"], "OK_NAVIGATED");
}

// ============================================================================
// File Generation Tests
// ============================================================================

#[test]
fn test_generate_writes_every_file() {
    let temp = TempDir::new().unwrap();
    let out_dir = temp.path().join("nested").join("audit-output");

    let outcome = report::generate(&sample_report(), &out_dir);

    assert!(outcome.is_complete());
    assert_eq!(outcome.written.len(), 5);
    for name in [
        CLICK_RESULTS_FILE,
        BROKEN_LINKS_FILE,
        FAKE_DATA_FILE,
        SUMMARY_FILE,
        JSON_REPORT_FILE,
    ] {
        assert!(out_dir.join(name).exists(), "{} missing", name);
    }

    let broken = fs::read_to_string(out_dir.join(BROKEN_LINKS_FILE)).unwrap();
    assert_eq!(broken.lines().next(), Some("404 - http://shop.test/old-page"));

    let findings: Vec<FakeDataFinding> =
        serde_json::from_str(&fs::read_to_string(out_dir.join(FAKE_DATA_FILE)).unwrap()).unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].matched_text, "your@email.com");
}

/// A file that cannot be written is recorded and the others still land.
#[test]
fn test_generate_continues_past_failed_file() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join(SUMMARY_FILE)).unwrap();

    let outcome = report::generate(&sample_report(), temp.path());

    assert_eq!(outcome.written.len(), 4);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].0, SUMMARY_FILE);
    assert!(temp.path().join(JSON_REPORT_FILE).exists());
}

#[test]
fn test_generate_twice_overwrites() {
    let temp = TempDir::new().unwrap();
    let report = sample_report();

    report::generate(&report, temp.path());
    let first = fs::read_to_string(temp.path().join(CLICK_RESULTS_FILE)).unwrap();
    let outcome = report::generate(&report, temp.path());
    let second = fs::read_to_string(temp.path().join(CLICK_RESULTS_FILE)).unwrap();

    assert!(outcome.is_complete());
    assert_eq!(first, second);
}
