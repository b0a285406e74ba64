// End-to-end audit runs through the static driver against a mock site

use clicktrail_core::report::{self, BROKEN_LINKS_FILE, CLICK_RESULTS_FILE};
use clicktrail_core::{AuditConfig, AuditError, DriverKind, execute_crawl, launch_driver, run_audit};
use clicktrail_scanner::{OutcomeKind, Viewport};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOME: &str = r##"<html><body>
    <header>
        <a href="/pricing">Pricing</a>
        <a href="#">Learn more</a>
        <a href="https://docs.partner.test/" target="_blank">Partner docs</a>
    </header>
    <main>
        <p>Questions? Write to your@email.com</p>
        <a href="/old-page">Archive</a>
    </main>
</body></html>"##;

const PRICING: &str = r#"<html><body>
    <a href="/">Home</a>
    <button class="btn-primary">Subscribe</button>
    <p>Starter plan: TBD</p>
</body></html>"#;

async fn mount(server: &MockServer, route: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(status)
                .insert_header("content-type", "text/html")
                .set_body_bytes(body.as_bytes().to_vec()),
        )
        .mount(server)
        .await;
}

async fn mock_site() -> MockServer {
    let server = MockServer::start().await;
    mount(&server, "/", 200, HOME).await;
    mount(&server, "/pricing", 200, PRICING).await;
    mount(&server, "/old-page", 404, r#"<a href="/secret">Secret</a>"#).await;
    server
}

fn config_for(server: &MockServer, out_dir: &TempDir) -> AuditConfig {
    AuditConfig {
        base_url: server.uri(),
        out_dir: out_dir.path().to_path_buf(),
        driver: DriverKind::Http,
        screenshots: false,
        nav_timeout: Duration::from_secs(5),
        click_timeout: Duration::from_secs(2),
        settle_timeout: Duration::from_millis(50),
        idle_timeout: Duration::from_millis(200),
        ..AuditConfig::default()
    }
}

#[tokio::test]
async fn test_audit_covers_every_page_and_viewport() {
    let server = mock_site().await;
    let out = TempDir::new().unwrap();
    let config = config_for(&server, &out);
    let driver = launch_driver(&config).await.unwrap();

    let report = run_audit(&config, driver.as_ref(), false).await.unwrap();

    assert_eq!(report.summary.total_pages, 3);
    assert_eq!(report.summary.reachable_pages, 2);
    assert_eq!(report.viewport_names(), vec!["desktop", "mobile"]);

    // 4 elements on home + 2 on pricing, in each viewport
    assert_eq!(report.results.len(), 12);
    let first_mobile = report
        .results
        .iter()
        .position(|r| r.viewport == "mobile")
        .unwrap();
    assert_eq!(first_mobile, 6);
    assert!(report.results[..6].iter().all(|r| r.viewport == "desktop"));
    assert_eq!(report.page_runs.len(), 4);
}

#[tokio::test]
async fn test_audit_classifies_static_elements() {
    let server = mock_site().await;
    let out = TempDir::new().unwrap();
    let config = AuditConfig {
        viewports: vec![Viewport::desktop()],
        ..config_for(&server, &out)
    };
    let driver = launch_driver(&config).await.unwrap();

    let report = run_audit(&config, driver.as_ref(), false).await.unwrap();
    let home = format!("{}/", server.uri());

    let home_outcomes: Vec<OutcomeKind> = report
        .results
        .iter()
        .filter(|r| r.page_url == home)
        .map(|r| r.outcome)
        .collect();
    assert_eq!(
        home_outcomes,
        vec![
            OutcomeKind::OkNavigated,
            OutcomeKind::FailNoEffect,
            OutcomeKind::OkNewTab,
            OutcomeKind::OkNavigated,
        ]
    );

    let learn_more = &report.results[1];
    assert_eq!(learn_more.element.text, "Learn more");
    assert_eq!(learn_more.outcome, OutcomeKind::FailNoEffect);

    let partner = &report.results[2];
    assert!(partner.opened_popup);
    assert_eq!(partner.post_url, home);
}

#[tokio::test]
async fn test_audit_finds_placeholder_content() {
    let server = mock_site().await;
    let out = TempDir::new().unwrap();
    let config = AuditConfig {
        viewports: vec![Viewport::desktop()],
        ..config_for(&server, &out)
    };
    let driver = launch_driver(&config).await.unwrap();

    let report = run_audit(&config, driver.as_ref(), false).await.unwrap();

    let email = report
        .fake_data
        .iter()
        .find(|f| f.pattern == "placeholder_email")
        .unwrap();
    assert_eq!(email.page, format!("{}/", server.uri()));
    assert_eq!(email.matched_text, "your@email.com");
    assert!(email.surrounding_context.contains("Write to"));

    assert!(report.fake_data.iter().any(|f| f.pattern == "tbd"
        && f.page == format!("{}/pricing", server.uri())));
}

/// The 404 page lands in broken-links.txt and its own links are never crawled.
#[tokio::test]
async fn test_missing_page_reported_and_not_crawled() {
    let server = mock_site().await;
    let out = TempDir::new().unwrap();
    let config = AuditConfig {
        viewports: vec![Viewport::desktop()],
        ..config_for(&server, &out)
    };
    let driver = launch_driver(&config).await.unwrap();

    let report = run_audit(&config, driver.as_ref(), false).await.unwrap();
    let outcome = report::generate(&report, out.path());
    assert!(outcome.is_complete());

    let broken = fs::read_to_string(out.path().join(BROKEN_LINKS_FILE)).unwrap();
    let old_page = format!("{}/old-page", server.uri());
    assert!(broken.lines().any(|l| l == format!("404 - {}", old_page)));
    assert!(!report.pages.iter().any(|p| p.url.ends_with("/secret")));

    let csv = fs::read_to_string(out.path().join(CLICK_RESULTS_FILE)).unwrap();
    assert_eq!(csv.lines().count(), report.results.len() + 1);
}

#[tokio::test]
async fn test_parallel_viewports_match_sequential_order() {
    let server = mock_site().await;
    let out = TempDir::new().unwrap();
    let sequential = config_for(&server, &out);
    let parallel = AuditConfig {
        parallel_viewports: true,
        ..sequential.clone()
    };
    let driver = launch_driver(&sequential).await.unwrap();

    let a = run_audit(&sequential, driver.as_ref(), false).await.unwrap();
    let b = run_audit(&parallel, driver.as_ref(), false).await.unwrap();

    let key = |r: &clicktrail_scanner::InteractionResult| {
        (r.viewport.clone(), r.page_url.clone(), r.element_index, r.outcome)
    };
    assert_eq!(
        a.results.iter().map(key).collect::<Vec<_>>(),
        b.results.iter().map(key).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_unreachable_target_is_fatal() {
    let out = TempDir::new().unwrap();
    let config = AuditConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        out_dir: out.path().to_path_buf(),
        driver: DriverKind::Http,
        nav_timeout: Duration::from_secs(2),
        ..AuditConfig::default()
    };
    let driver = launch_driver(&config).await.unwrap();

    let err = run_audit(&config, driver.as_ref(), false).await.unwrap_err();
    assert!(matches!(err, AuditError::Unreachable { .. }));
}

#[tokio::test]
async fn test_invalid_config_is_fatal() {
    let config = AuditConfig {
        max_pages: 0,
        driver: DriverKind::Http,
        ..AuditConfig::default()
    };
    let driver = launch_driver(&config).await.unwrap();

    let err = run_audit(&config, driver.as_ref(), false).await.unwrap_err();
    assert!(matches!(err, AuditError::Config(_)));
}

#[tokio::test]
async fn test_crawl_only_respects_limits() {
    let server = mock_site().await;
    let out = TempDir::new().unwrap();
    let config = AuditConfig {
        max_pages: 2,
        ..config_for(&server, &out)
    };
    let driver = launch_driver(&config).await.unwrap();

    let ctx = execute_crawl(&config, driver.as_ref(), false).await.unwrap();

    assert_eq!(ctx.pages().len(), 2);
    assert!(ctx.results().is_empty());
    assert_eq!(ctx.pages()[0].depth, 0);
    assert_eq!(ctx.pages()[1].url, format!("{}/pricing", server.uri()));
}
