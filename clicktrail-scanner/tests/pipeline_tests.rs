// Crawl + interaction tests through the static driver against a mock site

use clicktrail_scanner::{
    BrowserDriver, Crawler, HttpDriver, InteractionTester, OutcomeKind, RunContext, Viewport,
};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOME: &str = r##"<html><body>
    <nav>
        <a href="/pricing">Pricing</a>
        <a href="#">Learn more</a>
        <a href="/docs" target="_blank">Docs</a>
        <button class="btn buy">Buy</button>
        <a href="/old-page">Old link</a>
    </nav>
    <p>Contact us at your@email.com</p>
</body></html>"##;

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
    mount(&server, "/pricing", 200, r#"<a href="/">Home</a><p>Plans</p>"#).await;
    mount(&server, "/docs", 200, "<p>Docs</p>").await;
    mount(&server, "/old-page", 404, r#"<a href="/hidden-area">Hidden</a>"#).await;
    server
}

fn tester() -> InteractionTester {
    InteractionTester::new("desktop")
        .with_settle_timeout(Duration::from_millis(50))
        .with_click_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn test_crawl_discovers_site_and_flags_missing_page() {
    let server = mock_site().await;
    let driver = HttpDriver::new().unwrap();
    let page = driver.new_page(&Viewport::desktop()).await.unwrap();
    let mut ctx = RunContext::new();

    let visited = Crawler::new()
        .crawl(page.as_ref(), &server.uri(), &mut ctx)
        .await
        .unwrap();

    assert_eq!(visited, 4);
    let urls: Vec<_> = ctx.pages().iter().map(|p| p.url.clone()).collect();
    assert!(!urls.iter().any(|u| u.ends_with("/hidden-area")));
    assert_eq!(ctx.reachable_pages().count(), 3);
    assert_eq!(
        ctx.broken_links()
            .iter()
            .map(|b| b.describe())
            .collect::<Vec<_>>(),
        vec![format!("404 - {}/old-page", server.uri())]
    );
}

#[tokio::test]
async fn test_every_element_on_home_is_classified() {
    let server = mock_site().await;
    let driver = HttpDriver::new().unwrap();
    let page = driver.new_page(&Viewport::desktop()).await.unwrap();
    let home = format!("{}/", server.uri());
    let mut ctx = RunContext::new();

    let run = tester().test_page(page.as_ref(), &home, &mut ctx).await;

    assert_eq!(run.elements_found, 5);
    assert_eq!(run.elements_tested, 5);

    let outcomes: Vec<_> = ctx.results().iter().map(|r| r.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            OutcomeKind::OkNavigated,
            OutcomeKind::FailNoEffect,
            OutcomeKind::OkNewTab,
            OutcomeKind::FailNoEffect,
            OutcomeKind::OkNavigated,
        ]
    );

    let pricing = &ctx.results()[0];
    assert_eq!(pricing.post_url, format!("{}/pricing", server.uri()));
    assert_eq!(pricing.http_status.as_deref(), Some("200"));

    let old = &ctx.results()[4];
    assert_eq!(old.http_status.as_deref(), Some("404"));
    assert_eq!(old.status_code(), Some(404));

    assert!(ctx.results().iter().all(|r| r.page_url == home));
    assert!(
        ctx.fake_data()
            .iter()
            .any(|f| f.pattern == "placeholder_email" && f.matched_text == "your@email.com")
    );
}

#[tokio::test]
async fn test_viewports_record_their_own_results() {
    let server = mock_site().await;
    let driver = HttpDriver::new().unwrap();
    let pricing = format!("{}/pricing", server.uri());

    let mut desktop = RunContext::new();
    let page = driver.new_page(&Viewport::desktop()).await.unwrap();
    tester().test_page(page.as_ref(), &pricing, &mut desktop).await;

    let mut mobile = RunContext::new();
    let page = driver.new_page(&Viewport::mobile()).await.unwrap();
    InteractionTester::new("mobile")
        .with_settle_timeout(Duration::from_millis(50))
        .test_page(page.as_ref(), &pricing, &mut mobile)
        .await;

    assert!(desktop.results().iter().all(|r| r.viewport == "desktop"));
    assert!(mobile.results().iter().all(|r| r.viewport == "mobile"));
    assert_eq!(desktop.results().len(), mobile.results().len());
}

#[tokio::test]
async fn test_home_markup_flags_bare_hash_link() {
    let server = mock_site().await;
    let driver = HttpDriver::new().unwrap();
    let page = driver.new_page(&Viewport::desktop()).await.unwrap();
    let mut ctx = RunContext::new();

    tester()
        .test_page(page.as_ref(), &format!("{}/", server.uri()), &mut ctx)
        .await;

    let hash = ctx
        .fake_data()
        .iter()
        .find(|f| f.pattern == "bare_hash_href")
        .unwrap();
    assert_eq!(hash.matched_text, r##"href="#""##);
    assert!(hash.surrounding_context.contains("Learn more"));
}

#[tokio::test]
async fn test_redirect_off_origin_is_never_clicked() {
    let server = MockServer::start().await;
    let partner = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/go"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("{}/ext", partner.uri()).as_str()),
        )
        .mount(&server)
        .await;
    mount(&partner, "/ext", 200, r#"<button class="btn">External buy</button>"#).await;

    let driver = HttpDriver::new().unwrap();
    let page = driver.new_page(&Viewport::desktop()).await.unwrap();
    let go = format!("{}/go", server.uri());
    let mut ctx = RunContext::new();

    let run = tester().test_page(page.as_ref(), &go, &mut ctx).await;

    assert_eq!(run.elements_tested, 0);
    assert!(ctx.results().is_empty());
    assert_eq!(ctx.broken_links().len(), 1);
    assert_eq!(ctx.broken_links()[0].route, go);
    assert_eq!(ctx.broken_links()[0].target, format!("{}/ext", partner.uri()));
}

#[tokio::test]
async fn test_unreachable_page_in_second_viewport_is_reported() {
    let driver = HttpDriver::with_timeout(Duration::from_secs(2)).unwrap();
    let page = driver.new_page(&Viewport::mobile()).await.unwrap();
    let mut ctx = RunContext::new();

    InteractionTester::new("mobile")
        .with_nav_timeout(Duration::from_secs(2))
        .test_page(page.as_ref(), "http://127.0.0.1:9/pricing", &mut ctx)
        .await;

    assert!(ctx.results().is_empty());
    assert_eq!(ctx.page_runs().len(), 1);
    let broken = &ctx.broken_links()[0];
    assert_eq!(broken.viewport, "mobile");
    assert!(broken.describe().starts_with("ERROR - http://127.0.0.1:9/pricing"));
}

#[tokio::test]
async fn test_server_error_while_testing_skips_elements() {
    let server = MockServer::start().await;
    mount(&server, "/flaky", 500, r#"<button class="btn">Retry</button>"#).await;
    let driver = HttpDriver::new().unwrap();
    let page = driver.new_page(&Viewport::desktop()).await.unwrap();
    let flaky = format!("{}/flaky", server.uri());
    let mut ctx = RunContext::new();

    tester().test_page(page.as_ref(), &flaky, &mut ctx).await;

    assert!(ctx.results().is_empty());
    assert_eq!(
        ctx.broken_links()
            .iter()
            .map(|b| b.describe())
            .collect::<Vec<_>>(),
        vec![format!("500 - {}", flaky)]
    );
}
