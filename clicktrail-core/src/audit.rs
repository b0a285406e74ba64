//! Audit orchestration: pre-flight, discovery crawl, per-viewport
//! interaction testing and report assembly.

use crate::config::{AuditConfig, ConfigError, DriverKind};
use crate::report::AuditReport;
use chrono::Utc;
use clicktrail_scanner::{
    BrowserDriver, ChromeConfig, ChromeDriver, Crawler, HttpDriver, InteractionTester,
    PageHandle, ProgressCallback, RunContext, ScanError, Viewport,
};
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that abort a whole run. Everything else ends up in the report.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Browser launch failed: {0}")]
    Launch(#[source] ScanError),

    #[error("Target {url} is unreachable: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("Could not open a page for viewport {viewport}: {source}")]
    PageCreation {
        viewport: String,
        #[source]
        source: ScanError,
    },

    #[error("Crawl failed: {0}")]
    Crawl(#[source] ScanError),
}

/// Start the browser capability selected by `config.driver`.
pub async fn launch_driver(config: &AuditConfig) -> Result<Box<dyn BrowserDriver>, AuditError> {
    match config.driver {
        DriverKind::Chrome => {
            let mut chrome = ChromeConfig::new().with_chrome_path(config.chrome_path.clone());
            if !config.headless {
                chrome = chrome.visible();
            }
            let driver = ChromeDriver::launch(chrome).await.map_err(AuditError::Launch)?;
            Ok(Box::new(driver))
        }
        DriverKind::Http => {
            let driver = HttpDriver::with_timeout(config.nav_timeout).map_err(AuditError::Launch)?;
            Ok(Box::new(driver))
        }
    }
}

/// Confirm the target answers at all. Connection failures are fatal; an
/// HTTP error status is left for the crawl to record.
pub async fn preflight(config: &AuditConfig) -> Result<u16, AuditError> {
    let unreachable = |reason: String| AuditError::Unreachable {
        url: config.base_url.clone(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(config.nav_timeout)
        .build()
        .map_err(|e| unreachable(e.to_string()))?;

    let response = client
        .get(&config.base_url)
        .send()
        .await
        .map_err(|e| unreachable(e.to_string()))?;

    let status = response.status().as_u16();
    if status >= 400 {
        warn!("{} answered {} during pre-flight", config.base_url, status);
    } else {
        debug!("Pre-flight {} -> {}", config.base_url, status);
    }
    Ok(status)
}

fn spinner(show_progress_bars: bool) -> Option<ProgressBar> {
    if !show_progress_bars {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

/// Discover the site from `config.base_url` in the first configured viewport.
pub async fn execute_crawl(
    config: &AuditConfig,
    driver: &dyn BrowserDriver,
    show_progress_bars: bool,
) -> Result<RunContext, AuditError> {
    let progress = spinner(show_progress_bars);
    let ctx = crawl_site(config, driver, progress.as_ref()).await;
    if let Some(ref pb) = progress {
        match &ctx {
            Ok(ctx) => pb.finish_with_message(format!(
                "Crawl complete! {} pages discovered",
                ctx.pages().len()
            )),
            Err(_) => pb.finish_and_clear(),
        }
    }
    ctx
}

async fn crawl_site(
    config: &AuditConfig,
    driver: &dyn BrowserDriver,
    progress: Option<&ProgressBar>,
) -> Result<RunContext, AuditError> {
    let viewport = config.primary_viewport();
    let page = open_page(driver, viewport).await?;

    let mut crawler = Crawler::new()
        .with_max_depth(config.max_depth)
        .with_max_pages(config.max_pages)
        .with_nav_timeout(config.nav_timeout)
        .with_idle_timeout(config.idle_timeout)
        .with_viewport(viewport.name.clone());

    if let Some(pb) = progress {
        let pb = pb.clone();
        let max_pages = config.max_pages;
        let callback: ProgressCallback = Arc::new(move |visited: usize, url: String| {
            pb.set_message(format!("Crawling {}/{}: {}", visited, max_pages, url));
        });
        crawler = crawler.with_progress_callback(callback);
    }

    let mut ctx = RunContext::new();
    let crawled = crawler.crawl(page.as_ref(), &config.base_url, &mut ctx).await;
    close_page(page.as_ref(), viewport).await;
    let visited = crawled.map_err(AuditError::Crawl)?;

    info!(
        "Crawl visited {} pages ({} reachable, {} broken)",
        visited,
        ctx.reachable_pages().count(),
        ctx.broken_links().len()
    );
    Ok(ctx)
}

/// Run a complete audit with an already launched driver.
///
/// Only the errors in [`AuditError`] abort the run; per-page and per-element
/// failures are recorded in the returned report.
pub async fn run_audit(
    config: &AuditConfig,
    driver: &dyn BrowserDriver,
    show_progress_bars: bool,
) -> Result<AuditReport, AuditError> {
    config.validate()?;
    let started_at = Utc::now();
    let run_id = uuid::Uuid::new_v4().to_string();
    info!(
        "Audit {} of {} with {} driver, viewports: {}",
        run_id,
        config.base_url,
        driver.name(),
        config
            .viewports
            .iter()
            .map(|v| v.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    preflight(config).await?;

    let progress = spinner(show_progress_bars);
    let mut merged = crawl_site(config, driver, progress.as_ref()).await?;
    let page_urls: Vec<String> = merged.reachable_pages().map(|p| p.url.clone()).collect();

    let contexts = if config.parallel_viewports {
        join_all(
            config
                .viewports
                .iter()
                .map(|viewport| test_viewport(config, driver, viewport, &page_urls, progress.as_ref())),
        )
        .await
    } else {
        let mut contexts = Vec::with_capacity(config.viewports.len());
        for viewport in &config.viewports {
            contexts.push(test_viewport(config, driver, viewport, &page_urls, progress.as_ref()).await);
        }
        contexts
    };

    for ctx in contexts {
        merged.merge(ctx?);
    }

    let finished_at = Utc::now();
    let report = AuditReport::build(
        run_id,
        config.base_url.clone(),
        config.viewports.clone(),
        started_at,
        finished_at,
        merged,
    );

    if let Some(ref pb) = progress {
        pb.finish_with_message(format!(
            "Audit complete! {} interactions across {} pages",
            report.summary.total_interactions, report.summary.reachable_pages
        ));
    }
    Ok(report)
}

async fn test_viewport(
    config: &AuditConfig,
    driver: &dyn BrowserDriver,
    viewport: &Viewport,
    page_urls: &[String],
    progress: Option<&ProgressBar>,
) -> Result<RunContext, AuditError> {
    let page = open_page(driver, viewport).await?;
    let tester = InteractionTester::new(viewport.name.clone())
        .with_nav_timeout(config.nav_timeout)
        .with_click_timeout(config.click_timeout)
        .with_settle_timeout(config.settle_timeout)
        .with_idle_timeout(config.idle_timeout)
        .with_max_elements(config.max_elements_per_page)
        .with_screenshots(config.screenshot_root());

    let mut ctx = RunContext::new();
    for (idx, url) in page_urls.iter().enumerate() {
        if let Some(pb) = progress {
            pb.set_message(format!(
                "[{}] Testing page {}/{}: {}",
                viewport.name,
                idx + 1,
                page_urls.len(),
                url
            ));
        }
        let run = tester.test_page(page.as_ref(), url, &mut ctx).await;
        debug!(
            "[{}] {} tested {}/{} elements in {} ms",
            viewport.name, url, run.elements_tested, run.elements_found, run.duration_ms
        );
    }

    close_page(page.as_ref(), viewport).await;
    info!(
        "[{}] {} interactions recorded",
        viewport.name,
        ctx.results().len()
    );
    Ok(ctx)
}

async fn open_page(
    driver: &dyn BrowserDriver,
    viewport: &Viewport,
) -> Result<Box<dyn PageHandle>, AuditError> {
    driver
        .new_page(viewport)
        .await
        .map_err(|source| AuditError::PageCreation {
            viewport: viewport.name.clone(),
            source,
        })
}

async fn close_page(page: &dyn PageHandle, viewport: &Viewport) {
    if let Err(e) = page.close().await {
        warn!("Failed to close {} page: {}", viewport.name, e);
    }
}
