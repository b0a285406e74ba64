//! Headless Chrome driver over the DevTools protocol.

use super::{
    BrowserDriver, ConsoleLevel, ElementProbe, EventTap, MODAL_SELECTOR, PageEvent, PageHandle,
    Viewport, clean_text, describe_selector,
};
use crate::error::{Result, ScanError};
use crate::result::InteractiveElement;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::IntoEventKind;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::EventFrameNavigated;
use chromiumoxide::cdp::browser_protocol::target::{CloseTargetParams, EventTargetCreated};
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EventConsoleApiCalled, EventExceptionThrown,
};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::{FutureExt, StreamExt};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const QUIET_WINDOW: Duration = Duration::from_millis(500);

/// Launch options for [`ChromeDriver`].
#[derive(Debug, Clone)]
pub struct ChromeConfig {
    pub headless: bool,
    /// Chrome executable (None = auto-detect).
    pub chrome_path: Option<String>,
    pub args: Vec<String>,
}

impl ChromeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible(mut self) -> Self {
        self.headless = false;
        self
    }

    pub fn with_chrome_path(mut self, path: Option<String>) -> Self {
        self.chrome_path = path;
        self
    }

    fn to_browser_config(&self) -> Result<BrowserConfig> {
        let mut config = BrowserConfig::builder();
        if !self.headless {
            config = config.with_head();
        }

        // Separate profile per launch so concurrent audits don't share a ProcessSingleton
        let user_data_dir =
            std::env::temp_dir().join(format!("clicktrail-{}", uuid::Uuid::new_v4()));
        config = config.arg(format!("--user-data-dir={}", user_data_dir.display()));

        for arg in &self.args {
            config = config.arg(arg.clone());
        }
        if let Some(path) = &self.chrome_path {
            config = config.chrome_executable(path.clone());
        }

        config
            .build()
            .map_err(|e| ScanError::LaunchFailed(format!("invalid browser configuration: {}", e)))
    }
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            args: vec![
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
                // target=_blank links must reach us as new targets
                "--disable-popup-blocking".to_string(),
            ],
        }
    }
}

pub struct ChromeDriver {
    inner: Arc<Mutex<Option<Browser>>>,
    handler: JoinHandle<()>,
}

impl ChromeDriver {
    pub async fn launch(config: ChromeConfig) -> Result<Self> {
        debug!("Launching Chrome with {:?}", config);
        let browser_config = config.to_browser_config()?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScanError::LaunchFailed(e.to_string()))?;

        // chromiumoxide only processes CDP traffic while the handler is polled
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("Browser handler error: {}", e);
                }
            }
        });

        Ok(Self {
            inner: Arc::new(Mutex::new(Some(browser))),
            handler,
        })
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    fn name(&self) -> &'static str {
        "chrome"
    }

    async fn new_page(&self, viewport: &Viewport) -> Result<Box<dyn PageHandle>> {
        let page = {
            let guard = self.inner.lock().await;
            let browser = guard.as_ref().ok_or(ScanError::AlreadyClosed)?;
            browser.new_page("about:blank").await?
        };

        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(viewport.width),
            i64::from(viewport.height),
            1.0,
            viewport.is_mobile(),
        ))
        .await?;

        debug!("Opened page for viewport {}", viewport);
        Ok(Box::new(ChromePage::attach(page, self.inner.clone()).await?))
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        if let Some(mut browser) = guard.take() {
            debug!("Closing browser");
            browser.close().await?;
            if let Err(e) = browser.wait().await {
                debug!("Browser process did not exit cleanly: {}", e);
            }
        }
        self.handler.abort();
        Ok(())
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// In-flight request bookkeeping for network-idle detection.
struct NetworkActivity {
    epoch: Instant,
    in_flight: AtomicI64,
    last_change_ms: AtomicU64,
}

impl NetworkActivity {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
            in_flight: AtomicI64::new(0),
            last_change_ms: AtomicU64::new(0),
        }
    }

    fn adjust(&self, delta: i64) {
        // Completions for requests of a previous document may arrive after a reset
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some((n + delta).max(0)));
        self.touch();
    }

    fn reset(&self) {
        self.in_flight.store(0, Ordering::SeqCst);
        self.touch();
    }

    fn touch(&self) {
        let now = self.epoch.elapsed().as_millis() as u64;
        self.last_change_ms.store(now, Ordering::SeqCst);
    }

    fn is_idle(&self) -> bool {
        let quiet_for = self
            .epoch
            .elapsed()
            .saturating_sub(Duration::from_millis(self.last_change_ms.load(Ordering::SeqCst)));
        self.in_flight.load(Ordering::SeqCst) <= 0 && quiet_for >= QUIET_WINDOW
    }
}

struct ChromePage {
    page: Page,
    browser: Arc<Mutex<Option<Browser>>>,
    activity: Arc<NetworkActivity>,
    navigations: Arc<AtomicU64>,
    nav_mark: AtomicU64,
    tasks: Vec<JoinHandle<()>>,
}

impl ChromePage {
    async fn attach(page: Page, browser: Arc<Mutex<Option<Browser>>>) -> Result<Self> {
        let activity = Arc::new(NetworkActivity::new());
        let navigations = Arc::new(AtomicU64::new(0));
        let mut tasks = Vec::new();

        let requests = activity.clone();
        tasks.push(
            listen::<EventRequestWillBeSent, _>(&page, move |event| {
                // Redirect hops reuse the original request id
                if event.redirect_response.is_none() {
                    requests.adjust(1);
                }
            })
            .await?,
        );
        let finished = activity.clone();
        tasks.push(listen::<EventLoadingFinished, _>(&page, move |_| finished.adjust(-1)).await?);
        let failed = activity.clone();
        tasks.push(listen::<EventLoadingFailed, _>(&page, move |_| failed.adjust(-1)).await?);

        let committed = navigations.clone();
        tasks.push(
            listen::<EventFrameNavigated, _>(&page, move |event| {
                if event.frame.parent_id.is_none() {
                    committed.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await?,
        );

        Ok(Self {
            page,
            browser,
            activity,
            navigations,
            nav_mark: AtomicU64::new(0),
            tasks,
        })
    }

    fn mark_navigation(&self) {
        self.nav_mark
            .store(self.navigations.load(Ordering::SeqCst), Ordering::SeqCst);
    }

    async fn evaluate<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| ScanError::ScriptError(e.to_string()))?
            .into_value()
            .map_err(|e| ScanError::ScriptError(e.to_string()))
    }

    async fn document_ready(&self) -> bool {
        self.evaluate::<String>("document.readyState")
            .await
            .is_ok_and(|state| state == "complete")
    }
}

/// Forward every event of type `T` on `page` to `handler` from a background task.
async fn listen<T, F>(page: &Page, mut handler: F) -> Result<JoinHandle<()>>
where
    T: IntoEventKind + Unpin + Send + Sync + 'static,
    F: FnMut(&T) + Send + 'static,
{
    let mut events = page.event_listener::<T>().await?;
    Ok(tokio::spawn(async move {
        while let Some(event) = events.next().await {
            handler(&event);
        }
    }))
}

#[derive(Debug, Deserialize)]
struct RawElement {
    tag: String,
    id: Option<String>,
    class: Option<String>,
    text: String,
    aria_label: Option<String>,
    href: Option<String>,
    target: Option<String>,
    input_type: Option<String>,
    width: f64,
    height: f64,
    visible: bool,
}

impl From<RawElement> for ElementProbe {
    fn from(raw: RawElement) -> Self {
        ElementProbe {
            element: InteractiveElement {
                selector: describe_selector(&raw.tag, raw.id.as_deref(), raw.class.as_deref()),
                text: clean_text(&raw.text),
                aria_label: raw.aria_label,
                href: raw.href,
                target: raw.target,
                input_type: raw.input_type,
                tag_name: raw.tag,
            },
            width: raw.width,
            height: raw.height,
            visible: raw.visible,
        }
    }
}

fn js_string(value: &str) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn enumerate_script(selector: &str) -> Result<String> {
    Ok(format!(
        r#"Array.from(document.querySelectorAll({sel})).map((el) => {{
    const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    const tag = el.tagName.toLowerCase();
    return {{
        tag,
        id: el.id || null,
        class: el.getAttribute('class'),
        text: (el.innerText || el.value || '').toString(),
        aria_label: el.getAttribute('aria-label'),
        href: el.getAttribute('href'),
        target: el.getAttribute('target'),
        input_type: tag === 'input' ? (el.getAttribute('type') || 'text') : null,
        width: rect.width,
        height: rect.height,
        visible: style.display !== 'none' && style.visibility !== 'hidden'
            && parseFloat(style.opacity || '1') > 0 && el.getClientRects().length > 0,
    }};
}})"#,
        sel = js_string(selector)?
    ))
}

fn modal_script() -> Result<String> {
    Ok(format!(
        r#"Array.from(document.querySelectorAll({sel})).some((el) => {{
    const style = window.getComputedStyle(el);
    const rect = el.getBoundingClientRect();
    return style.display !== 'none' && style.visibility !== 'hidden' && rect.width > 0 && rect.height > 0;
}})"#,
        sel = js_string(MODAL_SELECTOR)?
    ))
}

fn console_text(event: &EventConsoleApiCalled) -> String {
    event
        .args
        .iter()
        .map(|arg| {
            arg.value
                .as_ref()
                .and_then(|v| v.as_str().map(str::to_string))
                .or_else(|| arg.description.clone())
                .unwrap_or_else(|| "<object>".to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl PageHandle for ChromePage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<Option<u16>> {
        let mut responses = self.page.event_listener::<EventResponseReceived>().await?;
        self.activity.reset();

        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Err(_) => return Err(ScanError::timeout(format!("navigation to {}", url), timeout)),
            Ok(Err(e)) => {
                return Err(ScanError::NavigationFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
            }
            Ok(Ok(_)) => {}
        }
        self.mark_navigation();

        // Subframe documents arrive after the main one
        let mut status = None;
        while let Some(Some(event)) = responses.next().now_or_never() {
            if event.r#type == ResourceType::Document && status.is_none() {
                status = u16::try_from(event.response.status).ok();
            }
        }
        Ok(status)
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.activity.is_idle() {
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Err(ScanError::timeout("network idle", timeout))
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mark = self.nav_mark.load(Ordering::SeqCst);
        while Instant::now() < deadline {
            if self.navigations.load(Ordering::SeqCst) > mark && self.document_ready().await {
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Err(ScanError::timeout("navigation", timeout))
    }

    async fn current_url(&self) -> Result<String> {
        self.evaluate("window.location.href").await
    }

    async fn query_elements(&self, selector: &str) -> Result<Vec<ElementProbe>> {
        let raw: Vec<RawElement> = self.evaluate(&enumerate_script(selector)?).await?;
        Ok(raw.into_iter().map(ElementProbe::from).collect())
    }

    async fn click(&self, selector: &str, index: usize) -> Result<()> {
        let element = self
            .page
            .find_elements(selector)
            .await?
            .into_iter()
            .nth(index)
            .ok_or_else(|| ScanError::ElementNotFound {
                selector: selector.to_string(),
                index,
            })?;

        self.mark_navigation();
        element.click().await?;
        // Idle only counts from the click onwards
        self.activity.touch();
        Ok(())
    }

    async fn dom_fingerprint(&self) -> Result<String> {
        let html: String = self
            .evaluate("document.body ? document.body.innerHTML : ''")
            .await?;
        Ok(hex::encode(Sha256::digest(html.as_bytes())))
    }

    async fn modal_present(&self) -> Result<bool> {
        self.evaluate(&modal_script()?).await
    }

    async fn rendered_text(&self) -> Result<String> {
        self.evaluate("document.body ? document.body.innerText : ''")
            .await
    }

    async fn html(&self) -> Result<String> {
        self.evaluate("document.documentElement ? document.documentElement.outerHTML : ''")
            .await
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<EventTap> {
        let (tx, mut tap) = EventTap::channel();

        let console = tx.clone();
        tap.attach(
            listen::<EventConsoleApiCalled, _>(&self.page, move |event| {
                let level = match event.r#type {
                    ConsoleApiCalledType::Error | ConsoleApiCalledType::Assert => {
                        ConsoleLevel::Error
                    }
                    ConsoleApiCalledType::Warning => ConsoleLevel::Warning,
                    _ => return,
                };
                let _ = console.send(PageEvent::Console {
                    level,
                    text: console_text(event),
                });
            })
            .await?,
        );

        let exceptions = tx.clone();
        tap.attach(
            listen::<EventExceptionThrown, _>(&self.page, move |event| {
                let _ = exceptions.send(PageEvent::Console {
                    level: ConsoleLevel::Error,
                    text: event.exception_details.text.clone(),
                });
            })
            .await?,
        );

        let responses = tx.clone();
        tap.attach(
            listen::<EventResponseReceived, _>(&self.page, move |event| {
                let _ = responses.send(PageEvent::Response {
                    url: event.response.url.clone(),
                    status: u16::try_from(event.response.status).unwrap_or(0),
                    document: event.r#type == ResourceType::Document,
                });
            })
            .await?,
        );

        // New tabs are browser-level targets whose opener is this page
        let mut targets = {
            let guard = self.browser.lock().await;
            let browser = guard.as_ref().ok_or(ScanError::AlreadyClosed)?;
            browser.event_listener::<EventTargetCreated>().await?
        };
        let own_target = self.page.target_id().clone();
        let browser = self.browser.clone();
        tap.attach(tokio::spawn(async move {
            while let Some(event) = targets.next().await {
                let info = &event.target_info;
                if info.opener_id.as_ref() != Some(&own_target) {
                    continue;
                }
                let _ = tx.send(PageEvent::Popup {
                    url: info.url.clone(),
                });

                if let Some(browser) = browser.lock().await.as_ref()
                    && let Err(e) = browser
                        .execute(CloseTargetParams::new(info.target_id.clone()))
                        .await
                {
                    debug!("Could not close popup {}: {}", info.url, e);
                }
            }
        }));

        Ok(tap)
    }

    async fn close(&self) -> Result<()> {
        for task in &self.tasks {
            task.abort();
        }
        self.page.clone().close().await?;
        Ok(())
    }
}

impl Drop for ChromePage {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
