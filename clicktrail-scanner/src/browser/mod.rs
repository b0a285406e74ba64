//! Browser capability interface.
//!
//! The crawler and the interaction tester only ever talk to a
//! [`BrowserDriver`] and the [`PageHandle`]s it creates. Two drivers ship with
//! the crate: [`ChromeDriver`] drives headless Chrome over CDP, and
//! [`HttpDriver`] fetches static HTML for environments without a browser.
//!
//! Page events (console messages, responses, popups) are only observed while
//! an [`EventTap`] is alive. Dropping the tap detaches its listeners, so a
//! listener never outlives the interaction that subscribed it.

pub mod chrome;
pub mod http;

pub use chrome::{ChromeConfig, ChromeDriver};
pub use http::HttpDriver;

use crate::error::{Result, ScanError};
use crate::result::InteractiveElement;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Everything the interaction tester considers clickable.
pub const INTERACTIVE_SELECTOR: &str = concat!(
    "a[href], button, [role=\"button\"], [onclick], ",
    "input[type=\"submit\"], input[type=\"button\"], ",
    "[class*=\"button\"], [class*=\"btn\"], [class*=\"cta\"], ",
    "[data-testid*=\"button\"], [tabindex=\"0\"]"
);

/// Links followed by the crawler.
pub const LINK_SELECTOR: &str = "a[href]";

/// Dialogs, modals and drawers.
pub const MODAL_SELECTOR: &str = concat!(
    "[role=\"dialog\"], [aria-modal=\"true\"], dialog[open], ",
    "[class*=\"modal\"], [class*=\"drawer\"]"
);

/// Visible text is truncated to this many characters.
pub const MAX_TEXT_CHARS: usize = 100;

/// A named viewport size.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
        }
    }

    pub fn desktop() -> Self {
        Self::new("desktop", 1920, 1080)
    }

    pub fn mobile() -> Self {
        Self::new("mobile", 375, 667)
    }

    /// Narrow viewports are emulated as touch devices.
    pub fn is_mobile(&self) -> bool {
        self.width < 768
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}x{})", self.name, self.width, self.height)
    }
}

impl FromStr for Viewport {
    type Err = ScanError;

    /// Accepts `desktop`, `mobile` or `name:WIDTHxHEIGHT`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "desktop" => return Ok(Self::desktop()),
            "mobile" => return Ok(Self::mobile()),
            _ => {}
        }

        let invalid = || ScanError::Other(format!("Invalid viewport '{}'", s));
        let (name, size) = s.split_once(':').ok_or_else(invalid)?;
        let (width, height) = size
            .to_ascii_lowercase()
            .split_once('x')
            .map(|(w, h)| (w.trim().parse::<u32>(), h.trim().parse::<u32>()))
            .ok_or_else(invalid)?;

        match (width, height) {
            (Ok(width), Ok(height)) if width > 0 && height > 0 && !name.trim().is_empty() => {
                Ok(Self::new(name.trim(), width, height))
            }
            _ => Err(invalid()),
        }
    }
}

/// An enumerated element together with its layout state.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementProbe {
    pub element: InteractiveElement,
    pub width: f64,
    pub height: f64,
    pub visible: bool,
}

impl ElementProbe {
    pub fn has_size(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsoleLevel {
    Warning,
    Error,
}

/// Something observed on a page while an [`EventTap`] was attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    Console { level: ConsoleLevel, text: String },
    Response { url: String, status: u16, document: bool },
    Popup { url: String },
}

/// Running totals drained from an [`EventTap`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TapTotals {
    pub console_issues: usize,
    pub network_errors: usize,
    pub popups: usize,
    /// Status of the most recent document response.
    pub document_status: Option<u16>,
    pub first_console_message: Option<String>,
    pub first_failed_response: Option<(String, u16)>,
}

impl TapTotals {
    fn record(&mut self, event: PageEvent) {
        match event {
            PageEvent::Console { text, .. } => {
                self.console_issues += 1;
                self.first_console_message.get_or_insert(text);
            }
            PageEvent::Response {
                url,
                status,
                document,
            } => {
                if document {
                    self.document_status = Some(status);
                }
                if status >= 400 {
                    self.network_errors += 1;
                    self.first_failed_response.get_or_insert((url, status));
                }
            }
            PageEvent::Popup { .. } => self.popups += 1,
        }
    }
}

/// Scoped event subscription.
///
/// Listener tasks feeding the tap are aborted when it is dropped, including
/// on early returns and errors in the code that owns it.
pub struct EventTap {
    events: mpsc::UnboundedReceiver<PageEvent>,
    tasks: Vec<JoinHandle<()>>,
    totals: TapTotals,
}

impl EventTap {
    /// A tap with its sending half. Drivers push events into the sender.
    pub fn channel() -> (mpsc::UnboundedSender<PageEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                events: rx,
                tasks: Vec::new(),
                totals: TapTotals::default(),
            },
        )
    }

    /// Tie a listener task's lifetime to this tap.
    pub fn attach(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    /// Pull every event delivered so far and return the cumulative totals.
    pub fn drain(&mut self) -> &TapTotals {
        while let Ok(event) = self.events.try_recv() {
            self.totals.record(event);
        }
        &self.totals
    }
}

impl Drop for EventTap {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Creates pages sized to a viewport.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    fn name(&self) -> &'static str;

    async fn new_page(&self, viewport: &Viewport) -> Result<Box<dyn PageHandle>>;

    async fn close(&self) -> Result<()>;
}

/// One browser tab.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigate and wait for the load. Returns the main document's HTTP
    /// status when the driver could observe it.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<Option<u16>>;

    /// Resolve once no requests have been in flight for a short quiet window.
    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<()>;

    /// Resolve once a main-frame navigation started by the last click has
    /// committed. Errors with [`ScanError::Timeout`] if none happens.
    async fn wait_for_navigation(&self, timeout: Duration) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Elements matching `selector`, in document order.
    async fn query_elements(&self, selector: &str) -> Result<Vec<ElementProbe>>;

    /// Click the `index`-th match of `selector`.
    async fn click(&self, selector: &str, index: usize) -> Result<()>;

    /// Content hash of the current DOM.
    async fn dom_fingerprint(&self) -> Result<String>;

    async fn modal_present(&self) -> Result<bool>;

    /// Visible text of the page body.
    async fn rendered_text(&self) -> Result<String>;

    /// Serialized markup of the current document.
    async fn html(&self) -> Result<String>;

    async fn screenshot(&self, path: &Path) -> Result<()>;

    async fn subscribe(&self) -> Result<EventTap>;

    async fn close(&self) -> Result<()>;
}

/// Short descriptive selector for reports, e.g. `button#save` or `a.nav-link`.
pub fn describe_selector(tag: &str, id: Option<&str>, class: Option<&str>) -> String {
    if let Some(id) = id.map(str::trim).filter(|id| !id.is_empty()) {
        return format!("{}#{}", tag, id);
    }
    match class.and_then(|c| c.split_whitespace().next()) {
        Some(first) => format!("{}.{}", tag, first),
        None => tag.to_string(),
    }
}

/// Collapse whitespace and cap the length of element text.
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_TEXT_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_and_custom_viewports() {
        assert_eq!("desktop".parse::<Viewport>().unwrap(), Viewport::desktop());
        assert_eq!(" Mobile ".parse::<Viewport>().unwrap(), Viewport::mobile());
        assert_eq!(
            "tablet:768x1024".parse::<Viewport>().unwrap(),
            Viewport::new("tablet", 768, 1024)
        );
        assert!("tablet".parse::<Viewport>().is_err());
        assert!("tablet:0x1024".parse::<Viewport>().is_err());
        assert!(":800x600".parse::<Viewport>().is_err());
        assert!("wide:abcx600".parse::<Viewport>().is_err());
    }

    #[test]
    fn mobile_detection_uses_width() {
        assert!(Viewport::mobile().is_mobile());
        assert!(!Viewport::desktop().is_mobile());
    }

    #[test]
    fn selector_description_prefers_id() {
        assert_eq!(describe_selector("button", Some("save"), Some("btn primary")), "button#save");
        assert_eq!(describe_selector("a", Some(" "), Some("nav-link active")), "a.nav-link");
        assert_eq!(describe_selector("div", None, None), "div");
    }

    #[test]
    fn clean_text_collapses_and_truncates() {
        assert_eq!(clean_text("  Buy\n\n  now  "), "Buy now");
        assert_eq!(clean_text(&"x".repeat(500)).len(), MAX_TEXT_CHARS);
    }

    #[tokio::test]
    async fn tap_accumulates_totals() {
        let (tx, mut tap) = EventTap::channel();
        tx.send(PageEvent::Console {
            level: ConsoleLevel::Error,
            text: "boom".to_string(),
        })
        .unwrap();
        tx.send(PageEvent::Response {
            url: "http://localhost/api".to_string(),
            status: 500,
            document: false,
        })
        .unwrap();
        tx.send(PageEvent::Response {
            url: "http://localhost/next".to_string(),
            status: 200,
            document: true,
        })
        .unwrap();

        let totals = tap.drain().clone();
        assert_eq!(totals.console_issues, 1);
        assert_eq!(totals.network_errors, 1);
        assert_eq!(totals.document_status, Some(200));
        assert_eq!(totals.first_console_message.as_deref(), Some("boom"));

        tx.send(PageEvent::Popup {
            url: "http://localhost/new".to_string(),
        })
        .unwrap();
        let totals = tap.drain();
        assert_eq!(totals.popups, 1);
        assert_eq!(totals.console_issues, 1);
    }

    #[tokio::test]
    async fn dropping_tap_aborts_listeners() {
        let (_tx, mut tap) = EventTap::channel();
        let (alive, stopped) = tokio::sync::oneshot::channel::<()>();
        tap.attach(tokio::spawn(async move {
            let _alive = alive;
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }));

        drop(tap);
        let outcome = tokio::time::timeout(Duration::from_secs(1), stopped).await;
        assert!(matches!(outcome, Ok(Err(_))), "listener task still running");
    }
}
