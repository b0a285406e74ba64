//! Static HTML driver.
//!
//! Pages are fetched with reqwest and inspected with scraper. Nothing is
//! rendered and no script runs, so link clicks navigate, `target="_blank"`
//! links report a popup and every other element has no effect. Screenshots
//! are not supported.

use super::{
    BrowserDriver, ElementProbe, EventTap, MODAL_SELECTOR, PageEvent, PageHandle, Viewport,
    clean_text, describe_selector,
};
use crate::error::{Result, ScanError};
use crate::result::InteractiveElement;
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;
use url::Url;

pub struct HttpDriver {
    client: Client,
}

impl HttpDriver {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(15))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("clicktrail/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .connect_timeout(timeout / 2)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BrowserDriver for HttpDriver {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn new_page(&self, viewport: &Viewport) -> Result<Box<dyn PageHandle>> {
        debug!("Opened static page for viewport {}", viewport);
        Ok(Box::new(HttpPage::new(self.client.clone())))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct PageState {
    url: String,
    html: String,
    navigated: bool,
}

struct HttpPage {
    client: Client,
    state: Mutex<PageState>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<PageEvent>>>,
}

/// What a click on a static element does.
enum ClickAction {
    Nothing,
    Popup(String),
    SameDocument(String),
    Load(String),
    Leave(String),
}

impl HttpPage {
    fn new(client: Client) -> Self {
        Self {
            client,
            state: Mutex::new(PageState {
                url: "about:blank".to_string(),
                ..Default::default()
            }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    async fn emit(&self, event: PageEvent) {
        let mut listeners = self.listeners.lock().await;
        listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Fetch `url` and return the final URL, status and body.
    async fn fetch(&self, url: &str) -> Result<(String, u16, String)> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ScanError::NavigationFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let final_url = response.url().to_string();
        let status = response.status().as_u16();
        let body = response.text().await?;

        self.emit(PageEvent::Response {
            url: final_url.clone(),
            status,
            document: true,
        })
        .await;

        Ok((final_url, status, body))
    }

    async fn load(&self, url: &str) -> Result<u16> {
        let (final_url, status, html) = self.fetch(url).await?;
        let mut state = self.state.lock().await;
        state.url = final_url;
        state.html = html;
        Ok(status)
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| ScanError::Other(format!("Invalid selector {}: {:?}", selector, e)))
}

fn normalized_style(element: &ElementRef) -> String {
    element
        .value()
        .attr("style")
        .unwrap_or_default()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Without layout, visibility comes from markup: `display:none` collapses the
/// box, `hidden`/`visibility:hidden` hide it, everything else is shown.
fn probe(element: ElementRef) -> ElementProbe {
    let value = element.value();
    let tag = value.name().to_ascii_lowercase();
    let style = normalized_style(&element);
    let input_type = (tag == "input").then(|| value.attr("type").unwrap_or("text").to_string());

    let collapsed = style.contains("display:none");
    let hidden = value.attr("hidden").is_some()
        || style.contains("visibility:hidden")
        || input_type.as_deref() == Some("hidden");

    let text = if tag == "input" {
        value.attr("value").unwrap_or_default().to_string()
    } else {
        element.text().collect::<Vec<_>>().join(" ")
    };

    ElementProbe {
        element: InteractiveElement {
            selector: describe_selector(&tag, value.attr("id"), value.attr("class")),
            text: clean_text(&text),
            aria_label: value.attr("aria-label").map(str::to_string),
            href: value.attr("href").map(str::to_string),
            target: value.attr("target").map(str::to_string),
            input_type,
            tag_name: tag,
        },
        width: if collapsed { 0.0 } else { 1.0 },
        height: if collapsed { 0.0 } else { 1.0 },
        visible: !collapsed && !hidden,
    }
}

fn click_action(current: &str, probe: &ElementProbe) -> ClickAction {
    let element = &probe.element;
    let Some(href) = element.href.as_deref().filter(|_| element.tag_name == "a") else {
        return ClickAction::Nothing;
    };
    let Some(target) = Url::parse(current).ok().and_then(|base| base.join(href.trim()).ok())
    else {
        return ClickAction::Nothing;
    };
    if !matches!(target.scheme(), "http" | "https") {
        return ClickAction::Nothing;
    }

    if element.opens_new_tab() {
        return ClickAction::Popup(target.to_string());
    }

    let mut without_fragment = target.clone();
    without_fragment.set_fragment(None);
    let current_without_fragment = Url::parse(current).ok().map(|mut u| {
        u.set_fragment(None);
        u
    });
    if current_without_fragment.as_ref() == Some(&without_fragment) && target.fragment().is_some()
    {
        return ClickAction::SameDocument(target.to_string());
    }

    match Url::parse(current) {
        Ok(base) if base.origin() == target.origin() => ClickAction::Load(target.to_string()),
        _ => ClickAction::Leave(target.to_string()),
    }
}

fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let body = Selector::parse("body").unwrap();
    let root = document
        .select(&body)
        .next()
        .unwrap_or_else(|| document.root_element());

    root.descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let in_script = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript" | "template"))
            });
            let text = text.trim();
            (!in_script && !text.is_empty()).then(|| text.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl PageHandle for HttpPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<Option<u16>> {
        self.state.lock().await.navigated = false;
        match tokio::time::timeout(timeout, self.load(url)).await {
            Ok(result) => result.map(Some),
            Err(_) => Err(ScanError::timeout(format!("navigation to {}", url), timeout)),
        }
    }

    async fn wait_for_network_idle(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> Result<()> {
        if self.state.lock().await.navigated {
            return Ok(());
        }
        tokio::time::sleep(timeout).await;
        Err(ScanError::timeout("navigation", timeout))
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state.lock().await.url.clone())
    }

    async fn query_elements(&self, selector: &str) -> Result<Vec<ElementProbe>> {
        let state = self.state.lock().await;
        let selector = parse_selector(selector)?;
        let document = Html::parse_document(&state.html);
        Ok(document.select(&selector).map(probe).collect())
    }

    async fn click(&self, selector: &str, index: usize) -> Result<()> {
        let action = {
            let mut state = self.state.lock().await;
            state.navigated = false;
            let parsed = parse_selector(selector)?;
            let document = Html::parse_document(&state.html);
            let target = document
                .select(&parsed)
                .nth(index)
                .map(probe)
                .ok_or_else(|| ScanError::ElementNotFound {
                    selector: selector.to_string(),
                    index,
                })?;
            click_action(&state.url, &target)
        };

        match action {
            ClickAction::Nothing => {}
            ClickAction::Popup(url) => self.emit(PageEvent::Popup { url }).await,
            ClickAction::SameDocument(url) => self.state.lock().await.url = url,
            ClickAction::Load(url) => {
                if let Err(e) = self.load(&url).await {
                    debug!("Static navigation to {} failed: {}", url, e);
                    let mut state = self.state.lock().await;
                    state.url = url;
                    state.html.clear();
                }
                self.state.lock().await.navigated = true;
            }
            ClickAction::Leave(url) => {
                let mut state = self.state.lock().await;
                state.url = url;
                state.html.clear();
                state.navigated = true;
            }
        }
        Ok(())
    }

    async fn dom_fingerprint(&self) -> Result<String> {
        let state = self.state.lock().await;
        Ok(hex::encode(Sha256::digest(state.html.as_bytes())))
    }

    async fn modal_present(&self) -> Result<bool> {
        let state = self.state.lock().await;
        let selector = parse_selector(MODAL_SELECTOR)?;
        let document = Html::parse_document(&state.html);
        let present = document.select(&selector).map(probe).any(|p| p.visible);
        Ok(present)
    }

    async fn rendered_text(&self) -> Result<String> {
        let state = self.state.lock().await;
        Ok(visible_text(&state.html))
    }

    async fn html(&self) -> Result<String> {
        Ok(self.state.lock().await.html.clone())
    }

    async fn screenshot(&self, _path: &Path) -> Result<()> {
        Err(ScanError::Unsupported("screenshots"))
    }

    async fn subscribe(&self) -> Result<EventTap> {
        let (tx, tap) = EventTap::channel();
        self.listeners.lock().await.push(tx);
        Ok(tap)
    }

    async fn close(&self) -> Result<()> {
        self.listeners.lock().await.clear();
        Ok(())
    }
}
