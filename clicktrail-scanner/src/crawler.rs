use crate::browser::{LINK_SELECTOR, PageHandle};
use crate::context::RunContext;
use crate::error::{Result, ScanError};
use crate::normalize::normalize;
use crate::result::{BrokenLink, PageRecord};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

/// Breadth-first same-origin page discovery through a [`PageHandle`].
pub struct Crawler {
    max_depth: usize,
    max_pages: usize,
    nav_timeout: Duration,
    idle_timeout: Duration,
    viewport: String,
    progress_callback: Option<ProgressCallback>,
}

impl Crawler {
    pub fn new() -> Self {
        Self {
            max_depth: 5,
            max_pages: 50,
            nav_timeout: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(5),
            viewport: "desktop".to_string(),
            progress_callback: None,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_max_pages(mut self, pages: usize) -> Self {
        self.max_pages = pages;
        self
    }

    pub fn with_nav_timeout(mut self, timeout: Duration) -> Self {
        self.nav_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Viewport name recorded on broken links found while crawling.
    pub fn with_viewport(mut self, viewport: impl Into<String>) -> Self {
        self.viewport = viewport.into();
        self
    }

    /// Called with `(pages_visited, url)` before each page is fetched.
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Crawl from `seed_url`, recording pages and broken links into `ctx`.
    ///
    /// Returns the number of pages visited. Only an unparseable seed is an
    /// error; failing pages are recorded and the crawl moves on.
    pub async fn crawl(
        &self,
        page: &dyn PageHandle,
        seed_url: &str,
        ctx: &mut RunContext,
    ) -> Result<usize> {
        info!(
            "Starting crawl of {} (max depth {}, max pages {})",
            seed_url, self.max_depth, self.max_pages
        );

        let mut seed = Url::parse(seed_url)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", seed_url, e)))?;
        seed.set_fragment(None);
        let origin = seed.origin();

        let mut seen: HashSet<String> = HashSet::from([seed.to_string()]);
        let mut queue: VecDeque<(String, usize, Option<String>)> =
            VecDeque::from([(seed.to_string(), 0, None)]);
        let mut visited = 0;

        while let Some((url, depth, discovered_from)) = queue.pop_front() {
            if visited >= self.max_pages {
                debug!("Page limit {} reached, {} URLs left unvisited", self.max_pages, queue.len() + 1);
                break;
            }
            if depth > self.max_depth || ctx.has_page(&url) {
                continue;
            }

            visited += 1;
            if let Some(ref callback) = self.progress_callback {
                callback(visited, url.clone());
            }

            let record = PageRecord::new(url.clone(), depth, discovered_from);
            let status = match page.goto(&url, self.nav_timeout).await {
                Ok(status) => status,
                Err(e) => {
                    warn!("Failed to load {}: {}", url, e);
                    ctx.record_broken_link(self.broken_link(&url, None, Some(e.to_string())));
                    ctx.record_page(record.with_error(e.to_string()));
                    continue;
                }
            };

            // Redirects may carry a same-origin link elsewhere
            if let Ok(landed) = page.current_url().await
                && let Ok(landed_url) = Url::parse(&landed)
                && landed_url.origin() != origin
            {
                let error = ScanError::OffOrigin {
                    url: url.clone(),
                    landed: landed.clone(),
                }
                .to_string();
                warn!("{}", error);
                ctx.record_broken_link(BrokenLink {
                    route: url.clone(),
                    viewport: self.viewport.clone(),
                    target: landed,
                    status: None,
                    error: Some(error.clone()),
                });
                ctx.record_page(record.with_status(status).with_error(error));
                continue;
            }

            if let Some(code) = status.filter(|code| *code >= 400) {
                warn!("{} answered {}", url, code);
                ctx.record_broken_link(self.broken_link(&url, Some(code), None));
                ctx.record_page(record.with_status(status));
                continue;
            }

            ctx.record_page(record.with_status(status));

            if let Err(e) = page.wait_for_network_idle(self.idle_timeout).await {
                debug!("{} did not go idle: {}", url, e);
            }

            if depth >= self.max_depth {
                continue;
            }

            for link in self.discover_links(page, &url, &origin).await {
                if seen.insert(link.clone()) {
                    debug!("Queuing {} at depth {}", link, depth + 1);
                    queue.push_back((link, depth + 1, Some(url.clone())));
                }
            }
        }

        info!("Crawl complete. Visited {} pages", visited);
        Ok(visited)
    }

    /// Same-origin, canonical link targets on the loaded page.
    async fn discover_links(
        &self,
        page: &dyn PageHandle,
        url: &str,
        origin: &url::Origin,
    ) -> Vec<String> {
        // Relative links resolve against where redirects actually landed
        let base = match page.current_url().await.ok().and_then(|u| Url::parse(&u).ok()) {
            Some(base) => base,
            None => match Url::parse(url) {
                Ok(base) => base,
                Err(_) => return Vec::new(),
            },
        };

        let links = match page.query_elements(LINK_SELECTOR).await {
            Ok(links) => links,
            Err(e) => {
                warn!("Could not enumerate links on {}: {}", url, e);
                return Vec::new();
            }
        };

        links
            .into_iter()
            .filter_map(|probe| probe.element.href)
            .filter_map(|href| normalize(&href, &base, origin))
            .collect()
    }

    fn broken_link(&self, url: &str, status: Option<u16>, error: Option<String>) -> BrokenLink {
        BrokenLink {
            route: url.to_string(),
            viewport: self.viewport.clone(),
            target: url.to_string(),
            status,
            error,
        }
    }
}

impl Default for Crawler {
    fn default() -> Self {
        Self::new()
    }
}
