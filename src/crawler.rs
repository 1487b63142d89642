//! Paginated listing traversal.
//!
//! Per page: `LOADING -> EXTRACTING -> (ADVANCING | DONE)`. Ranges and single
//! pages are reached by URL; exhaustive runs follow the next-page control.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{CrawlConfig, SiteConfig};
use crate::coordinator::InterruptFlag;
use crate::models::{PageSelection, ProductIdentifier};
use crate::normalizer::LinkNormalizer;
use crate::probe::{self, ProbeOutcome};
use crate::selectors;
use crate::settle;
use crate::surface::{ElementHandle, RenderSurface, SurfaceResult};
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// Every requested page was visited.
    Completed,
    NoNextControl,
    SafetyCap,
    /// An interrupt arrived; pages already harvested are kept.
    Interrupted,
    LoadFailed { page: u32, detail: String },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Completed => f.write_str("completed"),
            StopReason::NoNextControl => f.write_str("no more pages found"),
            StopReason::SafetyCap => f.write_str("reached page safety cap"),
            StopReason::Interrupted => f.write_str("interrupted"),
            StopReason::LoadFailed { page, detail } => {
                write!(f, "page {} failed to load: {}", page, detail)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageHarvest {
    pub page: u32,
    pub found: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlReport {
    /// Deduplicated, in order of first appearance across the run.
    pub identifiers: Vec<ProductIdentifier>,
    pub pages: Vec<PageHarvest>,
    pub stop: StopReason,
}

/// `base` with its `page` query parameter set to `page`.
pub fn page_url(base: &str, page: u32) -> Result<String> {
    let mut url = Url::parse(base)
        .map_err(|e| AppError::Validation(format!("Invalid listing URL '{}': {}", base, e)))?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("page", &page.to_string());
    Ok(url.into())
}

/// Keyword search listing on the configured storefront.
pub fn search_url(site: &SiteConfig, query: &str) -> Result<String> {
    let mut url = Url::parse(&site.origin)
        .and_then(|origin| origin.join("/search"))
        .map_err(|e| AppError::Validation(format!("Invalid site origin '{}': {}", site.origin, e)))?;
    url.query_pairs_mut()
        .append_pair("q", query.trim())
        .append_pair("zipcode", &site.zip_code);
    Ok(url.into())
}

/// Drops repeats, keeping the first occurrence of each identifier.
pub fn dedup_preserving_order<I>(identifiers: I) -> Vec<ProductIdentifier>
where
    I: IntoIterator<Item = ProductIdentifier>,
{
    let mut seen = HashSet::new();
    identifiers
        .into_iter()
        .filter(|identifier| seen.insert(identifier.clone()))
        .collect()
}

pub struct ListingCrawler<'a> {
    surface: &'a dyn RenderSurface,
    normalizer: &'a LinkNormalizer,
    config: &'a CrawlConfig,
    landed_on: Option<u32>,
    interrupt: Option<InterruptFlag>,
}

impl<'a> ListingCrawler<'a> {
    pub fn new(
        surface: &'a dyn RenderSurface,
        normalizer: &'a LinkNormalizer,
        config: &'a CrawlConfig,
    ) -> Self {
        Self {
            surface,
            normalizer,
            config,
            landed_on: None,
            interrupt: None,
        }
    }

    /// The surface is already showing `page`; it will not be loaded again.
    pub fn landed_on(mut self, page: u32) -> Self {
        self.landed_on = Some(page);
        self
    }

    /// Stops paging at the next page boundary once `interrupt` is raised.
    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    fn interrupted(&self) -> bool {
        self.interrupt.as_ref().is_some_and(InterruptFlag::is_raised)
    }

    pub async fn crawl(&self, base_url: &str, selection: PageSelection) -> Result<CrawlReport> {
        info!("Crawling {} of {}", selection, base_url);
        let mut collected = Vec::new();
        let mut pages = Vec::new();

        let stop = match selection {
            PageSelection::Single(page) => {
                self.visit_pages(base_url, page..=page, &mut collected, &mut pages)
                    .await?
            }
            PageSelection::Range { start, end } => {
                self.visit_pages(base_url, start..=end, &mut collected, &mut pages)
                    .await?
            }
            PageSelection::Exhaustive => {
                self.follow_next(base_url, &mut collected, &mut pages).await?
            }
        };

        let identifiers = dedup_preserving_order(collected);
        info!(
            "Collected {} unique products from {} page(s); stopped: {}",
            identifiers.len(),
            pages.len(),
            stop
        );
        Ok(CrawlReport {
            identifiers,
            pages,
            stop,
        })
    }

    async fn visit_pages(
        &self,
        base_url: &str,
        range: std::ops::RangeInclusive<u32>,
        collected: &mut Vec<ProductIdentifier>,
        pages: &mut Vec<PageHarvest>,
    ) -> Result<StopReason> {
        for page in range {
            if !pages.is_empty() && self.interrupted() {
                info!("Interrupted before page {}", page);
                return Ok(StopReason::Interrupted);
            }
            if self.landed_on != Some(page) {
                let url = page_url(base_url, page)?;
                if let Err(e) = self.load_with_retry(&url).await {
                    warn!("Giving up on page {}: {}", page, e);
                    return Ok(StopReason::LoadFailed {
                        page,
                        detail: e.to_string(),
                    });
                }
                self.settle_after_navigation(self.config.load_settle_ms).await;
            }
            self.harvest_into(page, collected, pages).await;
        }
        Ok(StopReason::Completed)
    }

    async fn follow_next(
        &self,
        base_url: &str,
        collected: &mut Vec<ProductIdentifier>,
        pages: &mut Vec<PageHarvest>,
    ) -> Result<StopReason> {
        if self.landed_on != Some(1) {
            let url = page_url(base_url, 1)?;
            if let Err(e) = self.load_with_retry(&url).await {
                warn!("Giving up on page 1: {}", e);
                return Ok(StopReason::LoadFailed {
                    page: 1,
                    detail: e.to_string(),
                });
            }
            self.settle_after_navigation(self.config.load_settle_ms).await;
        }

        let mut page = 1;
        loop {
            self.harvest_into(page, collected, pages).await;

            if page >= self.config.max_pages {
                warn!("Reached safety limit of {} pages", self.config.max_pages);
                return Ok(StopReason::SafetyCap);
            }

            if self.interrupted() {
                info!("Interrupted after page {}", page);
                return Ok(StopReason::Interrupted);
            }

            match self.advance().await {
                ProbeOutcome::Found(_) => page += 1,
                ProbeOutcome::NotFound => {
                    info!("No more pages found after page {}", page);
                    return Ok(StopReason::NoNextControl);
                }
                ProbeOutcome::Failed(e) => {
                    warn!("Next-page control unusable after page {}: {}", page, e);
                    return Ok(StopReason::NoNextControl);
                }
            }
        }
    }

    async fn load_with_retry(&self, url: &str) -> SurfaceResult<()> {
        let strategy = FixedInterval::from_millis(self.config.retry_delay_ms)
            .take(self.config.retry_attempts);
        Retry::start(strategy, || {
            debug!("Loading {}", url);
            self.surface.load(url)
        })
        .await
    }

    async fn settle_after_navigation(&self, timeout_ms: u64) {
        let surface = self.surface;
        let outcome = settle::wait_until(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(self.config.poll_ms),
            move || async move {
                probe::first_present(surface, &selectors::listing::PRODUCT_ANCHORS)
                    .await
                    .is_found()
            },
        )
        .await;
        if !outcome.is_satisfied() {
            debug!("No product anchors after {}ms", timeout_ms);
        }
    }

    async fn harvest_into(
        &self,
        page: u32,
        collected: &mut Vec<ProductIdentifier>,
        pages: &mut Vec<PageHarvest>,
    ) {
        let found = self.harvest_current().await;
        info!("Page {}: Found {} links", page, found.len());
        pages.push(PageHarvest {
            page,
            found: found.len(),
        });
        collected.extend(found);
    }

    /// Normalized product links on the current page, DOM order, unique.
    pub async fn harvest_current(&self) -> Vec<ProductIdentifier> {
        // Lazy-loaded tiles keep arriving after the first anchors render.
        settle::pause_ms(self.config.page_settle_ms).await;

        let mut anchors: Vec<ElementHandle> = Vec::new();
        for locator in selectors::listing::PRODUCT_ANCHORS.iter() {
            match self.surface.find(locator).await {
                Ok(handles) => anchors.extend(handles),
                Err(e) => warn!("Anchor query {} failed: {}", locator, e),
            }
        }

        let mut identifiers = Vec::with_capacity(anchors.len());
        for anchor in anchors {
            match self.surface.attribute(anchor, "href").await {
                Ok(Some(href)) => {
                    if let Some(identifier) = self.normalizer.normalize(&href) {
                        identifiers.push(identifier);
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("Skipping anchor {}: {}", anchor, e),
            }
        }
        dedup_preserving_order(identifiers)
    }

    /// Clicks the first displayed next-page control. Each control shape is
    /// tried in priority order; a shape whose click fails yields to the next.
    async fn advance(&self) -> ProbeOutcome<ElementHandle> {
        let mut last_error = None;
        for locator in selectors::listing::NEXT_PAGE.iter() {
            let handle = match self.surface.find(locator).await {
                Ok(handles) => match handles.first() {
                    Some(handle) => *handle,
                    None => continue,
                },
                Err(e) => {
                    last_error = Some(e);
                    continue;
                }
            };

            match self.surface.is_displayed(handle).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    last_error = Some(e);
                    continue;
                }
            }

            let clicked = async {
                self.surface.scroll_into_view(handle).await?;
                self.surface.script_click(handle).await
            }
            .await;
            match clicked {
                Ok(()) => {
                    settle::pause_ms(self.config.next_settle_ms).await;
                    return ProbeOutcome::Found(handle);
                }
                Err(e) => {
                    debug!("Next-page click via {} failed: {}", locator, e);
                    last_error = Some(e);
                }
            }
        }
        last_error.map_or(ProbeOutcome::NotFound, ProbeOutcome::Failed)
    }
}
