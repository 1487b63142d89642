//! Per-product qualification.
//!
//! [`Qualifier`] is the effectful half of the pipeline: for the current
//! [`Stage`] it drives the surface and reports what it saw as a [`Signal`].
//! [`stage::decide`] does the deciding. Any surface error that escapes a
//! stage becomes an `ERROR` verdict for that product alone.

pub mod sorting;
pub mod stage;

pub use sorting::{SortAttempt, SortStrategy, default_strategies};
pub use stage::{
    DecisionContext, ReviewTally, ReviewsEntry, SellerObservation, Signal, Stage, Transition,
    decide,
};

use chrono::{Datelike, Local, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::QualifyConfig;
use crate::dates::has_month_token;
use crate::models::{ProductIdentifier, Reason, TargetPeriod, Verdict};
use crate::probe::{self, ProbeOutcome};
use crate::selectors;
use crate::settle;
use crate::surface::{ElementHandle, RenderSurface, SurfaceResult};

static VISIT_STORE_BRAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Visit the store\s*(.*)").expect("hardcoded regex pattern is valid")
});

static BRAND_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9 &-]").expect("hardcoded regex pattern is valid"));

type Clock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub struct Qualifier<'a> {
    surface: &'a dyn RenderSurface,
    config: &'a QualifyConfig,
    target: &'a TargetPeriod,
    strategies: Vec<Box<dyn SortStrategy>>,
    clock: Clock,
}

impl<'a> Qualifier<'a> {
    pub fn new(
        surface: &'a dyn RenderSurface,
        config: &'a QualifyConfig,
        target: &'a TargetPeriod,
    ) -> Self {
        Self {
            surface,
            config,
            target,
            strategies: default_strategies(),
            clock: Box::new(|| Local::now().naive_local()),
        }
    }

    /// Reference time for relative review dates.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Always yields exactly one verdict.
    pub async fn qualify(&self, identifier: &ProductIdentifier) -> Verdict {
        match self.run(identifier).await {
            Ok(reason) => Verdict::new(identifier.clone(), reason),
            Err(e) => {
                warn!("Check of {} failed: {}", identifier, e);
                Verdict::failed(identifier.clone(), e)
            }
        }
    }

    async fn run(&self, identifier: &ProductIdentifier) -> SurfaceResult<Reason> {
        let reference = (self.clock)();
        let mut brand = String::new();
        let mut stage = Stage::Open;

        loop {
            let signal = self.act(stage, identifier, &brand, reference).await?;
            if let Signal::Opened { brand: found } = &signal {
                brand = found.clone();
            }

            let context = DecisionContext {
                brand: &brand,
                target: self.target,
                min_reviews: self.config.min_reviews,
            };
            match decide(stage, &signal, &context) {
                Transition::Advance(next) => {
                    debug!("{}: {} -> {}", identifier, stage, next);
                    stage = next;
                }
                Transition::Conclude(reason) => return Ok(reason),
            }
        }
    }

    async fn act(
        &self,
        stage: Stage,
        identifier: &ProductIdentifier,
        brand: &str,
        reference: NaiveDateTime,
    ) -> SurfaceResult<Signal> {
        match stage {
            Stage::Open => self.open(identifier).await,
            Stage::SellerCheck => Ok(Signal::Sellers(self.check_sellers(brand).await)),
            Stage::ReviewsLocate => Ok(Signal::Reviews(self.open_reviews().await)),
            Stage::SortAttempt => Ok(Signal::SortFinished {
                sorted: self.sort_reviews().await,
            }),
            Stage::ReviewCount => Ok(Signal::Counted(self.count_reviews(reference).await)),
        }
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    async fn wait_for_any(&self, timeout_ms: u64, locators: &[crate::surface::Locator]) {
        let surface = self.surface;
        settle::wait_until(Self::ms(timeout_ms), Self::ms(self.config.poll_ms), move || async move {
            probe::first_present(surface, locators).await.is_found()
        })
        .await;
    }

    async fn open(&self, identifier: &ProductIdentifier) -> SurfaceResult<Signal> {
        self.surface.load(identifier.as_str()).await?;
        self.wait_for_any(self.config.open_settle_ms, &selectors::product::BRAND)
            .await;
        let brand = self.extract_brand().await;
        if brand.is_empty() {
            debug!("No brand found for {}", identifier);
        }
        Ok(Signal::Opened { brand })
    }

    /// Structured brand element, then the brand link, then the
    /// "Visit the store <Brand>" phrase. Empty when all three miss.
    async fn extract_brand(&self) -> String {
        for locator in selectors::product::BRAND.iter() {
            if let ProbeOutcome::Found(element) =
                probe::first_present(self.surface, std::slice::from_ref(locator)).await
            {
                if let Ok(text) = self.surface.text(element).await {
                    let text = text.trim();
                    if !text.is_empty() {
                        return text.to_string();
                    }
                }
            }
        }

        let nodes = match probe::union_all(self.surface, &selectors::product::VISIT_STORE).await {
            ProbeOutcome::Found(nodes) => nodes,
            _ => return String::new(),
        };
        for node in nodes {
            let Ok(text) = self.surface.text(node).await else {
                continue;
            };
            if !text.contains("Visit the store") {
                continue;
            }
            if let Some(rest) = VISIT_STORE_BRAND.captures(&text).and_then(|caps| caps.get(1)) {
                let candidate = BRAND_NOISE.replace_all(rest.as_str(), "");
                let candidate = candidate.trim();
                if !candidate.is_empty() {
                    return candidate.to_string();
                }
            }
        }
        String::new()
    }

    async fn check_sellers(&self, brand: &str) -> SellerObservation {
        let control = match probe::first_displayed(self.surface, &selectors::product::COMPARE_SELLERS).await {
            ProbeOutcome::Found(control) => control,
            ProbeOutcome::NotFound => return SellerObservation::NoCompareControl,
            ProbeOutcome::Failed(e) => {
                return SellerObservation::SurfaceUnavailable {
                    detail: e.to_string(),
                };
            }
        };

        let opened = async {
            self.surface.scroll_into_view(control).await?;
            self.surface.script_click(control).await
        }
        .await;
        if let Err(e) = opened {
            debug!("Seller comparison did not open: {}", e);
            return SellerObservation::SurfaceUnavailable {
                detail: e.to_string(),
            };
        }

        let mut panel = selectors::sellers::PLATFORM_MARKER.clone();
        panel.extend(selectors::sellers::NAMES.iter().cloned());
        self.wait_for_any(self.config.click_settle_ms, &panel).await;

        let platform_seller =
            probe::first_present(self.surface, &selectors::sellers::PLATFORM_MARKER)
                .await
                .is_found();
        let sellers = if platform_seller {
            Vec::new()
        } else {
            self.collect_seller_names().await
        };
        debug!(
            "Sellers for brand '{}': {:?} (platform seller: {})",
            brand, sellers, platform_seller
        );

        self.close_comparison().await;
        SellerObservation::Listed {
            platform_seller,
            sellers,
        }
    }

    async fn collect_seller_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for locator in selectors::sellers::NAMES.iter() {
            let handles = match self.surface.find(locator).await {
                Ok(handles) => handles,
                Err(e) => {
                    debug!("Seller query {} failed: {}", locator, e);
                    continue;
                }
            };
            for handle in handles {
                if let Ok(text) = self.surface.text(handle).await {
                    let text = text.trim().to_string();
                    if !text.is_empty() && !names.contains(&text) {
                        names.push(text);
                    }
                }
            }
        }
        names
    }

    /// Best-effort: the first close control found is clicked.
    async fn close_comparison(&self) {
        match probe::first_present(self.surface, &selectors::sellers::CLOSE).await {
            ProbeOutcome::Found(close) => match self.surface.script_click(close).await {
                Ok(()) => settle::pause_ms(self.config.popup_settle_ms).await,
                Err(e) => debug!("Close control rejected the click: {}", e),
            },
            ProbeOutcome::NotFound => debug!("No close control for seller comparison"),
            ProbeOutcome::Failed(e) => debug!("Close control lookup failed: {}", e),
        }
    }

    async fn open_reviews(&self) -> ReviewsEntry {
        let entry = match probe::first_present(self.surface, &selectors::product::REVIEWS_ENTRY).await {
            ProbeOutcome::Found(entry) => entry,
            ProbeOutcome::NotFound => return ReviewsEntry::Missing,
            ProbeOutcome::Failed(e) => {
                return ReviewsEntry::Unreachable {
                    detail: e.to_string(),
                };
            }
        };

        let scripted = async {
            self.surface.scroll_into_view(entry).await?;
            self.surface.script_click(entry).await
        }
        .await;
        if let Err(e) = scripted {
            debug!("Scripted click on reviews entry failed ({}), clicking directly", e);
            if let Err(e) = self.surface.native_click(entry).await {
                debug!("Direct click on reviews entry failed: {}", e);
            }
        }
        settle::pause_ms(self.config.click_settle_ms).await;
        ReviewsEntry::Opened
    }

    async fn sort_reviews(&self) -> bool {
        let settle_for = Self::ms(self.config.click_settle_ms);
        for strategy in &self.strategies {
            match strategy.attempt(self.surface, settle_for).await {
                SortAttempt::Sorted => {
                    info!("Sorted reviews by most recent via {}", strategy.name());
                    return true;
                }
                SortAttempt::NotApplicable => debug!("Sort via {}: not applicable", strategy.name()),
                SortAttempt::Failed(detail) => debug!("Sort via {} failed: {}", strategy.name(), detail),
            }
        }
        warn!("Could not sort reviews by most recent, counting in page order");
        false
    }

    fn candidate_years(&self, reference: NaiveDateTime) -> Vec<i32> {
        match &self.config.candidate_years {
            Some(years) => years.clone(),
            None => {
                let year = reference.year();
                vec![year - 1, year, year + 1]
            }
        }
    }

    async fn count_reviews(&self, reference: NaiveDateTime) -> ReviewTally {
        let candidates = selectors::reviews::candidates(&self.candidate_years(reference));
        self.wait_for_any(self.config.count_settle_ms, &candidates).await;

        let elements = match probe::union_all(self.surface, &candidates).await {
            ProbeOutcome::Found(elements) => elements,
            ProbeOutcome::NotFound => Vec::new(),
            ProbeOutcome::Failed(e) => {
                debug!("Review candidate queries failed: {}", e);
                Vec::new()
            }
        };

        let mut texts = Vec::new();
        for element in elements.into_iter().take(self.config.max_scan) {
            texts.push(self.review_text(element).await);
        }

        let tally = ReviewTally::from_texts(
            texts.iter().map(String::as_str).filter(|t| !t.trim().is_empty()),
            self.target,
            reference,
        );
        // Blank texts still count as scanned.
        let tally = ReviewTally {
            scanned: texts.len(),
            ..tally
        };

        if tally.months_seen.is_empty() {
            info!("No parseable dates found in {} elements", tally.scanned);
        } else {
            info!(
                "Dates found in reviews: {} (looking for {}), {} in target",
                tally.labels().join(", "),
                self.target,
                tally.in_target
            );
        }
        tally
    }

    /// The element's text, or a nearby date-styled node's text when the
    /// element's own text carries no month.
    async fn review_text(&self, element: ElementHandle) -> String {
        let text = self.surface.text(element).await.unwrap_or_default();
        if has_month_token(&text) {
            return text;
        }

        if let ProbeOutcome::Found(date) =
            probe::first_within(self.surface, element, &selectors::reviews::TILE_DATE).await
        {
            return self.surface.text(date).await.unwrap_or_default();
        }

        if let Ok(Some(parent)) = self.surface.parent(element).await {
            if let ProbeOutcome::Found(date) = probe::first_within(
                self.surface,
                parent,
                std::slice::from_ref(&*selectors::reviews::DATE_STYLED),
            )
            .await
            {
                return self.surface.text(date).await.unwrap_or_default();
            }
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MonthYear, Outcome};
    use crate::surface::StaticSurface;
    use chrono::NaiveDate;

    const URL: &str = "https://www.walmart.com/ip/Acme-Kettle/1";

    fn identifier() -> ProductIdentifier {
        ProductIdentifier::new(URL.to_string())
    }

    fn config() -> QualifyConfig {
        QualifyConfig {
            candidate_years: Some(vec![2024, 2025, 2026]),
            ..QualifyConfig::default()
        }
    }

    fn target() -> TargetPeriod {
        TargetPeriod::new(MonthYear::new(8, 2025).unwrap())
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn product_page(body: &str) -> StaticSurface {
        StaticSurface::new().with_page(URL, format!("<html><body>{}</body></html>", body))
    }

    #[tokio::test(start_paused = true)]
    async fn test_brand_from_visit_store_phrase() {
        let surface = product_page(r#"<a href="/brand">Visit the store Acme & Co.!</a>"#);
        surface.load(URL).await.unwrap();
        let config = config();
        let target = target();
        let qualifier = Qualifier::new(&surface, &config, &target);
        assert_eq!(qualifier.extract_brand().await, "Acme & Co");
    }

    #[tokio::test(start_paused = true)]
    async fn test_structured_brand_wins() {
        let surface = product_page(
            r#"<a data-dca-name="ItemBrandLink">Acme</a><a class="brand-link">Other</a>"#,
        );
        surface.load(URL).await.unwrap();
        let config = config();
        let target = target();
        let qualifier = Qualifier::new(&surface, &config, &target);
        assert_eq!(qualifier.extract_brand().await, "Acme");
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_seller_verdict() {
        let surface = product_page(
            r##"<a data-dca-name="ItemBrandLink">Acme</a>
               <a data-testid="item-review-section-link" href="#customer-reviews">Reviews</a>"##,
        );
        let config = config();
        let target = target();
        let verdict = Qualifier::new(&surface, &config, &target)
            .with_clock(noon)
            .qualify(&identifier())
            .await;
        assert_eq!(verdict.outcome, Outcome::Fail);
        assert_eq!(verdict.reason, Reason::SingleSeller);
    }

    #[tokio::test(start_paused = true)]
    async fn test_review_text_falls_back_to_date_descendant() {
        let surface = product_page(
            r#"<div class="review-card" id="card"><p>Works great</p><span class="review-date">Aug 9, 2025</span></div>"#,
        );
        surface.load(URL).await.unwrap();
        let config = config();
        let target = target();
        let qualifier = Qualifier::new(&surface, &config, &target);
        let card = surface.find(&crate::surface::Locator::css("#card")).await.unwrap()[0];
        // The card text has the month token, so it is used as is.
        assert!(qualifier.review_text(card).await.contains("Aug 9, 2025"));

        let surface = product_page(
            r#"<div class="review-card" id="card"><p>5 stars</p><span class="date">2 days ago</span></div>"#,
        );
        surface.load(URL).await.unwrap();
        let qualifier = Qualifier::new(&surface, &config, &target);
        let card = surface.find(&crate::surface::Locator::css("#card")).await.unwrap()[0];
        assert_eq!(qualifier.review_text(card).await, "2 days ago");
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failure_is_an_error_verdict() {
        let surface = StaticSurface::new();
        let config = config();
        let target = target();
        let verdict = Qualifier::new(&surface, &config, &target)
            .qualify(&identifier())
            .await;
        assert_eq!(verdict.outcome, Outcome::Error);
        assert!(verdict.reason.to_string().starts_with("Error during check:"));
    }

    #[test]
    fn test_candidate_years_default_to_adjacent_years() {
        let surface = StaticSurface::new();
        let config = QualifyConfig::default();
        let target = target();
        let qualifier = Qualifier::new(&surface, &config, &target);
        assert_eq!(qualifier.candidate_years(noon()), vec![2024, 2025, 2026]);
    }
}
