//! Sequences a whole run: landing page, verification gate, session restore,
//! crawl, qualification, reports, session save.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::crawler::{CrawlReport, ListingCrawler, page_url};
use crate::models::{PageSelection, ProductIdentifier, TargetPeriod, Verdict};
use crate::normalizer::LinkNormalizer;
use crate::pipeline::Qualifier;
use crate::report::{self, ReportPaths, RunSummary};
use crate::session::{SessionStore, VerificationGate, assess_challenge};
use crate::settle;
use crate::surface::RenderSurface;
use crate::utils::error::Result;

/// Set once an interrupt has been requested. Checked at each listing page
/// boundary and before each product.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raises the flag on Ctrl-C instead of terminating the process.
    pub fn watch_ctrl_c(&self) -> JoinHandle<()> {
        let flag = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted! Finishing the current page or product, then saving partial results...");
                flag.raise();
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunPlan {
    pub listing_url: String,
    pub selection: PageSelection,
    pub target: TargetPeriod,
    pub reports: ReportPaths,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub crawl: CrawlReport,
    pub verdicts: Vec<Verdict>,
    pub summary: RunSummary,
}

pub struct RunCoordinator<'a> {
    surface: &'a dyn RenderSurface,
    config: &'a AppConfig,
    store: &'a dyn SessionStore,
    gate: &'a dyn VerificationGate,
    interrupt: InterruptFlag,
}

impl<'a> RunCoordinator<'a> {
    pub fn new(
        surface: &'a dyn RenderSurface,
        config: &'a AppConfig,
        store: &'a dyn SessionStore,
        gate: &'a dyn VerificationGate,
        interrupt: InterruptFlag,
    ) -> Self {
        Self {
            surface,
            config,
            store,
            gate,
            interrupt,
        }
    }

    /// The session is saved on every path out of here, errors included.
    pub async fn run(&self, plan: &RunPlan) -> Result<RunOutcome> {
        let result = self.drive(plan).await;
        self.save_session().await;

        let outcome = result?;
        report::write_reports(&plan.reports, &outcome.verdicts)?;
        outcome.summary.log();
        Ok(outcome)
    }

    async fn drive(&self, plan: &RunPlan) -> Result<RunOutcome> {
        let landing = page_url(&plan.listing_url, 1)?;
        info!("Navigating to: {}", landing);
        self.surface.load(&landing).await?;

        self.verify().await?;
        self.restore_session().await?;

        let normalizer = LinkNormalizer::from_config(&self.config.site);
        let crawl = ListingCrawler::new(self.surface, &normalizer, &self.config.crawl)
            .landed_on(1)
            .with_interrupt(self.interrupt.clone())
            .crawl(&plan.listing_url, plan.selection)
            .await?;

        info!(
            "Collected {} unique products. Starting filtering...",
            crawl.identifiers.len()
        );
        let total = crawl.identifiers.len();
        let verdicts = self
            .qualify_all(&crawl.identifiers, &plan.target, |index, verdict| {
                if verdict.passed() {
                    info!("[{}/{}] PASSED: {}", index, total, verdict.reason);
                } else {
                    info!("[{}/{}] {}: {}", index, total, verdict.outcome, verdict.reason);
                }
            })
            .await;

        let summary = RunSummary::new(total, &verdicts, self.interrupt.is_raised());
        Ok(RunOutcome {
            crawl,
            verdicts,
            summary,
        })
    }

    async fn verify(&self) -> Result<()> {
        settle::pause_ms(self.config.crawl.load_settle_ms).await;
        let text = self.surface.page_text().await.unwrap_or_default();
        let title = self.surface.title().await.unwrap_or_default();
        let assessment = assess_challenge(&text, &title);
        if assessment.detected() {
            info!("Challenge indicators on landing page: {:?}", assessment.indicators);
        }
        self.gate.acknowledge(&assessment).await
    }

    async fn restore_session(&self) -> Result<()> {
        match self.store.load().await {
            Ok(Some(cookies)) => match self.surface.set_cookies(&cookies).await {
                Ok(()) => info!("Restored {} cookies", cookies.len()),
                Err(e) => warn!("Could not restore cookies: {}", e),
            },
            Ok(None) => info!("No stored session, starting fresh"),
            Err(e) => warn!("Could not load cookies: {}", e),
        }

        self.surface.reload().await?;
        settle::pause_ms(self.config.crawl.landing_settle_ms).await;
        Ok(())
    }

    /// Qualifies identifiers strictly in order, one at a time. Stops before
    /// the next product once the interrupt flag is raised; everything
    /// collected so far is returned.
    pub async fn qualify_all<F>(
        &self,
        identifiers: &[ProductIdentifier],
        target: &TargetPeriod,
        mut on_verdict: F,
    ) -> Vec<Verdict>
    where
        F: FnMut(usize, &Verdict),
    {
        let qualifier = Qualifier::new(self.surface, &self.config.qualify, target);
        let mut verdicts = Vec::with_capacity(identifiers.len());

        for (index, identifier) in identifiers.iter().enumerate() {
            if self.interrupt.is_raised() {
                warn!(
                    "Stopping after {} of {} products",
                    verdicts.len(),
                    identifiers.len()
                );
                break;
            }
            info!("[{}/{}] Checking: {}", index + 1, identifiers.len(), identifier);
            let verdict = qualifier.qualify(identifier).await;
            on_verdict(index + 1, &verdict);
            verdicts.push(verdict);
        }
        verdicts
    }

    /// Best-effort; failures are logged, never returned.
    async fn save_session(&self) {
        let cookies = match self.surface.cookies().await {
            Ok(cookies) => cookies,
            Err(e) => {
                error!("Could not read cookies for saving: {}", e);
                return;
            }
        };
        match self.store.save(&cookies).await {
            Ok(()) => info!("Saved {} cookies", cookies.len()),
            Err(e) => error!("Could not save cookies: {}", e),
        }
    }
}
