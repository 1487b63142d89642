use super::*;
use listing_sieve::crawler::StopReason;
use listing_sieve::models::{Outcome, PageSelection};
use listing_sieve::report::ReportPaths;
use listing_sieve::session::{JsonFileStore, NoopGate, SessionStore, StoredCookie};
use listing_sieve::surface::RenderSurface;
use listing_sieve::{InterruptFlag, RunCoordinator, RunPlan};
use tempfile::TempDir;

fn plan(dir: &TempDir, selection: PageSelection) -> RunPlan {
    RunPlan {
        listing_url: LISTING_URL.to_string(),
        selection,
        target: august_2025(),
        reports: ReportPaths {
            accepted: dir.path().join("accepted.csv"),
            status: dir.path().join("status.csv"),
        },
    }
}

fn stored_cookie() -> StoredCookie {
    StoredCookie {
        name: "session-id".into(),
        value: "abc123".into(),
        domain: ".walmart.com".into(),
        path: "/".into(),
        expires: None,
        http_only: true,
        secure: true,
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_run_writes_reports_and_keeps_session() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = JsonFileStore::new(dir.path().join("cookies.json"));
    store.save(&[stored_cookie()]).await?;

    let surface = storefront();
    let config = get_test_config();
    let coordinator = RunCoordinator::new(&surface, &config, &store, &NoopGate, InterruptFlag::new());
    let plan = plan(&dir, PageSelection::Exhaustive);
    let outcome = coordinator.run(&plan).await?;

    assert_eq!(outcome.crawl.stop, StopReason::NoNextControl);
    let checked: Vec<&str> = outcome.verdicts.iter().map(|v| v.identifier.as_str()).collect();
    assert_eq!(checked, PRODUCTS.to_vec());
    assert_eq!(outcome.summary.total, 7);
    assert_eq!(outcome.summary.passed, 2);
    assert_eq!(outcome.summary.failed, 5);
    assert!(!outcome.summary.interrupted);

    let accepted = std::fs::read_to_string(&plan.reports.accepted)?;
    assert_eq!(
        accepted,
        format!("product_link\n{}\n{}\n", PRODUCTS[0], PRODUCTS[6])
    );

    let status = std::fs::read_to_string(&plan.reports.status)?;
    let rows: Vec<&str> = status.lines().collect();
    assert_eq!(rows.len(), 8);
    assert_eq!(rows[0], "product_link,status,reason");
    assert_eq!(
        rows[2],
        format!(
            "{},FAIL,Discarded: insufficient reviews in target period Aug 2025 (only 4)",
            PRODUCTS[1]
        )
    );

    // Restored before crawling and written back afterwards.
    assert_eq!(surface.cookies().await?, vec![stored_cookie()]);
    assert_eq!(store.load().await?, Some(vec![stored_cookie()]));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_missing_cookie_file_starts_fresh() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = JsonFileStore::new(dir.path().join("nested/cookies.json"));

    let surface = storefront();
    let config = get_test_config();
    let coordinator = RunCoordinator::new(&surface, &config, &store, &NoopGate, InterruptFlag::new());
    let outcome = coordinator.run(&plan(&dir, PageSelection::Single(3))).await?;

    assert_eq!(outcome.verdicts.len(), 2);
    // Saved even though nothing was restored.
    assert_eq!(store.load().await?, Some(Vec::new()));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_keeps_finished_verdicts_in_order() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = JsonFileStore::new(dir.path().join("cookies.json"));
    let surface = storefront();
    let config = get_test_config();
    let interrupt = InterruptFlag::new();
    let coordinator = RunCoordinator::new(&surface, &config, &store, &NoopGate, interrupt.clone());

    let identifiers = identifiers();
    let mut seen = Vec::new();
    let verdicts = coordinator
        .qualify_all(&identifiers, &august_2025(), |index, verdict| {
            seen.push(verdict.identifier.clone());
            if index == 3 {
                interrupt.raise();
            }
        })
        .await;

    // The product in flight when the flag went up finished; nothing after it ran.
    assert_eq!(verdicts.len(), 3);
    assert_eq!(seen, identifiers[..3].to_vec());
    let checked: Vec<_> = verdicts.iter().map(|v| v.identifier.clone()).collect();
    assert_eq!(checked, identifiers[..3].to_vec());
    assert_eq!(verdicts[0].outcome, Outcome::Pass);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_run_still_reports_partial_results() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = JsonFileStore::new(dir.path().join("cookies.json"));
    let surface = storefront();
    let config = get_test_config();
    let interrupt = InterruptFlag::new();
    interrupt.raise();

    let coordinator = RunCoordinator::new(&surface, &config, &store, &NoopGate, interrupt);
    let plan = plan(&dir, PageSelection::Exhaustive);
    let outcome = coordinator.run(&plan).await?;

    // Paging stopped after the landing page; nothing was qualified.
    assert_eq!(outcome.crawl.stop, StopReason::Interrupted);
    assert_eq!(outcome.crawl.pages.len(), 1);
    assert_eq!(outcome.summary.total, 2);
    assert_eq!(outcome.summary.processed, 0);
    assert!(outcome.summary.interrupted);
    assert!(!plan.reports.accepted.exists());
    assert!(!plan.reports.status.exists());
    assert!(store.path().exists());
    Ok(())
}
