//! Best-effort reordering of the review list to most-recent-first.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::selectors::reviews;
use crate::settle;
use crate::surface::{ElementHandle, Locator, RenderSurface, SurfaceResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortAttempt {
    Sorted,
    /// The control this strategy relies on is not on the page.
    NotApplicable,
    Failed(String),
}

#[async_trait]
pub trait SortStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn attempt(&self, surface: &dyn RenderSurface, settle_for: Duration) -> SortAttempt;
}

/// Strategies in the order they are tried.
pub fn default_strategies() -> Vec<Box<dyn SortStrategy>> {
    vec![
        Box::new(SortMenuButton),
        Box::new(SortHintedControl),
        Box::new(RecentText),
        Box::new(NativeSelect),
    ]
}

async fn scroll_and_click(surface: &dyn RenderSurface, element: ElementHandle) -> SurfaceResult<()> {
    surface.scroll_into_view(element).await?;
    surface.script_click(element).await
}

async fn displayed(surface: &dyn RenderSurface, locators: &[Locator]) -> SurfaceResult<Vec<ElementHandle>> {
    let mut shown = Vec::new();
    for locator in locators {
        for handle in surface.find(locator).await? {
            if surface.is_displayed(handle).await.unwrap_or(false) {
                shown.push(handle);
            }
        }
    }
    Ok(shown)
}

/// Clicks the first displayed most-recent entry that accepts a click.
async fn pick_recent(surface: &dyn RenderSurface, entries: &[Locator], settle_for: Duration) -> SortAttempt {
    let options = match displayed(surface, entries).await {
        Ok(options) => options,
        Err(e) => return SortAttempt::Failed(e.to_string()),
    };
    if options.is_empty() {
        return SortAttempt::Failed("no most-recent entry after opening the sort control".into());
    }
    for option in options {
        match surface.script_click(option).await {
            Ok(()) => {
                settle::pause(settle_for).await;
                return SortAttempt::Sorted;
            }
            Err(e) => debug!("Most-recent entry {} rejected the click: {}", option, e),
        }
    }
    SortAttempt::Failed("every most-recent entry rejected the click".into())
}

/// The labelled "Sort by" dropdown button.
pub struct SortMenuButton;

#[async_trait]
impl SortStrategy for SortMenuButton {
    fn name(&self) -> &'static str {
        "sort-by button"
    }

    async fn attempt(&self, surface: &dyn RenderSurface, settle_for: Duration) -> SortAttempt {
        let button = match displayed(surface, &reviews::SORT_BUTTON).await {
            Ok(shown) => match shown.first() {
                Some(button) => *button,
                None => return SortAttempt::NotApplicable,
            },
            Err(e) => return SortAttempt::Failed(e.to_string()),
        };

        if let Err(e) = scroll_and_click(surface, button).await {
            return SortAttempt::Failed(e.to_string());
        }
        settle::pause(settle_for).await;
        pick_recent(surface, &reviews::RECENT_ENTRY, settle_for).await
    }
}

/// Any control whose class or label mentions sorting.
pub struct SortHintedControl;

impl SortHintedControl {
    async fn hints_sorting(surface: &dyn RenderSurface, element: ElementHandle) -> bool {
        for attribute in ["class", "aria-label"] {
            if let Ok(Some(value)) = surface.attribute(element, attribute).await {
                if value.to_lowercase().contains("sort") {
                    return true;
                }
            }
        }
        false
    }
}

#[async_trait]
impl SortStrategy for SortHintedControl {
    fn name(&self) -> &'static str {
        "sort-hinted control"
    }

    async fn attempt(&self, surface: &dyn RenderSurface, settle_for: Duration) -> SortAttempt {
        let candidates = match displayed(surface, &reviews::SORT_HINTED).await {
            Ok(candidates) => candidates,
            Err(e) => return SortAttempt::Failed(e.to_string()),
        };

        let mut last = SortAttempt::NotApplicable;
        for candidate in candidates {
            if !Self::hints_sorting(surface, candidate).await {
                continue;
            }
            if let Err(e) = surface.script_click(candidate).await {
                last = SortAttempt::Failed(e.to_string());
                continue;
            }
            settle::pause(settle_for).await;
            match pick_recent(surface, &reviews::RECENT_ENTRY_LOOSE, settle_for).await {
                SortAttempt::Sorted => return SortAttempt::Sorted,
                other => last = other,
            }
        }
        last
    }
}

/// A free-standing "Most recent" / "Newest" node.
pub struct RecentText;

#[async_trait]
impl SortStrategy for RecentText {
    fn name(&self) -> &'static str {
        "most-recent text"
    }

    async fn attempt(&self, surface: &dyn RenderSurface, settle_for: Duration) -> SortAttempt {
        let candidates = match displayed(surface, &reviews::RECENT_ENTRY).await {
            Ok(candidates) if candidates.is_empty() => return SortAttempt::NotApplicable,
            Ok(candidates) => candidates,
            Err(e) => return SortAttempt::Failed(e.to_string()),
        };

        let mut last_error = String::new();
        for candidate in candidates {
            match scroll_and_click(surface, candidate).await {
                Ok(()) => {
                    settle::pause(settle_for).await;
                    return SortAttempt::Sorted;
                }
                Err(e) => last_error = e.to_string(),
            }
        }
        SortAttempt::Failed(last_error)
    }
}

/// A native `<select>` with a most-recent option.
pub struct NativeSelect;

impl NativeSelect {
    fn is_recent(label: &str) -> bool {
        let label = label.to_lowercase();
        label.contains("most recent") || label.contains("newest") || label.contains("recent")
    }
}

#[async_trait]
impl SortStrategy for NativeSelect {
    fn name(&self) -> &'static str {
        "native select"
    }

    async fn attempt(&self, surface: &dyn RenderSurface, settle_for: Duration) -> SortAttempt {
        let mut selects = Vec::new();
        for locator in reviews::SELECT.iter() {
            match surface.find(locator).await {
                Ok(found) => selects.extend(found),
                Err(e) => return SortAttempt::Failed(e.to_string()),
            }
        }

        let mut last = SortAttempt::NotApplicable;
        for select in selects {
            let options = match surface.find_within(select, &reviews::OPTION).await {
                Ok(options) => options,
                Err(e) => {
                    last = SortAttempt::Failed(e.to_string());
                    continue;
                }
            };
            for option in options {
                let label = surface.text(option).await.unwrap_or_default();
                if !Self::is_recent(&label) {
                    continue;
                }
                match surface.choose_option(option).await {
                    Ok(()) => {
                        settle::pause(settle_for).await;
                        return SortAttempt::Sorted;
                    }
                    Err(e) => last = SortAttempt::Failed(e.to_string()),
                }
            }
        }
        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::StaticSurface;
    use crate::surface::static_page::ClickKind;

    async fn surface(body: &str) -> StaticSurface {
        let html = format!("<html><body>{}</body></html>", body);
        let surface = StaticSurface::new().with_page("https://shop.test/reviews", html);
        surface.load("https://shop.test/reviews").await.unwrap();
        surface
    }

    fn targets(surface: &StaticSurface) -> Vec<String> {
        surface.clicks().into_iter().map(|click| click.target).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_sort_menu_button_then_menu_entry() {
        let surface = surface(
            r#"<button id="sort" aria-label="Sort by">Most relevant</button>
               <ul role="menu"><li id="recent">Most recent</li></ul>"#,
        )
        .await;
        let attempt = SortMenuButton.attempt(&surface, Duration::from_millis(10)).await;
        assert_eq!(attempt, SortAttempt::Sorted);
        assert_eq!(targets(&surface), vec!["sort", "recent"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sort_menu_button_absent_is_not_applicable() {
        let surface = surface("<p>No controls</p>").await;
        let attempt = SortMenuButton.attempt(&surface, Duration::ZERO).await;
        assert_eq!(attempt, SortAttempt::NotApplicable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sort_hinted_control_uses_loose_entries() {
        let surface = surface(
            r#"<div class="review-sort" id="hinted">Sort</div>
               <span id="recent">Recent</span>"#,
        )
        .await;
        let attempt = SortHintedControl.attempt(&surface, Duration::ZERO).await;
        assert_eq!(attempt, SortAttempt::Sorted);
        assert_eq!(targets(&surface), vec!["hinted", "recent"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_text_failure_is_reported() {
        let surface = surface(r#"<a id="newest" data-click-fails>Newest</a>"#).await;
        let attempt = RecentText.attempt(&surface, Duration::ZERO).await;
        assert!(matches!(attempt, SortAttempt::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_native_select_chooses_recent_option() {
        let surface = surface(
            r#"<select id="order"><option>Most relevant</option><option id="opt-new">Newest first</option></select>"#,
        )
        .await;
        let attempt = NativeSelect.attempt(&surface, Duration::ZERO).await;
        assert_eq!(attempt, SortAttempt::Sorted);
        let clicks = surface.clicks();
        assert_eq!(clicks.len(), 1);
        assert_eq!(clicks[0].kind, ClickKind::Option);
        assert_eq!(clicks[0].target, "opt-new");
    }

    #[test]
    fn test_default_strategy_order() {
        let names: Vec<&str> = default_strategies().iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec!["sort-by button", "sort-hinted control", "most-recent text", "native select"]
        );
    }
}
