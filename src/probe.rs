//! Ordered fallback probes over a [`RenderSurface`].
//!
//! Each locator in a list is an independent strategy. Lists are tried in
//! order and the first strategy that finds something wins; a strategy that
//! errors is skipped, and the error is only reported when nothing else
//! matched.

use crate::surface::{ElementHandle, Locator, RenderSurface, SurfaceError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome<T> {
    Found(T),
    NotFound,
    Failed(SurfaceError),
}

impl<T> ProbeOutcome<T> {
    pub fn found(self) -> Option<T> {
        match self {
            ProbeOutcome::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, ProbeOutcome::Found(_))
    }

    fn from_miss(error: Option<SurfaceError>) -> Self {
        error.map_or(ProbeOutcome::NotFound, ProbeOutcome::Failed)
    }
}

/// First element matched by the first locator that matches anything.
pub async fn first_present(
    surface: &dyn RenderSurface,
    locators: &[Locator],
) -> ProbeOutcome<ElementHandle> {
    let mut last_error = None;
    for locator in locators {
        match surface.find(locator).await {
            Ok(handles) => {
                if let Some(handle) = handles.first() {
                    tracing::debug!("{} matched {} element(s)", locator, handles.len());
                    return ProbeOutcome::Found(*handle);
                }
            }
            Err(e) => {
                tracing::debug!("Probe {} failed: {}", locator, e);
                last_error = Some(e);
            }
        }
    }
    ProbeOutcome::from_miss(last_error)
}

/// First displayed element, scanning locators in order and each locator's
/// matches in document order.
pub async fn first_displayed(
    surface: &dyn RenderSurface,
    locators: &[Locator],
) -> ProbeOutcome<ElementHandle> {
    let mut last_error = None;
    for locator in locators {
        let handles = match surface.find(locator).await {
            Ok(handles) => handles,
            Err(e) => {
                tracing::debug!("Probe {} failed: {}", locator, e);
                last_error = Some(e);
                continue;
            }
        };
        for handle in handles {
            match surface.is_displayed(handle).await {
                Ok(true) => return ProbeOutcome::Found(handle),
                Ok(false) => {}
                Err(e) => last_error = Some(e),
            }
        }
    }
    ProbeOutcome::from_miss(last_error)
}

/// Union of every locator's matches, first-seen order, no duplicates.
pub async fn union_all(
    surface: &dyn RenderSurface,
    locators: &[Locator],
) -> ProbeOutcome<Vec<ElementHandle>> {
    let mut seen = Vec::new();
    let mut last_error = None;
    for locator in locators {
        match surface.find(locator).await {
            Ok(handles) => merge(&mut seen, handles),
            Err(e) => {
                tracing::debug!("Probe {} failed: {}", locator, e);
                last_error = Some(e);
            }
        }
    }
    if seen.is_empty() {
        ProbeOutcome::from_miss(last_error)
    } else {
        ProbeOutcome::Found(seen)
    }
}

/// First match of any locator inside `scope`.
pub async fn first_within(
    surface: &dyn RenderSurface,
    scope: ElementHandle,
    locators: &[Locator],
) -> ProbeOutcome<ElementHandle> {
    let mut last_error = None;
    for locator in locators {
        match surface.find_within(scope, locator).await {
            Ok(handles) => {
                if let Some(handle) = handles.first() {
                    return ProbeOutcome::Found(*handle);
                }
            }
            Err(e) => last_error = Some(e),
        }
    }
    ProbeOutcome::from_miss(last_error)
}

fn merge(seen: &mut Vec<ElementHandle>, handles: Vec<ElementHandle>) {
    for handle in handles {
        if !seen.contains(&handle) {
            seen.push(handle);
        }
    }
}
