//! The render/automation surface the crawler and pipeline drive.
//!
//! Everything the core learns about a page goes through [`RenderSurface`];
//! there is no structured API behind it. Element handles are only valid
//! until the next navigation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::session::StoredCookie;

pub mod chrome;
pub mod static_page;

pub use chrome::ChromeSurface;
pub use static_page::StaticSurface;

/// Opaque reference to one DOM element on the current page. Two queries that
/// reach the same node produce equal handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementHandle(pub(crate) usize);

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An element query shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Locator {
    Css(String),
    /// Elements named `tag` (`*` for any) whose own text contains any needle.
    Text { tag: String, needles: Vec<String> },
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn text(tag: impl Into<String>, needles: &[&str]) -> Self {
        Locator::Text {
            tag: tag.into(),
            needles: needles.iter().map(|n| n.to_string()).collect(),
        }
    }

    /// XPath equivalent of a text query, relative to a context node when
    /// `relative` is set.
    pub fn to_xpath(&self, relative: bool) -> Option<String> {
        match self {
            Locator::Css(_) => None,
            Locator::Text { tag, needles } => {
                let conditions = needles
                    .iter()
                    .map(|needle| format!("contains(text(), {})", xpath_literal(needle)))
                    .collect::<Vec<_>>()
                    .join(" or ");
                let prefix = if relative { ".//" } else { "//" };
                Some(format!("{}{}[{}]", prefix, tag, conditions))
            }
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(selector) => write!(f, "css({})", selector),
            Locator::Text { tag, needles } => write!(f, "text({}: {})", tag, needles.join(" | ")),
        }
    }
}

fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{}'", value)
    } else if !value.contains('"') {
        format!("\"{}\"", value)
    } else {
        let parts = value
            .split('\'')
            .map(|part| format!("'{}'", part))
            .collect::<Vec<_>>()
            .join(", \"'\", ");
        format!("concat({})", parts)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("element {0} is no longer attached to the page")]
    StaleElement(ElementHandle),

    #[error("invalid locator {locator}: {message}")]
    InvalidLocator { locator: String, message: String },

    #[error("script failed: {0}")]
    Script(String),

    #[error("browser protocol error: {0}")]
    Protocol(String),
}

pub type SurfaceResult<T> = std::result::Result<T, SurfaceError>;

/// One stateful page session. Implementations are driven strictly
/// sequentially; no two calls are ever in flight at once.
#[async_trait]
pub trait RenderSurface: Send + Sync {
    async fn load(&self, url: &str) -> SurfaceResult<()>;
    async fn reload(&self) -> SurfaceResult<()>;

    async fn find(&self, locator: &Locator) -> SurfaceResult<Vec<ElementHandle>>;
    async fn find_within(
        &self,
        scope: ElementHandle,
        locator: &Locator,
    ) -> SurfaceResult<Vec<ElementHandle>>;
    async fn parent(&self, element: ElementHandle) -> SurfaceResult<Option<ElementHandle>>;

    /// Rendered text of the element, whitespace collapsed.
    async fn text(&self, element: ElementHandle) -> SurfaceResult<String>;
    async fn attribute(&self, element: ElementHandle, name: &str) -> SurfaceResult<Option<String>>;
    async fn is_displayed(&self, element: ElementHandle) -> SurfaceResult<bool>;

    async fn scroll_into_view(&self, element: ElementHandle) -> SurfaceResult<()>;
    /// Click dispatched from page script, bypassing overlays.
    async fn script_click(&self, element: ElementHandle) -> SurfaceResult<()>;
    /// Click through the input pipeline at the element's position.
    async fn native_click(&self, element: ElementHandle) -> SurfaceResult<()>;
    /// Select an `<option>` and fire the owning control's change event.
    async fn choose_option(&self, option: ElementHandle) -> SurfaceResult<()>;

    async fn page_text(&self) -> SurfaceResult<String>;
    async fn title(&self) -> SurfaceResult<String>;

    async fn cookies(&self) -> SurfaceResult<Vec<StoredCookie>>;
    async fn set_cookies(&self, cookies: &[StoredCookie]) -> SurfaceResult<()>;
}

/// Collapses runs of whitespace the way rendered text reads.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
