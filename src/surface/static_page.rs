use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{LazyLock, Mutex, MutexGuard};

use super::{
    ElementHandle, Locator, RenderSurface, SurfaceError, SurfaceResult, collapse_whitespace,
};
use crate::session::StoredCookie;
use crate::utils::error::{AppError, Result};

static ALL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("*").expect("hardcoded selector is valid"));
static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("hardcoded selector is valid"));
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("hardcoded selector is valid"));

/// Marks an element whose scripted click throws.
pub const CLICK_FAILS_ATTR: &str = "data-click-fails";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    Script,
    Native,
    Option,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickRecord {
    pub kind: ClickKind,
    pub url: String,
    /// `id`, else `data-testid`, else the tag name and collapsed text.
    pub target: String,
}

#[derive(Debug, Default)]
struct SessionLog {
    current: Option<String>,
    loads: Vec<String>,
    clicks: Vec<ClickRecord>,
    cookies: Vec<StoredCookie>,
}

/// Replays captured HTML pages in memory.
///
/// Every page's markup is fully present; clicks never reveal anything new,
/// except that clicking an element (or a descendant of an anchor) whose
/// `href` names a registered page navigates to it. `hidden` and
/// `display:none` hide an element and its subtree.
#[derive(Debug, Default)]
pub struct StaticSurface {
    pages: HashMap<String, String>,
    log: Mutex<SessionLog>,
}

struct Page<'a> {
    document: &'a Html,
    elements: Vec<ElementRef<'a>>,
}

impl<'a> Page<'a> {
    fn element(&self, handle: ElementHandle) -> SurfaceResult<ElementRef<'a>> {
        self.elements
            .get(handle.0)
            .copied()
            .ok_or(SurfaceError::StaleElement(handle))
    }

    fn handle_of(&self, element: &ElementRef<'a>) -> Option<ElementHandle> {
        self.elements
            .iter()
            .position(|candidate| candidate.id() == element.id())
            .map(ElementHandle)
    }

    fn handles<I: Iterator<Item = ElementRef<'a>>>(&self, elements: I) -> Vec<ElementHandle> {
        elements.filter_map(|el| self.handle_of(&el)).collect()
    }
}

impl StaticSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }

    /// Loads a replay manifest: a JSON object mapping URLs to HTML files
    /// relative to the manifest's directory.
    pub fn from_manifest(path: &Path) -> Result<Self> {
        let manifest: HashMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(path)?)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let mut surface = Self::new();
        for (url, file) in manifest {
            let html = std::fs::read_to_string(base.join(&file)).map_err(|e| {
                AppError::Validation(format!("Replay page {} for {}: {}", file, url, e))
            })?;
            surface.pages.insert(url, html);
        }
        tracing::info!("Loaded {} replay pages from {}", surface.pages.len(), path.display());
        Ok(surface)
    }

    pub fn current_url(&self) -> Option<String> {
        self.lock().current.clone()
    }

    pub fn loads(&self) -> Vec<String> {
        self.lock().loads.clone()
    }

    pub fn clicks(&self) -> Vec<ClickRecord> {
        self.lock().clicks.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SessionLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current_html(&self) -> SurfaceResult<(String, String)> {
        let log = self.lock();
        let url = log
            .current
            .clone()
            .ok_or_else(|| SurfaceError::Script("no page loaded".into()))?;
        let html = self.pages.get(&url).cloned().ok_or_else(|| SurfaceError::Navigation {
            url: url.clone(),
            message: "page not registered".into(),
        })?;
        Ok((url, html))
    }

    fn inspect<T>(
        &self,
        f: impl for<'a> FnOnce(&Page<'a>) -> SurfaceResult<T>,
    ) -> SurfaceResult<T> {
        let (_, html) = self.current_html()?;
        let document = Html::parse_document(&html);
        let page = Page {
            document: &document,
            elements: document.select(&ALL).collect(),
        };
        f(&page)
    }

    fn navigate(&self, url: &str) -> SurfaceResult<()> {
        if !self.pages.contains_key(url) {
            return Err(SurfaceError::Navigation {
                url: url.to_string(),
                message: "page not registered".into(),
            });
        }
        let mut log = self.lock();
        log.current = Some(url.to_string());
        log.loads.push(url.to_string());
        Ok(())
    }

    fn click(&self, element: ElementHandle, kind: ClickKind) -> SurfaceResult<()> {
        let (url, _) = self.current_html()?;
        let (target, fails, href) = self.inspect(|page| {
            let el = page.element(element)?;
            let fails = el.value().attr(CLICK_FAILS_ATTR).is_some();
            let href = std::iter::once(el)
                .chain(el.ancestors().filter_map(ElementRef::wrap))
                .find_map(|candidate| candidate.value().attr("href"))
                .map(str::to_string);
            Ok((describe(&el), fails, href))
        })?;

        if fails && kind == ClickKind::Script {
            return Err(SurfaceError::Script(format!("click on {} was intercepted", target)));
        }

        self.lock().clicks.push(ClickRecord {
            kind,
            url,
            target,
        });

        match href {
            Some(href) if self.pages.contains_key(&href) => self.navigate(&href),
            _ => Ok(()),
        }
    }
}

fn describe(el: &ElementRef<'_>) -> String {
    let value = el.value();
    if let Some(id) = value.attr("id") {
        return id.to_string();
    }
    if let Some(test_id) = value.attr("data-testid") {
        return test_id.to_string();
    }
    format!("{}:{}", value.name(), element_text(el))
}

fn element_text(el: &ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn is_hidden(el: &ElementRef<'_>) -> bool {
    let value = el.value();
    if value.attr("hidden").is_some() {
        return true;
    }
    value
        .attr("style")
        .map(|style| style.replace(' ', "").contains("display:none"))
        .unwrap_or(false)
}

fn own_text_contains(el: &ElementRef<'_>, needles: &[String]) -> bool {
    el.children()
        .filter_map(|child| child.value().as_text())
        .any(|text| needles.iter().any(|needle| text.contains(needle.as_str())))
}

fn tag_matches(el: &ElementRef<'_>, tag: &str) -> bool {
    tag == "*" || el.value().name().eq_ignore_ascii_case(tag)
}

fn parse_css(selector: &str) -> SurfaceResult<Selector> {
    Selector::parse(selector).map_err(|e| SurfaceError::InvalidLocator {
        locator: selector.to_string(),
        message: format!("{:?}", e),
    })
}

#[async_trait]
impl RenderSurface for StaticSurface {
    async fn load(&self, url: &str) -> SurfaceResult<()> {
        self.navigate(url)
    }

    async fn reload(&self) -> SurfaceResult<()> {
        let (url, _) = self.current_html()?;
        self.navigate(&url)
    }

    async fn find(&self, locator: &Locator) -> SurfaceResult<Vec<ElementHandle>> {
        self.inspect(|page| match locator {
            Locator::Css(selector) => {
                let selector = parse_css(selector)?;
                Ok(page.handles(page.document.select(&selector)))
            }
            Locator::Text { tag, needles } => Ok(page.handles(
                page.elements
                    .iter()
                    .copied()
                    .filter(|el| tag_matches(el, tag) && own_text_contains(el, needles)),
            )),
        })
    }

    async fn find_within(
        &self,
        scope: ElementHandle,
        locator: &Locator,
    ) -> SurfaceResult<Vec<ElementHandle>> {
        self.inspect(|page| {
            let root = page.element(scope)?;
            match locator {
                Locator::Css(selector) => {
                    let selector = parse_css(selector)?;
                    Ok(page.handles(root.select(&selector)))
                }
                Locator::Text { tag, needles } => Ok(page.handles(
                    root.descendants()
                        .skip(1)
                        .filter_map(ElementRef::wrap)
                        .filter(|el| tag_matches(el, tag) && own_text_contains(el, needles)),
                )),
            }
        })
    }

    async fn parent(&self, element: ElementHandle) -> SurfaceResult<Option<ElementHandle>> {
        self.inspect(|page| {
            let el = page.element(element)?;
            Ok(el
                .parent()
                .and_then(ElementRef::wrap)
                .and_then(|parent| page.handle_of(&parent)))
        })
    }

    async fn text(&self, element: ElementHandle) -> SurfaceResult<String> {
        self.inspect(|page| Ok(element_text(&page.element(element)?)))
    }

    async fn attribute(&self, element: ElementHandle, name: &str) -> SurfaceResult<Option<String>> {
        self.inspect(|page| {
            Ok(page
                .element(element)?
                .value()
                .attr(name)
                .map(str::to_string))
        })
    }

    async fn is_displayed(&self, element: ElementHandle) -> SurfaceResult<bool> {
        self.inspect(|page| {
            let el = page.element(element)?;
            let hidden = std::iter::once(el)
                .chain(el.ancestors().filter_map(ElementRef::wrap))
                .any(|candidate| is_hidden(&candidate));
            Ok(!hidden)
        })
    }

    async fn scroll_into_view(&self, element: ElementHandle) -> SurfaceResult<()> {
        self.inspect(|page| page.element(element).map(|_| ()))
    }

    async fn script_click(&self, element: ElementHandle) -> SurfaceResult<()> {
        self.click(element, ClickKind::Script)
    }

    async fn native_click(&self, element: ElementHandle) -> SurfaceResult<()> {
        self.click(element, ClickKind::Native)
    }

    async fn choose_option(&self, option: ElementHandle) -> SurfaceResult<()> {
        self.click(option, ClickKind::Option)
    }

    async fn page_text(&self) -> SurfaceResult<String> {
        self.inspect(|page| {
            Ok(page
                .document
                .select(&BODY)
                .next()
                .map(|body| element_text(&body))
                .unwrap_or_default())
        })
    }

    async fn title(&self) -> SurfaceResult<String> {
        self.inspect(|page| {
            Ok(page
                .document
                .select(&TITLE)
                .next()
                .map(|title| element_text(&title))
                .unwrap_or_default())
        })
    }

    async fn cookies(&self) -> SurfaceResult<Vec<StoredCookie>> {
        Ok(self.lock().cookies.clone())
    }

    async fn set_cookies(&self, cookies: &[StoredCookie]) -> SurfaceResult<()> {
        let mut log = self.lock();
        for cookie in cookies {
            log.cookies
                .retain(|existing| !(existing.name == cookie.name && existing.domain == cookie.domain));
            log.cookies.push(cookie.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
            <head><title>Acme Kettle</title></head>
            <body>
                <div id="brand" data-dca-name="ItemBrandLink">Acme</div>
                <div class="panel" hidden><button id="ghost">Most recent</button></div>
                <ul>
                    <li class="review"><div class="f7 gray">Aug 3, 2025</div><p>Great</p></li>
                    <li class="review"><div class="f7 gray">Jul 30, 2025</div></li>
                </ul>
                <a id="next" data-testid="NextPage" href="https://shop.test/?page=2"><span id="next-label">Next</span></a>
                <button id="flaky" data-click-fails>Sort by</button>
            </body>
        </html>
    "#;

    fn surface() -> StaticSurface {
        StaticSurface::new()
            .with_page("https://shop.test/?page=1", PAGE)
            .with_page("https://shop.test/?page=2", "<html><body><p>Second</p></body></html>")
    }

    #[tokio::test]
    async fn test_find_css_and_text() {
        let surface = surface();
        surface.load("https://shop.test/?page=1").await.unwrap();

        let dates = surface.find(&Locator::css("div.f7.gray")).await.unwrap();
        assert_eq!(dates.len(), 2);
        assert_eq!(surface.text(dates[0]).await.unwrap(), "Aug 3, 2025");

        let by_year = surface.find(&Locator::text("div", &["2025"])).await.unwrap();
        assert_eq!(by_year, dates);
    }

    #[tokio::test]
    async fn test_same_node_same_handle_across_queries() {
        let surface = surface();
        surface.load("https://shop.test/?page=1").await.unwrap();
        let a = surface.find(&Locator::css("#brand")).await.unwrap();
        let b = surface.find(&Locator::css("[data-dca-name='ItemBrandLink']")).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_find_within_and_parent() {
        let surface = surface();
        surface.load("https://shop.test/?page=1").await.unwrap();
        let tiles = surface.find(&Locator::css("li.review")).await.unwrap();
        let inner = surface.find_within(tiles[0], &Locator::css("div.f7.gray")).await.unwrap();
        assert_eq!(inner.len(), 1);
        assert_eq!(surface.parent(inner[0]).await.unwrap(), Some(tiles[0]));
    }

    #[tokio::test]
    async fn test_hidden_subtree_is_not_displayed() {
        let surface = surface();
        surface.load("https://shop.test/?page=1").await.unwrap();
        let ghost = surface.find(&Locator::css("#ghost")).await.unwrap();
        assert!(!surface.is_displayed(ghost[0]).await.unwrap());
        let brand = surface.find(&Locator::css("#brand")).await.unwrap();
        assert!(surface.is_displayed(brand[0]).await.unwrap());
    }

    #[tokio::test]
    async fn test_click_navigates_through_anchor_ancestor() {
        let surface = surface();
        surface.load("https://shop.test/?page=1").await.unwrap();
        let label = surface.find(&Locator::css("#next-label")).await.unwrap();
        surface.script_click(label[0]).await.unwrap();
        assert_eq!(surface.current_url().as_deref(), Some("https://shop.test/?page=2"));
        assert_eq!(surface.page_text().await.unwrap(), "Second");
    }

    #[tokio::test]
    async fn test_flaky_click_fails_only_for_script_clicks() {
        let surface = surface();
        surface.load("https://shop.test/?page=1").await.unwrap();
        let flaky = surface.find(&Locator::css("#flaky")).await.unwrap();
        assert!(surface.script_click(flaky[0]).await.is_err());
        assert!(surface.native_click(flaky[0]).await.is_ok());
        let clicks = surface.clicks();
        assert_eq!(clicks.len(), 1);
        assert_eq!(clicks[0].kind, ClickKind::Native);
        assert_eq!(clicks[0].target, "flaky");
    }

    #[tokio::test]
    async fn test_unknown_page_and_bad_selector() {
        let surface = surface();
        assert!(matches!(
            surface.load("https://shop.test/missing").await,
            Err(SurfaceError::Navigation { .. })
        ));
        surface.load("https://shop.test/?page=1").await.unwrap();
        assert!(matches!(
            surface.find(&Locator::css("div >")).await,
            Err(SurfaceError::InvalidLocator { .. })
        ));
        assert_eq!(surface.title().await.unwrap(), "Acme Kettle");
    }

    #[tokio::test]
    async fn test_set_cookies_replaces_by_name_and_domain() {
        let surface = surface();
        let cookie = |value: &str| StoredCookie {
            name: "session".into(),
            value: value.into(),
            domain: ".shop.test".into(),
            path: "/".into(),
            expires: None,
            http_only: true,
            secure: true,
        };
        surface.set_cookies(&[cookie("one")]).await.unwrap();
        surface.set_cookies(&[cookie("two")]).await.unwrap();
        let cookies = surface.cookies().await.unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].value, "two");
    }
}
