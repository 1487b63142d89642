use async_trait::async_trait;
use headless_chrome::protocol::cdp::Network::CookieParam;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

use super::{
    ElementHandle, Locator, RenderSurface, SurfaceError, SurfaceResult, collapse_whitespace,
};
use crate::config::BrowserConfig;
use crate::session::StoredCookie;
use crate::utils::error::{AppError, Result};

// Page-side registry: handles are indices into `window.__sieveNodes`, which
// the browser discards on every navigation.
const PRELUDE: &str = r#"
    window.__sieveNodes = window.__sieveNodes || [];
    const reg = window.__sieveNodes;
    const register = (el) => {
        let i = reg.indexOf(el);
        if (i < 0) { reg.push(el); i = reg.length - 1; }
        return i;
    };
    const node = (i) => {
        const el = reg[i];
        if (!el || !el.isConnected) { const e = new Error('detached'); e.name = 'StaleElement'; throw e; }
        return el;
    };
    const snapshot = (xpath, root) => {
        const snap = document.evaluate(xpath, root, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
        const out = [];
        for (let k = 0; k < snap.snapshotLength; k++) { out.push(snap.snapshotItem(k)); }
        return out;
    };
"#;

const NATIVE_CLICK_MARKER: &str = "data-sieve-target";

/// One visible Chrome tab driven over the DevTools protocol.
pub struct ChromeSurface {
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeSurface {
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(false)
            .window_size(Some((config.window_width, config.window_height)))
            .idle_browser_timeout(Duration::from_secs(config.idle_timeout_secs))
            .args(vec![
                std::ffi::OsStr::new("--disable-dev-shm-usage"),
                std::ffi::OsStr::new("--disable-extensions"),
                std::ffi::OsStr::new("--disable-background-timer-throttling"),
                std::ffi::OsStr::new("--disable-backgrounding-occluded-windows"),
                std::ffi::OsStr::new("--disable-renderer-backgrounding"),
            ])
            .build()
            .map_err(|e| AppError::Browser(format!("Failed to create launch options: {}", e)))?;

        // Set Chrome path if provided
        if let Some(chrome_path) = &config.chrome_path {
            launch_options.path = Some(std::path::PathBuf::from(chrome_path));
        }

        let browser = Browser::new(launch_options)
            .map_err(|e| AppError::Browser(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| AppError::Browser(format!("Failed to create tab: {}", e)))?;

        if let Some(user_agent) = &config.user_agent {
            tab.set_user_agent(user_agent, None, None)
                .map_err(|e| AppError::Browser(format!("Failed to set user agent: {}", e)))?;
        }

        tracing::info!(headless = config.headless, "Browser launched");
        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    /// Runs `body` inside the registry prelude. The body must `return` a
    /// JSON-serializable value; thrown errors come back as an envelope
    /// instead of a protocol failure.
    fn run(&self, body: &str, element: Option<ElementHandle>) -> SurfaceResult<Value> {
        let script = format!(
            r#"(function() {{
                try {{
                    {prelude}
                    const result = (function() {{ {body} }})();
                    return JSON.stringify({{ ok: result === undefined ? null : result }});
                }} catch (e) {{
                    return JSON.stringify({{ error: String(e && e.message), kind: String(e && e.name) }});
                }}
            }})()"#,
            prelude = PRELUDE,
            body = body,
        );

        let remote = self
            .tab
            .evaluate(&script, false)
            .map_err(|e| SurfaceError::Protocol(e.to_string()))?;

        let raw = match remote.value {
            Some(Value::String(raw)) => raw,
            other => {
                return Err(SurfaceError::Script(format!(
                    "unexpected evaluation result: {:?}",
                    other
                )));
            }
        };

        let envelope: Value = serde_json::from_str(&raw)
            .map_err(|e| SurfaceError::Script(format!("Failed to parse script result: {}", e)))?;

        if let Some(message) = envelope.get("error") {
            let message = message.as_str().unwrap_or("Unknown error").to_string();
            return Err(match (envelope.get("kind").and_then(Value::as_str), element) {
                (Some("StaleElement"), Some(handle)) => SurfaceError::StaleElement(handle),
                (Some("SyntaxError"), _) => SurfaceError::InvalidLocator {
                    locator: body.to_string(),
                    message,
                },
                _ => SurfaceError::Script(message),
            });
        }

        Ok(envelope.get("ok").cloned().unwrap_or(Value::Null))
    }

    fn query(&self, root: &str, locator: &Locator, element: Option<ElementHandle>) -> SurfaceResult<Vec<ElementHandle>> {
        let nodes = match locator {
            Locator::Css(selector) => format!(
                "Array.from({}.querySelectorAll({}))",
                root,
                js_string(selector)
            ),
            Locator::Text { .. } => {
                let xpath = locator
                    .to_xpath(element.is_some())
                    .ok_or_else(|| SurfaceError::Script("text locator without xpath".into()))?;
                format!("snapshot({}, {})", js_string(&xpath), root)
            }
        };

        let value = self
            .run(&format!("return {}.map(register);", nodes), element)
            .map_err(|e| match e {
                SurfaceError::InvalidLocator { message, .. } => SurfaceError::InvalidLocator {
                    locator: locator.to_string(),
                    message,
                },
                other => other,
            })?;

        Ok(value
            .as_array()
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(Value::as_u64)
                    .map(|index| ElementHandle(index as usize))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn on_element(&self, element: ElementHandle, body: &str) -> SurfaceResult<Value> {
        self.run(
            &format!("const el = node({}); {}", element.0, body),
            Some(element),
        )
    }

    fn navigation_error(url: &str, error: impl std::fmt::Display) -> SurfaceError {
        SurfaceError::Navigation {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

fn js_string(value: &str) -> String {
    // JSON string literals are valid JavaScript string literals.
    Value::String(value.to_string()).to_string()
}

#[async_trait]
impl RenderSurface for ChromeSurface {
    async fn load(&self, url: &str) -> SurfaceResult<()> {
        tracing::debug!("Navigating to {}", url);
        self.tab
            .navigate_to(url)
            .map_err(|e| Self::navigation_error(url, e))?
            .wait_until_navigated()
            .map_err(|e| Self::navigation_error(url, e))?;
        Ok(())
    }

    async fn reload(&self) -> SurfaceResult<()> {
        let url = self.tab.get_url();
        self.tab
            .reload(false, None)
            .map_err(|e| Self::navigation_error(&url, e))?
            .wait_until_navigated()
            .map_err(|e| Self::navigation_error(&url, e))?;
        Ok(())
    }

    async fn find(&self, locator: &Locator) -> SurfaceResult<Vec<ElementHandle>> {
        self.query("document", locator, None)
    }

    async fn find_within(
        &self,
        scope: ElementHandle,
        locator: &Locator,
    ) -> SurfaceResult<Vec<ElementHandle>> {
        self.query(&format!("node({})", scope.0), locator, Some(scope))
    }

    async fn parent(&self, element: ElementHandle) -> SurfaceResult<Option<ElementHandle>> {
        let value = self.on_element(
            element,
            "const p = el.parentElement; return p ? register(p) : null;",
        )?;
        Ok(value.as_u64().map(|index| ElementHandle(index as usize)))
    }

    async fn text(&self, element: ElementHandle) -> SurfaceResult<String> {
        let value = self.on_element(element, "return el.innerText || el.textContent || '';")?;
        Ok(collapse_whitespace(value.as_str().unwrap_or_default()))
    }

    async fn attribute(&self, element: ElementHandle, name: &str) -> SurfaceResult<Option<String>> {
        let value = self.on_element(
            element,
            &format!("return el.getAttribute({});", js_string(name)),
        )?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn is_displayed(&self, element: ElementHandle) -> SurfaceResult<bool> {
        let value = self.on_element(
            element,
            r#"const style = window.getComputedStyle(el);
               if (style.display === 'none' || style.visibility === 'hidden') { return false; }
               return !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);"#,
        )?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn scroll_into_view(&self, element: ElementHandle) -> SurfaceResult<()> {
        self.on_element(element, "el.scrollIntoView({ block: 'center' }); return true;")?;
        Ok(())
    }

    async fn script_click(&self, element: ElementHandle) -> SurfaceResult<()> {
        self.on_element(element, "el.click(); return true;")?;
        Ok(())
    }

    async fn native_click(&self, element: ElementHandle) -> SurfaceResult<()> {
        // Tag the registry node so it can be addressed by a plain selector,
        // then let the protocol click at its box.
        self.on_element(
            element,
            &format!(
                "document.querySelectorAll('[{marker}]').forEach(e => e.removeAttribute('{marker}'));
                 el.setAttribute('{marker}', '1'); return true;",
                marker = NATIVE_CLICK_MARKER
            ),
        )?;
        self.tab
            .find_element(&format!("[{}='1']", NATIVE_CLICK_MARKER))
            .map_err(|e| SurfaceError::Protocol(e.to_string()))?
            .click()
            .map_err(|e| SurfaceError::Protocol(e.to_string()))?;
        Ok(())
    }

    async fn choose_option(&self, option: ElementHandle) -> SurfaceResult<()> {
        self.on_element(
            option,
            r#"el.selected = true;
               const select = el.closest('select');
               if (select) {
                   select.value = el.value;
                   select.dispatchEvent(new Event('input', { bubbles: true }));
                   select.dispatchEvent(new Event('change', { bubbles: true }));
               }
               return true;"#,
        )?;
        Ok(())
    }

    async fn page_text(&self) -> SurfaceResult<String> {
        let value = self.run("return document.body ? document.body.innerText : '';", None)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn title(&self) -> SurfaceResult<String> {
        self.tab
            .get_title()
            .map_err(|e| SurfaceError::Protocol(e.to_string()))
    }

    async fn cookies(&self) -> SurfaceResult<Vec<StoredCookie>> {
        let cookies = self
            .tab
            .get_cookies()
            .map_err(|e| SurfaceError::Protocol(e.to_string()))?;
        Ok(cookies
            .into_iter()
            .map(|cookie| StoredCookie {
                name: cookie.name,
                value: cookie.value,
                domain: cookie.domain,
                path: cookie.path,
                expires: (cookie.expires > 0.0).then_some(cookie.expires),
                http_only: cookie.http_only,
                secure: cookie.secure,
            })
            .collect())
    }

    async fn set_cookies(&self, cookies: &[StoredCookie]) -> SurfaceResult<()> {
        let params = cookies
            .iter()
            .map(|cookie| {
                let mut param = json!({
                    "name": cookie.name,
                    "value": cookie.value,
                    "domain": cookie.domain,
                    "path": cookie.path,
                    "httpOnly": cookie.http_only,
                    "secure": cookie.secure,
                });
                if let Some(expires) = cookie.expires {
                    param["expires"] = json!(expires);
                }
                serde_json::from_value::<CookieParam>(param)
                    .map_err(|e| SurfaceError::Protocol(format!("Invalid cookie {}: {}", cookie.name, e)))
            })
            .collect::<SurfaceResult<Vec<_>>>()?;

        if params.is_empty() {
            return Ok(());
        }

        self.tab
            .set_cookies(params)
            .map_err(|e| SurfaceError::Protocol(e.to_string()))
    }
}
