use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub site: SiteConfig,
    pub browser: BrowserConfig,
    pub crawl: CrawlConfig,
    pub qualify: QualifyConfig,
    pub session: SessionConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub origin: String,
    /// Listing crawled when no search keyword is given.
    pub base_url: String,
    pub product_marker: String,
    pub redirect_param: String,
    pub zip_code: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            origin: "https://www.walmart.com".to_string(),
            base_url: "https://www.walmart.com/".to_string(),
            product_marker: "/ip/".to_string(),
            redirect_param: "rd".to_string(),
            zip_code: "10009".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub chrome_path: Option<String>,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: Option<String>,
    pub idle_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            chrome_path: None,
            window_width: 1400,
            window_height: 900,
            user_agent: None,
            idle_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Lazy-load allowance before anchors are collected.
    pub page_settle_ms: u64,
    /// After a `page=N` navigation.
    pub load_settle_ms: u64,
    /// After clicking the next-page control.
    pub next_settle_ms: u64,
    /// After the landing page is reloaded with restored cookies.
    pub landing_settle_ms: u64,
    pub poll_ms: u64,
    pub max_pages: u32,
    pub retry_attempts: usize,
    pub retry_delay_ms: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            page_settle_ms: 1_000,
            load_settle_ms: 2_000,
            next_settle_ms: 1_200,
            landing_settle_ms: 2_000,
            poll_ms: 250,
            max_pages: 500,
            retry_attempts: 2,
            retry_delay_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualifyConfig {
    pub open_settle_ms: u64,
    pub click_settle_ms: u64,
    pub popup_settle_ms: u64,
    pub count_settle_ms: u64,
    pub poll_ms: u64,
    pub min_reviews: usize,
    pub max_scan: usize,
    /// Year literals used to find date-bearing review text. Defaults to
    /// the previous, current and next year.
    pub candidate_years: Option<Vec<i32>>,
}

impl Default for QualifyConfig {
    fn default() -> Self {
        Self {
            open_settle_ms: 1_000,
            click_settle_ms: 1_000,
            popup_settle_ms: 600,
            count_settle_ms: 600,
            poll_ms: 200,
            min_reviews: 5,
            max_scan: 150,
            candidate_years: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_path: "sieve_cookies.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub accepted_path: String,
    pub status_path: String,
    pub log_dir: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            accepted_path: "sieve_filtered_links.csv".to_string(),
            status_path: "sieve_links_status.csv".to_string(),
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Layers built-in defaults, then `config/default` and `config/local`
    /// (or the explicit file), then `SIEVE__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            // Start with built-in defaults
            .add_source(Config::try_from(&AppConfig::default())?);

        builder = match path {
            Some(path) => builder.add_source(File::from(path)),
            None => builder
                .add_source(File::with_name("config/default").required(false))
                // Add local config (ignored by git)
                .add_source(File::with_name("config/local").required(false)),
        };

        let s = builder
            // Add environment variables with prefix "SIEVE__"
            .add_source(Environment::with_prefix("SIEVE").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        // Add Chrome path from environment if not set
        if config.browser.chrome_path.is_none() {
            config.browser.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate site configuration
        if Url::parse(&self.site.origin).is_err() {
            return Err(ConfigError::Message("Invalid site origin URL format".into()));
        }

        if Url::parse(&self.site.base_url).is_err() {
            return Err(ConfigError::Message("Invalid base URL format".into()));
        }

        if self.site.product_marker.trim().is_empty() {
            return Err(ConfigError::Message("Site product_marker must not be empty".into()));
        }

        if self.site.redirect_param.trim().is_empty() {
            return Err(ConfigError::Message("Site redirect_param must not be empty".into()));
        }

        // Validate crawl configuration
        if self.crawl.max_pages == 0 {
            return Err(ConfigError::Message("Crawl max_pages must be greater than 0".into()));
        }

        // Validate qualification configuration
        if self.qualify.min_reviews == 0 {
            return Err(ConfigError::Message("Qualify min_reviews must be greater than 0".into()));
        }

        if self.qualify.max_scan == 0 {
            return Err(ConfigError::Message("Qualify max_scan must be greater than 0".into()));
        }

        if matches!(&self.qualify.candidate_years, Some(years) if years.is_empty()) {
            return Err(ConfigError::Message("Qualify candidate_years must not be empty when set".into()));
        }

        // Validate browser configuration
        if self.browser.window_width == 0 || self.browser.window_height == 0 {
            return Err(ConfigError::Message("Browser window size must be greater than 0".into()));
        }

        Ok(())
    }
}
