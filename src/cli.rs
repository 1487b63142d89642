use chrono::NaiveDate;
use clap::Parser;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use url::Url;

use listing_sieve::config::{AppConfig, OutputConfig, SiteConfig};
use listing_sieve::crawler::search_url;
use listing_sieve::models::{PageSelection, TargetPeriod};
use listing_sieve::report::ReportPaths;
use listing_sieve::{AppError, Result};

#[derive(Debug, Parser)]
#[command(
    name = "listing-sieve",
    version,
    about = "Harvests product links from a paginated listing and keeps the ones worth a look"
)]
pub struct Cli {
    /// Configuration file (replaces config/default and config/local)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Pages to crawl: `all`, `N` or `A-B`. Prompted for when absent.
    #[arg(long, value_name = "PAGES")]
    pub pages: Option<String>,

    /// Target month: `current`, `YYYY-MM` or `Aug 2025`. Prompted for when absent.
    #[arg(long, value_name = "MONTH")]
    pub month: Option<String>,

    /// Full listing URL to crawl instead of the configured base URL
    #[arg(long, conflicts_with = "query")]
    pub url: Option<String>,

    /// Keyword search instead of a listing URL
    #[arg(long)]
    pub query: Option<String>,

    #[arg(long)]
    pub headless: bool,

    /// Do not wait for a human at the verification gate
    #[arg(long)]
    pub skip_verification: bool,

    /// Replay captured pages (a directory with manifest.json, or the manifest itself)
    #[arg(long, value_name = "DIR")]
    pub replay: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    pub accepted_out: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    pub status_out: Option<PathBuf>,
}

impl Cli {
    /// Flags that override configuration values.
    pub fn apply(&self, config: &mut AppConfig) {
        if self.headless {
            config.browser.headless = true;
        }
    }

    pub fn listing_url(&self, site: &SiteConfig) -> Result<String> {
        if let Some(url) = &self.url {
            Url::parse(url).map_err(|e| AppError::Validation(format!("Invalid listing URL '{}': {}", url, e)))?;
            return Ok(url.clone());
        }
        match &self.query {
            Some(query) => search_url(site, query),
            None => Ok(site.base_url.clone()),
        }
    }

    pub fn report_paths(&self, output: &OutputConfig) -> ReportPaths {
        ReportPaths {
            accepted: self
                .accepted_out
                .clone()
                .unwrap_or_else(|| PathBuf::from(&output.accepted_path)),
            status: self
                .status_out
                .clone()
                .unwrap_or_else(|| PathBuf::from(&output.status_path)),
        }
    }

    pub fn replay_manifest(&self) -> Option<PathBuf> {
        self.replay.as_ref().map(|path| {
            if path.is_dir() {
                path.join("manifest.json")
            } else {
                path.clone()
            }
        })
    }

    pub fn page_selection(&self) -> Result<PageSelection> {
        match &self.pages {
            Some(pages) => PageSelection::parse(pages),
            None => {
                let stdin = std::io::stdin();
                prompt_selection(&mut stdin.lock(), &mut std::io::stdout())
            }
        }
    }

    pub fn target_period(&self, today: NaiveDate) -> Result<TargetPeriod> {
        match &self.month {
            Some(month) => Ok(TargetPeriod::parse_or_current(month, today)),
            None => {
                let stdin = std::io::stdin();
                prompt_target(&mut stdin.lock(), &mut std::io::stdout(), today)
            }
        }
    }
}

fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> Result<String> {
    write!(output, "{}", question)?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Mode menu; anything other than `1` or `3` means all pages.
pub fn prompt_selection<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<PageSelection> {
    let choice = ask(input, output, "Pages: 1=Single, 2=All, 3=Range (default 2): ")?;
    match choice.as_str() {
        "1" => {
            let page = ask(input, output, "Enter page (default 1): ")?;
            PageSelection::parse(if page.is_empty() { "1" } else { &page })
        }
        "3" => {
            let range = ask(input, output, "Enter range (e.g. 2-5): ")?;
            match PageSelection::parse(&range)? {
                range @ PageSelection::Range { .. } => Ok(range),
                _ => Err(AppError::parse(format!("bad page range '{}'", range))),
            }
        }
        _ => Ok(PageSelection::Exhaustive),
    }
}

pub fn prompt_target<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    today: NaiveDate,
) -> Result<TargetPeriod> {
    let raw = ask(
        input,
        output,
        "Enter target month (type 'current' for current month, or e.g. 'Aug 2025' or '2025-08'): ",
    )?;
    Ok(TargetPeriod::parse_or_current(&raw, today))
}
