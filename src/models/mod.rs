use serde::{Deserialize, Serialize};
use std::fmt;

pub mod period;
pub mod product;
pub mod verdict;

// Re-exports for convenience
pub use period::*;
pub use product::*;
pub use verdict::*;

/// Terminal result of qualifying one product.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Pass,
    Fail,
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pass => "PASS",
            Outcome::Fail => "FAIL",
            Outcome::Error => "ERROR",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the listing is traversed. Decided once before crawling starts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PageSelection {
    Single(u32),
    Range { start: u32, end: u32 },
    Exhaustive,
}

impl PageSelection {
    /// Parses `all`, `N` or `A-B` (inclusive, 1-based).
    pub fn parse(input: &str) -> crate::Result<Self> {
        let raw = input.trim().to_lowercase();
        if raw.is_empty() || raw == "all" {
            return Ok(PageSelection::Exhaustive);
        }

        if let Some((start, end)) = raw.split_once('-') {
            let start: u32 = start
                .trim()
                .parse()
                .map_err(|_| crate::AppError::parse(format!("bad page range '{}'", input)))?;
            let end: u32 = end
                .trim()
                .parse()
                .map_err(|_| crate::AppError::parse(format!("bad page range '{}'", input)))?;
            if start == 0 || end < start {
                return Err(crate::AppError::parse(format!("bad page range '{}'", input)));
            }
            return Ok(PageSelection::Range { start, end });
        }

        match raw.parse::<u32>() {
            Ok(page) if page > 0 => Ok(PageSelection::Single(page)),
            _ => Err(crate::AppError::parse(format!("bad page number '{}'", input))),
        }
    }
}

impl fmt::Display for PageSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSelection::Single(page) => write!(f, "page {}", page),
            PageSelection::Range { start, end } => write!(f, "pages {}-{}", start, end),
            PageSelection::Exhaustive => f.write_str("all pages"),
        }
    }
}
