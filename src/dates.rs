//! Review date extraction from free-form tile text.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::models::{MONTH_ABBREVIATIONS, MonthYear};

static ABSOLUTE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Sept|Oct|Nov|Dec)\s+\d{1,2},?\s+\d{4}",
    )
    .expect("hardcoded regex pattern is valid")
});

static RELATIVE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s+(days?|weeks?|hours?|months?)\s+ago").expect("hardcoded regex pattern is valid")
});

const ABSOLUTE_FORMATS: [&str; 6] = [
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d,%Y",
    "%b %d,%Y",
    "%B %d %Y",
    "%b %d %Y",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DateKind {
    Absolute,
    Relative,
}

/// A date read off one review tile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewDatePoint {
    pub at: NaiveDateTime,
    pub kind: DateKind,
}

impl ReviewDatePoint {
    pub fn month_year(&self) -> MonthYear {
        MonthYear::of(&self.at)
    }
}

/// Parses the first recognizable date in `text`. Relative phrases resolve
/// against `reference`; a month counts as 30 days.
pub fn parse_review_date(text: &str, reference: NaiveDateTime) -> Option<ReviewDatePoint> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(at) = parse_absolute(text) {
        return Some(ReviewDatePoint {
            at,
            kind: DateKind::Absolute,
        });
    }

    parse_relative(&text.to_lowercase(), reference).map(|at| ReviewDatePoint {
        at,
        kind: DateKind::Relative,
    })
}

fn parse_absolute(text: &str) -> Option<NaiveDateTime> {
    let found = ABSOLUTE_DATE.find(text)?.as_str();
    // chrono only knows the three-letter abbreviation.
    let found = match found.get(..4) {
        Some(prefix)
            if prefix.eq_ignore_ascii_case("sept")
                && !found[4..].starts_with(char::is_alphabetic) =>
        {
            format!("Sep{}", &found[4..])
        }
        _ => found.to_string(),
    };
    ABSOLUTE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&found, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn parse_relative(lowered: &str, reference: NaiveDateTime) -> Option<NaiveDateTime> {
    if let Some(caps) = RELATIVE_DATE.captures(lowered) {
        let amount: i64 = caps[1].parse().ok()?;
        let unit = &caps[2];
        let offset = if unit.starts_with("day") {
            Duration::try_days(amount)?
        } else if unit.starts_with("week") {
            Duration::try_weeks(amount)?
        } else if unit.starts_with("hour") {
            Duration::try_hours(amount)?
        } else {
            Duration::try_days(amount.checked_mul(30)?)?
        };
        return reference.checked_sub_signed(offset);
    }

    if lowered.contains("yesterday") {
        return reference.checked_sub_signed(Duration::days(1));
    }
    if lowered.contains("today") {
        return Some(reference);
    }
    None
}

/// Cheap pre-check used before falling back to a tile's date descendant.
pub fn has_month_token(text: &str) -> bool {
    MONTH_ABBREVIATIONS.iter().any(|abbr| text.contains(abbr))
}
