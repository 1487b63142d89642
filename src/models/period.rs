use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

pub const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

static YEAR_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{1,2})$").expect("hardcoded regex pattern is valid"));

/// Looks up a month number from any name whose first three letters match an
/// abbreviation, case-insensitively ("aug", "August", "AUG.").
pub fn month_from_name(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_lowercase();
    MONTH_ABBREVIATIONS
        .iter()
        .position(|abbr| abbr.to_lowercase() == prefix)
        .map(|index| index as u32 + 1)
}

/// A calendar month. Ordered chronologically.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthYear {
    pub year: i32,
    pub month: u32,
}

impl MonthYear {
    pub fn new(month: u32, year: i32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of(date: &impl Datelike) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn abbreviation(&self) -> &'static str {
        MONTH_ABBREVIATIONS[(self.month - 1) as usize]
    }
}

impl fmt::Display for MonthYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.abbreviation(), self.year)
    }
}

/// The review window for a run plus the label shown in reasons and logs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetPeriod {
    pub period: MonthYear,
    pub label: String,
}

impl TargetPeriod {
    pub fn new(period: MonthYear) -> Self {
        Self {
            label: period.to_string(),
            period,
        }
    }

    pub fn current(today: NaiveDate) -> Self {
        Self::new(MonthYear::of(&today))
    }

    /// Accepts `current`, `YYYY-MM`, or `<month name> YYYY`.
    /// Returns `None` when the input matches none of those forms.
    pub fn parse(input: &str, today: NaiveDate) -> Option<Self> {
        let raw = input.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("current") {
            return Some(Self::current(today));
        }

        if let Some(caps) = YEAR_MONTH.captures(raw) {
            let year: i32 = caps[1].parse().ok()?;
            let month: u32 = caps[2].parse().ok()?;
            return MonthYear::new(month, year).map(Self::new);
        }

        let mut parts = raw.split_whitespace();
        let (name, year) = (parts.next()?, parts.next()?);
        let year: i32 = year.parse().ok()?;
        let month = month_from_name(name)?;
        let period = MonthYear::new(month, year)?;
        Some(Self {
            period,
            label: format!("{} {}", name, year),
        })
    }

    /// Like [`TargetPeriod::parse`] but falls back to the current month.
    pub fn parse_or_current(input: &str, today: NaiveDate) -> Self {
        match Self::parse(input, today) {
            Some(target) => target,
            None => {
                tracing::warn!("Could not parse month '{}', defaulting to current month", input);
                Self::current(today)
            }
        }
    }

    pub fn contains(&self, month: &MonthYear) -> bool {
        self.period == *month
    }
}

impl fmt::Display for TargetPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}
