//! Qualification stages and the pure decision function that moves a product
//! between them.
//!
//! The effectful layer observes the page and produces a [`Signal`]; [`decide`]
//! turns the current stage plus that signal into the next stage or a final
//! [`Reason`]. Nothing in this module touches a surface.

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::dates::parse_review_date;
use crate::models::{MonthYear, Reason, TargetPeriod};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Open,
    SellerCheck,
    ReviewsLocate,
    SortAttempt,
    ReviewCount,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Open => "OPEN",
            Stage::SellerCheck => "SELLER_CHECK",
            Stage::ReviewsLocate => "REVIEWS_LOCATE",
            Stage::SortAttempt => "SORT_ATTEMPT",
            Stage::ReviewCount => "REVIEW_COUNT",
        };
        f.write_str(name)
    }
}

/// What the seller comparison step saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SellerObservation {
    NoCompareControl,
    /// The control exists but the comparison panel could not be opened.
    SurfaceUnavailable { detail: String },
    Listed {
        platform_seller: bool,
        sellers: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewsEntry {
    Opened,
    Missing,
    Unreachable { detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Opened { brand: String },
    Sellers(SellerObservation),
    Reviews(ReviewsEntry),
    SortFinished { sorted: bool },
    Counted(ReviewTally),
}

impl Signal {
    fn name(&self) -> &'static str {
        match self {
            Signal::Opened { .. } => "opened",
            Signal::Sellers(_) => "sellers",
            Signal::Reviews(_) => "reviews",
            Signal::SortFinished { .. } => "sort_finished",
            Signal::Counted(_) => "counted",
        }
    }
}

/// Run-wide and per-product facts a decision may depend on.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    /// Empty when no brand could be extracted.
    pub brand: &'a str,
    pub target: &'a TargetPeriod,
    pub min_reviews: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Advance(Stage),
    Conclude(Reason),
}

pub fn decide(stage: Stage, signal: &Signal, context: &DecisionContext<'_>) -> Transition {
    match (stage, signal) {
        (Stage::Open, Signal::Opened { .. }) => Transition::Advance(Stage::SellerCheck),
        (Stage::SellerCheck, Signal::Sellers(observation)) => decide_sellers(observation, context),
        (Stage::ReviewsLocate, Signal::Reviews(entry)) => match entry {
            ReviewsEntry::Opened => Transition::Advance(Stage::SortAttempt),
            ReviewsEntry::Missing => Transition::Conclude(Reason::NoRatings),
            ReviewsEntry::Unreachable { detail } => Transition::Conclude(Reason::ReviewsUnreachable {
                detail: detail.clone(),
            }),
        },
        // Sorting is best-effort and never rejects.
        (Stage::SortAttempt, Signal::SortFinished { .. }) => Transition::Advance(Stage::ReviewCount),
        (Stage::ReviewCount, Signal::Counted(tally)) => {
            let period = context.target.label.clone();
            if tally.in_target < context.min_reviews {
                Transition::Conclude(Reason::InsufficientReviews {
                    count: tally.in_target,
                    period,
                })
            } else {
                Transition::Conclude(Reason::Qualified {
                    count: tally.in_target,
                    period,
                })
            }
        }
        (stage, signal) => Transition::Conclude(Reason::CheckFailed {
            detail: format!("unexpected {} signal in stage {}", signal.name(), stage),
        }),
    }
}

fn decide_sellers(observation: &SellerObservation, context: &DecisionContext<'_>) -> Transition {
    let sellers = match observation {
        SellerObservation::NoCompareControl => return Transition::Conclude(Reason::SingleSeller),
        SellerObservation::SurfaceUnavailable { .. } => {
            return Transition::Advance(Stage::ReviewsLocate);
        }
        SellerObservation::Listed {
            platform_seller: true,
            ..
        } => return Transition::Conclude(Reason::PlatformSeller),
        SellerObservation::Listed { sellers, .. } => sellers,
    };

    let brand = context.brand.trim();
    if brand.is_empty() {
        return Transition::Advance(Stage::ReviewsLocate);
    }

    // The phrase also contains the brand, so it is checked first.
    let visit_store = Regex::new(&format!(r"(?i)visit\s+the\s+store\s+{}", regex::escape(brand)));
    if let Ok(pattern) = visit_store {
        if sellers.iter().any(|s| pattern.is_match(s)) {
            return Transition::Conclude(Reason::VisitStoreSeller {
                brand: brand.to_string(),
            });
        }
    }

    let brand_lower = brand.to_lowercase();
    if sellers.iter().any(|s| s.to_lowercase().contains(&brand_lower)) {
        return Transition::Conclude(Reason::BrandStoreSeller {
            brand: brand.to_string(),
        });
    }

    Transition::Advance(Stage::ReviewsLocate)
}

/// Dates read from the scanned review elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewTally {
    pub scanned: usize,
    pub parsed: usize,
    pub in_target: usize,
    pub months_seen: BTreeSet<MonthYear>,
}

impl ReviewTally {
    pub fn from_texts<'t, I>(texts: I, target: &TargetPeriod, reference: NaiveDateTime) -> Self
    where
        I: IntoIterator<Item = &'t str>,
    {
        let mut tally = ReviewTally::default();
        for text in texts {
            tally.scanned += 1;
            let Some(point) = parse_review_date(text, reference) else {
                continue;
            };
            let month = point.month_year();
            tally.parsed += 1;
            if target.contains(&month) {
                tally.in_target += 1;
            }
            tally.months_seen.insert(month);
        }
        tally
    }

    /// Distinct `Mon YYYY` labels, oldest first.
    pub fn labels(&self) -> Vec<String> {
        self.months_seen.iter().map(MonthYear::to_string).collect()
    }
}
