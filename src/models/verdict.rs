use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Outcome, ProductIdentifier};

/// Why a product passed or was discarded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reason {
    SingleSeller,
    PlatformSeller,
    BrandStoreSeller { brand: String },
    VisitStoreSeller { brand: String },
    NoRatings,
    ReviewsUnreachable { detail: String },
    InsufficientReviews { count: usize, period: String },
    Qualified { count: usize, period: String },
    CheckFailed { detail: String },
}

impl Reason {
    pub fn outcome(&self) -> Outcome {
        match self {
            Reason::Qualified { .. } => Outcome::Pass,
            Reason::CheckFailed { .. } => Outcome::Error,
            _ => Outcome::Fail,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::SingleSeller => f.write_str("Discarded: single seller"),
            Reason::PlatformSeller => f.write_str("Discarded: platform is the seller"),
            Reason::BrandStoreSeller { brand } => write!(
                f,
                "Discarded: brand-store seller '{}' detected in sellers list",
                brand
            ),
            Reason::VisitStoreSeller { brand } => write!(
                f,
                "Discarded: 'Visit the store {}' found in sellers list",
                brand
            ),
            Reason::NoRatings => f.write_str("Discarded: no ratings yet"),
            Reason::ReviewsUnreachable { detail } => {
                write!(f, "Discarded: failed to open reviews ({})", detail)
            }
            Reason::InsufficientReviews { count, period } => write!(
                f,
                "Discarded: insufficient reviews in target period {} (only {})",
                period, count
            ),
            Reason::Qualified { count, period } => {
                write!(f, "PASS: {} reviews in target period {}", count, period)
            }
            Reason::CheckFailed { detail } => write!(f, "Error during check: {}", detail),
        }
    }
}

/// One row of the run's verdict log. Terminal once produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Verdict {
    pub identifier: ProductIdentifier,
    pub outcome: Outcome,
    pub reason: Reason,
}

impl Verdict {
    pub fn new(identifier: ProductIdentifier, reason: Reason) -> Self {
        Self {
            identifier,
            outcome: reason.outcome(),
            reason,
        }
    }

    pub fn failed(identifier: ProductIdentifier, detail: impl fmt::Display) -> Self {
        Self::new(
            identifier,
            Reason::CheckFailed {
                detail: detail.to_string(),
            },
        )
    }

    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Pass
    }
}
