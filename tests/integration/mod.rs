// Integration tests for listing-sieve
// These drive the crawler, pipeline and coordinator over captured pages

pub mod coordinator_tests;
pub mod crawler_tests;
pub mod pipeline_tests;

use chrono::{NaiveDate, NaiveDateTime};
use std::path::PathBuf;

use listing_sieve::AppConfig;
use listing_sieve::config::QualifyConfig;
use listing_sieve::models::{MonthYear, ProductIdentifier, TargetPeriod};
use listing_sieve::normalizer::LinkNormalizer;
use listing_sieve::surface::StaticSurface;

pub const LISTING_URL: &str = "https://www.walmart.com/";
pub const LANDING_URL: &str = "https://www.walmart.com/?page=1";

/// Every product in listing order, as the crawler should report them.
pub const PRODUCTS: [&str; 7] = [
    "https://www.walmart.com/ip/Acme-Kettle/101",
    "https://www.walmart.com/ip/Bolt-Lamp/202",
    "https://www.walmart.com/ip/Value-Towels/303",
    "https://www.walmart.com/ip/Bolt-Desk/404",
    "https://www.walmart.com/ip/Nova-Mug/505",
    "https://www.walmart.com/ip/Solo-Chair/606",
    "https://www.walmart.com/ip/Calm-Fan/707",
];

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// The whole captured storefront: three listing pages, seven products,
/// two standalone review pages.
pub fn storefront() -> StaticSurface {
    StaticSurface::from_manifest(&fixtures_dir().join("manifest.json"))
        .expect("fixture manifest loads")
}

/// Defaults, with the candidate years pinned so results do not depend on
/// the calendar year the suite runs in.
pub fn get_test_config() -> AppConfig {
    AppConfig {
        qualify: QualifyConfig {
            candidate_years: Some(vec![2024, 2025, 2026]),
            ..QualifyConfig::default()
        },
        ..AppConfig::default()
    }
}

pub fn august_2025() -> TargetPeriod {
    TargetPeriod::new(MonthYear::new(8, 2025).expect("valid month"))
}

pub fn reference_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 9, 10)
        .and_then(|date| date.and_hms_opt(12, 0, 0))
        .expect("valid reference time")
}

pub fn identifier(href: &str) -> ProductIdentifier {
    let config = AppConfig::default();
    LinkNormalizer::from_config(&config.site)
        .normalize(href)
        .expect("fixture href is a product link")
}

pub fn identifiers() -> Vec<ProductIdentifier> {
    PRODUCTS.iter().map(|href| identifier(href)).collect()
}
