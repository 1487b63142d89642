//! Element locators for listing and product pages.
//!
//! Every list is an ordered fallback chain: earlier entries are the shapes
//! the storefront currently renders, later ones are older or looser
//! variants. Update this file when the markup changes, and add a fixture
//! under `tests/fixtures/` reproducing the new shape.

use std::sync::LazyLock;

use crate::surface::Locator;

fn css(selectors: &[&str]) -> Vec<Locator> {
    selectors.iter().map(|s| Locator::css(*s)).collect()
}

/// Search results and category listings.
pub mod listing {
    use super::*;

    /// Every anchor that may point at a product. Filtering happens in the
    /// normalizer, so this list is deliberately broad.
    pub static PRODUCT_ANCHORS: LazyLock<Vec<Locator>> =
        LazyLock::new(|| css(&["a[link-identifier], a[href*='/ip/']"]));

    pub static NEXT_PAGE: LazyLock<Vec<Locator>> = LazyLock::new(|| {
        css(&[
            "a[data-testid='NextPage']",
            "button[aria-label='Next Page']",
            "a[aria-label='Next Page']",
        ])
    });
}

/// Product detail page.
pub mod product {
    use super::*;

    /// Brand label, structured shapes first.
    pub static BRAND: LazyLock<Vec<Locator>> = LazyLock::new(|| {
        css(&[
            "[data-dca-name=\"ItemBrandLink\"]",
            "a[data-automation-id='brand-link'], a.brand-link",
        ])
    });

    pub static VISIT_STORE: LazyLock<Vec<Locator>> = LazyLock::new(|| {
        vec![Locator::text("*", &["Visit the store", "Visit Store"])]
    });

    pub static COMPARE_SELLERS: LazyLock<Vec<Locator>> = LazyLock::new(|| {
        vec![
            Locator::css("[aria-label*='Compare all']"),
            Locator::text("button", &["Compare all sellers", "See all sellers", "See all options"]),
            Locator::text("a", &["Compare all sellers", "See all sellers", "See all options"]),
            Locator::text("*", &["Compare all sellers", "See all sellers", "See all options"]),
        ]
    });

    pub static REVIEWS_ENTRY: LazyLock<Vec<Locator>> = LazyLock::new(|| {
        css(&[
            "[data-testid='item-review-section-link']",
            "a[data-automation-id='reviews-link'], a.reviews-link, a[href*='#customer-reviews']",
        ])
    });
}

/// The seller comparison panel opened from the product page.
pub mod sellers {
    use super::*;

    pub static PLATFORM_MARKER: LazyLock<Vec<Locator>> =
        LazyLock::new(|| css(&["span[aria-label='Sold and shipped by Walmart.com']"]));

    /// All of these are collected, not just the first that matches.
    pub static NAMES: LazyLock<Vec<Locator>> = LazyLock::new(|| {
        css(&[
            "a[data-automation-id='seller-name-link']",
            "div[data-automation-id='seller-name']",
            "span[class*='seller']",
            "li.seller",
            "div.seller",
        ])
    });

    pub static CLOSE: LazyLock<Vec<Locator>> = LazyLock::new(|| {
        css(&[
            "button[aria-label='Close']",
            "button[aria-label='close']",
            "button[class*='close']",
            "[role='dialog'] button[aria-label*='Close']",
        ])
    });
}

/// Review list controls and tiles.
pub mod reviews {
    use super::*;

    pub const RECENT_LABELS: [&str; 3] = ["Most recent", "Most Recent", "Newest"];

    pub static SORT_BUTTON: LazyLock<Vec<Locator>> =
        LazyLock::new(|| css(&["button[aria-label=\"Sort by\"]"]));

    pub static SORT_HINTED: LazyLock<Vec<Locator>> = LazyLock::new(|| {
        css(&["button[class*='sort'], div[class*='sort'], button[data-testid*='sort']"])
    });

    pub static RECENT_ENTRY: LazyLock<Vec<Locator>> =
        LazyLock::new(|| vec![Locator::text("*", &RECENT_LABELS)]);

    /// Looser follow-up used after a sort-hinted control opens a menu.
    pub static RECENT_ENTRY_LOOSE: LazyLock<Vec<Locator>> =
        LazyLock::new(|| vec![Locator::text("*", &["Most recent", "Newest", "Recent"])]);

    pub static SELECT: LazyLock<Vec<Locator>> = LazyLock::new(|| css(&["select"]));
    pub static OPTION: LazyLock<Locator> = LazyLock::new(|| Locator::css("option"));

    pub static DATE_STYLED: LazyLock<Locator> = LazyLock::new(|| Locator::css("div.f7.gray"));

    pub static TILES: LazyLock<Locator> = LazyLock::new(|| {
        Locator::css(
            "[data-automation-id*='review'], li[class*='review'], div[class*='review'], \
             div[data-testid*='review']",
        )
    });

    /// Date-bearing descendants of a tile whose own text has no month.
    pub static TILE_DATE: LazyLock<Vec<Locator>> =
        LazyLock::new(|| css(&["div.f7.gray, .date, [class*='date']"]));

    /// Review-tile candidate strategies, unioned. `years` are the year
    /// literals a date-bearing `div` may contain.
    pub fn candidates(years: &[i32]) -> Vec<Locator> {
        let years: Vec<String> = years.iter().map(|y| y.to_string()).collect();
        let years: Vec<&str> = years.iter().map(String::as_str).collect();
        vec![
            DATE_STYLED.clone(),
            Locator::text("div", &years),
            TILES.clone(),
        ]
    }
}
