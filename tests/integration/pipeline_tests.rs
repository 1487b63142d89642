use super::*;
use listing_sieve::models::{Outcome, Reason, Verdict};
use listing_sieve::pipeline::Qualifier;
use listing_sieve::surface::static_page::ClickKind;
use rstest::rstest;

async fn qualify(surface: &StaticSurface, href: &str) -> Verdict {
    let config = get_test_config();
    let target = august_2025();
    Qualifier::new(surface, &config.qualify, &target)
        .with_clock(reference_time)
        .qualify(&identifier(href))
        .await
}

fn qualified(count: usize) -> Reason {
    Reason::Qualified {
        count,
        period: "Aug 2025".into(),
    }
}

#[rstest]
#[case::five_in_target_passes(PRODUCTS[0], qualified(5))]
#[case::four_in_target_fails(PRODUCTS[1], Reason::InsufficientReviews { count: 4, period: "Aug 2025".into() })]
#[case::platform_listed_as_seller(PRODUCTS[2], Reason::PlatformSeller)]
#[case::brand_runs_its_own_storefront(PRODUCTS[3], Reason::BrandStoreSeller { brand: "Bolt".into() })]
#[case::no_reviews_entry(PRODUCTS[4], Reason::NoRatings)]
#[case::hidden_compare_control_means_single_seller(PRODUCTS[5], Reason::SingleSeller)]
#[case::broken_comparison_is_skipped(PRODUCTS[6], qualified(5))]
#[tokio::test(start_paused = true)]
async fn test_product_verdicts(#[case] href: &str, #[case] expected: Reason) {
    let surface = storefront();
    let verdict = qualify(&surface, href).await;
    assert_eq!(verdict.identifier.as_str(), href);
    assert_eq!(verdict.reason, expected);
    assert_eq!(verdict.outcome, expected.outcome());
}

#[tokio::test(start_paused = true)]
async fn test_passing_product_sorted_on_review_page() {
    let surface = storefront();
    let verdict = qualify(&surface, PRODUCTS[0]).await;
    assert_eq!(verdict.outcome, Outcome::Pass);

    assert_eq!(
        surface.current_url().as_deref(),
        Some("https://www.walmart.com/reviews/product/101")
    );
    let targets: Vec<String> = surface.clicks().into_iter().map(|c| c.target).collect();
    // Compare control, close, reviews entry, sort button, menu entry.
    assert_eq!(targets.len(), 5);
    assert_eq!(targets.last().map(String::as_str), Some("sort-recent"));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_scripted_click_on_reviews_falls_back_to_direct_click() {
    let surface = storefront();
    qualify(&surface, PRODUCTS[1]).await;

    let clicks = surface.clicks();
    let direct = clicks
        .iter()
        .find(|click| click.kind == ClickKind::Native)
        .expect("direct click recorded");
    assert_eq!(direct.url, PRODUCTS[1]);
    assert!(
        surface
            .loads()
            .contains(&"https://www.walmart.com/reviews/product/202".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn test_single_seller_wins_over_plenty_of_reviews() {
    let surface = storefront();
    let verdict = qualify(&surface, PRODUCTS[5]).await;
    assert_eq!(verdict.reason.to_string(), "Discarded: single seller");
    // Nothing past the seller check was touched.
    assert!(surface.clicks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_comparison_continues_and_sorts_with_native_select() {
    let surface = storefront();
    let verdict = qualify(&surface, PRODUCTS[6]).await;
    assert_eq!(verdict.outcome, Outcome::Pass);

    let option = surface
        .clicks()
        .into_iter()
        .find(|click| click.kind == ClickKind::Option)
        .expect("option chosen");
    assert_eq!(option.target, "order-recent");
}

#[tokio::test(start_paused = true)]
async fn test_relative_dates_resolve_against_the_product_clock() {
    let url = "https://www.walmart.com/ip/Rel-Dates/808";
    let reviews = ["3 weeks ago", "20 days ago", "1 month ago", "Aug 2, 2025", "Aug 30, 2025", "2 days ago"]
        .iter()
        .map(|date| format!(r#"<li><div class="f7 gray">{}</div></li>"#, date))
        .collect::<String>();
    let html = format!(
        r##"<html><body>
            <a data-dca-name="ItemBrandLink">Rel</a>
            <button aria-label="Compare all sellers" data-click-fails>Compare all sellers</button>
            <a data-testid="item-review-section-link" href="#customer-reviews">Reviews</a>
            <ul>{}</ul>
        </body></html>"##,
        reviews
    );
    let surface = StaticSurface::new().with_page(url, html);

    // Sep 10 reference: 3 weeks, 20 days and 1 month back all land in August;
    // 2 days ago is September.
    let verdict = qualify(&surface, url).await;
    assert_eq!(verdict.reason, qualified(5));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_product_page_is_an_error_verdict() {
    let surface = storefront();
    let verdict = qualify(&surface, "https://www.walmart.com/ip/Gone/999").await;
    assert_eq!(verdict.outcome, Outcome::Error);
    assert!(verdict.reason.to_string().starts_with("Error during check:"));
}
