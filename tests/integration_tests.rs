// Integration tests for listing-sieve
//
// These tests replay a captured storefront through the whole run: crawl,
// per-product qualification, reports and session handling.

mod integration;

use integration::*;
use listing_sieve::surface::RenderSurface;

#[tokio::test]
async fn test_fixture_storefront_is_complete() -> anyhow::Result<()> {
    let surface = storefront();
    surface.load(LANDING_URL).await?;
    for product in PRODUCTS {
        surface.load(product).await?;
    }
    assert_eq!(surface.loads().len(), PRODUCTS.len() + 1);
    Ok(())
}

#[test]
fn test_identifiers_are_canonical() {
    for (identifier, expected) in identifiers().iter().zip(PRODUCTS) {
        assert_eq!(identifier.as_str(), expected);
    }
}
