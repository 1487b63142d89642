use super::*;
use listing_sieve::crawler::{ListingCrawler, PageHarvest, StopReason};
use listing_sieve::models::PageSelection;
use listing_sieve::surface::RenderSurface;

fn harvests(counts: &[(u32, usize)]) -> Vec<PageHarvest> {
    counts
        .iter()
        .map(|&(page, found)| PageHarvest { page, found })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_exhaustive_crawl_follows_next_until_hidden() -> anyhow::Result<()> {
    let surface = storefront();
    let config = get_test_config();
    let normalizer = LinkNormalizer::from_config(&config.site);

    surface.load(LANDING_URL).await?;
    let report = ListingCrawler::new(&surface, &normalizer, &config.crawl)
        .landed_on(1)
        .crawl(LISTING_URL, PageSelection::Exhaustive)
        .await?;

    // Duplicates across pages and tracking wrappers collapse to first sightings.
    assert_eq!(report.identifiers, identifiers());
    assert_eq!(report.pages, harvests(&[(1, 2), (2, 4), (3, 2)]));
    assert_eq!(report.stop, StopReason::NoNextControl);

    // Landing page is reused, later pages are reached by clicking.
    assert_eq!(surface.loads()[0], LANDING_URL);
    assert_eq!(surface.clicks().len(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_range_crawl_loads_each_page_by_url() -> anyhow::Result<()> {
    let surface = storefront();
    let config = get_test_config();
    let normalizer = LinkNormalizer::from_config(&config.site);

    let report = ListingCrawler::new(&surface, &normalizer, &config.crawl)
        .crawl(LISTING_URL, PageSelection::Range { start: 2, end: 3 })
        .await?;

    assert_eq!(
        surface.loads(),
        vec![
            "https://www.walmart.com/?page=2".to_string(),
            "https://www.walmart.com/?page=3".to_string(),
        ]
    );
    let expected: Vec<_> = [PRODUCTS[2], PRODUCTS[3], PRODUCTS[4], PRODUCTS[1], PRODUCTS[5], PRODUCTS[6]]
        .iter()
        .map(|href| identifier(href))
        .collect();
    assert_eq!(report.identifiers, expected);
    assert_eq!(report.stop, StopReason::Completed);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_range_past_the_end_keeps_what_was_harvested() -> anyhow::Result<()> {
    let surface = storefront();
    let config = get_test_config();
    let normalizer = LinkNormalizer::from_config(&config.site);

    let report = ListingCrawler::new(&surface, &normalizer, &config.crawl)
        .crawl(LISTING_URL, PageSelection::Range { start: 3, end: 5 })
        .await?;

    assert_eq!(report.identifiers.len(), 2);
    assert!(matches!(report.stop, StopReason::LoadFailed { page: 4, .. }));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_single_page_crawl() -> anyhow::Result<()> {
    let surface = storefront();
    let config = get_test_config();
    let normalizer = LinkNormalizer::from_config(&config.site);

    let report = ListingCrawler::new(&surface, &normalizer, &config.crawl)
        .crawl(LISTING_URL, PageSelection::Single(1))
        .await?;

    assert_eq!(report.identifiers, identifiers()[..2].to_vec());
    assert_eq!(report.pages, harvests(&[(1, 2)]));
    Ok(())
}
