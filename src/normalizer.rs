//! Canonicalizes listing anchors into [`ProductIdentifier`]s.
//!
//! Anchors on listing pages come in three shapes: direct product paths,
//! product paths carrying tracking query strings, and click-tracking URLs
//! that wrap the product path in a redirect parameter. All three collapse
//! to `<origin><marker><rest of path>`.

use std::borrow::Cow;

use crate::config::SiteConfig;
use crate::models::ProductIdentifier;

#[derive(Debug, Clone)]
pub struct LinkNormalizer {
    origin: String,
    marker: String,
    redirect_param: String,
}

impl LinkNormalizer {
    pub fn new(
        origin: impl Into<String>,
        marker: impl Into<String>,
        redirect_param: impl Into<String>,
    ) -> Self {
        Self {
            origin: origin.into().trim_end_matches('/').to_string(),
            marker: marker.into(),
            redirect_param: redirect_param.into(),
        }
    }

    pub fn from_config(site: &SiteConfig) -> Self {
        Self::new(&site.origin, &site.product_marker, &site.redirect_param)
    }

    /// Returns `None` for anything that is not recognizably a product link.
    pub fn normalize(&self, raw_href: &str) -> Option<ProductIdentifier> {
        let href = raw_href.trim();
        if href.is_empty() {
            return None;
        }

        let decoded = urlencoding::decode(href).ok()?;
        if let Some(identifier) = self.canonicalize(&decoded) {
            return Some(identifier);
        }

        // One level of indirection: the product path hides in a redirect
        // parameter that was encoded twice.
        let redirect = self.redirect_target(href)?;
        let redirect = urlencoding::decode(&redirect).ok()?;
        self.canonicalize(&redirect)
    }

    fn canonicalize(&self, decoded: &str) -> Option<ProductIdentifier> {
        let start = decoded.find(&self.marker)?;
        let path = &decoded[start..];
        // A marker inside a query string belongs to a tracking wrapper whose
        // own parameters follow it.
        let end = if decoded[..start].contains('?') {
            path.find(['?', '#', '&'])
        } else {
            path.find(['?', '#'])
        }
        .unwrap_or(path.len());
        let path = &path[..end];
        if path.len() <= self.marker.len() {
            return None;
        }
        // Decoded percent signs are re-escaped so a second pass decodes to
        // the same path.
        let path = path.replace('%', "%25");
        Some(ProductIdentifier::new(format!("{}{}", self.origin, path)))
    }

    fn redirect_target(&self, href: &str) -> Option<String> {
        let (_, query) = href.split_once('?')?;
        let query = query.split('#').next().unwrap_or(query);
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == self.redirect_param.as_str())
            .map(|(_, value)| Cow::into_owned(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn normalizer() -> LinkNormalizer {
        LinkNormalizer::new("https://www.walmart.com", "/ip/", "rd")
    }

    #[rstest]
    #[case("https://www.walmart.com/ip/Acme-Kettle/123456")]
    #[case("https://www.walmart.com/ip/Acme-Kettle/123456?classType=REGULAR&athbdg=L1600")]
    #[case("/ip/Acme-Kettle/123456?from=/search")]
    #[case("https://www.walmart.com/ip/Acme-Kettle/123456#customer-reviews")]
    #[case("https%3A%2F%2Fwww.walmart.com%2Fip%2FAcme-Kettle%2F123456%3Fsid%3Dabc")]
    #[case("https://www.walmart.com/sp/track?bt=1&rd=https%3A%2F%2Fwww.walmart.com%2Fip%2FAcme-Kettle%2F123456%3Fadid%3D22")]
    #[case("/sp/track?rd=https%253A%252F%252Fwww.walmart.com%252Fip%252FAcme-Kettle%252F123456%253Fadid%253D22&x=1")]
    #[case("https://www.walmart.com/sp/track?bt=1&rd=https%3A%2F%2Fwww.walmart.com%2Fip%2FAcme-Kettle%2F123456&adUid=aaa")]
    #[case("https://www.walmart.com/sp/track?bt=1&rd=https%3A%2F%2Fwww.walmart.com%2Fip%2FAcme-Kettle%2F123456&adUid=bbb#top")]
    fn test_same_item_normalizes_identically(#[case] href: &str) {
        let identifier = normalizer().normalize(href).expect("product link");
        assert_eq!(identifier.as_str(), "https://www.walmart.com/ip/Acme-Kettle/123456");
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("https://www.walmart.com/browse/home/4044")]
    #[case("https://www.walmart.com/sp/track?rd=https%3A%2F%2Fwww.walmart.com%2Fcp%2Fdeals")]
    #[case("https://www.walmart.com/ip/")]
    #[case("https://www.walmart.com/ip/?q=1")]
    #[case("javascript:void(0)")]
    fn test_non_product_links_are_excluded(#[case] href: &str) {
        assert_eq!(normalizer().normalize(href), None);
    }

    #[test]
    fn test_invalid_percent_encoding_is_excluded() {
        // %FF decodes to a lone byte that is not valid UTF-8.
        assert_eq!(normalizer().normalize("/ip/Kettle%FF/1"), None);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let n = normalizer();
        let hrefs = [
            "/ip/Acme-Kettle/123456?from=/search",
            "https://www.walmart.com/sp/track?rd=https%3A%2F%2Fwww.walmart.com%2Fip%2FSofa%2F9%3Fa%3Db",
            "https://www.walmart.com/ip/Two%20Words/77?x=y",
            "/ip/50%2541-Cotton/1",
        ];
        for href in hrefs {
            let once = n.normalize(href).unwrap();
            let twice = n.normalize(once.as_str()).unwrap();
            assert_eq!(once, twice, "not idempotent for {}", href);
        }
    }

    #[test]
    fn test_decoded_percent_sign_is_escaped() {
        assert_eq!(
            normalizer().normalize("/ip/50%2541-Cotton/1").unwrap().as_str(),
            "https://www.walmart.com/ip/50%2541-Cotton/1"
        );
    }

    #[test]
    fn test_query_suffix_is_irrelevant() {
        let n = normalizer();
        let base = "https://www.walmart.com/ip/Camp-Chair/5551";
        for suffix in ["?a=1", "?", "?rd=/ip/Other/2", "?athcpid=x&athpgid=y"] {
            assert_eq!(n.normalize(&format!("{}{}", base, suffix)), n.normalize(base));
        }
    }

    #[test]
    fn test_origin_trailing_slash_is_trimmed() {
        let n = LinkNormalizer::new("https://www.walmart.com/", "/ip/", "rd");
        assert_eq!(
            n.normalize("/ip/Lamp/42").unwrap().as_str(),
            "https://www.walmart.com/ip/Lamp/42"
        );
    }
}
