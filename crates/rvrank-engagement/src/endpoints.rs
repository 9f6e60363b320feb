use crate::error::EngagementError;

pub const DEFAULT_BASE_URL: &str = "https://www.rvtrader.com";

// The endpoint expects this literal value; it is what the site's own
// frontend sends.
const REALM_QUERY: &str = "realmId=%5Bobject%20Object%5D";

/// The two per-listing engagement counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatEndpoint {
    Views,
    Saves,
}

impl StatEndpoint {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Views => "/gettiledata/addetail_listingstats/showadviewsstats",
            Self::Saves => "/gettiledata/addetail_listingstats/showsavedadsstats",
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Views => "views",
            Self::Saves => "saves",
        }
    }

    /// Full request URL for `listing_id` against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`EngagementError::InvalidUrl`] if the id is empty or contains
    /// anything other than ASCII letters, digits, `-` or `_`.
    pub fn url(self, base_url: &str, listing_id: &str) -> Result<String, EngagementError> {
        let valid = !listing_id.is_empty()
            && listing_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(EngagementError::InvalidUrl {
                url: format!("{base_url}{}", self.path()),
                reason: format!("invalid listing id {listing_id:?}"),
            });
        }
        Ok(format!(
            "{}{}?adId={listing_id}&{REALM_QUERY}",
            base_url.trim_end_matches('/'),
            self.path()
        ))
    }
}

impl std::fmt::Display for StatEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn views_url_matches_site_format() {
        let url = StatEndpoint::Views
            .url("https://www.rvtrader.com/", "5038221117")
            .unwrap();
        assert_eq!(
            url,
            "https://www.rvtrader.com/gettiledata/addetail_listingstats/showadviewsstats?adId=5038221117&realmId=%5Bobject%20Object%5D"
        );
    }

    #[test]
    fn saves_url_uses_saved_ads_path() {
        let url = StatEndpoint::Saves.url("http://127.0.0.1:9000", "42").unwrap();
        assert!(url.starts_with("http://127.0.0.1:9000/gettiledata/addetail_listingstats/showsavedadsstats?adId=42&"));
    }

    #[test]
    fn ids_that_would_alter_the_query_are_rejected() {
        for id in ["", "12&x=1", "12 34", "../12"] {
            let err = StatEndpoint::Views.url(DEFAULT_BASE_URL, id).unwrap_err();
            assert!(matches!(err, EngagementError::InvalidUrl { .. }), "{id:?}");
        }
    }
}
