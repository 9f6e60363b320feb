use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::search::SearchContext;

/// A marketplace listing normalized from one search-results page.
///
/// `rank` is [`ListingRecord::UNRANKED`] until the collector merges the
/// listing into its context's ranking; after that it is the 1-based position
/// within `context` and is not changed again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub rank: u32,
    /// Marketplace ad id, stored as a string to avoid precision loss.
    pub id: String,
    pub context: SearchContext,
    /// Lower price bound of the query band this listing was fetched through.
    pub price_band_min: Option<u64>,
    /// Upper price bound of the query band; `None` when unbounded.
    pub price_band_max: Option<u64>,

    pub dealer_id: Option<String>,
    pub dealer_name: Option<String>,
    /// First number from the dealer's phone list.
    pub dealer_phone: Option<String>,

    pub year: Option<i32>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub trim: Option<String>,
    pub class: Option<String>,
    pub condition: Option<String>,
    pub length: Option<String>,
    pub mileage: Option<u64>,

    pub price: Option<Decimal>,
    pub msrp: Option<Decimal>,

    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,

    pub photo_count: u32,
    pub floorplan_id: Option<String>,
    pub created_at: Option<String>,

    pub relevance_score: Option<f64>,
    pub merch_score: Option<f64>,
    pub is_premium: bool,
    pub is_top_premium: bool,
    pub badge_status: Option<String>,

    pub listing_url: Option<String>,
}

impl ListingRecord {
    pub const UNRANKED: u32 = 0;

    /// Creates an unranked record carrying only its identity; every
    /// descriptive field starts empty.
    #[must_use]
    pub fn new(id: &str, context: SearchContext) -> Self {
        Self {
            rank: Self::UNRANKED,
            id: id.to_owned(),
            context,
            price_band_min: None,
            price_band_max: None,
            dealer_id: None,
            dealer_name: None,
            dealer_phone: None,
            year: None,
            make: None,
            model: None,
            trim: None,
            class: None,
            condition: None,
            length: None,
            mileage: None,
            price: None,
            msrp: None,
            city: None,
            state: None,
            zip_code: None,
            photo_count: 0,
            floorplan_id: None,
            created_at: None,
            relevance_score: None,
            merch_score: None,
            is_premium: false,
            is_top_premium: false,
            badge_status: None,
            listing_url: None,
        }
    }

    #[must_use]
    pub fn is_ranked(&self) -> bool {
        self.rank != Self::UNRANKED
    }

    #[must_use]
    pub fn has_floorplan(&self) -> bool {
        self.floorplan_id.is_some()
    }
}
