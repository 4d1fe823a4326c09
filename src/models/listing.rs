use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::utils::text::escape_markdown_v2;

/// A pointer to a detail page, as found on a search-result page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingReference {
    pub url: String,
    // Display only
    pub position: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct ListingRecord {
    pub id: String,
    pub user_id: i64,
    pub url: String,
    pub name: String,
    pub description: String,
    pub street: String,
    pub locality: String,
    pub region: String,
    pub price_currency: String,
    pub price: f64,
    pub image_url: String,

    // Set by the sync that inserted the row, cleared by the next one that sees it again
    pub is_new: bool,
    pub created_at: DateTime<Utc>,
}

impl Default for ListingRecord {
    fn default() -> Self {
        Self {
            id: String::new(),
            user_id: 0,
            url: String::new(),
            name: String::new(),
            description: String::new(),
            street: String::new(),
            locality: String::new(),
            region: String::new(),
            price_currency: String::new(),
            price: 0.0,
            image_url: String::new(),
            is_new: false,
            created_at: Utc::now(),
        }
    }
}

impl ListingRecord {
    /// Whether the record lies in one of the allowed regions or cities.
    ///
    /// Matching is case-insensitive. Empty allow-lists mean no restriction,
    /// and when both lists are set a match on either is enough.
    pub fn matches_locations(&self, regions: &[String], cities: &[String]) -> bool {
        if regions.is_empty() && cities.is_empty() {
            return true;
        }

        let in_region = regions.iter().any(|r| r.eq_ignore_ascii_case(&self.region));
        let in_city = cities.iter().any(|c| c.eq_ignore_ascii_case(&self.locality));

        in_region || in_city
    }

    /// One MarkdownV2 line for chat output.
    pub fn to_markdown_line(&self) -> String {
        let title = if self.name.is_empty() {
            self.street.as_str()
        } else {
            self.name.as_str()
        };
        let marker = if self.is_new { "🆕 " } else { "" };

        format!(
            "{}[{}]({}) \\- {} {}, {}\n",
            marker,
            escape_markdown_v2(title),
            self.url.replace(')', "%29").replace('\\', "%5C"),
            escape_markdown_v2(&self.price_currency),
            escape_markdown_v2(&format!("{:.0}", self.price)),
            escape_markdown_v2(&self.locality),
        )
    }
}

pub fn filter_by_locations<'a>(
    records: &'a [ListingRecord],
    regions: &[String],
    cities: &[String],
) -> Vec<&'a ListingRecord> {
    records
        .iter()
        .filter(|r| r.matches_locations(regions, cities))
        .collect()
}

/// Most expensive first.
pub fn sort_by_price_desc(records: &mut [ListingRecord]) {
    records.sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap_or(Ordering::Equal));
}
