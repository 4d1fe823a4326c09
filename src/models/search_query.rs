use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use url::Url;

use crate::utils::error::{AppError, Result};

/// Query parameter carrying the 1-based result page number.
pub const PAGE_QUERY_PARAM: &str = "search_result";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct SearchQuery {
    pub user_id: i64,
    pub raw_url: String,
    pub updated_at: DateTime<Utc>,
}

impl SearchQuery {
    pub fn new(user_id: i64, raw_url: impl Into<String>) -> Self {
        Self {
            user_id,
            raw_url: raw_url.into(),
            updated_at: Utc::now(),
        }
    }

    pub fn page_url(&self, page: u32) -> Result<Url> {
        page_url(&self.raw_url, page)
    }
}

/// URL of the given result page, replacing any page parameter already present.
pub fn page_url(search_url: &str, page: u32) -> Result<Url> {
    let mut url = Url::parse(search_url)?;
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != PAGE_QUERY_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair(PAGE_QUERY_PARAM, &page.to_string());

    Ok(url)
}

/// Accept only http(s) URLs on the configured site.
pub fn validate_search_url(raw: &str, allowed_host_suffix: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::Validation(format!(
            "unsupported URL scheme: {}",
            url.scheme()
        )));
    }

    let host = url.host_str().unwrap_or_default();
    let suffix = allowed_host_suffix.trim_start_matches('.');
    if host != suffix && !host.ends_with(&format!(".{}", suffix)) {
        return Err(AppError::Validation(format!(
            "search URL must point to {}",
            allowed_host_suffix
        )));
    }

    Ok(url)
}
