use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ScraperConfig;
use crate::extractor::{PageExtraction, extract_page};
use crate::models::{ListingReference, page_url};
use crate::scraper::HtmlFetcher;
use crate::sync::fetch_html;
use crate::sync::throttle::Throttle;
use crate::utils::error::Result;

/// Walks the result pages of one search query.
pub struct Paginator {
    fetcher: Arc<dyn HtmlFetcher>,
    throttle: Arc<Throttle>,
    max_pages: u32,
    empty_page_confirmations: u32,
}

impl Paginator {
    pub fn new(fetcher: Arc<dyn HtmlFetcher>, throttle: Arc<Throttle>, config: &ScraperConfig) -> Self {
        Self {
            fetcher,
            throttle,
            max_pages: config.max_pages,
            empty_page_confirmations: config.empty_page_confirmations,
        }
    }

    /// Collect references page by page until a page yields nothing new.
    pub async fn crawl(
        &self,
        cancel: &CancellationToken,
        search_url: &str,
    ) -> Result<Vec<ListingReference>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut refs = Vec::new();

        for page in 1..=self.max_pages {
            let extraction = self.fetch_page(cancel, search_url, page).await?;

            let fresh: Vec<ListingReference> = extraction
                .refs
                .into_iter()
                .filter(|r| seen.insert(r.url.clone()))
                .collect();

            if fresh.is_empty() {
                tracing::debug!(
                    "Crawl of {} finished at page {} with {} references",
                    search_url,
                    page,
                    refs.len()
                );
                return Ok(refs);
            }

            refs.extend(fresh);
        }

        tracing::warn!(
            "Crawl of {} stopped at the {} page cap with {} references",
            search_url,
            self.max_pages,
            refs.len()
        );
        Ok(refs)
    }

    async fn fetch_page(
        &self,
        cancel: &CancellationToken,
        search_url: &str,
        page: u32,
    ) -> Result<PageExtraction> {
        let url = page_url(search_url, page)?;

        let mut attempt = 0;
        loop {
            let html = fetch_html(self.fetcher.as_ref(), &self.throttle, cancel, url.as_str()).await?;
            metrics::counter!("listing_watch_pages_fetched_total").increment(1);

            let extraction = extract_page(&html)?;
            if !extraction.is_end_of_results || attempt >= self.empty_page_confirmations {
                return Ok(extraction);
            }

            attempt += 1;
            tracing::debug!("Page {} of {} came back empty, confirming ({})", page, search_url, attempt);
        }
    }
}
