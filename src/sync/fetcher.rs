use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;

use crate::config::ScraperConfig;
use crate::extractor::extract_detail;
use crate::models::{ListingRecord, ListingReference};
use crate::scraper::HtmlFetcher;
use crate::sync::fetch_html;
use crate::sync::throttle::Throttle;
use crate::utils::error::{AppError, Result};

/// Resolves listing references into full records under a bounded worker count.
pub struct DetailFetcher {
    fetcher: Arc<dyn HtmlFetcher>,
    throttle: Arc<Throttle>,
    concurrency: usize,
}

impl DetailFetcher {
    pub fn new(fetcher: Arc<dyn HtmlFetcher>, throttle: Arc<Throttle>, config: &ScraperConfig) -> Self {
        Self {
            fetcher,
            throttle,
            concurrency: config.max_concurrent_fetches.max(1),
        }
    }

    /// Fetch every detail page.
    ///
    /// The first fetch error fails the batch and drops the requests still in
    /// flight. Pages without usable listing data are skipped.
    pub async fn fetch_all(
        &self,
        cancel: &CancellationToken,
        refs: &[ListingReference],
    ) -> Result<Vec<ListingRecord>> {
        // Each request owns its handles, nothing borrowed is held across awaits
        let results: Vec<Option<ListingRecord>> = stream::iter(refs.iter().cloned())
            .map(|reference| {
                let fetcher = Arc::clone(&self.fetcher);
                let throttle = Arc::clone(&self.throttle);
                let cancel = cancel.clone();
                async move { fetch_one(fetcher, throttle, cancel, reference).await }
            })
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        let records: Vec<ListingRecord> = results.into_iter().flatten().collect();
        tracing::debug!("Fetched {} of {} detail pages", records.len(), refs.len());
        Ok(records)
    }
}

/// Records are keyed by the result-page url, never by the url a page reports.
async fn fetch_one(
    fetcher: Arc<dyn HtmlFetcher>,
    throttle: Arc<Throttle>,
    cancel: CancellationToken,
    reference: ListingReference,
) -> Result<Option<ListingRecord>> {
    let html = fetch_html(fetcher.as_ref(), &throttle, &cancel, &reference.url).await?;
    metrics::counter!("listing_watch_details_fetched_total").increment(1);

    match extract_detail(&html) {
        Ok(record) => Ok(Some(ListingRecord {
            url: reference.url,
            ..record
        })),
        Err(AppError::Extraction(message)) => {
            tracing::warn!("Skipping listing {}: {}", reference.url, message);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
