//! Listing synchronization pipeline: crawl, detail fetch, diff and persist.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::ScraperConfig;
use crate::database::ListingRepository;
use crate::scraper::HtmlFetcher;
use crate::utils::error::{AppError, Result};

pub mod diff;
pub mod fetcher;
pub mod paginator;
pub mod throttle;

pub use diff::{ListingDiff, diff};
pub use fetcher::DetailFetcher;
pub use paginator::Paginator;
pub use throttle::Throttle;

/// Throttled, cancellable page download decoded as text.
pub(crate) async fn fetch_html(
    fetcher: &dyn HtmlFetcher,
    throttle: &Throttle,
    cancel: &CancellationToken,
    url: &str,
) -> Result<String> {
    throttle.wait(cancel).await?;

    let body = tokio::select! {
        _ = cancel.cancelled() => return Err(AppError::Cancelled),
        body = fetcher.get_html_content(url) => body?,
    };

    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Runs one full sync cycle for a user.
pub struct SyncEngine {
    paginator: Paginator,
    details: DetailFetcher,
    listings: ListingRepository,
}

impl SyncEngine {
    pub fn new(
        fetcher: Arc<dyn HtmlFetcher>,
        listings: ListingRepository,
        config: &ScraperConfig,
    ) -> Self {
        let throttle = Arc::new(Throttle::new(Duration::from_millis(config.request_delay_ms)));

        Self {
            paginator: Paginator::new(fetcher.clone(), throttle.clone(), config),
            details: DetailFetcher::new(fetcher, throttle, config),
            listings,
        }
    }

    /// Crawl `search_url`, resolve every listing and replace the user's
    /// stored snapshot with what was found. Returns the applied delta.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        user_id: i64,
        search_url: &str,
    ) -> Result<ListingDiff> {
        // Step 1: collect references from every result page
        let refs = self.paginator.crawl(cancel, search_url).await?;
        tracing::info!("User {}: found {} listing references", user_id, refs.len());

        // Step 2: resolve details
        let records = self.details.fetch_all(cancel, &refs).await?;

        // Step 3: diff against the stored snapshot and persist
        let delta = self.listings.sync_snapshot(user_id, &records).await?;

        metrics::counter!("listing_watch_listings_added_total").increment(delta.added.len() as u64);
        metrics::counter!("listing_watch_listings_removed_total").increment(delta.removed.len() as u64);
        tracing::info!(
            "User {}: sync applied, {} added, {} removed, {} unchanged",
            user_id,
            delta.added.len(),
            delta.removed.len(),
            delta.leftover.len()
        );

        Ok(delta)
    }
}
