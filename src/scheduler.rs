use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::database::Database;
use crate::models::{Session, SessionState, filter_by_locations};
use crate::plugins::traits::notifier::failure_message;
use crate::plugins::{Notifier, SyncSummary};
use crate::sync::{ListingDiff, SyncEngine};
use crate::utils::error::{AppError, Result};

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The previous tick was still running
    pub skipped: bool,
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Picks due sessions and runs the sync pipeline for each of them.
pub struct SyncWorker {
    db: Database,
    engine: Arc<SyncEngine>,
    notifier: Arc<dyn Notifier>,
    liveness_notifications: i64,
    cancel: CancellationToken,
    tick_guard: Arc<Mutex<()>>,
}

impl SyncWorker {
    pub fn new(
        db: Database,
        engine: Arc<SyncEngine>,
        notifier: Arc<dyn Notifier>,
        config: &SchedulerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            db,
            engine,
            notifier,
            liveness_notifications: config.liveness_notifications,
            cancel,
            tick_guard: Arc::new(Mutex::new(())),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run one scheduling pass at `now`.
    ///
    /// Due sessions are processed one after another in user id order. A
    /// failing session is logged and reported to its user, and the pass moves
    /// on. A pass that starts while another is still running does nothing.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let Ok(_guard) = Arc::clone(&self.tick_guard).try_lock_owned() else {
            tracing::debug!("Previous tick still running, skipping");
            return Ok(TickReport {
                skipped: true,
                ..TickReport::default()
            });
        };

        let repository = self.db.sessions();
        let sessions = repository.list(true).await?;
        let due: Vec<Session> = sessions
            .into_iter()
            .filter(|session| match session.state(now) {
                SessionState::Due => true,
                SessionState::Dnd => {
                    tracing::debug!("User {}: inside do-not-disturb window", session.user_id);
                    false
                }
                SessionState::Inactive | SessionState::NotDue => false,
            })
            .collect();

        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };

        for session in due {
            if self.cancel.is_cancelled() {
                tracing::info!("Shutdown requested, leaving tick early");
                break;
            }

            match self.process_session(session, now, false).await {
                Ok(_) => report.succeeded += 1,
                Err(_) => report.failed += 1,
            }
        }

        Ok(report)
    }

    /// Sync one user right away and always report the outcome.
    pub async fn sync_now(&self, user_id: i64) -> Result<ListingDiff> {
        let session = self
            .db
            .sessions()
            .get(user_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("session for user {}", user_id)))?;

        self.process_session(session, Utc::now(), true).await
    }

    async fn process_session(
        &self,
        session: Session,
        now: DateTime<Utc>,
        forced: bool,
    ) -> Result<ListingDiff> {
        let user_id = session.user_id;
        let repository = self.db.sessions();

        // Step 1: record the attempt first, so a failing sync also waits a full interval.
        // Step 2: run the pipeline. Either step failing is reported the same way.
        let (session, outcome) = match repository.record_sync_attempt(user_id, now).await {
            Ok(stamped) => {
                let outcome = self.run_pipeline(&stamped).await;
                (stamped, outcome)
            }
            Err(e) => (session, Err(e)),
        };

        let delta = match outcome {
            Ok(delta) => delta,
            Err(AppError::Cancelled) => {
                tracing::info!("User {}: sync cancelled", user_id);
                return Err(AppError::Cancelled);
            }
            Err(e) => {
                tracing::error!("User {}: sync failed: {}", user_id, e);
                metrics::counter!("listing_watch_syncs_total", "outcome" => "failed").increment(1);
                self.notify(&session, &failure_message(&e), false).await;
                return Err(e);
            }
        };
        metrics::counter!("listing_watch_syncs_total", "outcome" => "succeeded").increment(1);

        // Step 3: decide whether the user hears about it
        let added = filter_by_locations(&delta.added, &session.regions, &session.cities);
        let removed_count = filter_by_locations(&delta.removed, &session.regions, &session.cities).len();

        let liveness = session.sync_count_since_last_change <= self.liveness_notifications;
        if !added.is_empty() || liveness || forced {
            let summary = SyncSummary {
                added: added.into_iter().cloned().collect(),
                removed_count,
                total_count: delta.added.len() + delta.leftover.len(),
            };
            self.notify(&session, &summary.to_markdown(), true).await;
        }

        Ok(delta)
    }

    async fn run_pipeline(&self, session: &Session) -> Result<ListingDiff> {
        let query = self
            .db
            .search_queries()
            .get(session.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("search query, set one before syncing"))?;

        self.engine.run(&self.cancel, session.user_id, &query.raw_url).await
    }

    async fn notify(&self, session: &Session, text: &str, rich_formatting: bool) {
        match self
            .notifier
            .send_message(session.chat_id, session.user_id, text, rich_formatting)
            .await
        {
            Ok(()) => {
                metrics::counter!("listing_watch_notifications_total", "outcome" => "sent").increment(1);
            }
            Err(e) => {
                metrics::counter!("listing_watch_notifications_total", "outcome" => "failed").increment(1);
                tracing::warn!("User {}: failed to send notification: {}", session.user_id, e);
            }
        }
    }
}

/// Drives [`SyncWorker::run_tick`] on a fixed interval.
pub struct SessionScheduler {
    scheduler: JobScheduler,
    worker: Arc<SyncWorker>,
    config: SchedulerConfig,
}

impl SessionScheduler {
    pub async fn new(worker: Arc<SyncWorker>, config: SchedulerConfig) -> Result<Self> {
        let scheduler = JobScheduler::new().await.map_err(scheduler_error)?;

        Ok(Self {
            scheduler,
            worker,
            config,
        })
    }

    pub async fn start(&mut self) -> Result<()> {
        let worker = Arc::clone(&self.worker);
        let interval = Duration::from_secs(self.config.tick_interval_secs);

        let job = Job::new_repeated_async(interval, move |_uuid, _l| {
            Box::pin(tick_job(Arc::clone(&worker)))
        })
        .map_err(scheduler_error)?;

        self.scheduler.add(job).await.map_err(scheduler_error)?;
        self.scheduler.start().await.map_err(scheduler_error)?;
        tracing::info!("Session scheduler started, ticking every {:?}", interval);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        // Abort fetches still in flight
        self.worker.cancel_token().cancel();

        self.scheduler.shutdown().await.map_err(scheduler_error)?;
        tracing::info!("Session scheduler shutdown");
        Ok(())
    }
}

/// One scheduled tick. The future owns its worker handle and runs on the
/// scheduler's tasks, hence the `Send + 'static` bound.
fn tick_job(worker: Arc<SyncWorker>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        match worker.run_tick(Utc::now()).await {
            Ok(report) if report.due > 0 => {
                tracing::info!(
                    "Tick finished: {} due, {} succeeded, {} failed",
                    report.due,
                    report.succeeded,
                    report.failed
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!("Tick failed: {}", e),
        }
    }
}

fn scheduler_error(e: tokio_cron_scheduler::JobSchedulerError) -> AppError {
    AppError::Internal(format!("scheduler: {}", e))
}
