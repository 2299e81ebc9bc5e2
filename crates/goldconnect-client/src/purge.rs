//! Data retention.
//!
//! [`Purger::purge_all`] wipes every top-level collection and every blob
//! under `uploads/`. [`PurgeScheduler`] runs it once at startup when the
//! last run is too old, then on a fixed interval for the life of the
//! process.

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture, FutureExt};
use goldconnect_shared::constants::{LAST_PURGE_SETTING, PURGED_COLLECTIONS, UPLOADS_ROOT};
use goldconnect_store::{BlobStore, Database, DocumentStore, Query, StoreError, WriteBatch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::error::{ClientError, Result};

/// What one purge run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub documents_deleted: usize,
    pub blobs_deleted: usize,
    /// One line per failed listing, batch or deletion.
    pub failures: Vec<String>,
}

impl PurgeReport {
    fn merge(&mut self, other: PurgeReport) {
        self.documents_deleted += other.documents_deleted;
        self.blobs_deleted += other.blobs_deleted;
        self.failures.extend(other.failures);
    }
}

#[derive(Clone)]
pub struct Purger {
    store: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
}

impl Purger {
    pub fn new(store: Arc<dyn DocumentStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { store, blobs }
    }

    /// Delete every document and every blob.
    ///
    /// Each collection is cleared in its own batch, so a failure leaves the
    /// others cleared. Any failure makes the run a
    /// [`ClientError::PartialPurge`] carrying the full report.
    pub async fn purge_all(&self) -> Result<PurgeReport> {
        info!("purge started");
        let mut report = PurgeReport::default();

        for collection in PURGED_COLLECTIONS {
            match self.purge_collection(collection).await {
                Ok(n) => report.documents_deleted += n,
                Err(e) => {
                    warn!(collection, error = %e, "failed to purge collection");
                    report.failures.push(format!("{collection}: {e}"));
                }
            }
        }

        report.merge(self.purge_folder(UPLOADS_ROOT.to_string()).await);

        if report.failures.is_empty() {
            info!(
                documents = report.documents_deleted,
                blobs = report.blobs_deleted,
                "purge finished"
            );
            Ok(report)
        } else {
            error!(
                failed = report.failures.len(),
                documents = report.documents_deleted,
                blobs = report.blobs_deleted,
                "purge incomplete"
            );
            Err(ClientError::PartialPurge {
                failed: report.failures.len(),
                report,
            })
        }
    }

    async fn purge_collection(&self, collection: &str) -> std::result::Result<usize, StoreError> {
        let docs = self.store.query(&Query::collection(collection)).await?;
        if docs.is_empty() {
            return Ok(0);
        }
        let mut batch = WriteBatch::new();
        for doc in &docs {
            batch.delete(collection, &doc.id);
        }
        self.store.commit(batch).await?;
        Ok(docs.len())
    }

    /// Sub-folders first, then the folder's own objects, all deletions of
    /// one level running concurrently.
    fn purge_folder(&self, prefix: String) -> BoxFuture<'_, PurgeReport> {
        async move {
            let mut report = PurgeReport::default();
            let listing = match self.blobs.list(&prefix).await {
                Ok(listing) => listing,
                Err(e) => {
                    warn!(prefix = %prefix, error = %e, "failed to list blobs");
                    report.failures.push(format!("{prefix}: {e}"));
                    return report;
                }
            };

            for nested in join_all(listing.prefixes.into_iter().map(|p| self.purge_folder(p))).await {
                report.merge(nested);
            }

            let deletions = listing.items.iter().map(|path| async move {
                (path, self.blobs.delete(path).await)
            });
            for (path, result) in join_all(deletions).await {
                match result {
                    Ok(()) => report.blobs_deleted += 1,
                    Err(e) => {
                        warn!(path = %path, error = %e, "failed to delete blob");
                        report.failures.push(format!("{path}: {e}"));
                    }
                }
            }
            report
        }
        .boxed()
    }
}

static SCHEDULER_STARTED: OnceLock<()> = OnceLock::new();

/// Shortest retention interval the scheduler accepts.
pub const MIN_RETENTION_INTERVAL: Duration = Duration::from_secs(1);
/// Longest retention interval the scheduler accepts (one year).
pub const MAX_RETENTION_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Process-wide retention timer.
///
/// Start it exactly once with [`PurgeScheduler::init`]. There is no stop or
/// restart.
pub struct PurgeScheduler {
    purger: Purger,
    settings: Arc<Mutex<Database>>,
    interval: Duration,
}

impl PurgeScheduler {
    /// `interval` is clamped to
    /// [`MIN_RETENTION_INTERVAL`]..=[`MAX_RETENTION_INTERVAL`].
    pub fn new(purger: Purger, settings: Arc<Mutex<Database>>, interval: Duration) -> Self {
        let clamped = interval.clamp(MIN_RETENTION_INTERVAL, MAX_RETENTION_INTERVAL);
        if clamped != interval {
            warn!(
                requested_secs = interval.as_secs(),
                interval_secs = clamped.as_secs(),
                "retention interval out of range, clamped"
            );
        }
        Self {
            purger,
            settings,
            interval: clamped,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Purge now if overdue, then keep purging every interval.
    ///
    /// Fails with [`ClientError::AlreadyStarted`] on any call after the first
    /// in this process.
    pub async fn init(self) -> Result<()> {
        if SCHEDULER_STARTED.set(()).is_err() {
            return Err(ClientError::AlreadyStarted);
        }
        self.start().await;
        Ok(())
    }

    pub(crate) async fn start(self) {
        info!(interval_secs = self.interval.as_secs(), "retention scheduler starting");
        match self.is_overdue(Utc::now()) {
            Ok(true) => self.run_once().await,
            Ok(false) => {}
            Err(e) => warn!(error = %e, "could not read last purge time"),
        }

        tokio::spawn(async move {
            let now = Instant::now();
            let first = now.checked_add(self.interval).unwrap_or(now);
            let mut ticker = interval_at(first, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        });
    }

    pub fn last_purge(&self) -> Result<Option<DateTime<Utc>>> {
        let db = self.settings()?;
        Ok(db.get_timestamp(LAST_PURGE_SETTING)?)
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> Result<bool> {
        Ok(match self.last_purge()? {
            None => true,
            Some(last) => now
                .signed_duration_since(last)
                .to_std()
                .map(|elapsed| elapsed >= self.interval)
                .unwrap_or(false),
        })
    }

    /// Purge and record the time, whatever the outcome. The next tick
    /// retries anything left behind.
    async fn run_once(&self) {
        if let Err(e) = self.purger.purge_all().await {
            warn!(error = %e, "scheduled purge did not complete");
        }
        if let Err(e) = self.record(Utc::now()) {
            error!(error = %e, "failed to persist last purge time");
        }
    }

    fn record(&self, at: DateTime<Utc>) -> Result<()> {
        let db = self.settings()?;
        db.put_timestamp(LAST_PURGE_SETTING, at)?;
        Ok(())
    }

    fn settings(&self) -> Result<std::sync::MutexGuard<'_, Database>> {
        self.settings
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Lock poisoned: {e}")).into())
    }
}
