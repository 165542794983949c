//! Concurrent execution of document actions.
//!
//! Every action of a batch runs as its own task; a semaphore bounds how many run at once.
//! Each task records its result in its own slot and counts down a latch sized to the batch.
//! The caller waits on the latch in `poll_interval` slices, logging progress after each, and
//! stops waiting once the latch opens or the optional `batch_timeout` elapses. Stopping the
//! wait never aborts tasks that are still running.
//!
//! After the wait every slot is read: results become outcomes or failures, and actions that
//! have not reported yet are failed with [`CouchError::Incomplete`].

use mea::{latch::Latch, mutex::Mutex};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::Semaphore,
    time::{Instant, timeout},
};
use tracing::{debug, info, warn};

use crate::{
    action::{Action, ActionId, ActionKind, ActionOutcome, BatchReport},
    config::ClientConfig,
    document::WriteResponse,
    error::{CouchError, CouchResult},
    probe::RevisionProber,
    serializer::SerializerExt,
    transport::{CouchRequest, Dispatcher},
    urls::{database_url, document_url},
};

const REFERER: &str = "Referer";
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

type Slot = Arc<Mutex<Option<CouchResult<ActionOutcome>>>>;

/// Counts the batch latch down when a task ends, including by panic.
struct Countdown(Arc<Latch>);

impl Drop for Countdown {
    fn drop(&mut self) {
        self.0.count_down();
    }
}

#[derive(Debug, Clone)]
pub struct ActionExecutor {
    dispatcher: Dispatcher,
    workers: Arc<Semaphore>,
    poll_interval: Duration,
    batch_timeout: Option<Duration>,
}

impl ActionExecutor {
    pub fn new(dispatcher: Dispatcher, config: &ClientConfig) -> Self {
        Self {
            dispatcher,
            workers: Arc::new(Semaphore::new(config.max_workers.max(1))),
            poll_interval: config.poll_interval.max(MIN_POLL_INTERVAL),
            batch_timeout: config.batch_timeout,
        }
    }

    /// Runs `actions` against `db_url` and fails with one [`CouchError::Batch`] owning every
    /// failure, if any action failed.
    pub async fn execute(&self, actions: Vec<Action>, db_url: &str) -> CouchResult<()> {
        self.run(actions, db_url).await?.into_result().map(|_| ())
    }

    /// Runs `actions` against `db_url` and reports every outcome and every failure.
    ///
    /// # Errors
    ///
    /// Fails only when the batch cannot be started at all; per-action failures are part of
    /// the report.
    pub async fn run(&self, actions: Vec<Action>, db_url: &str) -> CouchResult<BatchReport> {
        if actions.is_empty() {
            return Ok(BatchReport::default());
        }

        let total = actions.len();
        let count = u32::try_from(total).map_err(|_| {
            CouchError::Initialization(format!("A batch of {total} actions is too large"))
        })?;
        let db_url: Arc<str> = Arc::from(db_url);
        let latch = Arc::new(Latch::new(count));
        let mut slots: Vec<(ActionId, String, Slot)> = Vec::with_capacity(total);

        for action in actions {
            let slot: Slot = Arc::new(Mutex::new(None));
            slots.push((action.id(), action.document_id().to_string(), slot.clone()));

            let countdown = Countdown(latch.clone());
            let workers = self.workers.clone();
            let dispatcher = self.dispatcher.clone();
            let db_url = db_url.clone();

            tokio::spawn(async move {
                let _countdown = countdown;
                let result = match workers.acquire_owned().await {
                    Ok(_permit) => perform(&dispatcher, &db_url, &action).await,
                    Err(_) => Err(CouchError::Closed),
                };
                *slot.lock().await = Some(result);
            });
        }

        let completed = self.wait(&latch, total).await;
        if !completed {
            warn!(
                remaining = latch.count(),
                total,
                db = %db_url,
                "stopped waiting for batch; remaining actions keep running"
            );
        }

        let mut report = BatchReport::default();
        for (id, document_id, slot) in slots {
            match slot.lock().await.take() {
                Some(Ok(outcome)) => {
                    report.outcomes.insert(id, outcome);
                }
                Some(Err(err)) => report.failures.push(err),
                None => report.failures.push(CouchError::Incomplete {
                    action: id,
                    document_id,
                }),
            }
        }

        if !report.is_success() {
            warn!(
                failed = report.failures.len(),
                total,
                db = %db_url,
                "batch finished with failures"
            );
        }

        Ok(report)
    }

    /// Waits for the latch to open. Returns `false` when the batch timeout ended the wait.
    async fn wait(&self, latch: &Latch, total: usize) -> bool {
        let started = Instant::now();

        loop {
            let slice = match self.batch_timeout {
                Some(limit) => {
                    let elapsed = started.elapsed();
                    if elapsed >= limit {
                        return false;
                    }
                    self.poll_interval.min(limit - elapsed)
                }
                None => self.poll_interval,
            };

            if timeout(slice, latch.wait()).await.is_ok() {
                return true;
            }

            info!(remaining = latch.count(), total, "waiting for batch actions");
        }
    }
}

/// Performs one action: the HTTP exchange and, for skip-if-exists stores and deletes
/// without a revision, the probe that precedes it.
pub(crate) async fn perform(
    dispatcher: &Dispatcher,
    db_url: &str,
    action: &Action,
) -> CouchResult<ActionOutcome> {
    let prober = RevisionProber::new(dispatcher.clone());

    match action.kind() {
        ActionKind::Store { skip_if_exists } => {
            if skip_if_exists
                && prober
                    .current_revision(action.document_id(), db_url)
                    .await?
                    .is_some()
            {
                debug!(document = action.document_id(), "document exists, skipping store");
                return Ok(ActionOutcome::Skipped {
                    document_id: action.document_id().to_string(),
                });
            }
            store(dispatcher, db_url, action).await
        }
        ActionKind::Delete => {
            let revision = match action.revision() {
                Some(revision) => revision.to_string(),
                None => match prober.current_revision(action.document_id(), db_url).await? {
                    Some(revision) => revision,
                    None => {
                        debug!(document = action.document_id(), "document absent, skipping delete");
                        return Ok(ActionOutcome::Skipped {
                            document_id: action.document_id().to_string(),
                        });
                    }
                },
            };
            delete(dispatcher, db_url, action.document_id(), &revision).await
        }
    }
}

async fn store(
    dispatcher: &Dispatcher,
    db_url: &str,
    action: &Action,
) -> CouchResult<ActionOutcome> {
    let body = action.body().ok_or_else(|| {
        CouchError::Serialization(format!(
            "Store of document {} has no body",
            action.document_id()
        ))
    })?;
    let serializer = dispatcher.serializer();
    let request = CouchRequest::post(database_url(db_url)?)
        .with_header(REFERER, db_url)
        .with_body(serializer.content_type(), serializer.serialize(body)?);

    let response = dispatcher
        .execute_expect_status(request, 201, "Failed to store document")
        .await?;

    // The write is committed at this point; an unreadable body only loses the new revision.
    let revision = serializer
        .decode::<WriteResponse>(&response.body)
        .ok()
        .and_then(|written| written.rev);

    debug!(document = action.document_id(), revision = ?revision, "stored document");
    Ok(ActionOutcome::Stored {
        document_id: action.document_id().to_string(),
        revision,
    })
}

async fn delete(
    dispatcher: &Dispatcher,
    db_url: &str,
    document_id: &str,
    revision: &str,
) -> CouchResult<ActionOutcome> {
    let url = document_url(db_url, document_id, Some(revision))?;
    dispatcher
        .execute_expect_status(CouchRequest::delete(url), 200, "Failed to delete document")
        .await?;

    debug!(document = document_id, revision, "deleted document");
    Ok(ActionOutcome::Deleted {
        document_id: document_id.to_string(),
    })
}
