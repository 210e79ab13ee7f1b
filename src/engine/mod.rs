mod availability;
mod conflict;
mod editor;
mod error;
mod journey;
mod mutations;
mod queries;
mod store;
#[cfg(test)]
mod tests;

pub use availability::{potential_slots, resolve, taken_slots};
pub use conflict::{local_now, recompute_client_status};
pub use editor::EditOutcome;
pub use error::{EngineError, ErrorKind};
pub use journey::{ConfirmOutcome, ConflictSet, TransitionOutcome, validate_transition};
pub use mutations::{BookingReceipt, BookingRequest, CancelReceipt, ClientRef};
pub use store::InMemoryStore;

use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, RwLockReadGuard, mpsc, oneshot};
use tracing::info;
use ulid::Ulid;

use crate::model::*;
use crate::notify::Notifier;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Vec<Event>, oneshot::Sender<io::Result<()>>);

/// Owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Drain every Append already queued (the batch window).
/// 3. One flush_sync for the whole batch, then answer every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { events, response } => {
                let mut batch = vec![(events, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { events, response }) => {
                            batch.push((events, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                commit_batch(&mut wal, batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, &batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    'outer: for (events, _) in batch {
        for event in events {
            if let Err(e) = wal.append_buffered(event) {
                append_err = Some(e);
                break 'outer;
            }
        }
    }
    // Flush even after an append error so stray buffered bytes don't
    // leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { events, response } => commit_batch(wal, vec![(events, response)]),
    }
}

/// Held while a booking or override edit checks and commits one date.
pub(super) struct DateLock<'a> {
    _calendar: RwLockReadGuard<'a, ()>,
    _day: OwnedMutexGuard<()>,
}

/// One salon: the authoritative repository every read and write goes through.
pub struct Engine {
    pub store: InMemoryStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    wal_path: PathBuf,
    pub(super) notifier: Arc<dyn Notifier>,
    /// Suspended journey transitions awaiting operator confirmation, by client.
    pub(super) pending: DashMap<Ulid, ConflictSet>,
    /// Serializes slot checks against commits, per date.
    date_locks: DashMap<NaiveDate, Arc<Mutex<()>>>,
    /// Serializes status decisions per client. Always taken after a date lock.
    client_locks: DashMap<Ulid, Arc<Mutex<()>>>,
    /// Weekly-default edits touch every date; they take this exclusively.
    pub(super) calendar_lock: RwLock<()>,
    /// Writers share it across append+apply; compaction and refresh take it
    /// exclusively so the projection and the log never disagree.
    commit_gate: RwLock<()>,
}

impl Engine {
    pub fn new(wal_path: PathBuf, notifier: Arc<dyn Notifier>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = InMemoryStore::new();
        for event in &events {
            store.apply_event(event);
        }
        if !events.is_empty() {
            info!(path = %wal_path.display(), events = events.len(), "replayed WAL");
        }

        Ok(Self {
            store,
            wal_tx,
            wal_path,
            notifier,
            pending: DashMap::new(),
            date_locks: DashMap::new(),
            client_locks: DashMap::new(),
            calendar_lock: RwLock::new(()),
            commit_gate: RwLock::new(()),
        })
    }

    async fn wal_append(&self, events: &[Event]) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                events: events.to_vec(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Durable first, then visible. On error nothing was applied.
    pub(super) async fn persist_and_apply(&self, event: Event) -> Result<(), EngineError> {
        self.persist_all_and_apply(vec![event]).await
    }

    /// Several records in one group-commit flush. They are applied only
    /// after the flush succeeds.
    pub(super) async fn persist_all_and_apply(&self, events: Vec<Event>) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        self.wal_append(&events).await?;
        for event in &events {
            self.store.apply_event(event);
        }
        Ok(())
    }

    pub(super) async fn lock_date(&self, date: NaiveDate) -> DateLock<'_> {
        let calendar = self.calendar_lock.read().await;
        let day = self.date_locks.entry(date).or_default().clone();
        DateLock {
            _calendar: calendar,
            _day: day.lock_owned().await,
        }
    }

    pub(super) async fn lock_client(&self, id: Ulid) -> OwnedMutexGuard<()> {
        let client = self.client_locks.entry(id).or_default().clone();
        client.lock_owned().await
    }

    /// Several client locks, taken in id order.
    pub(super) async fn lock_clients(&self, ids: &BTreeSet<Ulid>) -> Vec<OwnedMutexGuard<()>> {
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.lock_client(*id).await);
        }
        guards
    }

    /// Drop every suspended transition. Open conflict dialogs must re-propose.
    pub fn invalidate(&self) {
        let dropped = self.pending.len();
        self.pending.clear();
        if dropped > 0 {
            info!(dropped, "invalidated suspended transitions");
        }
    }

    /// Rebuild the projection from the durable log.
    pub async fn refresh(&self) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;
        let events =
            Wal::replay(&self.wal_path).map_err(|e| EngineError::WalError(e.to_string()))?;
        self.store.clear();
        for event in &events {
            self.store.apply_event(event);
        }
        self.pending.clear();
        info!(events = events.len(), "refreshed from WAL");
        Ok(())
    }

    /// Rewrite the WAL as the minimal event list that recreates current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;
        let events = self.store.snapshot_events();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
