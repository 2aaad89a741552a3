mod conflict;
mod error;
mod mutations;
mod queries;

pub use conflict::SlotConflict;
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedOwnerState = Arc<RwLock<OwnerState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
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

/// Background task owning the WAL. Appends arriving close together are
/// buffered and committed with a single fsync (group commit); control
/// commands flush any pending appends first so ordering is preserved.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    let mut batch: Vec<WalCommand> = Vec::with_capacity(64);
    let mut appends: Vec<(Event, oneshot::Sender<io::Result<()>>)> = Vec::new();
    while rx.recv_many(&mut batch, 256).await > 0 {
        for cmd in batch.drain(..) {
            match cmd {
                WalCommand::Append { event, response } => appends.push((event, response)),
                control => {
                    flush_appends(&mut wal, &mut appends);
                    handle_control(&mut wal, control);
                }
            }
        }
        flush_appends(&mut wal, &mut appends);
    }
}

fn flush_appends(wal: &mut Wal, appends: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    if appends.is_empty() {
        return;
    }
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(appends.len() as f64);
    let started = std::time::Instant::now();

    let mut result: io::Result<()> = Ok(());
    for (event, _) in appends.iter() {
        if let Err(e) = wal.append_buffered(event) {
            result = Err(e);
            break;
        }
    }
    // Flush even after an append error so partially buffered bytes don't
    // leak into the next batch (these callers are told the batch failed).
    if let Err(e) = wal.flush_sync()
        && result.is_ok() {
            result = Err(e);
        }

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in appends.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_control(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

// ── Engine ───────────────────────────────────────────────

pub struct Engine {
    /// Owner id → aggregate. The aggregate's RwLock serializes all
    /// mutations for that owner; owners are fully independent.
    pub(super) state: DashMap<Ulid, SharedOwnerState>,
    /// Public link → owner id.
    pub(super) links: DashMap<String, Ulid>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
}

/// Apply an event to an owner aggregate. Caller holds the write lock.
pub(super) fn apply_to_owner(os: &mut OwnerState, event: &Event) {
    match event {
        Event::SlotCreated { slot, .. } => os.insert_slot(slot.clone()),
        Event::SlotDeleted { id, .. } => {
            os.remove_slot(*id);
        }
        Event::SlotStatusChanged { id, status, .. } => {
            if let Some(slot) = os.slot_mut(id) {
                slot.status = *status;
            }
        }
        Event::BookingCreated {
            booking,
            slot_status,
            slot_touched_at,
            ..
        } => {
            // The slot document is written on every booking, status change
            // or not — this is the serialization marker the correctness
            // argument depends on (see model::Slot::last_booked_at).
            if let Some(slot) = os.slot_mut(&booking.slot_id) {
                slot.status = *slot_status;
                slot.last_booked_at = Some(*slot_touched_at);
            }
            os.bookings.push(booking.clone());
        }
        Event::BookingCancelled {
            id,
            slot_id,
            slot_status,
            ..
        } => {
            if let Some(b) = os.bookings.iter_mut().find(|b| b.id == *id) {
                b.status = BookingStatus::Cancelled;
            }
            if let Some(slot) = os.slot_mut(slot_id) {
                slot.status = *slot_status;
            }
        }
        // Handled at the registry level, not here.
        Event::OwnerRegistered { .. } => {}
    }
}

impl Engine {
    /// Replay the WAL and start the group-commit writer task.
    /// Must be called inside a tokio runtime.
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            links: DashMap::new(),
            wal_tx,
        };

        // Replay — we're the sole owner of these Arcs, so try_write always
        // succeeds instantly. Never block here: this may run inside an
        // async context.
        for event in &events {
            match event {
                Event::OwnerRegistered { id, public_link } => {
                    engine.links.insert(public_link.clone(), *id);
                    engine.state.insert(
                        *id,
                        Arc::new(RwLock::new(OwnerState::new(*id, public_link.clone()))),
                    );
                }
                other => {
                    if let Some(owner_id) = other.owner_id()
                        && let Some(entry) = engine.state.get(&owner_id) {
                            let os = entry.value().clone();
                            let mut guard = os.try_write().expect("replay: uncontended write");
                            apply_to_owner(&mut guard, other);
                        }
                }
            }
        }
        metrics::gauge!(crate::observability::OWNERS_ACTIVE).set(engine.state.len() as f64);

        Ok(engine)
    }

    /// Write an event via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_owner(&self, id: &Ulid) -> Option<SharedOwnerState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    /// Public link → owner id, if registered.
    pub fn resolve_owner(&self, link: &str) -> Option<Ulid> {
        self.links.get(link).map(|e| *e.value())
    }

    /// WAL-append then apply, in that order: if the append fails the state
    /// is untouched and the caller sees the error.
    pub(super) async fn persist_and_apply(
        &self,
        os: &mut OwnerState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_owner(os, event);
        Ok(())
    }
}
