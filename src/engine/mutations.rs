use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::clock;
use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{check_conflict, Candidate};
use super::{Engine, EngineError, WalCommand};

/// Advisory staleness horizon written on every booking. Nothing reads it
/// back to auto-cancel; see `model::Booking::expires_at`.
const BOOKING_EXPIRY_MS: Ms = 5 * 60 * 1000;

/// Time-derived order reference: current ms with a random 3-digit
/// disambiguator. Uniqueness is probabilistic, which is accepted.
fn order_number(now: Ms) -> u64 {
    let disambiguator = (Ulid::new().random() % 1000) as u64;
    (now as u64) * 1000 + disambiguator
}

impl Engine {
    /// Register an owner aggregate under a unique public link. Owner
    /// identity itself (accounts, licensing) lives outside this core.
    pub async fn register_owner(&self, id: Ulid, public_link: &str) -> Result<(), EngineError> {
        if public_link.is_empty() || public_link.len() > MAX_LINK_LEN {
            return Err(EngineError::InvalidInput("public link length"));
        }
        if !public_link
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(EngineError::InvalidInput("public link characters"));
        }
        if self.state.len() >= MAX_OWNERS {
            return Err(EngineError::LimitExceeded("too many owners"));
        }
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        // Reserve the link before the awaited WAL append; a check-then-insert
        // around the await would let two racing registrations both pass.
        match self.links.entry(public_link.to_string()) {
            Entry::Occupied(_) => return Err(EngineError::LinkTaken(public_link.to_string())),
            Entry::Vacant(v) => {
                v.insert(id);
            }
        }

        let event = Event::OwnerRegistered {
            id,
            public_link: public_link.to_string(),
        };
        if let Err(e) = self.wal_append(&event).await {
            self.links.remove_if(public_link, |_, owner| *owner == id);
            return Err(e);
        }
        self.state.insert(
            id,
            Arc::new(RwLock::new(OwnerState::new(id, public_link.to_string()))),
        );
        metrics::gauge!(observability::OWNERS_ACTIVE).set(self.state.len() as f64);
        Ok(())
    }

    /// Open a new slot after validating civil fields and running the
    /// conflict checker against the owner's other slots on the same date.
    pub async fn create_slot(&self, owner_id: Ulid, draft: SlotDraft) -> Result<Slot, EngineError> {
        if clock::parse_civil_date(&draft.date).is_none() {
            return Err(EngineError::InvalidInput("malformed date"));
        }
        let start_min = clock::minutes_of(&draft.start_time)
            .ok_or(EngineError::InvalidInput("malformed start_time"))?;
        let end_min = clock::minutes_of(&draft.end_time)
            .ok_or(EngineError::InvalidInput("malformed end_time"))?;
        if end_min <= start_min {
            return Err(EngineError::InvalidInput("end_time must be after start_time"));
        }
        if draft.max_bookings == 0 || draft.max_bookings > MAX_CAPACITY {
            return Err(EngineError::InvalidInput("max_bookings out of range"));
        }
        if draft.buffer_minutes > MAX_BUFFER_MINUTES {
            return Err(EngineError::InvalidInput("buffer_minutes out of range"));
        }
        let slot_instant = clock::civil_instant(&draft.date, &draft.start_time)
            .ok_or(EngineError::InvalidInput("date/time not representable"))?;

        let os = self
            .get_owner(&owner_id)
            .ok_or(EngineError::OwnerNotFound(owner_id))?;
        let mut guard = os.write().await;
        if guard.slots.len() >= MAX_SLOTS_PER_OWNER {
            return Err(EngineError::LimitExceeded("too many slots for owner"));
        }

        let candidate = Candidate {
            start_min,
            end_min,
            buffer_minutes: draft.buffer_minutes,
        };
        if let Err(conflict) = check_conflict(&candidate, guard.slots_on_date(&draft.date)) {
            metrics::counter!(observability::SLOT_CONFLICTS_TOTAL).increment(1);
            return Err(conflict.into());
        }

        let slot = Slot {
            id: Ulid::new(),
            date: draft.date,
            start_time: draft.start_time,
            end_time: draft.end_time,
            status: SlotStatus::Available,
            max_bookings: draft.max_bookings,
            buffer_minutes: draft.buffer_minutes,
            slot_instant,
            created_at: clock::now_ms(),
            last_booked_at: None,
        };
        let event = Event::SlotCreated {
            owner_id,
            slot: slot.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(observability::SLOTS_CREATED_TOTAL).increment(1);
        Ok(slot)
    }

    /// Atomically reserve one unit of a slot's capacity.
    ///
    /// The owner's write lock is held across the whole read-check-write
    /// sequence, so concurrent attempts on the same slot serialize: with
    /// capacity M and N > M attempts, exactly M commit (in lock order, not
    /// arrival order) and the rest observe `SlotFullyBooked`. All failures
    /// are terminal; nothing here retries.
    pub async fn book(
        &self,
        owner_id: Ulid,
        slot_id: Ulid,
        draft: BookingDraft,
    ) -> Result<(Booking, Slot), EngineError> {
        if draft.client_name.is_empty() || draft.client_name.len() > MAX_FIELD_LEN {
            return Err(EngineError::InvalidInput("client_name length"));
        }
        if draft.client_email.len() > MAX_FIELD_LEN || draft.client_phone.len() > MAX_FIELD_LEN {
            return Err(EngineError::InvalidInput("client contact length"));
        }
        if let Some(ref notes) = draft.notes
            && notes.len() > MAX_NOTES_LEN {
                return Err(EngineError::InvalidInput("notes length"));
            }

        let started = std::time::Instant::now();
        let os = self
            .get_owner(&owner_id)
            .ok_or(EngineError::OwnerNotFound(owner_id))?;
        let mut guard = os.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_OWNER {
            return Err(EngineError::LimitExceeded("too many bookings for owner"));
        }

        let slot = match guard.slot(&slot_id) {
            Some(s) => s.clone(),
            None => {
                metrics::counter!(observability::BOOKING_REJECTED_TOTAL, "reason" => "not_found")
                    .increment(1);
                return Err(EngineError::SlotNotFound(slot_id));
            }
        };
        if slot.status != SlotStatus::Available {
            metrics::counter!(observability::BOOKING_REJECTED_TOTAL, "reason" => "unavailable")
                .increment(1);
            return Err(EngineError::SlotUnavailable(slot_id));
        }

        // Confirmed + pending both occupy capacity.
        let active = guard.active_booking_count(slot_id);
        if active >= slot.max_bookings {
            metrics::counter!(observability::BOOKING_REJECTED_TOTAL, "reason" => "full")
                .increment(1);
            return Err(EngineError::SlotFullyBooked(slot_id));
        }

        let now = clock::now_ms();
        let booking = Booking {
            id: Ulid::new(),
            slot_id,
            date: slot.date.clone(),
            start_time: slot.start_time.clone(),
            end_time: slot.end_time.clone(),
            client_name: draft.client_name,
            client_email: draft.client_email,
            client_phone: draft.client_phone,
            notes: draft.notes,
            status: BookingStatus::Confirmed,
            order_number: order_number(now),
            reserved_at: now,
            confirmed_at: Some(now),
            expires_at: now + BOOKING_EXPIRY_MS,
        };
        let slot_status = if active + 1 >= slot.max_bookings {
            SlotStatus::Reserved
        } else {
            slot.status
        };
        let event = Event::BookingCreated {
            owner_id,
            booking: booking.clone(),
            slot_status,
            slot_touched_at: now,
        };
        self.persist_and_apply(&mut guard, &event).await?;

        let slot_after = guard.slot(&slot_id).cloned().unwrap_or(slot);
        metrics::counter!(observability::BOOKINGS_TOTAL).increment(1);
        metrics::histogram!(observability::BOOKING_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        Ok((booking, slot_after))
    }

    /// Delete a slot. Confirmed slots are blocked.
    pub async fn delete_slot(&self, owner_id: Ulid, slot_id: Ulid) -> Result<(), EngineError> {
        let os = self
            .get_owner(&owner_id)
            .ok_or(EngineError::OwnerNotFound(owner_id))?;
        let mut guard = os.write().await;
        let slot = guard
            .slot(&slot_id)
            .ok_or(EngineError::SlotNotFound(slot_id))?;
        if slot.status == SlotStatus::Confirmed {
            return Err(EngineError::CannotDeleteConfirmed(slot_id));
        }
        let event = Event::SlotDeleted {
            id: slot_id,
            owner_id,
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Owner marks a slot as confirmed — terminal, blocks deletion.
    pub async fn confirm_slot(&self, owner_id: Ulid, slot_id: Ulid) -> Result<(), EngineError> {
        self.transition_slot(owner_id, slot_id, SlotStatus::Confirmed)
            .await
    }

    /// Owner cancels a slot. Cancelled slots stop constraining new slots
    /// in the conflict checker and never appear in public listings.
    pub async fn cancel_slot(&self, owner_id: Ulid, slot_id: Ulid) -> Result<(), EngineError> {
        self.transition_slot(owner_id, slot_id, SlotStatus::Cancelled)
            .await
    }

    async fn transition_slot(
        &self,
        owner_id: Ulid,
        slot_id: Ulid,
        status: SlotStatus,
    ) -> Result<(), EngineError> {
        let os = self
            .get_owner(&owner_id)
            .ok_or(EngineError::OwnerNotFound(owner_id))?;
        let mut guard = os.write().await;
        let slot = guard
            .slot(&slot_id)
            .ok_or(EngineError::SlotNotFound(slot_id))?;
        // A cancelled slot's window may already belong to a newer slot, so
        // resurrecting it would create an overlap the checker never saw.
        if matches!(slot.status, SlotStatus::Confirmed | SlotStatus::Cancelled) {
            return Err(EngineError::InvalidSlotTransition(slot_id));
        }
        let event = Event::SlotStatusChanged {
            id: slot_id,
            owner_id,
            status,
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Cancel a booking, freeing one unit of capacity. A slot that was
    /// `Reserved` drops back to `Available` once the active count is below
    /// capacity again. Cancelling twice is a no-op.
    pub async fn cancel_booking(
        &self,
        owner_id: Ulid,
        booking_id: Ulid,
    ) -> Result<(), EngineError> {
        let os = self
            .get_owner(&owner_id)
            .ok_or(EngineError::OwnerNotFound(owner_id))?;
        let mut guard = os.write().await;
        let booking = guard
            .booking(&booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?
            .clone();
        if booking.status == BookingStatus::Cancelled {
            return Ok(());
        }

        let slot_id = booking.slot_id;
        let active_after = guard.active_booking_count(slot_id).saturating_sub(1);
        let slot_status = match guard.slot(&slot_id) {
            Some(s) if s.status == SlotStatus::Reserved && active_after < s.max_bookings => {
                SlotStatus::Available
            }
            Some(s) => s.status,
            // Slot already deleted; keep a value the apply step won't find.
            None => SlotStatus::Cancelled,
        };
        let event = Event::BookingCancelled {
            id: booking_id,
            owner_id,
            slot_id,
            slot_status,
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Rewrite the WAL with only the events needed to recreate the current
    /// state: owners, live slots, and their non-cancelled bookings.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();
        let owner_ids: Vec<Ulid> = self.state.iter().map(|e| *e.key()).collect();
        for id in owner_ids {
            let Some(os) = self.get_owner(&id) else { continue };
            // Runs concurrently with live traffic (background compactor,
            // shutdown), so a contended owner is waited out, not assumed away.
            let guard = os.read().await;
            events.push(Event::OwnerRegistered {
                id: guard.id,
                public_link: guard.public_link.clone(),
            });
            for slot in &guard.slots {
                events.push(Event::SlotCreated {
                    owner_id: guard.id,
                    slot: slot.clone(),
                });
            }
            for booking in &guard.bookings {
                if booking.status == BookingStatus::Cancelled {
                    continue;
                }
                let slot_status = guard
                    .slot(&booking.slot_id)
                    .map_or(SlotStatus::Cancelled, |s| s.status);
                events.push(Event::BookingCreated {
                    owner_id: guard.id,
                    booking: booking.clone(),
                    slot_status,
                    slot_touched_at: booking.reserved_at,
                });
            }
        }

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
