use std::collections::HashMap;

use ulid::Ulid;

use crate::clock;
use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    /// Slots a client may book through a public link: status available or
    /// reserved, dated today or later, not already started, and with
    /// confirmed bookings below capacity. Ascending (date, start_time).
    pub async fn available_slots_for_link(
        &self,
        link: &str,
    ) -> Result<(Ulid, Vec<Slot>), EngineError> {
        let owner_id = self
            .resolve_owner(link)
            .ok_or_else(|| EngineError::PublicLinkNotFound(link.to_string()))?;
        let os = self
            .get_owner(&owner_id)
            .ok_or(EngineError::OwnerNotFound(owner_id))?;
        let guard = os.read().await;

        let today = clock::today();
        // One pass over the bookings, grouped by slot.
        let mut confirmed: HashMap<Ulid, u32> = HashMap::new();
        for b in &guard.bookings {
            if b.status == BookingStatus::Confirmed {
                *confirmed.entry(b.slot_id).or_default() += 1;
            }
        }

        // `slots` is kept sorted by (date, start_time), so filtering in
        // order yields the required ascending listing.
        let slots = guard
            .slots
            .iter()
            .filter(|s| matches!(s.status, SlotStatus::Available | SlotStatus::Reserved))
            .filter(|s| s.date.as_str() >= today.as_str())
            .filter(|s| !clock::is_past(&s.date, &s.start_time))
            .filter(|s| confirmed.get(&s.id).copied().unwrap_or(0) < s.max_bookings)
            .cloned()
            .collect();
        Ok((owner_id, slots))
    }

    /// Owner's slots by absolute instant: upcoming (ascending) or history
    /// (descending, most recent first).
    pub async fn owner_slots(
        &self,
        owner_id: Ulid,
        include_past: bool,
    ) -> Result<Vec<Slot>, EngineError> {
        let os = self
            .get_owner(&owner_id)
            .ok_or(EngineError::OwnerNotFound(owner_id))?;
        let guard = os.read().await;
        let now = clock::now_ms();

        let mut slots: Vec<Slot> = guard
            .slots
            .iter()
            .filter(|s| {
                if include_past {
                    s.slot_instant < now
                } else {
                    s.slot_instant >= now
                }
            })
            .cloned()
            .collect();
        if include_past {
            slots.reverse();
        }
        Ok(slots)
    }

    /// All bookings for an owner: date descending, start_time ascending
    /// within a date (most recent day first, earliest-in-day first).
    pub async fn owner_bookings(&self, owner_id: Ulid) -> Result<Vec<Booking>, EngineError> {
        let os = self
            .get_owner(&owner_id)
            .ok_or(EngineError::OwnerNotFound(owner_id))?;
        let guard = os.read().await;
        let mut bookings = guard.bookings.clone();
        bookings.sort_by(|a, b| b.date.cmp(&a.date).then(a.start_time.cmp(&b.start_time)));
        Ok(bookings)
    }

    /// Point read of a slot.
    pub async fn get_slot(&self, owner_id: Ulid, slot_id: Ulid) -> Result<Slot, EngineError> {
        let os = self
            .get_owner(&owner_id)
            .ok_or(EngineError::OwnerNotFound(owner_id))?;
        let guard = os.read().await;
        guard
            .slot(&slot_id)
            .cloned()
            .ok_or(EngineError::SlotNotFound(slot_id))
    }
}
