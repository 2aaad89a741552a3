use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only absolute time type.
pub type Ms = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotStatus {
    /// Open for booking.
    Available,
    /// Active bookings reached capacity; no further bookings accepted.
    Reserved,
    /// Owner-confirmed. Terminal — blocks deletion.
    Confirmed,
    /// Owner-cancelled. Ignored by the conflict checker.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    /// Counts toward capacity. Reserved extension point (e.g. a payment
    /// hold); the booking path itself writes `Confirmed` directly.
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    /// Does this booking occupy one unit of its slot's capacity?
    pub fn is_active(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

/// A bookable time window owned by a single provider.
///
/// `date`/`start_time`/`end_time` are wall-clock strings in the civil
/// timezone ("YYYY-MM-DD", "HH:MM"); `slot_instant` is the derived absolute
/// instant of `date`+`start_time`, stored for range comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Ulid,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub status: SlotStatus,
    pub max_bookings: u32,
    pub buffer_minutes: u32,
    pub slot_instant: Ms,
    pub created_at: Ms,
    /// Touched on every successful booking, even when the status does not
    /// change, so the persisted event stream always carries a slot write
    /// per booking (the serialization marker).
    pub last_booked_at: Option<Ms>,
}

/// One client's reservation against one unit of a slot's capacity.
///
/// Date/time fields are denormalized from the slot at booking time, so the
/// slot can change later without invalidating historical bookings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub slot_id: Ulid,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    pub notes: Option<String>,
    pub status: BookingStatus,
    /// Time-derived unique-ish numeric reference shown to clients.
    /// Collisions are accepted as negligible, not cryptographically ruled out.
    pub order_number: u64,
    pub reserved_at: Ms,
    pub confirmed_at: Option<Ms>,
    /// Advisory. Written at creation, read by nothing — no reaper cancels
    /// stale bookings.
    pub expires_at: Ms,
}

/// Per-owner aggregate: the slots and bookings of one provider, plus the
/// public link clients resolve the owner by. One `RwLock` around this is
/// the single point of serialization for the owner's bookings.
#[derive(Debug, Clone)]
pub struct OwnerState {
    pub id: Ulid,
    pub public_link: String,
    /// Sorted by `(date, start_time)` — zero-padded strings, so string
    /// order is chronological order.
    pub slots: Vec<Slot>,
    /// Insertion order.
    pub bookings: Vec<Booking>,
}

impl OwnerState {
    pub fn new(id: Ulid, public_link: String) -> Self {
        Self {
            id,
            public_link,
            slots: Vec::new(),
            bookings: Vec::new(),
        }
    }

    /// Insert maintaining `(date, start_time)` order.
    pub fn insert_slot(&mut self, slot: Slot) {
        let key = (slot.date.clone(), slot.start_time.clone());
        let pos = self
            .slots
            .partition_point(|s| (s.date.as_str(), s.start_time.as_str()) < (key.0.as_str(), key.1.as_str()));
        self.slots.insert(pos, slot);
    }

    pub fn remove_slot(&mut self, id: Ulid) -> Option<Slot> {
        let pos = self.slots.iter().position(|s| s.id == id)?;
        Some(self.slots.remove(pos))
    }

    pub fn slot(&self, id: &Ulid) -> Option<&Slot> {
        self.slots.iter().find(|s| s.id == *id)
    }

    pub fn slot_mut(&mut self, id: &Ulid) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.id == *id)
    }

    /// Slots sharing a civil date with `date`.
    pub fn slots_on_date<'a>(&'a self, date: &'a str) -> impl Iterator<Item = &'a Slot> {
        self.slots.iter().filter(move |s| s.date == date)
    }

    pub fn booking(&self, id: &Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == *id)
    }

    /// Bookings counting toward `slot_id`'s capacity (confirmed + pending).
    pub fn active_booking_count(&self, slot_id: Ulid) -> u32 {
        self.bookings
            .iter()
            .filter(|b| b.slot_id == slot_id && b.status.is_active())
            .count() as u32
    }
}

/// WAL record format — flat, no nesting beyond the document payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    OwnerRegistered {
        id: Ulid,
        public_link: String,
    },
    SlotCreated {
        owner_id: Ulid,
        slot: Slot,
    },
    SlotDeleted {
        id: Ulid,
        owner_id: Ulid,
    },
    SlotStatusChanged {
        id: Ulid,
        owner_id: Ulid,
        status: SlotStatus,
    },
    /// Booking plus the slot write committed with it: the slot's next
    /// status and the touch timestamp. Applying this event always writes
    /// the slot document.
    BookingCreated {
        owner_id: Ulid,
        booking: Booking,
        slot_status: SlotStatus,
        slot_touched_at: Ms,
    },
    BookingCancelled {
        id: Ulid,
        owner_id: Ulid,
        slot_id: Ulid,
        slot_status: SlotStatus,
    },
}

impl Event {
    /// Owner the event applies to (None only for `OwnerRegistered`, which
    /// is handled at the registry level).
    pub fn owner_id(&self) -> Option<Ulid> {
        match self {
            Event::OwnerRegistered { .. } => None,
            Event::SlotCreated { owner_id, .. }
            | Event::SlotDeleted { owner_id, .. }
            | Event::SlotStatusChanged { owner_id, .. }
            | Event::BookingCreated { owner_id, .. }
            | Event::BookingCancelled { owner_id, .. } => Some(*owner_id),
        }
    }
}

// ── Input drafts ─────────────────────────────────────────────────

/// Owner request to open a slot. Validated before anything is persisted.
#[derive(Debug, Clone)]
pub struct SlotDraft {
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub max_bookings: u32,
    pub buffer_minutes: u32,
}

/// Client fields of a booking request. Date/time come from the slot.
#[derive(Debug, Clone)]
pub struct BookingDraft {
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    pub notes: Option<String>,
}
