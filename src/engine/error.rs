use ulid::Ulid;

use super::conflict::SlotConflict;

#[derive(Debug)]
pub enum EngineError {
    OwnerNotFound(Ulid),
    AlreadyExists(Ulid),
    /// The requested public link is already registered to another owner.
    LinkTaken(String),
    PublicLinkNotFound(String),
    SlotNotFound(Ulid),
    /// Slot exists but its status no longer accepts bookings.
    SlotUnavailable(Ulid),
    /// Active bookings already reach the slot's capacity.
    SlotFullyBooked(Ulid),
    /// Confirmed slots are terminal and cannot be deleted or cancelled.
    CannotDeleteConfirmed(Ulid),
    /// Confirmed and cancelled are terminal statuses; neither transitions.
    InvalidSlotTransition(Ulid),
    BookingNotFound(Ulid),
    /// Candidate slot violates an overlap or buffer rule.
    Conflict(SlotConflict),
    /// Malformed date/time/capacity input, rejected before any write.
    InvalidInput(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::OwnerNotFound(id) => write!(f, "owner not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::LinkTaken(link) => write!(f, "public link already taken: {link}"),
            EngineError::PublicLinkNotFound(link) => write!(f, "public link not found: {link}"),
            EngineError::SlotNotFound(id) => write!(f, "slot not found: {id}"),
            EngineError::SlotUnavailable(id) => {
                write!(f, "slot {id} is not available for booking")
            }
            EngineError::SlotFullyBooked(id) => write!(f, "slot {id} is fully booked"),
            EngineError::CannotDeleteConfirmed(id) => {
                write!(f, "slot {id} has a confirmed booking and cannot be removed")
            }
            EngineError::InvalidSlotTransition(id) => {
                write!(f, "slot {id} is in a terminal status and cannot change")
            }
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::Conflict(c) => write!(f, "slot conflict: {c}"),
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<SlotConflict> for EngineError {
    fn from(c: SlotConflict) -> Self {
        EngineError::Conflict(c)
    }
}
