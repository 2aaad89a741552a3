//! Hard caps. These bound memory and WAL growth per tenant; requests past
//! a cap fail with `EngineError::LimitExceeded`.

pub const MAX_OWNERS: usize = 10_000;
pub const MAX_SLOTS_PER_OWNER: usize = 20_000;
pub const MAX_BOOKINGS_PER_OWNER: usize = 100_000;

pub const MAX_FIELD_LEN: usize = 200;
pub const MAX_NOTES_LEN: usize = 2_000;
pub const MAX_LINK_LEN: usize = 64;

pub const MAX_CAPACITY: u32 = 500;
/// A buffer longer than a day cannot be satisfied within one civil date.
pub const MAX_BUFFER_MINUTES: u32 = 1_440;
