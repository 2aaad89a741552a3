use ulid::Ulid;

use crate::clock;
use crate::model::{Slot, SlotStatus};

/// Why a candidate slot may not be created, with the minimum gap the owner
/// needs to respect where a buffer rule fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotConflict {
    /// Time ranges intersect (or one contains the other).
    Overlap { existing: Ulid },
    /// The existing slot's own buffer after its end is not respected.
    TrailingBuffer { existing: Ulid, minutes: u32 },
    /// The candidate's own buffer before its start is not respected.
    LeadingBuffer { existing: Ulid, minutes: u32 },
}

impl std::fmt::Display for SlotConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotConflict::Overlap { .. } => write!(f, "conflicts with an existing slot"),
            SlotConflict::TrailingBuffer { minutes, .. } => write!(
                f,
                "must start at least {minutes} minutes after the previous slot ends"
            ),
            SlotConflict::LeadingBuffer { minutes, .. } => write!(
                f,
                "requires at least {minutes} minutes free before it starts"
            ),
        }
    }
}

/// Candidate slot times in minutes since midnight.
pub(crate) struct Candidate {
    pub start_min: u32,
    pub end_min: u32,
    pub buffer_minutes: u32,
}

/// Check a candidate against every existing slot on the same civil date.
/// First conflicting slot wins; conflicts are not aggregated.
///
/// Buffers are asymmetric: for an existing slot that ends before the
/// candidate starts, the gap between them must satisfy both the existing
/// slot's trailing buffer and the candidate's leading buffer. A slot's
/// buffer never constrains slots that end before it starts. Boundaries are
/// inclusive — starting exactly at `existing_end + buffer` is allowed.
pub(crate) fn check_conflict<'a>(
    candidate: &Candidate,
    existing: impl IntoIterator<Item = &'a Slot>,
) -> Result<(), SlotConflict> {
    let (new_start, new_end) = (candidate.start_min, candidate.end_min);
    for e in existing {
        if e.status == SlotStatus::Cancelled {
            continue;
        }
        // A stored slot with unparseable times must never look free.
        let (Some(e_start), Some(e_end)) =
            (clock::minutes_of(&e.start_time), clock::minutes_of(&e.end_time))
        else {
            return Err(SlotConflict::Overlap { existing: e.id });
        };

        if new_start < e_end && new_end > e_start {
            return Err(SlotConflict::Overlap { existing: e.id });
        }

        if new_start >= e_end {
            if new_start < e_end + e.buffer_minutes {
                return Err(SlotConflict::TrailingBuffer {
                    existing: e.id,
                    minutes: e.buffer_minutes,
                });
            }
            if candidate.buffer_minutes > 0
                && e_end > new_start.saturating_sub(candidate.buffer_minutes)
            {
                return Err(SlotConflict::LeadingBuffer {
                    existing: e.id,
                    minutes: candidate.buffer_minutes,
                });
            }
        }
    }
    Ok(())
}
