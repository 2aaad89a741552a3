//! Public booking orchestrator: what anonymous clients reach through a
//! published link. Resolves the link, delegates to the engine's booking
//! transaction, and fires best-effort side effects that never influence
//! the booking outcome.

use std::sync::Arc;

use async_trait::async_trait;
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::model::{Booking, BookingDraft, Slot};
use crate::observability;

/// What the calendar collaborator receives for a committed booking.
#[derive(Debug, Clone)]
pub struct CalendarEvent {
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    pub notes: Option<String>,
}

#[derive(Debug)]
pub struct CalendarError(pub String);

impl std::fmt::Display for CalendarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CalendarError {}

/// External calendar collaborator (e.g. Google Calendar). The core only
/// ever calls this fire-and-forget.
#[async_trait]
pub trait CalendarSync: Send + Sync {
    async fn schedule_event(&self, owner_id: Ulid, event: CalendarEvent)
        -> Result<(), CalendarError>;
}

/// Default no-op sync for deployments without a calendar integration.
pub struct NullCalendar;

#[async_trait]
impl CalendarSync for NullCalendar {
    async fn schedule_event(
        &self,
        owner_id: Ulid,
        event: CalendarEvent,
    ) -> Result<(), CalendarError> {
        tracing::debug!("calendar sync skipped for owner {owner_id}: {} {}", event.date, event.start_time);
        Ok(())
    }
}

/// A successful public booking, echoed back to the client.
#[derive(Debug, Clone)]
pub struct PublicBookingResult {
    pub owner_id: Ulid,
    pub booking: Booking,
    pub slot: Slot,
}

pub struct PublicDesk {
    engine: Arc<Engine>,
    calendar: Arc<dyn CalendarSync>,
}

impl PublicDesk {
    pub fn new(engine: Arc<Engine>, calendar: Arc<dyn CalendarSync>) -> Self {
        Self { engine, calendar }
    }

    /// Bookable slots behind a public link.
    pub async fn available_slots(&self, link: &str) -> Result<(Ulid, Vec<Slot>), EngineError> {
        self.engine.available_slots_for_link(link).await
    }

    /// Book a slot through a public link. The engine's transaction decides
    /// the outcome; calendar sync runs detached afterwards — its failure is
    /// logged and counted, never retried here, never surfaced.
    pub async fn create_booking(
        &self,
        link: &str,
        slot_id: Ulid,
        client: BookingDraft,
    ) -> Result<PublicBookingResult, EngineError> {
        let owner_id = self
            .engine
            .resolve_owner(link)
            .ok_or_else(|| EngineError::PublicLinkNotFound(link.to_string()))?;
        let (booking, slot) = self.engine.book(owner_id, slot_id, client).await?;

        let calendar = self.calendar.clone();
        let event = CalendarEvent {
            date: booking.date.clone(),
            start_time: booking.start_time.clone(),
            end_time: booking.end_time.clone(),
            client_name: booking.client_name.clone(),
            client_email: booking.client_email.clone(),
            client_phone: booking.client_phone.clone(),
            notes: booking.notes.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = calendar.schedule_event(owner_id, event).await {
                metrics::counter!(observability::CALENDAR_SYNC_FAILURES_TOTAL).increment(1);
                tracing::warn!("calendar sync failed for owner {owner_id}: {e}");
            }
        });

        Ok(PublicBookingResult {
            owner_id,
            booking,
            slot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SlotDraft, SlotStatus};

    fn desk(name: &str, calendar: Arc<dyn CalendarSync>) -> (PublicDesk, Arc<Engine>) {
        let dir = std::env::temp_dir().join("bookd_test_public");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        let engine = Arc::new(Engine::new(path).unwrap());
        (PublicDesk::new(engine.clone(), calendar), engine)
    }

    async fn seeded_slot(engine: &Engine, link: &str) -> (Ulid, Ulid) {
        let owner = Ulid::new();
        engine.register_owner(owner, link).await.unwrap();
        let slot = engine
            .create_slot(
                owner,
                SlotDraft {
                    date: "2999-06-15".into(),
                    start_time: "10:00".into(),
                    end_time: "11:00".into(),
                    max_bookings: 1,
                    buffer_minutes: 0,
                },
            )
            .await
            .unwrap();
        (owner, slot.id)
    }

    fn client() -> BookingDraft {
        BookingDraft {
            client_name: "walk-in".into(),
            client_email: "walk-in@example.com".into(),
            client_phone: "+100000000".into(),
            notes: Some("first visit".into()),
        }
    }

    struct FailingCalendar;

    #[async_trait]
    impl CalendarSync for FailingCalendar {
        async fn schedule_event(
            &self,
            _owner_id: Ulid,
            _event: CalendarEvent,
        ) -> Result<(), CalendarError> {
            Err(CalendarError("upstream 503".into()))
        }
    }

    #[tokio::test]
    async fn booking_through_link() {
        let (desk, engine) = desk("book_link.wal", Arc::new(NullCalendar));
        let (owner, slot_id) = seeded_slot(&engine, "desk1").await;

        let (resolved, slots) = desk.available_slots("desk1").await.unwrap();
        assert_eq!(resolved, owner);
        assert_eq!(slots.len(), 1);

        let result = desk.create_booking("desk1", slot_id, client()).await.unwrap();
        assert_eq!(result.owner_id, owner);
        assert_eq!(result.booking.client_name, "walk-in");
        assert_eq!(result.slot.status, SlotStatus::Reserved);
    }

    #[tokio::test]
    async fn unknown_link_rejected() {
        let (desk, _engine) = desk("unknown_link.wal", Arc::new(NullCalendar));
        let result = desk.create_booking("nobody", Ulid::new(), client()).await;
        assert!(matches!(result, Err(EngineError::PublicLinkNotFound(_))));
        assert!(matches!(
            desk.available_slots("nobody").await,
            Err(EngineError::PublicLinkNotFound(_))
        ));
    }

    #[tokio::test]
    async fn calendar_failure_never_fails_the_booking() {
        let (desk, engine) = desk("calendar_failure.wal", Arc::new(FailingCalendar));
        let (owner, slot_id) = seeded_slot(&engine, "desk2").await;

        let result = desk.create_booking("desk2", slot_id, client()).await.unwrap();
        assert_eq!(result.booking.status, crate::model::BookingStatus::Confirmed);

        // Let the detached sync task run and fail; the committed state is
        // unaffected.
        tokio::task::yield_now().await;
        assert_eq!(engine.owner_bookings(owner).await.unwrap().len(), 1);
    }
}
