use chrono::Utc;
use guidely_core::events::{publish_best_effort, EventPublisher};
use guidely_core::repository::{AccountDirectory, BookingRepository};
use guidely_core::{
    AccountRole, BookingRequest, BookingStatus, CoreError, CoreResult, NewBookingRequest,
    TripDetails, TripInput,
};
use guidely_shared::events::{topics, BookingDecidedEvent, BookingRequestedEvent};
use std::sync::Arc;
use tracing::{info, warn};

use crate::notices::{booking_request_notice, decision_notice, store_failure};

/// Governs the lifecycle of guide-booking requests: `pending → accepted | declined`.
pub struct BookingManager {
    bookings: Arc<dyn BookingRepository>,
    accounts: Arc<dyn AccountDirectory>,
    events: Arc<dyn EventPublisher>,
}

impl BookingManager {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        accounts: Arc<dyn AccountDirectory>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self { bookings, accounts, events }
    }

    /// Create a `pending` request and notify the guide in the same commit
    pub async fn create_booking(
        &self,
        requester_id: i64,
        guide_id: i64,
        trip: TripInput,
    ) -> CoreResult<BookingRequest> {
        let trip = TripDetails::parse(trip)?;

        if requester_id == guide_id {
            return Err(CoreError::Validation("cannot book yourself as a guide".to_string()));
        }

        let role = self
            .accounts
            .role_of(guide_id)
            .await
            .map_err(|e| store_failure("look up guide account", e))?
            .ok_or_else(|| CoreError::NotFound(format!("guide {}", guide_id)))?;
        if role != AccountRole::Guide {
            return Err(CoreError::Validation(format!("account {} is not a guide", guide_id)));
        }

        let (booking, notification) = self
            .bookings
            .create_booking(&NewBookingRequest { requester_id, guide_id, trip }, &booking_request_notice)
            .await
            .map_err(|e| store_failure("create booking", e))?;

        info!(
            "Booking {} requested by user {} for guide {} (notification {})",
            booking.id, requester_id, guide_id, notification.id
        );

        publish_best_effort(
            self.events.as_ref(),
            topics::BOOKING_REQUESTED,
            &booking.id.to_string(),
            &BookingRequestedEvent {
                booking_id: booking.id,
                requester_id,
                guide_id,
                destination: booking.trip.destination.clone(),
                trip_date: booking.trip.date.to_string(),
                timestamp: Utc::now().timestamp(),
            },
        )
        .await;

        Ok(booking)
    }

    /// Transition: pending → accepted | declined, by the booking's guide only.
    ///
    /// The status change is a compare-and-set against `pending`; of several
    /// concurrent callers exactly one wins and the rest get `InvalidTransition`.
    pub async fn transition_status(
        &self,
        booking_id: i64,
        new_status: BookingStatus,
        actor_id: i64,
    ) -> CoreResult<BookingRequest> {
        if !new_status.is_terminal() {
            return Err(CoreError::Validation(format!(
                "status must be accepted or declined, got {}",
                new_status
            )));
        }

        let current = self.load(booking_id).await?;

        if current.guide_id != actor_id {
            warn!("User {} tried to set booking {} to {}", actor_id, booking_id, new_status);
            return Err(CoreError::Unauthorized(format!(
                "only the guide of booking {} may answer it",
                booking_id
            )));
        }

        if current.status.is_terminal() {
            return Err(CoreError::InvalidTransition {
                from: current.status.to_string(),
                to: new_status.to_string(),
            });
        }

        let outcome = self
            .bookings
            .compare_and_set_status(booking_id, BookingStatus::Pending, new_status, &decision_notice)
            .await
            .map_err(|e| store_failure("update booking status", e))?;

        let Some((booking, notification)) = outcome else {
            // Lost the race: someone else answered between our read and the CAS.
            let from = match self.bookings.get_booking(booking_id).await {
                Ok(Some(b)) => b.status.to_string(),
                Ok(None) => {
                    warn!("Booking {} vanished after a lost status race", booking_id);
                    "unknown".to_string()
                }
                Err(e) => {
                    warn!("Re-reading booking {} after a lost status race failed: {}", booking_id, e);
                    "unknown".to_string()
                }
            };
            return Err(CoreError::InvalidTransition { from, to: new_status.to_string() });
        };

        info!(
            "Booking {} {} by guide {} (notification {} to user {})",
            booking.id, booking.status, actor_id, notification.id, notification.user_id
        );

        let topic = match booking.status {
            BookingStatus::Declined => topics::BOOKING_DECLINED,
            _ => topics::BOOKING_ACCEPTED,
        };
        publish_best_effort(
            self.events.as_ref(),
            topic,
            &booking.id.to_string(),
            &BookingDecidedEvent {
                booking_id: booking.id,
                requester_id: booking.requester_id,
                guide_id: booking.guide_id,
                status: booking.status.to_string(),
                timestamp: Utc::now().timestamp(),
            },
        )
        .await;

        Ok(booking)
    }

    /// Returns the booking to either of its parties.
    pub async fn get_booking(&self, booking_id: i64, viewer_id: i64) -> CoreResult<BookingRequest> {
        let booking = self.load(booking_id).await?;
        if !booking.is_party(viewer_id) {
            return Err(CoreError::Unauthorized(format!(
                "user {} is not a party to booking {}",
                viewer_id, booking_id
            )));
        }
        Ok(booking)
    }

    /// Bookings the user requested, most recent first
    pub async fn list_for_user(&self, user_id: i64) -> CoreResult<Vec<BookingRequest>> {
        self.bookings
            .list_by_requester(user_id)
            .await
            .map_err(|e| store_failure("list bookings", e))
    }

    /// Bookings addressed to the guide, most recent first
    pub async fn list_for_guide(&self, guide_id: i64) -> CoreResult<Vec<BookingRequest>> {
        self.bookings
            .list_by_guide(guide_id)
            .await
            .map_err(|e| store_failure("list guide bookings", e))
    }

    pub(crate) async fn load(&self, booking_id: i64) -> CoreResult<BookingRequest> {
        self.bookings
            .get_booking(booking_id)
            .await
            .map_err(|e| store_failure("get booking", e))?
            .ok_or_else(|| CoreError::NotFound(format!("booking {}", booking_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guidely_core::events::NoopPublisher;
    use guidely_core::repository::NotificationRepository;
    use guidely_core::NotificationKind;
    use guidely_store::MemoryStore;

    const TRAVELER: i64 = 42;
    const GUIDE: i64 = 7;

    async fn setup() -> (Arc<MemoryStore>, BookingManager) {
        let store = Arc::new(MemoryStore::new());
        store.add_account(TRAVELER, AccountRole::User).await;
        store.add_account(GUIDE, AccountRole::Guide).await;
        let manager = BookingManager::new(store.clone(), store.clone(), Arc::new(NoopPublisher));
        (store, manager)
    }

    fn kyoto() -> TripInput {
        TripInput {
            destination: "Kyoto".to_string(),
            date: "2025-05-01".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_booking_lifecycle() {
        let (store, manager) = setup().await;

        // Create: pending, guide notified
        let booking = manager.create_booking(TRAVELER, GUIDE, kyoto()).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);

        let guide_inbox = store.list_for_user(GUIDE, false).await.unwrap();
        assert_eq!(guide_inbox.len(), 1);
        assert_eq!(guide_inbox[0].kind, NotificationKind::BookingRequest);
        assert_eq!(guide_inbox[0].related_id, booking.id);

        // pending → accepted, traveler notified
        let accepted = manager
            .transition_status(booking.id, BookingStatus::Accepted, GUIDE)
            .await
            .unwrap();
        assert_eq!(accepted.status, BookingStatus::Accepted);

        let traveler_inbox = store.list_for_user(TRAVELER, false).await.unwrap();
        assert_eq!(traveler_inbox.len(), 1);
        assert_eq!(traveler_inbox[0].kind, NotificationKind::BookingAccepted);
        assert_eq!(traveler_inbox[0].related_id, booking.id);

        // Repeating the answer is rejected and emits nothing
        let again = manager.transition_status(booking.id, BookingStatus::Accepted, GUIDE).await;
        assert!(matches!(again, Err(CoreError::InvalidTransition { .. })));
        assert_eq!(store.list_for_user(TRAVELER, false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_states_reject_every_transition() {
        let (store, manager) = setup().await;
        let booking = manager.create_booking(TRAVELER, GUIDE, kyoto()).await.unwrap();

        manager.transition_status(booking.id, BookingStatus::Declined, GUIDE).await.unwrap();

        for next in [BookingStatus::Accepted, BookingStatus::Declined] {
            let result = manager.transition_status(booking.id, next, GUIDE).await;
            assert!(matches!(result, Err(CoreError::InvalidTransition { .. })));
        }
        assert_eq!(store.notification_count().await, 2);
    }

    #[tokio::test]
    async fn test_only_the_guide_may_answer() {
        let (store, manager) = setup().await;
        let booking = manager.create_booking(TRAVELER, GUIDE, kyoto()).await.unwrap();

        for actor in [TRAVELER, 99] {
            let result = manager.transition_status(booking.id, BookingStatus::Accepted, actor).await;
            assert!(matches!(result, Err(CoreError::Unauthorized(_))));
        }

        let unchanged = store.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn test_transition_errors() {
        let (_store, manager) = setup().await;
        let booking = manager.create_booking(TRAVELER, GUIDE, kyoto()).await.unwrap();

        let missing = manager.transition_status(999, BookingStatus::Accepted, GUIDE).await;
        assert!(matches!(missing, Err(CoreError::NotFound(_))));

        let back_to_pending = manager.transition_status(booking.id, BookingStatus::Pending, GUIDE).await;
        assert!(matches!(back_to_pending, Err(CoreError::Validation(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_answers_have_one_winner() {
        let (store, manager) = setup().await;
        let manager = Arc::new(manager);
        let booking = manager.create_booking(TRAVELER, GUIDE, kyoto()).await.unwrap();

        let accept = {
            let m = manager.clone();
            tokio::spawn(async move { m.transition_status(booking.id, BookingStatus::Accepted, GUIDE).await })
        };
        let decline = {
            let m = manager.clone();
            tokio::spawn(async move { m.transition_status(booking.id, BookingStatus::Declined, GUIDE).await })
        };

        let results = [accept.await.unwrap(), decline.await.unwrap()];
        let winners: Vec<&BookingRequest> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(CoreError::InvalidTransition { .. }))));

        let stored = store.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, winners[0].status);
        assert_eq!(store.list_for_user(TRAVELER, false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_notification_outage_rolls_back_transition() {
        let (store, manager) = setup().await;
        let booking = manager.create_booking(TRAVELER, GUIDE, kyoto()).await.unwrap();

        store.fail_notification_writes(true);
        let result = manager.transition_status(booking.id, BookingStatus::Accepted, GUIDE).await;
        assert!(matches!(result, Err(CoreError::TransientIo(_))));

        let stored = store.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Pending);
        assert!(store.list_for_user(TRAVELER, false).await.unwrap().is_empty());

        // The whole operation can be retried once the store is back
        store.fail_notification_writes(false);
        let retried = manager
            .transition_status(booking.id, BookingStatus::Accepted, GUIDE)
            .await
            .unwrap();
        assert_eq!(retried.status, BookingStatus::Accepted);
    }

    #[tokio::test]
    async fn test_create_validates_guide_and_fields() {
        let (store, manager) = setup().await;
        store.add_account(8, AccountRole::User).await;

        let not_a_guide = manager.create_booking(TRAVELER, 8, kyoto()).await;
        assert!(matches!(not_a_guide, Err(CoreError::Validation(_))));

        let unknown = manager.create_booking(TRAVELER, 1234, kyoto()).await;
        assert!(matches!(unknown, Err(CoreError::NotFound(_))));

        let own_guide = manager.create_booking(GUIDE, GUIDE, kyoto()).await;
        assert!(matches!(own_guide, Err(CoreError::Validation(_))));

        let mut no_date = kyoto();
        no_date.date = String::new();
        assert!(matches!(
            manager.create_booking(TRAVELER, GUIDE, no_date).await,
            Err(CoreError::Validation(_))
        ));

        assert_eq!(store.notification_count().await, 0);
    }

    #[tokio::test]
    async fn test_listing_and_visibility() {
        let (_store, manager) = setup().await;
        let first = manager.create_booking(TRAVELER, GUIDE, kyoto()).await.unwrap();
        let mut osaka = kyoto();
        osaka.destination = "Osaka".to_string();
        let second = manager.create_booking(TRAVELER, GUIDE, osaka).await.unwrap();

        let mine = manager.list_for_user(TRAVELER).await.unwrap();
        assert_eq!(mine.iter().map(|b| b.id).collect::<Vec<_>>(), vec![second.id, first.id]);
        assert_eq!(manager.list_for_guide(GUIDE).await.unwrap().len(), 2);
        assert!(manager.list_for_guide(TRAVELER).await.unwrap().is_empty());

        assert!(manager.get_booking(first.id, GUIDE).await.is_ok());
        assert!(matches!(
            manager.get_booking(first.id, 99).await,
            Err(CoreError::Unauthorized(_))
        ));
    }

    /// Sees the booking as pending once, loses every CAS, then fails all reads.
    struct LostRaceStore {
        booking: BookingRequest,
        reads: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl BookingRepository for LostRaceStore {
        async fn create_booking(
            &self,
            _booking: &NewBookingRequest,
            _notice: guidely_core::repository::NoticeFn<'_, BookingRequest>,
        ) -> guidely_core::repository::RepoResult<(BookingRequest, guidely_core::Notification)> {
            Err("not supported".into())
        }

        async fn get_booking(&self, _id: i64) -> guidely_core::repository::RepoResult<Option<BookingRequest>> {
            if self.reads.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                Ok(Some(self.booking.clone()))
            } else {
                Err("connection reset".into())
            }
        }

        async fn list_by_requester(&self, _user_id: i64) -> guidely_core::repository::RepoResult<Vec<BookingRequest>> {
            Ok(Vec::new())
        }

        async fn list_by_guide(&self, _guide_id: i64) -> guidely_core::repository::RepoResult<Vec<BookingRequest>> {
            Ok(Vec::new())
        }

        async fn compare_and_set_status(
            &self,
            _id: i64,
            _expected: BookingStatus,
            _next: BookingStatus,
            _notice: guidely_core::repository::NoticeFn<'_, BookingRequest>,
        ) -> guidely_core::repository::RepoResult<Option<(BookingRequest, guidely_core::Notification)>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_lost_race_with_failed_reread_is_still_invalid_transition() {
        let (store, manager) = setup().await;
        let booking = manager.create_booking(TRAVELER, GUIDE, kyoto()).await.unwrap();

        let racing = BookingManager::new(
            Arc::new(LostRaceStore { booking, reads: Default::default() }),
            store,
            Arc::new(NoopPublisher),
        );

        let err = racing
            .transition_status(1, BookingStatus::Accepted, GUIDE)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidTransition { ref from, ref to } if from == "unknown" && to == "accepted"
        ));
    }
}
