use async_trait::async_trait;
use chrono::Utc;
use guidely_core::repository::{
    AccountDirectory, BookingRepository, MessageRepository, NoticeFn, NotificationRepository,
    RepoResult,
};
use guidely_core::{
    AccountRole, BookingRequest, BookingStatus, Message, NewBookingRequest, NewMessage,
    NewNotification, Notification,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Default)]
struct MemoryState {
    next_booking_id: i64,
    next_notification_id: i64,
    next_message_id: i64,
    accounts: HashMap<i64, AccountRole>,
    bookings: BTreeMap<i64, BookingRequest>,
    notifications: BTreeMap<i64, Notification>,
    messages: Vec<Message>,
}

impl MemoryState {
    fn insert_notification(&mut self, new: &NewNotification) -> Notification {
        self.next_notification_id += 1;
        let notification = Notification {
            id: self.next_notification_id,
            user_id: new.user_id,
            kind: new.kind,
            title: new.title.clone(),
            message: new.message.clone(),
            related_id: new.related_id,
            is_read: false,
            created_at: Utc::now(),
        };
        self.notifications.insert(notification.id, notification.clone());
        notification
    }
}

/// Process-local store implementing every repository trait.
///
/// Each write holds the single state lock for its whole unit of work, which
/// gives the same all-or-nothing behavior the Postgres transactions give.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_notification_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_account(&self, user_id: i64, role: AccountRole) {
        self.state.lock().await.accounts.insert(user_id, role);
    }

    /// Makes every notification write fail until switched off again. Writes
    /// that carry a notification roll back entirely.
    pub fn fail_notification_writes(&self, fail: bool) {
        self.fail_notification_writes.store(fail, Ordering::SeqCst);
    }

    fn check_notification_write(&self) -> RepoResult<()> {
        if self.fail_notification_writes.load(Ordering::SeqCst) {
            return Err("notification store unavailable".into());
        }
        Ok(())
    }

    pub async fn notification_count(&self) -> usize {
        self.state.lock().await.notifications.len()
    }
}

fn newest_first(mut bookings: Vec<BookingRequest>) -> Vec<BookingRequest> {
    bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    bookings
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn create_booking(
        &self,
        booking: &NewBookingRequest,
        notice: NoticeFn<'_, BookingRequest>,
    ) -> RepoResult<(BookingRequest, Notification)> {
        let mut state = self.state.lock().await;
        self.check_notification_write()?;

        let now = Utc::now();
        let created = BookingRequest {
            id: state.next_booking_id + 1,
            requester_id: booking.requester_id,
            guide_id: booking.guide_id,
            trip: booking.trip.clone(),
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        let new_notice = notice(&created);

        state.next_booking_id = created.id;
        state.bookings.insert(created.id, created.clone());
        let notification = state.insert_notification(&new_notice);

        Ok((created, notification))
    }

    async fn get_booking(&self, id: i64) -> RepoResult<Option<BookingRequest>> {
        Ok(self.state.lock().await.bookings.get(&id).cloned())
    }

    async fn list_by_requester(&self, user_id: i64) -> RepoResult<Vec<BookingRequest>> {
        let state = self.state.lock().await;
        Ok(newest_first(
            state.bookings.values().filter(|b| b.requester_id == user_id).cloned().collect(),
        ))
    }

    async fn list_by_guide(&self, guide_id: i64) -> RepoResult<Vec<BookingRequest>> {
        let state = self.state.lock().await;
        Ok(newest_first(
            state.bookings.values().filter(|b| b.guide_id == guide_id).cloned().collect(),
        ))
    }

    async fn compare_and_set_status(
        &self,
        id: i64,
        expected: BookingStatus,
        next: BookingStatus,
        notice: NoticeFn<'_, BookingRequest>,
    ) -> RepoResult<Option<(BookingRequest, Notification)>> {
        let mut state = self.state.lock().await;

        let current = match state.bookings.get(&id) {
            Some(b) if b.status == expected => b.clone(),
            _ => return Ok(None),
        };
        self.check_notification_write()?;

        let mut updated = current;
        updated.status = next;
        updated.updated_at = Utc::now();
        let new_notice = notice(&updated);

        state.bookings.insert(id, updated.clone());
        let notification = state.insert_notification(&new_notice);

        Ok(Some((updated, notification)))
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn create_notification(&self, notification: &NewNotification) -> RepoResult<Notification> {
        let mut state = self.state.lock().await;
        self.check_notification_write()?;
        Ok(state.insert_notification(notification))
    }

    async fn get_notification(&self, id: i64) -> RepoResult<Option<Notification>> {
        Ok(self.state.lock().await.notifications.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: i64, unread_only: bool) -> RepoResult<Vec<Notification>> {
        let state = self.state.lock().await;
        let mut found: Vec<Notification> = state
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.is_read))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn unread_count(&self, user_id: i64) -> RepoResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count() as i64)
    }

    async fn mark_read(&self, id: i64) -> RepoResult<bool> {
        let mut state = self.state.lock().await;
        match state.notifications.get_mut(&id) {
            Some(n) => {
                n.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_read(&self, user_id: i64) -> RepoResult<u64> {
        let mut state = self.state.lock().await;
        let mut flipped = 0;
        for n in state.notifications.values_mut() {
            if n.user_id == user_id && !n.is_read {
                n.is_read = true;
                flipped += 1;
            }
        }
        Ok(flipped)
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn append_message(
        &self,
        message: &NewMessage,
        notice: NoticeFn<'_, Message>,
    ) -> RepoResult<(Message, Notification)> {
        let mut state = self.state.lock().await;
        if !state.bookings.contains_key(&message.booking_id) {
            return Err(format!("booking {} does not exist", message.booking_id).into());
        }
        self.check_notification_write()?;

        let stored = Message {
            id: state.next_message_id + 1,
            booking_id: message.booking_id,
            sender_id: message.sender_id,
            sender_type: message.sender_type,
            body: message.body.clone(),
            message_type: "text".to_string(),
            created_at: Utc::now(),
        };
        let new_notice = notice(&stored);

        state.next_message_id = stored.id;
        state.messages.push(stored.clone());
        let notification = state.insert_notification(&new_notice);

        Ok((stored, notification))
    }

    async fn list_by_booking(&self, booking_id: i64) -> RepoResult<Vec<Message>> {
        let state = self.state.lock().await;
        // Appended in id order, which is also creation order.
        Ok(state.messages.iter().filter(|m| m.booking_id == booking_id).cloned().collect())
    }
}

#[async_trait]
impl AccountDirectory for MemoryStore {
    async fn role_of(&self, user_id: i64) -> RepoResult<Option<AccountRole>> {
        Ok(self.state.lock().await.accounts.get(&user_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guidely_core::{NotificationKind, TripDetails, TripInput};

    fn new_booking() -> NewBookingRequest {
        NewBookingRequest {
            requester_id: 42,
            guide_id: 7,
            trip: TripDetails::parse(TripInput {
                destination: "Kyoto".to_string(),
                date: "2025-05-01".to_string(),
                ..Default::default()
            })
            .unwrap(),
        }
    }

    fn notice_for(user_id: i64, kind: NotificationKind) -> impl Fn(&BookingRequest) -> NewNotification {
        move |b| NewNotification {
            user_id,
            kind,
            title: "t".to_string(),
            message: "m".to_string(),
            related_id: b.id,
        }
    }

    #[tokio::test]
    async fn test_compare_and_set_only_moves_from_expected() {
        let store = MemoryStore::new();
        let (booking, notification) = store
            .create_booking(&new_booking(), &notice_for(7, NotificationKind::BookingRequest))
            .await
            .unwrap();
        assert_eq!(notification.related_id, booking.id);

        let accept = notice_for(42, NotificationKind::BookingAccepted);
        let first = store
            .compare_and_set_status(booking.id, BookingStatus::Pending, BookingStatus::Accepted, &accept)
            .await
            .unwrap();
        assert!(first.is_some());

        let second = store
            .compare_and_set_status(booking.id, BookingStatus::Pending, BookingStatus::Declined, &accept)
            .await
            .unwrap();
        assert!(second.is_none());
        assert_eq!(store.notification_count().await, 2);
    }

    #[tokio::test]
    async fn test_failed_notification_write_leaves_nothing_behind() {
        let store = MemoryStore::new();
        store.fail_notification_writes(true);

        let result = store
            .create_booking(&new_booking(), &notice_for(7, NotificationKind::BookingRequest))
            .await;

        assert!(result.is_err());
        assert!(store.list_by_requester(42).await.unwrap().is_empty());
        assert_eq!(store.notification_count().await, 0);
    }
}
