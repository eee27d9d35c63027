use chrono::{DateTime, NaiveDate, Utc};
use guidely_shared::Masked;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

const MAX_DESTINATION_LEN: usize = 200;
const MAX_SHORT_FIELD_LEN: usize = 50;
const MAX_BUDGET_LEN: usize = 100;
const MAX_SPECIAL_REQUESTS_LEN: usize = 2000;
const MAX_TRAVELERS: i32 = 50;
pub const MAX_MESSAGE_LEN: usize = 4000;

/// Booking request status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Declined,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Declined => "declined",
        }
    }

    /// Accepted and declined requests never change again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BookingStatus::Pending)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "accepted" => Ok(BookingStatus::Accepted),
            "declined" => Ok(BookingStatus::Declined),
            other => Err(CoreError::Validation(format!("unknown booking status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountRole {
    User,
    Guide,
    Admin,
}

impl AccountRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountRole::User => "user",
            AccountRole::Guide => "guide",
            AccountRole::Admin => "admin",
        }
    }
}

impl FromStr for AccountRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(AccountRole::User),
            "guide" => Ok(AccountRole::Guide),
            "admin" => Ok(AccountRole::Admin),
            other => Err(CoreError::Validation(format!("unknown account role '{}'", other))),
        }
    }
}

/// Trip fields as submitted by a traveler, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripInput {
    pub destination: String,
    pub date: String,
    pub time: Option<String>,
    pub duration: Option<String>,
    pub travelers: Option<i32>,
    pub budget: Option<String>,
    pub special_requests: Option<String>,
}

/// Validated, normalized trip fields. Immutable once attached to a booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TripDetails {
    pub destination: String,
    pub date: NaiveDate,
    pub time: Option<String>,
    pub duration: Option<String>,
    pub travelers: i32,
    pub budget: Option<String>,
    pub special_requests: Option<String>,
}

impl TripDetails {
    pub fn parse(input: TripInput) -> Result<Self, CoreError> {
        let destination = input.destination.trim().to_string();
        if destination.is_empty() {
            return Err(CoreError::Validation("destination is required".to_string()));
        }
        if destination.chars().count() > MAX_DESTINATION_LEN {
            return Err(CoreError::Validation(format!(
                "destination must be at most {} characters",
                MAX_DESTINATION_LEN
            )));
        }

        let date_str = input.date.trim();
        if date_str.is_empty() {
            return Err(CoreError::Validation("date is required".to_string()));
        }
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|_| {
            CoreError::Validation(format!("date '{}' is not in YYYY-MM-DD format", date_str))
        })?;

        let travelers = input.travelers.unwrap_or(1);
        if !(1..=MAX_TRAVELERS).contains(&travelers) {
            return Err(CoreError::Validation(format!(
                "travelers must be between 1 and {}",
                MAX_TRAVELERS
            )));
        }

        Ok(Self {
            destination,
            date,
            time: optional_text("time", input.time, MAX_SHORT_FIELD_LEN)?,
            duration: optional_text("duration", input.duration, MAX_SHORT_FIELD_LEN)?,
            travelers,
            budget: optional_text("budget", input.budget, MAX_BUDGET_LEN)?,
            special_requests: optional_text(
                "special_requests",
                input.special_requests,
                MAX_SPECIAL_REQUESTS_LEN,
            )?,
        })
    }
}

// Blank optional fields are stored as absent.
fn optional_text(field: &str, value: Option<String>, max: usize) -> Result<Option<String>, CoreError> {
    match value.map(|v| v.trim().to_string()) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) if v.chars().count() > max => Err(CoreError::Validation(format!(
            "{} must be at most {} characters",
            field, max
        ))),
        Some(v) => Ok(Some(v)),
    }
}

/// A traveler's proposal to engage a specific guide for a trip
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingRequest {
    pub id: i64,
    pub requester_id: i64,
    pub guide_id: i64,
    #[serde(flatten)]
    pub trip: TripDetails,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookingRequest {
    pub fn is_party(&self, user_id: i64) -> bool {
        self.requester_id == user_id || self.guide_id == user_id
    }

    /// The participant on the other side of the conversation from `user_id`.
    pub fn counterpart_of(&self, user_id: i64) -> Option<i64> {
        if user_id == self.requester_id {
            Some(self.guide_id)
        } else if user_id == self.guide_id {
            Some(self.requester_id)
        } else {
            None
        }
    }

    pub fn sender_type_of(&self, user_id: i64) -> Option<SenderType> {
        if user_id == self.guide_id {
            Some(SenderType::Guide)
        } else if user_id == self.requester_id {
            Some(SenderType::User)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewBookingRequest {
    pub requester_id: i64,
    pub guide_id: i64,
    pub trip: TripDetails,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingRequest,
    BookingAccepted,
    BookingDeclined,
    NewMessage,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BookingRequest => "booking_request",
            NotificationKind::BookingAccepted => "booking_accepted",
            NotificationKind::BookingDeclined => "booking_declined",
            NotificationKind::NewMessage => "new_message",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "booking_request" => Ok(NotificationKind::BookingRequest),
            "booking_accepted" => Ok(NotificationKind::BookingAccepted),
            "booking_declined" => Ok(NotificationKind::BookingDeclined),
            "new_message" => Ok(NotificationKind::NewMessage),
            other => Err(CoreError::Validation(format!("unknown notification type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_id: i64,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_id: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    User,
    Guide,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderType::User => "user",
            SenderType::Guide => "guide",
        }
    }
}

impl FromStr for SenderType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(SenderType::User),
            "guide" => Ok(SenderType::Guide),
            other => Err(CoreError::Validation(format!("unknown sender type '{}'", other))),
        }
    }
}

/// Append-only chat message bound to a booking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: i64,
    pub booking_id: i64,
    pub sender_id: i64,
    pub sender_type: SenderType,
    pub body: Masked<String>,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub booking_id: i64,
    pub sender_id: i64,
    pub sender_type: SenderType,
    pub body: Masked<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kyoto() -> TripInput {
        TripInput {
            destination: "  Kyoto ".to_string(),
            date: "2025-05-01".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_trip_parse_normalizes_fields() {
        let mut input = kyoto();
        input.budget = Some("   ".to_string());
        input.time = Some(" 09:00 ".to_string());

        let trip = TripDetails::parse(input).unwrap();
        assert_eq!(trip.destination, "Kyoto");
        assert_eq!(trip.date, NaiveDate::from_ymd_opt(2025, 5, 1).unwrap());
        assert_eq!(trip.travelers, 1);
        assert_eq!(trip.time.as_deref(), Some("09:00"));
        assert_eq!(trip.budget, None);
    }

    #[test]
    fn test_trip_parse_rejects_bad_input() {
        let mut missing_destination = kyoto();
        missing_destination.destination = " ".to_string();
        assert!(matches!(
            TripDetails::parse(missing_destination),
            Err(CoreError::Validation(_))
        ));

        let mut bad_date = kyoto();
        bad_date.date = "01/05/2025".to_string();
        assert!(matches!(TripDetails::parse(bad_date), Err(CoreError::Validation(_))));

        let mut no_travelers = kyoto();
        no_travelers.travelers = Some(0);
        assert!(matches!(TripDetails::parse(no_travelers), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_status_terminality() {
        assert!(!BookingStatus::Pending.is_terminal());
        assert!(BookingStatus::Accepted.is_terminal());
        assert!(BookingStatus::Declined.is_terminal());
        assert_eq!("declined".parse::<BookingStatus>().unwrap(), BookingStatus::Declined);
        assert!("cancelled".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn test_booking_parties() {
        let now = Utc::now();
        let booking = BookingRequest {
            id: 5,
            requester_id: 42,
            guide_id: 7,
            trip: TripDetails::parse(kyoto()).unwrap(),
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        assert!(booking.is_party(42) && booking.is_party(7));
        assert!(!booking.is_party(9));
        assert_eq!(booking.counterpart_of(42), Some(7));
        assert_eq!(booking.sender_type_of(7), Some(SenderType::Guide));
        assert_eq!(booking.sender_type_of(9), None);
    }
}
