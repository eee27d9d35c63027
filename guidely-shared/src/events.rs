use serde::{Deserialize, Serialize};

/// Kafka topics the booking workflow publishes to.
pub mod topics {
    pub const BOOKING_REQUESTED: &str = "booking.requested";
    pub const BOOKING_ACCEPTED: &str = "booking.accepted";
    pub const BOOKING_DECLINED: &str = "booking.declined";
    pub const MESSAGE_SENT: &str = "message.sent";
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BookingRequestedEvent {
    pub booking_id: i64,
    pub requester_id: i64,
    pub guide_id: i64,
    pub destination: String,
    pub trip_date: String,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BookingDecidedEvent {
    pub booking_id: i64,
    pub requester_id: i64,
    pub guide_id: i64,
    pub status: String,
    pub timestamp: i64,
}

/// Carries ids only. Message bodies never leave the store through the event bus.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MessageSentEvent {
    pub message_id: i64,
    pub booking_id: i64,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub timestamp: i64,
}
