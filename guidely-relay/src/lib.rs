pub mod frames;
pub mod registry;

pub use frames::{InboundFrame, OutboundFrame};
pub use registry::{ConnectionId, Dispatch, OutboundText, Relay};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
    #[error("Connection {0} is closed")]
    ConnectionClosed(ConnectionId),
    #[error("Join the booking room before sending messages")]
    NotJoined,
    #[error("Frame addressed to booking {frame} but connection is in booking {room}")]
    RoomMismatch { frame: i64, room: i64 },
    #[error("Join refused: {0}")]
    JoinRefused(String),
    #[error("Booking lookup failed")]
    Lookup,
    #[error("Relay is at capacity ({0} connections)")]
    AtCapacity(usize),
}

pub type RelayResult<T> = Result<T, RelayError>;
