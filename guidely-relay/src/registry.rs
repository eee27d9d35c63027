use guidely_core::repository::BookingRepository;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::frames::{InboundFrame, OutboundFrame};
use crate::{RelayError, RelayResult};

/// Outbound queue item: the exact text to write to the socket.
pub type OutboundText = Arc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Connecting,
    Joined { booking_id: i64 },
}

struct ConnectionEntry {
    /// Authenticated user behind the socket.
    user_id: i64,
    state: ConnectionState,
    outbound: mpsc::UnboundedSender<OutboundText>,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<i64, HashSet<ConnectionId>>,
}

impl Registry {
    fn leave_room(&mut self, id: ConnectionId, booking_id: i64) {
        if let Some(members) = self.rooms.get_mut(&booking_id) {
            members.remove(&id);
            if members.is_empty() {
                self.rooms.remove(&booking_id);
            }
        }
    }
}

/// What a handled frame did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Joined { booking_id: i64 },
    Broadcast { booking_id: i64, delivered: usize },
}

/// Best-effort mirror of chat activity to the other live viewers of a booking.
///
/// A connection is `Connecting` after [`Relay::connect`], `Joined` to at most
/// one room after a successful [`Relay::join`], and gone after
/// [`Relay::close`]. Rooms exist only while they have members.
pub struct Relay {
    registry: RwLock<Registry>,
    bookings: Arc<dyn BookingRepository>,
    max_connections: usize,
}

impl Relay {
    pub fn new(bookings: Arc<dyn BookingRepository>, max_connections: usize) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            bookings,
            max_connections,
        }
    }

    /// Registers a connection for an authenticated user, unless the relay
    /// already holds `max_connections`. The receiver yields every frame
    /// addressed to it; dropping the receiver makes sends to the connection
    /// silently fail.
    pub async fn connect(
        &self,
        user_id: i64,
    ) -> RelayResult<(ConnectionId, mpsc::UnboundedReceiver<OutboundText>)> {
        let mut registry = self.registry.write().await;
        if registry.connections.len() >= self.max_connections {
            warn!("Relay full ({} connections), refusing user {}", self.max_connections, user_id);
            return Err(RelayError::AtCapacity(self.max_connections));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let id = ConnectionId::new();

        registry.connections.insert(
            id,
            ConnectionEntry {
                user_id,
                state: ConnectionState::Connecting,
                outbound: tx,
            },
        );
        debug!("Relay connection {} opened for user {}", id, user_id);

        Ok((id, rx))
    }

    /// Admits the connection to the booking's room if `user_id` is the
    /// connection's own user and a party to the booking. A connection already
    /// in another room moves.
    pub async fn join(&self, id: ConnectionId, booking_id: i64, user_id: i64) -> RelayResult<()> {
        let owner = {
            let registry = self.registry.read().await;
            registry
                .connections
                .get(&id)
                .map(|c| c.user_id)
                .ok_or(RelayError::ConnectionClosed(id))?
        };
        if owner != user_id {
            warn!("Connection {} of user {} tried to join as user {}", id, owner, user_id);
            return Err(RelayError::JoinRefused("user does not match the connection".to_string()));
        }

        // Looked up without holding the registry lock.
        let booking = self
            .bookings
            .get_booking(booking_id)
            .await
            .map_err(|e| {
                error!("Booking lookup for relay join failed: {}", e);
                RelayError::Lookup
            })?
            .ok_or_else(|| RelayError::JoinRefused(format!("booking {} does not exist", booking_id)))?;
        if !booking.is_party(user_id) {
            warn!("User {} refused from booking room {}", user_id, booking_id);
            return Err(RelayError::JoinRefused(format!(
                "user {} is not a party to booking {}",
                user_id, booking_id
            )));
        }

        let mut registry = self.registry.write().await;
        let previous = match registry.connections.get_mut(&id) {
            Some(entry) => std::mem::replace(&mut entry.state, ConnectionState::Joined { booking_id }),
            // Closed while the lookup was in flight.
            None => return Err(RelayError::ConnectionClosed(id)),
        };
        if let ConnectionState::Joined { booking_id: old } = previous {
            if old != booking_id {
                registry.leave_room(id, old);
            }
        }
        registry.rooms.entry(booking_id).or_default().insert(id);

        debug!("Connection {} (user {}) joined booking room {}", id, user_id, booking_id);
        Ok(())
    }

    /// Forwards `raw` unchanged to every other connection in the sender's room.
    /// Returns how many queues accepted it; stale connections are skipped.
    pub async fn on_message(&self, id: ConnectionId, booking_id: i64, raw: &str) -> RelayResult<usize> {
        // Snapshot recipients, then send without holding the lock.
        let recipients: Vec<mpsc::UnboundedSender<OutboundText>> = {
            let registry = self.registry.read().await;
            let entry = registry.connections.get(&id).ok_or(RelayError::ConnectionClosed(id))?;
            let room = match entry.state {
                ConnectionState::Joined { booking_id } => booking_id,
                ConnectionState::Connecting => return Err(RelayError::NotJoined),
            };
            if room != booking_id {
                return Err(RelayError::RoomMismatch { frame: booking_id, room });
            }

            registry
                .rooms
                .get(&room)
                .into_iter()
                .flatten()
                .filter(|member| **member != id)
                .filter_map(|member| registry.connections.get(member))
                .map(|c| c.outbound.clone())
                .collect()
        };

        let text: OutboundText = Arc::from(raw);
        let delivered = recipients
            .iter()
            .filter(|tx| tx.send(text.clone()).is_ok())
            .count();

        debug!(
            "Relayed frame from {} to {}/{} peers in booking room {}",
            id,
            delivered,
            recipients.len(),
            booking_id
        );
        Ok(delivered)
    }

    /// Parses and dispatches one inbound text frame. A successful join is
    /// acknowledged to the joining connection only.
    pub async fn handle_frame(&self, id: ConnectionId, raw: &str) -> RelayResult<Dispatch> {
        match InboundFrame::parse(raw)? {
            InboundFrame::JoinBooking { booking_id, user_id } => {
                self.join(id, booking_id, user_id).await?;
                self.send_to(id, &OutboundFrame::Joined { booking_id }).await;
                Ok(Dispatch::Joined { booking_id })
            }
            InboundFrame::NewMessage { booking_id } => {
                let delivered = self.on_message(id, booking_id, raw).await?;
                Ok(Dispatch::Broadcast { booking_id, delivered })
            }
        }
    }

    /// Queues a relay-generated frame for one connection. Dropped if it is gone.
    pub async fn send_to(&self, id: ConnectionId, frame: &OutboundFrame) {
        let registry = self.registry.read().await;
        if let Some(entry) = registry.connections.get(&id) {
            let _ = entry.outbound.send(Arc::from(frame.to_text()));
        }
    }

    /// Removes the connection and its room membership. Closing twice is harmless.
    pub async fn close(&self, id: ConnectionId) {
        let mut registry = self.registry.write().await;
        if let Some(entry) = registry.connections.remove(&id) {
            if let ConnectionState::Joined { booking_id } = entry.state {
                registry.leave_room(id, booking_id);
            }
            debug!("Relay connection {} closed", id);
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.read().await.connections.len()
    }

    pub async fn room_size(&self, booking_id: i64) -> usize {
        self.registry
            .read()
            .await
            .rooms
            .get(&booking_id)
            .map_or(0, HashSet::len)
    }
}
