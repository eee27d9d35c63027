//! End-to-end tests for `/v1/ws` over a real socket.

use futures_util::{SinkExt, StreamExt};
use guidely_api::middleware::issue_token;
use guidely_api::{app, AppState, AuthConfig, Backends, Limits};
use guidely_core::events::NoopPublisher;
use guidely_core::{AccountRole, TripInput};
use guidely_store::MemoryStore;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const SECRET: &str = "test-secret";
const TRAVELER: i64 = 42;
const GUIDE: i64 = 7;
const MAX_CONNECTIONS: usize = 2;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serves the app on an ephemeral port and creates one booking between the traveler and the guide.
async fn serve() -> (SocketAddr, i64) {
    let store = Arc::new(MemoryStore::new());
    store.add_account(TRAVELER, AccountRole::User).await;
    store.add_account(GUIDE, AccountRole::Guide).await;

    let state = AppState::new(
        Backends::memory(store, Arc::new(NoopPublisher)),
        None,
        AuthConfig { secret: SECRET.to_string() },
        Limits { max_relay_connections: MAX_CONNECTIONS, ..Limits::default() },
    )
    .unwrap();

    let booking = state
        .bookings
        .create_booking(
            TRAVELER,
            GUIDE,
            TripInput {
                destination: "Kyoto".to_string(),
                date: "2025-05-01".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state).into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });

    (addr, booking.id)
}

fn ws_url(addr: SocketAddr, user_id: i64, role: AccountRole) -> String {
    let token = issue_token(SECRET, user_id, role, 3600).unwrap();
    format!("ws://{}/v1/ws?token={}", addr, token)
}

async fn open(url: &str) -> Client {
    let (client, _) = connect_async(url).await.unwrap();
    client
}

/// The HTTP status the upgrade was refused with.
async fn refused_status(url: &str) -> u16 {
    match connect_async(url).await {
        Err(tungstenite::Error::Http(response)) => response.status().as_u16(),
        Err(e) => panic!("unexpected handshake error: {}", e),
        Ok(_) => panic!("upgrade was accepted"),
    }
}

async fn send(client: &mut Client, frame: &str) {
    client.send(Message::Text(frame.to_string().into())).await.unwrap();
}

async fn next_text(client: &mut Client) -> String {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if msg.is_text() {
            return msg.into_text().unwrap().to_string();
        }
    }
}

async fn next_json(client: &mut Client) -> Value {
    serde_json::from_str(&next_text(client).await).unwrap()
}

async fn assert_silent(client: &mut Client) {
    let waited = tokio::time::timeout(Duration::from_millis(300), client.next()).await;
    assert!(waited.is_err(), "unexpected frame: {:?}", waited);
}

async fn join(client: &mut Client, booking_id: i64, user_id: i64) {
    send(client, &json!({ "type": "join_booking", "bookingId": booking_id, "userId": user_id }).to_string()).await;
    assert_eq!(next_json(client).await, json!({ "type": "joined", "bookingId": booking_id }));
}

#[tokio::test]
async fn test_room_relay_over_websocket() {
    let (addr, booking_id) = serve().await;
    let mut traveler = open(&ws_url(addr, TRAVELER, AccountRole::User)).await;
    let mut guide = open(&ws_url(addr, GUIDE, AccountRole::Guide)).await;

    join(&mut traveler, booking_id, TRAVELER).await;
    join(&mut guide, booking_id, GUIDE).await;

    let frame = json!({
        "type": "new_message",
        "bookingId": booking_id,
        "message": { "body": "See you at the station", "senderId": TRAVELER }
    })
    .to_string();
    send(&mut traveler, &frame).await;

    // Forwarded verbatim to the peer.
    assert_eq!(next_text(&mut guide).await, frame);

    // The sender gets no echo: its next frame is the reply to the bad frame below.
    send(&mut traveler, "not json").await;
    let reply = next_json(&mut traveler).await;
    assert_eq!(reply["type"], "error");
    assert!(reply["message"].as_str().unwrap().starts_with("Malformed frame"));

    // The error went to the offending socket only.
    assert_silent(&mut guide).await;
}

#[tokio::test]
async fn test_upgrade_requires_valid_token() {
    let (addr, _) = serve().await;

    assert_eq!(refused_status(&format!("ws://{}/v1/ws", addr)).await, 401);
    assert_eq!(refused_status(&format!("ws://{}/v1/ws?token=garbage", addr)).await, 401);

    let forged = issue_token("other-secret", TRAVELER, AccountRole::User, 3600).unwrap();
    assert_eq!(refused_status(&format!("ws://{}/v1/ws?token={}", addr, forged)).await, 401);
}

#[tokio::test]
async fn test_connection_past_cap_is_refused() {
    let (addr, _) = serve().await;

    let mut held = Vec::new();
    for _ in 0..MAX_CONNECTIONS {
        held.push(open(&ws_url(addr, TRAVELER, AccountRole::User)).await);
    }

    assert_eq!(refused_status(&ws_url(addr, GUIDE, AccountRole::Guide)).await, 503);

    // Dropping one connection frees its slot once the server sees the close.
    let mut closing = held.pop().unwrap();
    closing.close(None).await.unwrap();
    drop(closing);

    let mut admitted = false;
    for _ in 0..20 {
        if connect_async(ws_url(addr, GUIDE, AccountRole::Guide)).await.is_ok() {
            admitted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(admitted, "freed slot was never reusable");
}
