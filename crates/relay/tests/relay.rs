//! End-to-end tests driving a bound relay server over real WebSockets.

use futures::{SinkExt, StreamExt};
use relay::{create_router, AppState, ClientRegistry, LampRouter, Sweeper, SweeperConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WELCOME: &str = r#"{"isText":true,"text":"SSSite is Online!"}"#;

/// Sweep intervals long enough to never fire during a routing test.
fn idle_sweeps() -> SweeperConfig {
    SweeperConfig {
        heartbeat_interval: Duration::from_secs(600),
        keepalive_interval: Duration::from_secs(600),
    }
}

async fn spawn_relay(config: SweeperConfig) -> (SocketAddr, Arc<ClientRegistry>) {
    let registry = Arc::new(ClientRegistry::new());
    let router = Arc::new(LampRouter::new(registry.clone()));
    let _sweeps = Arc::new(Sweeper::new(registry.clone(), config)).spawn();

    let state = Arc::new(AppState {
        registry: registry.clone(),
        router,
    });
    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, registry)
}

async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _) = connect_async(format!("ws://{}/", addr)).await.unwrap();
    ws
}

async fn send_json(ws: &mut WsClient, payload: &str) {
    ws.send(Message::Text(payload.to_string())).await.unwrap();
}

/// Next text frame, skipping control frames.
async fn next_text(ws: &mut WsClient) -> String {
    loop {
        match timeout(Duration::from_secs(2), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return text,
            Ok(Some(Ok(_))) => continue,
            other => panic!("expected a text frame, got {:?}", other),
        }
    }
}

/// Assert no application frame arrives within `wait`. Control frames
/// (pings from the sweeper) are not deliveries and are ignored.
async fn assert_silent(ws: &mut WsClient, wait: Duration) {
    let delivery = timeout(wait, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text,
                Some(Ok(_)) => continue,
                _ => std::future::pending::<()>().await,
            }
        }
    })
    .await;
    if let Ok(text) = delivery {
        panic!("expected silence, got {:?}", text);
    }
}

#[tokio::test]
async fn admission_sends_welcome_to_new_client_only() {
    let (addr, _registry) = spawn_relay(idle_sweeps()).await;

    let mut a = connect(addr).await;
    assert_eq!(next_text(&mut a).await, WELCOME);

    // A second admission must not leak anything to the first client.
    let mut b = connect(addr).await;
    assert_eq!(next_text(&mut b).await, WELCOME);
    assert_silent(&mut a, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn updates_fan_out_to_the_whole_group() {
    let (addr, _registry) = spawn_relay(idle_sweeps()).await;

    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    let mut c = connect(addr).await;
    next_text(&mut a).await;
    next_text(&mut b).await;
    next_text(&mut c).await;

    // a and b join group 101; c joins 202. Joining echoes the join update
    // to every member admitted so far.
    send_json(&mut a, r#"{"groupId":101,"lampState":false}"#).await;
    assert_eq!(next_text(&mut a).await, r#"{"isText":false,"lampState":false}"#);
    send_json(&mut b, r#"{"groupId":101,"lampState":false}"#).await;
    next_text(&mut a).await;
    next_text(&mut b).await;
    send_json(&mut c, r#"{"groupId":202,"lampState":false}"#).await;
    next_text(&mut c).await;

    // One member's update reaches all of 101 — the sender included — and
    // none of 202.
    send_json(&mut a, r#"{"groupId":101,"lampState":true}"#).await;
    let expected = r#"{"isText":false,"lampState":true}"#;
    assert_eq!(next_text(&mut a).await, expected);
    assert_eq!(next_text(&mut b).await, expected);
    assert_silent(&mut c, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn numeric_and_string_group_ids_are_the_same_group() {
    let (addr, _registry) = spawn_relay(idle_sweeps()).await;

    let mut lamp = connect(addr).await;
    let mut dashboard = connect(addr).await;
    next_text(&mut lamp).await;
    next_text(&mut dashboard).await;

    send_json(&mut lamp, r#"{"groupId":101,"lampState":false}"#).await;
    next_text(&mut lamp).await;
    send_json(&mut dashboard, r#"{"groupId":"101","lampState":false}"#).await;
    next_text(&mut dashboard).await;

    send_json(&mut lamp, r#"{"groupId":101,"lampState":true}"#).await;
    assert_eq!(
        next_text(&mut dashboard).await,
        r#"{"isText":false,"lampState":true}"#
    );
}

#[tokio::test]
async fn group_switch_moves_deliveries() {
    let (addr, _registry) = spawn_relay(idle_sweeps()).await;

    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    next_text(&mut a).await;
    next_text(&mut b).await;

    send_json(&mut a, r#"{"groupId":"A","lampState":false}"#).await;
    next_text(&mut a).await;
    send_json(&mut b, r#"{"groupId":"A","lampState":false}"#).await;
    next_text(&mut a).await;
    next_text(&mut b).await;

    // b moves to group B; its switch echoes only to itself.
    send_json(&mut b, r#"{"groupId":"B","lampState":false}"#).await;
    next_text(&mut b).await;

    // A-traffic no longer reaches b.
    send_json(&mut a, r#"{"groupId":"A","lampState":true}"#).await;
    assert_eq!(next_text(&mut a).await, r#"{"isText":false,"lampState":true}"#);
    assert_silent(&mut b, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn malformed_payload_is_dropped_and_connection_survives() {
    let (addr, _registry) = spawn_relay(idle_sweeps()).await;

    let mut a = connect(addr).await;
    next_text(&mut a).await;

    send_json(&mut a, "not json at all").await;
    send_json(&mut a, r#"{"groupId":[1,2],"lampState":true}"#).await;
    assert_silent(&mut a, Duration::from_millis(300)).await;

    // Still connected and routable.
    send_json(&mut a, r#"{"groupId":101,"lampState":true}"#).await;
    assert_eq!(next_text(&mut a).await, r#"{"isText":false,"lampState":true}"#);
}

#[tokio::test]
async fn silent_client_is_reaped_within_two_sweeps() {
    let (addr, registry) = spawn_relay(SweeperConfig {
        heartbeat_interval: Duration::from_millis(150),
        keepalive_interval: Duration::from_secs(600),
    })
    .await;

    // Never reads, so its WebSocket stack never answers the pings.
    let _silent = connect(addr).await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(registry.client_count(), 1);

    // Poll until the sweeper has terminated it.
    let mut reaped = false;
    for _ in 0..20 {
        if registry.client_count() == 0 {
            reaped = true;
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }
    assert!(reaped, "silent client was never reaped");
}

#[tokio::test]
async fn responsive_client_is_never_reaped() {
    let (addr, registry) = spawn_relay(SweeperConfig {
        heartbeat_interval: Duration::from_millis(150),
        keepalive_interval: Duration::from_secs(600),
    })
    .await;

    let mut ws = connect(addr).await;
    // Reading the stream makes the client library answer pings with pongs.
    let reader = tokio::spawn(async move { while let Some(Ok(_)) = ws.next().await {} });

    sleep(Duration::from_millis(700)).await;
    assert_eq!(registry.client_count(), 1);
    reader.abort();
}

#[tokio::test]
async fn idle_but_live_client_receives_keepalive_notices() {
    let (addr, _registry) = spawn_relay(SweeperConfig {
        heartbeat_interval: Duration::from_secs(600),
        keepalive_interval: Duration::from_millis(150),
    })
    .await;

    let mut ws = connect(addr).await;
    assert_eq!(next_text(&mut ws).await, WELCOME);

    // One update proves liveness; the client then goes idle.
    send_json(&mut ws, r#"{"groupId":7,"lampState":false}"#).await;
    assert_eq!(next_text(&mut ws).await, r#"{"isText":false,"lampState":false}"#);

    // The client sends nothing more, yet notices keep arriving.
    assert_eq!(next_text(&mut ws).await, WELCOME);
    assert_eq!(next_text(&mut ws).await, WELCOME);
}
