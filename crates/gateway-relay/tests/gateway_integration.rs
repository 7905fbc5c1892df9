//! Gateway integration tests.
//!
//! Drives full sessions against a mock gateway: over loopback TCP for the
//! public `start` entry point, and over an in-memory duplex stream with
//! paused time for heartbeat scheduling.
//!
//! Server-side helpers never time out on their own, since paused time would
//! fire them early; each TCP session is bounded on the client side instead.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gateway_proto::{ClientMetadata, GatewayMessage, IdentifyPayload, Opcode};
use gateway_relay::gateway::Connection;
use gateway_relay::{
    ChannelSink, ClientOptions, CloseReason, GatewayClient, RelayError, SessionPhase,
};
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{WebSocketStream, accept_async, client_async};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Test Helpers - Mock Gateway Server
// ============================================================================

/// A mock gateway server for testing.
struct MockGateway {
    listener: TcpListener,
    addr: SocketAddr,
}

impl MockGateway {
    /// Create a new mock gateway bound to an available port.
    async fn new() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock gateway");
        let addr = listener.local_addr().expect("no local addr");
        Self { listener, addr }
    }

    /// Get the WebSocket URL for this gateway.
    fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Accept a single connection and return the WebSocket stream.
    async fn accept(&self) -> WebSocketStream<TcpStream> {
        let (stream, _) = self.listener.accept().await.expect("accept failed");
        accept_async(stream).await.expect("websocket upgrade failed")
    }

    /// Accept a connection, read identify and answer with hello.
    async fn accept_and_hello(&self, interval_ms: u64) -> (WebSocketStream<TcpStream>, Value) {
        let mut ws = self.accept().await;
        let identify = read_message(&mut ws).await;
        assert_eq!(identify.op, Opcode::Identify);
        send_message(&mut ws, &GatewayMessage::hello(interval_ms)).await;
        (ws, identify.data)
    }
}

async fn read_message<S>(ws: &mut WebSocketStream<S>) -> GatewayMessage
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let frame = ws.next().await.expect("stream ended").expect("read failed");
        match frame {
            Message::Text(text) => {
                return GatewayMessage::from_json(text.as_str()).expect("client sent bad json");
            }
            Message::Close(_) => panic!("client closed while a message was expected"),
            _ => {}
        }
    }
}

async fn send_message<S>(ws: &mut WebSocketStream<S>, message: &GatewayMessage)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let json = message.to_json().expect("encode failed");
    ws.send(Message::Text(json.into())).await.expect("send failed");
}

async fn send_close<S>(ws: &mut WebSocketStream<S>, reason: &str)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    ws.send(Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: reason.into(),
    })))
    .await
    .expect("close failed");
}

/// Read until the client closes; returns true if a close frame arrived.
async fn drain<S>(ws: &mut WebSocketStream<S>) -> bool
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(Ok(frame)) = ws.next().await {
        if frame.is_close() {
            return true;
        }
    }
    false
}

/// Read frames until a heartbeat arrives.
async fn next_heartbeat<S>(ws: &mut WebSocketStream<S>) -> GatewayMessage
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let message = read_message(ws).await;
        if message.op == Opcode::Heartbeat {
            return message;
        }
    }
}

fn test_payload() -> IdentifyPayload {
    IdentifyPayload::new("test-token", ClientMetadata::default())
}

fn test_client() -> GatewayClient {
    GatewayClient::new(ClientOptions {
        connect_timeout: Duration::from_secs(2),
        hello_timeout: Duration::from_secs(2),
        ..ClientOptions::default()
    })
}

// ============================================================================
// Handshake Tests
// ============================================================================

#[tokio::test]
async fn test_identify_then_dispatch_forwarded() {
    let gateway = MockGateway::new().await;
    let url = gateway.url();

    let server = tokio::spawn(async move {
        let (mut ws, identify) = gateway.accept_and_hello(60_000).await;
        send_message(
            &mut ws,
            &GatewayMessage::dispatch("READY", 1, json!({"session_id": "abc"})),
        )
        .await;
        send_close(&mut ws, "bye").await;
        drain(&mut ws).await;
        identify
    });

    let client = test_client();
    let (sink, mut events) = ChannelSink::new(16);

    let reason = timeout(TEST_TIMEOUT, client.start(&url, &test_payload(), &sink))
        .await
        .expect("session did not end");
    let reason = tokio_test::assert_ok!(reason);

    assert_eq!(
        reason,
        CloseReason::Remote {
            code: Some(1000),
            reason: "bye".to_string()
        }
    );
    assert_eq!(client.phase(), SessionPhase::Closed);
    assert_eq!(client.last_sequence(), Some(1));

    let ready = events.recv().await.expect("dispatch not forwarded");
    assert_eq!(ready.op, Opcode::Dispatch);
    assert_eq!(ready.event_type.as_deref(), Some("READY"));
    assert_eq!(ready.data["session_id"], "abc");

    let identify = server.await.expect("server task panicked");
    assert_eq!(identify["token"], "test-token");
    assert_eq!(identify["capabilities"], 16_381);
    assert_eq!(identify["properties"]["browser"], "Firefox");
    assert_eq!(identify["compress"], false);
}

#[tokio::test]
async fn test_non_hello_first_frame_is_protocol_error() {
    let gateway = MockGateway::new().await;
    let url = gateway.url();

    let server = tokio::spawn(async move {
        let mut ws = gateway.accept().await;
        read_message(&mut ws).await;
        send_message(&mut ws, &GatewayMessage::dispatch("READY", 1, json!({}))).await;
        drain(&mut ws).await
    });

    let client = test_client();
    let (sink, mut events) = ChannelSink::new(4);

    let result = client.start(&url, &test_payload(), &sink).await;

    assert!(matches!(result, Err(RelayError::Protocol(_))));
    assert_eq!(client.phase(), SessionPhase::Closed);
    assert!(events.try_recv().is_err());
    assert!(server.await.expect("server task panicked"));
}

async fn assert_malformed_hello(first_frame: &'static str) {
    let gateway = MockGateway::new().await;
    let url = gateway.url();

    let server = tokio::spawn(async move {
        let mut ws = gateway.accept().await;
        read_message(&mut ws).await;
        ws.send(Message::Text(first_frame.into()))
            .await
            .expect("send failed");
        drain(&mut ws).await
    });

    let client = test_client();
    let (sink, mut events) = ChannelSink::new(4);

    let result = timeout(TEST_TIMEOUT, client.start(&url, &test_payload(), &sink))
        .await
        .expect("session did not end");

    match result {
        Err(RelayError::Protocol(msg)) => assert!(msg.contains("malformed hello"), "{msg}"),
        other => panic!("expected protocol error, got {other:?}"),
    }
    assert_eq!(client.phase(), SessionPhase::Closed);
    assert!(events.try_recv().is_err());
    assert!(server.await.expect("server task panicked"));
}

#[tokio::test]
async fn test_non_json_first_frame_is_malformed_hello() {
    assert_malformed_hello("not json").await;
}

#[tokio::test]
async fn test_first_frame_without_op_is_malformed_hello() {
    assert_malformed_hello(r#"{"d": {}}"#).await;
}

#[tokio::test]
async fn test_zero_heartbeat_interval_is_protocol_error() {
    let gateway = MockGateway::new().await;
    let url = gateway.url();

    let server = tokio::spawn(async move {
        let (mut ws, _) = gateway.accept_and_hello(0).await;
        drain(&mut ws).await;
    });

    let client = test_client();
    let (sink, _events) = ChannelSink::new(4);

    let result = client.start(&url, &test_payload(), &sink).await;

    match result {
        Err(RelayError::Protocol(msg)) => assert!(msg.contains("positive")),
        other => panic!("expected protocol error, got {other:?}"),
    }
    server.await.expect("server task panicked");
}

#[tokio::test]
async fn test_hello_timeout() {
    let gateway = MockGateway::new().await;
    let url = gateway.url();

    let server = tokio::spawn(async move {
        let mut ws = gateway.accept().await;
        read_message(&mut ws).await;
        // Never send hello.
        drain(&mut ws).await;
    });

    let client = GatewayClient::new(ClientOptions {
        hello_timeout: Duration::from_millis(200),
        ..ClientOptions::default()
    });
    let (sink, _events) = ChannelSink::new(4);

    let result = client.start(&url, &test_payload(), &sink).await;

    match result {
        Err(RelayError::Protocol(msg)) => assert!(msg.contains("timed out")),
        other => panic!("expected protocol error, got {other:?}"),
    }
    assert_eq!(client.phase(), SessionPhase::Closed);
    server.await.expect("server task panicked");
}

#[tokio::test]
async fn test_client_is_single_use() {
    let gateway = MockGateway::new().await;
    let url = gateway.url();

    let server = tokio::spawn(async move {
        let (mut ws, _) = gateway.accept_and_hello(60_000).await;
        send_close(&mut ws, "").await;
        drain(&mut ws).await;
    });

    let client = test_client();
    let (sink, _events) = ChannelSink::new(4);

    tokio_test::assert_ok!(client.start(&url, &test_payload(), &sink).await);
    server.await.expect("server task panicked");

    let again = client.start(&url, &test_payload(), &sink).await;
    assert!(matches!(again, Err(RelayError::Connection(_))));
}

// ============================================================================
// Session Tests
// ============================================================================

#[tokio::test]
async fn test_heartbeat_carries_last_sequence() {
    let gateway = MockGateway::new().await;
    let url = gateway.url();

    let server = tokio::spawn(async move {
        let (mut ws, _) = gateway.accept_and_hello(50).await;
        send_message(&mut ws, &GatewayMessage::dispatch("READY", 7, json!({}))).await;

        // Beats already in flight may still carry null; wait for 7.
        let mut beats = 0;
        loop {
            let beat = next_heartbeat(&mut ws).await;
            beats += 1;
            if beat.data == json!(7) {
                break;
            }
            assert!(beat.data.is_null(), "unexpected heartbeat payload {}", beat.data);
        }
        send_close(&mut ws, "done").await;
        drain(&mut ws).await;
        beats
    });

    let client = test_client();
    let (sink, _events) = ChannelSink::new(16);

    let result = timeout(TEST_TIMEOUT, client.start(&url, &test_payload(), &sink))
        .await
        .expect("session did not end");

    assert!(matches!(result, Ok(CloseReason::Remote { .. })));
    assert!(server.await.expect("server task panicked") >= 1);
}

#[tokio::test]
async fn test_server_heartbeat_request_answered_immediately() {
    let gateway = MockGateway::new().await;
    let url = gateway.url();

    let server = tokio::spawn(async move {
        let (mut ws, _) = gateway.accept_and_hello(60_000).await;
        send_message(&mut ws, &GatewayMessage::dispatch("READY", 4, json!({}))).await;
        send_message(&mut ws, &GatewayMessage::heartbeat(None)).await;

        let beat = next_heartbeat(&mut ws).await;
        send_close(&mut ws, "").await;
        drain(&mut ws).await;
        beat
    });

    let client = test_client();
    let (sink, mut events) = ChannelSink::new(16);

    let result = timeout(TEST_TIMEOUT, client.start(&url, &test_payload(), &sink))
        .await
        .expect("session did not end");
    assert!(result.is_ok());

    let beat = server.await.expect("server task panicked");
    assert_eq!(beat.data, json!(4));

    // The request itself is forwarded as well.
    assert_eq!(events.recv().await.map(|m| m.op), Some(Opcode::Dispatch));
    assert_eq!(events.recv().await.map(|m| m.op), Some(Opcode::Heartbeat));
}

#[tokio::test]
async fn test_malformed_frame_ends_session_with_decode_error() {
    let gateway = MockGateway::new().await;
    let url = gateway.url();

    let server = tokio::spawn(async move {
        let (mut ws, _) = gateway.accept_and_hello(60_000).await;
        send_message(&mut ws, &GatewayMessage::dispatch("READY", 1, json!({}))).await;
        ws.send(Message::Text(r#"{"d": {"no": "op"}}"#.into()))
            .await
            .expect("send failed");
        drain(&mut ws).await
    });

    let client = test_client();
    let (sink, mut events) = ChannelSink::new(16);

    let result = timeout(TEST_TIMEOUT, client.start(&url, &test_payload(), &sink))
        .await
        .expect("session did not end");

    assert!(matches!(result, Err(RelayError::Decode(_))));
    assert_eq!(client.phase(), SessionPhase::Closed);

    // Only the valid frame reached the sink.
    assert_eq!(events.recv().await.map(|m| m.op), Some(Opcode::Dispatch));
    assert!(events.try_recv().is_err());

    // The client closed the connection.
    assert!(server.await.expect("server task panicked"));
}

#[tokio::test]
async fn test_abrupt_disconnect_is_connection_error() {
    let gateway = MockGateway::new().await;
    let url = gateway.url();

    let server = tokio::spawn(async move {
        let (ws, _) = gateway.accept_and_hello(60_000).await;
        drop(ws);
    });

    let client = test_client();
    let (sink, _events) = ChannelSink::new(4);

    let result = timeout(TEST_TIMEOUT, client.start(&url, &test_payload(), &sink))
        .await
        .expect("session did not end");

    assert!(matches!(result, Err(RelayError::Connection(_))));
    assert_eq!(client.phase(), SessionPhase::Closed);
    server.await.expect("server task panicked");
}

#[tokio::test]
async fn test_local_shutdown_sends_close() {
    let gateway = MockGateway::new().await;
    let url = gateway.url();

    let server = tokio::spawn(async move {
        let (mut ws, _) = gateway.accept_and_hello(60_000).await;
        send_message(&mut ws, &GatewayMessage::dispatch("READY", 1, json!({}))).await;
        drain(&mut ws).await
    });

    let client = test_client();
    let (sink, mut events) = ChannelSink::new(16);
    let shutdown = client.shutdown_token();

    let payload = test_payload();
    let session = client.start(&url, &payload, &sink);
    let stopper = async {
        events.recv().await.expect("dispatch not forwarded");
        shutdown.cancel();
    };
    let (result, ()) = timeout(TEST_TIMEOUT, async { tokio::join!(session, stopper) })
        .await
        .expect("session did not end");

    assert_eq!(tokio_test::assert_ok!(result), CloseReason::Shutdown);
    assert_eq!(client.phase(), SessionPhase::Closed);
    assert!(server.await.expect("server task panicked"));
}

// ============================================================================
// Heartbeat Scheduling (paused time)
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_first_heartbeat_after_hello_interval() {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (client_ws, server_ws) = tokio::join!(
        client_async("ws://gateway.test/", client_io),
        accept_async(server_io),
    );
    let (client_ws, _) = client_ws.expect("client upgrade failed");
    let mut server_ws = server_ws.expect("server upgrade failed");

    let (observed_tx, mut observed_rx) = mpsc::unbounded_channel();
    let server = tokio::spawn(async move {
        let identify = read_message(&mut server_ws).await;
        assert_eq!(identify.op, Opcode::Identify);

        send_message(&mut server_ws, &GatewayMessage::hello(41_250)).await;
        let hello_sent = tokio::time::Instant::now();

        let first = next_heartbeat(&mut server_ws).await;
        observed_tx
            .send((hello_sent.elapsed(), first.data))
            .expect("observer dropped");

        send_message(
            &mut server_ws,
            &GatewayMessage::dispatch("READY", 3, json!({"v": 10})),
        )
        .await;

        let second = next_heartbeat(&mut server_ws).await;
        observed_tx
            .send((hello_sent.elapsed(), second.data))
            .expect("observer dropped");

        send_close(&mut server_ws, "").await;
        drain(&mut server_ws).await;
    });

    let client = GatewayClient::new(ClientOptions::default());
    let (sink, mut events) = ChannelSink::new(16);
    let mut connection = Connection::from_stream(client_ws);

    client
        .identify(&mut connection, &test_payload())
        .await
        .expect("identify failed");
    assert_eq!(client.phase(), SessionPhase::AwaitingHello);

    let interval = client
        .await_hello(&mut connection)
        .await
        .expect("no hello");
    assert_eq!(interval, Duration::from_millis(41_250));

    let reason = client
        .run(connection, interval, &sink)
        .await
        .expect("session failed");
    assert!(matches!(reason, CloseReason::Remote { .. }));
    server.await.expect("server task panicked");

    let (first_at, first) = observed_rx.recv().await.expect("no first heartbeat");
    assert!(first_at >= Duration::from_millis(41_250));
    assert!(first_at < Duration::from_millis(41_300));
    assert_eq!(first, Value::Null);

    let (second_at, second) = observed_rx.recv().await.expect("no second heartbeat");
    assert!(second_at >= Duration::from_millis(82_500));
    assert!(second_at < Duration::from_millis(82_550));
    assert_eq!(second, json!(3));

    let ready = events.recv().await.expect("dispatch not forwarded");
    assert_eq!(ready.event_type.as_deref(), Some("READY"));
    assert_eq!(ready.sequence, Some(3));
    assert_eq!(client.last_sequence(), Some(3));
    assert_eq!(client.phase(), SessionPhase::Closed);
}

#[tokio::test]
async fn test_shutdown_completes_when_peer_stops_reading() {
    // Small buffer so the client's writes back up quickly.
    let (client_io, server_io) = tokio::io::duplex(256);
    let (client_ws, server_ws) = tokio::join!(
        client_async("ws://gateway.test/", client_io),
        accept_async(server_io),
    );
    let (client_ws, _) = client_ws.expect("client upgrade failed");
    let mut server_ws = server_ws.expect("server upgrade failed");

    // Answer the handshake, then keep the socket open without reading.
    let server = tokio::spawn(async move {
        read_message(&mut server_ws).await;
        send_message(&mut server_ws, &GatewayMessage::hello(1)).await;
        server_ws
    });

    let client = GatewayClient::new(ClientOptions::default());
    let (sink, _events) = ChannelSink::new(16);
    let mut connection = Connection::from_stream(client_ws);

    client
        .identify(&mut connection, &test_payload())
        .await
        .expect("identify failed");
    let interval = client
        .await_hello(&mut connection)
        .await
        .expect("no hello");
    let _stalled_peer = server.await.expect("server task panicked");

    let shutdown = client.shutdown_token();
    let stopper = async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        shutdown.cancel();
    };
    let (result, ()) = timeout(Duration::from_secs(3), async {
        tokio::join!(client.run(connection, interval, &sink), stopper)
    })
    .await
    .unwrap_or_else(|_| panic!("session stuck in {} after shutdown", client.phase()));

    assert_eq!(tokio_test::assert_ok!(result), CloseReason::Shutdown);
    assert_eq!(client.phase(), SessionPhase::Closed);
}
