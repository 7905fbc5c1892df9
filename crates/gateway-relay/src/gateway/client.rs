//! Gateway session client.
//!
//! One [`GatewayClient`] drives one connection attempt:
//! connect, identify, wait for hello, then run the receive loop alongside the
//! heartbeat task until the connection ends. There is no resume and no
//! reconnect; a closed client stays closed.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gateway_proto::{GatewayMessage, IdentifyPayload, Opcode};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::sink::EventSink;

use super::close::CloseReason;
use super::connection::{CLOSE_TIMEOUT, Connection, Inbound, WsSink, WsSource, decode, encode};
use super::heartbeat::{HeartbeatHandle, start_heartbeat_task};
use super::sequence::SessionState;
use super::state::{AtomicSessionPhase, SessionPhase};

/// Largest inbound message accepted, 4 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1 << 22;

const OUTBOUND_BUFFER: usize = 32;

/// Transport and handshake limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Largest inbound message or frame, in bytes.
    pub max_frame_size: usize,
    /// Bound on opening the transport.
    pub connect_timeout: Duration,
    /// Bound on waiting for hello after identify.
    pub hello_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            connect_timeout: Duration::from_secs(10),
            hello_timeout: Duration::from_secs(30),
        }
    }
}

/// Client for a single gateway session.
pub struct GatewayClient {
    options: ClientOptions,
    phase: AtomicSessionPhase,
    session: OnceLock<Arc<SessionState>>,
    shutdown: CancellationToken,
}

impl GatewayClient {
    /// Create a new gateway client.
    #[must_use]
    pub fn new(options: ClientOptions) -> Self {
        Self {
            options,
            phase: AtomicSessionPhase::new(SessionPhase::Disconnected),
            session: OnceLock::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Get the current session phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase.load()
    }

    /// Last dispatch sequence seen, if the session has started.
    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        self.session.get().and_then(|s| s.sequence().get())
    }

    /// Token that ends the session when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Ask the running session to close.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run a full session: connect, identify, await hello, then relay.
    ///
    /// This is the session's error boundary. Whatever fails, the connection
    /// is closed exactly once before this returns.
    ///
    /// # Errors
    ///
    /// Returns the first connection, protocol or decode error of the session.
    pub async fn start<K: EventSink>(
        &self,
        endpoint: &str,
        payload: &IdentifyPayload,
        sink: &K,
    ) -> Result<CloseReason, RelayError> {
        let mut connection = self.connect(endpoint).await?;

        let handshake = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Err(RelayError::Connection(
                "shut down during handshake".to_string(),
            )),
            result = self.handshake(&mut connection, payload) => result,
        };

        match handshake {
            Ok(heartbeat_interval) => self.run(connection, heartbeat_interval, sink).await,
            Err(e) => {
                self.abort(connection).await;
                Err(e)
            }
        }
    }

    /// Open the transport.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Connection`] if the client was already used or
    /// the transport cannot be established.
    pub async fn connect(&self, endpoint: &str) -> Result<Connection, RelayError> {
        if !self
            .phase
            .transition(SessionPhase::Disconnected, SessionPhase::Connecting)
        {
            return Err(RelayError::Connection(format!(
                "client is {}; create a new client to reconnect",
                self.phase()
            )));
        }

        info!(endpoint, "connecting to gateway");
        match Connection::open(endpoint, &self.options).await {
            Ok(connection) => Ok(connection),
            Err(e) => {
                self.finish_closed();
                Err(e)
            }
        }
    }

    /// Send the identify frame.
    ///
    /// The server answers with hello; read it with [`Self::await_hello`].
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be encoded or sent.
    pub async fn identify<S>(
        &self,
        connection: &mut Connection<S>,
        payload: &IdentifyPayload,
    ) -> Result<(), RelayError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.phase.store(SessionPhase::Identifying);
        connection.send(&GatewayMessage::identify(payload)?).await?;
        self.phase.store(SessionPhase::AwaitingHello);
        debug!("identify sent");
        Ok(())
    }

    /// Wait for hello and return the heartbeat interval it announces.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Protocol`] if the first frame is not a hello
    /// with a positive `heartbeat_interval`, or if none arrives in time.
    pub async fn await_hello<S>(&self, connection: &mut Connection<S>) -> Result<Duration, RelayError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let hello = timeout(self.options.hello_timeout, connection.recv())
            .await
            .map_err(|_| RelayError::Protocol("timed out waiting for hello".to_string()))?
            .map_err(|e| match e {
                RelayError::Decode(msg) => RelayError::Protocol(format!("malformed hello: {msg}")),
                other => other,
            })?;

        let interval_ms = hello.heartbeat_interval()?;
        if interval_ms == 0 {
            return Err(RelayError::Protocol(
                "hello heartbeat_interval must be positive".to_string(),
            ));
        }

        info!(heartbeat_interval_ms = interval_ms, "received hello");
        Ok(Duration::from_millis(interval_ms))
    }

    /// Relay messages until the connection ends.
    ///
    /// Starts the heartbeat task, then reads frames, tracking sequence numbers
    /// and handing every message to `sink`. On return the heartbeat task has
    /// stopped and the connection is closed.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Connection`] on a transport failure and
    /// [`RelayError::Decode`] on the first frame that is not a gateway
    /// message. Both end the session.
    pub async fn run<S, K>(
        &self,
        connection: Connection<S>,
        heartbeat_interval: Duration,
        sink: &K,
    ) -> Result<CloseReason, RelayError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        K: EventSink,
    {
        let session = Arc::new(SessionState::new(heartbeat_interval));
        if self.session.set(Arc::clone(&session)).is_err() {
            self.abort(connection).await;
            return Err(RelayError::Connection(
                "session already ran on this client".to_string(),
            ));
        }

        let cancel = self.shutdown.child_token();
        let (write, mut read) = connection.split();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);

        let writer = tokio::spawn(writer_task(write, outbound_rx, cancel.child_token()));
        let heartbeat =
            start_heartbeat_task(Arc::clone(&session), outbound_tx.clone(), cancel.child_token());

        self.phase.store(SessionPhase::Ready);
        info!(?heartbeat_interval, "session ready");

        let outcome = receive_loop(&mut read, &session, &outbound_tx, &cancel, sink).await;
        match &outcome {
            Ok(reason) => info!(%reason, "session ended"),
            Err(e) => warn!(error = %e, "session failed"),
        }

        self.teardown(&cancel, heartbeat, outbound_tx, writer).await;
        outcome
    }

    async fn handshake<S>(
        &self,
        connection: &mut Connection<S>,
        payload: &IdentifyPayload,
    ) -> Result<Duration, RelayError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.identify(connection, payload).await?;
        self.await_hello(connection).await
    }

    async fn teardown<S>(
        &self,
        cancel: &CancellationToken,
        heartbeat: HeartbeatHandle,
        outbound: mpsc::Sender<GatewayMessage>,
        writer: JoinHandle<Result<WsSink<S>, RelayError>>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if !self.phase.begin_close() {
            return;
        }

        cancel.cancel();
        heartbeat.join().await;
        drop(outbound);

        match writer.await {
            Ok(Ok(mut write)) => match timeout(CLOSE_TIMEOUT, write.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "close handshake incomplete"),
                Err(_) => warn!("peer not reading, dropping connection without close"),
            },
            Ok(Err(e)) => warn!(error = %e, "outbound writer failed"),
            Err(e) => warn!(error = %e, "outbound writer task failed"),
        }

        self.phase.store(SessionPhase::Closed);
        debug!("session closed");
    }

    async fn abort<S>(&self, connection: Connection<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if self.phase.begin_close() {
            connection.close().await;
            self.phase.store(SessionPhase::Closed);
        }
    }

    fn finish_closed(&self) {
        if self.phase.begin_close() {
            self.phase.store(SessionPhase::Closed);
        }
    }
}

async fn receive_loop<S, K>(
    read: &mut WsSource<S>,
    session: &SessionState,
    outbound: &mpsc::Sender<GatewayMessage>,
    cancel: &CancellationToken,
    sink: &K,
) -> Result<CloseReason, RelayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    K: EventSink,
{
    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(CloseReason::Shutdown),
            frame = read.next() => frame,
        };

        let message = match frame {
            Some(Ok(frame)) => match decode(frame)? {
                Inbound::Message(message) => message,
                Inbound::Closed(reason) => return Ok(reason),
                Inbound::Control => continue,
            },
            Some(Err(e)) => return Err(RelayError::Connection(format!("receive failed: {e}"))),
            None => return Ok(CloseReason::StreamEnded),
        };

        if let Some(sequence) = message.sequence {
            track_sequence(session, sequence);
        }

        match message.op {
            Opcode::Heartbeat => {
                debug!("server requested a heartbeat");
                let beat = GatewayMessage::heartbeat(session.sequence().get());
                match outbound.try_send(beat) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!("outbound queue full, skipping requested heartbeat");
                    }
                    Err(TrySendError::Closed(_)) => debug!("outbound writer gone"),
                }
            }
            Opcode::Hello => {
                warn!("hello received after handshake, keeping the first interval");
            }
            _ => {}
        }

        debug!(
            op = %message.op,
            sequence = ?message.sequence,
            event = message.event_type.as_deref().unwrap_or(""),
            "delivering message"
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(CloseReason::Shutdown),
            () = sink.deliver(message) => {}
        }
    }
}

fn track_sequence(session: &SessionState, sequence: u64) {
    match session.sequence().observe(sequence) {
        Some(previous) if sequence < previous => {
            warn!(sequence, previous, "sequence went backwards, keeping the higher value");
        }
        _ => {}
    }
}

/// Single writer for the connection: every outbound frame goes through here.
///
/// A send blocked on a peer that stopped reading is abandoned on cancel.
async fn writer_task<S>(
    mut write: WsSink<S>,
    mut rx: mpsc::Receiver<GatewayMessage>,
    cancel: CancellationToken,
) -> Result<WsSink<S>, RelayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let frame = encode(&message)?;
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            sent = write.send(frame) => {
                sent.map_err(|e| RelayError::Connection(format!("send failed: {e}")))?;
            }
        }
        debug!(op = %message.op, "frame sent");
    }

    Ok(write)
}
