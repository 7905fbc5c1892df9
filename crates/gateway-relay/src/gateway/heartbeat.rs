//! Heartbeat/keepalive task.
//!
//! Sleeps for the server's interval, then queues a heartbeat carrying the
//! current sequence. The interval is used exactly as received: no jitter and
//! no drift correction.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use gateway_proto::GatewayMessage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::sequence::SessionState;

/// Handle for the heartbeat task.
#[derive(Debug)]
pub struct HeartbeatHandle {
    task: JoinHandle<()>,
    sent: Arc<AtomicU64>,
}

impl HeartbeatHandle {
    /// Number of heartbeats queued so far.
    #[must_use]
    pub fn beats_sent(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }

    /// Check if the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to exit.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            debug!(error = %e, "heartbeat task did not exit cleanly");
        }
    }
}

/// Start the periodic heartbeat task.
///
/// The task exits when `cancel` fires, even while blocked on a full
/// outbound channel, or when the channel is closed. A closed channel means the connection is gone; that is a normal
/// exit and is not reported to anyone.
pub fn start_heartbeat_task(
    session: Arc<SessionState>,
    outbound: mpsc::Sender<GatewayMessage>,
    cancel: CancellationToken,
) -> HeartbeatHandle {
    let sent = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&sent);
    let interval = session.heartbeat_interval();

    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }

            let sequence = session.sequence().get();
            debug!(?sequence, "sending heartbeat");

            // A full channel means the writer is stalled; cancellation must still win.
            let sent = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                sent = outbound.send(GatewayMessage::heartbeat(sequence)) => sent,
            };
            if sent.is_err() {
                debug!("outbound channel closed, stopping heartbeat");
                break;
            }
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    HeartbeatHandle { task, sent }
}
