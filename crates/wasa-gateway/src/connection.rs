use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, trace, warn};

use crate::registry::{ConnectionHandle, ConnectionRegistry, Outbound};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
/// A single write may not take longer than one interval either.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const MAX_MISSED_PONGS: u8 = 2;

/// Lifecycle of one push connection. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Registered,
    /// A frame went out since the last heartbeat tick
    Active,
    /// Nothing went out since the last heartbeat tick
    Idle,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Registered => "registered",
            Self::Active => "active",
            Self::Idle => "idle",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

struct Tracker<'a> {
    user_id: &'a str,
    state: ConnectionState,
}

impl Tracker<'_> {
    fn move_to(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        trace!("{} connection {} -> {}", self.user_id, self.state, next);
        self.state = next;
    }
}

/// Why the writer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterExit {
    /// Evicted by a newer connection or the handle was dropped
    Closed,
    /// A write errored or did not complete within one heartbeat interval
    WriteFailed,
    HeartbeatTimeout,
}

/// Write one frame, giving up after `limit`. A peer that stops reading
/// eventually fills the send buffer and the write never completes.
async fn write_frame<S>(sink: &mut S, msg: Message, limit: Duration) -> bool
where
    S: Sink<Message> + Unpin,
{
    match tokio::time::timeout(limit, sink.send(msg)).await {
        Ok(Ok(())) => true,
        Ok(Err(_)) => false,
        Err(_) => {
            warn!("Write stalled for {:?}", limit);
            false
        }
    }
}

/// Drain the outbound queue into the socket and keep the heartbeat going.
async fn write_loop<S>(
    sink: &mut S,
    outbound: &mut UnboundedReceiver<Outbound>,
    pong_received: &AtomicBool,
    tracker: &mut Tracker<'_>,
    interval: Duration,
) -> WriterExit
where
    S: Sink<Message> + Unpin,
{
    let mut heartbeat = tokio::time::interval(interval);
    heartbeat.tick().await;
    let mut missed_heartbeats: u8 = 0;
    let mut wrote_since_tick = false;

    loop {
        tokio::select! {
            next = outbound.recv() => {
                match next {
                    Some(Outbound::Frame(frame)) => {
                        if !write_frame(sink, Message::Text(frame.to_string().into()), interval).await {
                            return WriterExit::WriteFailed;
                        }
                        wrote_since_tick = true;
                        tracker.move_to(ConnectionState::Active);
                    }
                    Some(Outbound::Close) => {
                        let _ = write_frame(sink, Message::Close(None), interval).await;
                        return WriterExit::Closed;
                    }
                    None => return WriterExit::Closed,
                }
            }
            _ = heartbeat.tick() => {
                if !wrote_since_tick {
                    tracker.move_to(ConnectionState::Idle);
                }
                wrote_since_tick = false;

                if pong_received.swap(false, Ordering::Acquire) {
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= MAX_MISSED_PONGS {
                        warn!("Heartbeat timeout for {} (missed {} pongs)", tracker.user_id, missed_heartbeats);
                        return WriterExit::HeartbeatTimeout;
                    }
                }
                if !write_frame(sink, Message::Ping(Bytes::new()), interval).await {
                    return WriterExit::WriteFailed;
                }
            }
        }
    }
}

/// Serve a push connection for an already-authenticated user until it
/// closes. The channel is server-to-client only.
pub async fn handle_connection(socket: WebSocket, registry: ConnectionRegistry, user_id: String, username: String) {
    let mut tracker = Tracker {
        user_id: &user_id,
        state: ConnectionState::Connecting,
    };

    let (mut sender, mut receiver) = socket.split();
    let (handle, mut outbound_rx) = ConnectionHandle::new();
    let conn_id = handle.conn_id();

    registry.register(&user_id, handle).await;
    tracker.move_to(ConnectionState::Registered);
    info!("{} ({}) connected to push channel", username, user_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_recv = pong_received.clone();

    let recv_user = user_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    trace!("Ignoring {} byte(s) of inbound text from {}", text.len(), recv_user);
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        exit = write_loop(&mut sender, &mut outbound_rx, &pong_received, &mut tracker, HEARTBEAT_INTERVAL) => {
            debug!("Writer for {} stopped: {:?}", user_id, exit);
            recv_task.abort();
        }
        _ = &mut recv_task => {}
    }

    registry.release(&user_id, conn_id).await;
    tracker.move_to(ConnectionState::Closed);
    info!("{} ({}) disconnected from push channel", username, user_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_follows_transitions() {
        let mut tracker = Tracker {
            user_id: "alice",
            state: ConnectionState::Connecting,
        };
        for next in [
            ConnectionState::Registered,
            ConnectionState::Active,
            ConnectionState::Idle,
            ConnectionState::Active,
            ConnectionState::Closed,
        ] {
            tracker.move_to(next);
            assert_eq!(tracker.state, next);
        }
        assert_eq!(ConnectionState::Idle.to_string(), "idle");
    }

    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// A peer that never drains its socket.
    struct StalledSink;

    impl Sink<Message> for StalledSink {
        type Error = axum::Error;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _: Message) -> Result<(), Self::Error> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }
    }

    const TICK: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn stalled_write_stops_the_writer() {
        let (handle, mut rx) = ConnectionHandle::new();
        let pong = AtomicBool::new(true);
        let mut tracker = Tracker {
            user_id: "alice",
            state: ConnectionState::Registered,
        };
        assert!(handle.send(Arc::from("{}")));

        let exit = tokio::time::timeout(
            Duration::from_secs(2),
            write_loop(&mut StalledSink, &mut rx, &pong, &mut tracker, TICK),
        )
        .await
        .expect("writer never gave up on the stalled peer");
        assert_eq!(exit, WriterExit::WriteFailed);
    }

    #[tokio::test]
    async fn writer_forwards_frames_in_order_and_closes() {
        let (handle, mut rx) = ConnectionHandle::new();
        let pong = AtomicBool::new(true);
        let mut tracker = Tracker {
            user_id: "alice",
            state: ConnectionState::Registered,
        };
        assert!(handle.send(Arc::from("one")));
        assert!(handle.send(Arc::from("two")));
        handle.close();

        let mut written: Vec<Message> = Vec::new();
        let exit = write_loop(&mut written, &mut rx, &pong, &mut tracker, Duration::from_secs(15)).await;
        assert_eq!(exit, WriterExit::Closed);
        assert_eq!(tracker.state, ConnectionState::Active);
        assert_eq!(written.len(), 3);
        assert!(matches!(&written[0], Message::Text(t) if t.as_str() == "one"));
        assert!(matches!(&written[1], Message::Text(t) if t.as_str() == "two"));
        assert!(matches!(written[2], Message::Close(None)));
    }

    #[tokio::test]
    async fn two_missed_pongs_drop_the_connection() {
        let (_handle, mut rx) = ConnectionHandle::new();
        let pong = AtomicBool::new(true);
        let mut tracker = Tracker {
            user_id: "alice",
            state: ConnectionState::Registered,
        };

        let mut written: Vec<Message> = Vec::new();
        let exit = tokio::time::timeout(
            Duration::from_secs(2),
            write_loop(&mut written, &mut rx, &pong, &mut tracker, TICK),
        )
        .await
        .expect("heartbeat never timed out");
        assert_eq!(exit, WriterExit::HeartbeatTimeout);
        assert_eq!(tracker.state, ConnectionState::Idle);
        // one ping answered by the initial flag, one unanswered
        assert_eq!(written.iter().filter(|m| matches!(m, Message::Ping(_))).count(), 2);
    }
}
