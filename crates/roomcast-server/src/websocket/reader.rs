//! Inbound pump: reads client frames and hands them to the room.

use std::fmt::Display;

use axum::extract::ws::Message;
use futures::{Stream, StreamExt};
use roomcast_core::Frame;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

use super::connection::Connection;
use crate::config::PumpConfig;

/// Close codes a peer may send on a normal departure.
const EXPECTED_CLOSE_CODES: [u16; 2] = [1000, 1001];

/// Why the reader stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderExit {
    /// The peer sent a close frame.
    PeerClosed {
        /// Close code, if the frame carried one.
        code: Option<u16>,
    },
    /// The stream ended without a close frame.
    StreamEnded,
    /// The transport reported an error.
    ReadFailed(String),
    /// No pong arrived within the pong window.
    DeadlineExpired,
    /// A message exceeded the size limit.
    MessageTooLarge {
        /// Message size in bytes.
        size: usize,
        /// Configured limit.
        limit: usize,
    },
    /// The connection was closed locally.
    Shutdown,
}

impl ReaderExit {
    /// Whether this is an ordinary departure rather than a failure.
    pub fn is_expected(&self) -> bool {
        match self {
            Self::PeerClosed { code } => {
                code.is_none_or(|code| EXPECTED_CLOSE_CODES.contains(&code))
            }
            Self::StreamEnded | Self::Shutdown => true,
            Self::ReadFailed(_) | Self::DeadlineExpired | Self::MessageTooLarge { .. } => false,
        }
    }

    /// Short label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PeerClosed { .. } => "peer_closed",
            Self::StreamEnded => "stream_ended",
            Self::ReadFailed(_) => "read_failed",
            Self::DeadlineExpired => "pong_timeout",
            Self::MessageTooLarge { .. } => "message_too_large",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Read from `stream` until it ends, errors, goes quiet for a whole pong
/// window, or `connection` is closed. Each text frame (or UTF-8 binary
/// frame) is normalized and passed to `on_frame` in arrival order.
///
/// Only pongs extend the read deadline.
pub async fn run_reader<R, E, F>(
    mut stream: R,
    connection: &Connection,
    config: &PumpConfig,
    mut on_frame: F,
) -> ReaderExit
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
    F: FnMut(Frame),
{
    let shutdown = connection.shutdown_token();
    let mut deadline = Instant::now() + config.pong_wait;

    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => return ReaderExit::Shutdown,
            next = time::timeout_at(deadline, stream.next()) => next,
        };

        let message = match next {
            Err(_) => return ReaderExit::DeadlineExpired,
            Ok(None) => return ReaderExit::StreamEnded,
            Ok(Some(Err(error))) => return ReaderExit::ReadFailed(error.to_string()),
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => {
                let text = text.as_str();
                if text.len() > config.max_message_size {
                    return too_large(text.len(), config);
                }
                on_frame(Frame::from_client_text(text));
            }
            Message::Binary(data) => {
                if data.len() > config.max_message_size {
                    return too_large(data.len(), config);
                }
                match std::str::from_utf8(&data) {
                    Ok(text) => on_frame(Frame::from_client_text(text)),
                    Err(_) => debug!(
                        connection_id = %connection.id(),
                        len = data.len(),
                        "ignoring non-UTF-8 binary frame"
                    ),
                }
            }
            Message::Pong(_) => {
                trace!(connection_id = %connection.id(), "pong");
                deadline = Instant::now() + config.pong_wait;
            }
            // Answered by the transport.
            Message::Ping(_) => {}
            Message::Close(frame) => {
                return ReaderExit::PeerClosed {
                    code: frame.map(|frame| frame.code),
                };
            }
        }
    }
}

fn too_large(size: usize, config: &PumpConfig) -> ReaderExit {
    ReaderExit::MessageTooLarge {
        size,
        limit: config.max_message_size,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::extract::ws::CloseFrame;
    use futures::channel::mpsc as fmpsc;
    use futures::stream;
    use roomcast_core::{ConnectionId, RoomId};
    use tokio_util::sync::CancellationToken;

    use super::*;

    type Inbound = Result<Message, String>;

    fn config() -> PumpConfig {
        PumpConfig {
            write_wait: Duration::from_secs(1),
            pong_wait: Duration::from_secs(10),
            max_message_size: 16,
            queue_capacity: 4,
        }
    }

    fn connection() -> Connection {
        Connection::new(ConnectionId::new(), RoomId::new(), 4, CancellationToken::new()).0
    }

    async fn read_all(messages: Vec<Inbound>) -> (ReaderExit, Vec<String>) {
        let conn = connection();
        let mut seen = Vec::new();
        let exit = run_reader(stream::iter(messages), &conn, &config(), |frame| {
            seen.push(frame.as_str().to_string());
        })
        .await;
        (exit, seen)
    }

    #[tokio::test]
    async fn text_frames_are_normalized_in_order() {
        let (exit, seen) = read_all(vec![
            Ok(Message::Text("  one\ntwo ".into())),
            Ok(Message::Text("three".into())),
        ])
        .await;
        assert_eq!(exit, ReaderExit::StreamEnded);
        assert_eq!(seen, vec!["one two", "three"]);
    }

    #[tokio::test]
    async fn utf8_binary_is_relayed_other_binary_ignored() {
        let (_, seen) = read_all(vec![
            Ok(Message::Binary(b"bin".to_vec().into())),
            Ok(Message::Binary(vec![0xff, 0xfe].into())),
        ])
        .await;
        assert_eq!(seen, vec!["bin"]);
    }

    #[tokio::test]
    async fn oversized_message_stops_reader() {
        let (exit, seen) = read_all(vec![
            Ok(Message::Text("ok".into())),
            Ok(Message::Text("x".repeat(17).into())),
            Ok(Message::Text("never".into())),
        ])
        .await;
        assert_eq!(exit, ReaderExit::MessageTooLarge { size: 17, limit: 16 });
        assert!(!exit.is_expected());
        assert_eq!(seen, vec!["ok"]);
    }

    #[tokio::test]
    async fn close_frame_reports_code() {
        let (exit, _) = read_all(vec![Ok(Message::Close(Some(CloseFrame {
            code: 1001,
            reason: "bye".into(),
        })))])
        .await;
        assert_eq!(exit, ReaderExit::PeerClosed { code: Some(1001) });
        assert!(exit.is_expected());
    }

    #[tokio::test]
    async fn abnormal_close_code_is_unexpected() {
        let (exit, _) = read_all(vec![Ok(Message::Close(Some(CloseFrame {
            code: 1011,
            reason: "".into(),
        })))])
        .await;
        assert!(!exit.is_expected());
    }

    #[tokio::test]
    async fn transport_error_stops_reader() {
        let (exit, _) = read_all(vec![Err("connection reset".to_string())]).await;
        assert_eq!(exit, ReaderExit::ReadFailed("connection reset".into()));
        assert_eq!(exit.as_str(), "read_failed");
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_hits_deadline() {
        let conn = connection();
        let (_tx, rx) = fmpsc::unbounded::<Inbound>();
        let started = Instant::now();
        let exit = run_reader(rx, &conn, &config(), |_| {}).await;
        assert_eq!(exit, ReaderExit::DeadlineExpired);
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn pongs_extend_deadline_but_data_does_not() {
        let conn = connection();
        let (tx, rx) = fmpsc::unbounded::<Inbound>();
        let feeder = tokio::spawn(async move {
            for _ in 0..3 {
                time::sleep(Duration::from_secs(8)).await;
                let _ = tx.unbounded_send(Ok(Message::Pong(Vec::new().into())));
            }
            // Data alone does not keep the connection alive.
            for _ in 0..5 {
                time::sleep(Duration::from_secs(3)).await;
                let _ = tx.unbounded_send(Ok(Message::Text("chatter".into())));
            }
            tx
        });

        let started = Instant::now();
        let exit = run_reader(rx, &conn, &config(), |_| {}).await;
        assert_eq!(exit, ReaderExit::DeadlineExpired);
        // Last pong at 24s, deadline 34s.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(34), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(35), "{elapsed:?}");
        drop(feeder);
    }

    #[tokio::test]
    async fn local_close_stops_reader() {
        let conn = connection();
        let (_tx, rx) = fmpsc::unbounded::<Inbound>();
        conn.close();
        let exit = run_reader(rx, &conn, &config(), |_| {}).await;
        assert_eq!(exit, ReaderExit::Shutdown);
        assert!(exit.is_expected());
    }
}
