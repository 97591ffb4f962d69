//! Outbound side of one client connection.
//!
//! A [`Connection`] is what a [`Room`](crate::room::Room) holds for each
//! member: a bounded queue into the member's writer pump plus the shutdown
//! token shared by that member's reader and writer.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use metrics::counter;
use roomcast_core::{ConnectionId, Frame, RoomId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::metrics::WS_FRAMES_DROPPED_TOTAL;

/// Lifecycle phase of a connection. Phases only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionPhase {
    /// Allocated, not yet a room member.
    Connecting = 0,
    /// Admitted into its room; upgrade not yet complete.
    Joined = 1,
    /// Pumps running.
    Active = 2,
    /// A pump terminated; teardown in progress.
    Leaving = 3,
    /// Both pumps exited and room membership is gone.
    Closed = 4,
}

impl ConnectionPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Joined,
            2 => Self::Active,
            3 => Self::Leaving,
            _ => Self::Closed,
        }
    }
}

/// Result of handing a frame to a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueue {
    /// The frame is queued for the writer.
    Queued,
    /// The queue was full; the frame was dropped.
    Dropped,
    /// The connection is shutting down.
    Closed,
}

/// One member's outbound queue and shutdown signal.
pub struct Connection {
    id: ConnectionId,
    room_id: RoomId,
    tx: mpsc::Sender<Frame>,
    shutdown: CancellationToken,
    phase: AtomicU8,
    dropped_frames: AtomicU64,
    connected_at: Instant,
}

impl Connection {
    /// Create a connection and the receiving end of its outbound queue.
    ///
    /// `shutdown` is this connection's own token; pass a child of the
    /// server-wide token so process shutdown reaches every connection.
    pub fn new(
        id: ConnectionId,
        room_id: RoomId,
        queue_capacity: usize,
        shutdown: CancellationToken,
    ) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let connection = Self {
            id,
            room_id,
            tx,
            shutdown,
            phase: AtomicU8::new(ConnectionPhase::Connecting as u8),
            dropped_frames: AtomicU64::new(0),
            connected_at: Instant::now(),
        };
        (connection, rx)
    }

    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a frame for delivery without waiting.
    ///
    /// A full queue drops the new frame; the broadcaster is never blocked
    /// by a slow reader on the other end.
    pub fn enqueue(&self, frame: Frame) -> Enqueue {
        if self.shutdown.is_cancelled() {
            return Enqueue::Closed;
        }
        match self.tx.try_send(frame) {
            Ok(()) => Enqueue::Queued,
            Err(TrySendError::Full(frame)) => {
                let total = self.dropped_frames.fetch_add(1, Ordering::Relaxed) + 1;
                counter!(WS_FRAMES_DROPPED_TOTAL).increment(1);
                warn!(
                    connection_id = %self.id,
                    room_id = %self.room_id,
                    frame_len = frame.len(),
                    total_dropped = total,
                    "outbound queue full, dropping frame"
                );
                Enqueue::Dropped
            }
            Err(TrySendError::Closed(_)) => Enqueue::Closed,
        }
    }

    /// Close the outbound side. The writer drains what is already queued,
    /// sends a close frame and exits; the reader stops at its next poll.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Whether [`close`](Self::close) has been called (or the server is
    /// shutting down).
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// A handle on the shutdown signal for the pumps.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ConnectionPhase {
        ConnectionPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Move to `next` if it is later than the current phase.
    ///
    /// Returns `false` (and changes nothing) for backwards or repeated
    /// transitions, so nothing re-enters `Active`.
    pub fn advance(&self, next: ConnectionPhase) -> bool {
        self.phase
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (next as u8 > current).then_some(next as u8)
            })
            .is_ok()
    }

    /// Frames dropped because the queue was full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Time since the connection was created.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("room_id", &self.room_id)
            .field("phase", &self.phase())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
