//! Admission and per-connection session lifecycle.
//!
//! [`RelayService::admit`] runs before the WebSocket upgrade so a full room
//! is refused with an HTTP error. [`RelayService::run_session`] drives the
//! admitted connection: greeting, join notice, pumps, then teardown with a
//! single departure notice.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, Stream, StreamExt};
use metrics::{counter, gauge, histogram};
use roomcast_core::{ConnectionId, ExcludeSet, Frame, RelayError, Result, RoomId, SystemEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::PumpConfig;
use crate::metrics::{
    ROOM_JOINS_REJECTED_TOTAL, WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE,
    WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL, WS_FRAMES_RELAYED_TOTAL,
};
use crate::registry::RoomRegistry;
use crate::room::Room;
use crate::websocket::connection::{Connection, ConnectionPhase};
use crate::websocket::reader::{ReaderExit, run_reader};
use crate::websocket::writer::{WriterExit, run_writer};

/// A connection that holds a room slot but has no socket yet.
///
/// Dropping an admission without calling [`RelayService::run_session`]
/// or [`Admission::abandon`] leaks the slot until the process exits, so
/// always pass it on.
#[derive(Debug)]
pub struct Admission {
    room: Arc<Room>,
    connection: Arc<Connection>,
    outbound: mpsc::Receiver<Frame>,
}

impl Admission {
    /// The admitted connection's id.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection.id()
    }

    /// The room holding the slot.
    pub fn room(&self) -> &Arc<Room> {
        &self.room
    }

    /// Handle that releases the slot if the upgrade never happens.
    pub fn rollback(&self) -> Rollback {
        Rollback {
            room: Arc::clone(&self.room),
            connection: Arc::clone(&self.connection),
        }
    }

    /// Release the slot without running a session.
    pub fn abandon(self) {
        self.rollback().run();
    }
}

/// Releases an admission's room slot.
#[derive(Debug)]
pub struct Rollback {
    room: Arc<Room>,
    connection: Arc<Connection>,
}

impl Rollback {
    /// Close the connection and leave the room. No departure notice is
    /// sent: the join was never announced.
    pub fn run(self) {
        self.connection.close();
        if self.room.leave(&self.connection.id()).is_some() {
            debug!(
                connection_id = %self.connection.id(),
                room_id = %self.room.id(),
                "admission rolled back"
            );
        }
        let _ = self.connection.advance(ConnectionPhase::Closed);
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Why the reader stopped.
    pub reader: ReaderExit,
    /// Why the writer stopped.
    pub writer: WriterExit,
}

/// Admits connections into rooms and runs their sessions.
#[derive(Debug)]
pub struct RelayService {
    registry: Arc<RoomRegistry>,
    pump: PumpConfig,
    shutdown: CancellationToken,
}

impl RelayService {
    /// Create a service over `registry`. Connection tokens are children of
    /// `shutdown`.
    pub fn new(registry: Arc<RoomRegistry>, pump: PumpConfig, shutdown: CancellationToken) -> Self {
        Self {
            registry,
            pump,
            shutdown,
        }
    }

    /// The room registry.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Pump configuration applied to every session.
    pub fn pump_config(&self) -> &PumpConfig {
        &self.pump
    }

    /// Reserve a slot in `room_id`, creating the room if needed.
    ///
    /// The `connection` greeting is queued before the join, so it is the
    /// first frame the client sees. Fails with
    /// [`RelayError::CapacityExceeded`] when the room is full.
    pub fn admit(&self, room_id: RoomId) -> Result<Admission> {
        let mut retried = false;
        loop {
            let room = self.registry.get_or_create(room_id);
            let (connection, outbound) = Connection::new(
                ConnectionId::new(),
                room_id,
                self.pump.queue_capacity,
                self.shutdown.child_token(),
            );
            let connection = Arc::new(connection);
            if let Some(greeting) = encoded(SystemEvent::connection(connection.id()).to_frame()) {
                let _ = connection.enqueue(greeting);
            }

            match room.join(Arc::clone(&connection)) {
                Ok(()) => {
                    let _ = connection.advance(ConnectionPhase::Joined);
                    return Ok(Admission {
                        room,
                        connection,
                        outbound,
                    });
                }
                // Evicted between lookup and join; the registry now hands
                // out a fresh room for this id.
                Err(RelayError::RoomClosed(_)) if !retried => {
                    debug!(room_id = %room_id, "room closed during admission, retrying");
                    retried = true;
                }
                Err(error) => {
                    counter!(ROOM_JOINS_REJECTED_TOTAL, "reason" => error.error_kind())
                        .increment(1);
                    info!(room_id = %room_id, error = %error, "join rejected");
                    return Err(error);
                }
            }
        }
    }

    /// Run an admitted connection over an upgraded socket.
    pub async fn run_ws(&self, admission: Admission, socket: WebSocket) -> SessionOutcome {
        let (sink, stream) = socket.split();
        self.run_session(admission, sink, stream).await
    }

    /// Run an admitted connection over any message sink and stream.
    ///
    /// Returns once both pumps have stopped, the connection has left its
    /// room and the departure notice has been broadcast.
    #[instrument(
        name = "session",
        skip_all,
        fields(connection_id = %admission.connection.id(), room_id = %admission.room.id())
    )]
    pub async fn run_session<S, R, E>(
        &self,
        admission: Admission,
        sink: S,
        stream: R,
    ) -> SessionOutcome
    where
        S: Sink<Message> + Unpin + Send + 'static,
        S::Error: Display + Send,
        R: Stream<Item = std::result::Result<Message, E>> + Unpin,
        E: Display,
    {
        let Admission {
            room,
            connection,
            outbound,
        } = admission;
        let id = connection.id();
        let exclude_self = ExcludeSet::only(id);

        let _ = connection.advance(ConnectionPhase::Active);
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        info!(users = room.len(), "client connected");

        announce(&room, &SystemEvent::user_joined(id), &exclude_self);

        let writer = tokio::spawn(run_writer(
            sink,
            outbound,
            Arc::clone(&connection),
            self.pump.clone(),
        ));

        let reader = run_reader(stream, &connection, &self.pump, |frame| {
            relay_frame(&room, &exclude_self, &frame);
        })
        .await;

        let _ = connection.advance(ConnectionPhase::Leaving);
        connection.close();
        if room.leave(&id).is_some() {
            announce(&room, &SystemEvent::user_left(id), &exclude_self);
        }

        let writer = writer.await.unwrap_or_else(|error| WriterExit::Failed {
            what: "task",
            error: error.to_string(),
        });
        let _ = connection.advance(ConnectionPhase::Closed);

        counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reader.as_str()).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());

        if reader.is_expected() && matches!(writer, WriterExit::Closed) {
            info!(
                reason = reader.as_str(),
                dropped_frames = connection.dropped_frames(),
                "client disconnected"
            );
        } else {
            warn!(
                ?reader,
                ?writer,
                dropped_frames = connection.dropped_frames(),
                "client disconnected abnormally"
            );
        }

        SessionOutcome { reader, writer }
    }
}

fn relay_frame(room: &Room, exclude: &ExcludeSet, frame: &Frame) {
    match frame.event_name() {
        Ok(event) => debug!(event = %event, len = frame.len(), "relaying frame"),
        Err(error) => debug!(%error, len = frame.len(), "relaying frame without event envelope"),
    }
    let report = room.broadcast(frame, exclude);
    counter!(WS_FRAMES_RELAYED_TOTAL).increment(report.delivered as u64);
}

fn announce(room: &Room, event: &SystemEvent, exclude: &ExcludeSet) {
    let Some(frame) = encoded(event.to_frame()) else {
        return;
    };
    let report = room.broadcast(&frame, exclude);
    debug!(
        event = event.event.as_str(),
        recipients = report.recipients,
        "system event sent"
    );
}

/// A system event that fails to encode is logged and dropped.
fn encoded(frame: Result<Frame>) -> Option<Frame> {
    match frame {
        Ok(frame) => Some(frame),
        Err(error) => {
            warn!(%error, kind = error.error_kind(), "failed to encode system event");
            None
        }
    }
}
