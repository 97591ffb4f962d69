//! Outbound pump: the only task that writes to a socket.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt};
use roomcast_core::Frame;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, trace};

use super::connection::Connection;
use crate::config::PumpConfig;

/// Why the writer stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterExit {
    /// Shutdown was requested; queued frames were flushed and a close
    /// frame sent.
    Closed,
    /// A write failed.
    Failed {
        /// What was being written (`"frame"`, `"ping"`, `"close"`).
        what: &'static str,
        /// Transport error.
        error: String,
    },
    /// A write did not finish within the write deadline.
    TimedOut {
        /// What was being written.
        what: &'static str,
    },
}

impl WriterExit {
    /// Whether the writer stopped because it was asked to.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Drain `outbound` into `sink` and ping the peer every
/// [`PumpConfig::ping_period`].
///
/// Any write failure or deadline miss closes `connection`, which also
/// stops the reader.
pub async fn run_writer<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Frame>,
    connection: Arc<Connection>,
    config: PumpConfig,
) -> WriterExit
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let shutdown = connection.shutdown_token();
    let mut ping = time::interval(config.ping_period());
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    let exit = loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                break flush_and_close(&mut sink, &mut outbound, &config).await;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    break flush_and_close(&mut sink, &mut outbound, &config).await;
                };
                if let Err(exit) = write(&mut sink, text(&frame), "frame", &config).await {
                    break exit;
                }
            }
            _ = ping.tick() => {
                trace!(connection_id = %connection.id(), "ping");
                let ping_frame = Message::Ping(Vec::new().into());
                if let Err(exit) = write(&mut sink, ping_frame, "ping", &config).await {
                    break exit;
                }
            }
        }
    };

    connection.close();
    debug!(connection_id = %connection.id(), ?exit, "writer stopped");
    exit
}

fn text(frame: &Frame) -> Message {
    Message::Text(frame.as_str().into())
}

async fn write<S>(
    sink: &mut S,
    message: Message,
    what: &'static str,
    config: &PumpConfig,
) -> Result<(), WriterExit>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match time::timeout(config.write_wait, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(WriterExit::Failed {
            what,
            error: error.to_string(),
        }),
        Err(_) => Err(WriterExit::TimedOut { what }),
    }
}

async fn flush_and_close<S>(
    sink: &mut S,
    outbound: &mut mpsc::Receiver<Frame>,
    config: &PumpConfig,
) -> WriterExit
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Ok(frame) = outbound.try_recv() {
        if let Err(exit) = write(sink, text(&frame), "frame", config).await {
            return exit;
        }
    }
    match write(sink, Message::Close(None), "close", config).await {
        Ok(()) => WriterExit::Closed,
        Err(exit) => exit,
    }
}
