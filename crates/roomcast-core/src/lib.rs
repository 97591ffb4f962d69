//! # roomcast-core
//!
//! Shared vocabulary for the roomcast relay:
//!
//! - [`ConnectionId`] / [`RoomId`]: opaque 128-bit identifiers
//! - [`Frame`]: one opaque text payload fanned out to room members
//! - [`SystemEvent`]: events synthesized by the relay itself
//! - [`ExcludeSet`]: recipients skipped by a broadcast
//! - [`RelayError`]: error type for the relay core

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod exclude;
pub mod frame;
pub mod ids;

pub use errors::{RelayError, Result};
pub use events::{SystemEvent, SystemEventKind};
pub use exclude::ExcludeSet;
pub use frame::Frame;
pub use ids::{ConnectionId, RoomId};
