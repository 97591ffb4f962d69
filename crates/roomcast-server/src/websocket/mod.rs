//! Per-connection plumbing: the outbound queue and the two socket pumps.

pub mod connection;
pub mod reader;
pub mod writer;
