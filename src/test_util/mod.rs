//! Utilities for testing code built on connections: a processor that records everything it
//!  sees, an in-memory datagram channel, and a set of commands with helpers.
//!
//! They are used for testing this crate, but they are also exported for application testing,
//!  so they are part of the crate's regular (non-#[cfg(test)]) code.

pub mod commands;
pub mod packet_channel;
pub mod processor;
