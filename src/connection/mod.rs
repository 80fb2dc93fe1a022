//! Connections turn a channel's raw transfers into a stream of framed messages.
//!
//! A connection runs two independent state machines in its channel's execution context: a
//!  receive loop that reads headers and bodies and hands complete messages to the
//!  [processor::MessageProcessor], and a send cycle that drains the outbound queue one message
//!  at a time. Sending is single-flight: at most one send cycle is active per connection, so
//!  messages go out in the order they were queued and never interleave on the wire.

pub mod datagram_connection;
pub mod processor;
pub mod reassembly;
pub mod scratch_buffer;
pub mod stream_connection;

use tracing::debug;

use crate::connection::processor::MessageProcessor;
use crate::error::NetError;
use crate::message::header::Header;
use crate::message::NetMessage;


/// Decides whether a message with this header should be received
pub(crate) fn accept_header<M, P>(header: &M::Header, max_body_len: usize, processor: &P) -> bool
where
    M: NetMessage,
    P: MessageProcessor<M>,
{
    if header.body_len() > max_body_len {
        debug!("dropping {:?}: body exceeds the maximum of {} bytes", header, max_body_len);
        return false;
    }
    if !processor.on_receive_header(header) {
        debug!("processor rejected {:?}", header);
        return false;
    }
    true
}

/// A closed channel ends the loop regardless of the processor's decision, otherwise every
///  subsequent transfer would fail immediately.
pub(crate) fn keep_receiving<M, P>(processor: &P, error: &NetError, channel_open: bool) -> bool
where
    M: NetMessage,
    P: MessageProcessor<M>,
{
    if !processor.on_receive_fail(error) {
        debug!("processor stopped receiving after: {}", error);
        return false;
    }
    if !channel_open {
        debug!("channel is closed - stopping receive loop");
        return false;
    }
    true
}

pub(crate) fn keep_sending<M, P>(processor: &P, error: &NetError, channel_open: bool) -> bool
where
    M: NetMessage,
    P: MessageProcessor<M>,
{
    if !processor.on_send_fail(error) {
        debug!("processor stopped sending after: {}", error);
        return false;
    }
    if !channel_open {
        debug!("channel is closed - stopping send cycle");
        return false;
    }
    true
}
