//! The message data model: a fixed-size [header::Header] followed by a variable-length body.
//!
//! Bodies are composed with a stack-style serialization scheme (see [serialize]): writing appends
//!  to the tail of the body, reading pops from the tail. Both peers must use the same scheme, so
//!  the order is part of the wire contract.

pub mod header;
#[allow(clippy::module_inception)]
pub mod message;
pub mod owned_message;
pub mod serialize;

use std::fmt::Debug;

use crate::message::header::Header;


/// Common view on the message types a connection can carry, i.e. [message::Message] for stream
///  connections and [owned_message::OwnedMessage] for datagram connections.
pub trait NetMessage: Debug + Send + 'static {
    type Header: Header;

    fn header(&self) -> &Self::Header;

    fn body(&self) -> &[u8];
}
