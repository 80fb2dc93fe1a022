//! Message framing and asynchronous connections for game networking.
//!
//! Messages consist of a fixed-size header (a command id and the body's length) and a body
//!  that is composed like a stack. [connection::stream_connection::StreamConnection] frames them
//!  on a reliable byte stream, and [connection::datagram_connection::DatagramConnection] packs
//!  them into datagrams for any number of peers. Received messages go to a
//!  [connection::processor::MessageProcessor], which can hand them to application threads
//!  through a [queue::MessageQueue].

pub mod channel;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod queue;
pub mod test_util;
pub mod util;
