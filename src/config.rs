use anyhow::bail;

use crate::message::header::Header;


pub struct ConnectionConfig {
    /// Headers declaring a longer body are dropped without reading the body. For stream
    ///  connections, the body's bytes remain in the stream, so a peer sending oversized messages
    ///  effectively garbles the stream.
    pub max_body_len: usize,

    /// Capacity of a datagram connection's inbound scratch buffer, i.e. the biggest packet it can
    ///  receive. Longer packets are truncated by the socket.
    pub datagram_in_buffer_size: usize,

    /// Capacity of a datagram connection's outbound scratch buffer. A message (header and body)
    ///  must fit into this buffer to be sent.
    pub datagram_out_buffer_size: usize,

    /// `None` for an unbounded outbound queue. With `Some(n)`, sending fails when `n` messages
    ///  are waiting to be sent.
    pub out_queue_capacity: Option<usize>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            max_body_len: Self::DEFAULT_MAX_BODY_LEN,
            datagram_in_buffer_size: Self::DEFAULT_DATAGRAM_BUFFER_SIZE,
            datagram_out_buffer_size: Self::DEFAULT_DATAGRAM_BUFFER_SIZE,
            out_queue_capacity: None,
        }
    }
}

impl ConnectionConfig {
    pub const DEFAULT_MAX_BODY_LEN: usize = 1024;
    pub const DEFAULT_DATAGRAM_BUFFER_SIZE: usize = 512;

    /// the checks that apply to stream connections, which have no datagram buffers
    pub fn validate_stream(&self) -> anyhow::Result<()> {
        if self.out_queue_capacity == Some(0) {
            bail!("a bounded outbound queue needs a capacity of at least 1");
        }
        Ok(())
    }

    pub fn validate<H: Header>(&self) -> anyhow::Result<()> {
        self.validate_stream()?;
        if self.datagram_in_buffer_size < H::LEN {
            bail!("datagram inbound buffer size {} cannot hold a header of {} bytes", self.datagram_in_buffer_size, H::LEN);
        }
        if self.datagram_out_buffer_size < H::LEN {
            bail!("datagram outbound buffer size {} cannot hold a header of {} bytes", self.datagram_out_buffer_size, H::LEN);
        }
        Ok(())
    }
}
