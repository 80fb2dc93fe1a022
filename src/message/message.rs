use std::fmt::{Debug, Display, Formatter};

use bytes::{BufMut, BytesMut};

use crate::error::NetError;
use crate::message::header::{Header, MessageHeader};
use crate::message::serialize::Serializable;
use crate::message::NetMessage;


/// A header and a body.
///
/// The body works as a stack for serialization: [Message::write] appends a value's bytes to the
///  tail of the body, [Message::read] pops them from the tail. So values are read back in the
///  reverse order of writing:
///
/// ```ignore
/// msg.write(&1u32).write(&2u16);
/// let b: u16 = msg.read()?;
/// let a: u32 = msg.read()?;
/// ```
///
/// Writing and reading keep the header's declared body length in sync with the body. It diverges
///  only while a message is being received, and the header announces more bytes than have arrived.
#[derive(Clone, Eq, PartialEq)]
pub struct Message<H: Header = MessageHeader> {
    pub header: H,
    body: BytesMut,
}

impl<H: Header> Default for Message<H> {
    fn default() -> Self {
        Message::new(H::zeroed())
    }
}

impl Message<MessageHeader> {
    pub fn with_command(command: impl Into<u32>) -> Self {
        Message::new(MessageHeader::new(command))
    }
}

impl<H: Header> Message<H> {
    /// NB: the header is taken as is. For receiving, that includes the body length it declares
    pub fn new(header: H) -> Message<H> {
        Message {
            header,
            body: BytesMut::new(),
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// `true` if the header declares exactly the number of bytes in the body
    pub fn is_complete(&self) -> bool {
        self.header.body_len() == self.body.len()
    }

    /// Append raw bytes to the body *without* touching the header. This is for receiving, where
    ///  the header was received first and announces the final body length.
    pub fn add_data(&mut self, data: &[u8]) {
        self.body.put_slice(data);
    }

    /// clears the body and resets the header's body length to match
    pub fn clear(&mut self) {
        self.body.clear();
        self.header.set_body_len(0);
    }

    pub fn write<T: Serializable>(&mut self, value: &T) -> &mut Self {
        value.write_to(self);
        self
    }

    pub fn write_str(&mut self, s: &str) -> &mut Self {
        crate::message::serialize::write_text(self, s);
        self
    }

    pub fn read<T: Serializable>(&mut self) -> Result<T, NetError> {
        T::read_from(self)
    }

    /// Push raw bytes onto the body stack, updating the header. This is the primitive that
    ///  [Serializable] implementations build on.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.body.put_slice(bytes);
        self.header.set_body_len(self.body.len());
    }

    /// Pop the topmost `n` bytes from the body stack, updating the header. The body is left
    ///  unchanged if it holds fewer than `n` bytes.
    pub fn pop_bytes(&mut self, n: usize) -> Result<BytesMut, NetError> {
        if self.body.len() < n {
            return Err(NetError::Underflow {
                needed: n,
                available: self.body.len(),
            });
        }

        let popped = self.body.split_off(self.body.len() - n);
        self.header.set_body_len(self.body.len());
        Ok(popped)
    }
}

impl<H: Header> NetMessage for Message<H> {
    type Header = H;

    fn header(&self) -> &H {
        &self.header
    }

    fn body(&self) -> &[u8] {
        &self.body
    }
}

impl<H: Header> Debug for Message<H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Message{{header:{:?}, body:{:?}}}", self.header, self.body.as_ref())
    }
}

impl<H: Header + Display> Display for Message<H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.header, f)
    }
}
