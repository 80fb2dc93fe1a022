use std::fmt::{Debug, Display, Formatter};

use bytemuck::{Pod, Zeroable};
use num_enum::TryFromPrimitive;

use crate::error::NetError;
use crate::util::safe_converter::{PrecheckedCast, SafeCast};


/// A message header is a fixed-size, fixed-layout record that precedes every message body on the
///  wire. It declares (at least) the length of the body that follows.
///
/// Headers are plain old data, and they go on the wire as their raw in-memory representation.
///  There is no byte order normalization: both peers must share byte order.
pub trait Header: Pod + Debug + Send + Sync {
    /// encoded size of the header on the wire
    const LEN: usize = std::mem::size_of::<Self>();

    /// the length of the body that this header declares
    fn body_len(&self) -> usize;

    fn set_body_len(&mut self, len: usize);

    fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// NB: `bytes` must hold at least [Header::LEN] bytes, anything beyond that is ignored
    fn from_bytes(bytes: &[u8]) -> Self {
        bytemuck::pod_read_unaligned(&bytes[..Self::LEN])
    }
}


/// The default header: body length and command id, both as native-endian u32.
///
/// The command id is an application defined enum, converted via `num_enum`:
///
/// ```ignore
/// #[derive(IntoPrimitive, TryFromPrimitive)]
/// #[repr(u32)]
/// enum Commands { Chat = 100 }
/// ```
#[repr(C)]
#[derive(Clone, Copy, Default, Eq, PartialEq, Hash, Pod, Zeroable)]
pub struct MessageHeader {
    pub size: u32,
    pub id: u32,
}

impl MessageHeader {
    pub fn new(command: impl Into<u32>) -> MessageHeader {
        MessageHeader {
            size: 0,
            id: command.into(),
        }
    }

    pub fn command<C: TryFromPrimitive<Primitive = u32>>(&self) -> Result<C, NetError> {
        C::try_from_primitive(self.id)
            .map_err(|_| NetError::UnknownCommand(self.id))
    }
}

impl Header for MessageHeader {
    fn body_len(&self) -> usize {
        self.size.safe_cast()
    }

    fn set_body_len(&mut self, len: usize) {
        self.size = len.prechecked_cast();
    }
}

impl Debug for MessageHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[id:{} size:{}]", self.id, self.size)
    }
}

impl Display for MessageHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ID:{} Size:{}", self.id, self.size)
    }
}
