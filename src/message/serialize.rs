//! Stack-style serialization of message bodies.
//!
//! Fixed-size values go on the wire as their native-endian byte representation, appended to the
//!  tail of the body on write and popped from the tail on read.
//!
//! Sequences (and text) are written element by element in forward order, followed by the element
//!  count as an `i32`. Reading pops the count first and then the elements - last one first. The
//!  result is put back into forward order, so a sequence reads back exactly as it was written.
//!  This layout is the wire contract between peers.

use std::mem::size_of;

use bytemuck::Pod;

use crate::error::NetError;
use crate::message::header::Header;
use crate::message::message::Message;
use crate::util::safe_converter::PrecheckedCast;


/// A value that can be pushed onto / popped from a message body.
///
/// Application types implement this to become part of message bodies, typically by writing their
///  fields in some order and reading them back in the reverse order:
///
/// ```ignore
/// impl Serializable for Position {
///     fn write_to<H: Header>(&self, msg: &mut Message<H>) {
///         msg.write(&self.x).write(&self.y);
///     }
///     fn read_from<H: Header>(msg: &mut Message<H>) -> Result<Self, NetError> {
///         let y = msg.read()?;
///         let x = msg.read()?;
///         Ok(Position { x, y })
///     }
/// }
/// ```
pub trait Serializable: Sized {
    fn write_to<H: Header>(&self, msg: &mut Message<H>);

    fn read_from<H: Header>(msg: &mut Message<H>) -> Result<Self, NetError>;
}

macro_rules! fixed_size_serializable {
    ($($ty:ty),*) => {
        $(
            impl Serializable for $ty {
                fn write_to<H: Header>(&self, msg: &mut Message<H>) {
                    msg.push_bytes(&self.to_ne_bytes());
                }

                fn read_from<H: Header>(msg: &mut Message<H>) -> Result<Self, NetError> {
                    let bytes = msg.pop_bytes(size_of::<$ty>())?;
                    let mut raw = [0u8; size_of::<$ty>()];
                    raw.copy_from_slice(&bytes);
                    Ok(<$ty>::from_ne_bytes(raw))
                }
            }
        )*
    }
}

fixed_size_serializable!(u8, i8, u16, i16, u32, i32, u64, i64, u128, i128, f32, f64);

impl Serializable for bool {
    fn write_to<H: Header>(&self, msg: &mut Message<H>) {
        msg.push_bytes(&[*self as u8]);
    }

    fn read_from<H: Header>(msg: &mut Message<H>) -> Result<Self, NetError> {
        Ok(u8::read_from(msg)? != 0)
    }
}

impl Serializable for char {
    fn write_to<H: Header>(&self, msg: &mut Message<H>) {
        (*self as u32).write_to(msg);
    }

    fn read_from<H: Header>(msg: &mut Message<H>) -> Result<Self, NetError> {
        let raw = u32::read_from(msg)?;
        char::from_u32(raw)
            .ok_or(NetError::InvalidChar(raw))
    }
}


/// Byte-copy serialization for arbitrary plain-old-data types, e.g. `#[repr(C)]` structs of
///  numbers. The value goes on the wire as its raw in-memory representation.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Raw<T: Pod>(pub T);

impl<T: Pod> Serializable for Raw<T> {
    fn write_to<H: Header>(&self, msg: &mut Message<H>) {
        msg.push_bytes(bytemuck::bytes_of(&self.0));
    }

    fn read_from<H: Header>(msg: &mut Message<H>) -> Result<Self, NetError> {
        let bytes = msg.pop_bytes(size_of::<T>())?;
        Ok(Raw(bytemuck::pod_read_unaligned(&bytes)))
    }
}


pub(crate) fn write_text<H: Header>(msg: &mut Message<H>, s: &str) {
    for b in s.as_bytes() {
        b.write_to(msg);
    }
    let len: i32 = s.len().prechecked_cast();
    len.write_to(msg);
}

fn read_len<H: Header>(msg: &mut Message<H>) -> Result<usize, NetError> {
    let len = i32::read_from(msg)?;
    usize::try_from(len)
        .map_err(|_| NetError::InvalidLength(len))
}

impl Serializable for String {
    fn write_to<H: Header>(&self, msg: &mut Message<H>) {
        write_text(msg, self);
    }

    fn read_from<H: Header>(msg: &mut Message<H>) -> Result<Self, NetError> {
        let len = read_len(msg)?;
        // the characters are popped as one block, so they are in forward order already
        let bytes = msg.pop_bytes(len)?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }
}

impl<T: Serializable> Serializable for Vec<T> {
    fn write_to<H: Header>(&self, msg: &mut Message<H>) {
        for element in self {
            element.write_to(msg);
        }
        let len: i32 = self.len().prechecked_cast();
        len.write_to(msg);
    }

    fn read_from<H: Header>(msg: &mut Message<H>) -> Result<Self, NetError> {
        let len = read_len(msg)?;
        let mut result = Vec::with_capacity(len.min(msg.body_len()));
        for _ in 0..len {
            result.push(T::read_from(msg)?);
        }
        result.reverse();
        Ok(result)
    }
}
