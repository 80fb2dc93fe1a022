use std::sync::Mutex;

use bytes::BytesMut;
use tracing::{debug, trace, warn};

use crate::error::NetError;


/// A reusable transfer buffer that is not tied to a single message.
///
/// The buffer is allocated lazily on first use with the configured size, and it keeps that size
///  until it is freed. While it is allocated, the size can not be changed.
pub struct ScratchBuffer {
    name: &'static str,
    inner: Mutex<ScratchBufferInner>,
}

struct ScratchBufferInner {
    size: usize,
    slot: Slot,
}

enum Slot {
    Unallocated,
    Parked(BytesMut),
    InUse,
}

impl ScratchBuffer {
    pub fn new(name: &'static str, size: usize) -> ScratchBuffer {
        ScratchBuffer {
            name,
            inner: Mutex::new(ScratchBufferInner {
                size,
                slot: Slot::Unallocated,
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().size
    }

    pub fn set_size(&self, size: usize) -> Result<(), NetError> {
        let mut inner = self.inner.lock().unwrap();
        if !matches!(inner.slot, Slot::Unallocated) {
            return Err(NetError::BufferInUse);
        }
        inner.size = size;
        Ok(())
    }

    pub fn is_allocated(&self) -> bool {
        !matches!(self.inner.lock().unwrap().slot, Slot::Unallocated)
    }

    /// Returns a zero-filled buffer of the configured size, allocating it on first use
    pub fn acquire(&self) -> BytesMut {
        let mut inner = self.inner.lock().unwrap();
        match std::mem::replace(&mut inner.slot, Slot::InUse) {
            Slot::Parked(buf) => {
                trace!("reusing {} buffer", self.name);
                buf
            }
            Slot::Unallocated => {
                debug!("allocating {} buffer of {} bytes", self.name, inner.size);
                BytesMut::zeroed(inner.size)
            }
            Slot::InUse => {
                warn!("{} buffer is in use - allocating a temporary buffer", self.name);
                BytesMut::zeroed(inner.size)
            }
        }
    }

    pub fn release(&self, mut buf: BytesMut) {
        let mut inner = self.inner.lock().unwrap();
        // restore the full length in case a user of the buffer shortened it
        buf.resize(inner.size, 0);
        inner.slot = Slot::Parked(buf);
    }

    /// Frees the buffer. This fails while the buffer is in use.
    pub fn free(&self) -> Result<(), NetError> {
        let mut inner = self.inner.lock().unwrap();
        if matches!(inner.slot, Slot::InUse) {
            return Err(NetError::BufferInUse);
        }
        trace!("freeing {} buffer", self.name);
        inner.slot = Slot::Unallocated;
        Ok(())
    }
}
