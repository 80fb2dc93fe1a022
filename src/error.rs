use std::fmt::{Debug, Formatter};
use std::io;
use std::string::FromUtf8Error;

use thiserror::Error;


/// Everything that can go wrong on a connection or while (de)serializing a message body.
///
/// Errors never propagate across an asynchronous boundary by themselves: connections pass them
///  to the failure hooks of their [crate::connection::processor::MessageProcessor], whose return
///  value decides whether the connection keeps going.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("channel error: {0}")]
    Channel(#[from] io::Error),
    #[error("short transfer: expected {expected} bytes, transferred {actual}")]
    ShortTransfer { expected: usize, actual: usize },
    #[error("buffer underflow: needed {needed} bytes, body has {available}")]
    Underflow { needed: usize, available: usize },
    #[error("invalid sequence length {0}")]
    InvalidLength(i32),
    #[error("{0:#x} is not a valid char")]
    InvalidChar(u32),
    #[error("text is not valid UTF-8: {0}")]
    InvalidText(#[from] FromUtf8Error),
    #[error("unknown command id {0}")]
    UnknownCommand(u32),
    #[error("message of {len} bytes does not fit a buffer of {capacity} bytes")]
    MessageTooLarge { len: usize, capacity: usize },
    #[error("queue is closed")]
    QueueClosed,
    #[error("scratch buffer is already allocated")]
    BufferInUse,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorKind {
    Channel,
    ShortTransfer,
    Underflow,
    InvalidLength,
    InvalidChar,
    InvalidText,
    UnknownCommand,
    MessageTooLarge,
    QueueClosed,
    BufferInUse,
}

impl NetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NetError::Channel(_) => ErrorKind::Channel,
            NetError::ShortTransfer { .. } => ErrorKind::ShortTransfer,
            NetError::Underflow { .. } => ErrorKind::Underflow,
            NetError::InvalidLength(_) => ErrorKind::InvalidLength,
            NetError::InvalidChar(_) => ErrorKind::InvalidChar,
            NetError::InvalidText(_) => ErrorKind::InvalidText,
            NetError::UnknownCommand(_) => ErrorKind::UnknownCommand,
            NetError::MessageTooLarge { .. } => ErrorKind::MessageTooLarge,
            NetError::QueueClosed => ErrorKind::QueueClosed,
            NetError::BufferInUse => ErrorKind::BufferInUse,
        }
    }
}


/// A push into a [crate::queue::MessageQueue] that was refused. The item is handed back to the
///  caller.
#[derive(Error)]
pub enum PushError<T> {
    #[error("queue is full")]
    Full(T),
    #[error("queue is closed")]
    Closed(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(item) => item,
            PushError::Closed(item) => item,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, PushError::Full(_))
    }
}

impl<T> Debug for PushError<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PushError::Full(_) => write!(f, "Full(..)"),
            PushError::Closed(_) => write!(f, "Closed(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    #[rstest]
    #[case::channel(NetError::Channel(io::ErrorKind::BrokenPipe.into()), ErrorKind::Channel)]
    #[case::short(NetError::ShortTransfer { expected: 8, actual: 3 }, ErrorKind::ShortTransfer)]
    #[case::underflow(NetError::Underflow { needed: 4, available: 1 }, ErrorKind::Underflow)]
    #[case::closed(NetError::QueueClosed, ErrorKind::QueueClosed)]
    fn test_kind(#[case] error: NetError, #[case] expected: ErrorKind) {
        assert_eq!(error.kind(), expected);
    }

    #[test]
    fn test_push_error_returns_item() {
        let error = PushError::Full(17);
        assert!(error.is_full());
        assert_eq!(format!("{:?}", error), "Full(..)");
        assert_eq!(error.into_inner(), 17);
    }
}
