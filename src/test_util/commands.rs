use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::message::message::Message;


#[derive(Debug, Clone, Copy, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum TestCommand {
    Ping = 1,
    Pong = 2,
    Chat = 3,
    Move = 4,
}

/// a message carrying `text` as its only body element
pub fn test_message(command: TestCommand, text: &str) -> Message {
    let mut msg = Message::with_command(command);
    msg.write_str(text);
    msg
}
