//! XRAP frame header, command codes and verbs.
//!
//! Every request and reply starts with the same 7-byte header:
//!
//! ```text
//! +-----------+---------+------------+---------------------+
//! | signature | command | request_id | command fields ...  |
//! |  2 bytes  | 1 byte  |  4 bytes   |                     |
//! +-----------+---------+------------+---------------------+
//! ```
//!
//! All integers are big-endian. The signature is always `0xAAA5`.

use crate::error::ProtocolError;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Signature at the start of every XRAP frame.
pub const SIGNATURE: u16 = 0xAAA5;

/// Size of the fixed frame header in bytes (2+1+4 = 7).
pub const FRAME_HEADER_SIZE: usize = 7;

/// XRAP command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Post = 1,
    PostOk = 2,
    Get = 3,
    GetOk = 4,
    GetEmpty = 5,
    Put = 6,
    PutOk = 7,
    Delete = 8,
    DeleteOk = 9,
    Error = 10,
}

impl Command {
    /// Returns the wire code of this command.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parses a wire code.
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        Ok(match code {
            1 => Command::Post,
            2 => Command::PostOk,
            3 => Command::Get,
            4 => Command::GetOk,
            5 => Command::GetEmpty,
            6 => Command::Put,
            7 => Command::PutOk,
            8 => Command::Delete,
            9 => Command::DeleteOk,
            10 => Command::Error,
            other => return Err(ProtocolError::UnknownCommand(other)),
        })
    }

    /// Returns whether this command is sent by servers.
    pub fn is_reply(self) -> bool {
        !matches!(
            self,
            Command::Post | Command::Get | Command::Put | Command::Delete
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Post => "POST",
            Command::PostOk => "POST_OK",
            Command::Get => "GET",
            Command::GetOk => "GET_OK",
            Command::GetEmpty => "GET_EMPTY",
            Command::Put => "PUT",
            Command::PutOk => "PUT_OK",
            Command::Delete => "DELETE",
            Command::DeleteOk => "DELETE_OK",
            Command::Error => "ERROR",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Request verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl Verb {
    /// Returns the request command for this verb.
    pub fn command(self) -> Command {
        match self {
            Verb::Get => Command::Get,
            Verb::Post => Command::Post,
            Verb::Put => Command::Put,
            Verb::Delete => Command::Delete,
        }
    }

    /// Returns whether `reply` is a valid reply command for this verb.
    ///
    /// `ERROR` is valid for every verb.
    pub fn accepts(self, reply: Command) -> bool {
        matches!(
            (self, reply),
            (_, Command::Error)
                | (Verb::Get, Command::GetOk)
                | (Verb::Get, Command::GetEmpty)
                | (Verb::Post, Command::PostOk)
                | (Verb::Put, Command::PutOk)
                | (Verb::Delete, Command::DeleteOk)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown method name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown method '{0}'")]
pub struct ParseVerbError(pub String);

impl FromStr for Verb {
    type Err = ParseVerbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Verb::Get),
            "POST" => Ok(Verb::Post),
            "PUT" => Ok(Verb::Put),
            "DELETE" => Ok(Verb::Delete),
            other => Err(ParseVerbError(other.to_string())),
        }
    }
}

/// The fixed header of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw command byte.
    pub command: u8,
    /// Request ID this frame belongs to.
    pub request_id: i32,
}

impl FrameHeader {
    /// Reads the header of `frame` without decoding the body.
    pub fn peek(frame: &[u8]) -> Result<Self, ProtocolError> {
        if frame.len() < FRAME_HEADER_SIZE {
            return Err(ProtocolError::MalformedFrame {
                needed: FRAME_HEADER_SIZE,
                remaining: frame.len(),
            });
        }

        let signature = u16::from_be_bytes([frame[0], frame[1]]);
        if signature != SIGNATURE {
            return Err(ProtocolError::InvalidSignature(signature));
        }

        Ok(Self {
            command: frame[2],
            request_id: i32::from_be_bytes([frame[3], frame[4], frame[5], frame[6]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_codes() {
        for code in 1..=10u8 {
            let command = Command::from_code(code).unwrap();
            assert_eq!(command.code(), code);
        }
        assert!(matches!(
            Command::from_code(0),
            Err(ProtocolError::UnknownCommand(0))
        ));
        assert!(matches!(
            Command::from_code(11),
            Err(ProtocolError::UnknownCommand(11))
        ));
    }

    #[test]
    fn test_reply_commands() {
        assert!(!Command::Get.is_reply());
        assert!(!Command::Delete.is_reply());
        assert!(Command::GetEmpty.is_reply());
        assert!(Command::Error.is_reply());
    }

    #[test]
    fn test_verb_accepts() {
        assert!(Verb::Get.accepts(Command::GetOk));
        assert!(Verb::Get.accepts(Command::GetEmpty));
        assert!(!Verb::Get.accepts(Command::PutOk));
        assert!(Verb::Post.accepts(Command::PostOk));
        assert!(!Verb::Post.accepts(Command::GetEmpty));
        assert!(Verb::Put.accepts(Command::PutOk));
        assert!(Verb::Delete.accepts(Command::DeleteOk));
        assert!(!Verb::Delete.accepts(Command::Delete));

        for verb in [Verb::Get, Verb::Post, Verb::Put, Verb::Delete] {
            assert!(verb.accepts(Command::Error));
            assert!(!verb.accepts(verb.command()));
        }
    }

    #[test]
    fn test_verb_parse() {
        assert_eq!("GET".parse::<Verb>().unwrap(), Verb::Get);
        assert_eq!("DELETE".parse::<Verb>().unwrap(), Verb::Delete);
        assert!("PATCH".parse::<Verb>().is_err());
        assert!("get".parse::<Verb>().is_err());
    }

    #[test]
    fn test_header_peek() {
        let frame = [0xAA, 0xA5, 0x05, 0x00, 0x00, 0x00, 0x01, 0x01, 0x30];
        let header = FrameHeader::peek(&frame).unwrap();
        assert_eq!(header.command, 5);
        assert_eq!(header.request_id, 1);
    }

    #[test]
    fn test_header_peek_short() {
        let result = FrameHeader::peek(&[0xAA, 0xA5, 0x05]);
        assert!(matches!(
            result,
            Err(ProtocolError::MalformedFrame {
                needed: 7,
                remaining: 3
            })
        ));
    }

    #[test]
    fn test_header_peek_bad_signature() {
        let result = FrameHeader::peek(&[0xAB, 0xA5, 0x05, 0, 0, 0, 1]);
        assert!(matches!(result, Err(ProtocolError::InvalidSignature(0xABA5))));
    }
}
