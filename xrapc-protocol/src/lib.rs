//! # xrapc-protocol
//!
//! Wire protocol implementation for XRAP (a REST-style request/reply
//! protocol carried over ZeroMQ).
//!
//! This crate provides:
//! - Frame header, command codes and verbs
//! - Big-endian primitives: short strings, long strings and hashes
//! - Request and reply types
//! - Encoder and decoder for both directions

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod wire;

pub use codec::{Decoder, Encoder};
pub use error::ProtocolError;
pub use frame::{Command, FrameHeader, ParseVerbError, Verb, FRAME_HEADER_SIZE, SIGNATURE};
pub use message::{
    millis_to_datetime, DeleteRequest, GetRequest, NameValue, ParamValue, Parameter,
    PostRequest, PutRequest, Reply, Request,
};
pub use wire::{WireReader, WireWriter, MAX_LONG_STRING, MAX_SHORT_STRING};

/// Default XRAP server port.
pub const DEFAULT_PORT: u16 = 5555;
