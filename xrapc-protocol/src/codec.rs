//! Encoder and decoder for XRAP requests and replies.
//!
//! Request layouts after the common header:
//!
//! ```text
//! GET     resource:s  params:hash  if_modified_since:i64  if_none_match:s  content_type:s
//! POST    resource:s  content_type:s  content_body:S
//! PUT     resource:s  if_unmodified_since:i64  if_match:s  content_type:s  content_body:S
//! DELETE  resource:s  if_unmodified_since:i64  if_match:s
//! ```
//!
//! Reply layouts after the common header:
//!
//! ```text
//! ERROR      status:i16  error_text:s
//! GET_OK     status:i16  etag:s  date_modified:i64  content_type:s  body:S  metadata:hash
//! GET_EMPTY  status:i16
//! POST_OK    status:i16  location:s  etag:s  date_modified:i64  content_type:s  body:S  metadata:hash
//! PUT_OK     status:i16  location:s  etag:s  date_modified:i64  metadata:hash
//! DELETE_OK  status:i16  metadata:hash
//! ```
//!
//! `s` is a short string, `S` a long string.

use crate::error::ProtocolError;
use crate::frame::{Command, Verb, SIGNATURE};
use crate::message::{
    DeleteRequest, GetRequest, NameValue, Reply, PostRequest, PutRequest, Request,
};
use crate::wire::{WireReader, WireWriter};
use bytes::BytesMut;

/// Initial buffer size for encoded frames.
const INITIAL_FRAME_CAPACITY: usize = 64;

/// Encodes requests and replies into frames.
pub struct Encoder;

impl Encoder {
    /// Encodes a request into a frame.
    pub fn encode_request(request: &Request) -> Result<BytesMut, ProtocolError> {
        let mut w = WireWriter::with_capacity(INITIAL_FRAME_CAPACITY);
        w.put_u16(SIGNATURE);
        w.put_u8(request.verb().command().code());
        w.put_i32(request.request_id());

        match request {
            Request::Get(r) => {
                w.put_short_str(Some(&r.resource))?;
                w.put_hash(
                    r.parameters()
                        .iter()
                        .map(|p| (p.name.as_str(), p.value.as_bytes())),
                )?;
                w.put_i64(r.if_modified_since.unwrap_or(0));
                w.put_short_str(r.if_none_match.as_deref())?;
                w.put_short_str(r.content_type.as_deref())?;
            }
            Request::Post(r) => {
                w.put_short_str(Some(&r.resource))?;
                w.put_short_str(r.content_type.as_deref())?;
                w.put_long_bytes(r.content_body.as_deref())?;
            }
            Request::Put(r) => {
                w.put_short_str(Some(&r.resource))?;
                w.put_i64(r.if_unmodified_since.unwrap_or(0));
                w.put_short_str(r.if_match.as_deref())?;
                w.put_short_str(r.content_type.as_deref())?;
                w.put_long_bytes(r.content_body.as_deref())?;
            }
            Request::Delete(r) => {
                w.put_short_str(Some(&r.resource))?;
                w.put_i64(r.if_unmodified_since.unwrap_or(0));
                w.put_short_str(r.if_match.as_deref())?;
            }
        }

        Ok(w.finish())
    }

    /// Encodes a reply with the given reply command.
    ///
    /// Only the fields carried by `command` are written.
    pub fn encode_reply(command: Command, reply: &Reply) -> Result<BytesMut, ProtocolError> {
        if !command.is_reply() {
            return Err(ProtocolError::UnknownCommand(command.code()));
        }

        let mut w = WireWriter::with_capacity(INITIAL_FRAME_CAPACITY);
        w.put_u16(SIGNATURE);
        w.put_u8(command.code());
        w.put_i32(reply.request_id);
        w.put_i16(reply.status_code);

        let metadata = || {
            reply
                .metadata
                .iter()
                .map(|nv| (nv.name.as_str(), &nv.value[..]))
        };

        match command {
            Command::Error => {
                w.put_short_str(reply.error_text.as_deref())?;
            }
            Command::GetOk => {
                w.put_short_str(reply.etag.as_deref())?;
                w.put_i64(reply.date_modified);
                w.put_short_str(reply.content_type.as_deref())?;
                w.put_long_bytes(reply.body.as_deref())?;
                w.put_hash(metadata())?;
            }
            Command::GetEmpty => {}
            Command::PostOk => {
                w.put_short_str(reply.location.as_deref())?;
                w.put_short_str(reply.etag.as_deref())?;
                w.put_i64(reply.date_modified);
                w.put_short_str(reply.content_type.as_deref())?;
                w.put_long_bytes(reply.body.as_deref())?;
                w.put_hash(metadata())?;
            }
            Command::PutOk => {
                w.put_short_str(reply.location.as_deref())?;
                w.put_short_str(reply.etag.as_deref())?;
                w.put_i64(reply.date_modified);
                w.put_hash(metadata())?;
            }
            Command::DeleteOk => {
                w.put_hash(metadata())?;
            }
            Command::Post | Command::Get | Command::Put | Command::Delete => {
                return Err(ProtocolError::UnknownCommand(command.code()));
            }
        }

        Ok(w.finish())
    }
}

/// Decodes frames into replies and requests.
pub struct Decoder;

impl Decoder {
    /// Decodes the reply to a request with the given verb.
    ///
    /// `ERROR` is accepted for every verb; any other command not valid for
    /// `verb` fails with [`ProtocolError::UnknownResponseCode`].
    pub fn decode_reply(verb: Verb, frame: &[u8]) -> Result<Reply, ProtocolError> {
        let mut r = WireReader::new(frame);
        check_signature(&mut r)?;

        let code = r.get_u8()?;
        let command = Command::from_code(code)
            .ok()
            .filter(|c| verb.accepts(*c))
            .ok_or(ProtocolError::UnknownResponseCode {
                verb,
                command: code,
            })?;

        read_reply_body(command, &mut r)
    }

    /// Decodes a reply of any kind, returning its command alongside it.
    pub fn decode_any_reply(frame: &[u8]) -> Result<(Command, Reply), ProtocolError> {
        let mut r = WireReader::new(frame);
        check_signature(&mut r)?;

        let command = Command::from_code(r.get_u8()?)?;
        if !command.is_reply() {
            return Err(ProtocolError::UnknownCommand(command.code()));
        }

        let reply = read_reply_body(command, &mut r)?;
        Ok((command, reply))
    }

    /// Decodes a request frame.
    pub fn decode_request(frame: &[u8]) -> Result<Request, ProtocolError> {
        let mut r = WireReader::new(frame);
        check_signature(&mut r)?;

        let command = Command::from_code(r.get_u8()?)?;
        let request_id = r.get_i32()?;
        let resource = r.get_short_string()?.unwrap_or_default();

        let request = match command {
            Command::Get => {
                let params = r.get_hash()?;
                let mut request = GetRequest::new(resource);
                request.request_id = request_id;
                request.if_modified_since = non_zero(r.get_i64()?);
                request.if_none_match = r.get_short_string()?;
                request.content_type = r.get_short_string()?;
                for (name, value) in params {
                    request.add_parameter(name, value);
                }
                Request::Get(request)
            }
            Command::Post => Request::Post(PostRequest {
                request_id,
                resource,
                content_type: r.get_short_string()?,
                content_body: r.get_long_bytes()?,
            }),
            Command::Put => Request::Put(PutRequest {
                request_id,
                resource,
                if_unmodified_since: non_zero(r.get_i64()?),
                if_match: r.get_short_string()?,
                content_type: r.get_short_string()?,
                content_body: r.get_long_bytes()?,
            }),
            Command::Delete => Request::Delete(DeleteRequest {
                request_id,
                resource,
                if_unmodified_since: non_zero(r.get_i64()?),
                if_match: r.get_short_string()?,
            }),
            other => return Err(ProtocolError::UnknownCommand(other.code())),
        };

        if r.remaining() > 0 {
            return Err(ProtocolError::TrailingBytes(r.remaining()));
        }
        Ok(request)
    }
}

fn check_signature(r: &mut WireReader<'_>) -> Result<(), ProtocolError> {
    let signature = r.get_u16()?;
    if signature != SIGNATURE {
        return Err(ProtocolError::InvalidSignature(signature));
    }
    Ok(())
}

fn non_zero(millis: i64) -> Option<i64> {
    (millis != 0).then_some(millis)
}

fn read_metadata(r: &mut WireReader<'_>) -> Result<Vec<NameValue>, ProtocolError> {
    Ok(r.get_hash()?
        .into_iter()
        .map(|(name, value)| NameValue { name, value })
        .collect())
}

fn read_reply_body(command: Command, r: &mut WireReader<'_>) -> Result<Reply, ProtocolError> {
    let mut reply = Reply {
        request_id: r.get_i32()?,
        status_code: r.get_i16()?,
        ..Default::default()
    };

    match command {
        Command::Error => {
            reply.error_text = r.get_short_string()?;
        }
        Command::GetOk => {
            reply.etag = r.get_short_string()?;
            reply.date_modified = r.get_i64()?;
            reply.content_type = r.get_short_string()?;
            reply.body = r.get_long_bytes()?;
            reply.metadata = read_metadata(r)?;
        }
        Command::GetEmpty => {}
        Command::PostOk => {
            reply.location = r.get_short_string()?;
            reply.etag = r.get_short_string()?;
            reply.date_modified = r.get_i64()?;
            reply.content_type = r.get_short_string()?;
            reply.body = r.get_long_bytes()?;
            reply.metadata = read_metadata(r)?;
        }
        Command::PutOk => {
            reply.location = r.get_short_string()?;
            reply.etag = r.get_short_string()?;
            reply.date_modified = r.get_i64()?;
            reply.metadata = read_metadata(r)?;
        }
        Command::DeleteOk => {
            reply.metadata = read_metadata(r)?;
        }
        Command::Post | Command::Get | Command::Put | Command::Delete => {
            return Err(ProtocolError::UnknownCommand(command.code()));
        }
    }

    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use proptest::prelude::*;

    fn hex(s: &str) -> Vec<u8> {
        s.split_whitespace()
            .map(|b| u8::from_str_radix(b, 16).unwrap())
            .collect()
    }

    #[test]
    fn test_get_request_bytes() {
        let mut request = GetRequest::new("/time").with_parameter("fmt", "iso");
        request.request_id = 1;
        let encoded = Encoder::encode_request(&request.into()).unwrap();
        assert_eq!(
            &encoded[..],
            &hex(
                "AA A5 03 00 00 00 01 05 2F 74 69 6D 65 00 00 00 01 03 66 6D 74 \
                 00 00 00 03 69 73 6F 00 00 00 00 00 00 00 00 00 00"
            )[..]
        );
    }

    #[test]
    fn test_delete_request_bytes() {
        let mut request = DeleteRequest::new("/x");
        request.request_id = 7;
        let encoded = Request::from(request).encode().unwrap();
        assert_eq!(
            &encoded[..],
            &hex("AA A5 08 00 00 00 07 02 2F 78 00 00 00 00 00 00 00 00 00")[..]
        );
    }

    #[test]
    fn test_post_request_bytes() {
        let mut request = PostRequest::new("/things")
            .with_content_type("application/json")
            .with_content_body(Bytes::from_static(br#"{"a":1}"#));
        request.request_id = 42;
        let encoded = Request::from(request).encode().unwrap();
        assert_eq!(
            &encoded[..],
            &hex(
                "AA A5 01 00 00 00 2A 07 2F 74 68 69 6E 67 73 10 61 70 70 6C 69 63 61 74 \
                 69 6F 6E 2F 6A 73 6F 6E 00 00 00 07 7B 22 61 22 3A 31 7D"
            )[..]
        );
    }

    #[test]
    fn test_get_empty_reply() {
        let frame = hex("AA A5 05 00 00 00 01 01 30");
        let reply = Decoder::decode_reply(Verb::Get, &frame).unwrap();
        assert_eq!(
            reply,
            Reply {
                request_id: 1,
                status_code: 304,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_error_reply() {
        let frame = hex("AA A5 0A 00 00 00 07 01 94 04 6E 6F 70 65");
        let reply = Decoder::decode_reply(Verb::Delete, &frame).unwrap();
        assert_eq!(reply, Reply::error(7, 404, "nope"));
    }

    #[test]
    fn test_error_reply_accepted_by_every_verb() {
        let frame = Encoder::encode_reply(Command::Error, &Reply::error(3, 500, "boom")).unwrap();
        for verb in [Verb::Get, Verb::Post, Verb::Put, Verb::Delete] {
            let reply = Decoder::decode_reply(verb, &frame).unwrap();
            assert_eq!(reply.request_id, 3);
            assert_eq!(reply.status_code, 500);
            assert_eq!(reply.error_text.as_deref(), Some("boom"));
            assert_eq!(reply.etag, None);
            assert_eq!(reply.location, None);
            assert_eq!(reply.date_modified, 0);
            assert_eq!(reply.content_type, None);
            assert_eq!(reply.body, None);
            assert!(reply.metadata.is_empty());
        }
    }

    #[test]
    fn test_post_ok_roundtrip() {
        let reply = Reply {
            request_id: 42,
            status_code: 201,
            location: Some("/things/9".to_string()),
            etag: Some("W/1".to_string()),
            date_modified: 1_700_000_000_000,
            ..Default::default()
        };
        let frame = Encoder::encode_reply(Command::PostOk, &reply).unwrap();
        assert_eq!(
            &frame[..],
            &hex(
                "AA A5 02 00 00 00 2A 00 C9 09 2F 74 68 69 6E 67 73 2F 39 03 57 2F 31 \
                 00 00 01 8B CF E5 68 00 00 00 00 00 00 00 00 00 00"
            )[..]
        );
        assert_eq!(Decoder::decode_reply(Verb::Post, &frame).unwrap(), reply);
    }

    #[test]
    fn test_get_ok_with_metadata() {
        let reply = Reply {
            request_id: 5,
            status_code: 200,
            etag: Some("abc".to_string()),
            date_modified: 1_000,
            content_type: Some("text/plain".to_string()),
            body: Some(Bytes::from_static(b"hello")),
            metadata: vec![
                NameValue::new("x-a", Bytes::from_static(b"1")),
                NameValue::new("x-a", Bytes::from_static(b"2")),
            ],
            ..Default::default()
        };
        let frame = Encoder::encode_reply(Command::GetOk, &reply).unwrap();
        assert_eq!(Decoder::decode_reply(Verb::Get, &frame).unwrap(), reply);
    }

    #[test]
    fn test_put_ok_and_delete_ok() {
        let reply = Reply {
            request_id: 8,
            status_code: 200,
            location: Some("/x".to_string()),
            etag: Some("v2".to_string()),
            date_modified: 99,
            metadata: vec![NameValue::new("k", Bytes::from_static(b"v"))],
            ..Default::default()
        };
        let frame = Encoder::encode_reply(Command::PutOk, &reply).unwrap();
        assert_eq!(Decoder::decode_reply(Verb::Put, &frame).unwrap(), reply);

        let reply = Reply {
            request_id: 9,
            status_code: 204,
            ..Default::default()
        };
        let frame = Encoder::encode_reply(Command::DeleteOk, &reply).unwrap();
        assert_eq!(Decoder::decode_reply(Verb::Delete, &frame).unwrap(), reply);
    }

    #[test]
    fn test_put_ok_rejected_by_get() {
        let reply = Reply {
            request_id: 1,
            status_code: 200,
            ..Default::default()
        };
        let frame = Encoder::encode_reply(Command::PutOk, &reply).unwrap();
        let result = Decoder::decode_reply(Verb::Get, &frame);
        assert_eq!(
            result,
            Err(ProtocolError::UnknownResponseCode {
                verb: Verb::Get,
                command: 7
            })
        );
    }

    #[test]
    fn test_request_command_rejected_as_reply() {
        let mut request = DeleteRequest::new("/x");
        request.request_id = 1;
        let frame = Request::from(request).encode().unwrap();
        assert!(matches!(
            Decoder::decode_reply(Verb::Delete, &frame),
            Err(ProtocolError::UnknownResponseCode { command: 8, .. })
        ));
        assert!(matches!(
            Decoder::decode_any_reply(&frame),
            Err(ProtocolError::UnknownCommand(8))
        ));
    }

    #[test]
    fn test_signature_bit_flips() {
        let frames = [
            (Verb::Get, hex("AA A5 05 00 00 00 01 01 30")),
            (Verb::Delete, hex("AA A5 0A 00 00 00 07 01 94 04 6E 6F 70 65")),
            (
                Verb::Delete,
                Encoder::encode_reply(Command::DeleteOk, &Reply::default())
                    .unwrap()
                    .to_vec(),
            ),
        ];

        for (verb, frame) in frames {
            for bit in 0..16 {
                let mut corrupted = frame.clone();
                corrupted[bit / 8] ^= 1 << (bit % 8);
                assert!(matches!(
                    Decoder::decode_reply(verb, &corrupted),
                    Err(ProtocolError::InvalidSignature(_))
                ));
                assert!(matches!(
                    Decoder::decode_any_reply(&corrupted),
                    Err(ProtocolError::InvalidSignature(_))
                ));
            }
        }
    }

    #[test]
    fn test_truncated_reply_is_malformed() {
        let reply = Reply {
            request_id: 5,
            status_code: 200,
            body: Some(Bytes::from_static(b"some body")),
            ..Default::default()
        };
        let frame = Encoder::encode_reply(Command::GetOk, &reply).unwrap();
        for len in 0..frame.len() {
            assert!(matches!(
                Decoder::decode_reply(Verb::Get, &frame[..len]),
                Err(ProtocolError::MalformedFrame { .. })
            ));
        }
    }

    #[test]
    fn test_decode_any_reply_reports_command() {
        let frame = hex("AA A5 05 00 00 00 01 01 30");
        let (command, reply) = Decoder::decode_any_reply(&frame).unwrap();
        assert_eq!(command, Command::GetEmpty);
        assert_eq!(reply.status_code, 304);
    }

    #[test]
    fn test_encode_reply_rejects_request_command() {
        let result = Encoder::encode_reply(Command::Get, &Reply::default());
        assert_eq!(result, Err(ProtocolError::UnknownCommand(3)));
    }

    #[test]
    fn test_long_short_string_fails_encoding() {
        let request = GetRequest::new("/x").with_if_none_match("e".repeat(256));
        assert!(matches!(
            Request::from(request).encode(),
            Err(ProtocolError::StringTooLong { len: 256, .. })
        ));

        let resource = format!("/{}", "r".repeat(254));
        let request = DeleteRequest::new(resource.clone());
        let frame = Request::from(request).encode().unwrap();
        match Decoder::decode_request(&frame).unwrap() {
            Request::Delete(decoded) => assert_eq!(decoded.resource, resource),
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_decode_request_trailing_bytes() {
        let mut frame = Request::from(DeleteRequest::new("/x")).encode().unwrap();
        frame.extend_from_slice(&[0, 0]);
        assert_eq!(
            Decoder::decode_request(&frame),
            Err(ProtocolError::TrailingBytes(2))
        );
    }

    fn short_string() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9/._-]{1,40}"
    }

    fn opt_short_string() -> impl Strategy<Value = Option<String>> {
        proptest::option::of(short_string())
    }

    fn opt_millis() -> impl Strategy<Value = Option<i64>> {
        proptest::option::of(1i64..i64::MAX)
    }

    fn opt_body() -> impl Strategy<Value = Option<Bytes>> {
        proptest::option::of(proptest::collection::vec(any::<u8>(), 1..512).prop_map(Bytes::from))
    }

    fn arb_request() -> impl Strategy<Value = Request> {
        let get = (
            any::<i32>(),
            short_string(),
            opt_millis(),
            opt_short_string(),
            opt_short_string(),
            proptest::collection::vec((short_string(), short_string()), 0..5),
        )
            .prop_map(|(id, resource, ims, inm, ct, params)| {
                let mut r = GetRequest::new(resource);
                r.request_id = id;
                r.if_modified_since = ims;
                r.if_none_match = inm;
                r.content_type = ct;
                for (name, value) in params {
                    r.add_parameter(name, value);
                }
                Request::Get(r)
            });
        let post = (any::<i32>(), short_string(), opt_short_string(), opt_body()).prop_map(
            |(request_id, resource, content_type, content_body)| {
                Request::Post(PostRequest {
                    request_id,
                    resource,
                    content_type,
                    content_body,
                })
            },
        );
        let put = (
            any::<i32>(),
            short_string(),
            opt_millis(),
            opt_short_string(),
            opt_short_string(),
            opt_body(),
        )
            .prop_map(|(request_id, resource, ius, if_match, content_type, content_body)| {
                Request::Put(PutRequest {
                    request_id,
                    resource,
                    if_unmodified_since: ius,
                    if_match,
                    content_type,
                    content_body,
                })
            });
        let delete = (any::<i32>(), short_string(), opt_millis(), opt_short_string()).prop_map(
            |(request_id, resource, if_unmodified_since, if_match)| {
                Request::Delete(DeleteRequest {
                    request_id,
                    resource,
                    if_unmodified_since,
                    if_match,
                })
            },
        );
        prop_oneof![get, post, put, delete]
    }

    /// Decoded GET parameters come back as bytes; compare on wire content.
    fn normalize(request: Request) -> Request {
        match request {
            Request::Get(r) => {
                let mut out = GetRequest::new(r.resource.clone());
                out.request_id = r.request_id;
                out.if_modified_since = r.if_modified_since;
                out.if_none_match = r.if_none_match.clone();
                out.content_type = r.content_type.clone();
                for p in r.parameters() {
                    out.add_parameter(p.name.clone(), p.value.as_bytes().to_vec());
                }
                Request::Get(out)
            }
            other => other,
        }
    }

    proptest! {
        #[test]
        fn prop_request_roundtrip(request in arb_request()) {
            let frame = request.encode().unwrap();
            let decoded = Decoder::decode_request(&frame).unwrap();
            prop_assert_eq!(normalize(decoded), normalize(request));
        }
    }
}
