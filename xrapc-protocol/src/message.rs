//! XRAP request and reply types.

use crate::codec::Encoder;
use crate::error::ProtocolError;
use crate::frame::Verb;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, TimeZone, Utc};
use std::borrow::Cow;

/// Converts a wire timestamp to a date. Zero means absent.
pub fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    if millis == 0 {
        return None;
    }
    Utc.timestamp_millis_opt(millis).single()
}

fn names_match(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

/// Value of a GET request parameter.
///
/// Both forms share the same wire encoding; the tag only records how the
/// caller supplied the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Text(String),
    Binary(Bytes),
}

impl ParamValue {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ParamValue::Text(s) => s.as_bytes(),
            ParamValue::Binary(b) => b,
        }
    }

    /// Returns the string value, or `None` if the value was given as bytes.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            ParamValue::Binary(_) => None,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, ParamValue::Binary(_))
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<Vec<u8>> for ParamValue {
    fn from(value: Vec<u8>) -> Self {
        ParamValue::Binary(Bytes::from(value))
    }
}

impl From<Bytes> for ParamValue {
    fn from(value: Bytes) -> Self {
        ParamValue::Binary(value)
    }
}

/// A named GET request parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub value: ParamValue,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A GET request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetRequest {
    /// Request ID, assigned by the client when the request is sent.
    pub request_id: i32,
    /// Resource path, e.g. `/a/b/c`.
    pub resource: String,
    /// Conditional GET on modification date (Unix milliseconds).
    pub if_modified_since: Option<i64>,
    /// Conditional GET on an ETag previously returned by the server.
    pub if_none_match: Option<String>,
    /// Requested content type; `None` lets the server choose.
    pub content_type: Option<String>,
    parameters: Vec<Parameter>,
}

impl GetRequest {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            ..Default::default()
        }
    }

    pub fn with_if_modified_since(mut self, at: DateTime<Utc>) -> Self {
        self.if_modified_since = Some(at.timestamp_millis());
        self
    }

    pub fn with_if_none_match(mut self, etag: impl Into<String>) -> Self {
        self.if_none_match = Some(etag.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.add_parameter(name, value);
        self
    }

    pub fn if_modified_since(&self) -> Option<DateTime<Utc>> {
        self.if_modified_since.and_then(millis_to_datetime)
    }

    /// Appends a parameter, even if one with the same name exists.
    pub fn add_parameter(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.parameters.push(Parameter::new(name, value));
    }

    /// Sets a parameter, replacing any existing ones with the same name.
    ///
    /// Names compare case-insensitively. The first match is replaced in
    /// place and later matches are removed; with no match the parameter is
    /// appended.
    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        let param = Parameter::new(name, value);
        let first = self
            .parameters
            .iter()
            .position(|p| names_match(&p.name, &param.name));

        match first {
            Some(first) => {
                let mut index = 0;
                self.parameters.retain(|p| {
                    let keep = index <= first || !names_match(&p.name, &param.name);
                    index += 1;
                    keep
                });
                self.parameters[first] = param;
            }
            None => self.parameters.push(param),
        }
    }

    /// Returns the first parameter with the given name (case-insensitive).
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| names_match(&p.name, name))
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }
}

/// A POST request, sent to the parent resource of the one being created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostRequest {
    /// Request ID, assigned by the client when the request is sent.
    pub request_id: i32,
    pub resource: String,
    pub content_type: Option<String>,
    pub content_body: Option<Bytes>,
}

impl PostRequest {
    pub fn new(parent_resource: impl Into<String>) -> Self {
        Self {
            resource: parent_resource.into(),
            ..Default::default()
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_content_body(mut self, body: impl Into<Bytes>) -> Self {
        self.content_body = Some(body.into());
        self
    }
}

/// A PUT request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutRequest {
    /// Request ID, assigned by the client when the request is sent.
    pub request_id: i32,
    pub resource: String,
    /// Conditional PUT on modification date (Unix milliseconds).
    pub if_unmodified_since: Option<i64>,
    /// Conditional PUT on an ETag.
    pub if_match: Option<String>,
    pub content_type: Option<String>,
    pub content_body: Option<Bytes>,
}

impl PutRequest {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            ..Default::default()
        }
    }

    pub fn with_if_unmodified_since(mut self, at: DateTime<Utc>) -> Self {
        self.if_unmodified_since = Some(at.timestamp_millis());
        self
    }

    pub fn with_if_match(mut self, etag: impl Into<String>) -> Self {
        self.if_match = Some(etag.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_content_body(mut self, body: impl Into<Bytes>) -> Self {
        self.content_body = Some(body.into());
        self
    }

    pub fn if_unmodified_since(&self) -> Option<DateTime<Utc>> {
        self.if_unmodified_since.and_then(millis_to_datetime)
    }
}

/// A DELETE request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteRequest {
    /// Request ID, assigned by the client when the request is sent.
    pub request_id: i32,
    pub resource: String,
    pub if_unmodified_since: Option<i64>,
    pub if_match: Option<String>,
}

impl DeleteRequest {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            ..Default::default()
        }
    }

    pub fn with_if_unmodified_since(mut self, at: DateTime<Utc>) -> Self {
        self.if_unmodified_since = Some(at.timestamp_millis());
        self
    }

    pub fn with_if_match(mut self, etag: impl Into<String>) -> Self {
        self.if_match = Some(etag.into());
        self
    }

    pub fn if_unmodified_since(&self) -> Option<DateTime<Utc>> {
        self.if_unmodified_since.and_then(millis_to_datetime)
    }
}

/// Any XRAP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Get(GetRequest),
    Post(PostRequest),
    Put(PutRequest),
    Delete(DeleteRequest),
}

impl Request {
    pub fn verb(&self) -> Verb {
        match self {
            Request::Get(_) => Verb::Get,
            Request::Post(_) => Verb::Post,
            Request::Put(_) => Verb::Put,
            Request::Delete(_) => Verb::Delete,
        }
    }

    pub fn request_id(&self) -> i32 {
        match self {
            Request::Get(r) => r.request_id,
            Request::Post(r) => r.request_id,
            Request::Put(r) => r.request_id,
            Request::Delete(r) => r.request_id,
        }
    }

    pub fn set_request_id(&mut self, request_id: i32) {
        match self {
            Request::Get(r) => r.request_id = request_id,
            Request::Post(r) => r.request_id = request_id,
            Request::Put(r) => r.request_id = request_id,
            Request::Delete(r) => r.request_id = request_id,
        }
    }

    pub fn resource(&self) -> &str {
        match self {
            Request::Get(r) => &r.resource,
            Request::Post(r) => &r.resource,
            Request::Put(r) => &r.resource,
            Request::Delete(r) => &r.resource,
        }
    }

    /// Encodes this request into a single frame.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        Encoder::encode_request(self)
    }
}

impl From<GetRequest> for Request {
    fn from(request: GetRequest) -> Self {
        Request::Get(request)
    }
}

impl From<PostRequest> for Request {
    fn from(request: PostRequest) -> Self {
        Request::Post(request)
    }
}

impl From<PutRequest> for Request {
    fn from(request: PutRequest) -> Self {
        Request::Put(request)
    }
}

impl From<DeleteRequest> for Request {
    fn from(request: DeleteRequest) -> Self {
        Request::Delete(request)
    }
}

/// A metadata entry in a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameValue {
    pub name: String,
    pub value: Bytes,
}

impl NameValue {
    pub fn new(name: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Returns the value as UTF-8 text, replacing invalid sequences.
    pub fn value_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

/// A reply to any XRAP request.
///
/// One record covers every reply command; fields a command does not carry
/// stay `None`, zero or empty. Server-side errors arrive as a normal reply
/// with `error_text` set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub request_id: i32,
    pub status_code: i16,
    pub error_text: Option<String>,
    pub etag: Option<String>,
    pub location: Option<String>,
    /// Unix milliseconds; zero means absent.
    pub date_modified: i64,
    pub content_type: Option<String>,
    pub body: Option<Bytes>,
    /// Entries in the order received; names may repeat.
    pub metadata: Vec<NameValue>,
}

impl Reply {
    /// Creates an `ERROR` reply.
    pub fn error(request_id: i32, status_code: i16, error_text: impl Into<String>) -> Self {
        Self {
            request_id,
            status_code,
            error_text: Some(error_text.into()),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn is_error(&self) -> bool {
        self.status_code >= 400 || self.error_text.is_some()
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.date_modified)
    }

    /// Returns the body as UTF-8 text, replacing invalid sequences.
    pub fn body_text(&self) -> Option<Cow<'_, str>> {
        self.body.as_ref().map(|b| String::from_utf8_lossy(b))
    }

    /// Returns all metadata values with the given name, in order.
    pub fn metadata_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Bytes> + 'a {
        self.metadata
            .iter()
            .filter(move |nv| nv.name == name)
            .map(|nv| &nv.value)
    }
}
