//! Request building and reply formatting.

use crate::items::{parse_date, Item, UsageError};
use bytes::Bytes;
use colored::Colorize;
use serde_json::{Map, Value};
use std::fmt::Write;
use xrapc_client::{Client, ClientError};
use xrapc_protocol::{
    millis_to_datetime, DeleteRequest, GetRequest, PostRequest, PutRequest, Reply, Request, Verb,
};

/// Errors from running one command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    Usage(#[from] UsageError),

    #[error("Communication error: {0}")]
    Client(#[from] ClientError),
}

/// What to print around a request.
#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub request_header: bool,
    pub request_body: bool,
    pub response_header: bool,
    pub response_body: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            request_header: false,
            request_body: false,
            response_header: true,
            response_body: true,
        }
    }
}

impl OutputOptions {
    /// Applies the `--verbose`, `--headers` and `--body` flags, in that order.
    pub fn from_flags(verbose: bool, headers_only: bool, body_only: bool) -> Self {
        let mut opts = Self::default();
        if verbose {
            opts.request_header = true;
            opts.request_body = true;
        }
        if headers_only {
            opts.response_header = true;
            opts.response_body = false;
        }
        if body_only {
            opts.response_header = false;
            opts.response_body = true;
        }
        opts
    }
}

/// One request as described on the command line.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub verb: Verb,
    pub resource: String,
    headers: Vec<(String, String)>,
    data: Vec<(String, Value)>,
}

/// Returns whether `name` matches the dashed or camel-case form of a field.
fn is_field(name: &str, dashed: &str, camel: &str) -> bool {
    name.eq_ignore_ascii_case(dashed) || name.eq_ignore_ascii_case(camel)
}

impl Invocation {
    pub fn new(verb: Verb, resource: impl Into<String>) -> Self {
        Self {
            verb,
            resource: resource.into(),
            headers: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn add_item(&mut self, item: Item) {
        match item {
            Item::Header { name, value } => self.headers.push((name, value)),
            Item::Data { name, value } => self.data.push((name, value)),
        }
    }

    /// Returns whether the request body must come from stdin: POST and PUT
    /// with no data items.
    pub fn needs_body(&self) -> bool {
        matches!(self.verb, Verb::Post | Verb::Put) && self.data.is_empty()
    }

    fn header_error(&self, name: &str) -> UsageError {
        UsageError(format!(
            "Header field '{}' not appropriate for {} method",
            name, self.verb
        ))
    }

    fn json_body(&self) -> Bytes {
        let object: Map<String, Value> = self.data.iter().cloned().collect();
        Bytes::from(Value::Object(object).to_string())
    }

    /// Builds the request. `body` is used for POST and PUT when
    /// [`needs_body`](Self::needs_body) is true.
    pub fn build(&self, body: Option<Bytes>) -> Result<Request, UsageError> {
        match self.verb {
            Verb::Get => self.build_get().map(Request::Get),
            Verb::Post => {
                let mut request = PostRequest::new(self.resource.as_str());
                for (name, value) in &self.headers {
                    if is_field(name, "content-type", "contentType") {
                        request.content_type = Some(value.clone());
                    } else {
                        return Err(self.header_error(name));
                    }
                }
                request.content_body = Some(self.body_or_json(body));
                Ok(Request::Post(request))
            }
            Verb::Put => {
                let mut request = PutRequest::new(self.resource.as_str());
                for (name, value) in &self.headers {
                    if is_field(name, "if-unmodified-since", "ifUnmodifiedSince") {
                        request = request.with_if_unmodified_since(parse_date(value)?);
                    } else if is_field(name, "if-match", "ifMatch") {
                        request.if_match = Some(value.clone());
                    } else if is_field(name, "content-type", "contentType") {
                        request.content_type = Some(value.clone());
                    } else {
                        return Err(self.header_error(name));
                    }
                }
                request.content_body = Some(self.body_or_json(body));
                Ok(Request::Put(request))
            }
            Verb::Delete => {
                let mut request = DeleteRequest::new(self.resource.as_str());
                for (name, value) in &self.headers {
                    if is_field(name, "if-unmodified-since", "ifUnmodifiedSince") {
                        request = request.with_if_unmodified_since(parse_date(value)?);
                    } else if is_field(name, "if-match", "ifMatch") {
                        request.if_match = Some(value.clone());
                    } else {
                        return Err(self.header_error(name));
                    }
                }
                if let Some((name, _)) = self.data.first() {
                    return Err(UsageError(format!(
                        "DELETE does not accept data items ({})",
                        name
                    )));
                }
                Ok(Request::Delete(request))
            }
        }
    }

    fn build_get(&self) -> Result<GetRequest, UsageError> {
        let mut request = GetRequest::new(self.resource.as_str());
        for (name, value) in &self.headers {
            if is_field(name, "if-modified-since", "ifModifiedSince") {
                request = request.with_if_modified_since(parse_date(value)?);
            } else if is_field(name, "if-none-match", "ifNoneMatch") {
                request.if_none_match = Some(value.clone());
            } else if is_field(name, "content-type", "contentType") {
                request.content_type = Some(value.clone());
            } else {
                return Err(self.header_error(name));
            }
        }
        for (name, value) in &self.data {
            match value {
                Value::String(s) => request.add_parameter(name.as_str(), s.as_str()),
                _ => {
                    return Err(UsageError(format!(
                        "GET only supports string data items ({})",
                        name
                    )))
                }
            }
        }
        Ok(request)
    }

    fn body_or_json(&self, body: Option<Bytes>) -> Bytes {
        match body {
            Some(body) if self.data.is_empty() => body,
            _ => self.json_body(),
        }
    }
}

fn format_date(millis: i64) -> Option<String> {
    millis_to_datetime(millis).map(|dt| dt.to_rfc2822())
}

/// Formats the request line and header fields.
pub fn format_request(request: &Request) -> String {
    let mut out = format!("{} {}\n", request.verb(), request.resource());
    let (content_type, date, etag) = match request {
        Request::Get(r) => (
            r.content_type.as_deref(),
            r.if_modified_since.map(|d| ("If-Modified-Since", d)),
            r.if_none_match.as_deref().map(|e| ("If-None-Match", e)),
        ),
        Request::Post(r) => (r.content_type.as_deref(), None, None),
        Request::Put(r) => (
            r.content_type.as_deref(),
            r.if_unmodified_since.map(|d| ("If-Unmodified-Since", d)),
            r.if_match.as_deref().map(|e| ("If-Match", e)),
        ),
        Request::Delete(r) => (
            None,
            r.if_unmodified_since.map(|d| ("If-Unmodified-Since", d)),
            r.if_match.as_deref().map(|e| ("If-Match", e)),
        ),
    };

    if let Some(ct) = content_type {
        let _ = writeln!(out, "Content-type : {}", ct);
    }
    if let Some((field, date)) = date.and_then(|(f, d)| Some((f, format_date(d)?))) {
        let _ = writeln!(out, "{} : {}", field, date);
    }
    if let Some((field, etag)) = etag {
        let _ = writeln!(out, "{} : {}", field, etag);
    }
    if let Request::Get(r) = request {
        for p in r.parameters() {
            let value = String::from_utf8_lossy(p.value.as_bytes());
            let _ = writeln!(out, "{} = {}", p.name, value);
        }
    }
    out
}

/// Returns the request body, if the request carries one.
pub fn request_body(request: &Request) -> Option<&Bytes> {
    match request {
        Request::Post(r) => r.content_body.as_ref(),
        Request::Put(r) => r.content_body.as_ref(),
        Request::Get(_) | Request::Delete(_) => None,
    }
}

/// Formats a reply: status, header fields, blank line, then the body.
pub fn format_reply(reply: &Reply, opts: &OutputOptions) -> String {
    let mut out = String::new();

    if opts.response_header {
        let status = reply.status_code.to_string();
        let status = if reply.is_error() {
            status.red()
        } else {
            status.green()
        };
        let _ = writeln!(out, "{}", status.bold());
        if let Some(text) = &reply.error_text {
            let _ = writeln!(out, "{}", text.red());
        }
        if let Some(ct) = &reply.content_type {
            let _ = writeln!(out, "{}: {}", "Content-type".cyan(), ct);
        }
        if let Some(date) = format_date(reply.date_modified) {
            let _ = writeln!(out, "{}: {}", "Date-Modified".cyan(), date);
        }
        if let Some(etag) = &reply.etag {
            let _ = writeln!(out, "{}: {}", "ETag".cyan(), etag);
        }
        if let Some(location) = &reply.location {
            let _ = writeln!(out, "{}: {}", "Location".cyan(), location);
        }
        for nv in &reply.metadata {
            let _ = writeln!(out, "{} : {}", nv.name, nv.value_str());
        }
        out.push('\n');
    }

    if opts.response_body {
        if let Some(body) = reply.body_text() {
            out.push_str(&body);
            out.push('\n');
        }
    }

    out
}

/// Builds, prints (if asked) and sends one request, returning the formatted
/// reply.
pub fn execute(
    client: &Client,
    invocation: &Invocation,
    body: Option<Bytes>,
    opts: &OutputOptions,
) -> Result<String, CommandError> {
    let request = invocation.build(body)?;

    if opts.request_header {
        print!("{}", format_request(&request));
    }
    if opts.request_body {
        if let Some(body) = request_body(&request) {
            println!("{}", String::from_utf8_lossy(body));
        }
    }
    if opts.request_header || opts.request_body {
        println!();
    }

    tracing::debug!("Sending {} {}", request.verb(), request.resource());
    let reply = client.send(request)?;
    Ok(format_reply(&reply, opts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::parse_item;
    use serde_json::json;
    use xrapc_protocol::NameValue;

    fn invocation(verb: Verb, resource: &str, items: &[&str]) -> Invocation {
        let mut inv = Invocation::new(verb, resource);
        for item in items {
            inv.add_item(parse_item(item).unwrap());
        }
        inv
    }

    #[test]
    fn test_get_with_params_and_headers() {
        let inv = invocation(
            Verb::Get,
            "/time",
            &["fmt=iso", "If-None-Match:abc", "contentType:text/plain"],
        );
        assert!(!inv.needs_body());
        match inv.build(None).unwrap() {
            Request::Get(r) => {
                assert_eq!(r.resource, "/time");
                assert_eq!(r.if_none_match.as_deref(), Some("abc"));
                assert_eq!(r.content_type.as_deref(), Some("text/plain"));
                assert_eq!(r.parameter("fmt").unwrap().value.as_str(), Some("iso"));
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_get_rejects_json_items_and_bad_headers() {
        let inv = invocation(Verb::Get, "/", &["n:=1"]);
        assert!(inv.build(None).is_err());

        let inv = invocation(Verb::Get, "/", &["if-match:x"]);
        assert_eq!(
            inv.build(None).unwrap_err(),
            UsageError::new("Header field 'if-match' not appropriate for GET method")
        );
    }

    #[test]
    fn test_get_if_modified_since() {
        let inv = invocation(Verb::Get, "/", &["if-modified-since:2023-11-14 22:13:20"]);
        match inv.build(None).unwrap() {
            Request::Get(r) => assert_eq!(r.if_modified_since, Some(1_700_000_000_000)),
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_post_json_body_from_items() {
        let inv = invocation(
            Verb::Post,
            "/things",
            &["content-type:application/json", "name=widget", "count:=3"],
        );
        assert!(!inv.needs_body());
        match inv.build(None).unwrap() {
            Request::Post(r) => {
                assert_eq!(r.content_type.as_deref(), Some("application/json"));
                let body: Value = serde_json::from_slice(&r.content_body.unwrap()).unwrap();
                assert_eq!(body, json!({"name": "widget", "count": 3}));
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_put_body_from_stdin() {
        let inv = invocation(Verb::Put, "/things/1", &["if-match:v1"]);
        assert!(inv.needs_body());
        match inv.build(Some(Bytes::from_static(b"raw"))).unwrap() {
            Request::Put(r) => {
                assert_eq!(r.if_match.as_deref(), Some("v1"));
                assert_eq!(r.content_body.as_deref(), Some(&b"raw"[..]));
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_delete_rejects_data() {
        let inv = invocation(Verb::Delete, "/x", &["ifMatch:v1"]);
        assert!(matches!(inv.build(None).unwrap(), Request::Delete(_)));

        let inv = invocation(Verb::Delete, "/x", &["a=b"]);
        assert!(inv.build(None).is_err());

        let inv = invocation(Verb::Delete, "/x", &["content-type:text/plain"]);
        assert!(inv.build(None).is_err());
    }

    #[test]
    fn test_output_flags() {
        let opts = OutputOptions::from_flags(false, true, false);
        assert!(opts.response_header && !opts.response_body);
        let opts = OutputOptions::from_flags(true, false, true);
        assert!(opts.request_header && !opts.response_header && opts.response_body);
    }

    #[test]
    fn test_format_reply() {
        colored::control::set_override(false);
        let reply = Reply {
            request_id: 1,
            status_code: 200,
            etag: Some("v1".to_string()),
            content_type: Some("text/plain".to_string()),
            body: Some(Bytes::from_static(b"hello")),
            metadata: vec![NameValue::new("x-count", Bytes::from_static(b"2"))],
            ..Default::default()
        };

        let out = format_reply(&reply, &OutputOptions::default());
        assert_eq!(
            out,
            "200\nContent-type: text/plain\nETag: v1\nx-count : 2\n\nhello\n"
        );

        let out = format_reply(&reply, &OutputOptions::from_flags(false, false, true));
        assert_eq!(out, "hello\n");

        let out = format_reply(
            &Reply::error(1, 404, "nope"),
            &OutputOptions::from_flags(false, true, false),
        );
        assert_eq!(out, "404\nnope\n\n");
    }

    #[test]
    fn test_format_request() {
        let request: Request = GetRequest::new("/time")
            .with_if_none_match("abc")
            .with_parameter("fmt", "iso")
            .into();
        assert_eq!(
            format_request(&request),
            "GET /time\nIf-None-Match : abc\nfmt = iso\n"
        );
    }
}
