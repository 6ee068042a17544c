//! Parsing of command-line URLs, request items and dates.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use thiserror::Error;

/// Highest valid port number.
const MAX_PORT: u32 = 65535;

/// A mistake in how the tool was invoked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct UsageError(pub String);

impl UsageError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// A request item given after the URL.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// `name:value`, controls a request header field.
    Header { name: String, value: String },
    /// `name=value`, `name=@file`, `name:=json` or `name:=@file`.
    Data { name: String, value: Value },
}

/// Server address and resource parsed from `HOST:PORT[/PATH]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub resource: String,
}

impl Target {
    /// Returns the ZeroMQ endpoint for this target.
    pub fn endpoint(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}

/// Parses `HOST:PORT[/PATH]`. The resource defaults to `/`.
pub fn parse_url(url: &str) -> Result<Target, UsageError> {
    if url.contains('?') {
        return Err(UsageError::new(
            "Query parameters should be specified using items on the command line",
        ));
    }
    if url.contains("://") {
        return Err(UsageError::new("URL should not contain a scheme"));
    }

    let (host_port, resource) = match url.find('/') {
        Some(pos) => (&url[..pos], &url[pos..]),
        None => (url, "/"),
    };
    let (host, port) = parse_host_port(host_port)?;
    Ok(Target {
        host,
        port,
        resource: resource.to_string(),
    })
}

/// Parses `HOST:PORT`.
pub fn parse_host_port(s: &str) -> Result<(String, u16), UsageError> {
    let (host, port) = s
        .split_once(':')
        .ok_or_else(|| UsageError::new("URL must contain a port number"))?;
    Ok((host.to_string(), parse_port(port)?))
}

fn parse_port(s: &str) -> Result<u16, UsageError> {
    if s.is_empty() {
        return Err(UsageError::new("URL must specify a port number"));
    }
    let port: u32 = s
        .parse()
        .map_err(|_| UsageError(format!("Invalid port number '{}' in URL", s)))?;
    if port == 0 || port > MAX_PORT {
        return Err(UsageError(format!(
            "Port number must be in [1, {}]",
            MAX_PORT
        )));
    }
    Ok(port as u16)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

/// Parses one request item.
///
/// Forms are tried in order: `name:=@file`, `name:=json`, `name:value`,
/// `name=@file`, `name=value`. Names are `[A-Za-z0-9-]+`.
pub fn parse_item(item: &str) -> Result<Item, UsageError> {
    let invalid = || UsageError(format!("Invalid item syntax '{}'", item));

    let name_end = item.find(|c: char| !is_name_char(c)).ok_or_else(invalid)?;
    if name_end == 0 {
        return Err(invalid());
    }
    let name = item[..name_end].to_string();
    let rest = &item[name_end..];

    if let Some(path) = rest.strip_prefix(":=@") {
        let text = read_file(path)?;
        let value = serde_json::from_str(&text).map_err(|e| {
            UsageError(format!("Error parsing JSON file '{}' : {}", path, e))
        })?;
        Ok(Item::Data { name, value })
    } else if let Some(text) = rest.strip_prefix(":=") {
        let value = serde_json::from_str(text).map_err(|e| {
            UsageError(format!("Error parsing JSON item text '{}' : {}", text, e))
        })?;
        Ok(Item::Data { name, value })
    } else if let Some(value) = rest.strip_prefix(':') {
        Ok(Item::Header {
            name,
            value: value.to_string(),
        })
    } else if let Some(path) = rest.strip_prefix("=@") {
        Ok(Item::Data {
            name,
            value: Value::String(read_file(path)?),
        })
    } else if let Some(value) = rest.strip_prefix('=') {
        Ok(Item::Data {
            name,
            value: Value::String(value.to_string()),
        })
    } else {
        Err(invalid())
    }
}

fn read_file(path: &str) -> Result<String, UsageError> {
    std::fs::read_to_string(path)
        .map_err(|e| UsageError(format!("Error reading file '{}' : {}", path, e)))
}

/// Parses a date given as RFC 3339, RFC 2822 or `YYYY-MM-DD HH:MM:SS` (UTC).
pub fn parse_date(s: &str) -> Result<DateTime<Utc>, UsageError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| UsageError(format!("Invalid date value '{}' : {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_parse_url() {
        let target = parse_url("localhost:5555/a/b").unwrap();
        assert_eq!(target.host, "localhost");
        assert_eq!(target.port, 5555);
        assert_eq!(target.resource, "/a/b");
        assert_eq!(target.endpoint(), "tcp://localhost:5555");

        let target = parse_url("10.0.0.1:80").unwrap();
        assert_eq!(target.resource, "/");
    }

    #[test]
    fn test_parse_url_errors() {
        assert!(parse_url("tcp://localhost:5555/").is_err());
        assert!(parse_url("localhost:5555/a?b=c").is_err());
        assert_eq!(
            parse_url("localhost/a").unwrap_err(),
            UsageError::new("URL must contain a port number")
        );
        assert!(parse_url("localhost:/a").is_err());
        assert!(parse_url("localhost:0").is_err());
        assert!(parse_url("localhost:65536").is_err());
        assert!(parse_url("localhost:http").is_err());
        assert_eq!(parse_url("localhost:65535").unwrap().port, 65535);
    }

    #[test]
    fn test_parse_items() {
        assert_eq!(
            parse_item("if-none-match:abc").unwrap(),
            Item::Header {
                name: "if-none-match".to_string(),
                value: "abc".to_string()
            }
        );
        assert_eq!(
            parse_item("fmt=iso").unwrap(),
            Item::Data {
                name: "fmt".to_string(),
                value: json!("iso")
            }
        );
        assert_eq!(
            parse_item("count:=3").unwrap(),
            Item::Data {
                name: "count".to_string(),
                value: json!(3)
            }
        );
        assert_eq!(
            parse_item("tags:=[\"a\",\"b\"]").unwrap(),
            Item::Data {
                name: "tags".to_string(),
                value: json!(["a", "b"])
            }
        );
        // Values may contain separators
        assert_eq!(
            parse_item("url=http://x:1").unwrap(),
            Item::Data {
                name: "url".to_string(),
                value: json!("http://x:1")
            }
        );
        assert_eq!(
            parse_item("empty=").unwrap(),
            Item::Data {
                name: "empty".to_string(),
                value: json!("")
            }
        );
    }

    #[test]
    fn test_parse_item_errors() {
        assert!(parse_item("novalue").is_err());
        assert!(parse_item("=value").is_err());
        assert!(parse_item("bad_name=x").is_err());
        assert!(parse_item("n:={oops").is_err());
        assert!(parse_item("n=@/nonexistent/file").is_err());
    }

    #[test]
    fn test_parse_file_items() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"k\": [1, 2]}}").unwrap();
        let path = file.path().to_str().unwrap();

        assert_eq!(
            parse_item(&format!("doc:=@{}", path)).unwrap(),
            Item::Data {
                name: "doc".to_string(),
                value: json!({"k": [1, 2]})
            }
        );
        assert_eq!(
            parse_item(&format!("raw=@{}", path)).unwrap(),
            Item::Data {
                name: "raw".to_string(),
                value: json!("{\"k\": [1, 2]}")
            }
        );
    }

    #[test]
    fn test_parse_date() {
        let expected = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();
        assert_eq!(parse_date("2023-11-14T22:13:20Z").unwrap(), expected);
        assert_eq!(parse_date("2023-11-14 22:13:20").unwrap(), expected);
        assert_eq!(
            parse_date("Tue, 14 Nov 2023 22:13:20 +0000").unwrap(),
            expected
        );
        assert!(parse_date("yesterday").is_err());
    }
}
