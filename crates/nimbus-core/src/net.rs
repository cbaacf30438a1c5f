//! Minimal HTTP/1.1 over an abstract transport
//!
//! Both sinks speak plain HTTP with one request per connection. The device
//! client writes [`HttpRequest::encode`] to a TCP socket and feeds whatever
//! comes back until the peer closes into [`parse_response`]; the simulator
//! maps the same request onto a desktop HTTP client.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;
use core::net::Ipv4Addr;

use embassy_time::Duration;
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetError {
    #[error("link down")]
    LinkDown,
    #[error("name resolution failed")]
    Resolve,
    #[error("connection failed")]
    Connect,
    #[error("request timed out")]
    Timeout,
    #[error("socket i/o error")]
    Io,
    #[error("malformed HTTP response")]
    MalformedResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub host: String,
    pub port: u16,
    /// Path including the query string
    pub path: String,
    pub body: Option<String>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(host: &str, port: u16, path: String, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            host: String::from(host),
            port,
            path,
            body: None,
            timeout,
        }
    }

    pub fn put_json(host: &str, port: u16, path: String, body: String, timeout: Duration) -> Self {
        Self {
            method: Method::Put,
            host: String::from(host),
            port,
            path,
            body: Some(body),
            timeout,
        }
    }

    /// Full `http://` URL of the request
    pub fn url(&self) -> String {
        let mut url = String::new();
        let _ = write!(url, "http://{}", self.host);
        if self.port != 80 {
            let _ = write!(url, ":{}", self.port);
        }
        url.push_str(&self.path);
        url
    }

    /// Serialise the request for the wire. Connections are never reused.
    pub fn encode(&self) -> Vec<u8> {
        let mut head = String::new();
        let _ = write!(
            head,
            "{} {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: nimbus/{}\r\nConnection: close\r\n",
            self.method.as_str(),
            self.path,
            self.host,
            env!("CARGO_PKG_VERSION"),
        );
        if let Some(body) = &self.body {
            let _ = write!(
                head,
                "Content-Type: application/json\r\nContent-Length: {}\r\n",
                body.len()
            );
        }
        head.push_str("\r\n");

        let mut bytes = head.into_bytes();
        if let Some(body) = &self.body {
            bytes.extend_from_slice(body.as_bytes());
        }
        bytes
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: &str) -> Self {
        Self {
            status,
            body: String::from(body),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Request/response transport used by the sinks.
pub trait HttpClient {
    /// Whether the underlying link is currently usable.
    fn link_up(&self) -> bool;

    /// Resolve `host` to an IPv4 address.
    fn resolve(&mut self, host: &str) -> impl Future<Output = Result<Ipv4Addr, NetError>>;

    /// Perform one request on a fresh connection.
    fn send(&mut self, request: &HttpRequest) -> impl Future<Output = Result<HttpResponse, NetError>>;
}

/// Parse a complete response read until the peer closed the connection.
pub fn parse_response(raw: &[u8]) -> Result<HttpResponse, NetError> {
    let head_end = find(raw, b"\r\n\r\n").ok_or(NetError::MalformedResponse)?;
    let head = core::str::from_utf8(&raw[..head_end]).map_err(|_| NetError::MalformedResponse)?;
    let payload = &raw[head_end + 4..];

    let mut lines = head.split("\r\n");
    let status_line = lines.next().ok_or(NetError::MalformedResponse)?;
    let mut parts = status_line.split(' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(NetError::MalformedResponse);
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or(NetError::MalformedResponse)?;

    let mut content_length = None;
    let mut chunked = false;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().ok();
        } else if name.eq_ignore_ascii_case("transfer-encoding")
            && value.eq_ignore_ascii_case("chunked")
        {
            chunked = true;
        }
    }

    let body = if chunked {
        decode_chunked(payload)?
    } else {
        let len = content_length.map_or(payload.len(), |len| len.min(payload.len()));
        payload[..len].to_vec()
    };

    Ok(HttpResponse {
        status,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

fn decode_chunked(mut payload: &[u8]) -> Result<Vec<u8>, NetError> {
    let mut body = Vec::new();
    loop {
        let line_end = find(payload, b"\r\n").ok_or(NetError::MalformedResponse)?;
        let size_line =
            core::str::from_utf8(&payload[..line_end]).map_err(|_| NetError::MalformedResponse)?;
        let size_hex = size_line.split(';').next().unwrap_or_default().trim();
        let size =
            usize::from_str_radix(size_hex, 16).map_err(|_| NetError::MalformedResponse)?;
        payload = &payload[line_end + 2..];

        if size == 0 {
            return Ok(body);
        }
        if payload.len() < size {
            return Err(NetError::MalformedResponse);
        }
        body.extend_from_slice(&payload[..size]);
        payload = payload.get(size + 2..).unwrap_or_default();
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Percent-encode a query parameter value (RFC 3986 unreserved set kept).
pub fn encode_query_value(value: &str, out: &mut String) {
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => {
                let _ = write!(out, "%{:02X}", byte);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_get_without_body() {
        let request = HttpRequest::get(
            "api.example.com",
            80,
            String::from("/update?api_key=K&field1=1.00"),
            Duration::from_secs(10),
        );
        let wire = String::from_utf8(request.encode()).unwrap();

        assert!(wire.starts_with("GET /update?api_key=K&field1=1.00 HTTP/1.1\r\n"));
        assert!(wire.contains("Host: api.example.com\r\n"));
        assert!(wire.contains("Connection: close\r\n"));
        assert!(!wire.contains("Content-Length"));
        assert!(wire.ends_with("\r\n\r\n"));
    }

    #[test]
    fn encodes_put_with_json_body() {
        let request = HttpRequest::put_json(
            "db.example.com",
            8080,
            String::from("/a.json"),
            String::from("{\"x\":1}"),
            Duration::from_secs(10),
        );
        let wire = String::from_utf8(request.encode()).unwrap();

        assert!(wire.contains("Content-Length: 7\r\n"));
        assert!(wire.ends_with("\r\n\r\n{\"x\":1}"));
        assert_eq!(request.url(), "http://db.example.com:8080/a.json");
    }

    #[test]
    fn parses_content_length_body() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\nConnection: close\r\n\r\n417";
        let response = parse_response(raw).unwrap();

        assert_eq!(response, HttpResponse::new(200, "417"));
        assert!(response.is_success());
    }

    #[test]
    fn parses_chunked_body() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\n{\"a\"\r\n3\r\n:1}\r\n0\r\n\r\n";
        let response = parse_response(raw).unwrap();

        assert_eq!(response.body, "{\"a\":1}");
    }

    #[test]
    fn non_2xx_is_not_success() {
        let response = parse_response(b"HTTP/1.1 401 Unauthorized\r\n\r\n").unwrap();

        assert_eq!(response.status, 401);
        assert!(!response.is_success());
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(
            parse_response(b"hello"),
            Err(NetError::MalformedResponse)
        );
        assert_eq!(
            parse_response(b"SMTP 200\r\n\r\n"),
            Err(NetError::MalformedResponse)
        );
    }

    #[test]
    fn percent_encodes_reserved_characters() {
        let mut out = String::new();
        encode_query_value("a b&c=d", &mut out);
        assert_eq!(out, "a%20b%26c%3Dd");
    }
}
