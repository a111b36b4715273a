//! HTTP exchange views consumed by the validators

use super::decoder::{percent_decode_lenient, query_unescape};
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST};
use http::{HeaderMap, Method};
use std::fmt::Write as _;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use tracing::warn;

/// Inspected request
pub type Request = http::Request<Body>;

/// Inspected response
pub type Response = http::Response<Body>;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Re-readable in-memory body stream
#[derive(Debug, Clone, Default)]
pub struct Body {
    inner: Cursor<Bytes>,
}

impl Body {
    /// Create a body from bytes
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            inner: Cursor::new(data.into()),
        }
    }

    /// Create an empty body
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read the whole body and leave the stream at its start.
    pub fn read_and_rewind(&mut self) -> io::Result<Vec<u8>> {
        self.inner.seek(SeekFrom::Start(0))?;
        let mut data = Vec::with_capacity(self.len());
        self.inner.read_to_end(&mut data)?;
        self.inner.seek(SeekFrom::Start(0))?;
        Ok(data)
    }

    /// Total body length
    pub fn len(&self) -> usize {
        self.inner.get_ref().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.inner.get_ref().is_empty()
    }

    /// Current stream position
    pub fn position(&self) -> u64 {
        self.inner.position()
    }
}

impl Read for Body {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for Body {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl From<Bytes> for Body {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

impl From<Vec<u8>> for Body {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<String> for Body {
    fn from(data: String) -> Self {
        Self::new(data)
    }
}

impl From<&'static str> for Body {
    fn from(data: &'static str) -> Self {
        Self::new(Bytes::from_static(data.as_bytes()))
    }
}

/// Read a body, logging and treating failures as an empty body.
pub(crate) fn read_body(body: &mut Body) -> Vec<u8> {
    match body.read_and_rewind() {
        Ok(data) => data,
        Err(e) => {
            warn!(error = %e, "cannot read exchange body");
            Vec::new()
        },
    }
}

/// Decoded path plus `?` and decoded query, as seen by URL matchers.
pub fn request_target(request: &Request) -> String {
    let uri = request.uri();
    let mut target = percent_decode_lenient(uri.path(), false);
    if let Some(query) = uri.query().filter(|q| !q.is_empty()) {
        target.push('?');
        target.push_str(&percent_decode_lenient(query, true));
    }
    target
}

/// Host of the request, from the `Host` header or the URI authority.
pub fn request_host(request: &Request) -> String {
    request
        .headers()
        .get(HOST)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .or_else(|| request.uri().authority().map(|a| a.to_string()))
        .unwrap_or_default()
}

/// Every value of every header, grouped by name in map order.
pub fn header_entries(headers: &HeaderMap) -> Vec<(String, Vec<String>)> {
    headers
        .keys()
        .map(|name| {
            let values = headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect();
            (name.as_str().to_string(), values)
        })
        .collect()
}

/// Parameters of the URL query, in order.
pub fn query_parameters(request: &Request) -> Vec<(String, String)> {
    request.uri().query().map(parse_pairs).unwrap_or_default()
}

/// Form parameters of a url-encoded `POST`, `PUT` or `PATCH` body, in order.
///
/// The body stream is rewound afterwards.
pub fn form_parameters(request: &mut Request) -> Vec<(String, String)> {
    if !matches!(*request.method(), Method::POST | Method::PUT | Method::PATCH) {
        return Vec::new();
    }

    let is_form = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE));
    if !is_form {
        return Vec::new();
    }

    let data = read_body(request.body_mut());
    parse_pairs(&String::from_utf8_lossy(&data))
}

/// Split `a=1&b=2` into unescaped pairs, skipping pairs that fail to unescape.
pub fn parse_pairs(raw: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match (query_unescape(key), query_unescape(value)) {
            (Ok(key), Ok(value)) => pairs.push((key, value)),
            (Err(e), _) | (_, Err(e)) => {
                warn!(pair = %pair, error = %e, "skipping malformed parameter");
            },
        }
    }

    pairs
}

/// Owned snapshot of the request parts the matchers inspect
#[derive(Debug, Clone, Default)]
pub struct RequestView {
    /// Method
    pub method: String,
    /// Decoded path and query
    pub target: String,
    /// Headers with all their values
    pub headers: Vec<(String, Vec<String>)>,
    /// URL query parameters
    pub query: Vec<(String, String)>,
    /// Body form parameters
    pub form: Vec<(String, String)>,
    /// Raw body bytes
    pub body: Vec<u8>,
}

impl RequestView {
    /// Capture a request, leaving its body rewound
    pub fn capture(request: &mut Request) -> Self {
        let form = form_parameters(request);
        Self {
            method: request.method().as_str().to_string(),
            target: request_target(request),
            headers: header_entries(request.headers()),
            query: query_parameters(request),
            form,
            body: read_body(request.body_mut()),
        }
    }
}

/// Owned snapshot of the response parts the matchers inspect
#[derive(Debug, Clone, Default)]
pub struct ResponseView {
    /// Status code
    pub status: u16,
    /// Headers with all their values
    pub headers: Vec<(String, Vec<String>)>,
    /// Raw body bytes
    pub body: Vec<u8>,
}

impl ResponseView {
    /// Capture a response, leaving its body rewound
    pub fn capture(response: &mut Response) -> Self {
        Self {
            status: response.status().as_u16(),
            headers: header_entries(response.headers()),
            body: read_body(response.body_mut()),
        }
    }
}

fn write_headers(out: &mut String, headers: &HeaderMap, skip_host: bool) {
    for (name, values) in header_entries(headers) {
        if skip_host && name == HOST.as_str() {
            continue;
        }
        let _ = writeln!(out, "{}: {}", name, values.join(";"));
    }
}

/// Canonical raw form of a request.
///
/// Start line with the decoded target, `Host` first, remaining headers in map
/// order, a blank line, then the body. Lines end with `\n`.
pub fn dump_request(request: &mut Request) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} {:?}",
        request.method(),
        request_target(request),
        request.version()
    );
    let _ = writeln!(out, "Host: {}", request_host(request));
    write_headers(&mut out, request.headers(), true);
    out.push('\n');
    out.push_str(&String::from_utf8_lossy(&read_body(request.body_mut())));
    out
}

/// Canonical raw form of a response.
pub fn dump_response(response: &mut Response) -> String {
    let mut out = String::new();
    let status = response.status();
    let _ = writeln!(
        out,
        "{:?} {} {}",
        response.version(),
        status.as_str(),
        status.canonical_reason().unwrap_or("")
    );
    write_headers(&mut out, response.headers(), false);
    out.push('\n');
    out.push_str(&String::from_utf8_lossy(&read_body(response.body_mut())));
    out
}
