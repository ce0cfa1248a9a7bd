//! `multipart/mixed` batch framing.
//!
//! A batch body is a sequence of MIME parts. A part of type
//! `application/http` carries one HTTP request; a nested `multipart/mixed`
//! part is a changeset whose own parts are requests:
//!
//! ```text
//! --batch_1
//! Content-Type: application/http
//!
//! GET Cars('c1') HTTP/1.1
//!
//! --batch_1
//! Content-Type: multipart/mixed; boundary=changeset_1
//!
//! --changeset_1
//! Content-Type: application/http
//!
//! DELETE Cars('c7') HTTP/1.1
//!
//! --changeset_1--
//! --batch_1--
//! ```
//!
//! Responses use the same layout with status lines in place of request
//! lines. A failed changeset answers with its single error response as a
//! plain `application/http` part.

use crate::edm::EdmProvider;
use crate::error::{ODataError, ODataResult};
use crate::request::{BatchPart, ODataRequest, RequestBody};
use crate::response::{BatchResponse, BatchResponsePart, ODataResponse};
use crate::uri::parse_request;
use uuid::Uuid;

const CRLF: &[u8] = b"\r\n";

/// Parses a wire batch, resolving request lines against `edm`.
///
/// # Errors
///
/// Malformed framing and request lines fail the whole batch as a bad
/// request; so does any part that cannot be resolved to a request.
pub fn read_batch(edm: &dyn EdmProvider, content_type: &str, bytes: &[u8]) -> ODataResult<Vec<BatchPart>> {
    let outer = boundary_of(content_type)?;
    split(bytes, &outer)?
        .into_iter()
        .map(|part| {
            let part_type = part.header("Content-Type").unwrap_or_default();
            if is_multipart(part_type) {
                let inner = boundary_of(part_type)?;
                let requests = split(part.body, &inner)?
                    .into_iter()
                    .map(|request| read_request(edm, &request))
                    .collect::<ODataResult<Vec<_>>>()?;
                Ok(BatchPart::ChangeSet(requests))
            } else {
                read_request(edm, &part).map(BatchPart::Request)
            }
        })
        .collect()
}

/// Writes a batch response as `202 Accepted` with a `multipart/mixed` body.
pub fn write_batch(batch: &BatchResponse) -> ODataResponse {
    let boundary = format!("batchresponse_{}", Uuid::new_v4());
    let mut writer = MultipartWriter::new(&boundary);
    for part in &batch.parts {
        match part {
            BatchResponsePart::Response(response) => writer.http_part(response),
            BatchResponsePart::ChangeSet(responses) => match responses.as_slice() {
                [failure] if failure.is_error() => writer.http_part(failure),
                _ => {
                    let inner = format!("changesetresponse_{}", Uuid::new_v4());
                    let mut nested = MultipartWriter::new(&inner);
                    for response in responses {
                        nested.http_part(response);
                    }
                    let part_type = multipart_type(&inner);
                    writer.part(&[("Content-Type", part_type.as_str())], &nested.finish());
                }
            },
        }
    }
    ODataResponse::new(batch.status(), multipart_type(&boundary), writer.finish())
}

fn multipart_type(boundary: &str) -> String {
    format!("multipart/mixed; boundary={boundary}")
}

fn is_multipart(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("multipart/mixed"))
}

/// Extracts the boundary of a `multipart/mixed` content type.
fn boundary_of(content_type: &str) -> ODataResult<String> {
    if !is_multipart(content_type) {
        return Err(ODataError::BadRequest(format!(
            "batch content type must be multipart/mixed, got {content_type:?}"
        )));
    }
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
        .ok_or_else(|| ODataError::BadRequest(format!("no boundary in {content_type:?}")))
}

/// One MIME part: headers and the raw body.
#[derive(Debug)]
struct MimePart<'a> {
    headers: Vec<(String, String)>,
    body: &'a [u8],
}

impl<'a> MimePart<'a> {
    fn parse(bytes: &'a [u8]) -> ODataResult<Self> {
        let (headers, body) = read_headers(bytes)?;
        Ok(Self { headers, body })
    }

    fn header(&self, name: &str) -> Option<&str> {
        header(&self.headers, name)
    }
}

fn header<'h>(headers: &'h [(String, String)], name: &str) -> Option<&'h str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|i| i + from)
}

/// Splits off one line, without its line break.
fn next_line(bytes: &[u8]) -> (&[u8], &[u8]) {
    match bytes.iter().position(|b| *b == b'\n') {
        Some(end) => {
            let line = &bytes[..end];
            (line.strip_suffix(b"\r").unwrap_or(line), &bytes[end + 1..])
        }
        None => (bytes, &bytes[bytes.len()..]),
    }
}

/// Reads header lines up to the first empty line.
fn read_headers(bytes: &[u8]) -> ODataResult<(Vec<(String, String)>, &[u8])> {
    let mut headers = Vec::new();
    let mut rest = bytes;
    while !rest.is_empty() {
        let (line, next) = next_line(rest);
        rest = next;
        if line.is_empty() {
            break;
        }
        let line = std::str::from_utf8(line)
            .map_err(|_| ODataError::BadRequest("batch header is not UTF-8".into()))?;
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ODataError::BadRequest(format!("malformed batch header {line:?}")))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }
    Ok((headers, rest))
}

/// Splits a multipart body into its parts.
///
/// Delimiters count only at the start of a line. The line break before a
/// delimiter belongs to the delimiter; preamble and epilogue are dropped.
fn split<'a>(body: &'a [u8], boundary: &str) -> ODataResult<Vec<MimePart<'a>>> {
    let delimiter = format!("--{boundary}").into_bytes();
    let mut starts = Vec::new();
    let mut from = 0;
    while let Some(at) = find(body, &delimiter, from) {
        let (rest_of_line, _) = next_line(&body[at + delimiter.len()..]);
        let whole = rest_of_line.starts_with(b"--") || rest_of_line.iter().all(u8::is_ascii_whitespace);
        if whole && (at == 0 || body[at - 1] == b'\n') {
            starts.push(at);
        }
        from = at + delimiter.len();
    }

    let mut parts = Vec::new();
    for (index, &at) in starts.iter().enumerate() {
        let after = &body[at + delimiter.len()..];
        if after.starts_with(b"--") {
            return Ok(parts);
        }
        let Some(&end) = starts.get(index + 1) else {
            break;
        };
        let (_, content) = next_line(after);
        let offset = body.len() - content.len();
        let mut stop = end;
        if body[..stop].ends_with(b"\n") {
            stop -= 1;
            if body[..stop].ends_with(b"\r") {
                stop -= 1;
            }
        }
        parts.push(MimePart::parse(&body[offset..stop.max(offset)])?);
    }
    Err(ODataError::BadRequest(format!("multipart body has no closing --{boundary}--")))
}

/// Reads the HTTP request carried by an `application/http` part.
fn read_request(edm: &dyn EdmProvider, part: &MimePart<'_>) -> ODataResult<ODataRequest> {
    if let Some(part_type) = part.header("Content-Type") {
        if !part_type.to_ascii_lowercase().starts_with("application/http") {
            return Err(ODataError::BadRequest(format!("unexpected batch part type {part_type:?}")));
        }
    }
    let mut rest = part.body;
    let mut request_line: &[u8] = &[];
    while !rest.is_empty() && request_line.is_empty() {
        (request_line, rest) = next_line(rest);
    }
    let request_line = std::str::from_utf8(request_line)
        .map_err(|_| ODataError::BadRequest("request line is not UTF-8".into()))?;
    let mut words = request_line.split_whitespace();
    let (Some(method), Some(target)) = (words.next(), words.next()) else {
        return Err(ODataError::BadRequest(format!("malformed request line {request_line:?}")));
    };

    let (headers, mut body) = read_headers(rest)?;
    if let Some(length) = header(&headers, "Content-Length").and_then(|l| l.parse::<usize>().ok()) {
        body = &body[..length.min(body.len())];
    }
    let body = (!body.iter().all(u8::is_ascii_whitespace)).then(|| RequestBody {
        content_type: header(&headers, "Content-Type")
            .unwrap_or("application/json")
            .to_string(),
        bytes: body.to_vec(),
    });
    parse_request(edm, method, target, body)
}

/// Accumulates a multipart body.
struct MultipartWriter {
    delimiter: Vec<u8>,
    out: Vec<u8>,
}

impl MultipartWriter {
    fn new(boundary: &str) -> Self {
        Self {
            delimiter: format!("--{boundary}").into_bytes(),
            out: Vec::new(),
        }
    }

    fn part(&mut self, headers: &[(&str, &str)], body: &[u8]) {
        self.out.extend_from_slice(&self.delimiter);
        self.out.extend_from_slice(CRLF);
        for (name, value) in headers {
            self.out.extend_from_slice(format!("{name}: {value}").as_bytes());
            self.out.extend_from_slice(CRLF);
        }
        self.out.extend_from_slice(CRLF);
        self.out.extend_from_slice(body);
        self.out.extend_from_slice(CRLF);
    }

    fn http_part(&mut self, response: &ODataResponse) {
        let message = http_message(response);
        self.part(
            &[("Content-Type", "application/http"), ("Content-Transfer-Encoding", "binary")],
            &message,
        );
    }

    fn finish(mut self) -> Vec<u8> {
        self.out.extend_from_slice(&self.delimiter);
        self.out.extend_from_slice(b"--");
        self.out.extend_from_slice(CRLF);
        self.out
    }
}

/// Serializes a response as an HTTP message.
fn http_message(response: &ODataResponse) -> Vec<u8> {
    let status = response.status();
    let mut out = format!("HTTP/1.1 {} {}\r\n", status.as_u16(), status.reason()).into_bytes();
    if let Some(content_type) = response.content_type() {
        out.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
    }
    out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", response.body().len()).as_bytes());
    out.extend_from_slice(response.body());
    out
}
