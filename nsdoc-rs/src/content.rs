//! Delivers a rendered [Artifact](crate::artifact::Artifact) via HTTP.
//!
//! [serve_content](serve_content) turns an artifact into a response for a given request. The
//! creation timestamp of the artifact is reported as **Last-Modified** and used to answer
//! conditional requests:
//!
//! * **If-Unmodified-Since**: yields **412 Precondition Failed** if the artifact is newer.
//! * **If-Modified-Since**: yields **304 Not Modified** if the artifact isn't newer.
//! * **Range**: a single byte range (`bytes=0-99`, `bytes=100-` or `bytes=-100`) yields
//!   **206 Partial Content**. A range which doesn't overlap the payload yields
//!   **416 Range Not Satisfiable**. Requests for several ranges are answered with the whole
//!   payload.
//! * **If-Range**: if this carries a date which doesn't match the artifact, the range is ignored.
//!
//! As HTTP dates only have a resolution of seconds, all timestamps are truncated accordingly
//! before being compared.
use chrono::{DateTime, Utc};
use hyper::header::{
    HeaderName, HeaderValue, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE,
    IF_MODIFIED_SINCE, IF_RANGE, IF_UNMODIFIED_SINCE, LAST_MODIFIED, RANGE,
};
use hyper::{Body, HeaderMap, Method, Request, Response, StatusCode};

use crate::artifact::Artifact;

/// Contains the format of an HTTP date (RFC 7231 IMF-fixdate).
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Contains the case insensitive prefixes which make us report a payload as HTML.
const HTML_SIGNATURES: [&str; 17] = [
    "<!doctype html",
    "<html",
    "<head",
    "<script",
    "<iframe",
    "<h1",
    "<div",
    "<font",
    "<table",
    "<a",
    "<style",
    "<title",
    "<b",
    "<body",
    "<br",
    "<p",
    "<!--",
];

#[derive(Debug, PartialEq, Eq)]
enum ByteRange {
    Full,
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

/// Creates the response which delivers the given artifact for the given request.
///
/// Note that **HEAD** requests receive the same headers as a **GET** request but no body.
pub fn serve_content(request: &Request<Body>, artifact: &Artifact) -> Response<Body> {
    let headers = request.headers();
    let modified = artifact.created_at().timestamp();
    let length = artifact.payload().len() as u64;

    let mut response = Response::new(Body::empty());
    set_header(
        &mut response,
        LAST_MODIFIED,
        format_http_date(artifact.created_at()),
    );

    if let Some(since) = parse_date_header(headers, &IF_UNMODIFIED_SINCE) {
        if modified > since {
            *response.status_mut() = StatusCode::PRECONDITION_FAILED;
            return response;
        }
    }

    if let Some(since) = parse_date_header(headers, &IF_MODIFIED_SINCE) {
        if modified <= since {
            *response.status_mut() = StatusCode::NOT_MODIFIED;
            return response;
        }
    }

    set_header(
        &mut response,
        CONTENT_TYPE,
        content_type(artifact.payload()),
    );
    let _ = response
        .headers_mut()
        .insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    let range = match headers.get(RANGE).and_then(|value| value.to_str().ok()) {
        Some(range) if range_applies(headers, modified) => parse_range(range, length),
        _ => ByteRange::Full,
    };

    let body = match range {
        ByteRange::Full => {
            let _ = response
                .headers_mut()
                .insert(CONTENT_LENGTH, HeaderValue::from(length));
            artifact.payload().clone()
        }
        ByteRange::Partial { start, end } => {
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
            set_header(
                &mut response,
                CONTENT_RANGE,
                format!("bytes {}-{}/{}", start, end, length),
            );
            let _ = response
                .headers_mut()
                .insert(CONTENT_LENGTH, HeaderValue::from(end - start + 1));
            artifact.payload().slice(start as usize..=end as usize)
        }
        ByteRange::Unsatisfiable => {
            *response.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
            set_header(&mut response, CONTENT_RANGE, format!("bytes */{}", length));
            return response;
        }
    };

    if request.method() != Method::HEAD {
        *response.body_mut() = Body::from(body);
    }

    response
}

/// Formats the given timestamp as HTTP date.
///
/// # Examples
///
/// ```
/// # use chrono::{TimeZone, Utc};
/// let timestamp = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
/// assert_eq!(nsdoc::content::format_http_date(timestamp), "Sun, 06 Nov 1994 08:49:37 GMT");
/// ```
pub fn format_http_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format(HTTP_DATE_FORMAT).to_string()
}

/// Parses the HTTP date in the given header into seconds since the epoch.
fn parse_date_header(headers: &HeaderMap, name: &HeaderName) -> Option<i64> {
    let value = headers.get(name)?.to_str().ok()?;
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|date| date.timestamp())
}

/// Determines if a range request is to be honoured with regard to **If-Range**.
///
/// Entity tags are never matched, as we don't emit any.
fn range_applies(headers: &HeaderMap, modified: i64) -> bool {
    match headers.get(IF_RANGE) {
        None => true,
        Some(_) => parse_date_header(headers, &IF_RANGE) == Some(modified),
    }
}

fn parse_range(header: &str, length: u64) -> ByteRange {
    let spec = match header.trim().strip_prefix("bytes=") {
        Some(spec) => spec.trim(),
        None => return ByteRange::Unsatisfiable,
    };

    if spec.contains(',') {
        return ByteRange::Full;
    }

    let (start, end) = match spec.split_once('-') {
        Some((start, end)) => (start.trim(), end.trim()),
        None => return ByteRange::Unsatisfiable,
    };

    if start.is_empty() {
        return match end.parse::<u64>() {
            Ok(suffix) if suffix > 0 && length > 0 => ByteRange::Partial {
                start: length.saturating_sub(suffix),
                end: length - 1,
            },
            _ => ByteRange::Unsatisfiable,
        };
    }

    let start = match start.parse::<u64>() {
        Ok(start) if start < length => start,
        _ => return ByteRange::Unsatisfiable,
    };

    if end.is_empty() {
        return ByteRange::Partial {
            start,
            end: length - 1,
        };
    }

    match end.parse::<u64>() {
        Ok(end) if end >= start => ByteRange::Partial {
            start,
            end: end.min(length - 1),
        },
        _ => ByteRange::Unsatisfiable,
    }
}

/// Determines the content type by looking at the payload itself.
fn content_type(payload: &[u8]) -> &'static str {
    match std::str::from_utf8(payload) {
        Ok(text) if looks_like_html(text) => "text/html; charset=utf-8",
        Ok(_) => "text/plain; charset=utf-8",
        Err(_) => "application/octet-stream",
    }
}

fn looks_like_html(text: &str) -> bool {
    let text = text.trim_start();
    let prefix: String = text.chars().take(16).collect::<String>().to_lowercase();

    HTML_SIGNATURES.iter().any(|signature| {
        prefix.starts_with(signature)
            && matches!(
                prefix[signature.len()..].chars().next(),
                Some(' ') | Some('>') | Some('\t') | Some('\n') | Some('\r')
            )
    })
}

fn set_header(response: &mut Response<Body>, name: HeaderName, value: impl AsRef<str>) {
    match HeaderValue::from_str(value.as_ref()) {
        Ok(value) => {
            let _ = response.headers_mut().insert(name, value);
        }
        Err(_) => log::error!("Invalid value for header {}: {}", name, value.as_ref()),
    }
}
