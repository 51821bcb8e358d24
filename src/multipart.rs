//! `multipart/form-data` decoding for the attachment route.
//!
//! Bodies are handled as raw bytes end to end, so file parts survive intact
//! whatever bytes they contain, line breaks included.

use std::collections::HashMap;

use bytes::Bytes;
use mime::Mime;
use tracing::{debug, instrument, warn};

use crate::error::RelayError;

pub const DEFAULT_FILE_TYPE: &str = "application/octet-stream";

/// Extract the boundary token from a request `Content-Type` header.
///
/// Fails with [`RelayError::InvalidContentType`] when the header is not
/// `multipart/form-data` or carries no usable boundary. Boundaries that are
/// legal in multipart bodies but not as bare MIME tokens (`----=_Part_0`,
/// `abc:def`) are read straight from the raw header.
pub fn boundary_from_content_type(content_type: &str) -> Result<String, RelayError> {
    let boundary = match content_type.parse::<Mime>() {
        Ok(mime) => {
            if mime.type_() != mime::MULTIPART || mime.subtype() != mime::FORM_DATA {
                return Err(RelayError::invalid_content_type("Invalid content type"));
            }
            mime.get_param(mime::BOUNDARY)
                .map(|b| unquote(b.as_str().trim()))
        }
        Err(_) => {
            let essence = content_type
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase();
            if essence != "multipart/form-data" {
                return Err(RelayError::invalid_content_type("Invalid content type"));
            }
            debug!("Falling back to raw boundary parameter for {:?}", content_type);
            raw_boundary_param(content_type)
        }
    };

    boundary
        .filter(|b| !b.is_empty())
        .ok_or_else(|| RelayError::invalid_content_type("Boundary not found"))
}

fn raw_boundary_param(content_type: &str) -> Option<String> {
    split_params(content_type)
        .into_iter()
        .skip(1)
        .find_map(|segment| {
            let (key, value) = segment.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("boundary")
                .then(|| unquote(value.trim()))
        })
}

/// One part of a multipart body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Part {
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl Part {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn disposition(&self) -> Option<ContentDisposition> {
        self.header("content-disposition")
            .map(ContentDisposition::parse)
    }
}

/// Parsed `Content-Disposition` header of a form part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentDisposition {
    pub kind: String,
    pub name: Option<String>,
    pub filename: Option<String>,
}

impl ContentDisposition {
    pub fn parse(value: &str) -> Self {
        let mut segments = split_params(value).into_iter();
        let kind = segments
            .next()
            .map(|s| s.trim().to_ascii_lowercase())
            .unwrap_or_default();

        let mut disposition = Self {
            kind,
            ..Self::default()
        };
        let mut extended_filename = None;

        for segment in segments {
            let Some((key, raw)) = segment.split_once('=') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = unquote(raw.trim());
            match key.as_str() {
                "name" => disposition.name = Some(value),
                "filename" => disposition.filename = Some(value),
                "filename*" => extended_filename = decode_ext_value(&value),
                _ => {}
            }
        }

        if extended_filename.is_some() {
            disposition.filename = extended_filename;
        }
        disposition
    }
}

/// An uploaded file extracted from a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub field_name: String,
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Decoded form: text fields plus at most one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    pub fields: HashMap<String, String>,
    /// When several file parts are present only the last one is kept.
    pub attachment: Option<Attachment>,
}

impl FormData {
    #[instrument(level = "debug", skip(body), fields(body_len = body.len()))]
    pub fn decode(body: &Bytes, boundary: &str) -> Self {
        Self::from_parts(split_parts(body, boundary))
    }

    pub fn from_parts(parts: impl IntoIterator<Item = Part>) -> Self {
        let mut form = Self::default();

        for part in parts {
            let Some(disposition) = part.disposition() else {
                debug!("Skipping part without content-disposition");
                continue;
            };

            if let Some(filename) = disposition.filename {
                if filename.is_empty() && part.body.is_empty() {
                    debug!("Skipping empty file input");
                    continue;
                }
                if form.attachment.is_some() {
                    warn!("Multiple file parts received, keeping the last one");
                }
                let content_type = part
                    .header("content-type")
                    .unwrap_or(DEFAULT_FILE_TYPE)
                    .to_string();
                debug!(
                    "Decoded file part {:?} ({}, {} bytes)",
                    filename,
                    content_type,
                    part.body.len()
                );
                form.attachment = Some(Attachment {
                    field_name: disposition.name.unwrap_or_default(),
                    filename,
                    content_type,
                    data: part.body,
                });
            } else if let Some(name) = disposition.name {
                let value = String::from_utf8_lossy(&part.body).trim().to_string();
                debug!("Decoded field {:?} ({} chars)", name, value.len());
                form.fields.insert(name, value);
            }
        }

        form
    }

    /// A field value, treating empty values as absent.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Split a multipart body into parts.
///
/// Text before the first delimiter and after the closing delimiter is
/// ignored. Parts without a header/body separator are dropped, as is a final
/// part that is never terminated.
pub fn split_parts(body: &Bytes, boundary: &str) -> Vec<Part> {
    let delimiter = format!("--{boundary}").into_bytes();
    let next_delimiter = format!("\r\n--{boundary}").into_bytes();
    let mut parts = Vec::new();

    let Some(first) = find(body, &delimiter, 0) else {
        warn!("Boundary never appears in body");
        return parts;
    };
    let mut cursor = first + delimiter.len();

    loop {
        if body[cursor..].starts_with(b"--") {
            break;
        }

        let mut start = cursor;
        while start < body.len() && matches!(body[start], b' ' | b'\t') {
            start += 1;
        }
        if !body[start..].starts_with(b"\r\n") {
            warn!("Malformed delimiter line at offset {}", cursor);
            break;
        }
        start += 2;

        let Some(end) = find(body, &next_delimiter, start) else {
            warn!("Unterminated part at offset {}", start);
            break;
        };

        match parse_part(&body.slice(start..end)) {
            Some(part) => parts.push(part),
            None => debug!("Skipping malformed part at offset {}", start),
        }
        cursor = end + next_delimiter.len();
    }

    parts
}

fn parse_part(raw: &Bytes) -> Option<Part> {
    let split = find(raw, b"\r\n\r\n", 0)?;
    let head = String::from_utf8_lossy(&raw[..split]);

    let headers = head
        .split("\r\n")
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect();

    Some(Part {
        headers,
        body: raw.slice(split + 4..),
    })
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

/// Split header parameters on `;`, ignoring separators inside quotes.
fn split_params(value: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                segments.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&value[start..]);
    segments
}

fn unquote(value: &str) -> String {
    match value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    {
        Some(inner) => inner.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => value.to_string(),
    }
}

/// Decode an RFC 5987 extended value such as `UTF-8''na%C3%AFve.png`.
fn decode_ext_value(value: &str) -> Option<String> {
    let mut pieces = value.splitn(3, '\'');
    let charset = pieces.next()?;
    let _language = pieces.next()?;
    let encoded = pieces.next()?;
    if !charset.eq_ignore_ascii_case("utf-8") {
        return None;
    }
    urlencoding::decode(encoded).ok().map(|s| s.into_owned())
}
