//! Message parsing.
//!
//! Turns a raw RFC822 fetch into the shape the classification engine works
//! on: a header map, the sender address, a normalized subject, the plain
//! text body and the reply flag. This handles both single-part and
//! multipart MIME messages; only `text/plain` parts contribute to the body.

use std::collections::HashMap;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use mailsift_imap::Uid;

/// A fetched message, parsed for triage. Ephemeral; created per fetch.
#[derive(Debug, Clone)]
pub struct Message {
    /// Identifier within the mailbox listing it came from.
    pub uid: Uid,
    /// Header map with lower-cased names; later duplicates win.
    headers: HashMap<String, String>,
    /// Sender address extracted from `From`, lower-cased.
    pub sender: String,
    /// Subject, lower-cased, reply prefixes stripped.
    pub subject: String,
    /// Concatenated `text/plain` content, lower-cased.
    pub body: String,
    /// Whether the subject carried a reply prefix.
    pub is_reply: bool,
    /// Parsed `Date` header, if present and well-formed.
    pub date: Option<DateTime<Utc>>,
}

impl Message {
    /// Parses a raw RFC822 message. Never fails; absent or malformed pieces
    /// come back empty so one broken message cannot stall a triage run.
    #[must_use]
    pub fn parse(uid: Uid, raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let (header_block, body_block) = split_headers_body(&text);
        let headers = parse_headers(&header_block);

        let (subject, is_reply) =
            normalize_subject(headers.get("subject").map_or("", String::as_str));
        let sender = headers
            .get("from")
            .map_or_else(String::new, |from| extract_address(from));
        let date = headers
            .get("date")
            .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())
            .map(|d| d.with_timezone(&Utc));

        let mut parts = Vec::new();
        collect_plain_text(&header_block, &body_block, &mut parts, 0);
        let body = parts.join("").to_lowercase();

        Self {
            uid,
            headers,
            sender,
            subject,
            body,
            is_reply,
            date,
        }
    }

    /// Looks up a header by (case-insensitive) name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

/// Splits a message into headers and body at the first blank line.
fn split_headers_body(message: &str) -> (String, String) {
    if let Some(idx) = message.find("\r\n\r\n") {
        (message[..idx].to_string(), message[idx + 4..].to_string())
    } else if let Some(idx) = message.find("\n\n") {
        (message[..idx].to_string(), message[idx + 2..].to_string())
    } else {
        (message.to_string(), String::new())
    }
}

/// Parses a header block into a map, unfolding continuation lines.
fn parse_headers(block: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    let mut current: Option<(String, String)> = None;

    for line in block.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = current.as_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = current.take() {
            headers.insert(name, value);
        }
        if let Some((name, value)) = line.split_once(':') {
            current = Some((name.trim().to_lowercase(), value.trim().to_string()));
        }
    }
    if let Some((name, value)) = current {
        headers.insert(name, value);
    }

    headers
}

/// Pulls the bare address out of a `From` header value.
///
/// Prefers the angle-bracket form; otherwise takes the first token
/// containing `@`, shorn of surrounding punctuation.
fn extract_address(from: &str) -> String {
    if let Some(open) = from.find('<')
        && let Some(close) = from[open..].find('>')
    {
        return from[open + 1..open + close].trim().to_lowercase();
    }

    from.split_whitespace()
        .find(|tok| tok.contains('@'))
        .map(|tok| tok.trim_matches(|c: char| !c.is_alphanumeric() && c != '@' && c != '.'))
        .unwrap_or_default()
        .to_lowercase()
}

/// Lower-cases the subject and strips reply prefixes.
///
/// Returns the normalized thread subject and whether any prefix was found.
fn normalize_subject(subject: &str) -> (String, bool) {
    let mut subject = subject.trim().to_lowercase();
    let mut is_reply = false;
    while let Some(rest) = subject.strip_prefix("re:") {
        is_reply = true;
        subject = rest.trim_start().to_string();
    }
    (subject, is_reply)
}

/// Maximum multipart nesting to follow.
const MAX_MIME_DEPTH: usize = 8;

/// Recursively collects decoded `text/plain` content.
fn collect_plain_text(headers: &str, body: &str, out: &mut Vec<String>, depth: usize) {
    if depth > MAX_MIME_DEPTH {
        return;
    }

    if let Some(boundary) = extract_boundary(headers) {
        for part in split_multipart(body, &boundary) {
            let (part_headers, part_body) = split_headers_body(&part);
            collect_plain_text(&part_headers, &part_body, out, depth + 1);
        }
        return;
    }

    let content_type = get_header(headers, "content-type")
        .unwrap_or("text/plain")
        .to_lowercase();
    if content_type.contains("text/plain") {
        out.push(decode_part(body, headers));
    }
}

/// Gets a header value from a raw header block.
fn get_header<'a>(headers: &'a str, name: &str) -> Option<&'a str> {
    let name_lower = name.to_lowercase();
    for line in headers.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            continue;
        }
        if let Some((header_name, value)) = line.split_once(':')
            && header_name.trim().to_lowercase() == name_lower
        {
            return Some(value.trim());
        }
    }
    None
}

/// Extracts the boundary parameter from a Content-Type header.
fn extract_boundary(headers: &str) -> Option<String> {
    let content_type = get_header(headers, "content-type")?;
    let lower = content_type.to_lowercase();
    let idx = lower.find("boundary=")?;
    let rest = &content_type[idx + "boundary=".len()..];

    if let Some(stripped) = rest.strip_prefix('"') {
        let end = stripped.find('"')?;
        Some(stripped[..end].to_string())
    } else {
        let end = rest
            .find(|c: char| c.is_whitespace() || c == ';')
            .unwrap_or(rest.len());
        Some(rest[..end].to_string())
    }
}

/// Splits a multipart body into its parts using the boundary.
fn split_multipart(body: &str, boundary: &str) -> Vec<String> {
    let delimiter = format!("--{boundary}");
    let end_delimiter = format!("--{boundary}--");

    body.split(&delimiter)
        .map(str::trim)
        .filter(|part| !part.is_empty() && !part.starts_with("--"))
        .map(|part| {
            part.strip_suffix(&end_delimiter)
                .unwrap_or(part)
                .to_string()
        })
        .filter(|part| !part.trim().is_empty())
        .collect()
}

/// Decodes a part body according to its Content-Transfer-Encoding.
fn decode_part(body: &str, headers: &str) -> String {
    let encoding = get_header(headers, "content-transfer-encoding")
        .unwrap_or("7bit")
        .to_lowercase();

    match encoding.as_str() {
        "base64" => {
            let cleaned: String = body.chars().filter(|c| !c.is_whitespace()).collect();
            base64::engine::general_purpose::STANDARD
                .decode(&cleaned)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .unwrap_or_else(|| body.to_string())
        }
        "quoted-printable" => decode_quoted_printable(body),
        _ => body.to_string(),
    }
}

/// Decodes quoted-printable content: `=XX` escapes and soft line breaks.
fn decode_quoted_printable(body: &str) -> String {
    let bytes = body.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'=' {
            // Soft break: "=\r\n" or "=\n".
            if bytes.get(i + 1) == Some(&b'\r') && bytes.get(i + 2) == Some(&b'\n') {
                i += 3;
                continue;
            }
            if bytes.get(i + 1) == Some(&b'\n') {
                i += 2;
                continue;
            }
            if let (Some(&hi), Some(&lo)) = (bytes.get(i + 1), bytes.get(i + 2))
                && let (Some(hi), Some(lo)) = (hex_value(hi), hex_value(lo))
            {
                out.push(hi * 16 + lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}
