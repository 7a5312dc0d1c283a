//! Minimal response scraping.
//!
//! mailsift drives a fixed, small command set, so instead of a full
//! RFC 9051 grammar this module pulls exactly the data those commands need
//! out of raw response lines: tagged completions, SEARCH id lists, FETCH
//! literals and flag lists, and the mailbox-change counts IDLE reports.

use crate::types::Uid;

/// Tagged command completion status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Command succeeded.
    Ok,
    /// Server refused the command.
    No(String),
    /// Server could not parse the command.
    Bad(String),
}

/// Parses the completion status from a tagged response line.
///
/// Returns `None` if the line is not tagged with `tag`.
#[must_use]
pub fn completion(tag: &str, line: &[u8]) -> Option<Completion> {
    let text = String::from_utf8_lossy(line);
    let rest = text.strip_prefix(tag)?.strip_prefix(' ')?;
    let (status, detail) = rest.split_once(' ').unwrap_or((rest.trim_end(), ""));
    let detail = detail.trim_end().to_string();

    match status.to_ascii_uppercase().as_str() {
        "OK" => Some(Completion::Ok),
        "NO" => Some(Completion::No(detail)),
        "BAD" => Some(Completion::Bad(detail)),
        _ => None,
    }
}

/// Returns the BYE text if the line is an untagged BYE.
#[must_use]
pub fn bye_text(line: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(line);
    let rest = text.strip_prefix("* BYE")?;
    Some(rest.trim().to_string())
}

/// Extracts ids from an untagged SEARCH response.
#[must_use]
pub fn search_ids(line: &[u8]) -> Option<Vec<Uid>> {
    let text = String::from_utf8_lossy(line);
    let rest = text.strip_prefix("* SEARCH")?;
    Some(
        rest.split_ascii_whitespace()
            .filter_map(|tok| tok.parse().ok())
            .collect(),
    )
}

/// Checks whether a response is an untagged FETCH.
#[must_use]
pub fn is_fetch(response: &[u8]) -> bool {
    let text = String::from_utf8_lossy(response);
    let mut tokens = text.split_ascii_whitespace();
    tokens.next() == Some("*")
        && tokens.next().is_some_and(|t| t.parse::<u32>().is_ok())
        && tokens
            .next()
            .is_some_and(|t| t.eq_ignore_ascii_case("FETCH"))
}

/// Extracts the literal payload from a FETCH response.
///
/// The framed reader keeps literal bytes inline, directly after the
/// `{len}\r\n` announcement; this locates the first announcement and slices
/// out the payload.
#[must_use]
pub fn fetch_literal(response: &[u8]) -> Option<Vec<u8>> {
    let open = response.iter().position(|&b| b == b'{')?;
    let close = open + response[open..].iter().position(|&b| b == b'}')?;
    let len: usize = std::str::from_utf8(&response[open + 1..close])
        .ok()?
        .trim_end_matches('+')
        .parse()
        .ok()?;

    let start = close + 3; // skip "}\r\n"
    response.get(start..start + len).map(<[u8]>::to_vec)
}

/// Extracts the flag list from a FETCH response containing `FLAGS (...)`.
#[must_use]
pub fn fetch_flags(response: &[u8]) -> Option<Vec<String>> {
    let text = String::from_utf8_lossy(response);
    let upper = text.to_ascii_uppercase();
    let at = upper.find("FLAGS (")?;
    let rest = &text[at + "FLAGS (".len()..];
    let end = rest.find(')')?;
    Some(
        rest[..end]
            .split_ascii_whitespace()
            .map(ToString::to_string)
            .collect(),
    )
}

/// Parses `* <n> EXISTS` / `* <n> RECENT` / `* <n> EXPUNGE` lines.
///
/// Returns the count and the uppercased keyword.
#[must_use]
pub fn mailbox_change(line: &[u8]) -> Option<(u32, String)> {
    let text = String::from_utf8_lossy(line);
    let mut tokens = text.split_ascii_whitespace();
    if tokens.next() != Some("*") {
        return None;
    }
    let count: u32 = tokens.next()?.parse().ok()?;
    let keyword = tokens.next()?.to_ascii_uppercase();
    matches!(keyword.as_str(), "EXISTS" | "RECENT" | "EXPUNGE").then_some((count, keyword))
}

/// Quotes a mailbox name for transmission.
#[must_use]
pub fn quote(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_completion_statuses() {
        assert_eq!(completion("S0001", b"S0001 OK done\r\n"), Some(Completion::Ok));
        assert_eq!(
            completion("S0001", b"S0001 NO [ALREADYEXISTS] folder exists\r\n"),
            Some(Completion::No("[ALREADYEXISTS] folder exists".into()))
        );
        assert_eq!(
            completion("S0001", b"S0001 BAD syntax\r\n"),
            Some(Completion::Bad("syntax".into()))
        );
        assert_eq!(completion("S0001", b"S0002 OK done\r\n"), None);
        assert_eq!(completion("S0001", b"* OK ready\r\n"), None);
    }

    #[test]
    fn parses_search_ids() {
        assert_eq!(search_ids(b"* SEARCH 4 9 21\r\n"), Some(vec![4, 9, 21]));
        assert_eq!(search_ids(b"* SEARCH\r\n"), Some(vec![]));
        assert_eq!(search_ids(b"* 3 EXISTS\r\n"), None);
    }

    #[test]
    fn parses_mailbox_changes() {
        assert_eq!(mailbox_change(b"* 23 EXISTS\r\n"), Some((23, "EXISTS".into())));
        assert_eq!(mailbox_change(b"* 2 RECENT\r\n"), Some((2, "RECENT".into())));
        assert_eq!(mailbox_change(b"* 7 EXPUNGE\r\n"), Some((7, "EXPUNGE".into())));
        assert_eq!(mailbox_change(b"* SEARCH 1\r\n"), None);
        assert_eq!(mailbox_change(b"+ idling\r\n"), None);
    }

    #[test]
    fn extracts_fetch_literal() {
        let response = b"* 1 FETCH (UID 42 RFC822 {5}\r\nhello)\r\n";
        assert_eq!(fetch_literal(response), Some(b"hello".to_vec()));
        assert_eq!(fetch_literal(b"* 1 FETCH (UID 42)\r\n"), None);
    }

    #[test]
    fn extracts_flags() {
        let response = b"* 12 FETCH (FLAGS (\\Seen processed) UID 100)\r\n";
        assert_eq!(
            fetch_flags(response),
            Some(vec!["\\Seen".to_string(), "processed".to_string()])
        );
        assert_eq!(fetch_flags(b"* 12 FETCH (UID 100)\r\n"), None);
    }

    #[test]
    fn detects_bye() {
        assert_eq!(bye_text(b"* BYE server shutting down\r\n"), Some("server shutting down".into()));
        assert_eq!(bye_text(b"* OK still here\r\n"), None);
    }

    #[test]
    fn quotes_mailbox_names() {
        assert_eq!(quote("INBOX.Important"), "\"INBOX.Important\"");
        assert_eq!(quote("odd \"name\""), "\"odd \\\"name\\\"\"");
    }
}
