//! Turns raw messages into plain text.

use log::debug;
use mail_parser::{Message, MessageParser, MimeHeaders, PartType};

/// Decodes a raw (possibly RFC 2047 encoded) `Subject` header value.
///
/// Encoded words are decoded and concatenated; words that fail to decode are
/// kept as-is by the parser rather than aborting the whole header.
pub fn decode_subject(raw: &str) -> String {
    let header = format!("Subject: {}\r\n\r\n", raw.trim());
    MessageParser::default()
        .parse(header.as_bytes())
        .and_then(|message| message.subject().map(str::to_string))
        .unwrap_or_else(|| raw.trim().to_string())
}

/// Returns the body of the first `text/plain` part that decoded cleanly.
///
/// Single-part messages fall back to their sole payload whatever its type.
/// Returns an empty string if nothing decodes.
pub fn extract_body(message: &Message<'_>) -> String {
    for part in &message.parts {
        if part.is_encoding_problem {
            continue;
        }
        let is_plain = part
            .content_type()
            .map(|ct| {
                ct.ctype().eq_ignore_ascii_case("text")
                    && ct.subtype().map_or(true, |s| s.eq_ignore_ascii_case("plain"))
            })
            .unwrap_or(true);
        if let PartType::Text(text) = &part.body {
            if is_plain {
                return text.to_string();
            }
        }
    }

    if let [only] = message.parts.as_slice() {
        debug!("No clean text/plain part, decoding sole payload");
        return match &only.body {
            PartType::Text(text) | PartType::Html(text) => text.to_string(),
            PartType::Binary(data) | PartType::InlineBinary(data) => {
                String::from_utf8_lossy(data).into_owned()
            }
            _ => String::new(),
        };
    }

    String::new()
}

/// Parses raw message bytes and extracts the body; empty if unparseable.
pub fn extract_body_from_raw(raw: &[u8]) -> String {
    match MessageParser::default().parse(raw) {
        Some(message) => extract_body(&message),
        None => {
            debug!("Message could not be parsed");
            String::new()
        }
    }
}
