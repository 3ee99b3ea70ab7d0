//! Presigned-response headers are attached to the storage PUT verbatim, but header fields
//! only carry 7-bit ASCII plus opaque bytes. Non-ASCII metadata (typically the original file
//! name) is re-encoded as its UTF-8 bytes, each byte read back as one Latin-1 character.

use reqwest::header::HeaderValue;
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
#[error("Cannot encode header value: {0}")]
struct EncodingError(String);

/// Encode every value of a presigned header mapping. Never fails.
pub fn encode_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| (name.clone(), encode_header_value(value)))
        .collect()
}

pub fn encode_header_value(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }

    match utf8_as_latin1(value) {
        Ok(encoded) => encoded,
        Err(e) => {
            warn!("{}; stripping non-ASCII characters", e);
            value.chars().filter(|&c| is_carriable_ascii(c)).collect()
        }
    }
}

/// Visible ASCII, space and tab: the only ASCII a header field value may hold
fn is_carriable_ascii(c: char) -> bool {
    c == '\t' || (' '..='~').contains(&c)
}

fn utf8_as_latin1(value: &str) -> Result<String, EncodingError> {
    let bytes = value.as_bytes();
    HeaderValue::from_bytes(bytes).map_err(|_| {
        EncodingError(format!(
            "{:?} contains bytes not allowed in a header field",
            value
        ))
    })?;
    Ok(bytes.iter().map(|&b| char::from(b)).collect())
}

/// Wire bytes of an encoded value; `None` if a character is outside Latin-1
pub fn header_value_bytes(encoded: &str) -> Option<Vec<u8>> {
    encoded
        .chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect()
}

/// Inverse of [`encode_header_value`] for values that took the Latin-1 path
pub fn decode_header_value(encoded: &str) -> Option<String> {
    let bytes = header_value_bytes(encoded)?;
    String::from_utf8(bytes).ok()
}
