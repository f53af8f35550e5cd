//! Converting binary data to and from `data:` URLs.
//!
//! Synthesized speech is handed around as a `data:` URL, so callers that
//! only want a link never need to know where the audio came from.

use std::sync::LazyLock;

use base64::{Engine as _, prelude::BASE64_STANDARD};
use regex::Regex;

use crate::prelude::*;

/// Regex for parsing a `data:` URL.
static DATA_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^data:(?P<mime_type>[^;,]+);base64,(?P<data>.*)$")
        .expect("failed to compile regex")
});

/// Convert binary data to a `data:` URL.
pub fn data_url(mime_type: &str, data: &[u8]) -> String {
    let base64_data = BASE64_STANDARD.encode(data);
    format!("data:{};base64,{}", mime_type, base64_data)
}

/// Parse a `data:` URL into a MIME type and decoded bytes.
pub fn decode_data_url(data_url: &str) -> Result<(String, Vec<u8>)> {
    let caps = DATA_URL_RE
        .captures(data_url)
        .ok_or_else(|| anyhow!("not a base64 data URL"))?;
    let mime_type = caps["mime_type"].to_owned();
    let data = BASE64_STANDARD
        .decode(&caps["data"])
        .context("invalid base64 in data URL")?;
    Ok((mime_type, data))
}
