use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;

use crate::error::StoreError;

/// Number of random bytes behind every subscription id and auth token.
const TOKEN_BYTES: usize = 18;

/// Generates a URL-safe random token (24 characters, no padding, no `-`).
pub fn random_token() -> Result<String, StoreError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    getrandom::fill(&mut bytes).map_err(|e| StoreError::Token(e.to_string()))?;
    Ok(URL_SAFE.encode(bytes).replace('-', "x"))
}

/// Formats a relay fingerprint as space separated groups of four characters.
pub fn spaced_fingerprint(fingerprint: &str) -> String {
    let chars: Vec<char> = fingerprint.chars().collect();
    chars
        .chunks(4)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Renders a whole number of hours the way email bodies phrase it.
pub fn hours_text(hours: i32) -> String {
    if hours == 1 {
        "1 hour".to_string()
    } else if hours >= 48 && hours % 24 == 0 {
        format!("{} days", hours / 24)
    } else {
        format!("{hours} hours")
    }
}
