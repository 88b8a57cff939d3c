//! Email extraction from free-form relay contact lines.
//!
//! Operators write anything in `ContactInfo`: plain addresses, the
//! `email:user[]domain` convention, or "user AT domain DOT org" style
//! obfuscation. We accept the first address that can be recovered.

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[a-z0-9._%+\-]+@[a-z0-9\-]+(?:\.[a-z0-9\-]+)*\.[a-z]{2,}")
        .expect("email regex is valid")
});

static CONTACT_INFO_EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bemail:(\S+)").expect("contact-info regex is valid"));

static OBFUSCATED_AT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(?:\[\s*at\s*\]|\(\s*at\s*\)|\{\s*at\s*\})\s*|\s+at\s+")
        .expect("at regex is valid")
});

static OBFUSCATED_DOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(?:\[\s*dot\s*\]|\(\s*dot\s*\)|\{\s*dot\s*\})\s*|\s+dot\s+")
        .expect("dot regex is valid")
});

fn find_email(text: &str) -> Option<String> {
    EMAIL.find(text).map(|m| m.as_str().to_ascii_lowercase())
}

/// Returns the operator's email address, or `None` if the contact line has none.
pub fn extract_email(contact: &str) -> Option<String> {
    let contact = contact.trim();
    if contact.is_empty() {
        return None;
    }

    if let Some(caps) = CONTACT_INFO_EMAIL.captures(contact) {
        let candidate = caps[1].replace("[]", "@");
        if let Some(email) = find_email(&candidate) {
            return Some(email);
        }
    }

    if let Some(email) = find_email(contact) {
        return Some(email);
    }

    let at = OBFUSCATED_AT.replace_all(contact, "@");
    let dotted = OBFUSCATED_DOT.replace_all(&at, ".");
    find_email(&dotted)
}
