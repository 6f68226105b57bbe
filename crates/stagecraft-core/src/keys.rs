//! Keyboard key names.
//!
//! Key names show up in two places: `key` triggers at registration time and
//! the `key_pressed()` query at run time. Both go through
//! [`validate_key_name`] so the person writing the project gets the same
//! helpful message either way.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::SyscallError;

/// Every key name the runtime understands.
pub const VALID_KEYS: &[&str] = &[
    "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o", "p", "q", "r",
    "s", "t", "u", "v", "w", "x", "y", "z", "0", "1", "2", "3", "4", "5", "6", "7", "8", "9",
    " ", "ArrowLeft", "ArrowDown", "ArrowUp", "ArrowRight",
];

fn non_alphanumeric() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new("[^a-z0-9]").ok()).as_ref()
}

/// Whether `keyname` is exactly one of [`VALID_KEYS`].
pub fn is_valid_key_name(keyname: &str) -> bool {
    VALID_KEYS.contains(&keyname)
}

/// Suggest the valid key a near miss probably meant.
///
/// `"Arrowleft"`, `"arrowLeft"` and `"Arrow-Left"` all suggest
/// `"ArrowLeft"`.
pub fn suggested_key_name(invalid: &str) -> Option<&'static str> {
    let lowered = invalid.to_lowercase();
    let cleaned = non_alphanumeric()?.replace_all(&lowered, "");
    if cleaned.is_empty() {
        return None;
    }
    VALID_KEYS
        .iter()
        .copied()
        .find(|key| key.to_lowercase() == cleaned)
}

/// Check a key name, explaining what is wrong with it if anything.
pub fn validate_key_name(keyname: &str) -> Result<(), SyscallError> {
    if is_valid_key_name(keyname) {
        return Ok(());
    }

    if keyname.is_empty() {
        return Err(SyscallError::EmptyKeyName);
    }

    let hint = if keyname.trim().is_empty() {
        "if you meant the spacebar, use \" \" (that's a string consisting of a single \
         space character)"
            .to_string()
    } else if let Some(suggestion) = suggested_key_name(keyname) {
        format!("did you mean \"{}\"?", suggestion)
    } else {
        "you can use keys from \"a\" to \"z\", from \"0\" to \"9\", the space key: \" \", \
         or one of the following: \"ArrowLeft\", \"ArrowDown\", \"ArrowUp\", \"ArrowRight\""
            .to_string()
    };

    Err(SyscallError::InvalidKeyName {
        keyname: keyname.to_string(),
        hint,
    })
}
