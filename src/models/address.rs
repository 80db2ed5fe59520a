//! Address syntax checks. Plausible, not RFC-complete: we only want to
//! catch typos and empty strings before anything touches the network.

use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;

use crate::errors::{MailError, Result};

// Yanked from https://emailregex.com/ and anchored
const EMAIL_REGEX: &str = concat!(
    r#"^(?:[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)"#,
    r#"*|"(?:[\x01-\x08\x0b\x0c\x0e-\x1f\x21\x23-\x5b\x5d-\x7f]|\\[\x01-"#,
    r#"\x09\x0b\x0c\x0e-\x7f])*")@(?:(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\"#,
    r#".)+[a-z0-9](?:[a-z0-9-]*[a-z0-9])?|\[(?:(?:25[0-5]|2[0-4][0-9]|[0"#,
    r#"1]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?|[a-z"#,
    r#"0-9-]*[a-z0-9]:(?:[\x01-\x08\x0b\x0c\x0e-\x1f\x21-\x5a\x53-\x7f]|"#,
    r#"\\[\x01-\x09\x0b\x0c\x0e-\x7f])+)\])$"#
);

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        RegexBuilder::new(EMAIL_REGEX)
            .case_insensitive(true)
            .build()
            .expect("EMAIL_REGEX is a valid pattern")
    })
}

/// Returns `true` for `local-part@domain` shaped strings.
///
/// ```
/// # use mailsubmit::models::is_plausible_address;
/// assert!(is_plausible_address("jane.doe@example.com"));
/// assert!(!is_plausible_address("jane.doe"));
/// ```
pub fn is_plausible_address(address: &str) -> bool {
    email_regex().is_match(address)
}

/// Checks `address` and names `field` in the error if it's no good.
pub(crate) fn validate(field: &'static str, address: &str) -> Result<()> {
    if address.is_empty() {
        return Err(MailError::validation(field, "address is empty"));
    }
    if !is_plausible_address(address) {
        return Err(MailError::validation(
            field,
            format!("{:?} is not a local-part@domain address", address),
        ));
    }
    Ok(())
}
