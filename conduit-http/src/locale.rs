//! Locale detection for the `Accept-Language` header.

use std::env;

/// Tag used when no usable locale is configured.
pub const DEFAULT_LANGUAGE_TAG: &str = "en";

const LOCALE_VARS: [&str; 3] = ["LC_ALL", "LC_MESSAGES", "LANG"];

/// BCP 47 tag of the process locale, e.g. `en-US`.
pub fn current_language_tag() -> String {
    language_tag_from(|key| env::var(key).ok())
}

/// Resolve the locale from a variable lookup, in POSIX precedence order.
pub fn language_tag_from<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    LOCALE_VARS
        .iter()
        .filter_map(|key| lookup(key))
        .find(|value| !value.trim().is_empty())
        .and_then(|value| language_tag(&value))
        .unwrap_or_else(|| DEFAULT_LANGUAGE_TAG.to_string())
}

/// Convert a POSIX locale name such as `pt_BR.UTF-8` into `pt-BR`.
///
/// Returns `None` for `C`, `POSIX` and names without a valid language.
pub fn language_tag(posix: &str) -> Option<String> {
    let base = posix.split(['.', '@']).next()?.trim();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return None;
    }

    let mut parts = base.split(['_', '-']);
    let language = parts.next()?.to_ascii_lowercase();
    if !(2..=3).contains(&language.len()) || !language.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let mut tag = language;
    for part in parts {
        if part.len() == 4 && part.chars().all(|c| c.is_ascii_alphabetic()) {
            // Script, title case
            tag.push('-');
            tag.push_str(&part[..1].to_ascii_uppercase());
            tag.push_str(&part[1..].to_ascii_lowercase());
        } else if part.len() == 2 && part.chars().all(|c| c.is_ascii_alphabetic()) {
            tag.push('-');
            tag.push_str(&part.to_ascii_uppercase());
        } else if part.len() == 3 && part.chars().all(|c| c.is_ascii_digit()) {
            // UN M.49 region
            tag.push('-');
            tag.push_str(part);
        }
    }
    Some(tag)
}
