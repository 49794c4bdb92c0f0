use serde::de::{self, Deserialize, Deserializer};
use std::time::Duration;

const DEFAULT_SCHEME: &str = "http://";

/// Prefix `http://` onto urls that don't name a scheme. Idempotent.
pub fn normalize_url(url: &str) -> String {
    if has_scheme(url) {
        url.to_string()
    } else {
        format!("{}{}", DEFAULT_SCHEME, url)
    }
}

/// Whether `url` opens with `scheme://`. A `://` further along, e.g. inside a query string, doesn't
/// count: scheme characters exclude `/`, `?` and `#`.
fn has_scheme(url: &str) -> bool {
    let scheme = match url.find("://") {
        Some(i) => &url[..i],
        None => return false,
    };
    let mut chars = scheme.chars();

    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        }
        _ => false,
    }
}

/// Parse a human readable duration such as `30s` or `1m 30s`.
pub fn parse_duration(value: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(value.trim())
}

/// Serde adapter for optional humantime durations in config files.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) => parse_duration(&s).map(Some).map_err(de::Error::custom),
    }
}
