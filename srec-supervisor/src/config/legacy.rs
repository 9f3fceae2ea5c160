//! INI reading for `settings.config` files written for the older scripts.
//!
//! Those files are plain `key = value` lines with unquoted values and
//! case-insensitive keys. They are converted into the same table shape the
//! TOML reader produces, with every value as a string; numeric and boolean
//! fields accept either form through [`lenient`] and [`lenient_bool`].

use std::fmt::Display;
use std::str::FromStr;

use ini::{Ini, ParseOption};
use serde::{Deserialize, Deserializer};
use toml::{Table, Value};

/// Known keys, used to restore their canonical spelling.
const KNOWN_KEYS: &[&str] = &[
    "Platform",
    "RetryTime",
    "RetryTimeKick",
    "ExternalDir",
    "FallbackDir",
    "TwitchToken",
    "ClientID",
    "ExtraArgs",
    "YtDlpArgs",
    "Quality",
    "CurlConfig",
    "CurlHeaders",
    "CookiesFile",
    "StreamlinkPath",
    "YtDlpPath",
    "CurlPath",
    "CredentialRefreshCycles",
    "FallbackPolicy",
    "Level",
    "File",
    "Console",
    "Dir",
    "MaxBytes",
    "Backups",
];

/// Parse INI text into a table of string values.
///
/// Quotes and backslashes are kept verbatim so Windows paths and quoted
/// extra arguments survive. Keys outside any section are ignored.
pub(super) fn ini_to_table(content: &str) -> Result<Table, ini::ParseError> {
    let options = ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..ParseOption::default()
    };
    let ini = Ini::load_from_str_opt(content, options)?;

    let mut root = Table::new();
    for (section, properties) in ini.iter() {
        let Some(section) = section else {
            continue;
        };
        let mut table = match root.remove(section) {
            Some(Value::Table(existing)) => existing,
            _ => Table::new(),
        };
        for (key, value) in properties.iter() {
            table.insert(
                canonical_key(key.trim()).to_string(),
                Value::String(value.trim().to_string()),
            );
        }
        root.insert(section.to_string(), Value::Table(table));
    }
    Ok(root)
}

fn canonical_key(key: &str) -> &str {
    KNOWN_KEYS
        .iter()
        .find(|known| known.eq_ignore_ascii_case(key))
        .copied()
        .unwrap_or(key)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NativeOrText<T> {
    Native(T),
    Text(String),
}

/// Optional value given natively or as text; empty text counts as absent.
pub(super) fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    match Option::<NativeOrText<T>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NativeOrText::Native(value)) => Ok(Some(value)),
        Some(NativeOrText::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(NativeOrText::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid value {text:?}: {e}"))),
    }
}

/// Optional boolean, also accepting `yes/no`, `on/off` and `1/0`.
pub(super) fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NativeOrText<bool>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NativeOrText::Native(value)) => Ok(Some(value)),
        Some(NativeOrText::Text(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "1" | "yes" | "true" | "on" => Ok(Some(true)),
            "0" | "no" | "false" | "off" => Ok(Some(false)),
            _ => Err(serde::de::Error::custom(format!(
                "invalid boolean {text:?}"
            ))),
        },
    }
}
