//! Output file naming and filename safety checks.

use chrono::NaiveDateTime;

/// Timestamp layout embedded in output filenames.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Container extension of captured files.
pub const OUTPUT_EXTENSION: &str = "mp4";

/// Characters that are invalid in Windows filenames
const WINDOWS_INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Windows reserved filenames (case-insensitive)
const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Build `{streamer}-{YYYYMMDD-HHMMSS}.mp4` for a cycle started at `at`.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use srec_supervisor::utils::filename::output_filename;
///
/// let at = NaiveDate::from_ymd_opt(2024, 1, 2)
///     .unwrap()
///     .and_hms_opt(3, 4, 5)
///     .unwrap();
/// assert_eq!(output_filename("alice", at), "alice-20240102-030405.mp4");
/// ```
pub fn output_filename(streamer: &str, at: NaiveDateTime) -> String {
    format!(
        "{}-{}.{}",
        streamer,
        at.format(TIMESTAMP_FORMAT),
        OUTPUT_EXTENSION
    )
}

/// Sanitize a string for use in filenames across all platforms.
///
/// Control characters and Windows-invalid characters collapse into a single
/// underscore, leading/trailing spaces and dots are trimmed, reserved
/// Windows names get a leading underscore and an empty result becomes
/// `"unnamed"`.
pub fn sanitize_filename(input: &str) -> String {
    if input.is_empty() {
        return "unnamed".to_string();
    }

    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;

    for c in input.chars() {
        if c.is_control() || WINDOWS_INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let trimmed = result.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    let upper = trimmed.to_uppercase();
    for reserved in WINDOWS_RESERVED_NAMES {
        if upper == *reserved || upper.starts_with(&format!("{}.", reserved)) {
            return format!("_{}", trimmed);
        }
    }

    trimmed.to_string()
}

/// Whether `name` can be used verbatim as a filename component.
///
/// Whitespace is rejected as well, since the name also ends up in a URL path.
pub fn is_filename_safe(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(char::is_whitespace) && sanitize_filename(name) == name
}
