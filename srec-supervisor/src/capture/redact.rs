//! Secret redaction for anything that reaches the logs.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::Secret;

/// `OAuth <token>` / `Bearer <token>` credentials, as used in auth headers.
static AUTH_SCHEME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\b((?:oauth|bearer)\s+)[^\s"']+"#).unwrap());

/// `key=value` pairs whose key names a credential.
static SECRET_PAIR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b((?:access_token|auth[_-]?token|token|password|passwd|secret|api[_-]?key)=)[^\s&"']+"#,
    )
    .unwrap()
});

/// Replaces credentials in text with [`Secret::MARKER`].
///
/// Known secret values are replaced literally, then token-bearing patterns
/// are substituted, so a token is hidden even if it was smuggled in through
/// free-text extra arguments.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    secrets: Vec<Secret>,
}

impl Redactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also replace every literal occurrence of `secret`.
    pub fn with_secret(mut self, secret: &Secret) -> Self {
        if !secret.is_empty() {
            self.secrets.push(secret.clone());
        }
        self
    }

    pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut out = Cow::Borrowed(text);

        for secret in &self.secrets {
            if out.contains(secret.expose()) {
                out = Cow::Owned(out.replace(secret.expose(), Secret::MARKER));
            }
        }

        let replacement = format!("${{1}}{}", Secret::MARKER);
        for regex in [&*AUTH_SCHEME_REGEX, &*SECRET_PAIR_REGEX] {
            if regex.is_match(&out) {
                let replaced = regex.replace_all(&out, replacement.as_str()).into_owned();
                out = Cow::Owned(replaced);
            }
        }

        out
    }

    /// Owned line filter for child output, applied before anything is logged.
    pub fn line_filter(&self) -> impl Fn(&str) -> String + Send + 'static {
        let redactor = self.clone();
        move |line| redactor.redact(line).into_owned()
    }
}
