//! The streamer being captured.

use super::Platform;
use crate::utils::filename::is_filename_safe;
use crate::{Error, Result};

/// Immutable description of what is captured for the whole process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTarget {
    platform: Platform,
    streamer: String,
    stream_url: String,
}

impl CaptureTarget {
    /// Derive the target from a streamer identifier.
    ///
    /// The identifier ends up in both a URL and a filename, so anything that
    /// is not a plain filename component is rejected.
    pub fn new(platform: Platform, streamer: impl Into<String>) -> Result<Self> {
        let streamer = streamer.into();
        let trimmed = streamer.trim();
        if !is_filename_safe(trimmed) {
            return Err(Error::InvalidStreamer(streamer));
        }

        let streamer = trimmed.to_string();
        Ok(Self {
            platform,
            stream_url: platform.stream_url(&streamer),
            streamer,
        })
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn streamer(&self) -> &str {
        &self.streamer
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_derives_url() {
        let target = CaptureTarget::new(Platform::Kick, "alice").unwrap();
        assert_eq!(target.streamer(), "alice");
        assert_eq!(target.stream_url(), "https://www.kick.com/alice");
        assert_eq!(target.platform(), Platform::Kick);
    }

    #[test]
    fn test_new_trims_whitespace() {
        let target = CaptureTarget::new(Platform::Twitch, "  alice\n").unwrap();
        assert_eq!(target.streamer(), "alice");
    }

    #[test]
    fn test_rejects_path_like_identifiers() {
        for bad in ["", "../x", "a/b", "a b", "C:evil", "$(rm -rf)", "x;y|z"] {
            let result = CaptureTarget::new(Platform::Twitch, bad);
            assert!(
                matches!(result, Err(Error::InvalidStreamer(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
