//! Supported streaming platforms and their fixed conventions.

use serde::{Deserialize, Serialize};

/// Streaming platform a supervisor instance captures from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Captured with streamlink; authenticates with an OAuth token header.
    #[default]
    Twitch,
    /// Captured with yt-dlp; authenticates with a cookie jar fetched by curl.
    Kick,
}

impl Platform {
    /// Parse a platform name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "twitch" => Some(Self::Twitch),
            "kick" => Some(Self::Kick),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Twitch => "twitch",
            Self::Kick => "kick",
        }
    }

    /// Public page of a streamer, handed to the capture tool.
    pub fn stream_url(&self, streamer: &str) -> String {
        match self {
            Self::Twitch => format!("https://www.twitch.tv/{streamer}"),
            Self::Kick => format!("https://www.kick.com/{streamer}"),
        }
    }

    /// Seconds between cycles when the config does not say otherwise.
    pub fn default_retry_secs(&self) -> u64 {
        match self {
            Self::Twitch => 30,
            Self::Kick => 120,
        }
    }

    /// Directory under the base directory used as local fallback storage.
    pub fn fallback_subdir(&self) -> &'static str {
        self.as_str()
    }

    /// Whether captures depend on a periodically refreshed cookie jar.
    pub fn uses_cookie_jar(&self) -> bool {
        matches!(self, Self::Kick)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
