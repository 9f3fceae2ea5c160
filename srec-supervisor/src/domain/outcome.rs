//! Result of a single capture attempt.

/// What happened when the capture tool ran against one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The tool exited with status 0 (stream ended normally).
    Success,
    /// The tool exited nonzero, was killed by a signal, or could not be spawned.
    ToolFailure {
        /// Exit code, `None` when killed by a signal or never started.
        exit_code: Option<i32>,
        /// Captured stderr tail or spawn error text.
        diagnostic: String,
    },
    /// The attempt was cut short by process shutdown.
    Interrupted,
}

impl AttemptOutcome {
    pub fn failure(exit_code: Option<i32>, diagnostic: impl Into<String>) -> Self {
        Self::ToolFailure {
            exit_code,
            diagnostic: diagnostic.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Classify a failure from its diagnostic text.
    ///
    /// Returns `None` for anything that is not a tool failure.
    pub fn failure_class(&self) -> Option<FailureClass> {
        match self {
            Self::ToolFailure { diagnostic, .. } => Some(FailureClass::from_diagnostic(diagnostic)),
            _ => None,
        }
    }
}

/// Coarse cause of a tool failure, derived from its stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Destination filesystem is full.
    NoSpace,
    /// Destination is not writable.
    PermissionDenied,
    /// Device-level IO failure (e.g. an unplugged drive).
    IoFailure,
    /// Offline stream, network error, unknown.
    Other,
}

impl FailureClass {
    pub fn from_diagnostic(text: &str) -> Self {
        if text.contains("No space left on device") {
            Self::NoSpace
        } else if text.contains("Permission denied") {
            Self::PermissionDenied
        } else if text.contains("Input/output error") {
            Self::IoFailure
        } else {
            Self::Other
        }
    }

    /// Whether the failure points at the destination storage rather than the stream.
    pub fn is_storage(&self) -> bool {
        !matches!(self, Self::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoSpace => "no space left",
            Self::PermissionDenied => "permission denied",
            Self::IoFailure => "input/output error",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
