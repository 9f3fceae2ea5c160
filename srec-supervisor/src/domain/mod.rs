//! Core value types shared by the supervisor components.

mod outcome;
mod platform;
mod target;

pub use outcome::{AttemptOutcome, FailureClass};
pub use platform::Platform;
pub use target::CaptureTarget;
