//! Single-streamer capture supervisor.
//!
//! Runs an external capture tool against one live stream in an endless
//! cycle, choosing between external and local storage, refreshing
//! credentials on a schedule and pacing retries.

pub mod capture;
pub mod config;
pub mod credentials;
pub mod domain;
pub mod error;
pub mod logging;
pub mod panic_hook;
pub mod storage;
pub mod supervisor;
pub mod utils;

pub use error::{Error, Result};
