//! Error types for SessionPulse
//!
//! This module provides the error type hierarchy using `thiserror`
//! for proper error handling across all components.
//!
//! Scheduler-path failures (synthetic actions, settings storage) are
//! recovered locally and never reach these types from the tick loop;
//! the hierarchy exists for the session layer, where browser launch
//! and navigation failures are real errors the caller must see.

use thiserror::Error;

/// The main error type for SessionPulse operations
#[derive(Error, Debug)]
pub enum Error {
    /// Browser session lifecycle errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Scheduler control errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Synthetic action errors
    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    /// Settings storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// ChromiumOxide errors
    #[error("CDP error: {0}")]
    Cdp(String),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

/// Browser session lifecycle and control errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Failed to launch browser
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    /// Session configuration error
    #[error("Invalid session configuration: {0}")]
    ConfigError(String),

    /// Invalid target URL
    #[error("Invalid target URL: {0}")]
    InvalidUrl(String),

    /// Failed to create the page/tab
    #[error("Failed to create page: {0}")]
    PageCreationFailed(String),

    /// Navigation to the target page failed
    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    /// Session already closed
    #[error("Session already closed")]
    AlreadyClosed,

    /// Timeout waiting for the page
    #[error("Session operation timed out after {0}ms")]
    Timeout(u64),
}

/// Scheduler control errors
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The scheduler event channel is closed (scheduler stopped)
    #[error("Scheduler is not running")]
    NotRunning,

    /// The run loop was started twice
    #[error("Scheduler already started")]
    AlreadyStarted,
}

/// Synthetic action errors
///
/// Always caught and swallowed by the tick loop; surfaced only through
/// debug logging so a failing action can be diagnosed without ever
/// interrupting the host page.
#[derive(Error, Debug)]
pub enum ActionError {
    /// Script evaluation in the page failed
    #[error("Script evaluation failed: {0}")]
    Script(String),

    /// Synthetic event dispatch failed
    #[error("Event dispatch failed: {0}")]
    Dispatch(String),

    /// Page storage is unavailable for the storage pulse
    #[error("Page storage unavailable: {0}")]
    StorageUnavailable(String),
}

/// Settings storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backing store read failed
    #[error("Storage read failed: {0}")]
    ReadFailed(String),

    /// Backing store write failed
    #[error("Storage write failed: {0}")]
    WriteFailed(String),

    /// Settings record could not be serialized
    #[error("Settings serialization failed: {0}")]
    Serialize(String),
}

/// Result type alias for SessionPulse operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a generic error from a string
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Error::Generic(msg.into())
    }

    /// Create a CDP error from a string
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }
}

/// Convert chromiumoxide errors
impl From<chromiumoxide::error::CdpError> for Error {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Error::Cdp(err.to_string())
    }
}
