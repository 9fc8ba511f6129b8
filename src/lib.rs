//! SessionPulse - CDP-Driven Web Session Keepalive
//!
//! This crate keeps a web session alive by simulating low-level user
//! activity (scroll nudges, synthetic pointer/focus events, storage
//! pulses) on a safety-profile schedule, driven over the Chrome DevTools
//! Protocol.
//!
//! # Features
//!
//! - **Activity Scheduler**: recurring timer that decides, from idle
//!   time, page visibility, and the active safety profile, whether to
//!   emit one synthetic activity and which kind
//! - **Settings Store**: safety profile and feature toggles persisted
//!   to the page's own storage, with defaults-on-malformed semantics
//! - **Socket Monitor**: reloads the page when its session WebSocket
//!   closes abnormally and does not reconnect
//!
//! # Architecture
//!
//! ```text
//! KeepaliveSession ──▶ Browser (CDP) ──▶ Page
//!        │                                │
//!        ▼                                ▼
//! ActivityScheduler ◀── ActivityWatcher (input/visibility)
//!        │        ◀── SocketMonitor (abnormal close → reload)
//!        ▼
//!   idle policy ──▶ select_action ──▶ HostPage (scroll/pointer/focus/storage)
//! ```
//!
//! The decision layer ([`scheduler::policy`]) is pure and DOM-free; the
//! page is reached only through the [`host::HostPage`] seam, so the
//! whole policy is testable without a browser.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use sessionpulse::session::{KeepaliveSession, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::builder("https://chat.example.com")
//!         .headless(false)
//!         .build();
//!
//!     let session = KeepaliveSession::launch(config).await?;
//!     tokio::signal::ctrl_c().await?;
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod host;
pub mod monitor;
pub mod scheduler;
pub mod session;
pub mod settings;

// Re-exports for convenience
pub use error::{Error, Result};
pub use scheduler::{ActivityScheduler, SchedulerHandle, SchedulerStatus};
pub use session::{KeepaliveSession, SessionConfig};
pub use settings::{SafetyProfile, Settings, SettingsPatch, SettingsStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
