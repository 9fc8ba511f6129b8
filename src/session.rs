//! Keepalive session lifecycle
//!
//! This module owns browser launch and shutdown and wires the page to
//! the scheduler stack: the page probe, the activity watcher, the
//! settings store, and (per settings) the socket monitor.

use crate::error::{Error, Result, SessionError};
use crate::host::{install_page_probe, ActivityWatcher, CdpHost, LocalStorageBackend};
use crate::monitor::SocketMonitor;
use crate::scheduler::{ActivityScheduler, SchedulerStatus, STARTUP_DELAY};
use crate::settings::{Settings, SettingsPatch, SettingsStore};
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Configuration for a keepalive session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Target page URL
    pub url: String,
    /// Run in headless mode (default: false; a keepalive session is
    /// usually a visible one)
    pub headless: bool,
    /// Browser window width (default: 1280)
    pub width: u32,
    /// Browser window height (default: 800)
    pub height: u32,
    /// Enable sandbox (default: true)
    pub sandbox: bool,
    /// Path to Chrome/Chromium executable (None = auto-detect)
    pub chrome_path: Option<String>,
    /// Delay between page load and scheduler start, letting any login
    /// redirect settle
    pub startup_delay: Duration,
    /// Initial settings overrides applied on top of the stored record
    pub settings_patch: SettingsPatch,
    /// Additional Chrome arguments
    pub extra_args: Vec<String>,
}

impl SessionConfig {
    /// Create a config for the given target URL with defaults.
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            headless: false,
            width: 1280,
            height: 800,
            sandbox: true,
            chrome_path: None,
            startup_delay: STARTUP_DELAY,
            settings_patch: SettingsPatch::default(),
            extra_args: Vec::new(),
        }
    }

    /// Create a config builder for the given target URL.
    pub fn builder<S: Into<String>>(url: S) -> SessionConfigBuilder {
        SessionConfigBuilder {
            config: Self::new(url),
        }
    }
}

/// Builder for [`SessionConfig`]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Set headless mode
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    /// Set viewport dimensions
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.width = width;
        self.config.height = height;
        self
    }

    /// Enable/disable sandbox
    pub fn sandbox(mut self, sandbox: bool) -> Self {
        self.config.sandbox = sandbox;
        self
    }

    /// Set Chrome path
    pub fn chrome_path<S: Into<String>>(mut self, path: S) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    /// Set the startup delay
    pub fn startup_delay(mut self, delay: Duration) -> Self {
        self.config.startup_delay = delay;
        self
    }

    /// Set initial settings overrides
    pub fn settings_patch(mut self, patch: SettingsPatch) -> Self {
        self.config.settings_patch = patch;
        self
    }

    /// Add extra Chrome argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.config.extra_args.push(arg.into());
        self
    }

    /// Build the config
    pub fn build(self) -> SessionConfig {
        self.config
    }
}

/// A running keepalive session: one browser, one page, one scheduler.
pub struct KeepaliveSession {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    scheduler: ActivityScheduler<CdpHost, LocalStorageBackend>,
    watcher_task: JoinHandle<()>,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
}

impl KeepaliveSession {
    /// Launch the browser, open the target page, and start the
    /// scheduler stack against it.
    #[instrument(skip(config), fields(url = %config.url))]
    pub async fn launch(config: SessionConfig) -> Result<Self> {
        let url = Url::parse(&config.url)
            .map_err(|e| SessionError::InvalidUrl(format!("{}: {e}", config.url)))?;

        info!("launching keepalive session for {url}");

        let mut builder = CdpBrowserConfig::builder();

        builder = builder.viewport(chromiumoxide::handler::viewport::Viewport {
            width: config.width,
            height: config.height,
            device_scale_factor: None,
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        });

        if !config.headless {
            builder = builder.with_head();
        }

        if !config.sandbox {
            builder = builder.arg("--no-sandbox");
        }

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        for arg in &config.extra_args {
            builder = builder.arg(arg);
        }

        let cdp_config = builder
            .build()
            .map_err(|e| SessionError::ConfigError(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| SessionError::LaunchFailed(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    warn!("browser handler event error");
                    break;
                }
            }
            debug!("browser handler finished");
        });

        let page = browser
            .new_page(url.as_str())
            .await
            .map_err(|e| Error::Session(SessionError::PageCreationFailed(e.to_string())))?;

        page.wait_for_navigation()
            .await
            .map_err(|e| Error::Session(SessionError::NavigationFailed(e.to_string())))?;

        install_page_probe(&page).await?;

        // Let any login redirect settle before the first watcher reads
        // the page.
        debug!(
            delay_secs = config.startup_delay.as_secs(),
            "waiting out the startup delay"
        );
        tokio::time::sleep(config.startup_delay).await;

        let store = SettingsStore::new(LocalStorageBackend::new(page.clone()));
        let stored = store.load().await;
        let settings = stored.merged(&config.settings_patch);
        if settings != stored {
            store.save(&settings).await;
        }

        let scheduler = ActivityScheduler::new(
            Arc::new(CdpHost::new(page.clone())),
            store,
            settings.clone(),
        );
        scheduler.start();

        let watcher = ActivityWatcher::new(page.clone(), scheduler.handle());
        let watcher_task = tokio::spawn(watcher.run());

        let session = Self {
            browser,
            handler: handler_task,
            page,
            scheduler,
            watcher_task,
            monitor_task: Mutex::new(None),
        };

        if settings.socket_monitor_enabled {
            session.spawn_monitor();
        }

        info!(profile = %settings.safety_profile, "keepalive session running");
        Ok(session)
    }

    /// The page being kept alive.
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Current scheduler status for the settings UI.
    pub fn status(&self) -> SchedulerStatus {
        self.scheduler.status()
    }

    /// Merge a partial settings update, persist it, restart the tick
    /// timer, and start or stop the socket monitor as the record now
    /// requires.
    #[instrument(skip(self, patch))]
    pub async fn update_settings(&self, patch: &SettingsPatch) -> Settings {
        let merged = self.scheduler.update_settings(patch).await;

        let mut monitor = self.monitor_task.lock();
        if merged.socket_monitor_enabled && monitor.is_none() {
            drop(monitor);
            self.spawn_monitor();
        } else if !merged.socket_monitor_enabled {
            if let Some(task) = monitor.take() {
                task.abort();
                debug!("socket monitor stopped by settings");
            }
        }

        merged
    }

    fn spawn_monitor(&self) {
        let monitor = SocketMonitor::new(self.page.clone(), self.scheduler.handle());
        *self.monitor_task.lock() = Some(tokio::spawn(monitor.run()));
        debug!("socket monitor started");
    }

    /// Stop the scheduler and close the browser.
    #[instrument(skip(self))]
    pub async fn close(mut self) -> Result<()> {
        info!("closing keepalive session");

        self.scheduler.stop();
        self.scheduler.join().await;
        self.watcher_task.abort();
        if let Some(task) = self.monitor_task.lock().take() {
            task.abort();
        }

        self.browser
            .close()
            .await
            .map_err(|e| Error::cdp(e.to_string()))?;

        let _ = tokio::time::timeout(Duration::from_secs(5), self.handler).await;

        info!("keepalive session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SafetyProfile;

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::new("https://chat.example.com");
        assert!(!config.headless);
        assert_eq!(config.width, 1280);
        assert_eq!(config.height, 800);
        assert!(config.sandbox);
        assert_eq!(config.startup_delay, STARTUP_DELAY);
        assert!(config.settings_patch.is_empty());
        assert!(config.extra_args.is_empty());
    }

    #[test]
    fn test_session_config_builder() {
        let config = SessionConfig::builder("https://chat.example.com")
            .headless(true)
            .viewport(1920, 1080)
            .sandbox(false)
            .chrome_path("/usr/bin/chromium")
            .startup_delay(Duration::from_secs(1))
            .settings_patch(SettingsPatch {
                safety_profile: Some(SafetyProfile::Medium),
                ..SettingsPatch::default()
            })
            .arg("--disable-gpu")
            .build();

        assert!(config.headless);
        assert_eq!(config.width, 1920);
        assert_eq!(config.height, 1080);
        assert!(!config.sandbox);
        assert_eq!(config.chrome_path, Some("/usr/bin/chromium".to_string()));
        assert_eq!(config.startup_delay, Duration::from_secs(1));
        assert_eq!(
            config.settings_patch.safety_profile,
            Some(SafetyProfile::Medium)
        );
        assert_eq!(config.extra_args, vec!["--disable-gpu"]);
    }
}
