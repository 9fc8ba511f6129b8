//! Socket monitor
//!
//! The messaging page holds its session on a WebSocket; when that socket
//! closes abnormally the page quietly goes stale. The monitor listens
//! for CDP WebSocket-close events, gives the page a short grace period
//! to reconnect on its own, and reloads it when no socket came back.
//!
//! Requires the page probe from [`crate::host::cdp::install_page_probe`]
//! for the open-socket count and close code; without it every close is
//! treated as recovered and nothing is reloaded.

use crate::error::{Error, Result};
use crate::scheduler::SchedulerHandle;
use chromiumoxide::cdp::browser_protocol::network::{EnableParams, EventWebSocketClosed};
use chromiumoxide::Page;
use futures::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Normal-closure WebSocket close code.
const NORMAL_CLOSE_CODE: i64 = 1000;

/// Socket state as reported by the page probe.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SocketProbe {
    open_sockets: i64,
    last_close_code: Option<i64>,
}

/// Watches for abnormal WebSocket closures and reloads the page when
/// the session does not reconnect by itself.
pub struct SocketMonitor {
    page: Page,
    handle: SchedulerHandle,
}

impl SocketMonitor {
    /// How long a closed socket gets to reconnect before the page is
    /// reloaded.
    pub const RECONNECT_GRACE: Duration = Duration::from_secs(3);

    /// Create a monitor for the given page.
    pub fn new(page: Page, handle: SchedulerHandle) -> Self {
        Self { page, handle }
    }

    /// Run the monitor until the page goes away. Spawn this on its own
    /// task.
    #[instrument(skip(self))]
    pub async fn run(self) {
        if let Err(err) = self.watch().await {
            warn!("socket monitor stopped: {err}");
        }
    }

    async fn watch(&self) -> Result<()> {
        self.page
            .execute(EnableParams::default())
            .await
            .map_err(|e| Error::cdp(e.to_string()))?;

        let mut closed = self
            .page
            .event_listener::<EventWebSocketClosed>()
            .await
            .map_err(|e| Error::cdp(e.to_string()))?;

        info!("socket monitor attached");

        while let Some(_event) = closed.next().await {
            debug!("websocket closed, waiting out the reconnect grace");
            tokio::time::sleep(Self::RECONNECT_GRACE).await;

            match self.probe().await {
                Ok(Some(probe)) if Self::needs_reload(&probe) => {
                    info!(
                        close_code = ?probe.last_close_code,
                        "session socket lost, reloading page"
                    );
                    self.reload().await;
                }
                Ok(Some(probe)) => {
                    debug!(
                        open_sockets = probe.open_sockets,
                        "socket recovered on its own"
                    );
                }
                Ok(None) => debug!("page probe absent, skipping reload decision"),
                Err(err) => debug!("socket probe failed, skipping reload decision: {err}"),
            }
        }

        Ok(())
    }

    /// A reload is warranted when no socket reopened within the grace
    /// period and the last closure was not a clean one.
    fn needs_reload(probe: &SocketProbe) -> bool {
        probe.open_sockets <= 0 && probe.last_close_code != Some(NORMAL_CLOSE_CODE)
    }

    async fn probe(&self) -> Result<Option<SocketProbe>> {
        let result = self
            .page
            .evaluate(
                "window.__sessionpulse ? \
                    { openSockets: window.__sessionpulse.openSockets, \
                      lastCloseCode: window.__sessionpulse.lastCloseCode } \
                    : null",
            )
            .await
            .map_err(|e| Error::cdp(e.to_string()))?;
        result.into_value().map_err(|e| Error::cdp(e.to_string()))
    }

    async fn reload(&self) {
        if let Err(err) = self.page.reload().await {
            warn!("page reload failed: {err}");
            return;
        }
        // Fresh page, fresh session: reset the idle clock so the
        // scheduler does not immediately act on the reloaded page.
        self.handle.real_input();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_reload_on_abnormal_close() {
        let probe = SocketProbe {
            open_sockets: 0,
            last_close_code: Some(1006),
        };
        assert!(SocketMonitor::needs_reload(&probe));
    }

    #[test]
    fn test_no_reload_on_clean_close() {
        let probe = SocketProbe {
            open_sockets: 0,
            last_close_code: Some(NORMAL_CLOSE_CODE),
        };
        assert!(!SocketMonitor::needs_reload(&probe));
    }

    #[test]
    fn test_no_reload_when_socket_reconnected() {
        let probe = SocketProbe {
            open_sockets: 1,
            last_close_code: Some(1006),
        };
        assert!(!SocketMonitor::needs_reload(&probe));
    }

    #[test]
    fn test_probe_deserializes_page_shape() {
        let probe: SocketProbe =
            serde_json::from_str(r#"{"openSockets": 0, "lastCloseCode": null}"#).unwrap();
        assert_eq!(probe.open_sockets, 0);
        assert_eq!(probe.last_close_code, None);
    }
}
