//! CDP-backed host page
//!
//! Implements the [`HostPage`] capabilities over a chromiumoxide [`Page`]
//! with small `page.evaluate` scripts, plus the two page-side
//! collaborators the scheduler stack needs: `localStorage`-backed
//! settings persistence and the activity watcher that forwards real
//! input and visibility changes into the scheduler.
//!
//! Everything here is deliberately shallow: one script per capability,
//! no assumptions about the page's markup beyond the standard DOM.

use crate::error::{ActionError, Error, Result, StorageError};
use crate::host::HostPage;
use crate::scheduler::SchedulerHandle;
use crate::settings::{SettingsBackend, SETTINGS_KEY};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use rand::Rng;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, trace};

/// Throwaway key used by the storage pulse.
const PULSE_KEY: &str = "__sessionpulse_pulse";

/// How long the scroll nudge holds the perturbed position before
/// restoring the original one.
const SCROLL_RESTORE_DELAY: Duration = Duration::from_millis(150);

/// Page-side state object installed by [`install_page_probe`].
const PROBE_GLOBAL: &str = "window.__sessionpulse";

/// Perturb the scroll position and return the original one. The offset
/// is sub-pixel so layout-anchored UI never visibly moves; half a pixel
/// still registers as scroll activity.
const SCROLL_PERTURB_SCRIPT: &str = "(() => { \
    const sc = document.scrollingElement || document.documentElement; \
    const prev = sc.scrollTop; \
    sc.scrollTop = prev > 0 ? prev - 0.5 : prev + 0.5; \
    return prev; \
})()";

/// Script installed on every new document. Tracks the timestamp of the
/// last real input (pointer press, pointer move, key press, scroll,
/// touch start), mirrors page visibility, and wraps `WebSocket` so the
/// socket monitor can see open-socket counts and close codes.
const PROBE_SCRIPT: &str = r#"
    (() => {
        if (window.__sessionpulse) {
            return;
        }
        const sp = {
            lastInput: 0,
            visible: !document.hidden,
            openSockets: 0,
            lastCloseCode: null,
        };
        window.__sessionpulse = sp;

        const markInput = () => { sp.lastInput = Date.now(); };
        for (const kind of ['mousedown', 'mousemove', 'keydown', 'scroll', 'touchstart']) {
            window.addEventListener(kind, markInput, { capture: true, passive: true });
        }

        document.addEventListener('visibilitychange', () => {
            sp.visible = !document.hidden;
        });

        const NativeWebSocket = window.WebSocket;
        const WrappedWebSocket = function (...args) {
            const socket = new NativeWebSocket(...args);
            sp.openSockets += 1;
            socket.addEventListener('close', (event) => {
                sp.openSockets -= 1;
                sp.lastCloseCode = event.code;
            });
            return socket;
        };
        WrappedWebSocket.prototype = NativeWebSocket.prototype;
        for (const prop of ['CONNECTING', 'OPEN', 'CLOSING', 'CLOSED']) {
            WrappedWebSocket[prop] = NativeWebSocket[prop];
        }
        window.WebSocket = WrappedWebSocket;
    })()
"#;

/// Install the page probe on the current document and every future one.
///
/// Must run before the scheduler starts so real input is never missed
/// across a reload.
#[instrument(skip(page))]
pub async fn install_page_probe(page: &Page) -> Result<()> {
    let params = AddScriptToEvaluateOnNewDocumentParams::builder()
        .source(PROBE_SCRIPT)
        .build()
        .map_err(Error::cdp)?;
    page.execute(params).await.map_err(|e| Error::cdp(e.to_string()))?;

    // New-document scripts only apply from the next navigation on; the
    // current document needs a direct evaluation.
    page.evaluate(PROBE_SCRIPT)
        .await
        .map_err(|e| Error::cdp(e.to_string()))?;

    debug!("page probe installed");
    Ok(())
}

/// [`HostPage`] over a live CDP page.
#[derive(Clone)]
pub struct CdpHost {
    page: Page,
}

impl CdpHost {
    /// Wrap a page. The probe does not need to be installed for the
    /// synthetic actions to work.
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn eval(&self, script: &str) -> std::result::Result<(), ActionError> {
        self.page
            .evaluate(script)
            .await
            .map(|_| ())
            .map_err(|e| ActionError::Script(e.to_string()))
    }
}

impl HostPage for CdpHost {
    async fn scroll_nudge(&self) -> std::result::Result<(), ActionError> {
        // Nudge away from the current position; down at the top, up
        // anywhere else.
        let original: f64 = self
            .page
            .evaluate(SCROLL_PERTURB_SCRIPT)
            .await
            .map_err(|e| ActionError::Script(e.to_string()))?
            .into_value()
            .map_err(|e| ActionError::Script(e.to_string()))?;

        tokio::time::sleep(SCROLL_RESTORE_DELAY).await;

        self.eval(&format!(
            "(document.scrollingElement || document.documentElement).scrollTop = {original}"
        ))
        .await
    }

    async fn pointer_move(&self) -> std::result::Result<(), ActionError> {
        let (x, y) = {
            let mut rng = rand::rng();
            (rng.random_range(50..500), rng.random_range(50..500))
        };
        self.page
            .evaluate(format!(
                "document.dispatchEvent(new MouseEvent('mousemove', {{ \
                    bubbles: true, cancelable: true, view: window, \
                    clientX: {x}, clientY: {y} \
                }}))"
            ))
            .await
            .map(|_| ())
            .map_err(|e| ActionError::Dispatch(e.to_string()))
    }

    async fn focus_pulse(&self) -> std::result::Result<(), ActionError> {
        self.page
            .evaluate(
                "(() => { \
                    window.dispatchEvent(new Event('focus')); \
                    document.dispatchEvent(new Event('focusin')); \
                })()",
            )
            .await
            .map(|_| ())
            .map_err(|e| ActionError::Dispatch(e.to_string()))
    }

    async fn storage_pulse(&self) -> std::result::Result<(), ActionError> {
        self.page
            .evaluate(format!(
                "(() => {{ \
                    localStorage.setItem('{PULSE_KEY}', String(Date.now())); \
                    localStorage.removeItem('{PULSE_KEY}'); \
                }})()"
            ))
            .await
            .map(|_| ())
            .map_err(|e| ActionError::StorageUnavailable(e.to_string()))
    }
}

/// [`SettingsBackend`] over the page's `localStorage`.
#[derive(Clone)]
pub struct LocalStorageBackend {
    page: Page,
}

impl LocalStorageBackend {
    /// Wrap a page.
    pub fn new(page: Page) -> Self {
        Self { page }
    }
}

impl SettingsBackend for LocalStorageBackend {
    async fn read(&self) -> std::result::Result<Option<String>, StorageError> {
        self.page
            .evaluate(format!("localStorage.getItem('{SETTINGS_KEY}')"))
            .await
            .map_err(|e| StorageError::ReadFailed(e.to_string()))?
            .into_value()
            .map_err(|e| StorageError::ReadFailed(e.to_string()))
    }

    async fn write(&self, raw: &str) -> std::result::Result<(), StorageError> {
        // JSON-encode the raw record so it lands as a valid JS string
        // literal regardless of its quoting.
        let literal = serde_json::Value::String(raw.to_string()).to_string();
        self.page
            .evaluate(format!("localStorage.setItem('{SETTINGS_KEY}', {literal})"))
            .await
            .map(|_| ())
            .map_err(|e| StorageError::WriteFailed(e.to_string()))
    }
}

/// Snapshot of the page probe, read once per poll.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProbeSnapshot {
    last_input: f64,
    visible: bool,
}

/// Bridges real-input and visibility events from the page into the
/// scheduler.
///
/// CDP cannot push DOM events across the wire without page bindings, so
/// the watcher polls the installed probe once a second and forwards
/// changes through the [`SchedulerHandle`]. A poll failure (navigation
/// in flight, page gone) is skipped; the next poll resynchronizes.
pub struct ActivityWatcher {
    page: Page,
    handle: SchedulerHandle,
}

impl ActivityWatcher {
    /// Poll cadence for the page probe.
    pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Create a watcher over an installed probe.
    pub fn new(page: Page, handle: SchedulerHandle) -> Self {
        Self { page, handle }
    }

    /// Run the poll loop until the page goes away. Spawn this on its
    /// own task; it never returns errors.
    #[instrument(skip(self))]
    pub async fn run(self) {
        let mut previous: Option<ProbeSnapshot> = None;
        loop {
            tokio::time::sleep(Self::POLL_INTERVAL).await;
            let snapshot = match self.poll().await {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => {
                    trace!("probe absent, page still loading");
                    continue;
                }
                Err(err) => {
                    trace!("probe poll failed, will retry: {err}");
                    continue;
                }
            };

            let (input, visibility) = Self::diff(previous, snapshot);
            if input {
                self.handle.real_input();
            }
            if let Some(visible) = visibility {
                self.handle.visibility_changed(visible);
            }
            previous = Some(snapshot);
        }
    }

    /// What to forward for a new snapshot against the previous one.
    ///
    /// The first snapshot always forwards its visibility: the scheduler
    /// assumes a visible page until told otherwise, and the page may
    /// already be hidden by the time the watcher attaches.
    fn diff(previous: Option<ProbeSnapshot>, next: ProbeSnapshot) -> (bool, Option<bool>) {
        match previous {
            None => (false, Some(next.visible)),
            Some(prev) => (
                next.last_input > prev.last_input,
                (next.visible != prev.visible).then_some(next.visible),
            ),
        }
    }

    async fn poll(&self) -> Result<Option<ProbeSnapshot>> {
        let result = self
            .page
            .evaluate(format!(
                "{PROBE_GLOBAL} ? \
                    {{ lastInput: {PROBE_GLOBAL}.lastInput, visible: {PROBE_GLOBAL}.visible }} \
                    : null"
            ))
            .await
            .map_err(|e| Error::cdp(e.to_string()))?;
        result.into_value().map_err(|e| Error::cdp(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_snapshot_deserializes_page_shape() {
        let snapshot: ProbeSnapshot =
            serde_json::from_str(r#"{"lastInput": 1700000000000, "visible": false}"#).unwrap();
        assert_eq!(snapshot.last_input, 1_700_000_000_000.0);
        assert!(!snapshot.visible);
    }

    #[test]
    fn test_scroll_perturbation_is_sub_pixel() {
        // A whole-pixel offset would visibly shift layout-anchored UI.
        assert!(SCROLL_PERTURB_SCRIPT.contains("prev - 0.5"));
        assert!(SCROLL_PERTURB_SCRIPT.contains("prev + 0.5"));
        assert!(SCROLL_PERTURB_SCRIPT.contains("return prev"));
    }

    #[test]
    fn test_probe_script_guards_reinstall() {
        // The probe must be installable both as a new-document script and
        // as a direct evaluation on the current document without stacking
        // listeners.
        assert!(PROBE_SCRIPT.contains("if (window.__sessionpulse)"));
    }

    fn snapshot(last_input: f64, visible: bool) -> ProbeSnapshot {
        ProbeSnapshot { last_input, visible }
    }

    #[test]
    fn test_first_snapshot_seeds_visibility() {
        // A page hidden before the watcher attaches must be reported,
        // not silently treated as visible until the next change.
        assert_eq!(
            ActivityWatcher::diff(None, snapshot(0.0, false)),
            (false, Some(false))
        );
        assert_eq!(
            ActivityWatcher::diff(None, snapshot(0.0, true)),
            (false, Some(true))
        );
    }

    #[test]
    fn test_unchanged_snapshot_forwards_nothing() {
        let prev = snapshot(100.0, true);
        assert_eq!(ActivityWatcher::diff(Some(prev), prev), (false, None));
    }

    #[test]
    fn test_diff_reports_input_and_visibility_changes() {
        let prev = snapshot(100.0, true);
        assert_eq!(
            ActivityWatcher::diff(Some(prev), snapshot(250.0, false)),
            (true, Some(false))
        );
    }

    #[test]
    fn test_settings_literal_is_json_escaped() {
        let raw = r#"{"safety_profile":"low"}"#;
        let literal = serde_json::Value::String(raw.to_string()).to_string();
        assert_eq!(literal, r#""{\"safety_profile\":\"low\"}""#);
    }
}
