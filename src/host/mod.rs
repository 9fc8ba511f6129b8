//! Host page abstraction
//!
//! The scheduler needs very little from the page it keeps alive: perturb
//! and restore the scroll position, dispatch a couple of synthetic DOM
//! events, and touch one throwaway storage key. [`HostPage`] captures
//! exactly that surface so the scheduler can be driven against a real
//! CDP page in production and a recorder in tests.

use crate::error::ActionError;
use crate::scheduler::policy::ActionKind;
use std::future::Future;
use tracing::debug;

pub mod cdp;

pub use cdp::{install_page_probe, ActivityWatcher, CdpHost, LocalStorageBackend};

/// Capabilities the scheduler requires from the page it keeps alive.
///
/// Implementations must confine each method's side effects to the single
/// action it names; the scheduler relies on that when it swallows a
/// failed action and carries on.
pub trait HostPage: Send + Sync + 'static {
    /// Scroll by a minimal offset and restore the original position
    /// shortly after.
    fn scroll_nudge(&self) -> impl Future<Output = Result<(), ActionError>> + Send;

    /// Dispatch a synthetic pointer-move event.
    fn pointer_move(&self) -> impl Future<Output = Result<(), ActionError>> + Send;

    /// Dispatch a synthetic focus event.
    fn focus_pulse(&self) -> impl Future<Output = Result<(), ActionError>> + Send;

    /// Write and immediately remove a throwaway storage key.
    fn storage_pulse(&self) -> impl Future<Output = Result<(), ActionError>> + Send;
}

/// Perform one synthetic action against the host page.
///
/// A failed storage pulse falls back to the scroll nudge (the most
/// quiet alternative when page storage is unavailable); every other
/// failure is returned to the caller, which swallows it.
pub async fn perform_action<H: HostPage>(host: &H, action: ActionKind) -> Result<(), ActionError> {
    match action {
        ActionKind::StoragePulse => match host.storage_pulse().await {
            Ok(()) => Ok(()),
            Err(err) => {
                debug!("storage pulse failed ({err}), falling back to scroll nudge");
                host.scroll_nudge().await
            }
        },
        ActionKind::ScrollNudge => host.scroll_nudge().await,
        ActionKind::PointerMove => host.pointer_move().await,
        ActionKind::FocusPulse => host.focus_pulse().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records performed actions; optionally fails the storage pulse.
    #[derive(Default)]
    struct RecordingPage {
        performed: Mutex<Vec<ActionKind>>,
        storage_broken: bool,
    }

    impl HostPage for RecordingPage {
        async fn scroll_nudge(&self) -> Result<(), ActionError> {
            self.performed.lock().push(ActionKind::ScrollNudge);
            Ok(())
        }

        async fn pointer_move(&self) -> Result<(), ActionError> {
            self.performed.lock().push(ActionKind::PointerMove);
            Ok(())
        }

        async fn focus_pulse(&self) -> Result<(), ActionError> {
            self.performed.lock().push(ActionKind::FocusPulse);
            Ok(())
        }

        async fn storage_pulse(&self) -> Result<(), ActionError> {
            if self.storage_broken {
                return Err(ActionError::StorageUnavailable("disabled".to_string()));
            }
            self.performed.lock().push(ActionKind::StoragePulse);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_perform_action_routes_to_matching_method() {
        let page = RecordingPage::default();
        for action in [
            ActionKind::StoragePulse,
            ActionKind::ScrollNudge,
            ActionKind::PointerMove,
            ActionKind::FocusPulse,
        ] {
            perform_action(&page, action).await.unwrap();
        }
        assert_eq!(
            *page.performed.lock(),
            vec![
                ActionKind::StoragePulse,
                ActionKind::ScrollNudge,
                ActionKind::PointerMove,
                ActionKind::FocusPulse,
            ]
        );
    }

    #[test]
    fn test_module_surface_exports_probe_installer() {
        // The session layer reaches the installer through this module,
        // not through `host::cdp` directly.
        let _ = crate::host::install_page_probe;
    }

    #[tokio::test]
    async fn test_storage_pulse_falls_back_to_scroll() {
        let page = RecordingPage {
            storage_broken: true,
            ..RecordingPage::default()
        };
        perform_action(&page, ActionKind::StoragePulse).await.unwrap();
        assert_eq!(*page.performed.lock(), vec![ActionKind::ScrollNudge]);
    }
}
