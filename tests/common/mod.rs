//! Shared test fixtures: a recording host page and scheduler builders.

use parking_lot::Mutex;
use sessionpulse::error::ActionError;
use sessionpulse::host::HostPage;
use sessionpulse::scheduler::{ActionKind, ActivityScheduler};
use sessionpulse::settings::{MemoryBackend, Settings, SettingsStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Host page that records every performed action instead of touching a
/// browser.
#[derive(Default)]
pub struct RecorderPage {
    actions: Mutex<Vec<ActionKind>>,
    storage_broken: AtomicBool,
}

impl RecorderPage {
    pub fn actions(&self) -> Vec<ActionKind> {
        self.actions.lock().clone()
    }

    #[allow(dead_code)]
    pub fn break_storage(&self) {
        self.storage_broken.store(true, Ordering::SeqCst);
    }

    fn record(&self, action: ActionKind) {
        self.actions.lock().push(action);
    }
}

impl HostPage for RecorderPage {
    async fn scroll_nudge(&self) -> Result<(), ActionError> {
        self.record(ActionKind::ScrollNudge);
        Ok(())
    }

    async fn pointer_move(&self) -> Result<(), ActionError> {
        self.record(ActionKind::PointerMove);
        Ok(())
    }

    async fn focus_pulse(&self) -> Result<(), ActionError> {
        self.record(ActionKind::FocusPulse);
        Ok(())
    }

    async fn storage_pulse(&self) -> Result<(), ActionError> {
        if self.storage_broken.load(Ordering::SeqCst) {
            return Err(ActionError::StorageUnavailable("broken in test".to_string()));
        }
        self.record(ActionKind::StoragePulse);
        Ok(())
    }
}

/// Scheduler over a recorder page with a chooser that always picks the
/// first option.
pub fn scheduler_with(
    settings: Settings,
) -> (Arc<RecorderPage>, ActivityScheduler<RecorderPage, MemoryBackend>) {
    scheduler_with_chooser(settings, Arc::new(|_| 0))
}

pub fn scheduler_with_chooser(
    settings: Settings,
    chooser: Arc<dyn Fn(usize) -> usize + Send + Sync>,
) -> (Arc<RecorderPage>, ActivityScheduler<RecorderPage, MemoryBackend>) {
    let page = Arc::new(RecorderPage::default());
    let scheduler = ActivityScheduler::with_chooser(
        Arc::clone(&page),
        SettingsStore::new(MemoryBackend::new()),
        settings,
        chooser,
    );
    (page, scheduler)
}

/// Give the scheduler task a chance to process pending events.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
