//! Idle policy and synthetic action selection
//!
//! The decision layer is deliberately pure: [`should_act`] and
//! [`select_action`] take plain values and touch no page, which is what
//! keeps the keepalive policy testable without a browser. The scheduler
//! loop owns the side effects.

use crate::settings::{SafetyProfile, Settings};
use std::time::Duration;

/// The kinds of synthetic activity the scheduler can perform, from
/// lowest footprint to loudest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Write-then-remove of a throwaway storage key; no visible effect.
    StoragePulse,
    /// Scroll by a minimal offset, restore the original position shortly
    /// after.
    ScrollNudge,
    /// Dispatch of a synthetic pointer-move event.
    PointerMove,
    /// Dispatch of a synthetic focus event.
    FocusPulse,
}

/// Uniform chooser over `n` options, returning an index in `0..n`.
///
/// Pluggable so tests can pin the randomized branch of
/// [`select_action`] to a deterministic pick.
pub type Chooser = dyn Fn(usize) -> usize + Send + Sync;

/// Default chooser backed by the thread-local RNG.
pub fn random_chooser(n: usize) -> usize {
    use rand::Rng;
    rand::rng().random_range(0..n)
}

/// Whether a synthetic action is permitted right now.
///
/// With background mode enabled the decision depends only on whether
/// `idle_for` exceeds the profile's idle threshold; with it disabled the
/// page must also be visible. A hidden page with background mode off is
/// never acted on, no matter how long it has been idle.
pub fn should_act(settings: &Settings, page_visible: bool, idle_for: Duration) -> bool {
    let idle_enough = idle_for > settings.min_idle();
    if settings.background_mode_enabled {
        idle_enough
    } else {
        page_visible && idle_enough
    }
}

/// Choose the one synthetic action to perform.
///
/// Loudness scales with accepted risk: a hidden page always gets the
/// storage pulse, the `low` and `custom` profiles stay with the scroll
/// nudge, and `medium`/`high` pick uniformly among the visible-page
/// actions via `chooser`.
///
/// Only meaningful when [`should_act`] permitted an action; a hidden
/// page without background mode never reaches selection.
pub fn select_action(
    profile: SafetyProfile,
    page_visible: bool,
    background_mode: bool,
    chooser: &Chooser,
) -> ActionKind {
    if !page_visible && background_mode {
        return ActionKind::StoragePulse;
    }

    match profile {
        SafetyProfile::Low | SafetyProfile::Custom => ActionKind::ScrollNudge,
        SafetyProfile::Medium | SafetyProfile::High => {
            const VISIBLE_ACTIONS: [ActionKind; 3] = [
                ActionKind::ScrollNudge,
                ActionKind::PointerMove,
                ActionKind::FocusPulse,
            ];
            VISIBLE_ACTIONS[chooser(VISIBLE_ACTIONS.len()) % VISIBLE_ACTIONS.len()]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    fn settings(profile: SafetyProfile, background: bool) -> Settings {
        Settings {
            safety_profile: profile,
            background_mode_enabled: background,
            ..Settings::default()
        }
    }

    #[test]
    fn test_hidden_page_without_background_never_acts() {
        let s = settings(SafetyProfile::Low, false);
        for idle_secs in [0u64, 1, 240, 241, 100_000] {
            assert!(!should_act(&s, false, Duration::from_secs(idle_secs)));
        }
    }

    #[test]
    fn test_background_mode_ignores_visibility() {
        let s = settings(SafetyProfile::Low, true);
        let idle = Duration::from_secs(250);
        assert_eq!(should_act(&s, true, idle), should_act(&s, false, idle));
        let not_idle = Duration::from_secs(10);
        assert!(!should_act(&s, true, not_idle));
        assert!(!should_act(&s, false, not_idle));
    }

    #[test]
    fn test_idle_threshold_is_strict() {
        let s = settings(SafetyProfile::Low, true);
        assert!(!should_act(&s, true, Duration::from_secs(240)));
        assert!(should_act(&s, true, Duration::from_secs(241)));
    }

    #[test]
    fn test_visible_page_without_background_uses_idle_threshold() {
        let s = settings(SafetyProfile::High, false);
        assert!(should_act(&s, true, Duration::from_secs(31)));
        assert!(!should_act(&s, true, Duration::from_secs(29)));
    }

    #[test]
    fn test_hidden_with_background_selects_storage_pulse() {
        for profile in SafetyProfile::all() {
            let action = select_action(profile, false, true, &|_| 0);
            assert_eq!(action, ActionKind::StoragePulse);
        }
    }

    #[test]
    fn test_low_profile_always_scrolls_when_visible() {
        for pick in 0..3 {
            let action = select_action(SafetyProfile::Low, true, true, &move |_| pick);
            assert_eq!(action, ActionKind::ScrollNudge);
        }
    }

    #[test]
    fn test_custom_profile_behaves_like_low_when_visible() {
        let action = select_action(SafetyProfile::Custom, true, false, &|_| 2);
        assert_eq!(action, ActionKind::ScrollNudge);
    }

    #[test]
    fn test_medium_profile_uses_chooser_when_visible() {
        let picks = [
            (0, ActionKind::ScrollNudge),
            (1, ActionKind::PointerMove),
            (2, ActionKind::FocusPulse),
        ];
        for (pick, expected) in picks {
            let action = select_action(SafetyProfile::Medium, true, false, &move |_| pick);
            assert_eq!(action, expected);
        }
    }

    #[test]
    fn test_chooser_sees_three_visible_options() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        // `&Chooser` requires a `'static` callable, so the counter is
        // shared through an Arc rather than borrowed.
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_by_chooser = Arc::clone(&seen);
        let chooser = move |n: usize| {
            seen_by_chooser.store(n, Ordering::Relaxed);
            n - 1
        };
        let action = select_action(SafetyProfile::High, true, true, &chooser);
        assert_eq!(seen.load(Ordering::Relaxed), 3);
        assert_eq!(action, ActionKind::FocusPulse);
    }
}
