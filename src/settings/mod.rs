//! Settings model: safety profiles, the persisted settings record, and
//! partial updates.
//!
//! A [`SafetyProfile`] is a named bundle of timing parameters trading
//! detection risk against session-keeping effectiveness. [`Settings`] is
//! the flat record persisted under a single storage key; [`SettingsPatch`]
//! is the partial form the settings UI sends when it changes one field.
//!
//! Serde contract for the persisted record: unknown fields are ignored on
//! load, missing fields take their documented defaults, and an unknown
//! profile string falls back to [`SafetyProfile::Low`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod store;

pub use store::{MemoryBackend, SettingsBackend, SettingsStore, SETTINGS_KEY};

/// Default tick interval for the `custom` profile, in seconds.
pub const DEFAULT_CUSTOM_TICK_SECS: u64 = 300;

/// Named bundle of scheduler timing parameters.
///
/// The three named profiles prescribe both durations. `Custom` prescribes
/// neither: its tick interval comes from
/// [`Settings::custom_tick_interval_secs`] and its idle threshold is
/// derived from that (see [`Settings::min_idle`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyProfile {
    /// Safest: long intervals, scroll-only actions while visible.
    #[default]
    Low,
    /// Moderate cadence, randomized action selection while visible.
    Medium,
    /// Aggressive cadence, randomized action selection while visible.
    High,
    /// Tick interval taken from the settings record instead of the profile.
    Custom,
}

/// Timing pair prescribed by a named profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileTimings {
    /// How often the scheduler wakes up to evaluate whether to act.
    pub tick_interval: Duration,
    /// Minimum elapsed idle time before a synthetic action is permitted.
    pub min_idle: Duration,
}

// Manual impl so an unknown profile string from an older or newer record
// degrades to `Low` instead of rejecting the whole settings record.
impl<'de> Deserialize<'de> for SafetyProfile {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_default())
    }
}

impl std::str::FromStr for SafetyProfile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(SafetyProfile::Low),
            "medium" => Ok(SafetyProfile::Medium),
            "high" => Ok(SafetyProfile::High),
            "custom" => Ok(SafetyProfile::Custom),
            other => Err(format!("unknown safety profile: {other}")),
        }
    }
}

impl std::fmt::Display for SafetyProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SafetyProfile::Low => "low",
            SafetyProfile::Medium => "medium",
            SafetyProfile::High => "high",
            SafetyProfile::Custom => "custom",
        };
        f.write_str(name)
    }
}

impl SafetyProfile {
    /// The timings this profile prescribes, or `None` for `Custom`.
    pub fn prescribed_timings(&self) -> Option<ProfileTimings> {
        let (tick_secs, idle_secs) = match self {
            SafetyProfile::Low => (300, 240),
            SafetyProfile::Medium => (180, 120),
            SafetyProfile::High => (60, 30),
            SafetyProfile::Custom => return None,
        };
        Some(ProfileTimings {
            tick_interval: Duration::from_secs(tick_secs),
            min_idle: Duration::from_secs(idle_secs),
        })
    }

    /// All profile variants, in ascending-risk order.
    pub fn all() -> [SafetyProfile; 4] {
        [
            SafetyProfile::Low,
            SafetyProfile::Medium,
            SafetyProfile::High,
            SafetyProfile::Custom,
        ]
    }
}

/// The persisted settings record.
///
/// Owned by the [`SettingsStore`]; the scheduler holds a read-only
/// snapshot refreshed on every settings change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Active safety profile.
    pub safety_profile: SafetyProfile,
    /// Permit synthetic actions while the page is hidden.
    pub background_mode_enabled: bool,
    /// Reload the page when its WebSocket closes abnormally.
    pub socket_monitor_enabled: bool,
    /// Raise per-action logging from trace to debug level.
    pub debug_logging_enabled: bool,
    /// Tick interval, in seconds, used by the `custom` profile.
    pub custom_tick_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            safety_profile: SafetyProfile::Low,
            background_mode_enabled: true,
            socket_monitor_enabled: true,
            debug_logging_enabled: false,
            custom_tick_interval_secs: DEFAULT_CUSTOM_TICK_SECS,
        }
    }
}

impl Settings {
    /// Effective tick interval for the active profile.
    ///
    /// Total over every profile: named profiles use their prescribed value,
    /// `Custom` uses the stored seconds clamped to at least one second so a
    /// zeroed record can never produce a busy loop.
    pub fn tick_interval(&self) -> Duration {
        match self.safety_profile.prescribed_timings() {
            Some(t) => t.tick_interval,
            None => Duration::from_secs(self.custom_tick_interval_secs.max(1)),
        }
    }

    /// Effective minimum idle time before a synthetic action is permitted.
    ///
    /// `Custom` derives its threshold as 80% of the custom tick, matching
    /// the 240s/300s ratio the `low` profile prescribes.
    pub fn min_idle(&self) -> Duration {
        match self.safety_profile.prescribed_timings() {
            Some(t) => t.min_idle,
            None => self.tick_interval().mul_f64(0.8),
        }
    }

    /// Apply a partial update, returning the merged record.
    pub fn merged(&self, patch: &SettingsPatch) -> Settings {
        Settings {
            safety_profile: patch.safety_profile.unwrap_or(self.safety_profile),
            background_mode_enabled: patch
                .background_mode_enabled
                .unwrap_or(self.background_mode_enabled),
            socket_monitor_enabled: patch
                .socket_monitor_enabled
                .unwrap_or(self.socket_monitor_enabled),
            debug_logging_enabled: patch
                .debug_logging_enabled
                .unwrap_or(self.debug_logging_enabled),
            custom_tick_interval_secs: patch
                .custom_tick_interval_secs
                .unwrap_or(self.custom_tick_interval_secs),
        }
    }
}

/// Partial settings update from the settings UI.
///
/// `None` fields are left untouched by [`Settings::merged`]. An empty
/// patch is a value-level no-op but still causes a timer restart when
/// applied through the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    /// New safety profile, if changing.
    pub safety_profile: Option<SafetyProfile>,
    /// New background-mode flag, if changing.
    pub background_mode_enabled: Option<bool>,
    /// New socket-monitor flag, if changing.
    pub socket_monitor_enabled: Option<bool>,
    /// New debug-logging flag, if changing.
    pub debug_logging_enabled: Option<bool>,
    /// New custom tick interval, if changing.
    pub custom_tick_interval_secs: Option<u64>,
}

impl SettingsPatch {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        *self == SettingsPatch::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_profile_timings_defined_and_nonnegative() {
        for profile in SafetyProfile::all() {
            let settings = Settings {
                safety_profile: profile,
                ..Settings::default()
            };
            assert!(settings.tick_interval() > Duration::ZERO);
            // Duration is unsigned; the invariant worth checking is that the
            // threshold never exceeds the tick for the shipped tables.
            assert!(settings.min_idle() <= settings.tick_interval());
        }
    }

    #[test]
    fn test_low_profile_matches_documented_timings() {
        let t = SafetyProfile::Low.prescribed_timings().unwrap();
        assert_eq!(t.tick_interval, Duration::from_secs(300));
        assert_eq!(t.min_idle, Duration::from_secs(240));
    }

    #[test]
    fn test_custom_profile_uses_stored_tick() {
        let settings = Settings {
            safety_profile: SafetyProfile::Custom,
            custom_tick_interval_secs: 90,
            ..Settings::default()
        };
        assert_eq!(settings.tick_interval(), Duration::from_secs(90));
        assert_eq!(settings.min_idle(), Duration::from_secs(72));
    }

    #[test]
    fn test_custom_profile_zero_tick_clamped() {
        let settings = Settings {
            safety_profile: SafetyProfile::Custom,
            custom_tick_interval_secs: 0,
            ..Settings::default()
        };
        assert_eq!(settings.tick_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.safety_profile, SafetyProfile::Low);
        assert!(settings.background_mode_enabled);
        assert!(settings.socket_monitor_enabled);
        assert!(!settings.debug_logging_enabled);
        assert_eq!(settings.custom_tick_interval_secs, 300);
    }

    #[test]
    fn test_empty_patch_is_identity() {
        let settings = Settings {
            safety_profile: SafetyProfile::High,
            background_mode_enabled: false,
            socket_monitor_enabled: false,
            debug_logging_enabled: true,
            custom_tick_interval_secs: 42,
        };
        let merged = settings.merged(&SettingsPatch::default());
        assert_eq!(merged, settings);
        assert!(SettingsPatch::default().is_empty());
    }

    #[test]
    fn test_patch_merges_set_fields_only() {
        let settings = Settings::default();
        let patch = SettingsPatch {
            safety_profile: Some(SafetyProfile::Medium),
            debug_logging_enabled: Some(true),
            ..SettingsPatch::default()
        };
        let merged = settings.merged(&patch);
        assert_eq!(merged.safety_profile, SafetyProfile::Medium);
        assert!(merged.debug_logging_enabled);
        assert!(merged.background_mode_enabled);
        assert_eq!(merged.custom_tick_interval_secs, 300);
    }

    #[test]
    fn test_profile_serialization() {
        let profiles = [
            (SafetyProfile::Low, "\"low\""),
            (SafetyProfile::Medium, "\"medium\""),
            (SafetyProfile::High, "\"high\""),
            (SafetyProfile::Custom, "\"custom\""),
        ];
        for (profile, json) in profiles {
            assert_eq!(serde_json::to_string(&profile).unwrap(), json);
            assert_eq!(serde_json::from_str::<SafetyProfile>(json).unwrap(), profile);
        }
    }

    #[test]
    fn test_unknown_profile_falls_back_to_low() {
        let profile: SafetyProfile = serde_json::from_str("\"paranoid\"").unwrap();
        assert_eq!(profile, SafetyProfile::Low);
    }

    #[test]
    fn test_record_with_missing_fields_takes_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"safety_profile":"high"}"#).unwrap();
        assert_eq!(settings.safety_profile, SafetyProfile::High);
        assert!(settings.background_mode_enabled);
        assert_eq!(settings.custom_tick_interval_secs, 300);
    }

    #[test]
    fn test_record_with_unknown_fields_is_accepted() {
        let settings: Settings = serde_json::from_str(
            r#"{"safety_profile":"medium","theme":"dark","schema_version":7}"#,
        )
        .unwrap();
        assert_eq!(settings.safety_profile, SafetyProfile::Medium);
    }
}
