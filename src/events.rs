use prefs_model::UserPreferences;
use serde::Deserialize;

use crate::notifications::PostedNotification;

/// System broadcasts the display shell subscribes to while a surface is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemBroadcast {
    PowerConnected,
    PowerDisconnected { charging: ChargeState },
    /// The user unlocked the device.
    UserPresent,
    TimeChanged,
    TimezoneChanged,
    /// Periodic tick armed by the shell itself.
    QuarterHour,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChargeState {
    Charging,
    Discharging,
    NotCharging,
    Full,
    Unknown,
}

impl ChargeState {
    pub fn is_charging(self) -> bool {
        matches!(self, ChargeState::Charging | ChargeState::Full)
    }
}

/// Live notification stream events.
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    Posted(PostedNotification),
    Removed { key: String },
}

/// Inputs to the UI-owning task that are not system broadcasts.
#[derive(Debug)]
pub enum ShellCommand {
    /// Touch, key press, or any other interaction ending the idle display.
    UserInteraction,
    /// The container was resized (rotation, window change).
    ConfigurationChanged { width: f32, height: f32 },
    /// The preference file was edited and parsed again.
    PreferencesChanged(UserPreferences),
    DeviceSnapshotChanged,
    Detach,
}

/// Why an active session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    UserInteraction,
    UserPresent,
    PowerLost,
    Detached,
    /// The dream handed off to the orientation-locked screensaver.
    HandedOff,
}
