//! Text shown around the clock: date, next alarm, battery.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::events::ChargeState;
use crate::platform::DeviceStatus;

/// Abbreviated weekday, month and day, e.g. `Sat, Oct 18`.
pub const DATE_FORMAT: &str = "%a, %b %-d";

pub fn date_text(now: DateTime<Utc>, tz: Tz) -> String {
    now.with_timezone(&tz).format(DATE_FORMAT).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlugType {
    Ac,
    Usb,
    Wireless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BatteryStatus {
    pub status: ChargeState,
    #[serde(default)]
    pub plugged: Option<PlugType>,
    pub level: u32,
    #[serde(default = "default_scale")]
    pub scale: u32,
}

fn default_scale() -> u32 {
    100
}

impl BatteryStatus {
    pub fn is_plugged(&self) -> bool {
        self.plugged.is_some()
    }

    /// Charge level in whole percent, truncated.
    pub fn percent(&self) -> u32 {
        if self.scale == 0 {
            return 0;
        }
        (self.level as f32 / self.scale as f32 * 100.0) as u32
    }

    pub fn text(&self) -> String {
        if self.status == ChargeState::Full {
            return "Full".to_string();
        }
        let mut text = String::new();
        if self.status.is_charging() {
            text.push_str("Charging");
            match self.plugged {
                Some(PlugType::Usb) => text.push_str(" USB"),
                Some(PlugType::Ac) => text.push_str(" AC"),
                Some(PlugType::Wireless) | None => {}
            }
            text.push_str(", ");
        }
        text.push_str(&format!("{}%", self.percent()));
        text
    }
}

/// Everything written into the text views next to the clock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayContent {
    pub date: String,
    /// Hidden when `None`.
    pub alarm: Option<String>,
    /// Hidden when `None`.
    pub battery: Option<String>,
}

impl DisplayContent {
    /// Date and next alarm. The date is updated even when the alarm lookup fails.
    pub fn refresh_date_and_alarm(
        &mut self,
        device: &dyn DeviceStatus,
        tz: Tz,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.date = date_text(now, tz);
        let alarm = device.next_alarm().context("reading next alarm")?;
        self.alarm = alarm.filter(|text| !text.trim().is_empty());
        debug!(date = %self.date, alarm = ?self.alarm, "date and alarm refreshed");
        Ok(())
    }

    /// A failed battery read hides the line until the next refresh.
    pub fn refresh_battery(&mut self, device: &dyn DeviceStatus, show_battery: bool) {
        if !show_battery {
            self.battery = None;
            return;
        }
        self.battery = match device.battery() {
            Ok(status) => Some(status.text()),
            Err(err) => {
                warn!("battery status unavailable: {err}");
                None
            }
        };
    }
}
