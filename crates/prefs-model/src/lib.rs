//! User preferences consumed by the idle clock display.
//!
//! Every field tolerates a missing or malformed stored value by falling back
//! to its documented default, so a damaged preference file never keeps the
//! display from starting.

use chrono_tz::Tz;
use serde::Deserialize;
use serde::de::{Deserializer, IgnoredAny};

pub use clock::{Brightness, ClockFace, ClockSize, ClockStyle};
pub use toggles::NotificationToggles;

mod clock {
    use super::*;

    /// Which clock face the display shows.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum ClockStyle {
        Analog,
        #[default]
        Digital,
        /// Digital face with the thin hour glyphs.
        #[serde(alias = "digital2")]
        DigitalThin,
    }

    impl ClockStyle {
        pub fn is_analog(self) -> bool {
            matches!(self, ClockStyle::Analog)
        }

        pub fn uses_thin_hours(self) -> bool {
            matches!(self, ClockStyle::DigitalThin)
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum ClockSize {
        Small,
        #[default]
        Medium,
        Large,
    }

    impl ClockSize {
        /// Scale applied to the clock's text content relative to its layout size.
        pub fn resize_ratio(self) -> f32 {
            match self {
                ClockSize::Small => 0.85,
                ClockSize::Medium => 1.0,
                ClockSize::Large => 1.15,
            }
        }
    }

    /// Clock brightness on a 0-255 scale.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
    #[serde(transparent)]
    pub struct Brightness(u8);

    impl Brightness {
        pub const DEFAULT: Brightness = Brightness(192);
        /// Below this value the display switches to night mode.
        pub const NIGHT_THRESHOLD: Brightness = Brightness(96);

        pub fn new(value: u8) -> Self {
            Self(value)
        }

        pub fn value(self) -> u8 {
            self.0
        }

        pub fn is_night(self) -> bool {
            self < Self::NIGHT_THRESHOLD
        }

        /// Multiply alpha applied over the clock face.
        pub fn dim_alpha(self) -> f32 {
            f32::from(self.0) / 255.0
        }
    }

    impl Default for Brightness {
        fn default() -> Self {
            Self::DEFAULT
        }
    }

    /// Resolved presentation of the clock derived from the preferences.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct ClockFace {
        pub style: ClockStyle,
        pub resize_ratio: f32,
        pub dim_alpha: f32,
        pub night: bool,
    }
}

mod toggles {
    use super::*;

    /// Per-source switches for the notification badges.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
    #[serde(rename_all = "kebab-case", default)]
    pub struct NotificationToggles {
        #[serde(deserialize_with = "enabled_by_default")]
        pub mail: bool,
        #[serde(deserialize_with = "enabled_by_default")]
        pub sms: bool,
        #[serde(deserialize_with = "enabled_by_default")]
        pub missed_calls: bool,
        /// Read badges from the live notification stream instead of polling.
        #[serde(deserialize_with = "disabled_by_default")]
        pub listener: bool,
    }

    impl NotificationToggles {
        pub fn any_polled(&self) -> bool {
            self.mail || self.sms || self.missed_calls
        }
    }

    impl Default for NotificationToggles {
        fn default() -> Self {
            Self {
                mail: true,
                sms: true,
                missed_calls: true,
                listener: false,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct UserPreferences {
    #[serde(deserialize_with = "lenient")]
    pub clock_style: ClockStyle,
    #[serde(deserialize_with = "lenient")]
    pub clock_size: ClockSize,
    #[serde(deserialize_with = "lenient")]
    pub brightness: Brightness,
    #[serde(deserialize_with = "lenient")]
    pub notifications: NotificationToggles,
    #[serde(deserialize_with = "enabled_by_default")]
    pub show_battery: bool,
    /// Keep the display in a fixed orientation (hands the dream off to the
    /// standalone screensaver).
    #[serde(deserialize_with = "disabled_by_default")]
    pub orientation_lock: bool,
    #[serde(deserialize_with = "disabled_by_default")]
    pub hide_from_launcher: bool,
    #[serde(deserialize_with = "lenient")]
    pub timezone: Option<Tz>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            clock_style: ClockStyle::default(),
            clock_size: ClockSize::default(),
            brightness: Brightness::default(),
            notifications: NotificationToggles::default(),
            show_battery: true,
            orientation_lock: false,
            hide_from_launcher: false,
            timezone: None,
        }
    }
}

impl UserPreferences {
    pub fn clock_face(&self) -> ClockFace {
        ClockFace {
            style: self.clock_style,
            resize_ratio: self.clock_size.resize_ratio(),
            dim_alpha: self.brightness.dim_alpha(),
            night: self.brightness.is_night(),
        }
    }

    pub fn timezone_or_utc(&self) -> Tz {
        self.timezone.unwrap_or(Tz::UTC)
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    lenient_with(deserializer, T::default)
}

fn enabled_by_default<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_with(deserializer, || true)
}

fn disabled_by_default<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_with(deserializer, || false)
}

fn lenient_with<'de, D, T, F>(deserializer: D, fallback: F) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
    F: FnOnce() -> T,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stored<T> {
        Valid(T),
        Malformed(IgnoredAny),
    }

    Ok(match Stored::<T>::deserialize(deserializer)? {
        Stored::Valid(value) => value,
        Stored::Malformed(_) => fallback(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs_from_yaml(input: &str) -> UserPreferences {
        serde_yaml::from_str(input).expect("valid preferences yaml")
    }

    #[test]
    fn empty_document_uses_documented_defaults() {
        let prefs = prefs_from_yaml("{}");
        assert_eq!(prefs, UserPreferences::default());
        assert_eq!(prefs.brightness.value(), 192);
        assert!(prefs.show_battery);
        assert!(prefs.notifications.mail);
        assert!(!prefs.notifications.listener);
        assert_eq!(prefs.timezone_or_utc(), Tz::UTC);
    }

    #[test]
    fn parses_kebab_case_keys() {
        let prefs = prefs_from_yaml(
            r#"
clock-style: analog
clock-size: large
brightness: 64
notifications:
  sms: false
  listener: true
show-battery: false
orientation-lock: true
timezone: "Asia/Kathmandu"
"#,
        );
        assert_eq!(prefs.clock_style, ClockStyle::Analog);
        assert_eq!(prefs.clock_size, ClockSize::Large);
        assert!(prefs.brightness.is_night());
        assert!(prefs.notifications.mail);
        assert!(!prefs.notifications.sms);
        assert!(prefs.notifications.listener);
        assert!(!prefs.show_battery);
        assert!(prefs.orientation_lock);
        assert_eq!(prefs.timezone, Some(chrono_tz::Asia::Kathmandu));
    }

    #[test]
    fn legacy_digital2_maps_to_thin_face() {
        let prefs = prefs_from_yaml("clock-style: digital2");
        assert_eq!(prefs.clock_style, ClockStyle::DigitalThin);
        assert!(prefs.clock_style.uses_thin_hours());
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let prefs = prefs_from_yaml(
            r#"
clock-style: sundial
clock-size: 12
brightness: 300
show-battery: "sometimes"
orientation-lock: [1, 2]
notifications:
  mail: "maybe"
timezone: "Mars/Olympus_Mons"
"#,
        );
        assert_eq!(prefs.clock_style, ClockStyle::Digital);
        assert_eq!(prefs.clock_size, ClockSize::Medium);
        assert_eq!(prefs.brightness, Brightness::DEFAULT);
        assert!(prefs.show_battery);
        assert!(!prefs.orientation_lock);
        assert!(prefs.notifications.mail);
        assert_eq!(prefs.timezone, None);
    }

    #[test]
    fn clock_face_reflects_size_and_brightness() {
        let prefs = prefs_from_yaml("clock-size: small\nbrightness: 255");
        let face = prefs.clock_face();
        assert!((face.resize_ratio - 0.85).abs() < f32::EPSILON);
        assert!((face.dim_alpha - 1.0).abs() < f32::EPSILON);
        assert!(!face.night);
    }

    #[test]
    fn night_threshold_is_exclusive() {
        assert!(Brightness::new(95).is_night());
        assert!(!Brightness::new(96).is_night());
    }
}
