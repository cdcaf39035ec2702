//! The rendered window the session draws into.

use bitflags::bitflags;
use prefs_model::ClockFace;
use tracing::{debug, info, trace};

use crate::animation::ViewTransform;
use crate::content::DisplayContent;
use crate::notifications::BadgeGrid;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WindowFlags: u32 {
        const DISMISS_KEYGUARD = 1 << 0;
        const SHOW_WHEN_LOCKED = 1 << 1;
        const ALLOW_LOCK_WHILE_SCREEN_ON = 1 << 2;
        const KEEP_SCREEN_ON = 1 << 3;
        const FULLSCREEN = 1 << 4;
        const TURN_SCREEN_ON = 1 << 5;

        /// Held only while the device is plugged in.
        const WAKE_LOCK = Self::DISMISS_KEYGUARD.bits()
            | Self::SHOW_WHEN_LOCKED.bits()
            | Self::ALLOW_LOCK_WHILE_SCREEN_ON.bits()
            | Self::KEEP_SCREEN_ON.bits();
    }
}

/// Window brightness override; `None` leaves the system setting alone.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BrightnessOverride {
    pub screen: Option<f32>,
    pub buttons: Option<f32>,
}

impl BrightnessOverride {
    /// Barely lit screen with the button backlight off.
    pub const NIGHT: BrightnessOverride = BrightnessOverride {
        screen: Some(0.01),
        buttons: Some(0.0),
    };

    pub fn for_face(face: &ClockFace) -> Self {
        if face.night {
            Self::NIGHT
        } else {
            Self::default()
        }
    }
}

/// Window plus the clock, text, and badge views inside it.
pub trait Surface {
    fn apply_transform(&mut self, transform: ViewTransform);
    fn set_content(&mut self, content: &DisplayContent);
    fn set_badges(&mut self, grid: &BadgeGrid);
    fn set_window_flags(&mut self, flags: WindowFlags);
    fn apply_clock_face(&mut self, face: &ClockFace);
    fn set_brightness(&mut self, brightness: BrightnessOverride);
}

/// Headless surface that logs every change and remembers the latest state.
#[derive(Debug, Default)]
pub struct LogSurface {
    pub transform: Option<ViewTransform>,
    pub content: DisplayContent,
    pub badge_rows: Vec<usize>,
    pub badge_ids: Vec<String>,
    pub flags: WindowFlags,
    pub face: Option<ClockFace>,
    pub brightness: BrightnessOverride,
    pub transform_updates: usize,
    pub content_updates: usize,
    pub badge_updates: usize,
}

impl LogSurface {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Surface for LogSurface {
    fn apply_transform(&mut self, transform: ViewTransform) {
        trace!(
            x = transform.position.x,
            y = transform.position.y,
            scale = transform.scale,
            alpha = transform.alpha,
            "clock transform"
        );
        self.transform = Some(transform);
        self.transform_updates += 1;
    }

    fn set_content(&mut self, content: &DisplayContent) {
        info!(
            date = %content.date,
            alarm = content.alarm.as_deref().unwrap_or("-"),
            battery = content.battery.as_deref().unwrap_or("-"),
            "content"
        );
        self.content = content.clone();
        self.content_updates += 1;
    }

    fn set_badges(&mut self, grid: &BadgeGrid) {
        self.badge_rows = grid.row_lengths();
        self.badge_ids = grid
            .rows()
            .iter()
            .flatten()
            .map(|badge| badge.source_id.clone())
            .collect();
        info!(rows = ?self.badge_rows, badges = ?self.badge_ids, "notification badges");
        self.badge_updates += 1;
    }

    fn set_window_flags(&mut self, flags: WindowFlags) {
        if flags != self.flags {
            debug!(?flags, "window flags");
        }
        self.flags = flags;
    }

    fn apply_clock_face(&mut self, face: &ClockFace) {
        info!(
            style = ?face.style,
            analog = face.style.is_analog(),
            thin_hours = face.style.uses_thin_hours(),
            resize_ratio = face.resize_ratio,
            dim_alpha = face.dim_alpha,
            night = face.night,
            "clock face"
        );
        self.face = Some(*face);
    }

    fn set_brightness(&mut self, brightness: BrightnessOverride) {
        debug!(screen = ?brightness.screen, buttons = ?brightness.buttons, "window brightness");
        self.brightness = brightness;
    }
}
