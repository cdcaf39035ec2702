//! One idle display on one surface: attaches, keeps the wake flags in step
//! with the charger, drives the burn-in mover, and tears itself down when the
//! user comes back.
//!
//! The session is synchronous and owned by a single task. Badge queries are
//! handed out as [`BadgeQuery`] values for the owner to run on a blocking
//! worker; the result comes back through [`IdleDisplaySession::complete_badge_query`]
//! and is dropped unless the session is still active and the query is the
//! latest one issued.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use prefs_model::{NotificationToggles, UserPreferences};
use rand::{SeedableRng, rngs::StdRng};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::animation::Extent;
use crate::content::DisplayContent;
use crate::events::{ChargeState, FinishReason, ShellCommand, SystemBroadcast};
use crate::notifications::{
    IconResolver, NotificationAggregator, NotificationListenerHandle, NotificationSources,
    ProvisionalBadges,
};
use crate::platform::DeviceStatus;
use crate::scheduler::{ContentRefresher, FireOutcome, MoveScheduler};
use crate::surface::{BrightnessOverride, Surface, WindowFlags};

/// Delay before the first move after the container changed size.
pub const RELAYOUT_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SessionVariant {
    /// Non-interactive dream shown while docked or charging.
    #[default]
    Dream,
    /// Standalone fullscreen screensaver that can hold its orientation.
    Screensaver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub variant: SessionVariant,
    /// Set on the window regardless of charging state.
    pub additional_flags: WindowFlags,
}

impl SessionOptions {
    pub fn dream() -> Self {
        Self {
            variant: SessionVariant::Dream,
            additional_flags: WindowFlags::empty(),
        }
    }

    pub fn screensaver() -> Self {
        Self {
            variant: SessionVariant::Screensaver,
            additional_flags: WindowFlags::FULLSCREEN | WindowFlags::TURN_SCREEN_ON,
        }
    }

    pub fn for_variant(variant: SessionVariant) -> Self {
        match variant {
            SessionVariant::Dream => Self::dream(),
            SessionVariant::Screensaver => Self::screensaver(),
        }
    }
}

/// Unscaled extents the clock is laid out with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionLayout {
    pub container: Extent,
    pub clock: Extent,
}

/// Where notification badges come from.
#[derive(Clone)]
pub struct BadgeProviders {
    pub sources: NotificationSources,
    pub listener: NotificationListenerHandle,
    pub icons: Arc<dyn IconResolver>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    Active,
    /// An orientation-locked dream defers to the screensaver variant.
    HandedOff,
}

enum QueryPlan {
    Polled {
        sources: NotificationSources,
        toggles: NotificationToggles,
    },
    Listener {
        listener: NotificationListenerHandle,
        icons: Arc<dyn IconResolver>,
    },
}

/// A pending badge refresh. [`BadgeQuery::run`] blocks on the providers.
pub struct BadgeQuery {
    generation: u64,
    staged: ProvisionalBadges,
    plan: QueryPlan,
}

impl BadgeQuery {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn uses_listener(&self) -> bool {
        matches!(self.plan, QueryPlan::Listener { .. })
    }

    /// Query the providers and stage the resulting badges.
    pub fn run(self) -> BadgeQueryDone {
        self.staged.clear();
        let badges = match &self.plan {
            QueryPlan::Polled { sources, toggles } => sources.poll(toggles),
            QueryPlan::Listener { listener, icons } => listener.badges(icons.as_ref()),
        };
        for badge in badges {
            self.staged.add(badge);
        }
        BadgeQueryDone {
            generation: self.generation,
        }
    }
}

impl std::fmt::Debug for BadgeQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BadgeQuery")
            .field("generation", &self.generation)
            .field("listener", &self.uses_listener())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeQueryDone {
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshScope {
    DateAndAlarm,
    Everything,
}

/// Rewrites the text views; with [`RefreshScope::Everything`] it also
/// re-reads the battery and asks for fresh badges.
struct ContentRefresh<'a> {
    scope: RefreshScope,
    content: &'a mut DisplayContent,
    device: &'a dyn DeviceStatus,
    prefs: &'a UserPreferences,
    surface: &'a mut dyn Surface,
    wall: DateTime<Utc>,
    badges_wanted: &'a mut bool,
}

impl ContentRefresher for ContentRefresh<'_> {
    fn refresh(&mut self) -> Result<()> {
        if self.scope == RefreshScope::Everything {
            self.content
                .refresh_battery(self.device, self.prefs.show_battery);
            *self.badges_wanted = true;
        }
        let result =
            self.content
                .refresh_date_and_alarm(self.device, self.prefs.timezone_or_utc(), self.wall);
        self.surface.set_content(self.content);
        result
    }
}

pub struct IdleDisplaySession<S: Surface> {
    options: SessionOptions,
    layout: SessionLayout,
    prefs: UserPreferences,
    surface: S,
    device: Arc<dyn DeviceStatus>,
    providers: BadgeProviders,
    scheduler: MoveScheduler,
    aggregator: NotificationAggregator,
    content: DisplayContent,
    state: SessionState,
    plugged: bool,
    generation: u64,
    query_in_flight: bool,
    badges_wanted: bool,
    rng: StdRng,
}

impl<S: Surface> IdleDisplaySession<S> {
    pub fn new(
        options: SessionOptions,
        layout: SessionLayout,
        prefs: UserPreferences,
        surface: S,
        device: Arc<dyn DeviceStatus>,
        providers: BadgeProviders,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            options,
            layout,
            prefs,
            surface,
            device,
            providers,
            scheduler: MoveScheduler::new(),
            aggregator: NotificationAggregator::new(),
            content: DisplayContent::default(),
            state: SessionState::Stopped,
            plugged: true,
            generation: 0,
            query_in_flight: false,
            badges_wanted: false,
            rng,
        }
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn scheduler(&self) -> &MoveScheduler {
        &self.scheduler
    }

    pub fn aggregator(&self) -> &NotificationAggregator {
        &self.aggregator
    }

    pub fn content(&self) -> &DisplayContent {
        &self.content
    }

    pub fn preferences(&self) -> &UserPreferences {
        &self.prefs
    }

    pub fn layout(&self) -> SessionLayout {
        self.layout
    }

    pub fn is_plugged(&self) -> bool {
        self.plugged
    }

    /// Bring the display up: wake flags, clock face, first content, and the
    /// mover's first fire.
    pub fn attach(&mut self, now: Instant, wall: DateTime<Utc>) -> AttachOutcome {
        if self.is_active() {
            warn!("attach on an already active session ignored");
            return AttachOutcome::Active;
        }
        if self.hands_off(&self.prefs) {
            info!("orientation lock set; handing off to the screensaver");
            return AttachOutcome::HandedOff;
        }

        self.state = SessionState::Active;
        self.plugged = match self.device.battery() {
            Ok(battery) => battery.is_plugged(),
            Err(err) => {
                warn!("battery status unavailable at attach, assuming plugged in: {err}");
                true
            }
        };
        self.apply_window_flags();
        self.layout_clock(now, wall);
        self.scheduler.start(now);
        info!(
            variant = ?self.options.variant,
            plugged = self.plugged,
            generation = self.generation,
            "idle display attached"
        );
        AttachOutcome::Active
    }

    /// Cancel the pending move and stop accepting worker results.
    pub fn detach(&mut self, reason: FinishReason) -> FinishReason {
        if self.is_active() {
            self.scheduler.stop();
            self.state = SessionState::Stopped;
            self.generation += 1;
            self.badges_wanted = false;
            info!(?reason, "idle display finished");
        }
        reason
    }

    pub fn handle_broadcast(
        &mut self,
        broadcast: SystemBroadcast,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Option<FinishReason> {
        if !self.is_active() {
            debug!(?broadcast, "broadcast ignored while stopped");
            return None;
        }
        match broadcast {
            SystemBroadcast::PowerConnected => {
                self.plugged = true;
                self.apply_window_flags();
                None
            }
            SystemBroadcast::PowerDisconnected { charging } => {
                self.plugged = false;
                self.apply_window_flags();
                (charging == ChargeState::NotCharging)
                    .then(|| self.detach(FinishReason::PowerLost))
            }
            SystemBroadcast::UserPresent => Some(self.detach(FinishReason::UserPresent)),
            SystemBroadcast::TimeChanged
            | SystemBroadcast::TimezoneChanged
            | SystemBroadcast::QuarterHour => {
                debug!(?broadcast, "refreshing date and alarm");
                self.refresh(RefreshScope::DateAndAlarm, now, wall);
                None
            }
        }
    }

    pub fn handle_command(
        &mut self,
        command: ShellCommand,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Option<FinishReason> {
        match command {
            ShellCommand::Detach => Some(self.detach(FinishReason::Detached)),
            _ if !self.is_active() => {
                debug!(?command, "command ignored while stopped");
                None
            }
            ShellCommand::UserInteraction => Some(self.detach(FinishReason::UserInteraction)),
            ShellCommand::ConfigurationChanged { width, height } => {
                if self.hands_off(&self.prefs) {
                    debug!("orientation locked; configuration change ignored");
                    return None;
                }
                self.layout.container = Extent::new(width, height);
                self.relayout(now, wall);
                None
            }
            ShellCommand::PreferencesChanged(prefs) => {
                if self.hands_off(&prefs) {
                    self.prefs = prefs;
                    return Some(self.detach(FinishReason::HandedOff));
                }
                self.prefs = prefs;
                self.relayout(now, wall);
                None
            }
            ShellCommand::DeviceSnapshotChanged => {
                self.content
                    .refresh_battery(self.device.as_ref(), self.prefs.show_battery);
                self.surface.set_content(&self.content);
                self.badges_wanted = true;
                None
            }
        }
    }

    /// Fire the mover if due and step any running animation.
    pub fn tick(&mut self, now: Instant, wall: DateTime<Utc>) {
        if !self.is_active() {
            return;
        }
        let wall_ms = u64::try_from(wall.timestamp_millis()).unwrap_or(0);
        if let Some(FireOutcome::Retry { reason, delay }) =
            self.scheduler.fire_if_due(now, wall_ms, &mut self.rng)
        {
            debug!(?reason, delay_ms = delay.as_millis() as u64, "move deferred");
        }

        let mut refresher = ContentRefresh {
            scope: RefreshScope::Everything,
            content: &mut self.content,
            device: self.device.as_ref(),
            prefs: &self.prefs,
            surface: &mut self.surface,
            wall,
            badges_wanted: &mut self.badges_wanted,
        };
        if let Some(transform) = self.scheduler.advance(now, &mut refresher) {
            self.surface.apply_transform(transform);
        }
    }

    pub fn next_deadline(&self, now: Instant, frame_interval: Duration) -> Option<Instant> {
        if !self.is_active() {
            return None;
        }
        self.scheduler.next_deadline(now, frame_interval)
    }

    /// Next badge query to run, if one is wanted and none is in flight.
    pub fn take_badge_query(&mut self) -> Option<BadgeQuery> {
        if !self.is_active() || !self.badges_wanted || self.query_in_flight {
            return None;
        }
        self.badges_wanted = false;
        self.query_in_flight = true;
        self.generation += 1;

        let toggles = self.prefs.notifications;
        let plan = if toggles.listener && self.providers.listener.is_connected() {
            QueryPlan::Listener {
                listener: self.providers.listener.clone(),
                icons: self.providers.icons.clone(),
            }
        } else {
            QueryPlan::Polled {
                sources: self.providers.sources.clone(),
                toggles,
            }
        };
        let query = BadgeQuery {
            generation: self.generation,
            staged: self.aggregator.provisional(),
            plan,
        };
        debug!(?query, "badge query issued");
        Some(query)
    }

    /// Commit a finished query. Returns `false` when the result was stale.
    pub fn complete_badge_query(&mut self, done: BadgeQueryDone) -> bool {
        self.query_in_flight = false;
        if !self.is_active() || done.generation != self.generation {
            debug!(
                generation = done.generation,
                current = self.generation,
                "discarding stale badge result"
            );
            return false;
        }
        let grid = self.aggregator.commit();
        self.surface.set_badges(grid);
        true
    }

    fn hands_off(&self, prefs: &UserPreferences) -> bool {
        self.options.variant == SessionVariant::Dream && prefs.orientation_lock
    }

    fn apply_window_flags(&mut self) {
        let mut flags = self.options.additional_flags;
        if self.plugged {
            flags |= WindowFlags::WAKE_LOCK;
        }
        self.surface.set_window_flags(flags);
    }

    fn layout_clock(&mut self, now: Instant, wall: DateTime<Utc>) {
        let face = self.prefs.clock_face();
        self.surface.apply_clock_face(&face);
        self.surface.set_brightness(BrightnessOverride::for_face(&face));

        let movable = self.layout.clock.scaled(face.resize_ratio);
        self.scheduler.register_views(self.layout.container, movable);
        self.surface.apply_transform(self.scheduler.transform());
        self.refresh(RefreshScope::Everything, now, wall);
    }

    fn relayout(&mut self, now: Instant, wall: DateTime<Utc>) {
        self.scheduler.stop();
        self.layout_clock(now, wall);
        self.scheduler.start_after(now, RELAYOUT_DELAY);
    }

    fn refresh(&mut self, scope: RefreshScope, now: Instant, wall: DateTime<Utc>) {
        let mut refresher = ContentRefresh {
            scope,
            content: &mut self.content,
            device: self.device.as_ref(),
            prefs: &self.prefs,
            surface: &mut self.surface,
            wall,
            badges_wanted: &mut self.badges_wanted,
        };
        self.scheduler.refresh_content(now, &mut refresher);
    }
}
