//! Burn-in mover: once a minute the clock fades out, jumps to a random spot
//! inside its container, and fades back in.
//!
//! The mover is a plain state machine. The owner asks it for the next
//! deadline, calls [`MoveScheduler::fire_if_due`] when the pending move is due
//! and [`MoveScheduler::advance`] on every frame while an animation runs. It
//! never touches a surface itself; the owner applies the returned transforms.

use std::time::{Duration, Instant};

use anyhow::Result;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, trace, warn};

use crate::animation::{Easing, Extent, Position, TravelRange, ViewTransform, lerp, progress};

const MOVE_INTERVAL_MS: u64 = 60_000;
const FADE_TIME_MS: u64 = 3_000;
const RETRY_DELAY_MS: u64 = 500;

/// Moves are aligned to wall-clock minutes.
pub const MOVE_INTERVAL: Duration = Duration::from_millis(MOVE_INTERVAL_MS);
/// Duration of each half of a move (shrink-out, grow-in) and of the initial fade-in.
pub const FADE_TIME: Duration = Duration::from_millis(FADE_TIME_MS);
/// Delay before retrying when there is nothing to move yet.
pub const RETRY_DELAY: Duration = Duration::from_millis(RETRY_DELAY_MS);
/// Scale the clock shrinks to while fading out.
pub const SHRUNK_SCALE: f32 = 0.85;

/// Content updated at the midpoint of a move, while the clock is invisible.
pub trait ContentRefresher {
    fn refresh(&mut self) -> Result<()>;
}

impl<F> ContentRefresher for F
where
    F: FnMut() -> Result<()>,
{
    fn refresh(&mut self) -> Result<()> {
        self()
    }
}

/// The single outstanding move callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTask {
    pub due: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MovePhase {
    Idle,
    ShrinkingOut {
        started: Instant,
        from: ViewTransform,
        target: Position,
    },
    /// Shrink finished; content refresh and position snap happen on the next advance.
    Jumping { at: Instant, target: Position },
    GrowingIn {
        started: Instant,
        from: ViewTransform,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayState {
    pub transform: ViewTransform,
    pub last_refresh: Option<Instant>,
}

impl DisplayState {
    pub fn is_visible(&self) -> bool {
        self.transform.alpha > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    Unregistered,
    NoTravel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FireOutcome {
    Retry {
        reason: RetryReason,
        delay: Duration,
    },
    Moved {
        target: Position,
        /// The clock was invisible and jumped straight to the target.
        jumped: bool,
        next_in: Duration,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct RegisteredViews {
    container: Extent,
    movable: Extent,
}

#[derive(Debug)]
pub struct MoveScheduler {
    views: Option<RegisteredViews>,
    state: DisplayState,
    phase: MovePhase,
    pending: Option<ScheduledTask>,
}

impl Default for MoveScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl MoveScheduler {
    pub fn new() -> Self {
        Self {
            views: None,
            state: DisplayState {
                transform: ViewTransform::default(),
                last_refresh: None,
            },
            phase: MovePhase::Idle,
            pending: None,
        }
    }

    /// Bind to a freshly laid out container and clock view.
    ///
    /// The clock starts hidden; the first move fades it in at a random spot.
    pub fn register_views(&mut self, container: Extent, movable: Extent) {
        let range = TravelRange::between(container, movable);
        let position = Position::new(
            self.state.transform.position.x.min(range.x),
            self.state.transform.position.y.min(range.y),
        );
        self.views = Some(RegisteredViews { container, movable });
        self.state.transform = ViewTransform::hidden_at(position);
        self.phase = MovePhase::Idle;
        debug!(
            container_width = container.width,
            container_height = container.height,
            clock_width = movable.width,
            clock_height = movable.height,
            "mover views registered"
        );
    }

    /// Post the first move immediately.
    pub fn start(&mut self, now: Instant) {
        self.schedule(now);
    }

    pub fn start_after(&mut self, now: Instant, delay: Duration) {
        self.schedule(now + delay);
    }

    /// Cancel the pending move and freeze any running animation.
    pub fn stop(&mut self) {
        if self.pending.take().is_some() {
            debug!("pending move cancelled");
        }
        self.phase = MovePhase::Idle;
    }

    pub fn pending(&self) -> Option<ScheduledTask> {
        self.pending
    }

    pub fn phase(&self) -> MovePhase {
        self.phase
    }

    pub fn state(&self) -> &DisplayState {
        &self.state
    }

    pub fn transform(&self) -> ViewTransform {
        self.state.transform
    }

    pub fn is_animating(&self) -> bool {
        !matches!(self.phase, MovePhase::Idle)
    }

    /// Earliest instant the owner needs to call back: the pending move, or the
    /// next animation frame while one is running.
    pub fn next_deadline(&self, now: Instant, frame_interval: Duration) -> Option<Instant> {
        let fire = self.pending.map(|task| task.due);
        if self.is_animating() {
            let frame = now + frame_interval;
            return Some(fire.map_or(frame, |due| due.min(frame)));
        }
        fire
    }

    /// Run the pending move if it is due.
    pub fn fire_if_due<R: Rng>(
        &mut self,
        now: Instant,
        wall_clock_ms: u64,
        rng: &mut R,
    ) -> Option<FireOutcome> {
        match self.pending {
            Some(task) if task.due <= now => {
                self.pending = None;
                Some(self.fire(now, wall_clock_ms, rng))
            }
            _ => None,
        }
    }

    /// Pick the next position, start the matching animation, and schedule the
    /// following move.
    pub fn fire<R: Rng>(&mut self, now: Instant, wall_clock_ms: u64, rng: &mut R) -> FireOutcome {
        let Some(views) = self.views else {
            debug!("move fired before views were registered; retrying");
            return self.retry(now, RetryReason::Unregistered);
        };

        let range = TravelRange::between(views.container, views.movable);
        trace!(x_range = range.x, y_range = range.y, "mover travel range");
        if range.is_zero() {
            return self.retry(now, RetryReason::NoTravel);
        }

        let target = Position::new(pick(rng, range.x), pick(rng, range.y));
        let jumped = !self.state.is_visible();
        if jumped {
            self.state.transform.position = target;
            self.state.transform.scale = 1.0;
            self.phase = MovePhase::GrowingIn {
                started: now,
                from: self.state.transform,
            };
        } else {
            self.phase = MovePhase::ShrinkingOut {
                started: now,
                from: self.state.transform,
                target,
            };
        }

        let next_in = next_move_delay(wall_clock_ms);
        self.schedule(now + next_in);
        debug!(
            x = target.x,
            y = target.y,
            jumped,
            next_in_ms = next_in.as_millis() as u64,
            "clock move started"
        );
        FireOutcome::Moved {
            target,
            jumped,
            next_in,
        }
    }

    /// Step the running animation to `now`.
    ///
    /// Returns the new transform when anything changed. Refresh failures are
    /// logged and the move carries on.
    pub fn advance(
        &mut self,
        now: Instant,
        refresher: &mut dyn ContentRefresher,
    ) -> Option<ViewTransform> {
        let before = self.state.transform;
        loop {
            match self.phase {
                MovePhase::Idle => break,
                MovePhase::ShrinkingOut {
                    started,
                    from,
                    target,
                } => {
                    let t = progress(now.saturating_duration_since(started), FADE_TIME);
                    let eased = Easing::Accelerate.apply(t);
                    self.state.transform.scale = lerp(from.scale, SHRUNK_SCALE, eased);
                    self.state.transform.alpha = lerp(from.alpha, 0.0, eased);
                    if t < 1.0 {
                        break;
                    }
                    self.phase = MovePhase::Jumping {
                        at: started + FADE_TIME,
                        target,
                    };
                }
                MovePhase::Jumping { at, target } => {
                    self.refresh_content(now, refresher);
                    self.state.transform.position = target;
                    self.phase = MovePhase::GrowingIn {
                        started: at,
                        from: self.state.transform,
                    };
                }
                MovePhase::GrowingIn { started, from } => {
                    let t = progress(now.saturating_duration_since(started), FADE_TIME);
                    let eased = Easing::Decelerate.apply(t);
                    self.state.transform.scale = lerp(from.scale, 1.0, eased);
                    self.state.transform.alpha = lerp(from.alpha, 1.0, eased);
                    if t >= 1.0 {
                        self.phase = MovePhase::Idle;
                        trace!("clock move finished");
                    }
                    break;
                }
            }
        }
        (self.state.transform != before).then_some(self.state.transform)
    }

    /// Refresh content outside of a move (registration, time change).
    pub fn refresh_content(&mut self, now: Instant, refresher: &mut dyn ContentRefresher) {
        match refresher.refresh() {
            Ok(()) => self.state.last_refresh = Some(now),
            Err(err) => warn!("content refresh failed: {err:#}"),
        }
    }

    fn retry(&mut self, now: Instant, reason: RetryReason) -> FireOutcome {
        self.schedule(now + RETRY_DELAY);
        FireOutcome::Retry {
            reason,
            delay: RETRY_DELAY,
        }
    }

    fn schedule(&mut self, due: Instant) {
        // At most one outstanding move per surface.
        self.pending = Some(ScheduledTask { due });
    }
}

fn pick<R: Rng>(rng: &mut R, range: f32) -> f32 {
    if range > 0.0 {
        rng.random_range(0.0..=range).floor()
    } else {
        0.0
    }
}

/// Delay until the next move so that the clock is fully visible again on
/// each minute boundary.
///
/// A move never starts before the previous shrink and grow have both finished.
pub fn next_move_delay(wall_clock_ms: u64) -> Duration {
    let into_minute = wall_clock_ms % MOVE_INTERVAL_MS;
    let mut delay = MOVE_INTERVAL_MS as i64 - into_minute as i64 - FADE_TIME_MS as i64;
    while delay < (2 * FADE_TIME_MS) as i64 {
        delay += MOVE_INTERVAL_MS as i64;
    }
    Duration::from_millis(delay as u64)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedMove {
    pub wall_clock_ms: u64,
    pub outcome: FireOutcome,
}

/// Run the mover against fixed extents without a surface.
///
/// Each fired move is allowed to finish before the next one. Stops early when
/// the clock has no room to move.
pub fn simulate_moves(
    container: Extent,
    movable: Extent,
    iterations: usize,
    start_wall_clock_ms: u64,
    seed: Option<u64>,
) -> Vec<PlannedMove> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let origin = Instant::now();
    let mut scheduler = MoveScheduler::new();
    scheduler.register_views(container, movable);
    scheduler.start(origin);

    let mut noop = || -> Result<()> { Ok(()) };
    let mut plan = Vec::with_capacity(iterations);
    for _ in 0..iterations {
        let Some(task) = scheduler.pending() else {
            break;
        };
        let elapsed = task.due.saturating_duration_since(origin);
        let wall_clock_ms = start_wall_clock_ms + elapsed.as_millis() as u64;
        let Some(outcome) = scheduler.fire_if_due(task.due, wall_clock_ms, &mut rng) else {
            break;
        };
        plan.push(PlannedMove {
            wall_clock_ms,
            outcome,
        });
        if matches!(
            outcome,
            FireOutcome::Retry {
                reason: RetryReason::NoTravel,
                ..
            }
        ) {
            break;
        }
        scheduler.advance(task.due + FADE_TIME * 2, &mut noop);
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn registered() -> MoveScheduler {
        let mut scheduler = MoveScheduler::new();
        scheduler.register_views(Extent::new(1000.0, 600.0), Extent::new(400.0, 200.0));
        scheduler
    }

    #[test]
    fn first_move_jumps_and_fades_in_without_refresh() {
        let t0 = Instant::now();
        let mut scheduler = registered();
        let outcome = scheduler.fire(t0, 0, &mut rng());
        assert!(matches!(outcome, FireOutcome::Moved { jumped: true, .. }));

        let mut refreshed = 0;
        let mut count = || -> Result<()> {
            refreshed += 1;
            Ok(())
        };
        let mid = scheduler.advance(t0 + FADE_TIME / 2, &mut count).unwrap();
        assert_eq!(mid.scale, 1.0);
        assert!(mid.alpha > 0.5, "decelerated fade-in should be past halfway");

        let end = scheduler.advance(t0 + FADE_TIME, &mut count).unwrap();
        assert_eq!(end.alpha, 1.0);
        assert_eq!(scheduler.phase(), MovePhase::Idle);
        assert_eq!(refreshed, 0);
    }

    #[test]
    fn visible_clock_shrinks_refreshes_then_grows() {
        let t0 = Instant::now();
        let mut scheduler = registered();
        let mut rng = rng();
        let mut noop = || -> Result<()> { Ok(()) };
        scheduler.fire(t0, 0, &mut rng);
        scheduler.advance(t0 + FADE_TIME, &mut noop);
        let start = scheduler.transform().position;

        let t1 = t0 + Duration::from_secs(60);
        let FireOutcome::Moved { target, jumped, .. } = scheduler.fire(t1, 57_000, &mut rng)
        else {
            panic!("expected a move");
        };
        assert!(!jumped);

        let refreshed = std::cell::Cell::new(0);
        let mut count = || -> Result<()> {
            refreshed.set(refreshed.get() + 1);
            Ok(())
        };
        let shrinking = scheduler.advance(t1 + FADE_TIME / 2, &mut count).unwrap();
        assert!(shrinking.scale < 1.0 && shrinking.scale > SHRUNK_SCALE);
        assert_eq!(shrinking.position, start);
        assert_eq!(refreshed.get(), 0);

        let snapped = scheduler.advance(t1 + FADE_TIME, &mut count).unwrap();
        assert_eq!(refreshed.get(), 1);
        assert_eq!(snapped.position, target);
        assert_eq!(snapped.alpha, 0.0);
        assert!((snapped.scale - SHRUNK_SCALE).abs() < 1e-6);

        let grown = scheduler.advance(t1 + FADE_TIME * 2, &mut count).unwrap();
        assert_eq!(grown.scale, 1.0);
        assert_eq!(grown.alpha, 1.0);
        assert_eq!(refreshed.get(), 1);
        assert!(scheduler.state().last_refresh.is_some());
    }

    #[test]
    fn refresh_failure_is_swallowed() {
        let t0 = Instant::now();
        let mut scheduler = registered();
        let mut noop = || -> Result<()> { Ok(()) };
        scheduler.fire(t0, 0, &mut rng());
        scheduler.advance(t0 + FADE_TIME, &mut noop);

        let t1 = t0 + Duration::from_secs(60);
        scheduler.fire(t1, 0, &mut rng());
        let mut failing = || -> Result<()> { Err(anyhow!("provider exploded")) };
        scheduler.advance(t1 + FADE_TIME * 2, &mut failing);
        assert_eq!(scheduler.phase(), MovePhase::Idle);
        assert_eq!(scheduler.transform().alpha, 1.0);
        assert!(scheduler.pending().is_some());
    }

    #[test]
    fn unregistered_fire_retries_shortly() {
        let t0 = Instant::now();
        let mut scheduler = MoveScheduler::new();
        scheduler.start(t0);
        let outcome = scheduler.fire_if_due(t0, 0, &mut rng()).unwrap();
        assert_eq!(
            outcome,
            FireOutcome::Retry {
                reason: RetryReason::Unregistered,
                delay: RETRY_DELAY
            }
        );
        assert_eq!(scheduler.pending().unwrap().due, t0 + RETRY_DELAY);
    }

    #[test]
    fn stop_cancels_pending_move() {
        let t0 = Instant::now();
        let mut scheduler = registered();
        scheduler.start(t0);
        scheduler.stop();
        assert!(scheduler.pending().is_none());
        assert!(scheduler.fire_if_due(t0, 0, &mut rng()).is_none());
    }

    #[test]
    fn rescheduling_replaces_the_pending_move() {
        let t0 = Instant::now();
        let mut scheduler = registered();
        scheduler.start_after(t0, Duration::from_secs(5));
        scheduler.start_after(t0, Duration::from_millis(250));
        assert_eq!(scheduler.pending().unwrap().due, t0 + Duration::from_millis(250));
    }

    #[test]
    fn not_due_yet_does_nothing() {
        let t0 = Instant::now();
        let mut scheduler = registered();
        scheduler.start_after(t0, Duration::from_secs(1));
        assert!(scheduler.fire_if_due(t0, 0, &mut rng()).is_none());
        assert!(scheduler.pending().is_some());
    }

    #[test]
    fn delay_aligns_to_minute_minus_fade() {
        assert_eq!(next_move_delay(10_000), Duration::from_millis(47_000));
        assert_eq!(next_move_delay(120_000), Duration::from_millis(57_000));
        assert_eq!(next_move_delay(57_000), Duration::from_millis(60_000));
        assert_eq!(next_move_delay(57_010), Duration::from_millis(59_990));
        // Too close to the boundary to finish a move: roll to the next minute.
        assert_eq!(next_move_delay(55_000), Duration::from_millis(62_000));
    }

    #[test]
    fn deadline_tracks_frames_while_animating() {
        let t0 = Instant::now();
        let frame = Duration::from_millis(33);
        let mut scheduler = registered();
        scheduler.start(t0 + Duration::from_secs(10));
        assert_eq!(
            scheduler.next_deadline(t0, frame),
            Some(t0 + Duration::from_secs(10))
        );
        scheduler.fire(t0, 0, &mut rng());
        assert_eq!(scheduler.next_deadline(t0, frame), Some(t0 + frame));
    }

    #[test]
    fn simulation_stops_when_clock_fills_container() {
        let plan = simulate_moves(
            Extent::new(400.0, 200.0),
            Extent::new(400.0, 200.0),
            5,
            0,
            Some(1),
        );
        assert_eq!(plan.len(), 1);
        assert!(matches!(
            plan[0].outcome,
            FireOutcome::Retry {
                reason: RetryReason::NoTravel,
                ..
            }
        ));
    }

    #[test]
    fn simulation_is_minute_aligned() {
        let plan = simulate_moves(
            Extent::new(1920.0, 1080.0),
            Extent::new(640.0, 320.0),
            4,
            0,
            Some(3),
        );
        assert_eq!(plan.len(), 4);
        for planned in &plan[1..] {
            assert_eq!(planned.wall_clock_ms % 60_000, 57_000);
        }
    }
}
