use anyhow::{Result, anyhow};
use clock_daydream::animation::{Extent, TravelRange};
use clock_daydream::scheduler::{
    FADE_TIME, FireOutcome, MovePhase, MoveScheduler, RETRY_DELAY, RetryReason,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::time::{Duration, Instant};

#[test]
fn zero_travel_retries_after_exactly_500ms_without_animation() {
    let t0 = Instant::now();
    let mut scheduler = MoveScheduler::new();
    scheduler.register_views(Extent::new(640.0, 320.0), Extent::new(640.0, 320.0));
    scheduler.start(t0);

    let outcome = scheduler
        .fire_if_due(t0, 0, &mut StdRng::seed_from_u64(1))
        .unwrap();
    assert_eq!(
        outcome,
        FireOutcome::Retry {
            reason: RetryReason::NoTravel,
            delay: Duration::from_millis(500),
        }
    );
    assert_eq!(RETRY_DELAY, Duration::from_millis(500));
    assert_eq!(scheduler.pending().unwrap().due, t0 + RETRY_DELAY);
    assert_eq!(scheduler.phase(), MovePhase::Idle);
    assert!(!scheduler.is_animating());
}

#[test]
fn targets_stay_within_travel_range() {
    let container = Extent::new(1280.0, 800.0);
    let movable = Extent::new(500.0, 790.0);
    let range = TravelRange::between(container, movable);
    let mut rng = StdRng::seed_from_u64(42);
    let mut noop = || -> Result<()> { Ok(()) };

    let mut scheduler = MoveScheduler::new();
    scheduler.register_views(container, movable);
    let mut now = Instant::now();
    for minute in 0..200u64 {
        let FireOutcome::Moved { target, .. } = scheduler.fire(now, minute * 60_000, &mut rng)
        else {
            panic!("expected a move");
        };
        assert!(range.contains(target), "{target:?} outside {range:?}");
        now += FADE_TIME * 2;
        scheduler.advance(now, &mut noop);
        assert_eq!(scheduler.transform().position, target);
    }
}

#[test]
fn refresh_failure_does_not_prevent_next_fire() {
    let t0 = Instant::now();
    let mut rng = StdRng::seed_from_u64(5);
    let mut scheduler = MoveScheduler::new();
    scheduler.register_views(Extent::new(1000.0, 600.0), Extent::new(200.0, 100.0));
    let mut failing = || -> Result<()> { Err(anyhow!("content provider crashed")) };

    scheduler.start(t0);
    scheduler.fire_if_due(t0, 0, &mut rng).unwrap();
    scheduler.advance(t0 + FADE_TIME, &mut failing);

    let second = scheduler.pending().unwrap().due;
    scheduler.fire_if_due(second, 57_000, &mut rng).unwrap();
    scheduler.advance(second + FADE_TIME * 2, &mut failing);
    assert_eq!(scheduler.phase(), MovePhase::Idle);

    let third = scheduler.pending().unwrap().due;
    assert!(third > second);
    assert!(matches!(
        scheduler.fire_if_due(third, 117_000, &mut rng),
        Some(FireOutcome::Moved { jumped: false, .. })
    ));
}
