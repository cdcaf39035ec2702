use chrono::{TimeZone, Timelike, Utc};
use clock_daydream::events::SystemBroadcast;
use clock_daydream::quarter_hour::{self, MAX_GAP, next_quarter_hour};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[test]
fn from_22_37_lands_on_30_01() {
    let now = Utc.with_ymd_and_hms(2026, 10, 18, 14, 22, 37).unwrap();
    let next = next_quarter_hour(&now);
    assert_eq!((next.hour(), next.minute(), next.second()), (14, 30, 1));
    let gap = next.signed_duration_since(now).num_milliseconds();
    assert!(gap > 0 && gap as u128 <= MAX_GAP.as_millis());
}

#[test]
fn gap_stays_in_bounds_across_an_hour() {
    let base = Utc.with_ymd_and_hms(2026, 10, 18, 14, 0, 0).unwrap();
    for seconds in (0..3600).step_by(7) {
        let now = base + chrono::Duration::seconds(seconds);
        let next = next_quarter_hour(&now);
        let gap = next.signed_duration_since(now).num_milliseconds();
        assert!(gap > 0, "non-positive gap at {now}");
        assert!(gap <= 901_000, "gap {gap} too long at {now}");
        assert_eq!(next.minute() % 15, 0);
        assert_eq!(next.second(), 1);
    }
}

#[tokio::test]
async fn ticker_stops_on_cancel() {
    let (tx, mut rx) = mpsc::channel::<SystemBroadcast>(4);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(quarter_hour::run(chrono_tz::UTC, cancel.clone(), tx));

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("ticker did not stop")
        .expect("ticker panicked");
    assert!(result.is_ok());
    assert!(rx.recv().await.is_none());
}
