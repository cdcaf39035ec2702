//! Repeating tick on every quarter hour, used to roll the date and alarm
//! text over even in time zones that are not hour-aligned.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::events::SystemBroadcast;

/// Longest legitimate wait until the next tick: a full quarter plus the one
/// second offset.
pub const MAX_GAP: Duration = Duration::from_millis(901_000);

/// One second past the next quarter-hour boundary after `now`.
pub fn next_quarter_hour<Z: TimeZone>(now: &DateTime<Z>) -> DateTime<Z> {
    let minute = now.minute();
    let base = now
        .clone()
        .with_second(1)
        .and_then(|at| at.with_nanosecond(0))
        .unwrap_or_else(|| now.clone());
    let next = base + ChronoDuration::minutes(i64::from(15 - minute % 15));

    let gap_ms = next
        .clone()
        .signed_duration_since(now.clone())
        .num_milliseconds();
    if gap_ms <= 0 || gap_ms as u128 > MAX_GAP.as_millis() {
        error!(gap_ms, "quarter-hour alarm calculation error");
    }
    next
}

pub async fn run(
    tz: Tz,
    cancel: CancellationToken,
    broadcasts: mpsc::Sender<SystemBroadcast>,
) -> Result<()> {
    loop {
        let now = Utc::now().with_timezone(&tz);
        let next = next_quarter_hour(&now);
        let wait = next
            .clone()
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        debug!(%next, wait_secs = wait.as_secs_f64(), "quarter-hour tick armed");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(wait) => {
                broadcasts
                    .send(SystemBroadcast::QuarterHour)
                    .await
                    .context("failed to deliver quarter-hour tick")?;
            }
        }
    }
    Ok(())
}
