//! The task that owns the session and its surface.
//!
//! Everything that touches the surface happens here. Badge queries run on
//! blocking workers and report back over a channel; the session decides
//! whether a late result still counts.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use prefs_model::UserPreferences;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::events::{FinishReason, ShellCommand, SystemBroadcast};
use crate::quarter_hour;
use crate::session::{AttachOutcome, BadgeQueryDone, IdleDisplaySession};
use crate::surface::Surface;

/// Upper bound on a single wait when nothing is scheduled.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// Wall clock with an optional fixed offset, so `--now` shifts the whole run.
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    offset: TimeDelta,
}

impl Default for WallClock {
    fn default() -> Self {
        Self {
            offset: TimeDelta::zero(),
        }
    }
}

impl WallClock {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            offset: start.signed_duration_since(Utc::now()),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        Utc::now() + self.offset
    }
}

pub struct ShellInputs {
    pub broadcasts: mpsc::Receiver<SystemBroadcast>,
    /// Handed to the quarter-hour ticker while the session is active.
    pub broadcast_tx: mpsc::Sender<SystemBroadcast>,
    pub commands: mpsc::Receiver<ShellCommand>,
}

/// How a session ended, with the preferences it held at that point.
#[derive(Debug, Clone)]
pub struct ShellExit {
    pub reason: FinishReason,
    pub preferences: UserPreferences,
}

#[instrument(skip_all, fields(variant = ?session.options().variant))]
pub async fn run<S: Surface>(
    mut session: IdleDisplaySession<S>,
    inputs: &mut ShellInputs,
    cancel: CancellationToken,
    frame_interval: Duration,
    clock: WallClock,
) -> Result<ShellExit> {
    let ShellInputs {
        broadcasts,
        broadcast_tx,
        commands,
    } = inputs;

    if session.attach(Instant::now(), clock.now()) == AttachOutcome::HandedOff {
        return Ok(ShellExit {
            reason: FinishReason::HandedOff,
            preferences: session.preferences().clone(),
        });
    }

    let tz = session.preferences().timezone_or_utc();
    let ticker_cancel = cancel.child_token();
    let ticker = tokio::spawn(quarter_hour::run(
        tz,
        ticker_cancel.clone(),
        broadcast_tx.clone(),
    ));

    let (done_tx, mut done_rx) = mpsc::channel::<BadgeQueryDone>(4);

    let reason = loop {
        if let Some(query) = session.take_badge_query() {
            let done_tx = done_tx.clone();
            tokio::task::spawn_blocking(move || {
                let done = query.run();
                if done_tx.blocking_send(done).is_err() {
                    debug!("shell gone; badge result dropped");
                }
            });
        }

        let now = Instant::now();
        let wait = session
            .next_deadline(now, frame_interval)
            .map_or(IDLE_WAIT, |deadline| deadline.saturating_duration_since(now));

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancel received; detaching idle display");
                break session.detach(FinishReason::Detached);
            }
            Some(broadcast) = broadcasts.recv() => {
                debug!(?broadcast, "system broadcast");
                if let Some(reason) = session.handle_broadcast(broadcast, Instant::now(), clock.now()) {
                    break reason;
                }
            }
            Some(command) = commands.recv() => {
                debug!(?command, "shell command");
                if let Some(reason) = session.handle_command(command, Instant::now(), clock.now()) {
                    break reason;
                }
            }
            Some(done) = done_rx.recv() => {
                session.complete_badge_query(done);
            }
            _ = sleep(wait) => {
                session.tick(Instant::now(), clock.now());
            }
        }
    };

    ticker_cancel.cancel();
    match ticker.await.context("quarter-hour task panicked")? {
        Ok(()) => {}
        Err(err) => warn!("quarter-hour task failed: {err:?}"),
    }
    Ok(ShellExit {
        reason,
        preferences: session.preferences().clone(),
    })
}
