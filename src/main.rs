use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser};
use humantime::parse_rfc3339;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use clock_daydream::config::Configuration;
use clock_daydream::events::{ChargeState, FinishReason, ShellCommand, SystemBroadcast};
use clock_daydream::notifications::{NotificationListenerHandle, NotificationSources};
use clock_daydream::platform::SnapshotFile;
use clock_daydream::quarter_hour::next_quarter_hour;
use clock_daydream::scheduler::{FireOutcome, simulate_moves};
use clock_daydream::session::{
    BadgeProviders, IdleDisplaySession, SessionLayout, SessionOptions, SessionVariant,
};
use clock_daydream::surface::LogSurface;
use clock_daydream::tasks;
use clock_daydream::tasks::shell::{ShellExit, ShellInputs, WallClock};

#[derive(Debug, Parser)]
#[command(
    name = "clock-daydream",
    version,
    about = "idle clock display with burn-in protection and notification badges"
)]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// Override the configured variant
    #[arg(long, value_enum)]
    variant: Option<SessionVariant>,
    /// Deterministic RNG seed for clock placement
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,
    /// Print the planned clock moves without starting the display
    #[arg(long = "dry-run-moves", value_name = "ITERATIONS")]
    dry_run_moves: Option<usize>,
    /// Pretend the wall clock starts at this RFC 3339 instant
    #[arg(long, value_name = "RFC3339")]
    now: Option<String>,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("info").add_directive("clock_daydream=debug".parse()?),
        _ => EnvFilter::new("info").add_directive("clock_daydream=trace".parse()?),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        config,
        variant,
        seed,
        dry_run_moves,
        now,
        verbose,
    } = Args::parse();
    init_tracing(verbose)?;

    let start: Option<DateTime<Utc>> = match now {
        Some(ts) => Some(parse_rfc3339(&ts).context("failed to parse --now")?.into()),
        None => None,
    };

    let mut cfg = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?
        .validated()
        .context("invalid configuration values")?;
    if let Some(variant) = variant {
        cfg.variant = variant;
    }
    tracing::info!(
        "Loaded configuration from {}:\n{:#?}",
        config.display(),
        cfg
    );

    if let Some(iterations) = dry_run_moves {
        run_moves_dry_run(&cfg, iterations, start.unwrap_or_else(Utc::now), seed)?;
        return Ok(());
    }

    let mut prefs = cfg
        .load_preferences()
        .context("failed to load preferences")?;
    let device = Arc::new(SnapshotFile::new(&cfg.device_snapshot_path));
    let listener = NotificationListenerHandle::new();
    match device.load() {
        Ok(snapshot) => snapshot.sync_listener(&listener),
        Err(err) => tracing::warn!("device snapshot unreadable at startup: {err}"),
    }

    let (broadcast_tx, broadcast_rx) = mpsc::channel::<SystemBroadcast>(16); // Signals/ticker -> Shell
    let (command_tx, command_rx) = mpsc::channel::<ShellCommand>(16); // Console/watcher -> Shell

    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    spawn_signal_bridge(cancel.clone(), broadcast_tx.clone());

    if io::stdin().is_terminal() {
        let stdin = io::BufReader::new(io::stdin());
        if let Err(err) = tasks::console::spawn(stdin, command_tx.clone()) {
            tracing::warn!("failed to start console reader: {err}");
        }
    } else {
        tracing::debug!("stdin is not a terminal; skipping console input");
    }

    let mut tasks = JoinSet::new();

    // File watcher
    tasks.spawn({
        let preferences = cfg.preferences_path.clone();
        let snapshot = cfg.device_snapshot_path.clone();
        let listener = listener.clone();
        let commands = command_tx.clone();
        let cancel = cancel.clone();
        async move {
            tasks::watch::run(preferences, snapshot, listener, commands, cancel)
                .await
                .context("watch task failed")
        }
    });

    let providers = BadgeProviders {
        sources: NotificationSources::from_shared(device.clone()),
        listener,
        icons: device.clone(),
    };
    let layout = SessionLayout {
        container: cfg.surface.container(),
        clock: cfg.surface.clock(),
    };
    let clock = start.map(WallClock::starting_at).unwrap_or_default();

    let mut inputs = ShellInputs {
        broadcasts: broadcast_rx,
        broadcast_tx,
        commands: command_rx,
    };
    let mut variant = cfg.variant;
    loop {
        let session = IdleDisplaySession::new(
            SessionOptions::for_variant(variant),
            layout,
            prefs.clone(),
            LogSurface::new(),
            device.clone(),
            providers.clone(),
            seed,
        );
        let exit = tasks::shell::run(
            session,
            &mut inputs,
            cancel.clone(),
            cfg.frame_interval,
            clock,
        )
        .await
        .context("shell task failed");
        match exit {
            Ok(ShellExit {
                reason: FinishReason::HandedOff,
                preferences,
            }) if variant == SessionVariant::Dream => {
                tracing::info!("dream handed off; starting screensaver");
                variant = SessionVariant::Screensaver;
                prefs = preferences;
            }
            Ok(ShellExit { reason, .. }) => {
                tracing::info!(?reason, "idle display finished");
                break;
            }
            Err(e) => {
                tracing::error!("{e:?}");
                break;
            }
        }
    }
    // Ensure other tasks are asked to stop
    cancel.cancel();

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
    }

    Ok(())
}

#[cfg(unix)]
fn spawn_signal_bridge(cancel: CancellationToken, broadcasts: mpsc::Sender<SystemBroadcast>) {
    tokio::spawn(async move {
        let (mut usr1, mut usr2, mut hup) = match (
            signal(SignalKind::user_defined1()),
            signal(SignalKind::user_defined2()),
            signal(SignalKind::hangup()),
        ) {
            (Ok(usr1), Ok(usr2), Ok(hup)) => (usr1, usr2, hup),
            _ => {
                tracing::warn!("failed to register signal handlers");
                return;
            }
        };
        let mut plugged = true;
        loop {
            let broadcast = tokio::select! {
                _ = cancel.cancelled() => break,
                Some(()) = usr1.recv() => {
                    plugged = !plugged;
                    tracing::info!(plugged, "SIGUSR1 received; toggling power");
                    if plugged {
                        SystemBroadcast::PowerConnected
                    } else {
                        SystemBroadcast::PowerDisconnected { charging: ChargeState::Discharging }
                    }
                }
                Some(()) = usr2.recv() => {
                    tracing::info!("SIGUSR2 received; user present");
                    SystemBroadcast::UserPresent
                }
                Some(()) = hup.recv() => {
                    tracing::info!("SIGHUP received; time changed");
                    SystemBroadcast::TimeChanged
                }
                else => break,
            };
            if let Err(err) = broadcasts.send(broadcast).await {
                tracing::warn!("failed to forward signal: {err}");
                break;
            }
        }
    });
}

fn run_moves_dry_run(
    cfg: &Configuration,
    iterations: usize,
    start: DateTime<Utc>,
    seed: Option<u64>,
) -> Result<()> {
    let prefs = cfg
        .load_preferences()
        .context("failed to load preferences")?;
    let face = prefs.clock_face();
    let clock = cfg.surface.clock().scaled(face.resize_ratio);
    let start_ms = u64::try_from(start.timestamp_millis()).context("--now before 1970")?;

    println!(
        "# clock move dry run\n# container: {}x{}\n# clock: {}x{} (style {:?}, ratio {})\n# now: {}\n# iterations: {}\n# seed: {}\n",
        cfg.surface.width,
        cfg.surface.height,
        clock.width,
        clock.height,
        face.style,
        face.resize_ratio,
        start.to_rfc3339(),
        iterations,
        seed.map_or_else(|| "(random)".to_string(), |s| s.to_string())
    );

    let tz = prefs.timezone_or_utc();
    println!(
        "# next quarter-hour tick: {}\n",
        next_quarter_hour(&start.with_timezone(&tz)).to_rfc3339()
    );

    let plan = simulate_moves(cfg.surface.container(), clock, iterations, start_ms, seed);
    println!("# planned moves:");
    if plan.is_empty() {
        println!("(nothing planned)");
    }
    for (idx, planned) in plan.iter().enumerate() {
        let at = DateTime::<Utc>::from_timestamp_millis(planned.wall_clock_ms as i64)
            .map(|at| at.with_timezone(&tz).to_rfc3339())
            .unwrap_or_else(|| planned.wall_clock_ms.to_string());
        match planned.outcome {
            FireOutcome::Moved {
                target,
                jumped,
                next_in,
            } => println!(
                "  {:>4}: {} -> ({:>5}, {:>5}) {} next in {}",
                idx + 1,
                at,
                target.x,
                target.y,
                if jumped { "fade-in" } else { "shrink/grow" },
                humantime::format_duration(next_in)
            ),
            FireOutcome::Retry { reason, delay } => println!(
                "  {:>4}: {} retry in {} ({:?})",
                idx + 1,
                at,
                humantime::format_duration(delay),
                reason
            ),
        }
    }
    Ok(())
}
