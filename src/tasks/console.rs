//! Terminal input standing in for touch and rotation.
//!
//! Each line typed on stdin is one command: `resize <width> <height>`
//! simulates a configuration change, anything else counts as the user
//! touching the screen. Closing stdin detaches the display.
//!
//! The reader runs on a plain OS thread rather than the runtime's blocking
//! pool, so a read that never returns does not hold up runtime shutdown.

use std::io::{self, BufRead};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::Sender;
use tracing::{info, warn};

use crate::events::ShellCommand;

pub fn parse_line(line: &str) -> ShellCommand {
    let mut words = line.split_whitespace();
    if words.next() == Some("resize") {
        let dims: Vec<f32> = words.filter_map(|word| word.parse().ok()).collect();
        if let &[width, height] = dims.as_slice() {
            if width > 0.0 && height > 0.0 {
                return ShellCommand::ConfigurationChanged { width, height };
            }
        }
        warn!(line, "ignoring malformed resize; treating as interaction");
    }
    ShellCommand::UserInteraction
}

/// Start a detached reader thread forwarding `input` line by line.
pub fn spawn<R>(input: R, commands: Sender<ShellCommand>) -> io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("console".into())
        .spawn(move || forward_lines(input, commands))
}

fn forward_lines<R: BufRead>(input: R, commands: Sender<ShellCommand>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!("stdin watcher failed: {err}");
                break;
            }
        };
        if commands.blocking_send(parse_line(&line)).is_err() {
            return;
        }
    }
    info!("stdin closed; detaching");
    let _ = commands.blocking_send(ShellCommand::Detach);
}
