pub mod animation;
pub mod config;
pub mod content;
pub mod events;
pub mod notifications;
pub mod platform;
pub mod quarter_hour;
pub mod scheduler;
pub mod session;
pub mod surface;
pub mod tasks {
    pub mod console;
    pub mod shell;
    pub mod watch;
}
