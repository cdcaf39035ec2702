//! Live notification stream.
//!
//! The handle is created by whoever owns the runtime and passed to the
//! session explicitly. Clones share one set of active notifications.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use super::{IconHandle, NotificationBadge};
use crate::events::NotificationEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationPriority {
    Min,
    Low,
    #[default]
    Default,
    High,
    Max,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PostedNotification {
    pub key: String,
    pub package: String,
    /// Small icon resource id inside `package`.
    #[serde(default)]
    pub icon: Option<u32>,
    #[serde(default)]
    pub priority: NotificationPriority,
    #[serde(default)]
    pub ongoing: bool,
}

impl PostedNotification {
    /// Minimum-priority and ongoing notifications never get a badge.
    pub fn is_badge_worthy(&self) -> bool {
        self.priority > NotificationPriority::Min && !self.ongoing
    }
}

#[derive(Debug, Error)]
pub enum IconError {
    #[error("notification from {package} carries no icon")]
    Missing { package: String },
    #[error("icon {resource} not found in {package}")]
    NotFound { package: String, resource: u32 },
    #[error("icon lookup for {package} failed: {reason}")]
    Lookup { package: String, reason: String },
}

pub trait IconResolver: Send + Sync {
    fn resolve(&self, package: &str, resource: u32) -> Result<IconHandle, IconError>;
}

#[derive(Debug, Default)]
struct ListenerState {
    connected: bool,
    active: BTreeMap<String, PostedNotification>,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationListenerHandle {
    inner: Arc<Mutex<ListenerState>>,
}

impl NotificationListenerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self) {
        let mut state = self.lock();
        if !state.connected {
            state.connected = true;
            info!("notification listener connected");
        }
    }

    /// Drop the connection and forget every active notification.
    pub fn disconnect(&self) {
        let mut state = self.lock();
        if state.connected {
            state.connected = false;
            state.active.clear();
            info!("notification listener disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn on_posted(&self, notification: PostedNotification) {
        debug!(key = %notification.key, package = %notification.package, "notification posted");
        self.lock()
            .active
            .insert(notification.key.clone(), notification);
    }

    pub fn on_removed(&self, key: &str) {
        if self.lock().active.remove(key).is_some() {
            debug!(key, "notification removed");
        }
    }

    pub fn apply(&self, event: NotificationEvent) {
        match event {
            NotificationEvent::Posted(notification) => self.on_posted(notification),
            NotificationEvent::Removed { key } => self.on_removed(&key),
        }
    }

    pub fn active_keys(&self) -> Vec<String> {
        self.lock().active.keys().cloned().collect()
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    /// One badge per posting package, skipping notifications whose icon
    /// cannot be resolved.
    pub fn badges(&self, icons: &dyn IconResolver) -> Vec<NotificationBadge> {
        let active: Vec<PostedNotification> = self.lock().active.values().cloned().collect();
        let mut badges = BTreeSet::new();
        for notification in active.iter().filter(|n| n.is_badge_worthy()) {
            match resolve_icon(icons, notification) {
                Ok(icon) => {
                    badges.insert(NotificationBadge::new(notification.package.clone(), icon));
                }
                Err(err) => debug!(key = %notification.key, "dropping badge: {err}"),
            }
        }
        badges.into_iter().collect()
    }

    fn lock(&self) -> MutexGuard<'_, ListenerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn resolve_icon(
    icons: &dyn IconResolver,
    notification: &PostedNotification,
) -> Result<IconHandle, IconError> {
    let resource = notification.icon.ok_or_else(|| IconError::Missing {
        package: notification.package.clone(),
    })?;
    icons.resolve(&notification.package, resource)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OddIconsOnly;

    impl IconResolver for OddIconsOnly {
        fn resolve(&self, package: &str, resource: u32) -> Result<IconHandle, IconError> {
            if resource % 2 == 1 {
                Ok(IconHandle::Package {
                    package: package.to_string(),
                    resource,
                })
            } else {
                Err(IconError::NotFound {
                    package: package.to_string(),
                    resource,
                })
            }
        }
    }

    fn posted(key: &str, package: &str, icon: u32) -> PostedNotification {
        PostedNotification {
            key: key.to_string(),
            package: package.to_string(),
            icon: Some(icon),
            priority: NotificationPriority::Default,
            ongoing: false,
        }
    }

    #[test]
    fn min_priority_and_ongoing_are_filtered() {
        let handle = NotificationListenerHandle::new();
        handle.connect();
        handle.on_posted(posted("1", "chat", 1));
        handle.on_posted(PostedNotification {
            priority: NotificationPriority::Min,
            ..posted("2", "weather", 1)
        });
        handle.on_posted(PostedNotification {
            ongoing: true,
            ..posted("3", "music", 1)
        });
        let ids: Vec<_> = handle
            .badges(&OddIconsOnly)
            .into_iter()
            .map(|badge| badge.source_id)
            .collect();
        assert_eq!(ids, vec!["chat".to_string()]);
    }

    #[test]
    fn unresolvable_icon_drops_only_that_badge() {
        let handle = NotificationListenerHandle::new();
        handle.on_posted(posted("1", "calendar", 2));
        handle.on_posted(posted("2", "chat", 3));
        handle.on_posted(PostedNotification {
            icon: None,
            ..posted("3", "bank", 1)
        });
        let badges = handle.badges(&OddIconsOnly);
        assert_eq!(badges.len(), 1);
        assert_eq!(badges[0].source_id, "chat");
    }

    #[test]
    fn one_badge_per_package() {
        let handle = NotificationListenerHandle::new();
        handle.on_posted(posted("a", "chat", 1));
        handle.on_posted(posted("b", "chat", 3));
        assert_eq!(handle.badges(&OddIconsOnly).len(), 1);
    }

    #[test]
    fn removal_and_disconnect_clear_state() {
        let handle = NotificationListenerHandle::new();
        let clone = handle.clone();
        handle.connect();
        clone.apply(NotificationEvent::Posted(posted("a", "chat", 1)));
        clone.apply(NotificationEvent::Posted(posted("b", "mail", 1)));
        handle.apply(NotificationEvent::Removed {
            key: "a".to_string(),
        });
        assert_eq!(handle.active_count(), 1);
        clone.disconnect();
        assert!(!handle.is_connected());
        assert_eq!(handle.active_count(), 0);
    }

    #[test]
    fn posted_notification_from_yaml() {
        let yaml = "key: k1\npackage: chat\nicon: 7\npriority: high\n";
        let parsed: PostedNotification = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed.priority, NotificationPriority::High);
        assert!(!parsed.ongoing);
        assert!(parsed.is_badge_worthy());
    }
}
