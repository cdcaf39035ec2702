//! File-backed device: every query re-reads a YAML snapshot of the phone's
//! providers, so edits to the file show up on the next refresh.
//!
//! ```yaml
//! battery: { status: charging, plugged: usb, level: 45 }
//! next-alarm: "Mon 07:00"
//! mail:
//!   - account: me@example.com
//!     labels:
//!       - { canonical-name: "^i", unread-conversations: 2 }
//! sms: [{ read: false }, { read: true }]
//! call-log: [{ kind: missed, read: false }]
//! denied: [call-log]
//! notifications:
//!   connected: true
//!   active:
//!     - { key: "0|chat|1", package: chat, icon: 3 }
//! icons:
//!   chat: [3]
//! ```
//!
//! A missing section reports its provider as unavailable.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use super::DeviceStatus;
use crate::content::BatteryStatus;
use crate::events::NotificationEvent;
use crate::notifications::{
    CallLogSource, IconError, IconHandle, IconResolver, MailLabel, MailLabelSource,
    NotificationListenerHandle, PostedNotification, SmsInboxSource, SourceError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    Battery,
    Alarm,
    Mail,
    Sms,
    CallLog,
}

impl Provider {
    fn name(self) -> &'static str {
        match self {
            Provider::Battery => "battery",
            Provider::Alarm => "alarm",
            Provider::Mail => "mail",
            Provider::Sms => "sms",
            Provider::CallLog => "call-log",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MailAccount {
    pub account: String,
    #[serde(default)]
    pub labels: Vec<SnapshotLabel>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SnapshotLabel {
    pub canonical_name: String,
    #[serde(default)]
    pub unread_conversations: u32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SmsMessage {
    #[serde(default)]
    pub read: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallKind {
    Incoming,
    Outgoing,
    Missed,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CallEntry {
    pub kind: CallKind,
    #[serde(default)]
    pub read: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotificationStream {
    pub connected: bool,
    pub active: Vec<PostedNotification>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DeviceSnapshot {
    pub battery: Option<BatteryStatus>,
    pub next_alarm: Option<String>,
    pub mail: Option<Vec<MailAccount>>,
    pub sms: Option<Vec<SmsMessage>>,
    pub call_log: Option<Vec<CallEntry>>,
    pub denied: BTreeSet<Provider>,
    pub notifications: NotificationStream,
    /// Icon resources each package ships.
    pub icons: BTreeMap<String, Vec<u32>>,
}

impl DeviceSnapshot {
    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    fn section<'a, T>(&self, provider: Provider, value: &'a Option<T>) -> Result<&'a T, SourceError> {
        if self.denied.contains(&provider) {
            return Err(SourceError::PermissionDenied(provider.name()));
        }
        value
            .as_ref()
            .ok_or(SourceError::Unavailable(provider.name()))
    }

    pub fn battery(&self) -> Result<BatteryStatus, SourceError> {
        self.section(Provider::Battery, &self.battery).copied()
    }

    pub fn next_alarm(&self) -> Result<Option<String>, SourceError> {
        if self.denied.contains(&Provider::Alarm) {
            return Err(SourceError::PermissionDenied(Provider::Alarm.name()));
        }
        Ok(self.next_alarm.clone())
    }

    pub fn mail_accounts(&self) -> Result<Vec<String>, SourceError> {
        let accounts = self.section(Provider::Mail, &self.mail)?;
        Ok(accounts.iter().map(|entry| entry.account.clone()).collect())
    }

    pub fn labels(&self, account: &str) -> Result<Vec<MailLabel>, SourceError> {
        let accounts = self.section(Provider::Mail, &self.mail)?;
        let entry = accounts
            .iter()
            .find(|entry| entry.account == account)
            .ok_or(SourceError::NoCursor("mail labels"))?;
        Ok(entry
            .labels
            .iter()
            .map(|label| MailLabel {
                canonical_name: label.canonical_name.clone(),
                unread_conversations: label.unread_conversations,
            })
            .collect())
    }

    pub fn unread_messages(&self) -> Result<u32, SourceError> {
        let inbox = self.section(Provider::Sms, &self.sms)?;
        Ok(inbox.iter().filter(|message| !message.read).count() as u32)
    }

    pub fn unread_missed_calls(&self) -> Result<u32, SourceError> {
        let calls = self.section(Provider::CallLog, &self.call_log)?;
        Ok(calls
            .iter()
            .filter(|call| call.kind == CallKind::Missed && !call.read)
            .count() as u32)
    }

    pub fn resolve_icon(&self, package: &str, resource: u32) -> Result<IconHandle, IconError> {
        let shipped = self
            .icons
            .get(package)
            .is_some_and(|ids| ids.contains(&resource));
        if shipped {
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

    /// Push the snapshot's notification stream into the listener handle.
    /// Stream events that turn the `known` keys into the snapshot's active set.
    fn notification_events(&self, known: &[String]) -> Vec<NotificationEvent> {
        let active = &self.notifications.active;
        let removed = known
            .iter()
            .filter(|key| !active.iter().any(|posted| &posted.key == *key))
            .map(|key| NotificationEvent::Removed { key: key.clone() });
        let posted = active.iter().cloned().map(NotificationEvent::Posted);
        removed.chain(posted).collect()
    }

    pub fn sync_listener(&self, listener: &NotificationListenerHandle) {
        if self.notifications.connected {
            listener.connect();
            for event in self.notification_events(&listener.active_keys()) {
                listener.apply(event);
            }
        } else {
            listener.disconnect();
        }
    }
}

/// Path to a snapshot that is re-read on every query.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<DeviceSnapshot, SourceError> {
        let text = fs::read_to_string(&self.path).map_err(|source| SourceError::Read {
            path: self.path.clone(),
            source,
        })?;
        let snapshot =
            DeviceSnapshot::from_yaml_str(&text).map_err(|source| SourceError::Malformed {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = %self.path.display(), "device snapshot loaded");
        Ok(snapshot)
    }
}

impl DeviceStatus for SnapshotFile {
    fn battery(&self) -> Result<BatteryStatus, SourceError> {
        self.load()?.battery()
    }

    fn next_alarm(&self) -> Result<Option<String>, SourceError> {
        self.load()?.next_alarm()
    }
}

impl MailLabelSource for SnapshotFile {
    fn mail_accounts(&self) -> Result<Vec<String>, SourceError> {
        self.load()?.mail_accounts()
    }

    fn labels(&self, account: &str) -> Result<Vec<MailLabel>, SourceError> {
        self.load()?.labels(account)
    }
}

impl SmsInboxSource for SnapshotFile {
    fn unread_messages(&self) -> Result<u32, SourceError> {
        self.load()?.unread_messages()
    }
}

impl CallLogSource for SnapshotFile {
    fn unread_missed_calls(&self) -> Result<u32, SourceError> {
        self.load()?.unread_missed_calls()
    }
}

impl IconResolver for SnapshotFile {
    fn resolve(&self, package: &str, resource: u32) -> Result<IconHandle, IconError> {
        let snapshot = self.load().map_err(|err| IconError::Lookup {
            package: package.to_string(),
            reason: err.to_string(),
        })?;
        snapshot.resolve_icon(package, resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChargeState;
    use crate::notifications::sources::{check_mail, check_missed_calls, check_sms};
    use std::io::Write;

    const SNAPSHOT: &str = r#"
battery: { status: charging, plugged: ac, level: 80 }
next-alarm: "Mon 07:00"
mail:
  - account: me@example.com
    labels:
      - { canonical-name: "^i", unread-conversations: 1 }
sms: [{ read: false }, { read: true }, {}]
call-log:
  - { kind: missed, read: true }
  - { kind: incoming }
denied: [call-log]
notifications:
  connected: true
  active:
    - { key: "a", package: chat, icon: 3 }
icons:
  chat: [3]
"#;

    #[test]
    fn snapshot_answers_provider_queries() {
        let snapshot = DeviceSnapshot::from_yaml_str(SNAPSHOT).unwrap();
        let battery = snapshot.battery().unwrap();
        assert_eq!(battery.status, ChargeState::Charging);
        assert_eq!(battery.scale, 100);
        assert_eq!(snapshot.next_alarm().unwrap().as_deref(), Some("Mon 07:00"));
        assert_eq!(snapshot.unread_messages().unwrap(), 2);
        assert!(matches!(
            snapshot.unread_missed_calls(),
            Err(SourceError::PermissionDenied("call-log"))
        ));
        assert!(snapshot.resolve_icon("chat", 3).is_ok());
        assert!(snapshot.resolve_icon("chat", 4).is_err());
    }

    #[test]
    fn empty_snapshot_reports_unavailable() {
        let snapshot = DeviceSnapshot::from_yaml_str("").unwrap();
        assert!(matches!(
            snapshot.battery(),
            Err(SourceError::Unavailable("battery"))
        ));
        assert_eq!(snapshot.next_alarm().unwrap(), None);
        assert!(!snapshot.notifications.connected);
    }

    #[test]
    fn file_backed_checks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SNAPSHOT.as_bytes()).unwrap();
        let device = SnapshotFile::new(file.path());
        assert!(check_mail(&device).is_some());
        assert!(check_sms(&device).is_some());
        assert!(check_missed_calls(&device).is_none());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let device = SnapshotFile::new("/nonexistent/device.yaml");
        assert!(matches!(device.battery(), Err(SourceError::Read { .. })));
        assert!(check_sms(&device).is_none());
    }

    #[test]
    fn resync_drops_stale_keys_and_posts_current_ones() {
        let snapshot = DeviceSnapshot::from_yaml_str(SNAPSHOT).unwrap();
        let listener = NotificationListenerHandle::new();
        listener.connect();
        listener.on_posted(PostedNotification {
            key: "gone".to_string(),
            package: "weather".to_string(),
            icon: Some(1),
            priority: Default::default(),
            ongoing: false,
        });

        snapshot.sync_listener(&listener);
        assert_eq!(listener.active_keys(), vec!["a".to_string()]);
    }

    #[test]
    fn sync_listener_follows_connection_flag() {
        let snapshot = DeviceSnapshot::from_yaml_str(SNAPSHOT).unwrap();
        let listener = NotificationListenerHandle::new();
        snapshot.sync_listener(&listener);
        assert!(listener.is_connected());
        assert_eq!(listener.active_count(), 1);

        DeviceSnapshot::default().sync_listener(&listener);
        assert!(!listener.is_connected());
        assert_eq!(listener.active_count(), 0);
    }
}
