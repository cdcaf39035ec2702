//! Notification badges and the grid they are shown in.

pub mod listener;
pub mod sources;

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

pub use listener::{
    IconError, IconResolver, NotificationListenerHandle, NotificationPriority, PostedNotification,
};
pub use sources::{
    CallLogSource, MailLabel, MailLabelSource, NotificationSources, SmsInboxSource, SourceError,
};

/// Badges per grid row.
pub const MAX_ICONS_PER_ROW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinIcon {
    Mail,
    Sms,
    MissedCall,
}

/// Opaque reference to the image drawn for a badge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IconHandle {
    Builtin(BuiltinIcon),
    /// Icon resource owned by the app that posted the notification.
    Package { package: String, resource: u32 },
}

/// One pending notification category. Identity is the source id alone.
#[derive(Debug, Clone)]
pub struct NotificationBadge {
    pub source_id: String,
    pub icon: IconHandle,
}

impl NotificationBadge {
    pub fn new(source_id: impl Into<String>, icon: IconHandle) -> Self {
        Self {
            source_id: source_id.into(),
            icon,
        }
    }

    pub fn builtin(icon: BuiltinIcon) -> Self {
        let source_id = match icon {
            BuiltinIcon::Mail => "builtin:mail",
            BuiltinIcon::Sms => "builtin:sms",
            BuiltinIcon::MissedCall => "builtin:missed-call",
        };
        Self::new(source_id, IconHandle::Builtin(icon))
    }
}

impl PartialEq for NotificationBadge {
    fn eq(&self, other: &Self) -> bool {
        self.source_id == other.source_id
    }
}

impl Eq for NotificationBadge {}

impl Hash for NotificationBadge {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source_id.hash(state);
    }
}

impl PartialOrd for NotificationBadge {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NotificationBadge {
    fn cmp(&self, other: &Self) -> Ordering {
        self.source_id.cmp(&other.source_id)
    }
}

/// Badges laid out in rows of at most [`MAX_ICONS_PER_ROW`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BadgeGrid {
    rows: Vec<Vec<NotificationBadge>>,
}

impl BadgeGrid {
    pub fn layout<I>(badges: I, per_row: usize) -> Self
    where
        I: IntoIterator<Item = NotificationBadge>,
    {
        let per_row = per_row.max(1);
        let mut rows = Vec::new();
        let mut row = Vec::with_capacity(per_row);
        for badge in badges {
            row.push(badge);
            if row.len() == per_row {
                rows.push(std::mem::replace(&mut row, Vec::with_capacity(per_row)));
            }
        }
        if !row.is_empty() {
            rows.push(row);
        }
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<NotificationBadge>] {
        &self.rows
    }

    pub fn row_lengths(&self) -> Vec<usize> {
        self.rows.iter().map(Vec::len).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Badge set staged by a worker thread before the UI task commits it.
#[derive(Debug, Clone, Default)]
pub struct ProvisionalBadges {
    inner: Arc<Mutex<BTreeSet<NotificationBadge>>>,
}

impl ProvisionalBadges {
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn add(&self, badge: NotificationBadge) {
        self.lock().insert(badge);
    }

    pub fn snapshot(&self) -> BTreeSet<NotificationBadge> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<NotificationBadge>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Collects badges off the UI task and publishes them as a grid on commit.
///
/// `clear` and `add_notification` may run on any thread; `commit` belongs to
/// the task that owns the surface.
#[derive(Debug, Default)]
pub struct NotificationAggregator {
    provisional: ProvisionalBadges,
    committed: BTreeSet<NotificationBadge>,
    grid: BadgeGrid,
}

impl NotificationAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for worker threads to stage badges.
    pub fn provisional(&self) -> ProvisionalBadges {
        self.provisional.clone()
    }

    pub fn clear(&self) {
        self.provisional.clear();
    }

    pub fn add_notification(&self, badge: NotificationBadge) {
        self.provisional.add(badge);
    }

    /// Copy the staged set into the displayed set and rebuild the grid.
    pub fn commit(&mut self) -> &BadgeGrid {
        self.committed = self.provisional.snapshot();
        self.grid = BadgeGrid::layout(self.committed.iter().cloned(), MAX_ICONS_PER_ROW);
        debug!(
            badges = self.committed.len(),
            rows = self.grid.rows().len(),
            "notification badges committed"
        );
        &self.grid
    }

    pub fn committed(&self) -> &BTreeSet<NotificationBadge> {
        &self.committed
    }

    pub fn grid(&self) -> &BadgeGrid {
        &self.grid
    }
}
