//! Polled notification sources: unread mail, unread SMS, missed calls.
//!
//! Each check is a blocking query against an external provider. A provider
//! that is missing, refuses access, or returns nothing counts as "no badge";
//! the failure is logged and never reaches the caller.

use std::path::PathBuf;
use std::sync::Arc;

use prefs_model::NotificationToggles;
use thiserror::Error;
use tracing::{debug, warn};

use super::{BuiltinIcon, NotificationBadge};

/// Canonical name of the mail inbox label.
pub const INBOX_LABEL: &str = "^i";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{0} provider is not available")]
    Unavailable(&'static str),
    #[error("permission denied reading {0}")]
    PermissionDenied(&'static str),
    #[error("{0} query returned no cursor")]
    NoCursor(&'static str),
    #[error("failed to read device snapshot {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed device snapshot {path}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailLabel {
    pub canonical_name: String,
    pub unread_conversations: u32,
}

pub trait MailLabelSource: Send + Sync {
    fn mail_accounts(&self) -> Result<Vec<String>, SourceError>;
    fn labels(&self, account: &str) -> Result<Vec<MailLabel>, SourceError>;
}

pub trait SmsInboxSource: Send + Sync {
    fn unread_messages(&self) -> Result<u32, SourceError>;
}

pub trait CallLogSource: Send + Sync {
    /// Missed calls the user has not looked at yet.
    fn unread_missed_calls(&self) -> Result<u32, SourceError>;
}

/// Unread conversations in the inbox of any mail account.
pub fn check_mail(source: &dyn MailLabelSource) -> Option<NotificationBadge> {
    let accounts = absent_on_error("mail", source.mail_accounts())?;
    for account in &accounts {
        let Some(labels) = absent_on_error("mail", source.labels(account)) else {
            continue;
        };
        let inbox_unread = labels
            .iter()
            .filter(|label| label.canonical_name == INBOX_LABEL)
            .map(|label| label.unread_conversations)
            .sum::<u32>();
        if inbox_unread > 0 {
            debug!(account, unread = inbox_unread, "unread mail");
            return Some(NotificationBadge::builtin(BuiltinIcon::Mail));
        }
    }
    None
}

pub fn check_sms(source: &dyn SmsInboxSource) -> Option<NotificationBadge> {
    let unread = absent_on_error("sms", source.unread_messages())?;
    debug!(unread, "sms inbox checked");
    (unread > 0).then(|| NotificationBadge::builtin(BuiltinIcon::Sms))
}

pub fn check_missed_calls(source: &dyn CallLogSource) -> Option<NotificationBadge> {
    let missed = absent_on_error("call-log", source.unread_missed_calls())?;
    debug!(missed, "call log checked");
    (missed > 0).then(|| NotificationBadge::builtin(BuiltinIcon::MissedCall))
}

fn absent_on_error<T>(source: &'static str, result: Result<T, SourceError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(source, "notification source unavailable: {err}");
            None
        }
    }
}

/// The three polled providers, shareable with worker threads.
#[derive(Clone)]
pub struct NotificationSources {
    pub mail: Arc<dyn MailLabelSource>,
    pub sms: Arc<dyn SmsInboxSource>,
    pub calls: Arc<dyn CallLogSource>,
}

impl NotificationSources {
    /// Use one provider object for all three sources.
    pub fn from_shared<P>(provider: Arc<P>) -> Self
    where
        P: MailLabelSource + SmsInboxSource + CallLogSource + 'static,
    {
        Self {
            mail: provider.clone(),
            sms: provider.clone(),
            calls: provider,
        }
    }

    /// Run every enabled check. Blocking; call from a worker thread.
    pub fn poll(&self, toggles: &NotificationToggles) -> Vec<NotificationBadge> {
        let mut badges = Vec::new();
        if !toggles.any_polled() {
            debug!("every polled source is switched off");
            return badges;
        }
        if toggles.mail {
            badges.extend(check_mail(self.mail.as_ref()));
        }
        if toggles.sms {
            badges.extend(check_sms(self.sms.as_ref()));
        }
        if toggles.missed_calls {
            badges.extend(check_missed_calls(self.calls.as_ref()));
        }
        badges
    }
}

impl std::fmt::Debug for NotificationSources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationSources").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StubMail {
        accounts: Result<Vec<String>, &'static str>,
        labels: HashMap<String, Vec<MailLabel>>,
    }

    impl MailLabelSource for StubMail {
        fn mail_accounts(&self) -> Result<Vec<String>, SourceError> {
            self.accounts
                .clone()
                .map_err(|_| SourceError::PermissionDenied("mail accounts"))
        }

        fn labels(&self, account: &str) -> Result<Vec<MailLabel>, SourceError> {
            self.labels
                .get(account)
                .cloned()
                .ok_or(SourceError::NoCursor("mail labels"))
        }
    }

    struct Counts {
        sms: Result<u32, ()>,
        calls: Result<u32, ()>,
    }

    impl SmsInboxSource for Counts {
        fn unread_messages(&self) -> Result<u32, SourceError> {
            self.sms.map_err(|_| SourceError::Unavailable("sms"))
        }
    }

    impl CallLogSource for Counts {
        fn unread_missed_calls(&self) -> Result<u32, SourceError> {
            self.calls.map_err(|_| SourceError::PermissionDenied("call log"))
        }
    }

    impl MailLabelSource for Counts {
        fn mail_accounts(&self) -> Result<Vec<String>, SourceError> {
            Err(SourceError::Unavailable("mail"))
        }

        fn labels(&self, _account: &str) -> Result<Vec<MailLabel>, SourceError> {
            Err(SourceError::Unavailable("mail"))
        }
    }

    fn label(name: &str, unread: u32) -> MailLabel {
        MailLabel {
            canonical_name: name.to_string(),
            unread_conversations: unread,
        }
    }

    #[test]
    fn mail_badge_needs_unread_inbox() {
        let mut labels = HashMap::new();
        labels.insert(
            "first@example.com".to_string(),
            vec![label("^i", 0), label("^f", 4)],
        );
        labels.insert("second@example.com".to_string(), vec![label("^i", 2)]);
        let mail = StubMail {
            accounts: Ok(vec![
                "first@example.com".to_string(),
                "missing@example.com".to_string(),
                "second@example.com".to_string(),
            ]),
            labels,
        };
        let badge = check_mail(&mail).expect("second account has unread inbox");
        assert_eq!(badge, NotificationBadge::builtin(BuiltinIcon::Mail));
    }

    #[test]
    fn denied_mail_accounts_mean_no_badge() {
        let mail = StubMail {
            accounts: Err("denied"),
            labels: HashMap::new(),
        };
        assert!(check_mail(&mail).is_none());
    }

    #[test]
    fn poll_respects_toggles_and_tolerates_failures() {
        let counts = Arc::new(Counts {
            sms: Ok(3),
            calls: Err(()),
        });
        let sources = NotificationSources::from_shared(counts);

        let all = sources.poll(&NotificationToggles::default());
        assert_eq!(all, vec![NotificationBadge::builtin(BuiltinIcon::Sms)]);

        let toggles = NotificationToggles {
            sms: false,
            ..NotificationToggles::default()
        };
        assert!(sources.poll(&toggles).is_empty());

        let listener_only = NotificationToggles {
            mail: false,
            sms: false,
            missed_calls: false,
            listener: true,
        };
        assert!(!listener_only.any_polled());
        assert!(sources.poll(&listener_only).is_empty());
    }

    #[test]
    fn zero_counts_are_absent() {
        let counts = Counts {
            sms: Ok(0),
            calls: Ok(0),
        };
        assert!(check_sms(&counts).is_none());
        assert!(check_missed_calls(&counts).is_none());
    }
}
