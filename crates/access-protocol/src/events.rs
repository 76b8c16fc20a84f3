use std::{collections::BTreeMap, sync::OnceLock};

use serde::{Deserialize, Serialize};

use crate::NotificationKind;

const NOTIFICATION_EVENT_MANIFEST_JSON: &str =
    include_str!("events/notification_events_manifest.json");

/// Who a notification event is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAudience {
    /// Everyone who may approve the request's group.
    GroupOwners,
    /// The user who opened the request.
    Requester,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationEventManifestEntry {
    pub event_type: NotificationKind,
    pub schema_version: u16,
    pub audience: NotificationAudience,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    events: Vec<NotificationEventManifestEntry>,
}

/// Routing table for lifecycle notifications, one entry per [`NotificationKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEventManifest {
    entries: BTreeMap<NotificationKind, NotificationEventManifestEntry>,
}

impl NotificationEventManifest {
    #[must_use]
    pub fn entry(&self, kind: NotificationKind) -> Option<&NotificationEventManifestEntry> {
        self.entries.get(&kind)
    }

    #[must_use]
    pub fn audience(&self, kind: NotificationKind) -> Option<NotificationAudience> {
        self.entry(kind).map(|entry| entry.audience)
    }

    pub fn entries(&self) -> impl Iterator<Item = &NotificationEventManifestEntry> {
        self.entries.values()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NotificationEventManifestError {
    #[error("invalid manifest json: {0}")]
    InvalidJson(String),
    #[error("notification event `{0}` is listed more than once")]
    DuplicateEventType(NotificationKind),
    #[error("notification event `{0}` has no manifest entry")]
    MissingEventType(NotificationKind),
    #[error("notification event `{event_type}` has invalid schema version {schema_version}")]
    InvalidSchemaVersion {
        event_type: NotificationKind,
        schema_version: u16,
    },
}

impl From<serde_json::Error> for NotificationEventManifestError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidJson(error.to_string())
    }
}

/// Parse a manifest that routes every notification kind exactly once.
///
/// # Errors
/// Malformed JSON or unknown event types, a repeated or missing kind, or a zero
/// schema version.
pub fn parse_notification_event_manifest(
    json: &str,
) -> Result<NotificationEventManifest, NotificationEventManifestError> {
    let raw: RawManifest = serde_json::from_str(json)?;
    let mut entries = BTreeMap::new();
    for entry in raw.events {
        if entry.schema_version == 0 {
            return Err(NotificationEventManifestError::InvalidSchemaVersion {
                event_type: entry.event_type,
                schema_version: entry.schema_version,
            });
        }
        if entries.insert(entry.event_type, entry).is_some() {
            return Err(NotificationEventManifestError::DuplicateEventType(
                entry.event_type,
            ));
        }
    }
    if let Some(missing) = NotificationKind::ALL
        .into_iter()
        .find(|kind| !entries.contains_key(kind))
    {
        return Err(NotificationEventManifestError::MissingEventType(missing));
    }
    Ok(NotificationEventManifest { entries })
}

/// The manifest compiled into this crate.
///
/// # Panics
/// If the embedded manifest is invalid. The tests below parse the same file.
#[must_use]
pub fn notification_event_manifest() -> &'static NotificationEventManifest {
    static MANIFEST: OnceLock<NotificationEventManifest> = OnceLock::new();
    MANIFEST.get_or_init(|| {
        parse_notification_event_manifest(NOTIFICATION_EVENT_MANIFEST_JSON)
            .expect("notification event manifest must parse and validate")
    })
}
