//! Core types for the notification engine.

use crate::error::MetadataError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique identifier for a notification (opaque, assigned by the backend).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub String);

impl NotificationId {
    pub fn new(id: impl Into<String>) -> Self {
        NotificationId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NotificationId({})", self.0)
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NotificationId {
    fn from(s: &str) -> Self {
        NotificationId(s.to_string())
    }
}

impl From<String> for NotificationId {
    fn from(s: String) -> Self {
        NotificationId(s)
    }
}

/// Identifier of the user owning a set of notifications.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        OwnerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerId({})", self.0)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        OwnerId(s.to_string())
    }
}

impl From<String> for OwnerId {
    fn from(s: String) -> Self {
        OwnerId(s)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Session generation. Bumped on every owner assignment or clearing; deferred
/// writes started under an older epoch are discarded.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(pub u64);

impl Epoch {
    pub fn next(self) -> Self {
        Epoch(self.0 + 1)
    }
}

impl fmt::Debug for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Epoch({})", self.0)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order in which snapshot fetches were started within a session.
///
/// The session's first snapshot always holds [`FetchTicket::FIRST`]; every
/// resync draws a later one. A fetch result is applied only if no fetch
/// started after it has been applied already.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FetchTicket(pub u64);

impl FetchTicket {
    pub const FIRST: FetchTicket = FetchTicket(1);

    pub fn next(self) -> Self {
        FetchTicket(self.0 + 1)
    }
}

impl fmt::Debug for FetchTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FetchTicket({})", self.0)
    }
}

impl fmt::Display for FetchTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payload encoding format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PayloadEncoding {
    #[default]
    Json,
    MessagePack,
    Raw,
}

/// Opaque structured payload attached to a notification.
///
/// The engine never looks inside; the bytes travel through merges, rollbacks
/// and resyncs untouched. Interpreting them is up to whoever renders a given
/// notification kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub bytes: Vec<u8>,
    pub encoding: PayloadEncoding,
}

impl Default for Metadata {
    fn default() -> Self {
        Self::empty()
    }
}

impl Metadata {
    /// No payload.
    pub fn empty() -> Self {
        Self {
            bytes: Vec::new(),
            encoding: PayloadEncoding::Raw,
        }
    }

    /// Encode a value as JSON.
    pub fn json(value: &impl Serialize) -> Result<Self, MetadataError> {
        Ok(Self {
            bytes: serde_json::to_vec(value)?,
            encoding: PayloadEncoding::Json,
        })
    }

    /// Encode a value as MessagePack.
    pub fn msgpack(value: &impl Serialize) -> Result<Self, MetadataError> {
        Ok(Self {
            bytes: rmp_serde::to_vec_named(value)?,
            encoding: PayloadEncoding::MessagePack,
        })
    }

    /// Wrap raw bytes.
    pub fn raw(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            encoding: PayloadEncoding::Raw,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decode the payload into a consumer-defined type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, MetadataError> {
        match self.encoding {
            PayloadEncoding::Json => Ok(serde_json::from_slice(&self.bytes)?),
            PayloadEncoding::MessagePack => Ok(rmp_serde::from_slice(&self.bytes)?),
            PayloadEncoding::Raw => Err(MetadataError::NotStructured),
        }
    }
}

/// A single notification as seen by the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique across the whole store.
    pub id: NotificationId,

    /// The user this notification belongs to.
    pub owner: OwnerId,

    /// Short category tag (e.g. "comment", "approval").
    pub kind: String,

    pub title: String,

    pub body: Option<String>,

    /// Navigation target.
    pub link: Option<String>,

    #[serde(default)]
    pub metadata: Metadata,

    /// None means unread.
    pub read_at: Option<Timestamp>,

    /// Canonical sort key, newest first.
    pub created_at: Timestamp,
}

impl Notification {
    /// Build an unread notification with no body, link or metadata.
    pub fn new(
        id: impl Into<NotificationId>,
        owner: impl Into<OwnerId>,
        kind: impl Into<String>,
        title: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            kind: kind.into(),
            title: title.into(),
            body: None,
            link: None,
            metadata: Metadata::empty(),
            read_at: None,
            created_at,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn read(mut self, at: Timestamp) -> Self {
        self.read_at = Some(at);
        self
    }

    pub fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }
}

/// Event delivered by the push channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// A notification was created server-side.
    Insert { record: Notification },

    /// A notification was deleted. The transport does not always carry the
    /// identity of the deleted row.
    Delete { id: Option<NotificationId> },
}

impl ChangeEvent {
    pub fn insert(record: Notification) -> Self {
        ChangeEvent::Insert { record }
    }

    pub fn delete(id: impl Into<NotificationId>) -> Self {
        ChangeEvent::Delete {
            id: Some(id.into()),
        }
    }

    /// Delete event without identity.
    pub fn degraded_delete() -> Self {
        ChangeEvent::Delete { id: None }
    }
}

/// Immutable, internally consistent view of the store at one instant.
#[derive(Clone, Debug)]
pub struct NotificationView {
    pub owner: Option<OwnerId>,
    pub epoch: Epoch,
    pub records: Arc<[Notification]>,
    pub unread: usize,
}

impl NotificationView {
    pub fn empty() -> Self {
        Self {
            owner: None,
            epoch: Epoch::default(),
            records: Arc::from(Vec::new()),
            unread: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> Vec<NotificationId> {
        self.records.iter().map(|n| n.id.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.records.iter()
    }
}
