//! Wire message schema for the replicated store.
//!
//! A [`Message`] is a single mutation of one key in one domain. Clients send
//! batches of messages as a JSON array; the server rebroadcasts accepted
//! messages, again as a JSON array, to the other subscribers of the domain.
//!
//! # Schema
//!
//! | Field | Required for | Meaning |
//! |-------|--------------|---------|
//! | `command` | all | `create`, `update` or `delete` |
//! | `domain` | all | target domain name |
//! | `key` | all | target key |
//! | `value` | create, update | opaque pre-serialized payload |
//! | `version` | create, update (persistent keys) | opaque concurrency token |
//! | `previous_version` | update (persistent keys) | token the client last saw |
//!
//! Values and versions are opaque strings; the server only ever compares
//! versions for equality. Complex payloads are the client's responsibility
//! to pre-serialize.
//!
//! # Key namespaces
//!
//! - Keys starting with `%` are *ephemeral*: broadcast to subscribers but
//!   never persisted and never collision-checked.
//! - Keys starting with `_` are reserved for server-originated metadata;
//!   the server itself emits [`KEY_CLIENTS`], [`KEY_SYNCED`],
//!   [`KEY_SUBSCRIBE`] and [`KEY_UNSUBSCRIBE`].
//!
//! # Examples
//!
//! ```
//! use comet_dict::types::Message;
//!
//! let msg = Message::create("notes", "title", "\"Groceries\"", "v1");
//! assert_eq!(msg.command, "create");
//! assert!(!msg.is_ephemeral());
//!
//! let live = Message::create("notes", "%cursor", "14", "v1");
//! assert!(live.is_ephemeral());
//! ```

use serde::{Deserialize, Serialize};

/// First character of keys that are broadcast but never persisted.
pub const EPHEMERAL_PREFIX: char = '%';

/// First character of keys reserved for server-originated metadata.
pub const RESERVED_PREFIX: char = '_';

/// Meta-key carrying the subscriber list, sent once during replay.
pub const KEY_CLIENTS: &str = "_clients";

/// Meta-key marking the end of replay; its value is the string `"true"`.
pub const KEY_SYNCED: &str = "_synced";

/// Meta-key announcing a new subscriber to the existing ones.
pub const KEY_SUBSCRIBE: &str = "_subscribe";

/// Meta-key announcing that a subscriber left or was lost.
pub const KEY_UNSUBSCRIBE: &str = "_unsubscribe";

/// A single mutation of one key in one domain.
///
/// `command` is kept as a plain string on the wire so that one message with
/// an unknown command can be reported and skipped without rejecting the rest
/// of its batch; workers parse it into [`Command`] when applying.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// One of `create`, `update`, `delete`.
    pub command: String,

    /// Target domain name.
    pub domain: String,

    /// Target key within the domain.
    pub key: String,

    /// Opaque payload; required for `create` and `update`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Opaque concurrency token the key will carry after this mutation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Token the client last observed; checked on `update`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
}

impl Message {
    /// Build a `create` message.
    #[must_use]
    pub fn create(
        domain: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            command: Command::Create.as_str().to_string(),
            domain: domain.into(),
            key: key.into(),
            value: Some(value.into()),
            version: Some(version.into()),
            previous_version: None,
        }
    }

    /// Build an `update` message.
    #[must_use]
    pub fn update(
        domain: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
        previous_version: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            command: Command::Update.as_str().to_string(),
            domain: domain.into(),
            key: key.into(),
            value: Some(value.into()),
            version: Some(version.into()),
            previous_version: Some(previous_version.into()),
        }
    }

    /// Build a `delete` message.
    #[must_use]
    pub fn delete(domain: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            command: Command::Delete.as_str().to_string(),
            domain: domain.into(),
            key: key.into(),
            value: None,
            version: None,
            previous_version: None,
        }
    }

    /// Build a server-originated metadata `create` with no version token.
    ///
    /// Used for the reserved `_clients`, `_synced`, `_subscribe` and
    /// `_unsubscribe` keys, which clients treat as ephemeral metadata.
    #[must_use]
    pub fn meta(
        domain: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            command: Command::Create.as_str().to_string(),
            domain: domain.into(),
            key: key.into(),
            value: Some(value.into()),
            version: None,
            previous_version: None,
        }
    }

    /// Whether this message targets an ephemeral (`%`-prefixed) key.
    #[inline]
    #[must_use]
    pub fn is_ephemeral(&self) -> bool {
        self.key.starts_with(EPHEMERAL_PREFIX)
    }
}

/// A parsed message command.
///
/// Parsing is done by the domain worker, not at the wire boundary, so that
/// an unrecognized command invalidates only its own message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Create,
    Update,
    Delete,
}

impl Command {
    /// Parse a wire command string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Command::Create),
            "update" => Some(Command::Update),
            "delete" => Some(Command::Delete),
            _ => None,
        }
    }

    /// The wire spelling of this command.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Create => "create",
            Command::Update => "update",
            Command::Delete => "delete",
        }
    }
}
