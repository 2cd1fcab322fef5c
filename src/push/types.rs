use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event tag for a new message posted to a topic
pub const ACT_MSG: &str = "msg";
/// Event tag for a change of topic subscription
pub const ACT_SUB: &str = "sub";

/// Flat string attributes attached to every outbound push as the data payload
pub type DataAttributes = BTreeMap<String, String>;

/// Kind of event carried by a receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A message was posted to a topic
    Message,
    /// A subscription to a topic was created or changed
    Subscription,
}

impl EventKind {
    /// Parse the wire tag. Returns `None` for kinds this service does not push.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            ACT_MSG => Some(EventKind::Message),
            ACT_SUB => Some(EventKind::Subscription),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            EventKind::Message => ACT_MSG,
            EventKind::Subscription => ACT_SUB,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// A delivery request: one event and the users it should reach
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    /// Recipients keyed by user ID
    pub to: HashMap<String, Recipient>,
    /// The event being pushed
    pub payload: Payload,
}

impl Receipt {
    /// Device IDs that already received the event over a live session
    pub fn skip_devices(&self) -> HashSet<&str> {
        self.to
            .values()
            .flat_map(|r| r.devices.iter().map(String::as_str))
            .collect()
    }

    /// Recipient user IDs in a stable order
    pub fn user_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.to.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Unread count for a recipient, used as the iOS badge
    pub fn unread(&self, user_id: &str) -> i32 {
        self.to.get(user_id).map(|r| r.unread).unwrap_or_default()
    }
}

/// Per-recipient delivery info
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recipient {
    /// Devices which were online and received the event live
    #[serde(default)]
    pub devices: Vec<String>,
    /// Unread message count
    #[serde(default)]
    pub unread: i32,
}

/// Event content and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    /// Event tag, `msg` or `sub`
    pub what: String,
    #[serde(default)]
    pub silent: bool,
    pub topic: String,
    /// User who originated the event
    pub from: String,
    pub timestamp: DateTime<Utc>,

    // Message-post fields
    #[serde(default)]
    pub seq: i64,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub content: serde_json::Value,

    // Subscription-change fields
    #[serde(default)]
    pub mode_want: AccessMode,
    #[serde(default)]
    pub mode_given: AccessMode,
}

impl Payload {
    /// Payload for a new message in `topic`
    pub fn message(
        topic: impl Into<String>,
        from: impl Into<String>,
        seq: i64,
        content: serde_json::Value,
    ) -> Self {
        Self {
            what: ACT_MSG.to_string(),
            silent: false,
            topic: topic.into(),
            from: from.into(),
            timestamp: Utc::now(),
            seq,
            content_type: String::new(),
            content,
            mode_want: AccessMode::NONE,
            mode_given: AccessMode::NONE,
        }
    }

    /// Payload for a subscription change in `topic`
    pub fn subscription(
        topic: impl Into<String>,
        from: impl Into<String>,
        mode_want: AccessMode,
        mode_given: AccessMode,
    ) -> Self {
        Self {
            what: ACT_SUB.to_string(),
            silent: false,
            topic: topic.into(),
            from: from.into(),
            timestamp: Utc::now(),
            seq: 0,
            content_type: String::new(),
            content: serde_json::Value::Null,
            mode_want,
            mode_given,
        }
    }

    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_tag(&self.what)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid access mode character '{0}'")]
pub struct AccessModeParseError(char);

/// Topic permission bits
///
/// Rendered as the letters `JRWPASDO`, one per set bit in that order,
/// or `N` when no bits are set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessMode(u32);

impl AccessMode {
    pub const NONE: AccessMode = AccessMode(0);
    pub const JOIN: AccessMode = AccessMode(0x01);
    pub const READ: AccessMode = AccessMode(0x02);
    pub const WRITE: AccessMode = AccessMode(0x04);
    pub const PRES: AccessMode = AccessMode(0x08);
    pub const APPROVE: AccessMode = AccessMode(0x10);
    pub const SHARE: AccessMode = AccessMode(0x20);
    pub const DELETE: AccessMode = AccessMode(0x40);
    pub const OWNER: AccessMode = AccessMode(0x80);

    const LETTERS: [(char, AccessMode); 8] = [
        ('J', AccessMode::JOIN),
        ('R', AccessMode::READ),
        ('W', AccessMode::WRITE),
        ('P', AccessMode::PRES),
        ('A', AccessMode::APPROVE),
        ('S', AccessMode::SHARE),
        ('D', AccessMode::DELETE),
        ('O', AccessMode::OWNER),
    ];

    pub fn contains(&self, other: AccessMode) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: AccessMode) -> AccessMode {
        AccessMode(self.0 | other.0)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("N");
        }
        for (letter, bit) in Self::LETTERS {
            if self.contains(bit) {
                write!(f, "{}", letter)?;
            }
        }
        Ok(())
    }
}

impl FromStr for AccessMode {
    type Err = AccessModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mode = AccessMode::NONE;
        for c in s.chars() {
            let upper = c.to_ascii_uppercase();
            if upper == 'N' {
                continue;
            }
            match Self::LETTERS.iter().find(|(letter, _)| *letter == upper) {
                Some((_, bit)) => mode = mode.union(*bit),
                None => return Err(AccessModeParseError(c)),
            }
        }
        Ok(mode)
    }
}

impl TryFrom<String> for AccessMode {
    type Error = AccessModeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccessMode> for String {
    fn from(mode: AccessMode) -> Self {
        mode.to_string()
    }
}
