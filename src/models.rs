//! Data models for VMG messages and the records derived from them
//!
//! This module contains the message record produced by the decoder, the
//! contact and conversation records the repository derives from it, and the
//! snapshot format used for export/import.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Literal identifier standing in for the device owner
pub const SELF_IDENTIFIER: &str = "Me";

/// Prefix of the placeholder name given to contacts created without a name
pub const PLACEHOLDER_NAME_PREFIX: &str = "Contact ";

/// Which side of the conversation a message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Received by the device owner
    Incoming,
    /// Sent by the device owner
    Outgoing,
}

impl Direction {
    /// Wire name used in snapshots and on the command line
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Incoming => "INCOMING",
            Self::Outgoing => "OUTGOING",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "incoming" | "in" | "inbox" => Ok(Self::Incoming),
            "outgoing" | "out" | "sent" => Ok(Self::Outgoing),
            other => Err(format!("unknown direction `{other}`; expected incoming|outgoing")),
        }
    }
}

/// A single text message decoded from a VMG file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Repository-assigned identifier, unset until first save
    #[serde(default)]
    pub id: Option<String>,
    /// Message text, line breaks preserved
    #[serde(default)]
    pub message: String,
    /// Phone number of the sender, or [`SELF_IDENTIFIER`]
    pub sender: String,
    /// Phone number of the receiver, or [`SELF_IDENTIFIER`]
    pub receiver: String,
    /// Date from the message body (`Date:` field)
    #[serde(default, with = "local_datetime::option")]
    pub datetime: Option<NaiveDateTime>,
    /// Device clock timestamp from the header (`X-NOK-DT:` field)
    #[serde(default, with = "local_datetime::option")]
    pub nkdatetime: Option<NaiveDateTime>,
    /// File the message was decoded from
    #[serde(default)]
    pub filename: Option<String>,
    /// Incoming or outgoing
    #[serde(rename = "type")]
    pub direction: Direction,
    /// When the message was first persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Create an unsaved message, placing `phone` on the side `direction` implies
    #[must_use]
    pub fn new(
        text: impl Into<String>,
        phone: impl Into<String>,
        datetime: Option<NaiveDateTime>,
        nkdatetime: Option<NaiveDateTime>,
        filename: Option<String>,
        direction: Direction,
    ) -> Self {
        let phone = phone.into();
        let (sender, receiver) = match direction {
            Direction::Incoming => (phone, SELF_IDENTIFIER.to_string()),
            Direction::Outgoing => (SELF_IDENTIFIER.to_string(), phone),
        };

        Self {
            id: None,
            message: text.into(),
            sender,
            receiver,
            datetime,
            nkdatetime,
            filename,
            direction,
            stored_at: None,
        }
    }

    /// The conversation partner: sender for incoming, receiver for outgoing
    #[must_use]
    pub fn partner(&self) -> &str {
        match self.direction {
            Direction::Incoming => &self.sender,
            Direction::Outgoing => &self.receiver,
        }
    }

    /// Non-self identifiers referenced by this message, deduplicated
    #[must_use]
    pub fn contact_numbers(&self) -> Vec<&str> {
        let mut numbers: Vec<&str> = Vec::with_capacity(2);
        for number in [self.sender.as_str(), self.receiver.as_str()] {
            if !number.is_empty() && number != SELF_IDENTIFIER && !numbers.contains(&number) {
                numbers.push(number);
            }
        }
        numbers
    }

    /// Contact name suggested by the file name (`Alice_0001.vmg` -> `Alice`)
    #[must_use]
    pub fn name_hint(&self) -> Option<&str> {
        self.filename
            .as_deref()
            .and_then(|name| name.split('_').next())
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Check the self-identifier invariant against the direction
    pub fn validate(&self) -> Result<(), String> {
        let (own_side, other_side) = match self.direction {
            Direction::Incoming => (&self.receiver, &self.sender),
            Direction::Outgoing => (&self.sender, &self.receiver),
        };

        if own_side != SELF_IDENTIFIER {
            return Err(format!(
                "{} message must have `{SELF_IDENTIFIER}` on the owner side, found `{own_side}`",
                self.direction
            ));
        }
        if other_side.trim().is_empty() {
            return Err("conversation partner identifier is empty".to_string());
        }
        if other_side == SELF_IDENTIFIER {
            return Err(format!("both sender and receiver are `{SELF_IDENTIFIER}`"));
        }

        Ok(())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |dt: Option<NaiveDateTime>| dt.map_or_else(|| "-".to_string(), |dt| dt.to_string());
        writeln!(f, "Datetime: {}", show(self.datetime))?;
        writeln!(f, "Sender: {}", self.sender)?;
        writeln!(f, "Receiver: {}", self.receiver)?;
        writeln!(f, "Message: {}", self.message)?;
        writeln!(f, "Type: {}", self.direction)?;
        write!(f, "NKDatetime: {}", show(self.nkdatetime))
    }
}

/// A phone number with a display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    /// Repository-assigned identifier
    pub id: String,
    /// Phone number, unique across contacts
    pub number: String,
    /// Display name
    pub name: String,
    /// When the contact was first seen
    pub created_at: DateTime<Utc>,
}

impl Contact {
    /// Placeholder display name for `number`
    #[must_use]
    pub fn placeholder_name(number: &str) -> String {
        format!("{PLACEHOLDER_NAME_PREFIX}{number}")
    }
}

/// Aggregate over all messages exchanged with one partner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Repository-assigned identifier
    pub id: String,
    /// Conversation partner, unique across conversations
    pub phone_number: String,
    /// When the conversation was first seen
    pub created_at: DateTime<Utc>,
    /// Latest message date in the conversation
    #[serde(with = "local_datetime")]
    pub last_message_at: NaiveDateTime,
    /// Number of stored messages with this partner
    pub message_count: usize,
}

/// A conversation joined with its contact's display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    /// Conversation partner
    pub phone_number: String,
    /// Contact name, or the phone number when no contact exists
    pub display_name: String,
    /// Number of stored messages
    pub message_count: usize,
    /// Latest message date
    pub last_message_at: NaiveDateTime,
}

/// Collection sizes reported to the settings view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageStats {
    /// Stored messages
    pub total_messages: usize,
    /// Stored contacts
    pub total_contacts: usize,
    /// Stored conversations
    pub total_conversations: usize,
    /// Serialized length of all three collections in bytes
    pub storage_size: usize,
}

/// Provenance block written at the top of an export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportInfo {
    /// Time of export
    pub timestamp: DateTime<Utc>,
    /// Version of the exporting program
    pub version: String,
    /// Name of the exporting program
    pub source: String,
}

/// Exported repository contents
///
/// Every collection is optional so a partial snapshot can be imported; a
/// missing collection leaves the stored one untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Export provenance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_info: Option<ExportInfo>,
    /// Collection sizes at export time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<StorageStats>,
    /// Time of export
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
    /// Conversations (advisory, rebuilt on import)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversations: Option<Vec<Conversation>>,
    /// Contacts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contacts: Option<Vec<Contact>>,
    /// Messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
}

/// Output format for exported threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Comma-separated values format
    Csv,
    /// Plain text format
    Txt,
    /// JSON format
    Json,
}

impl OutputFormat {
    /// Get the file extension for this format
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Txt => "txt",
            Self::Json => "json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "txt" => Ok(Self::Txt),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format `{other}`; expected txt|csv|json")),
        }
    }
}

/// Serde helpers for naive local datetimes.
///
/// Serializes as `YYYY-MM-DDTHH:MM:SS[.fff]`. Deserializes that form or an
/// RFC 3339 string with an offset, converted to local time, which is what a
/// browser `toISOString()` export contains.
pub mod local_datetime {
    use chrono::{DateTime, Local, NaiveDateTime};
    use serde::{de, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

    /// Parse either accepted datetime form
    #[must_use]
    pub fn parse(value: &str) -> Option<NaiveDateTime> {
        let value = value.trim();
        NaiveDateTime::parse_from_str(value, FORMAT).ok().or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.with_timezone(&Local).naive_local())
        })
    }

    /// Serialize a datetime
    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(FORMAT))
    }

    /// Deserialize a datetime
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid datetime `{raw}`")))
    }

    /// Same as the parent module for optional fields; `null` maps to `None`
    pub mod option {
        use chrono::NaiveDateTime;
        use serde::{de, Deserialize, Deserializer, Serializer};

        /// Serialize an optional datetime
        pub fn serialize<S: Serializer>(
            value: &Option<NaiveDateTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => super::serialize(dt, serializer),
                None => serializer.serialize_none(),
            }
        }

        /// Deserialize an optional datetime
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDateTime>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| de::Error::custom(format!("invalid datetime `{raw}`"))),
                None => Ok(None),
            }
        }
    }
}
