//! Repository over the [`Store`]: saving messages and keeping the derived
//! contacts and conversations in step with them.
//!
//! Only the repository writes contacts and conversations. Every operation
//! re-reads the collections it needs from the store, so there is no cached
//! state to go stale; concurrent writers are not coordinated and the last
//! full-collection write wins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use rand::Rng;
use tracing::{debug, info};

use crate::config::ImportConfig;
use crate::error::{Result, VmgError};
use crate::logging::OperationTimer;
use crate::metrics::MetricsCollector;
use crate::models::{
    Contact, Conversation, ConversationSummary, ExportInfo, Message, Snapshot, StorageStats,
};
use crate::store::{Collection, Store};

/// Name recorded in the `exportInfo.source` field of snapshots
pub const EXPORT_SOURCE: &str = "vmg-thread-viewer";

/// Read and write access to messages and their derived records
pub trait MessageRepository {
    /// Persist a message and update the contacts and conversation it touches
    fn save_message(&self, message: Message) -> Result<Message>;

    /// Messages exchanged with `phone_number`, oldest first
    fn messages_by_conversation(&self, phone_number: &str) -> Result<Vec<Message>>;

    /// Every stored message in storage order
    fn all_messages(&self) -> Result<Vec<Message>>;

    /// Every contact in storage order
    fn all_contacts(&self) -> Result<Vec<Contact>>;

    /// Every conversation in storage order
    fn all_conversations(&self) -> Result<Vec<Conversation>>;

    /// Rename a contact. Returns `false` when there is no such contact or the
    /// name is blank.
    fn update_contact_name(&self, phone_number: &str, name: &str) -> Result<bool>;

    /// Delete one message and rebuild conversations. Returns whether a message
    /// with that id existed.
    fn delete_message(&self, id: &str) -> Result<bool>;

    /// Delete every message with `phone_number` and its conversation. Returns
    /// the number of messages removed.
    fn delete_conversation(&self, phone_number: &str) -> Result<usize>;

    /// Recompute all conversations from the stored messages
    fn rebuild_conversations(&self) -> Result<Vec<Conversation>>;

    /// Drop every collection
    fn clear_all(&self) -> Result<()>;

    /// Copy of all collections with export metadata
    fn export_data(&self) -> Result<Snapshot>;

    /// Replace the collections present in `snapshot`, then rebuild conversations
    fn import_data(&self, snapshot: Snapshot) -> Result<()>;

    /// Collection sizes
    fn stats(&self) -> Result<StorageStats>;

    /// Contact for `phone_number`, if any
    fn contact(&self, phone_number: &str) -> Result<Option<Contact>> {
        Ok(self
            .all_contacts()?
            .into_iter()
            .find(|contact| contact.number == phone_number))
    }

    /// Conversation for `phone_number`, if any
    fn conversation(&self, phone_number: &str) -> Result<Option<Conversation>> {
        Ok(self
            .all_conversations()?
            .into_iter()
            .find(|conversation| conversation.phone_number == phone_number))
    }

    /// Conversations with display names, most recent first
    fn conversation_summaries(&self) -> Result<Vec<ConversationSummary>> {
        let names: HashMap<String, String> = self
            .all_contacts()?
            .into_iter()
            .map(|contact| (contact.number, contact.name))
            .collect();

        let mut summaries: Vec<ConversationSummary> = self
            .all_conversations()?
            .into_iter()
            .map(|conversation| ConversationSummary {
                display_name: names
                    .get(&conversation.phone_number)
                    .cloned()
                    .unwrap_or_else(|| conversation.phone_number.clone()),
                phone_number: conversation.phone_number,
                message_count: conversation.message_count,
                last_message_at: conversation.last_message_at,
            })
            .collect();
        summaries.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(summaries)
    }
}

/// Behaviour switches for [`LocalStoreRepo`]
#[derive(Debug, Clone, Copy)]
pub struct RepoOptions {
    /// Name new and existing contacts after the file name prefix
    pub name_hint_from_filename: bool,
}

impl Default for RepoOptions {
    fn default() -> Self {
        Self {
            name_hint_from_filename: true,
        }
    }
}

impl From<&ImportConfig> for RepoOptions {
    fn from(config: &ImportConfig) -> Self {
        Self {
            name_hint_from_filename: config.name_hint_from_filename,
        }
    }
}

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Identifier unique within the process: time, sequence number and noise
#[must_use]
pub fn generate_id() -> String {
    let millis = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
    let sequence = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let noise: u32 = rand::thread_rng().gen();
    format!(
        "{}-{}-{}",
        to_base36(millis),
        to_base36(sequence),
        to_base36(u64::from(noise))
    )
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Per-partner accumulator used while rebuilding
struct Group {
    partner: String,
    count: usize,
    earliest_stored: Option<DateTime<Utc>>,
    latest: Option<NaiveDateTime>,
}

/// [`MessageRepository`] backed by a [`Store`]
pub struct LocalStoreRepo {
    store: Store,
    options: RepoOptions,
    metrics: MetricsCollector,
}

impl LocalStoreRepo {
    /// Repository with default options
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self::with_options(store, RepoOptions::default())
    }

    /// Repository with explicit options
    #[must_use]
    pub fn with_options(store: Store, options: RepoOptions) -> Self {
        Self {
            store,
            options,
            metrics: MetricsCollector::default(),
        }
    }

    fn upsert_contacts(&self, numbers: &[&str], name: Option<&str>) -> Result<()> {
        let mut contacts = self.store.load_contacts()?;
        let mut changed = false;

        for number in numbers {
            match contacts.iter_mut().find(|contact| contact.number == *number) {
                Some(existing) => {
                    if let Some(name) = name {
                        if existing.name != name {
                            existing.name = name.to_string();
                            changed = true;
                        }
                    }
                }
                None => {
                    let contact = Contact {
                        id: generate_id(),
                        number: (*number).to_string(),
                        name: name.map_or_else(|| Contact::placeholder_name(number), str::to_string),
                        created_at: Utc::now(),
                    };
                    debug!(number = %contact.number, name = %contact.name, "Created contact");
                    contacts.push(contact);
                    changed = true;
                }
            }
        }

        if changed {
            self.store.save_contacts(&contacts)?;
        }
        Ok(())
    }

    /// `latest` is the newest dated message with this partner, if any
    fn upsert_conversation(
        &self,
        partner: &str,
        latest: Option<NaiveDateTime>,
        message_count: usize,
        stored_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut conversations = self.store.load_conversations()?;

        match conversations
            .iter_mut()
            .find(|conversation| conversation.phone_number == partner)
        {
            Some(existing) => {
                if let Some(latest) = latest {
                    existing.last_message_at = latest;
                }
                existing.message_count = message_count;
            }
            None => {
                debug!(partner, "Created conversation");
                conversations.push(Conversation {
                    id: generate_id(),
                    phone_number: partner.to_string(),
                    created_at: stored_at,
                    last_message_at: latest.unwrap_or_else(local_now),
                    message_count,
                });
            }
        }

        self.store.save_conversations(&conversations)
    }
}

impl MessageRepository for LocalStoreRepo {
    fn save_message(&self, mut message: Message) -> Result<Message> {
        message.validate().map_err(VmgError::InvalidMessage)?;

        if message.id.as_deref().map_or(true, str::is_empty) {
            message.id = Some(generate_id());
        }
        let stored_at = *message.stored_at.get_or_insert_with(Utc::now);

        let mut messages = self.store.load_messages()?;
        messages.push(message.clone());
        self.store.save_messages(&messages)?;

        let name_hint = if self.options.name_hint_from_filename {
            message.name_hint()
        } else {
            None
        };
        self.upsert_contacts(&message.contact_numbers(), name_hint)?;

        // Same aggregation as a rebuild, so both paths agree.
        let partner = message.partner();
        let thread = messages.iter().filter(|m| m.partner() == partner);
        let message_count = thread.clone().count();
        let latest = thread.filter_map(|m| m.datetime).max();
        self.upsert_conversation(partner, latest, message_count, stored_at)?;

        self.metrics.record_message_saved(message.direction.as_str());
        debug!(
            id = message.id.as_deref().unwrap_or_default(),
            partner,
            message_count,
            "Saved message"
        );

        Ok(message)
    }

    fn messages_by_conversation(&self, phone_number: &str) -> Result<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .store
            .load_messages()?
            .into_iter()
            .filter(|message| message.partner() == phone_number)
            .collect();
        // Undated messages sort as the Unix epoch.
        messages.sort_by_key(|message| message.datetime.unwrap_or_default());
        Ok(messages)
    }

    fn all_messages(&self) -> Result<Vec<Message>> {
        self.store.load_messages()
    }

    fn all_contacts(&self) -> Result<Vec<Contact>> {
        self.store.load_contacts()
    }

    fn all_conversations(&self) -> Result<Vec<Conversation>> {
        self.store.load_conversations()
    }

    fn update_contact_name(&self, phone_number: &str, name: &str) -> Result<bool> {
        let name = name.trim();
        if phone_number.is_empty() || name.is_empty() {
            return Ok(false);
        }

        let mut contacts = self.store.load_contacts()?;
        let Some(contact) = contacts.iter_mut().find(|contact| contact.number == phone_number) else {
            return Ok(false);
        };
        contact.name = name.to_string();
        self.store.save_contacts(&contacts)?;

        info!(phone_number, name, "Renamed contact");
        Ok(true)
    }

    fn delete_message(&self, id: &str) -> Result<bool> {
        let mut messages = self.store.load_messages()?;
        let before = messages.len();
        messages.retain(|message| message.id.as_deref() != Some(id));
        let removed = before - messages.len();
        self.store.save_messages(&messages)?;

        self.rebuild_conversations()?;

        self.metrics.record_messages_deleted(removed);
        debug!(id, removed, "Deleted message");
        Ok(removed > 0)
    }

    fn delete_conversation(&self, phone_number: &str) -> Result<usize> {
        let mut messages = self.store.load_messages()?;
        let before = messages.len();
        messages.retain(|message| message.partner() != phone_number);
        let removed = before - messages.len();
        self.store.save_messages(&messages)?;

        let mut conversations = self.store.load_conversations()?;
        conversations.retain(|conversation| conversation.phone_number != phone_number);
        self.store.save_conversations(&conversations)?;

        self.metrics.record_messages_deleted(removed);
        info!(phone_number, removed, "Deleted conversation");
        Ok(removed)
    }

    fn rebuild_conversations(&self) -> Result<Vec<Conversation>> {
        let timer = OperationTimer::new("rebuild_conversations");
        let messages = self.store.load_messages()?;
        let existing = self.store.load_conversations()?;
        let previous: HashMap<&str, &Conversation> = existing
            .iter()
            .map(|conversation| (conversation.phone_number.as_str(), conversation))
            .collect();

        let mut groups: Vec<Group> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for message in &messages {
            let partner = message.partner();
            if partner.is_empty() {
                continue;
            }
            let slot = *index.entry(partner).or_insert_with(|| {
                groups.push(Group {
                    partner: partner.to_string(),
                    count: 0,
                    earliest_stored: None,
                    latest: None,
                });
                groups.len() - 1
            });
            let group = &mut groups[slot];
            group.count += 1;
            if let Some(stored_at) = message.stored_at {
                group.earliest_stored = Some(group.earliest_stored.map_or(stored_at, |t| t.min(stored_at)));
            }
            if let Some(datetime) = message.datetime {
                group.latest = Some(group.latest.map_or(datetime, |t| t.max(datetime)));
            }
        }

        // Reusing what the previous aggregate knew keeps repeated rebuilds identical.
        let conversations: Vec<Conversation> = groups
            .into_iter()
            .map(|group| {
                let prior = previous.get(group.partner.as_str()).copied();
                Conversation {
                    id: prior.map_or_else(generate_id, |c| c.id.clone()),
                    created_at: group
                        .earliest_stored
                        .or_else(|| prior.map(|c| c.created_at))
                        .unwrap_or_else(Utc::now),
                    last_message_at: group
                        .latest
                        .or_else(|| prior.map(|c| c.last_message_at))
                        .unwrap_or_else(local_now),
                    message_count: group.count,
                    phone_number: group.partner,
                }
            })
            .collect();

        self.store.save_conversations(&conversations)?;

        self.metrics.record_rebuild(conversations.len(), timer.elapsed());
        info!(
            conversations = conversations.len(),
            messages = messages.len(),
            "Rebuilt conversations"
        );
        timer.finish();
        Ok(conversations)
    }

    fn clear_all(&self) -> Result<()> {
        self.store.clear()
    }

    fn export_data(&self) -> Result<Snapshot> {
        let messages = self.store.load_messages()?;
        let contacts = self.store.load_contacts()?;
        let conversations = self.store.load_conversations()?;
        let stats = self.stats()?;
        let now = Utc::now();

        self.metrics.record_export();
        info!(
            messages = messages.len(),
            contacts = contacts.len(),
            conversations = conversations.len(),
            "Exported snapshot"
        );

        Ok(Snapshot {
            export_info: Some(ExportInfo {
                timestamp: now,
                version: env!("CARGO_PKG_VERSION").to_string(),
                source: EXPORT_SOURCE.to_string(),
            }),
            stats: Some(stats),
            exported_at: Some(now),
            conversations: Some(conversations),
            contacts: Some(contacts),
            messages: Some(messages),
        })
    }

    fn import_data(&self, snapshot: Snapshot) -> Result<()> {
        if let Some(messages) = &snapshot.messages {
            self.store.save_messages(messages)?;
        }
        if let Some(contacts) = &snapshot.contacts {
            self.store.save_contacts(contacts)?;
        }
        if let Some(conversations) = &snapshot.conversations {
            self.store.save_conversations(conversations)?;
        }

        let conversations = self.rebuild_conversations()?;

        self.metrics.record_import();
        info!(
            messages = snapshot.messages.as_ref().map(Vec::len),
            contacts = snapshot.contacts.as_ref().map(Vec::len),
            conversations = conversations.len(),
            "Imported snapshot"
        );
        Ok(())
    }

    fn stats(&self) -> Result<StorageStats> {
        let mut storage_size = 0;
        for collection in Collection::ALL {
            storage_size += self.store.serialized_len(collection)?;
        }

        let stats = StorageStats {
            total_messages: self.store.load_messages()?.len(),
            total_contacts: self.store.load_contacts()?.len(),
            total_conversations: self.store.load_conversations()?.len(),
            storage_size,
        };
        self.metrics.record_storage_size(storage_size);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_to_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn test_generate_id_is_unique_within_process() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_id()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
