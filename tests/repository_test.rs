//! Repository behaviour over an in-memory store

use chrono::{NaiveDate, NaiveDateTime};
use vmg_thread_viewer::models::{Contact, Direction, Message};
use vmg_thread_viewer::repository::{LocalStoreRepo, MessageRepository, RepoOptions};
use vmg_thread_viewer::{Store, VmgError};

const PHONE: &str = "+1111111111";

fn repo() -> LocalStoreRepo {
    LocalStoreRepo::new(Store::in_memory().expect("store"))
}

fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .expect("valid date")
}

fn message(phone: &str, text: &str, datetime: Option<NaiveDateTime>, direction: Direction) -> Message {
    Message::new(text, phone, datetime, datetime, Some(format!("{phone}_x.vmg")), direction)
}

#[test]
fn test_save_assigns_id_and_stored_at() {
    let repo = repo();
    let saved = repo
        .save_message(message(PHONE, "hi", Some(at(1, 9)), Direction::Incoming))
        .expect("save");

    assert!(saved.id.as_deref().is_some_and(|id| !id.is_empty()));
    assert!(saved.stored_at.is_some());
    assert_eq!(repo.all_messages().expect("messages"), vec![saved]);
}

#[test]
fn test_save_keeps_existing_id() {
    let repo = repo();
    let mut msg = message(PHONE, "hi", None, Direction::Incoming);
    msg.id = Some("fixed".to_string());
    let saved = repo.save_message(msg).expect("save");
    assert_eq!(saved.id.as_deref(), Some("fixed"));
}

#[test]
fn test_save_rejects_invalid_message() {
    let repo = repo();
    let mut msg = message(PHONE, "hi", None, Direction::Incoming);
    msg.receiver = "+222".to_string();

    assert!(matches!(repo.save_message(msg), Err(VmgError::InvalidMessage(_))));
    assert!(repo.all_messages().expect("messages").is_empty());
}

#[test]
fn test_save_creates_contact_and_conversation() {
    let repo = LocalStoreRepo::with_options(
        Store::in_memory().expect("store"),
        RepoOptions {
            name_hint_from_filename: false,
        },
    );
    let saved = repo
        .save_message(message(PHONE, "hi", Some(at(1, 9)), Direction::Outgoing))
        .expect("save");

    let contacts = repo.all_contacts().expect("contacts");
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].number, PHONE);
    assert_eq!(contacts[0].name, Contact::placeholder_name(PHONE));

    let conversation = repo.conversation(PHONE).expect("lookup").expect("conversation");
    assert_eq!(conversation.message_count, 1);
    assert_eq!(conversation.last_message_at, at(1, 9));
    assert_eq!(Some(conversation.created_at), saved.stored_at);
}

#[test]
fn test_name_hint_updates_contact_name() {
    let repo = repo();
    let mut first = message(PHONE, "a", None, Direction::Incoming);
    first.filename = Some("Alice_0001.vmg".to_string());
    repo.save_message(first).expect("save");
    assert_eq!(repo.contact(PHONE).expect("lookup").expect("contact").name, "Alice");

    let mut second = message(PHONE, "b", None, Direction::Incoming);
    second.filename = Some("Ally_0002.vmg".to_string());
    repo.save_message(second).expect("save");
    assert_eq!(repo.contact(PHONE).expect("lookup").expect("contact").name, "Ally");
}

#[test]
fn test_contacts_stay_unique_per_number() {
    let repo = repo();
    for i in 0..5 {
        let direction = if i % 2 == 0 { Direction::Incoming } else { Direction::Outgoing };
        repo.save_message(message(PHONE, "x", Some(at(1, i)), direction)).expect("save");
    }
    repo.save_message(message("+2", "y", None, Direction::Incoming)).expect("save");

    let contacts = repo.all_contacts().expect("contacts");
    assert_eq!(contacts.len(), 2);
    assert_eq!(repo.all_conversations().expect("conversations").len(), 2);
}

#[test]
fn test_last_message_at_takes_maximum_on_save() {
    let repo = repo();
    repo.save_message(message(PHONE, "late", Some(at(5, 12)), Direction::Incoming)).expect("save");
    repo.save_message(message(PHONE, "early", Some(at(2, 8)), Direction::Incoming)).expect("save");
    repo.save_message(message(PHONE, "undated", None, Direction::Incoming)).expect("save");

    let conversation = repo.conversation(PHONE).expect("lookup").expect("conversation");
    assert_eq!(conversation.last_message_at, at(5, 12));
    assert_eq!(conversation.message_count, 3);

    // A rebuild reaches the same value.
    repo.rebuild_conversations().expect("rebuild");
    let rebuilt = repo.conversation(PHONE).expect("lookup").expect("conversation");
    assert_eq!(rebuilt, conversation);
}

#[test]
fn test_undated_first_message_does_not_pin_last_message_at() {
    let repo = repo();
    repo.save_message(message(PHONE, "undated", None, Direction::Incoming)).expect("save");
    repo.save_message(message(PHONE, "dated", Some(at(1, 10)), Direction::Outgoing)).expect("save");

    let saved = repo.conversation(PHONE).expect("lookup").expect("conversation");
    assert_eq!(saved.last_message_at, at(1, 10));

    repo.rebuild_conversations().expect("rebuild");
    let rebuilt = repo.conversation(PHONE).expect("lookup").expect("conversation");
    assert_eq!(rebuilt, saved);
}

#[test]
fn test_messages_by_conversation_sorted_with_undated_first() {
    let repo = repo();
    repo.save_message(message(PHONE, "b", Some(at(3, 10)), Direction::Incoming)).expect("save");
    repo.save_message(message(PHONE, "a", Some(at(1, 10)), Direction::Outgoing)).expect("save");
    repo.save_message(message(PHONE, "none", None, Direction::Incoming)).expect("save");
    repo.save_message(message("+2", "other", Some(at(2, 10)), Direction::Incoming)).expect("save");

    let texts: Vec<String> = repo
        .messages_by_conversation(PHONE)
        .expect("thread")
        .into_iter()
        .map(|m| m.message)
        .collect();
    assert_eq!(texts, vec!["none", "a", "b"]);
}

#[test]
fn test_delete_message_updates_count() {
    let repo = repo();
    let mut ids = Vec::new();
    for i in 0..3 {
        let saved = repo
            .save_message(message(PHONE, "x", Some(at(1, i)), Direction::Incoming))
            .expect("save");
        ids.push(saved.id.expect("id"));
    }
    assert_eq!(repo.conversation(PHONE).expect("lookup").expect("c").message_count, 3);

    assert!(repo.delete_message(&ids[1]).expect("delete"));
    assert_eq!(repo.conversation(PHONE).expect("lookup").expect("c").message_count, 2);

    assert!(!repo.delete_message("missing").expect("delete"));
    assert_eq!(repo.all_messages().expect("messages").len(), 2);
}

#[test]
fn test_deleting_last_message_removes_conversation_keeps_contact() {
    let repo = repo();
    let saved = repo
        .save_message(message(PHONE, "only", None, Direction::Incoming))
        .expect("save");

    repo.delete_message(saved.id.as_deref().expect("id")).expect("delete");

    assert!(repo.conversation(PHONE).expect("lookup").is_none());
    assert!(repo.contact(PHONE).expect("lookup").is_some());
}

#[test]
fn test_delete_conversation() {
    let repo = repo();
    repo.save_message(message(PHONE, "a", None, Direction::Incoming)).expect("save");
    repo.save_message(message(PHONE, "b", None, Direction::Outgoing)).expect("save");
    repo.save_message(message("+2", "c", None, Direction::Incoming)).expect("save");

    assert_eq!(repo.delete_conversation(PHONE).expect("delete"), 2);

    assert!(repo.messages_by_conversation(PHONE).expect("thread").is_empty());
    assert!(repo.conversation(PHONE).expect("lookup").is_none());
    assert!(repo.conversation("+2").expect("lookup").is_some());
    assert_eq!(repo.all_contacts().expect("contacts").len(), 2);
    assert_eq!(repo.delete_conversation("+404").expect("delete"), 0);
}

#[test]
fn test_update_contact_name() {
    let repo = repo();
    repo.save_message(message(PHONE, "a", None, Direction::Incoming)).expect("save");

    assert!(repo.update_contact_name(PHONE, "  Bob  ").expect("rename"));
    assert_eq!(repo.contact(PHONE).expect("lookup").expect("contact").name, "Bob");

    assert!(!repo.update_contact_name(PHONE, "   ").expect("rename"));
    assert!(!repo.update_contact_name("", "Bob").expect("rename"));
    assert!(!repo.update_contact_name("+404", "Nobody").expect("rename"));
    assert_eq!(repo.contact(PHONE).expect("lookup").expect("contact").name, "Bob");
}

#[test]
fn test_rebuild_is_idempotent() {
    let repo = repo();
    repo.save_message(message(PHONE, "a", Some(at(1, 1)), Direction::Incoming)).expect("save");
    repo.save_message(message("+2", "b", None, Direction::Outgoing)).expect("save");
    repo.save_message(message(PHONE, "c", Some(at(4, 1)), Direction::Outgoing)).expect("save");

    let first = repo.rebuild_conversations().expect("first");
    let second = repo.rebuild_conversations().expect("second");

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).expect("json"),
        serde_json::to_string(&second).expect("json")
    );
    let phones: Vec<&str> = first.iter().map(|c| c.phone_number.as_str()).collect();
    assert_eq!(phones, vec![PHONE, "+2"]);
}

#[test]
fn test_conversation_summaries_newest_first_with_names() {
    let repo = repo();
    let mut named = message(PHONE, "a", Some(at(1, 1)), Direction::Incoming);
    named.filename = Some("Carol_1.vmg".to_string());
    repo.save_message(named).expect("save");
    repo.save_message(message("+2", "b", Some(at(9, 1)), Direction::Incoming)).expect("save");

    let summaries = repo.conversation_summaries().expect("summaries");
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].phone_number, "+2");
    assert_eq!(summaries[1].display_name, "Carol");
}

#[test]
fn test_stats_and_clear() {
    let repo = repo();
    repo.save_message(message(PHONE, "a", None, Direction::Incoming)).expect("save");

    let stats = repo.stats().expect("stats");
    assert_eq!(stats.total_messages, 1);
    assert_eq!(stats.total_contacts, 1);
    assert_eq!(stats.total_conversations, 1);
    assert!(stats.storage_size > 6);

    repo.clear_all().expect("clear");
    let stats = repo.stats().expect("stats");
    assert_eq!(stats.total_messages, 0);
    assert_eq!(stats.storage_size, 6);
}
