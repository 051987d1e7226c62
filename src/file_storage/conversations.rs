//! Conversation history storage
//!
//! Each conversation is a single JSON file with embedded messages:
//! `{data_dir}/projects/{project_id}/conversations/{conversation_id}.json`
//!
//! An `index.json` next to them holds minimal metadata for listing views.

use super::{project_data_dir, read_json, with_file_lock, write_json, FileResult};
use crate::models::{Conversation, Message, MessageRole};
use crate::utils::{generate_id, truncate_string};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Version of the index file format
const INDEX_VERSION: u32 = 1;

/// Maximum characters taken from the first user message for a title
const TITLE_MAX_CHARS: usize = 50;

const DEFAULT_TITLE: &str = "New conversation";

/// Conversation index file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationIndex {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub entries: Vec<ConversationIndexEntry>,
}

impl Default for ConversationIndex {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            updated_at: Utc::now(),
            entries: Vec::new(),
        }
    }
}

/// Conversation index entry (minimal info for listing)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationIndexEntry {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

impl From<&Conversation> for ConversationIndexEntry {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id.clone(),
            title: conversation.title.clone(),
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
            message_count: conversation.messages.len(),
        }
    }
}

pub fn get_conversations_dir(data_dir: &Path, project_id: &str) -> PathBuf {
    project_data_dir(data_dir, project_id).join("conversations")
}

fn get_conversation_path(data_dir: &Path, project_id: &str, conversation_id: &str) -> PathBuf {
    get_conversations_dir(data_dir, project_id).join(format!("{}.json", conversation_id))
}

fn get_index_path(data_dir: &Path, project_id: &str) -> PathBuf {
    get_conversations_dir(data_dir, project_id).join("index.json")
}

/// Reject IDs that could escape the conversations directory
fn validate_conversation_id(conversation_id: &str) -> FileResult<()> {
    if conversation_id.is_empty()
        || !conversation_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(format!("Invalid conversation ID: {}", conversation_id));
    }
    Ok(())
}

fn read_index(data_dir: &Path, project_id: &str) -> FileResult<ConversationIndex> {
    let path = get_index_path(data_dir, project_id);
    if !path.exists() {
        return Ok(ConversationIndex::default());
    }
    read_json(&path)
}

/// Replace (or insert) the index entry for a conversation
fn upsert_index_entry(
    data_dir: &Path,
    project_id: &str,
    conversation: &Conversation,
) -> FileResult<()> {
    let index_path = get_index_path(data_dir, project_id);
    with_file_lock(&index_path, || {
        let mut index = read_index(data_dir, project_id)?;
        let entry = ConversationIndexEntry::from(conversation);
        match index.entries.iter_mut().find(|e| e.id == conversation.id) {
            Some(existing) => *existing = entry,
            None => index.entries.push(entry),
        }
        index.updated_at = Utc::now();
        write_json(&index_path, &index)
    })
}

fn write_conversation(data_dir: &Path, conversation: &Conversation) -> FileResult<()> {
    let path = get_conversation_path(data_dir, &conversation.project_id, &conversation.id);
    write_json(&path, conversation)?;
    upsert_index_entry(data_dir, &conversation.project_id, conversation)
}

/// Create a new, empty conversation
pub fn create_conversation(
    data_dir: &Path,
    project_id: &str,
    title: Option<&str>,
) -> FileResult<Conversation> {
    let now = Utc::now();
    let conversation = Conversation {
        id: generate_id("conv"),
        project_id: project_id.to_string(),
        title: title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE)
            .to_string(),
        created_at: now,
        updated_at: now,
        session_id: None,
        messages: Vec::new(),
    };

    write_conversation(data_dir, &conversation)?;
    Ok(conversation)
}

/// Get a conversation with all of its messages
pub fn get_conversation(
    data_dir: &Path,
    project_id: &str,
    conversation_id: &str,
) -> FileResult<Option<Conversation>> {
    validate_conversation_id(conversation_id)?;
    let path = get_conversation_path(data_dir, project_id, conversation_id);
    if !path.exists() {
        return Ok(None);
    }
    read_json(&path).map(Some)
}

fn require_conversation(
    data_dir: &Path,
    project_id: &str,
    conversation_id: &str,
) -> FileResult<Conversation> {
    get_conversation(data_dir, project_id, conversation_id)?
        .ok_or_else(|| format!("Conversation not found: {}", conversation_id))
}

/// Read-modify-write of one conversation under its file lock. `f` returns
/// whether anything changed; unchanged conversations are not rewritten.
fn update_conversation<F>(
    data_dir: &Path,
    project_id: &str,
    conversation_id: &str,
    f: F,
) -> FileResult<Conversation>
where
    F: FnOnce(&mut Conversation) -> FileResult<bool>,
{
    validate_conversation_id(conversation_id)?;
    let path = get_conversation_path(data_dir, project_id, conversation_id);
    with_file_lock(&path, || {
        let mut conversation = require_conversation(data_dir, project_id, conversation_id)?;
        if f(&mut conversation)? {
            write_conversation(data_dir, &conversation)?;
        }
        Ok(conversation)
    })
}

/// List conversations for a project, most recently updated first
pub fn list_conversations(
    data_dir: &Path,
    project_id: &str,
) -> FileResult<Vec<ConversationIndexEntry>> {
    let mut entries = read_index(data_dir, project_id)?.entries;
    entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Ok(entries)
}

/// Rename a conversation
pub fn rename_conversation(
    data_dir: &Path,
    project_id: &str,
    conversation_id: &str,
    title: &str,
) -> FileResult<Conversation> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err("Conversation title cannot be empty".to_string());
    }

    update_conversation(data_dir, project_id, conversation_id, |conversation| {
        conversation.title = trimmed.to_string();
        conversation.updated_at = Utc::now();
        Ok(true)
    })
}

/// Append a message. The first user message also names an untitled
/// conversation.
pub fn append_message(
    data_dir: &Path,
    project_id: &str,
    conversation_id: &str,
    message: Message,
) -> FileResult<Conversation> {
    update_conversation(data_dir, project_id, conversation_id, |conversation| {
        let is_first_user_message = message.role == MessageRole::User
            && !conversation
                .messages
                .iter()
                .any(|m| m.role == MessageRole::User);
        if is_first_user_message && conversation.title == DEFAULT_TITLE {
            let title = truncate_string(message.content.trim(), TITLE_MAX_CHARS);
            if !title.is_empty() {
                conversation.title = title;
            }
        }

        conversation.messages.push(message);
        conversation.updated_at = Utc::now();
        Ok(true)
    })
}

/// Record the Claude CLI session ID used to resume this conversation
pub fn set_session_id(
    data_dir: &Path,
    project_id: &str,
    conversation_id: &str,
    session_id: &str,
) -> FileResult<()> {
    update_conversation(data_dir, project_id, conversation_id, |conversation| {
        if conversation.session_id.as_deref() == Some(session_id) {
            return Ok(false);
        }
        conversation.session_id = Some(session_id.to_string());
        Ok(true)
    })
    .map(|_| ())
}

/// Delete a conversation and its index entry
pub fn delete_conversation(
    data_dir: &Path,
    project_id: &str,
    conversation_id: &str,
) -> FileResult<()> {
    validate_conversation_id(conversation_id)?;
    let path = get_conversation_path(data_dir, project_id, conversation_id);
    if !path.exists() {
        return Err(format!("Conversation not found: {}", conversation_id));
    }

    with_file_lock(&path, || {
        fs::remove_file(&path).map_err(|e| format!("Failed to delete conversation: {}", e))
    })?;
    let _ = fs::remove_file(path.with_extension("lock"));

    let index_path = get_index_path(data_dir, project_id);
    with_file_lock(&index_path, || {
        let mut index = read_index(data_dir, project_id)?;
        index.entries.retain(|e| e.id != conversation_id);
        index.updated_at = Utc::now();
        write_json(&index_path, &index)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PROJECT: &str = "proj_test";

    #[test]
    fn test_create_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let conversation = create_conversation(temp_dir.path(), PROJECT, None).unwrap();

        assert_eq!(conversation.title, DEFAULT_TITLE);
        let loaded = get_conversation(temp_dir.path(), PROJECT, &conversation.id)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.id, conversation.id);
        assert!(loaded.messages.is_empty());
    }

    #[test]
    fn test_first_user_message_sets_title() {
        let temp_dir = TempDir::new().unwrap();
        let conversation = create_conversation(temp_dir.path(), PROJECT, None).unwrap();

        let long = "Refactor the websocket layer so that every project gets its own channel and more";
        append_message(
            temp_dir.path(),
            PROJECT,
            &conversation.id,
            Message::new(MessageRole::User, long),
        )
        .unwrap();
        let updated = append_message(
            temp_dir.path(),
            PROJECT,
            &conversation.id,
            Message::new(MessageRole::User, "second"),
        )
        .unwrap();

        assert_eq!(updated.title.chars().count(), TITLE_MAX_CHARS);
        assert!(long.starts_with(&updated.title));
        assert_eq!(updated.messages.len(), 2);
    }

    #[test]
    fn test_explicit_title_kept() {
        let temp_dir = TempDir::new().unwrap();
        let conversation =
            create_conversation(temp_dir.path(), PROJECT, Some("Bug triage")).unwrap();
        let updated = append_message(
            temp_dir.path(),
            PROJECT,
            &conversation.id,
            Message::new(MessageRole::User, "hello"),
        )
        .unwrap();
        assert_eq!(updated.title, "Bug triage");
    }

    #[test]
    fn test_list_orders_by_updated() {
        let temp_dir = TempDir::new().unwrap();
        let first = create_conversation(temp_dir.path(), PROJECT, Some("first")).unwrap();
        let second = create_conversation(temp_dir.path(), PROJECT, Some("second")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        append_message(
            temp_dir.path(),
            PROJECT,
            &first.id,
            Message::new(MessageRole::Assistant, "hi"),
        )
        .unwrap();

        let entries = list_conversations(temp_dir.path(), PROJECT).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, first.id);
        assert_eq!(entries[0].message_count, 1);
        assert_eq!(entries[1].id, second.id);
    }

    #[test]
    fn test_rename_and_session_id() {
        let temp_dir = TempDir::new().unwrap();
        let conversation = create_conversation(temp_dir.path(), PROJECT, None).unwrap();

        rename_conversation(temp_dir.path(), PROJECT, &conversation.id, "Renamed").unwrap();
        set_session_id(temp_dir.path(), PROJECT, &conversation.id, "sess-1").unwrap();

        let loaded = get_conversation(temp_dir.path(), PROJECT, &conversation.id)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.title, "Renamed");
        assert_eq!(loaded.session_id.as_deref(), Some("sess-1"));
        assert!(rename_conversation(temp_dir.path(), PROJECT, &conversation.id, " ").is_err());
    }

    #[test]
    fn test_delete() {
        let temp_dir = TempDir::new().unwrap();
        let conversation = create_conversation(temp_dir.path(), PROJECT, None).unwrap();

        delete_conversation(temp_dir.path(), PROJECT, &conversation.id).unwrap();

        assert!(get_conversation(temp_dir.path(), PROJECT, &conversation.id)
            .unwrap()
            .is_none());
        assert!(list_conversations(temp_dir.path(), PROJECT).unwrap().is_empty());
        assert!(delete_conversation(temp_dir.path(), PROJECT, &conversation.id).is_err());
    }

    #[test]
    fn test_concurrent_append_and_rename_keep_every_update() {
        let temp_dir = TempDir::new().unwrap();
        let conversation = create_conversation(temp_dir.path(), PROJECT, Some("start")).unwrap();

        std::thread::scope(|scope| {
            for writer in 0..4 {
                let data_dir = temp_dir.path();
                let id = conversation.id.as_str();
                scope.spawn(move || {
                    for n in 0..10 {
                        let text = format!("writer {} message {}", writer, n);
                        append_message(
                            data_dir,
                            PROJECT,
                            id,
                            Message::new(MessageRole::Assistant, &text),
                        )
                        .unwrap();
                    }
                });
            }
            scope.spawn(|| {
                for n in 0..10 {
                    let title = format!("title {}", n);
                    rename_conversation(temp_dir.path(), PROJECT, &conversation.id, &title)
                        .unwrap();
                }
            });
        });

        let loaded = get_conversation(temp_dir.path(), PROJECT, &conversation.id)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.messages.len(), 40);
        assert_eq!(loaded.title, "title 9");
        let entries = list_conversations(temp_dir.path(), PROJECT).unwrap();
        assert_eq!(entries[0].message_count, 40);
    }

    #[test]
    fn test_rejects_path_traversal_id() {
        let temp_dir = TempDir::new().unwrap();
        assert!(get_conversation(temp_dir.path(), PROJECT, "../settings").is_err());
    }
}
