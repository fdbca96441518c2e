//! The ordered conversation buffer.
//!
//! Messages are addressed by id. The session is the only writer; everything
//! else reads through shared references.

use std::collections::HashMap;

use crate::{FeedbackType, Message, SourceMetadata};

/// Messages of one conversation, in the order they were appended.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    index: HashMap<String, usize>,
}

impl MessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message. A message whose id is already present replaces nothing
    /// and is rejected.
    pub fn push(&mut self, message: Message) -> bool {
        if self.index.contains_key(&message.id) {
            return false;
        }
        self.index.insert(message.id.clone(), self.messages.len());
        self.messages.push(message);
        true
    }

    /// Look up a message by id.
    pub fn get(&self, id: &str) -> Option<&Message> {
        self.index.get(id).map(|&i| &self.messages[i])
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Message> {
        let i = *self.index.get(id)?;
        self.messages.get_mut(i)
    }

    /// Overwrite the content of a message.
    pub fn set_content(&mut self, id: &str, content: &str) -> Option<&Message> {
        let message = self.get_mut(id)?;
        message.content.clear();
        message.content.push_str(content);
        Some(message)
    }

    /// Merge citation data into a message.
    pub fn merge_metadata(&mut self, id: &str, metadata: &SourceMetadata) -> Option<&Message> {
        let message = self.get_mut(id)?;
        match &mut message.metadata {
            Some(existing) => existing.merge(metadata.clone()),
            None => message.metadata = Some(metadata.clone()),
        }
        Some(message)
    }

    /// Record feedback on a message.
    pub fn set_feedback(&mut self, id: &str, feedback: FeedbackType) -> Option<&Message> {
        let message = self.get_mut(id)?;
        message.feedback = Some(feedback);
        Some(message)
    }

    /// All messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The newest assistant message.
    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_assistant())
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if the conversation is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Remove every message.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Source;

    #[test]
    fn test_identity_is_stable_across_updates() {
        let mut store = MessageStore::new();
        store.push(Message::user("Pytanie"));
        let placeholder = Message::placeholder();
        let id = placeholder.id.clone();
        store.push(placeholder);

        store.set_content(&id, "Odpo");
        store.set_content(&id, "Odpowiedź");
        let message = store.get(&id).unwrap();
        assert_eq!(message.content, "Odpowiedź");
        assert_eq!(store.messages()[1].id, id);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let mut store = MessageStore::new();
        let message = Message::user("a");
        assert!(store.push(message.clone()));
        assert!(!store.push(message));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_unknown_id_is_none() {
        let mut store = MessageStore::new();
        assert!(store.set_content("missing", "x").is_none());
        assert!(store.set_feedback("missing", FeedbackType::Positive).is_none());
    }

    #[test]
    fn test_metadata_merges() {
        let mut store = MessageStore::new();
        let message = Message::placeholder();
        let id = message.id.clone();
        store.push(message);
        store.merge_metadata(&id, &SourceMetadata::new(vec![Source::new("KP")]));
        store.merge_metadata(&id, &SourceMetadata::new(vec![Source::new("KC")]));
        assert_eq!(store.get(&id).unwrap().metadata.as_ref().unwrap().sources.len(), 2);
    }

    #[test]
    fn test_clear_empties_everything() {
        let mut store = MessageStore::new();
        let message = Message::user("a");
        let id = message.id.clone();
        store.push(message);
        store.clear();
        assert!(store.is_empty());
        assert!(store.get(&id).is_none());
        assert!(store.last_assistant().is_none());
    }
}
