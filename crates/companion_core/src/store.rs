//! crates/companion_core/src/store.rs
//!
//! The message store: one chronological thread per persona mode.

use crate::domain::{Message, PersonaMode};
use std::collections::BTreeMap;

/// Owns every thread. Absent threads read as empty; threads are appended to
/// during conversation and truncated only by an explicit edit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageStore {
    threads: BTreeMap<PersonaMode, Vec<Message>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_threads(threads: BTreeMap<PersonaMode, Vec<Message>>) -> Self {
        Self { threads }
    }

    pub fn thread_for(&self, mode: PersonaMode) -> &[Message] {
        self.threads.get(&mode).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self, mode: PersonaMode) -> bool {
        self.thread_for(mode).is_empty()
    }

    pub fn append(&mut self, mode: PersonaMode, message: Message) {
        self.threads.entry(mode).or_default().push(message);
    }

    pub fn replace(&mut self, mode: PersonaMode, messages: Vec<Message>) {
        if messages.is_empty() {
            self.threads.remove(&mode);
        } else {
            self.threads.insert(mode, messages);
        }
    }

    pub fn clear(&mut self, mode: PersonaMode) {
        self.replace(mode, Vec::new());
    }

    /// Removes the most recent user message and everything after it, returning
    /// the removed user text so it can be edited. No-op without a user message.
    pub fn truncate_after_last_user_message(&mut self, mode: PersonaMode) -> Option<String> {
        let thread = self.threads.get_mut(&mode)?;
        let index = thread.iter().rposition(Message::is_from_user)?;
        let text = thread[index].text.clone();
        thread.truncate(index);
        if thread.is_empty() {
            self.threads.remove(&mode);
        }
        Some(text)
    }

    /// A copy of every non-empty thread, for the persisted bundle.
    pub fn snapshot(&self) -> BTreeMap<PersonaMode, Vec<Message>> {
        self.threads.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(store: &MessageStore, mode: PersonaMode) -> Vec<&str> {
        store.thread_for(mode).iter().map(|m| m.text.as_str()).collect()
    }

    #[test]
    fn absent_thread_reads_as_empty() {
        let store = MessageStore::new();
        assert!(store.thread_for(PersonaMode::Chef).is_empty());
        assert!(store.is_empty(PersonaMode::Chef));
    }

    #[test]
    fn threads_are_isolated_per_mode() {
        let mut store = MessageStore::new();
        store.append(PersonaMode::Chef, Message::user("ovos"));
        store.append(PersonaMode::Dj, Message::user("festa"));
        assert_eq!(texts(&store, PersonaMode::Chef), vec!["ovos"]);
        assert_eq!(texts(&store, PersonaMode::Dj), vec!["festa"]);
    }

    #[test]
    fn edit_truncates_from_the_last_user_message() {
        let mut store = MessageStore::new();
        let mode = PersonaMode::Companion;
        store.append(mode, Message::assistant("greet"));
        store.append(mode, Message::user("oi"));
        store.append(mode, Message::assistant("oi!"));

        assert_eq!(store.truncate_after_last_user_message(mode), Some("oi".to_string()));
        assert_eq!(texts(&store, mode), vec!["greet"]);
    }

    #[test]
    fn edit_without_user_message_is_a_noop() {
        let mut store = MessageStore::new();
        let mode = PersonaMode::Companion;
        store.append(mode, Message::assistant("greet"));

        assert_eq!(store.truncate_after_last_user_message(mode), None);
        assert_eq!(texts(&store, mode), vec!["greet"]);
        assert_eq!(store.truncate_after_last_user_message(PersonaMode::Coding), None);
    }

    #[test]
    fn replacing_with_nothing_clears_the_thread() {
        let mut store = MessageStore::new();
        store.append(PersonaMode::Counselor, Message::user("estou triste"));
        store.clear(PersonaMode::Counselor);
        assert!(store.is_empty(PersonaMode::Counselor));
        assert!(store.snapshot().is_empty());
    }
}
