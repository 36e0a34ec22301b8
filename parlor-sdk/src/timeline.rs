//! Ordered, deduplicated merge of history pages and live events.
//!
//! The invariant after every mutation: messages ascend by
//! `(created_at, id)` and each id appears at most once. History pages come
//! in through [`Timeline::initialize`] and [`Timeline::prepend_older`],
//! live events through [`Timeline::append_live`]; overlap between the two
//! (a message both paged in and received live) resolves to a single entry.

use std::collections::HashSet;

use crate::model::Message;

/// Result of admitting one live event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveAppend {
    /// The message entered the timeline. `scroll_to_bottom` echoes the
    /// caller's auto-scroll intent: true when the viewport was near the
    /// bottom before this mutation, so the presentation layer should follow
    /// the tail.
    Appended { scroll_to_bottom: bool },
    /// A message with this id is already present; the event was a no-op,
    /// not an update.
    Duplicate,
}

#[derive(Debug, Default)]
pub struct Timeline {
    items: Vec<Message>,
    ids: HashSet<i64>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the timeline wholesale with the latest page (ascending).
    pub fn initialize(&mut self, items: Vec<Message>) {
        self.items.clear();
        self.ids.clear();
        for message in items {
            if self.ids.insert(message.id) {
                self.items.push(message);
            }
        }
        self.items.sort_by_key(Message::sort_key);
    }

    /// Insert an older page (ascending) ahead of the current earliest
    /// entries, skipping ids already present.
    ///
    /// Returns how many messages were actually inserted; the caller adjusts
    /// its scroll offset by the height those added so previously visible
    /// content does not jump.
    pub fn prepend_older(&mut self, items: Vec<Message>) -> usize {
        let mut fresh: Vec<Message> = Vec::with_capacity(items.len());
        for message in items {
            if self.ids.insert(message.id) {
                fresh.push(message);
            }
        }
        let inserted = fresh.len();
        if inserted == 0 {
            return 0;
        }
        fresh.append(&mut self.items);
        self.items = fresh;
        self.items.sort_by_key(Message::sort_key);
        inserted
    }

    /// Admit one live event at its sorted position.
    ///
    /// `auto_scroll_intent` is computed by the presentation layer (viewport
    /// within a small threshold of the bottom before this mutation) and
    /// passed through untouched.
    pub fn append_live(&mut self, message: Message, auto_scroll_intent: bool) -> LiveAppend {
        if !self.ids.insert(message.id) {
            return LiveAppend::Duplicate;
        }
        let key = message.sort_key();
        let at = self.items.partition_point(|m| m.sort_key() <= key);
        self.items.insert(at, message);
        LiveAppend::Appended { scroll_to_bottom: auto_scroll_intent }
    }

    /// The ordered sequence, ascending by `(created_at, id)`.
    pub fn messages(&self) -> &[Message] {
        &self.items
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn earliest(&self) -> Option<&Message> {
        self.items.first()
    }

    pub fn latest(&self) -> Option<&Message> {
        self.items.last()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.ids.clear();
    }
}
