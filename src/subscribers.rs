use std::collections::BTreeSet;
use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// A chat endpoint that receives alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Enrolled chats. Only subscribe/unsubscribe mutate it; broadcasts work on
/// a [`snapshot`](SubscriberSet::snapshot) so concurrent changes do not
/// affect a send already in progress.
#[derive(Debug, Default)]
pub struct SubscriberSet {
    inner: RwLock<BTreeSet<ChatId>>,
}

impl SubscriberSet {
    pub fn new(initial: impl IntoIterator<Item = ChatId>) -> Self {
        Self {
            inner: RwLock::new(initial.into_iter().collect()),
        }
    }

    /// Returns `false` if the chat was already subscribed.
    pub fn subscribe(&self, chat: ChatId) -> bool {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(chat)
    }

    /// Returns `false` if the chat was not subscribed.
    pub fn unsubscribe(&self, chat: ChatId) -> bool {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&chat)
    }

    pub fn contains(&self, chat: ChatId) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&chat)
    }

    pub fn snapshot(&self) -> Vec<ChatId> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_and_unsubscribe_report_changes() {
        let set = SubscriberSet::new([ChatId(1)]);
        assert!(!set.subscribe(ChatId(1)));
        assert!(set.subscribe(ChatId(2)));
        assert_eq!(set.len(), 2);
        assert!(set.unsubscribe(ChatId(1)));
        assert!(!set.unsubscribe(ChatId(1)));
        assert!(!set.contains(ChatId(1)));
        assert!(set.contains(ChatId(2)));
    }

    #[test]
    fn snapshot_is_detached_from_later_changes() {
        let set = SubscriberSet::new([ChatId(1), ChatId(2)]);
        let snapshot = set.snapshot();
        set.unsubscribe(ChatId(1));
        set.subscribe(ChatId(3));
        assert_eq!(snapshot, vec![ChatId(1), ChatId(2)]);
        assert_eq!(set.snapshot(), vec![ChatId(2), ChatId(3)]);
    }
}
