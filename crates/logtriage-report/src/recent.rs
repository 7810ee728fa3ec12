//! Bounded buffer of the most recent items by date

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Keeps at most `capacity` items, newest first
///
/// Items with equal dates keep their insertion order.
#[derive(Debug, Clone)]
pub struct RecentBuffer<T> {
    items: VecDeque<(DateTime<Utc>, T)>,
    capacity: usize,
}

impl<T> RecentBuffer<T> {
    /// Create an empty buffer
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert an item, evicting the oldest beyond capacity
    ///
    /// Returns whether the item was retained.
    pub fn push(&mut self, date: DateTime<Utc>, item: T) -> bool {
        let position = self
            .items
            .iter()
            .position(|(existing, _)| *existing < date)
            .unwrap_or(self.items.len());
        if position >= self.capacity {
            return false;
        }

        self.items.insert(position, (date, item));
        self.items.truncate(self.capacity);
        true
    }

    /// Remove items matching a predicate
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        self.items.retain(|(_, item)| keep(item));
    }

    /// Items, newest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter().map(|(_, item)| item)
    }

    /// Number of items held
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing has been kept yet
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Most items ever held
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
