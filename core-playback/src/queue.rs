//! Ordered play queue with a current index.

use crate::error::{PlaybackError, Result};
use crate::model::PlayableItem;

#[derive(Debug, Clone)]
pub struct PlayQueue {
    items: Vec<PlayableItem>,
    index: usize,
}

impl PlayQueue {
    /// Create a queue positioned at `start_index` (clamped to the last item).
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::EmptyQueue`] when `items` is empty.
    pub fn new(items: Vec<PlayableItem>, start_index: usize) -> Result<Self> {
        if items.is_empty() {
            return Err(PlaybackError::EmptyQueue);
        }
        let index = start_index.min(items.len() - 1);
        Ok(Self { items, index })
    }

    pub fn current(&self) -> &PlayableItem {
        &self.items[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_next(&self) -> bool {
        self.index + 1 < self.items.len()
    }

    pub fn peek_next(&self) -> Option<&PlayableItem> {
        self.items.get(self.index + 1)
    }

    /// Move to the next item.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::QueueExhausted`] on the last item.
    pub fn advance(&mut self) -> Result<&PlayableItem> {
        if !self.has_next() {
            return Err(PlaybackError::QueueExhausted);
        }
        self.index += 1;
        Ok(self.current())
    }
}
