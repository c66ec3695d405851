pub mod core;
pub mod facility;

use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    error::Error,
    fmt::{Debug, Display},
    str::FromStr,
};
use thiserror::Error;

/// Key of a row in one of the facility tables.
pub trait Id:
    Clone + Eq + Ord + Display + Debug + Serialize + for<'de> Deserialize<'de>
{
    type Inner: FromStr;
}

/// A recorded state mutation of an aggregate.
pub trait Change: Clone + PartialEq + Debug + Serialize + for<'a> Deserialize<'a> {
    type Id;
}

pub trait Entity {
    type Id: Id;

    const ENTITY_NAME: &'static str;

    fn id(&self) -> Self::Id;
}

pub trait Aggregation: Entity {
    type Change: Change<Id = Self::Id>;

    fn changes(&self) -> &ChangeQueue<Self::Change>;
    fn changes_mut(&mut self) -> &mut ChangeQueue<Self::Change>;
    fn pop(&mut self) -> Option<Self::Change> {
        self.changes_mut().pop()
    }
    fn pop_all(&mut self) -> Vec<Self::Change> {
        let mut changes = Vec::new();
        while let Some(c) = self.pop() {
            changes.push(c);
        }
        changes
    }
    fn clear(&mut self) {
        self.changes_mut().clear()
    }
    fn peek(&self) -> Option<&Self::Change> {
        self.changes().peek()
    }
    fn iter(&self) -> ChangeQueueIter<'_, Self::Change> {
        self.changes().iter()
    }
}

#[derive(Error, Debug)]
pub enum DataAccessError {
    #[error("Data read error: {0}")]
    ReadError(Box<dyn Error + Send + Sync>),
    #[error("Data write error: {0}")]
    WriteError(Box<dyn Error + Send + Sync>),
    #[error("Client side error: {0}")]
    ClientSideError(Box<dyn Error + Send + Sync>),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChangeQueue<T> {
    queue: VecDeque<T>,
}

impl<T> ChangeQueue<T> {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }
    pub fn peek(&self) -> Option<&T> {
        self.queue.front()
    }
    pub fn push(&mut self, value: T) {
        self.queue.push_back(value)
    }
    pub fn pop(&mut self) -> Option<T> {
        self.queue.pop_front()
    }
    pub fn clear(&mut self) {
        self.queue.clear()
    }
    pub fn len(&self) -> usize {
        self.queue.len()
    }
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
    pub fn iter(&self) -> ChangeQueueIter<'_, T> {
        self.queue.iter()
    }
}

impl<T> IntoIterator for ChangeQueue<T> {
    type Item = T;
    type IntoIter = ChangeQueueIntoIter<T>;
    fn into_iter(self) -> Self::IntoIter {
        self.queue.into_iter()
    }
}

impl<T> Extend<T> for ChangeQueue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.queue.extend(iter)
    }
}

impl<T> Default for ChangeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub type ChangeQueueIntoIter<T> = std::collections::vec_deque::IntoIter<T>;
pub type ChangeQueueIter<'a, T> = std::collections::vec_deque::Iter<'a, T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_queue_is_fifo() {
        let mut queue = ChangeQueue::new();
        assert!(queue.is_empty());
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.peek(), Some(&1));
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.into_iter().collect::<Vec<_>>(), vec![2, 3]);
    }
}
