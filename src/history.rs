//! Bounded buffer of recent events, oldest first

use std::collections::VecDeque;

use crate::types::{Category, Event, Timestamp};

#[derive(Debug, Clone)]
pub struct EventHistory {
    events: VecDeque<Event>,
    capacity: usize,
}

impl EventHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append an event, evicting the oldest on overflow
    pub fn push(&mut self, event: Event) -> Option<Event> {
        self.events.push_back(event);
        if self.events.len() > self.capacity {
            self.events.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&Event> {
        self.events.back()
    }

    /// Event by relative position: 0 is the latest, 1 the one before, ...
    pub fn back(&self, offset: usize) -> Option<&Event> {
        let idx = self.events.len().checked_sub(offset + 1)?;
        self.events.get(idx)
    }

    /// Oldest-first iterator
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Event> {
        self.events.iter()
    }

    /// Events strictly after `t`, oldest first
    pub fn after(&self, t: Timestamp) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| e.timestamp > t)
    }

    /// First event strictly after `t`
    pub fn first_after(&self, t: Timestamp) -> Option<&Event> {
        self.after(t).next()
    }

    /// First `n` events after `t` that are not of `category`
    pub fn first_after_excluding(&self, t: Timestamp, category: Category, n: usize) -> Vec<&Event> {
        self.after(t)
            .filter(|e| e.category != category)
            .take(n)
            .collect()
    }

    /// Trailing run of events not of `category`, with the event that ended the
    /// previous run (if still in the buffer)
    pub fn streak_without(&self, category: Category) -> (usize, Option<&Event>) {
        let mut count = 0;
        for event in self.events.iter().rev() {
            if event.category == category {
                return (count, Some(event));
            }
            count += 1;
        }
        (count, None)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.events.iter().any(|e| e.id.as_deref() == Some(id))
    }

    /// Most-recent-first copy of the last `limit` events
    pub fn recent(&self, limit: usize) -> Vec<Event> {
        self.events.iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset, TimeZone};

    fn at(secs: i64) -> Timestamp {
        FixedOffset::west_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 10, 14, 0, 0)
            .unwrap()
            + Duration::seconds(secs)
    }

    fn ev(category: Category, value: i64, secs: i64) -> Event {
        Event::new(category, value, at(secs))
    }

    #[test]
    fn test_bounded_eviction() {
        let mut history = EventHistory::new(3);
        for i in 0..5 {
            history.push(ev(Category::Red, i, i * 30));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.back(0).unwrap().value, 4);
        assert_eq!(history.back(2).unwrap().value, 2);
        assert!(history.back(3).is_none());
    }

    #[test]
    fn test_first_after() {
        let mut history = EventHistory::new(10);
        history.push(ev(Category::White, 0, 0));
        history.push(ev(Category::White, 0, 30));
        history.push(ev(Category::Red, 5, 60));
        history.push(ev(Category::Black, 9, 90));

        assert_eq!(history.first_after(at(0)).unwrap().timestamp, at(30));
        let followers = history.first_after_excluding(at(0), Category::White, 2);
        assert_eq!(followers.iter().map(|e| e.value).collect::<Vec<_>>(), vec![5, 9]);
        assert!(history.first_after(at(90)).is_none());
    }

    #[test]
    fn test_streak_without() {
        let mut history = EventHistory::new(10);
        history.push(ev(Category::Red, 1, 0));
        let (count, last) = history.streak_without(Category::White);
        assert_eq!(count, 1);
        assert!(last.is_none());

        history.push(ev(Category::White, 0, 30));
        history.push(ev(Category::Red, 3, 60));
        history.push(ev(Category::Black, 8, 90));
        let (count, last) = history.streak_without(Category::White);
        assert_eq!(count, 2);
        assert_eq!(last.unwrap().timestamp, at(30));
    }

    #[test]
    fn test_contains_id() {
        let mut history = EventHistory::new(10);
        history.push(ev(Category::Red, 1, 0).with_id("abc"));
        assert!(history.contains_id("abc"));
        assert!(!history.contains_id("def"));
    }
}
