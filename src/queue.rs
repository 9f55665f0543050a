//! Bounded, timestamp-ordered async queue
//!
//! Every node reads from exactly one of these. Items come out in
//! non-decreasing timestamp order; items with equal timestamps come out in
//! insertion order. `put` waits while the queue is full, which is the only
//! flow control in a chain: a slow consumer stalls its producers.

use crate::event::{Event, RawMessage};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Anything with a position on the timeline
pub trait Timestamped {
    /// Ordering key in seconds
    fn timestamp(&self) -> f64;
}

impl Timestamped for Event {
    fn timestamp(&self) -> f64 {
        self.start()
    }
}

impl Timestamped for RawMessage {
    fn timestamp(&self) -> f64 {
        self.due
    }
}

struct Entry<T> {
    key: f64,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    // Reversed: BinaryHeap is a max-heap and the earliest entry must come out first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .key
            .total_cmp(&self.key)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Heap<T> {
    entries: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

struct Shared<T> {
    heap: Mutex<Heap<T>>,
    capacity: usize,
    not_empty: Notify,
    not_full: Notify,
}

/// Cloneable handle to a bounded priority queue
pub struct PriorityQueue<T> {
    shared: Arc<Shared<T>>,
}

/// Queue in front of every node
pub type EventQueue = PriorityQueue<Event>;

impl<T> Clone for PriorityQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Timestamped> PriorityQueue<T> {
    /// Create a queue holding at most `capacity` items (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                heap: Mutex::new(Heap {
                    entries: BinaryHeap::with_capacity(capacity),
                    next_seq: 0,
                }),
                capacity: capacity.max(1),
                not_empty: Notify::new(),
                not_full: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Heap<T>> {
        self.shared
            .heap
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `item`, waiting for room if the queue is full
    pub async fn put(&self, item: T) {
        let mut item = item;
        loop {
            match self.try_put(item) {
                Ok(()) => return,
                Err(rejected) => item = rejected,
            }
            self.shared.not_full.notified().await;
        }
    }

    /// Insert `item` if there is room, otherwise hand it back
    pub fn try_put(&self, item: T) -> Result<(), T> {
        {
            let mut heap = self.lock();
            if heap.entries.len() >= self.shared.capacity {
                return Err(item);
            }
            let seq = heap.next_seq;
            heap.next_seq += 1;
            heap.entries.push(Entry {
                key: item.timestamp(),
                seq,
                item,
            });
        }
        self.shared.not_empty.notify_one();
        Ok(())
    }

    /// Remove the earliest item, waiting for one to arrive if the queue is empty
    pub async fn get(&self) -> T {
        loop {
            if let Some(item) = self.try_get() {
                return item;
            }
            self.shared.not_empty.notified().await;
        }
    }

    /// Remove the earliest item if there is one
    pub fn try_get(&self) -> Option<T> {
        let entry = self.lock().entries.pop()?;
        self.shared.not_full.notify_one();
        Some(entry.item)
    }

    /// Timestamp of the earliest item, waiting for one to arrive if the queue is empty
    ///
    /// The item stays in the queue.
    pub async fn next_timestamp(&self) -> f64 {
        loop {
            if let Some(key) = self.lock().entries.peek().map(|entry| entry.key) {
                return key;
            }
            self.shared.not_empty.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}
