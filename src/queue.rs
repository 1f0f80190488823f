//! Priority queue of pending requests.
//!
//! Ordering is strictly by descending priority, then by arrival (FIFO) among
//! equal priorities. Requests waiting out a retry delay are "parked" outside the
//! ordering and re-enter as new arrivals when unparked.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;

struct Slot<K, R> {
    priority: i32,
    seq: u64,
    id: K,
    item: R,
}

impl<K, R> PartialEq for Slot<K, R> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<K, R> Eq for Slot<K, R> {}

impl<K, R> PartialOrd for Slot<K, R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K, R> Ord for Slot<K, R> {
    // Max-heap: higher priority first, then lower sequence (earlier arrival)
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Ready heap plus parked set, keyed by request id.
pub(crate) struct PriorityQueue<K, R> {
    heap: BinaryHeap<Slot<K, R>>,
    parked: HashMap<K, (i32, R)>,
    next_seq: u64,
}

impl<K: Hash + Eq + Copy, R> PriorityQueue<K, R> {
    pub(crate) fn new() -> Self {
        PriorityQueue {
            heap: BinaryHeap::new(),
            parked: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Enqueues as the newest arrival at `priority`.
    pub(crate) fn push(&mut self, id: K, priority: i32, item: R) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Slot {
            priority,
            seq,
            id,
            item,
        });
    }

    /// Removes the highest-priority, earliest-arrived ready item.
    pub(crate) fn pop(&mut self) -> Option<R> {
        self.heap.pop().map(|slot| slot.item)
    }

    /// Holds an item outside the ready ordering until [`unpark`](Self::unpark).
    pub(crate) fn park(&mut self, id: K, priority: i32, item: R) {
        self.parked.insert(id, (priority, item));
    }

    /// Moves a parked item back into the ready heap as a new arrival.
    ///
    /// Returns `false` if it was removed in the meantime.
    pub(crate) fn unpark(&mut self, id: K) -> bool {
        match self.parked.remove(&id) {
            Some((priority, item)) => {
                self.push(id, priority, item);
                true
            }
            None => false,
        }
    }

    /// Removes a ready or parked item by id.
    pub(crate) fn remove(&mut self, id: K) -> Option<R> {
        if let Some((_, item)) = self.parked.remove(&id) {
            return Some(item);
        }
        if !self.heap.iter().any(|slot| slot.id == id) {
            return None;
        }
        let mut removed = None;
        let remaining: Vec<_> = std::mem::take(&mut self.heap)
            .into_vec()
            .into_iter()
            .filter_map(|slot| {
                if slot.id == id && removed.is_none() {
                    removed = Some(slot.item);
                    None
                } else {
                    Some(slot)
                }
            })
            .collect();
        self.heap = BinaryHeap::from(remaining);
        removed
    }

    /// Takes every ready and parked item, leaving the queue empty.
    pub(crate) fn drain_all(&mut self) -> Vec<R> {
        let mut items: Vec<R> = self.heap.drain().map(|slot| slot.item).collect();
        items.extend(self.parked.drain().map(|(_, (_, item))| item));
        items
    }

    /// Ready items.
    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    /// Items waiting out a retry delay.
    pub(crate) fn parked_len(&self) -> usize {
        self.parked.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<K: Hash + Eq + Copy, R> Default for PriorityQueue<K, R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_order(queue: &mut PriorityQueue<u32, &'static str>) -> Vec<&'static str> {
        std::iter::from_fn(|| queue.pop()).collect()
    }

    #[test]
    fn test_higher_priority_first() {
        let mut queue = PriorityQueue::new();
        queue.push(1, 1, "p1");
        queue.push(2, 5, "p5");
        queue.push(3, 3, "p3");
        assert_eq!(drain_order(&mut queue), vec!["p5", "p3", "p1"]);
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut queue = PriorityQueue::new();
        queue.push(1, 0, "a");
        queue.push(2, 0, "b");
        queue.push(3, 2, "urgent");
        queue.push(4, 0, "c");
        assert_eq!(drain_order(&mut queue), vec!["urgent", "a", "b", "c"]);
    }

    #[test]
    fn test_negative_priorities_sort_last() {
        let mut queue = PriorityQueue::new();
        queue.push(1, -1, "background");
        queue.push(2, 0, "normal");
        assert_eq!(drain_order(&mut queue), vec!["normal", "background"]);
    }

    #[test]
    fn test_unpark_reenters_as_new_arrival() {
        let mut queue = PriorityQueue::new();
        queue.push(1, 0, "retried");
        queue.push(2, 0, "second");
        assert_eq!(queue.pop(), Some("retried"));

        queue.park(1, 0, "retried");
        assert_eq!(queue.parked_len(), 1);
        assert_eq!(queue.len(), 1);

        queue.push(3, 0, "third");
        assert!(queue.unpark(1));
        assert_eq!(queue.parked_len(), 0);
        // No head-of-line position kept from the first attempt
        assert_eq!(drain_order(&mut queue), vec!["second", "third", "retried"]);
    }

    #[test]
    fn test_unpark_after_removal_is_noop() {
        let mut queue: PriorityQueue<u32, &str> = PriorityQueue::new();
        queue.park(7, 0, "x");
        assert_eq!(queue.remove(7), Some("x"));
        assert!(!queue.unpark(7));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_from_heap_keeps_order() {
        let mut queue = PriorityQueue::new();
        queue.push(1, 0, "a");
        queue.push(2, 0, "b");
        queue.push(3, 0, "c");
        assert_eq!(queue.remove(2), Some("b"));
        assert_eq!(queue.remove(2), None);
        assert_eq!(drain_order(&mut queue), vec!["a", "c"]);
    }

    #[test]
    fn test_drain_all_includes_parked() {
        let mut queue = PriorityQueue::new();
        queue.push(1, 0, "ready");
        queue.park(2, 0, "parked");
        let mut drained = queue.drain_all();
        drained.sort_unstable();
        assert_eq!(drained, vec!["parked", "ready"]);
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.parked_len(), 0);
    }
}
