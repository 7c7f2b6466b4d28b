#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex, MutexGuard};

/// One bucket per second, one full rotation per hour.
pub const WHEEL_SIZE: usize = 3600;

pub type SharedWheel = Arc<Mutex<TimeWheel>>;

pub fn shared_wheel() -> SharedWheel {
    Arc::new(Mutex::new(TimeWheel::new()))
}

pub fn lock_wheel(wheel: &SharedWheel) -> MutexGuard<'_, TimeWheel> {
    wheel.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryTask {
    pub order_id: String,
    pub collection_address: String,
    pub chain: String,
}

#[derive(Debug)]
struct Node {
    task: ExpiryTask,
    cycle_count: u64,
    position: usize,
    next: Option<usize>,
}

/// Cyclic expiry scheduler. Buckets are singly linked lists threaded through
/// an arena of nodes by index; freed slots are recycled.
///
/// `current_index` is the bucket the next [`TimeWheel::tick`] sweeps, so an
/// entry scheduled `d` seconds out fires on exactly the `d`-th tick.
#[derive(Debug)]
pub struct TimeWheel {
    buckets: Vec<Option<usize>>,
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    current_index: usize,
    len: usize,
}

impl Default for TimeWheel {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeWheel {
    pub fn new() -> Self {
        Self::with_size(WHEEL_SIZE)
    }

    pub fn with_size(size: usize) -> Self {
        Self {
            buckets: vec![None; size.max(1)],
            nodes: Vec::new(),
            free: Vec::new(),
            current_index: 0,
            len: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn current_index(&self) -> usize {
        self.current_index % self.size()
    }

    /// Returns the bucket the entry landed in. Non-positive delays fire on the
    /// next tick.
    pub fn schedule(&mut self, delay_secs: i64, task: ExpiryTask) -> usize {
        let size = self.size() as u64;
        let ticks = u64::try_from(delay_secs).unwrap_or(0).max(1);
        let offset = ticks - 1;
        let position = ((self.current_index() as u64 + offset % size) % size) as usize;
        let cycle_count = offset / size;

        let node = Node {
            task,
            cycle_count,
            position,
            next: self.buckets[position],
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.buckets[position] = Some(slot);
        self.len += 1;
        position
    }

    /// Sweeps the current bucket and advances by one. Entries whose cycle
    /// count is zero are unlinked and returned; the rest lose one cycle.
    pub fn tick(&mut self) -> Vec<ExpiryTask> {
        if self.current_index >= self.size() {
            self.current_index %= self.size();
        }
        let head_index = self.current_index;
        self.current_index = (self.current_index + 1) % self.size();

        let mut fired = Vec::new();
        let mut prev: Option<usize> = None;
        let mut cursor = self.buckets[head_index];
        while let Some(slot) = cursor {
            let Some(node) = self.nodes[slot].as_mut() else {
                break;
            };
            let next = node.next;
            if node.cycle_count > 0 {
                node.cycle_count -= 1;
                prev = Some(slot);
                cursor = next;
                continue;
            }

            match prev {
                None => self.buckets[head_index] = next,
                Some(p) => {
                    if let Some(prev_node) = self.nodes[p].as_mut() {
                        prev_node.next = next;
                    }
                }
            }
            if let Some(node) = self.nodes[slot].take() {
                debug_assert_eq!(node.position, head_index);
                fired.push(node.task);
            }
            self.free.push(slot);
            self.len -= 1;
            cursor = next;
        }
        fired
    }

    pub fn bucket_len(&self, index: usize) -> usize {
        let mut count = 0;
        let mut cursor = self.buckets.get(index).copied().flatten();
        while let Some(slot) = cursor {
            count += 1;
            cursor = self.nodes[slot].as_ref().and_then(|node| node.next);
        }
        count
    }
}
