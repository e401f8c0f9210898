//! FIFO queue backed by a circular ring of fixed-size blocks.
//!
//! The ring grows one block at a time instead of reallocating a single
//! contiguous buffer, so a resize moves block handles only; the stored
//! items stay where they are. Within a block the items are contiguous,
//! which keeps drains cache-friendly.

/// Number of slots per block.
const BLOCK_SIZE: usize = 4096;

/// First in, first out container over a growing ring of blocks.
pub struct Queue<T> {
    blocks: Vec<Box<[Option<T>]>>,
    head_idx: usize,
    tail_idx: usize,
    head_off: usize,
    tail_off: usize,
}

fn new_block<T>() -> Box<[Option<T>]> {
    std::iter::repeat_with(|| None).take(BLOCK_SIZE).collect()
}

impl<T> Queue<T> {
    /// Create an empty queue with a single backing block.
    #[must_use]
    pub fn new() -> Self {
        Self { blocks: vec![new_block()], head_idx: 0, tail_idx: 0, head_off: 0, tail_off: 0 }
    }

    /// Append an element, growing the ring by one block if the tail
    /// would collide with the head.
    pub fn push(&mut self, item: T) {
        self.blocks[self.tail_idx][self.tail_off] = Some(item);
        self.tail_off += 1;
        if self.tail_off == BLOCK_SIZE {
            self.tail_off = 0;
            self.tail_idx = (self.tail_idx + 1) % self.blocks.len();

            // Ring full: slot a fresh block in right after the old tail.
            // Only the block handles shift, never the stored items.
            if self.tail_idx == self.head_idx {
                self.blocks.insert(self.tail_idx, new_block());
                self.head_idx += 1;
            }
        }
    }

    /// Remove and return the oldest element, clearing its slot so the
    /// queue retains no reference to it.
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let item = self.blocks[self.head_idx][self.head_off].take();
        self.head_off += 1;
        if self.head_off == BLOCK_SIZE {
            self.head_off = 0;
            self.head_idx = (self.head_idx + 1) % self.blocks.len();
        }
        item
    }

    /// Peek at the oldest element without removing it.
    #[must_use]
    pub fn front(&self) -> Option<&T> {
        self.blocks[self.head_idx][self.head_off].as_ref()
    }

    /// Whether the queue holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head_idx == self.tail_idx && self.head_off == self.tail_off
    }

    /// Number of elements currently held, computed from the ring
    /// geometry rather than tracked separately.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.tail_idx > self.head_idx {
            (self.tail_idx - self.head_idx) * BLOCK_SIZE - self.head_off + self.tail_off
        } else if self.tail_idx < self.head_idx {
            (self.blocks.len() - self.head_idx + self.tail_idx) * BLOCK_SIZE - self.head_off
                + self.tail_off
        } else {
            self.tail_off - self.head_off
        }
    }

    /// Empty the queue, clearing every slot in every block so no element
    /// references are retained. The allocated blocks are kept for reuse.
    pub fn reset(&mut self) {
        self.head_idx = 0;
        self.tail_idx = 0;
        self.head_off = 0;
        self.tail_off = 0;
        for block in &mut self.blocks {
            for slot in block.iter_mut() {
                *slot = None;
            }
        }
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}
