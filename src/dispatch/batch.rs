use std::sync::atomic::{AtomicUsize, Ordering};
use crossbeam::queue::ArrayQueue;
use crate::core::error::Result;

/// An append-only group of decoded items routed and processed together.
pub trait Batch: Send + 'static {
    type Item;

    fn len(&self) -> usize;

    fn append(&mut self, item: Self::Item);

    /// Truncates to zero length while keeping the allocation for reuse.
    fn clear(&mut self);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Produces empty batches for the scanner to fill.
pub trait BatchFactory<B: Batch>: Send + Sync {
    fn new_batch(&self) -> B;
}

/// Turns the input stream into items. `Ok(None)` is end of input.
pub trait Decoder<T> {
    fn decode(&mut self) -> Result<Option<T>>;
}

/// Picks the partition (and so the work queue) an item goes to.
pub trait Indexer<T> {
    /// `items_read` counts the item itself, so the first item sees 1.
    fn index(&self, items_read: u64, item: &T) -> usize;
}

/// Every item lands on partition 0. Used when all workers share one queue.
pub struct ConstantIndexer;

impl<T> Indexer<T> for ConstantIndexer {
    fn index(&self, _items_read: u64, _item: &T) -> usize {
        0
    }
}

/// Round-robin over partitions by read position.
pub struct ModuloIndexer {
    pub partitions: usize,
}

impl ModuloIndexer {
    pub fn new(partitions: usize) -> Self {
        ModuloIndexer { partitions: partitions.max(1) }
    }
}

impl<T> Indexer<T> for ModuloIndexer {
    fn index(&self, items_read: u64, _item: &T) -> usize {
        (items_read % self.partitions as u64) as usize
    }
}

/// Recycles drained batches so the scanner does not allocate one per dispatch.
pub struct BatchPool<B: Batch> {
    free: ArrayQueue<B>,
    factory: Box<dyn BatchFactory<B>>,
    created: AtomicUsize,
}

impl<B: Batch> BatchPool<B> {
    pub fn new(factory: Box<dyn BatchFactory<B>>, capacity: usize) -> Self {
        BatchPool {
            free: ArrayQueue::new(capacity.max(1)),
            factory,
            created: AtomicUsize::new(0),
        }
    }

    /// A zero-length batch, reused when one is available.
    pub fn acquire(&self) -> B {
        match self.free.pop() {
            Some(batch) => batch,
            None => {
                self.created.fetch_add(1, Ordering::Relaxed);
                self.factory.new_batch()
            }
        }
    }

    /// Returns a drained batch. Dropped if the pool is already full.
    pub fn release(&self, mut batch: B) {
        batch.clear();
        let _ = self.free.push(batch);
    }

    /// Batches built by the factory so far (misses of the free list).
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }
}

impl<B: Batch> BatchFactory<B> for BatchPool<B> {
    fn new_batch(&self) -> B {
        self.acquire()
    }
}
