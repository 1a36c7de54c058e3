use bytes::Bytes;
use crate::dispatch::batch::{Batch, BatchFactory};

/// Raw input rows, parsed by the worker that runs them.
#[derive(Debug, Default)]
pub struct RowBatch {
    pub rows: Vec<Bytes>,
}

impl Batch for RowBatch {
    type Item = Bytes;

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn append(&mut self, item: Bytes) {
        self.rows.push(item);
    }

    fn clear(&mut self) {
        self.rows.clear();
    }
}

pub struct RowBatchFactory {
    pub capacity: usize,
}

impl BatchFactory<RowBatch> for RowBatchFactory {
    fn new_batch(&self) -> RowBatch {
        RowBatch { rows: Vec::with_capacity(self.capacity) }
    }
}
