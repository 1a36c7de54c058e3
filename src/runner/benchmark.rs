use std::io::BufRead;
use crate::dispatch::batch::{Batch, BatchFactory, Decoder, Indexer};
use crate::worker::processor::Processor;

/// Buffered input stream handed to a decoder.
pub type InputReader = Box<dyn BufRead + Send>;

/// Everything a run needs from one target system.
///
/// `decoder` is called again for every rewind of the input. `processor` is
/// called once per worker, on that worker's thread.
pub trait Benchmark: Send + Sync + 'static {
    type Batch: Batch;

    fn decoder(&self, input: InputReader) -> Box<dyn Decoder<<Self::Batch as Batch>::Item>>;

    fn batch_factory(&self) -> Box<dyn BatchFactory<Self::Batch>>;

    /// `partitions` is the number of work queues.
    fn indexer(&self, partitions: usize) -> Box<dyn Indexer<<Self::Batch as Batch>::Item>>;

    fn processor(&self) -> Box<dyn Processor<Self::Batch>>;

    /// Free-form settings copied into the report under `DBSpecificConfigs`.
    fn configuration(&self) -> serde_json::Map<String, serde_json::Value> {
        serde_json::Map::new()
    }
}
