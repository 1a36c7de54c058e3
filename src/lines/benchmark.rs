use bytes::Bytes;
use crate::dispatch::batch::{BatchFactory, Decoder, Indexer, ModuloIndexer};
use crate::lines::batch::{RowBatch, RowBatchFactory};
use crate::lines::decoder::{LineDecoder, DEFAULT_MAX_LINE_LEN};
use crate::lines::processor::{CommandProcessor, ExecutorFactory};
use crate::runner::benchmark::{Benchmark, InputReader};
use crate::worker::processor::Processor;

/// Replays a file of pre-formatted command rows against a target.
pub struct LineBenchmark {
    connect: ExecutorFactory,
    continue_on_error: bool,
    batch_capacity: usize,
    max_line_len: usize,
    configuration: serde_json::Map<String, serde_json::Value>,
}

impl LineBenchmark {
    pub fn new(connect: ExecutorFactory) -> Self {
        LineBenchmark {
            connect,
            continue_on_error: false,
            batch_capacity: 100,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            configuration: serde_json::Map::new(),
        }
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Preallocated rows per batch. Match the runner's batch size.
    pub fn with_batch_capacity(mut self, capacity: usize) -> Self {
        self.batch_capacity = capacity;
        self
    }

    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    /// Adds a target-specific setting to the report.
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.configuration.insert(key.into(), value.into());
        self
    }
}

impl Benchmark for LineBenchmark {
    type Batch = RowBatch;

    fn decoder(&self, input: InputReader) -> Box<dyn Decoder<Bytes>> {
        Box::new(LineDecoder::with_max_line_len(input, self.max_line_len))
    }

    fn batch_factory(&self) -> Box<dyn BatchFactory<RowBatch>> {
        Box::new(RowBatchFactory { capacity: self.batch_capacity })
    }

    fn indexer(&self, partitions: usize) -> Box<dyn Indexer<Bytes>> {
        Box::new(ModuloIndexer::new(partitions))
    }

    fn processor(&self) -> Box<dyn Processor<RowBatch>> {
        Box::new(CommandProcessor::new(self.connect.clone(), self.continue_on_error))
    }

    fn configuration(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut configuration = self.configuration.clone();
        configuration.insert("continueOnError".to_string(), self.continue_on_error.into());
        configuration
    }
}
