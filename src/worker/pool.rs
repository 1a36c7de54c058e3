use std::sync::Arc;
use std::thread::{self, JoinHandle};
use crossbeam::sync::WaitGroup;
use parking_lot::Mutex;
use tracing::{debug, error};
use crate::core::error::{Error, Result};
use crate::dispatch::batch::{Batch, BatchPool};
use crate::dispatch::channel::WorkerEndpoint;
use crate::dispatch::scanner::CancelToken;
use crate::stats::aggregator::StatsAggregator;
use crate::worker::processor::Processor;
use crate::worker::rate_limiter::RateLimiter;

/// Builds the processor of one worker, on that worker's thread.
pub type ProcessorFactory<B> = Arc<dyn Fn() -> Box<dyn Processor<B>> + Send + Sync>;

/// First fatal error of the run. Raising it also cancels the scanner.
pub struct FatalSignal {
    first: Mutex<Option<Error>>,
    cancel: CancelToken,
}

impl FatalSignal {
    pub fn new(cancel: CancelToken) -> Self {
        FatalSignal {
            first: Mutex::new(None),
            cancel,
        }
    }

    pub fn raise(&self, err: Error) {
        error!(error = %err, "fatal error, stopping the run");
        let mut first = self.first.lock();
        if first.is_none() {
            *first = Some(err);
        }
        self.cancel.cancel();
    }

    pub fn is_raised(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn take(&self) -> Option<Error> {
        self.first.lock().take()
    }
}

/// State every worker of a run shares.
pub struct WorkerShared<B: Batch> {
    pub aggregator: Arc<StatsAggregator>,
    pub batches: Arc<BatchPool<B>>,
    pub limiter: Arc<RateLimiter>,
    pub fatal: Arc<FatalSignal>,
    pub load_enabled: bool,
}

/// One scanner credit. Released on drop, so a panicking processor still acks.
struct Credit<'a, B> {
    endpoint: &'a WorkerEndpoint<B>,
    fatal: &'a FatalSignal,
    worker: usize,
}

impl<B> Drop for Credit<'_, B> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.fatal.raise(Error::internal(format!("worker {} panicked", self.worker)));
        }
        self.endpoint.send_to_scanner();
    }
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    wait_group: WaitGroup,
}

impl WorkerPool {
    /// Starts `workers` threads. Worker `i` consumes `endpoints[i % endpoints.len()]`.
    pub fn spawn<B: Batch>(
        endpoints: Vec<WorkerEndpoint<B>>,
        workers: usize,
        processors: ProcessorFactory<B>,
        shared: WorkerShared<B>,
    ) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(Error::config("at least one work queue is required"));
        }

        let shared = Arc::new(shared);
        let wait_group = WaitGroup::new();
        let mut handles = Vec::with_capacity(workers);

        for worker in 0..workers {
            let endpoint = endpoints[worker % endpoints.len()].clone();
            let processors = processors.clone();
            let shared = shared.clone();
            let done = wait_group.clone();

            let handle = thread::Builder::new()
                .name(format!("bench-worker-{}", worker))
                .spawn(move || {
                    let processor = processors();
                    work(worker, workers, endpoint, processor, &shared);
                    drop(done);
                })?;
            handles.push(handle);
        }

        Ok(WorkerPool { handles, wait_group })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits until every worker has seen its queue close and exited.
    pub fn join(self) -> Result<()> {
        self.wait_group.wait();

        let mut panicked = 0;
        for handle in self.handles {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            return Err(Error::internal(format!("{} workers panicked", panicked)));
        }
        Ok(())
    }
}

/// Worker loop: process and record every batch until the channel closes.
///
/// After a fatal error the worker keeps draining its queue and acking without
/// processing, so the scanner's shutdown still completes.
fn work<B: Batch>(
    worker: usize,
    total_workers: usize,
    endpoint: WorkerEndpoint<B>,
    mut processor: Box<dyn Processor<B>>,
    shared: &WorkerShared<B>,
) {
    if let Err(err) = processor.init(worker, shared.load_enabled, total_workers) {
        shared.fatal.raise(err);
    }
    debug!(worker, "worker started");

    let use_limiter = shared.limiter.is_limited();
    while let Some(mut batch) = endpoint.recv() {
        let credit = Credit {
            endpoint: &endpoint,
            fatal: &shared.fatal,
            worker,
        };

        if !shared.fatal.is_raised() {
            match processor.process_batch(&mut batch, shared.load_enabled, &shared.limiter, use_limiter) {
                Ok(stat) => shared.aggregator.record(&stat),
                Err(err) => shared.fatal.raise(err),
            }
        }

        shared.batches.release(batch);
        drop(credit);
    }

    processor.close(shared.load_enabled);
    debug!(worker, "worker exited");
}
