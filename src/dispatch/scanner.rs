use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use crossbeam::channel::Select;
use tracing::{debug, info};
use crate::core::error::{Error, Result};
use crate::dispatch::batch::{Batch, BatchFactory, Decoder, Indexer};
use crate::dispatch::channel::DuplexChannel;

/// Outstanding batches allowed per unit of queue capacity.
pub const OUTSTANDING_FACTOR: usize = 3;

/// What a scan did. `outstanding_at_exit` is always 0 on success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub items_read: u64,
    pub batches_dispatched: u64,
    pub peak_outstanding: usize,
    pub outstanding_limit: usize,
    pub outstanding_at_exit: usize,
    pub rewinds: u64,
}

/// Cooperative stop flag, checked once per scan iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Reopens the input for another pass. `Ok(None)` means it cannot be rewound.
pub type Rewind<'r, T> = Box<dyn FnMut() -> Result<Option<Box<dyn Decoder<T>>>> + 'r>;

/// Extra stop conditions of a fixed-duration run.
pub struct TimedScan<'r, T> {
    pub deadline: Option<Duration>,
    pub cancel: CancelToken,
    pub rewind: Rewind<'r, T>,
}

/// Fills per-partition batches and feeds them to the channels under a credit budget.
///
/// A batch is outstanding from the moment it is handed off (sent or queued)
/// until its acknowledgment comes back.
struct Dispatcher<'c, B: Batch> {
    channels: &'c [DuplexChannel<B>],
    factory: &'c dyn BatchFactory<B>,
    batch_size: usize,
    filling: Vec<B>,
    unsent: Vec<VecDeque<B>>,
    select: Select<'c>,
    outstanding: usize,
    summary: ScanSummary,
}

impl<'c, B: Batch> Dispatcher<'c, B> {
    fn new(
        channels: &'c [DuplexChannel<B>],
        factory: &'c dyn BatchFactory<B>,
        batch_size: usize,
    ) -> Result<Self> {
        if batch_size < 1 {
            return Err(Error::config("--batch-size cannot be less than 1"));
        }
        if channels.is_empty() {
            return Err(Error::config("at least one work queue is required"));
        }

        let mut select = Select::new();
        for channel in channels {
            select.recv(channel.acks());
        }

        let outstanding_limit = channels.len() * channels[0].capacity() * OUTSTANDING_FACTOR;

        Ok(Dispatcher {
            channels,
            factory,
            batch_size,
            filling: (0..channels.len()).map(|_| factory.new_batch()).collect(),
            unsent: (0..channels.len()).map(|_| VecDeque::new()).collect(),
            select,
            outstanding: 0,
            summary: ScanSummary {
                outstanding_limit,
                ..ScanSummary::default()
            },
        })
    }

    fn budget_exhausted(&self) -> bool {
        self.outstanding >= self.summary.outstanding_limit
    }

    /// Takes at most one acknowledgment, blocking only once the budget is spent.
    fn poll_ack(&mut self) -> Result<()> {
        let blocking = self.budget_exhausted();
        self.receive_ack(blocking)?;
        Ok(())
    }

    fn receive_ack(&mut self, blocking: bool) -> Result<bool> {
        let oper = if blocking {
            self.select.select()
        } else {
            match self.select.try_select() {
                Ok(oper) => oper,
                Err(_) => return Ok(false),
            }
        };
        let idx = oper.index();
        if oper.recv(self.channels[idx].acks()).is_err() {
            return Err(Error::internal(format!(
                "workers of queue {} exited with {} batches outstanding",
                idx, self.outstanding
            )));
        }
        self.ack_and_maybe_send(idx)?;
        Ok(true)
    }

    /// Credit came back for `idx`: the next queued batch of that partition goes out.
    ///
    /// Never blocks on the downstream queue. A worker may be blocked sending
    /// an ack, so a full queue keeps the batch at the head of the pending list;
    /// the batches filling the queue will each ack again.
    fn ack_and_maybe_send(&mut self, idx: usize) -> Result<()> {
        self.outstanding = self.outstanding.checked_sub(1)
            .ok_or_else(|| Error::internal("acknowledgment without an outstanding batch"))?;
        if let Some(batch) = self.unsent[idx].pop_front() {
            match self.channels[idx].try_send_to_worker(batch)? {
                None => self.summary.batches_dispatched += 1,
                Some(batch) => self.unsent[idx].push_front(batch),
            }
        }
        Ok(())
    }

    fn push(&mut self, indexer: &dyn Indexer<B::Item>, item: B::Item) -> Result<()> {
        self.summary.items_read += 1;
        let idx = indexer.index(self.summary.items_read, &item);
        if idx >= self.filling.len() {
            return Err(Error::internal(format!(
                "indexer picked partition {} of {}",
                idx,
                self.filling.len()
            )));
        }

        self.filling[idx].append(item);
        if self.filling[idx].len() >= self.batch_size {
            let full = mem::replace(&mut self.filling[idx], self.factory.new_batch());
            self.hand_off(idx, full)?;
        }
        Ok(())
    }

    /// Sends directly when the queue has room and nothing is waiting ahead of
    /// the batch, otherwise queues it behind the partition's pending batches.
    fn hand_off(&mut self, idx: usize, batch: B) -> Result<()> {
        if self.budget_exhausted() {
            self.receive_ack(true)?;
        }

        self.outstanding += 1;
        self.summary.peak_outstanding = self.summary.peak_outstanding.max(self.outstanding);

        if self.unsent[idx].is_empty() {
            match self.channels[idx].try_send_to_worker(batch)? {
                None => self.summary.batches_dispatched += 1,
                Some(batch) => self.unsent[idx].push_back(batch),
            }
        } else {
            self.unsent[idx].push_back(batch);
        }
        Ok(())
    }

    /// Flushes partial batches, then waits for every credit to return.
    /// Nothing may be sent once this returns, so the channels are safe to close.
    fn finish(mut self, read_error: Option<Error>) -> Result<ScanSummary> {
        for idx in 0..self.filling.len() {
            if !self.filling[idx].is_empty() {
                let last = mem::replace(&mut self.filling[idx], self.factory.new_batch());
                self.hand_off(idx, last)?;
            }
        }

        while self.outstanding > 0 {
            self.receive_ack(true)?;
        }

        self.summary.outstanding_at_exit = self.outstanding;
        debug!(
            items = self.summary.items_read,
            batches = self.summary.batches_dispatched,
            peak_outstanding = self.summary.peak_outstanding,
            "scan drained"
        );

        match read_error {
            Some(err) => Err(err),
            None => Ok(self.summary),
        }
    }
}

/// Reads items until `limit` (0 = no limit) or end of input and dispatches them
/// in batches of `batch_size` to the channel picked by `indexer`.
///
/// Returns only after every dispatched batch was acknowledged. A decode error
/// still goes through the full flush and drain before it is returned.
pub fn scan_with_indexer<B: Batch>(
    channels: &[DuplexChannel<B>],
    batch_size: usize,
    limit: u64,
    decoder: &mut dyn Decoder<B::Item>,
    factory: &dyn BatchFactory<B>,
    indexer: &dyn Indexer<B::Item>,
) -> Result<ScanSummary> {
    let mut dispatcher = Dispatcher::new(channels, factory, batch_size)?;
    let mut read_error = None;

    loop {
        if limit > 0 && dispatcher.summary.items_read == limit {
            break;
        }

        dispatcher.poll_ack()?;

        match decoder.decode() {
            Ok(Some(item)) => dispatcher.push(indexer, item)?,
            Ok(None) => break,
            Err(err) => {
                read_error = Some(err);
                break;
            }
        }
    }

    dispatcher.finish(read_error)
}

/// Like [`scan_with_indexer`], but also stops on a deadline or cancellation,
/// and rewinds the input at EOF while a limit or deadline still asks for more.
pub fn scan_with_timeout<'r, B: Batch>(
    channels: &[DuplexChannel<B>],
    batch_size: usize,
    limit: u64,
    mut decoder: Box<dyn Decoder<B::Item>>,
    factory: &dyn BatchFactory<B>,
    indexer: &dyn Indexer<B::Item>,
    mut timed: TimedScan<'r, B::Item>,
) -> Result<ScanSummary> {
    let mut dispatcher = Dispatcher::new(channels, factory, batch_size)?;
    let mut read_error = None;
    let started = Instant::now();
    let mut read_since_rewind = 0u64;

    loop {
        if timed.cancel.is_cancelled() {
            info!(items = dispatcher.summary.items_read, "scan cancelled");
            break;
        }
        if timed.deadline.is_some_and(|d| started.elapsed() >= d) {
            break;
        }
        if limit > 0 && dispatcher.summary.items_read == limit {
            break;
        }

        dispatcher.poll_ack()?;

        match decoder.decode() {
            Ok(Some(item)) => {
                read_since_rewind += 1;
                dispatcher.push(indexer, item)?;
            }
            Ok(None) => {
                if limit == 0 && timed.deadline.is_none() {
                    break;
                }
                // an empty pass would rewind forever
                if read_since_rewind == 0 {
                    break;
                }
                match (timed.rewind)() {
                    Ok(Some(next)) => {
                        decoder = next;
                        read_since_rewind = 0;
                        dispatcher.summary.rewinds += 1;
                        debug!(rewinds = dispatcher.summary.rewinds, "input rewound");
                    }
                    Ok(None) => break,
                    Err(err) => {
                        read_error = Some(err);
                        break;
                    }
                }
            }
            Err(err) => {
                read_error = Some(err);
                break;
            }
        }
    }

    dispatcher.finish(read_error)
}
