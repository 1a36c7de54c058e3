use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use crate::core::error::{Error, Result};

/// Bounded link between the scanner and the workers of one partition.
/// Work flows down `to_worker`, one acknowledgment per finished batch flows back.
pub struct DuplexChannel<B> {
    to_worker: Option<Sender<B>>,
    to_scanner: Receiver<()>,
    capacity: usize,
}

/// The worker side of a [`DuplexChannel`]. Clone it once per worker sharing the queue.
pub struct WorkerEndpoint<B> {
    batches: Receiver<B>,
    acks: Sender<()>,
}

// Batches are moved, never copied, so cloning must not require `B: Clone`.
impl<B> Clone for WorkerEndpoint<B> {
    fn clone(&self) -> Self {
        WorkerEndpoint {
            batches: self.batches.clone(),
            acks: self.acks.clone(),
        }
    }
}

impl<B> DuplexChannel<B> {
    /// Both directions get `capacity` slots. The channel keeps no worker-side
    /// handles, so losing every worker shows up as a disconnect instead of a hang.
    pub fn new(capacity: usize) -> (Self, WorkerEndpoint<B>) {
        let capacity = capacity.max(1);
        let (to_worker, batches) = bounded(capacity);
        let (acks, to_scanner) = bounded(capacity);

        let channel = DuplexChannel {
            to_worker: Some(to_worker),
            to_scanner,
            capacity,
        };
        (channel, WorkerEndpoint { batches, acks })
    }

    /// Blocks while the downstream queue is full.
    pub fn send_to_worker(&self, batch: B) -> Result<()> {
        let sender = self.to_worker.as_ref()
            .ok_or_else(|| Error::internal("send on a closed duplex channel"))?;
        sender.send(batch)
            .map_err(|_| Error::internal("every worker of the queue has exited"))
    }

    /// Hands the batch back when the queue has no free slot.
    pub fn try_send_to_worker(&self, batch: B) -> Result<Option<B>> {
        let sender = self.to_worker.as_ref()
            .ok_or_else(|| Error::internal("send on a closed duplex channel"))?;
        match sender.try_send(batch) {
            Ok(()) => Ok(None),
            Err(TrySendError::Full(batch)) => Ok(Some(batch)),
            Err(TrySendError::Disconnected(_)) => {
                Err(Error::internal("every worker of the queue has exited"))
            }
        }
    }

    pub fn acks(&self) -> &Receiver<()> {
        &self.to_scanner
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Batches sent but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.to_worker.as_ref().map(|s| s.len()).unwrap_or(0)
    }

    /// The only termination signal workers observe: their receive loop ends
    /// once the queue drains.
    pub fn close(&mut self) {
        self.to_worker.take();
    }
}

impl<B> WorkerEndpoint<B> {
    /// Next batch, or `None` once the channel is closed and drained.
    pub fn recv(&self) -> Option<B> {
        self.batches.recv().ok()
    }

    /// Releases one unit of scanner credit.
    pub fn send_to_scanner(&self) {
        // fails only after a failed scan, once the runner dropped the channel
        let _ = self.acks.send(());
    }
}
