use std::path::PathBuf;
use std::time::Duration;
use crate::core::error::{Error, Result};

/// How many work queues the workers are spread over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkQueues {
    /// One queue per worker.
    PerWorker,
    /// A single queue shared by every worker.
    Shared,
    /// An explicit number of queues, workers assigned round-robin.
    Count(usize),
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub workers: usize,
    pub batch_size: usize,
    pub limit: u64,                        // 0 = read until EOF
    pub load_enabled: bool,                // false = decode-only dry run
    pub reporting_period: Duration,        // zero disables the periodic reporter
    pub input: Option<PathBuf>,            // None = stdin
    pub read_buffer_size: usize,
    pub max_rps: u64,                      // 0 = unlimited
    pub json_out_file: Option<PathBuf>,
    pub metadata: String,
    pub work_queues: WorkQueues,
    pub duration: Option<Duration>,        // timed runs rewind the input until this elapses
    pub burn_in: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            workers: num_cpus::get() * 2,
            batch_size: 100,
            limit: 0,
            load_enabled: true,
            reporting_period: Duration::from_secs(1),
            input: None,
            read_buffer_size: 4 << 20,           // 4MB
            max_rps: 0,
            json_out_file: None,
            metadata: String::new(),
            work_queues: WorkQueues::Shared,
            duration: None,
            burn_in: 0,
        }
    }
}

impl RunnerConfig {
    /// Rejects configurations that cannot run. Called before any thread is spawned.
    pub fn validate(&self) -> Result<()> {
        if self.workers < 1 {
            return Err(Error::config("--workers cannot be less than 1"));
        }
        if self.batch_size < 1 {
            return Err(Error::config("--batch-size cannot be less than 1"));
        }
        if let WorkQueues::Count(queues) = self.work_queues {
            if queues == 0 {
                return Err(Error::config("--work-queues cannot be 0"));
            }
            if queues > self.workers {
                return Err(Error::config(format!(
                    "cannot have more work queues ({}) than workers ({})",
                    queues, self.workers
                )));
            }
        }
        if self.limit > 0 && self.burn_in > self.limit {
            return Err(Error::config(format!(
                "burn-in ({}) is larger than limit ({})",
                self.burn_in, self.limit
            )));
        }
        Ok(())
    }

    pub fn queue_count(&self) -> usize {
        match self.work_queues {
            WorkQueues::PerWorker => self.workers,
            WorkQueues::Shared => 1,
            WorkQueues::Count(n) => n,
        }
    }

    /// Downstream capacity of each queue: the number of workers it serves.
    pub fn workers_per_queue(&self) -> usize {
        self.workers.div_ceil(self.queue_count().max(1))
    }
}
