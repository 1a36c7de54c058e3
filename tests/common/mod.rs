#![allow(dead_code)]

use drusbench::core::error::{Error, Result};
use drusbench::dispatch::batch::{Batch, BatchFactory, Decoder};
use drusbench::dispatch::channel::{DuplexChannel, WorkerEndpoint};
use drusbench::lines::command::Command;
use drusbench::lines::processor::{CommandExecutor, ExecutorFactory, Reply};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Batch of read positions.
#[derive(Debug, Default)]
pub struct Ids(pub Vec<u64>);

impl Batch for Ids {
    type Item = u64;
    fn len(&self) -> usize { self.0.len() }
    fn append(&mut self, item: u64) { self.0.push(item) }
    fn clear(&mut self) { self.0.clear() }
}

pub struct IdsFactory;

impl BatchFactory<Ids> for IdsFactory {
    fn new_batch(&self) -> Ids {
        Ids::default()
    }
}

/// Yields 1..=end, then optionally fails instead of reporting EOF.
pub struct Counter {
    pub next: u64,
    pub end: u64,
    pub fail_at_end: bool,
}

impl Counter {
    pub fn new(end: u64) -> Self {
        Counter { next: 0, end, fail_at_end: false }
    }
}

impl Decoder<u64> for Counter {
    fn decode(&mut self) -> Result<Option<u64>> {
        if self.next == self.end {
            if self.fail_at_end {
                return Err(Error::decode("truncated input"));
            }
            return Ok(None);
        }
        self.next += 1;
        Ok(Some(self.next))
    }
}

/// Consumer thread that records every batch it receives, optionally slowly.
pub fn spawn_consumer(endpoint: WorkerEndpoint<Ids>, delay: Duration) -> JoinHandle<Vec<Vec<u64>>> {
    thread::spawn(move || {
        let mut seen = Vec::new();
        while let Some(batch) = endpoint.recv() {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            seen.push(batch.0);
            endpoint.send_to_scanner();
        }
        seen
    })
}

pub fn channels(queues: usize, capacity: usize) -> (Vec<DuplexChannel<Ids>>, Vec<WorkerEndpoint<Ids>>) {
    (0..queues).map(|_| DuplexChannel::new(capacity)).unzip()
}

pub fn close_all(channels: &mut [DuplexChannel<Ids>]) {
    for channel in channels.iter_mut() {
        channel.close();
    }
}

/// In-memory target: fails commands named `FAIL`, panics on `PANIC`.
pub struct MemoryTarget;

impl CommandExecutor for MemoryTarget {
    fn execute(&mut self, command: &Command) -> Result<Reply> {
        match command.name.as_str() {
            "FAIL" => Err(Error::execution("rejected")),
            "PANIC" => panic!("target crashed"),
            "FT.AGGREGATE" => Ok(Reply { rx_bytes: 8, timed_out: false, cursor: Some(1) }),
            _ => Ok(Reply { rx_bytes: 8, ..Reply::default() }),
        }
    }

    fn read_cursor(&mut self, _command: &Command, _cursor: u64) -> Result<Reply> {
        Ok(Reply { rx_bytes: 4, ..Reply::default() })
    }
}

pub fn memory_target() -> ExecutorFactory {
    Arc::new(|_: usize| -> Result<Box<dyn CommandExecutor>> { Ok(Box::new(MemoryTarget)) })
}

/// `count` rows cycling through reads, writes and updates.
pub fn command_rows(count: usize) -> String {
    let mut rows = String::new();
    for i in 0..count {
        match i % 3 {
            0 => rows.push_str(&format!("READ,R1,GET,key:{}\n", i)),
            1 => rows.push_str(&format!("WRITE,W1,SET,key:{},\"v,{}\"\n", i, i)),
            _ => rows.push_str(&format!("UPDATE,U1,SET,key:{},v\n", i)),
        }
    }
    rows
}
