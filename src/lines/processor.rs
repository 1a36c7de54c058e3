use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use crate::core::error::{Error, Result};
use crate::core::types::{CommandLabel, Stat};
use crate::lines::batch::RowBatch;
use crate::lines::command::{parse_row, Command};
use crate::stats::reporter::epoch_seconds;
use crate::worker::processor::Processor;
use crate::worker::rate_limiter::RateLimiter;

/// What the target returned for one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub rx_bytes: u64,
    pub timed_out: bool,
    /// Non-zero when more results wait behind a cursor.
    pub cursor: Option<u64>,
}

/// Connection to the system under test, owned by one worker.
pub trait CommandExecutor {
    fn execute(&mut self, command: &Command) -> Result<Reply>;

    /// Fetches the next page of a cursor returned by `command`.
    fn read_cursor(&mut self, command: &Command, _cursor: u64) -> Result<Reply> {
        Err(Error::execution(format!("{} does not support cursors", command.name)))
    }

    fn close(&mut self) {}
}

/// Opens the executor of one worker, given the worker index.
pub type ExecutorFactory = Arc<dyn Fn(usize) -> Result<Box<dyn CommandExecutor>> + Send + Sync>;

/// Runs every row of a batch through a [`CommandExecutor`], following cursors.
pub struct CommandProcessor {
    connect: ExecutorFactory,
    executor: Option<Box<dyn CommandExecutor>>,
    continue_on_error: bool,
    worker: usize,
}

impl CommandProcessor {
    pub fn new(connect: ExecutorFactory, continue_on_error: bool) -> Self {
        CommandProcessor {
            connect,
            executor: None,
            continue_on_error,
            worker: 0,
        }
    }

    /// A failed command either becomes an errored stat entry or ends the run.
    fn failed(&self, command: &Command, err: Error) -> Result<()> {
        let err = Error::execution(format!("{} failed: {}. Issued command: {}", command.name, err, command.display()));
        if self.continue_on_error {
            warn!(worker = self.worker, error = %err, "command failed, continuing");
            Ok(())
        } else {
            Err(err)
        }
    }

    fn run_command(&mut self, command: &Command, stat: &mut Stat, limiter: &RateLimiter, use_limiter: bool) -> Result<()> {
        let executor = match self.executor.as_mut() {
            Some(executor) => executor,
            None => return Err(Error::setup(format!("worker {} has no connection", self.worker))),
        };

        if use_limiter {
            limiter.wait();
        }
        let start_ts = epoch_seconds();
        let started = Instant::now();
        let outcome = executor.execute(command);
        let latency = started.elapsed().as_micros() as u64;

        let mut cursor = match outcome {
            Ok(reply) => {
                stat.add_entry(&command.label, &command.query_id, start_ts, latency, false, reply.timed_out, reply.rx_bytes, command.tx_bytes);
                reply.cursor.filter(|&id| id != 0)
            }
            Err(err) => {
                stat.add_entry(&command.label, &command.query_id, start_ts, latency, true, false, 0, command.tx_bytes);
                return self.failed(command, err);
            }
        };

        let cursor_label = CommandLabel::CursorRead.as_str();
        while let Some(id) = cursor {
            if use_limiter {
                limiter.wait();
            }
            let start_ts = epoch_seconds();
            let started = Instant::now();
            let outcome = executor.read_cursor(command, id);
            let latency = started.elapsed().as_micros() as u64;

            match outcome {
                Ok(reply) => {
                    stat.add_entry(cursor_label, &command.query_id, start_ts, latency, false, reply.timed_out, reply.rx_bytes, 0);
                    cursor = reply.cursor.filter(|&id| id != 0);
                }
                Err(err) => {
                    stat.add_entry(cursor_label, &command.query_id, start_ts, latency, true, false, 0, 0);
                    return self.failed(command, err);
                }
            }
        }
        Ok(())
    }
}

impl Processor<RowBatch> for CommandProcessor {
    fn init(&mut self, worker: usize, load_enabled: bool, total_workers: usize) -> Result<()> {
        self.worker = worker;
        if load_enabled {
            let executor = (self.connect)(worker).map_err(|err| {
                Error::setup(format!("worker {}/{} cannot connect: {}", worker, total_workers, err))
            })?;
            self.executor = Some(executor);
        }
        Ok(())
    }

    fn process_batch(&mut self, batch: &mut RowBatch, load_enabled: bool, limiter: &RateLimiter, use_limiter: bool) -> Result<Stat> {
        let mut stat = Stat::new();
        if !load_enabled {
            return Ok(stat);
        }

        for row in &batch.rows {
            let command = match parse_row(row) {
                Ok(command) => command,
                Err(err) if self.continue_on_error => {
                    warn!(worker = self.worker, error = %err, "skipping malformed row");
                    continue;
                }
                Err(err) => return Err(err),
            };
            self.run_command(&command, &mut stat, limiter, use_limiter)?;
        }
        Ok(stat)
    }

    fn close(&mut self, _load_enabled: bool) {
        if let Some(mut executor) = self.executor.take() {
            executor.close();
            debug!(worker = self.worker, "connection closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use crate::dispatch::batch::Batch;

    /// Fails `FAIL`, pages `AGG` through cursors 2 and 1.
    struct ScriptedExecutor;

    impl CommandExecutor for ScriptedExecutor {
        fn execute(&mut self, command: &Command) -> Result<Reply> {
            match command.name.as_str() {
                "FAIL" => Err(Error::execution("boom")),
                "AGG" => Ok(Reply { rx_bytes: 10, timed_out: false, cursor: Some(2) }),
                _ => Ok(Reply { rx_bytes: 4, ..Reply::default() }),
            }
        }

        fn read_cursor(&mut self, _command: &Command, cursor: u64) -> Result<Reply> {
            Ok(Reply { rx_bytes: 5, timed_out: false, cursor: Some(cursor - 1) })
        }
    }

    fn processor(continue_on_error: bool) -> CommandProcessor {
        let connect: ExecutorFactory = Arc::new(|_: usize| -> Result<Box<dyn CommandExecutor>> { Ok(Box::new(ScriptedExecutor)) });
        let mut p = CommandProcessor::new(connect, continue_on_error);
        p.init(0, true, 1).unwrap();
        p
    }

    fn rows(lines: &[&str]) -> RowBatch {
        let mut batch = RowBatch::default();
        for line in lines {
            batch.append(Bytes::copy_from_slice(line.as_bytes()));
        }
        batch
    }

    #[test]
    fn test_cursor_reads_are_recorded() {
        let mut p = processor(false);
        let mut batch = rows(&["READ,R1,AGG,idx,*", "WRITE,W1,SET,k,v"]);
        let stat = p.process_batch(&mut batch, true, &RateLimiter::unlimited(), false).unwrap();

        let labels: Vec<&str> = stat.cmd_stats().iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["READ", "CURSOR_READ", "CURSOR_READ", "WRITE"]);
        assert_eq!(stat.cmds_count(), 4);
        assert_eq!(stat.cmd_stats()[1].rx_bytes, 5);
        assert_eq!(stat.cmd_stats()[3].tx_bytes, "W1,SET,k,v".len() as u64 + 1);
    }

    #[test]
    fn test_continue_on_error_records_failure() {
        let mut p = processor(true);
        let mut batch = rows(&["WRITE,W1,FAIL", "bad row", "READ,R1,GET,k"]);
        let stat = p.process_batch(&mut batch, true, &RateLimiter::unlimited(), false).unwrap();

        assert_eq!(stat.cmds_count(), 2);
        assert!(stat.cmd_stats()[0].error);
        assert!(!stat.cmd_stats()[1].error);
    }

    #[test]
    fn test_error_is_fatal_without_continue() {
        let mut p = processor(false);
        let mut batch = rows(&["WRITE,W1,FAIL"]);
        let err = p.process_batch(&mut batch, true, &RateLimiter::unlimited(), false).unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::Execution);
        assert!(err.context.contains("Issued command: FAIL"));
    }

    #[test]
    fn test_dry_run_issues_nothing() {
        let connect: ExecutorFactory = Arc::new(|_: usize| -> Result<Box<dyn CommandExecutor>> { Err(Error::setup("no target")) });
        let mut p = CommandProcessor::new(connect, false);
        p.init(0, false, 1).unwrap();

        let mut batch = rows(&["READ,R1,GET,k"]);
        let stat = p.process_batch(&mut batch, false, &RateLimiter::unlimited(), false).unwrap();
        assert!(stat.is_empty());
    }

    #[test]
    fn test_connect_failure_is_setup_error() {
        let connect: ExecutorFactory = Arc::new(|_: usize| -> Result<Box<dyn CommandExecutor>> { Err(Error::setup("refused")) });
        let mut p = CommandProcessor::new(connect, false);
        let err = p.init(3, true, 4).unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::Setup);
    }
}
