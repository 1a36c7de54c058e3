mod common;

use common::*;
use drusbench::core::config::{RunnerConfig, WorkQueues};
use crossbeam::channel::bounded;
use drusbench::core::error::{Error, ErrorKind, Result};
use drusbench::core::types::Stat;
use drusbench::dispatch::batch::{BatchFactory, Decoder, Indexer};
use drusbench::lines::benchmark::LineBenchmark;
use drusbench::runner::benchmark::{Benchmark, InputReader};
use drusbench::runner::runner::BenchmarkRunner;
use drusbench::stats::result::TestResult;
use drusbench::worker::processor::Processor;
use drusbench::worker::rate_limiter::RateLimiter;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

fn config(workers: usize) -> RunnerConfig {
    RunnerConfig {
        workers,
        batch_size: 4,
        reporting_period: Duration::ZERO,
        ..RunnerConfig::default()
    }
}

fn input(text: String) -> InputReader {
    Box::new(Cursor::new(text.into_bytes()))
}

#[test]
fn test_end_to_end_report() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("result.json");
    let runner = BenchmarkRunner::new(RunnerConfig {
        json_out_file: Some(out.clone()),
        metadata: "ci".to_string(),
        reporting_period: Duration::from_millis(10),
        ..config(4)
    });

    let benchmark = LineBenchmark::new(memory_target()).with_setting("target", "memory");
    let result = runner.run_with_input(Arc::new(benchmark), input(command_rows(300))).unwrap();

    assert_eq!(result.totals.total_ops, 300);
    assert_eq!(result.totals.reads, 100);
    assert_eq!(result.totals.writes, 100);
    assert_eq!(result.totals.updates, 100);
    assert_eq!(result.totals.rx_bytes, 300 * 8);
    assert_eq!(result.metadata, "ci");
    assert!((result.measured_ratios.measured_read_ratio - 1.0 / 3.0).abs() < 1e-9);

    let loaded = TestResult::read_json(&out).unwrap();
    assert_eq!(loaded.totals, result.totals);
    assert_eq!(loaded.db_specific_configs["target"], "memory");
    assert_eq!(loaded.db_specific_configs["continueOnError"], false);
    assert!(loaded.overall_quantiles.contains_key("READ-R1"));
    assert!(!loaded.per_second_encoded_histograms.is_empty());

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    for key in ["StartTime", "EndTime", "DurationMillis", "Totals", "MeasuredRatios", "OverallRates", "OverallQuantiles", "TimeSeries", "PerSecondEncodedHistograms"] {
        assert!(json.get(key).is_some(), "missing {}", key);
    }
}

#[test]
fn test_per_worker_queues_and_cursor_reads() {
    let runner = BenchmarkRunner::new(RunnerConfig { work_queues: WorkQueues::PerWorker, ..config(3) });
    let mut rows = command_rows(30);
    rows.push_str("READ,R2,FT.AGGREGATE,idx,*\n");

    let result = runner.run_with_input(Arc::new(LineBenchmark::new(memory_target())), input(rows)).unwrap();
    assert_eq!(result.totals.reads_cursor, 1);
    assert_eq!(result.totals.total_ops, 32);
    assert_eq!(result.workers, 3);
}

#[test]
fn test_limit_and_burn_in() {
    let runner = BenchmarkRunner::new(RunnerConfig { limit: 50, burn_in: 10, ..config(2) });
    let result = runner.run_with_input(Arc::new(LineBenchmark::new(memory_target())), input(command_rows(90))).unwrap();
    assert_eq!(result.totals.total_ops, 40);
    assert_eq!(result.limit, 50);
}

#[test]
fn test_dry_run_issues_nothing() {
    let runner = BenchmarkRunner::new(RunnerConfig { load_enabled: false, ..config(2) });
    let result = runner.run_with_input(Arc::new(LineBenchmark::new(memory_target())), input(command_rows(20))).unwrap();
    assert_eq!(result.totals.total_ops, 0);
    assert_eq!(result.measured_ratios.measured_write_ratio, -1.0);
    assert!(serde_json::to_string(&result).unwrap().find("NaN").is_none());
}

#[test]
fn test_failed_command_is_fatal_by_default() {
    let runner = BenchmarkRunner::new(config(2));
    let mut rows = command_rows(40);
    rows.push_str("WRITE,W9,FAIL,key\n");
    rows.push_str(&command_rows(400));

    let started = Instant::now();
    let err = runner.run_with_input(Arc::new(LineBenchmark::new(memory_target())), input(rows)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Execution);
    assert!(err.context.contains("FAIL"));
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[test]
fn test_continue_on_error_counts_failures() {
    let runner = BenchmarkRunner::new(config(2));
    let mut rows = command_rows(9);
    rows.push_str("WRITE,W9,FAIL,key\nWRITE,W9,FAIL,key\n");

    let benchmark = LineBenchmark::new(memory_target()).with_continue_on_error(true);
    let result = runner.run_with_input(Arc::new(benchmark), input(rows)).unwrap();
    assert_eq!(result.totals.total_ops, 11);
    assert_eq!(result.totals.errors, 2);
}

#[test]
fn test_panicking_processor_aborts_cleanly() {
    let runner = BenchmarkRunner::new(config(2));
    let mut rows = command_rows(10);
    rows.push_str("READ,R1,PANIC\n");
    rows.push_str(&command_rows(100));

    let err = runner.run_with_input(Arc::new(LineBenchmark::new(memory_target())), input(rows)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Internal);
}

#[test]
fn test_config_errors_fail_before_start() {
    let connects = Arc::new(AtomicUsize::new(0));
    let counter = connects.clone();
    let connect = Arc::new(move |_: usize| -> Result<Box<dyn drusbench::lines::processor::CommandExecutor>> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryTarget))
    });

    let runner = BenchmarkRunner::new(RunnerConfig { work_queues: WorkQueues::Count(3), ..config(2) });
    let err = runner.run_with_input(Arc::new(LineBenchmark::new(connect)), input(command_rows(5))).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Config);
    assert_eq!(connects.load(Ordering::SeqCst), 0);
}

#[test]
fn test_timed_run_rewinds_file_input() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rows.csv");
    std::fs::write(&path, command_rows(20)).unwrap();

    let runner = BenchmarkRunner::new(RunnerConfig {
        input: Some(path),
        limit: 50,
        duration: Some(Duration::from_secs(30)),
        ..config(2)
    });
    let result = runner.run(Arc::new(LineBenchmark::new(memory_target()))).unwrap();
    assert_eq!(result.totals.total_ops, 50);
}

/// Counts batches and items without any target. Optionally slow, failing,
/// panicking, or routing items past the last queue.
#[derive(Default)]
struct Tally {
    items: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    delay: Duration,
    fail_on: Option<u64>,
    panic_on: Option<u64>,
    misroute_after: Option<u64>,
}

struct TallyProcessor {
    items: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    delay: Duration,
    fail_on: Option<u64>,
    panic_on: Option<u64>,
}

impl Processor<Ids> for TallyProcessor {
    fn init(&mut self, _worker: usize, _load_enabled: bool, _total_workers: usize) -> Result<()> {
        Ok(())
    }

    fn process_batch(&mut self, batch: &mut Ids, _load_enabled: bool, _limiter: &RateLimiter, _use_limiter: bool) -> Result<Stat> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let mut stat = Stat::new();
        for &id in &batch.0 {
            if Some(id) == self.panic_on {
                panic!("processor crashed on {}", id);
            }
            if Some(id) == self.fail_on {
                return Err(Error::execution(format!("item {} rejected", id)));
            }
            stat.add_entry("WRITE", "W1", 1_700_000_000, 100 + id, false, false, 0, 1);
        }
        self.items.fetch_add(batch.0.len(), Ordering::SeqCst);
        Ok(stat)
    }

    fn close(&mut self, _load_enabled: bool) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Round-robin, then an out-of-range partition once `after` items were read.
struct MisroutingIndexer {
    partitions: usize,
    after: Option<u64>,
}

impl Indexer<u64> for MisroutingIndexer {
    fn index(&self, items_read: u64, _item: &u64) -> usize {
        match self.after {
            Some(after) if items_read > after => self.partitions,
            _ => (items_read % self.partitions as u64) as usize,
        }
    }
}

impl Benchmark for Tally {
    type Batch = Ids;

    fn decoder(&self, input: InputReader) -> Box<dyn Decoder<u64>> {
        let end = std::io::read_to_string(input).map(|s| s.trim().parse().unwrap_or(0)).unwrap_or(0);
        Box::new(Counter::new(end))
    }

    fn batch_factory(&self) -> Box<dyn BatchFactory<Ids>> {
        Box::new(IdsFactory)
    }

    fn indexer(&self, partitions: usize) -> Box<dyn Indexer<u64>> {
        Box::new(MisroutingIndexer { partitions, after: self.misroute_after })
    }

    fn processor(&self) -> Box<dyn Processor<Ids>> {
        Box::new(TallyProcessor {
            items: self.items.clone(),
            closed: self.closed.clone(),
            delay: self.delay,
            fail_on: self.fail_on,
            panic_on: self.panic_on,
        })
    }
}

/// Runs on a separate thread and fails the test instead of hanging it.
fn run_within<BM: Benchmark>(config: RunnerConfig, benchmark: Arc<BM>, items: u64) -> Result<TestResult> {
    let (done, result) = bounded(1);
    thread::spawn(move || {
        let outcome = BenchmarkRunner::new(config).run_with_input(benchmark, input(items.to_string()));
        let _ = done.send(outcome);
    });
    result
        .recv_timeout(Duration::from_secs(30))
        .expect("run did not finish within 30s")
}

#[test]
fn test_workers_join_and_close_after_input_ends() {
    let tally = Arc::new(Tally::default());
    let runner = BenchmarkRunner::new(RunnerConfig { batch_size: 7, ..config(5) });
    let result = runner.run_with_input(tally.clone(), input("1000".to_string())).unwrap();

    assert_eq!(tally.items.load(Ordering::SeqCst), 1000);
    assert_eq!(tally.closed.load(Ordering::SeqCst), 5);
    assert_eq!(result.totals.total_ops, 1000);
    assert_eq!(result.totals.writes, 1000);
    assert_eq!(result.totals.tx_bytes, 1000);
}

#[test]
fn test_panic_on_own_queue_does_not_hang() {
    // item 21 lands on queue 1, whose only worker dies while the others are busy
    let tally = Arc::new(Tally {
        delay: Duration::from_millis(5),
        panic_on: Some(21),
        ..Tally::default()
    });
    let config = RunnerConfig { batch_size: 1, work_queues: WorkQueues::PerWorker, ..config(4) };

    let err = run_within(config, tally.clone(), 5000).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Internal);
    assert_eq!(tally.closed.load(Ordering::SeqCst), 3);
    assert!(tally.items.load(Ordering::SeqCst) < 5000);
}

#[test]
fn test_fatal_error_with_counted_queues() {
    let tally = Arc::new(Tally {
        delay: Duration::from_millis(1),
        fail_on: Some(40),
        ..Tally::default()
    });
    let config = RunnerConfig { batch_size: 2, work_queues: WorkQueues::Count(2), ..config(4) };

    let err = run_within(config, tally.clone(), 5000).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Execution);
    assert!(err.context.contains("item 40"));
    assert_eq!(tally.closed.load(Ordering::SeqCst), 4);
}

#[test]
fn test_out_of_range_partition_aborts_run() {
    let tally = Arc::new(Tally {
        delay: Duration::from_millis(5),
        misroute_after: Some(30),
        ..Tally::default()
    });
    let config = RunnerConfig { batch_size: 1, work_queues: WorkQueues::PerWorker, ..config(4) };

    let err = run_within(config, tally.clone(), 5000).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Internal);
    assert!(err.context.contains("partition"));
    assert_eq!(tally.closed.load(Ordering::SeqCst), 4);
}
