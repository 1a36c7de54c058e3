use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use chrono::Utc;
use tracing::{info, warn};
use crate::core::config::RunnerConfig;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::CommandLabel;
use crate::dispatch::batch::{Batch, BatchPool, Decoder};
use crate::dispatch::channel::{DuplexChannel, WorkerEndpoint};
use crate::dispatch::scanner::{scan_with_timeout, CancelToken, Rewind, ScanSummary, TimedScan, OUTSTANDING_FACTOR};
use crate::runner::benchmark::{Benchmark, InputReader};
use crate::stats::aggregator::{StatsAggregator, ALL_COMMANDS};
use crate::stats::reporter::Reporter;
use crate::stats::result::{RunInfo, TestResult};
use crate::worker::pool::{FatalSignal, ProcessorFactory, WorkerPool, WorkerShared};
use crate::worker::rate_limiter::RateLimiter;

/// Drives one benchmark run from input to report.
pub struct BenchmarkRunner {
    config: RunnerConfig,
}

impl BenchmarkRunner {
    pub fn new(config: RunnerConfig) -> Self {
        BenchmarkRunner { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Reads the configured input (file or stdin) and runs it to completion.
    pub fn run<BM: Benchmark>(&self, benchmark: Arc<BM>) -> Result<TestResult> {
        self.config.validate()?;
        let input = self.open_input()?;
        self.execute(benchmark, input, self.config.input.as_deref())
    }

    /// Runs over an already opened input. The input is never rewound.
    pub fn run_with_input<BM: Benchmark>(&self, benchmark: Arc<BM>, input: InputReader) -> Result<TestResult> {
        self.config.validate()?;
        self.execute(benchmark, input, None)
    }

    fn execute<BM: Benchmark>(
        &self,
        benchmark: Arc<BM>,
        input: InputReader,
        reopen: Option<&Path>,
    ) -> Result<TestResult> {
        let config = &self.config;
        let aggregator = Arc::new(StatsAggregator::new(config.burn_in)?);

        let (channels, endpoints) = create_channels::<BM::Batch>(config);
        let queues = channels.len();
        let pool_capacity = queues * config.workers_per_queue() * (OUTSTANDING_FACTOR + 1) + queues;
        let batches = Arc::new(BatchPool::new(benchmark.batch_factory(), pool_capacity));
        let limiter = Arc::new(RateLimiter::new(config.max_rps, config.workers));
        let cancel = CancelToken::new();
        let fatal = Arc::new(FatalSignal::new(cancel.clone()));

        let decoder = benchmark.decoder(input);
        let indexer = benchmark.indexer(queues);

        let processors: ProcessorFactory<BM::Batch> = {
            let benchmark = benchmark.clone();
            Arc::new(move || benchmark.processor())
        };
        let shared = WorkerShared {
            aggregator: aggregator.clone(),
            batches: batches.clone(),
            limiter,
            fatal: fatal.clone(),
            load_enabled: config.load_enabled,
        };

        info!(
            workers = config.workers,
            queues,
            batch_size = config.batch_size,
            limit = config.limit,
            max_rps = config.max_rps,
            load = config.load_enabled,
            "starting run"
        );
        let workers = WorkerPool::spawn(endpoints, config.workers, processors, shared)?;

        let start = Utc::now();
        let started = Instant::now();
        let reporter = if config.reporting_period.is_zero() {
            None
        } else {
            Some(Reporter::spawn(aggregator.clone(), config.reporting_period)?)
        };

        let timed = TimedScan {
            deadline: config.duration,
            cancel,
            rewind: rewind_for(benchmark.as_ref(), reopen, config.read_buffer_size),
        };
        let scanned = scan_with_timeout(
            &channels,
            config.batch_size,
            config.limit,
            decoder,
            batches.as_ref(),
            indexer.as_ref(),
            timed,
        );

        // A failed scan may return with batches still outstanding. Raising it
        // stops the workers from processing what is left in their queues.
        let summary = match scanned {
            Ok(summary) => Some(summary),
            Err(err) => {
                fatal.raise(err);
                None
            }
        };
        // Dropping the channels closes both directions: workers drain their
        // queues and no ack send can block once the scanner is gone.
        drop(channels);
        let joined = workers.join();
        let took = started.elapsed();
        let end = Utc::now();
        if let Some(reporter) = reporter {
            reporter.stop();
        }

        if let Some(err) = fatal.take() {
            return Err(err);
        }
        joined?;
        let summary = summary.ok_or_else(|| Error::internal("scan failed without an error"))?;
        log_scan(&summary, &batches);

        let result = TestResult::compose(
            &aggregator,
            RunInfo {
                start,
                end,
                took,
                metadata: config.metadata.clone(),
                limit: config.limit,
                workers: config.workers,
                max_rps: config.max_rps,
                batch_size: config.batch_size,
                db_specific_configs: benchmark.configuration(),
            },
        )?;

        print_summary(&result, config.workers);
        if let Some(path) = &config.json_out_file {
            result.write_json(path)?;
            info!(path = %path.display(), "wrote report");
        }
        Ok(result)
    }

    fn open_input(&self) -> Result<InputReader> {
        match &self.config.input {
            Some(path) => open_file(path, self.config.read_buffer_size),
            None => Ok(Box::new(BufReader::with_capacity(self.config.read_buffer_size, io::stdin()))),
        }
    }
}

/// One duplex channel per work queue, each sized to the workers it serves.
pub fn create_channels<B>(config: &RunnerConfig) -> (Vec<DuplexChannel<B>>, Vec<WorkerEndpoint<B>>) {
    let per_queue = config.workers_per_queue();
    (0..config.queue_count())
        .map(|_| DuplexChannel::new(per_queue))
        .unzip()
}

fn open_file(path: &Path, buffer_size: usize) -> Result<InputReader> {
    let file = File::open(path).map_err(|err| {
        Error::new(ErrorKind::Io, format!("cannot open {}: {}", path.display(), err))
    })?;
    Ok(Box::new(BufReader::with_capacity(buffer_size, file)))
}

fn rewind_for<'r, BM: Benchmark>(
    benchmark: &'r BM,
    reopen: Option<&'r Path>,
    buffer_size: usize,
) -> Rewind<'r, <BM::Batch as Batch>::Item> {
    match reopen {
        Some(path) => Box::new(move || -> Result<Option<Box<dyn Decoder<_>>>> {
            let input = open_file(path, buffer_size)?;
            Ok(Some(benchmark.decoder(input)))
        }),
        None => Box::new(|| -> Result<Option<Box<dyn Decoder<_>>>> {
            warn!("input cannot be rewound, stopping at end of input");
            Ok(None)
        }),
    }
}

fn log_scan<B: Batch>(summary: &ScanSummary, batches: &BatchPool<B>) {
    info!(
        items = summary.items_read,
        batches = summary.batches_dispatched,
        peak_outstanding = summary.peak_outstanding,
        outstanding_limit = summary.outstanding_limit,
        rewinds = summary.rewinds,
        batches_allocated = batches.created(),
        "scan finished"
    );
}

fn print_summary(result: &TestResult, workers: usize) {
    let took = result.duration_millis as f64 / 1000.0;
    let rates = &result.overall_rates;
    let q50 = |key: &str| result.overall_quantiles.get(key).map(|q| q.q50).unwrap_or(0.0);

    println!();
    println!("Summary:");
    println!("Issued {} Commands in {:.3}sec with {} workers", result.totals.total_ops, took, workers);
    println!("\tOverall stats:");
    println!("\t- {:<14}{:>10.0} ops/sec\tq50 lat {:.3} ms", "Total", rates.overall_ops_rate, q50(ALL_COMMANDS));
    for label in CommandLabel::ALL {
        let key = label.report_key();
        let rate = rates.rates.get(&format!("{}Rate", key)).copied().unwrap_or(0.0);
        if label == CommandLabel::Other && rate <= 0.0 {
            continue;
        }
        println!("\t- {:<14}{:>10.0} ops/sec\tq50 lat {:.3} ms", summary_name(label), rate, q50(key));
    }
    if result.totals.errors > 0 || result.totals.timeouts > 0 {
        println!("\tErrors: {}\tTimeouts: {}", result.totals.errors, result.totals.timeouts);
    }
    println!("\tOverall TX Byte Rate: {}B/sec", rates.tx_byte_rate_str);
    println!("\tOverall RX Byte Rate: {}B/sec", rates.rx_byte_rate_str);
}

fn summary_name(label: CommandLabel) -> &'static str {
    match label {
        CommandLabel::SetupWrite => "Setup Writes",
        CommandLabel::Write => "Writes",
        CommandLabel::Read => "Reads",
        CommandLabel::CursorRead => "Cursor Reads",
        CommandLabel::Update => "Updates",
        CommandLabel::Delete => "Deletes",
        CommandLabel::Other => "Other",
    }
}
