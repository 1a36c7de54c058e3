use std::path::PathBuf;
use std::time::Duration;
use clap::{ArgAction, Args};
use tracing_subscriber::EnvFilter;
use crate::core::config::{RunnerConfig, WorkQueues};

/// Flags shared by every benchmark binary. Flatten into the binary's parser.
#[derive(Debug, Clone, Args)]
pub struct RunnerArgs {
    /// Number of concurrent workers [default: 2 x CPU count]
    #[arg(long)]
    pub workers: Option<usize>,

    /// Number of commands to issue, 0 for all of the input
    #[arg(long, visible_alias = "limit", default_value_t = 0)]
    pub requests: u64,

    /// Commands per batch handed to a worker
    #[arg(long, default_value_t = 100)]
    pub batch_size: usize,

    /// Issue the commands. With false only decoding and batching run
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub do_benchmark: bool,

    /// Interval between progress rows, 0 to disable (500ms, 1s, 2m)
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    pub reporting_period: Duration,

    /// Input file [default: stdin]
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Read buffer size in bytes
    #[arg(long, default_value_t = 4 << 20)]
    pub read_buffer_size: usize,

    /// Overall commands per second, 0 for unlimited
    #[arg(long, default_value_t = 0)]
    pub max_rps: u64,

    /// Write the final report as JSON to this file
    #[arg(long)]
    pub json_out_file: Option<PathBuf>,

    /// Free text copied into the report
    #[arg(long, default_value = "")]
    pub metadata_string: String,

    /// Work queues: "shared", "per-worker" or a count
    #[arg(long, default_value = "shared", value_parser = parse_work_queues)]
    pub work_queues: WorkQueues,

    /// Run for this long, rewinding the input file at its end
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Leading commands excluded from every statistic
    #[arg(long, default_value_t = 0)]
    pub burn_in: u64,
}

impl RunnerArgs {
    pub fn into_config(self) -> RunnerConfig {
        let defaults = RunnerConfig::default();
        RunnerConfig {
            workers: self.workers.unwrap_or(defaults.workers),
            batch_size: self.batch_size,
            limit: self.requests,
            load_enabled: self.do_benchmark,
            reporting_period: self.reporting_period,
            input: self.input,
            read_buffer_size: self.read_buffer_size,
            max_rps: self.max_rps,
            json_out_file: self.json_out_file,
            metadata: self.metadata_string,
            work_queues: self.work_queues,
            duration: self.duration,
            burn_in: self.burn_in,
        }
    }
}

/// `500ms`, `1s`, `2m`, `1h`, or a bare number of seconds (`1.5`).
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    let (number, unit) = match text.find(|c: char| c.is_ascii_alphabetic()) {
        Some(pos) => text.split_at(pos),
        None => (text, "s"),
    };

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {:?}", text))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("invalid duration: {:?}", text));
    }

    let secs = match unit {
        "ms" => value / 1000.0,
        "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        _ => return Err(format!("unknown duration unit {:?} in {:?}", unit, text)),
    };
    Ok(Duration::from_secs_f64(secs))
}

pub fn parse_work_queues(text: &str) -> Result<WorkQueues, String> {
    match text {
        "shared" | "1" => Ok(WorkQueues::Shared),
        "per-worker" | "0" => Ok(WorkQueues::PerWorker),
        n => n
            .parse::<usize>()
            .map(WorkQueues::Count)
            .map_err(|_| format!("invalid work queue setting: {:?}", text)),
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
