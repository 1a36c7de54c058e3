//! Command replay demo
//!
//! Replays `label,query_id,command,args...` rows against a simulated target
//! with random latency, then prints the summary and optionally a JSON report.
//!
//!   cargo run --example replay -- --generate 20000 > cmds.csv
//!   cargo run --example replay -- --input cmds.csv --workers 8 --json-out-file out.json

use clap::Parser;
use drusbench::core::error::{Error, Result};
use drusbench::lines::benchmark::LineBenchmark;
use drusbench::lines::command::Command;
use drusbench::lines::processor::{CommandExecutor, ExecutorFactory, Reply};
use drusbench::runner::cli::{init_tracing, RunnerArgs};
use drusbench::runner::runner::BenchmarkRunner;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "replay", about = "Replay command rows against a simulated target")]
struct Cli {
    #[command(flatten)]
    runner: RunnerArgs,

    /// Record failed commands and keep going instead of aborting
    #[arg(long)]
    continue_on_error: bool,

    /// Mean simulated latency in microseconds
    #[arg(long, default_value_t = 200)]
    mean_latency_us: u64,

    /// Fraction of commands that fail
    #[arg(long, default_value_t = 0.0)]
    error_rate: f64,

    /// Print this many synthetic rows to stdout and exit
    #[arg(long)]
    generate: Option<u64>,
}

struct SimulatedTarget {
    rng: StdRng,
    mean_latency_us: u64,
    error_rate: f64,
}

impl SimulatedTarget {
    fn respond(&mut self, rx_bytes: u64) -> Result<Reply> {
        let jitter = self.rng.gen_range(0..=self.mean_latency_us.max(1));
        thread::sleep(Duration::from_micros(self.mean_latency_us / 2 + jitter));
        if self.rng.gen_bool(self.error_rate.clamp(0.0, 1.0)) {
            return Err(Error::execution("simulated failure"));
        }
        Ok(Reply { rx_bytes, ..Reply::default() })
    }
}

impl CommandExecutor for SimulatedTarget {
    fn execute(&mut self, command: &Command) -> Result<Reply> {
        let mut reply = self.respond(64 + 16 * command.args.len() as u64)?;
        if command.name == "FT.AGGREGATE" {
            reply.cursor = Some(self.rng.gen_range(0..3));
        }
        Ok(reply)
    }

    fn read_cursor(&mut self, _command: &Command, cursor: u64) -> Result<Reply> {
        let mut reply = self.respond(512)?;
        reply.cursor = Some(cursor.saturating_sub(1));
        Ok(reply)
    }
}

fn generate(rows: u64) -> io::Result<()> {
    let mut rng = rand::thread_rng();
    let mut out = BufWriter::new(io::stdout().lock());
    for i in 0..rows {
        match rng.gen_range(0..10) {
            0 => writeln!(out, "SETUP_WRITE,S1,HSET,doc:{},title,\"setup, {}\"", i, i)?,
            1..=3 => writeln!(out, "WRITE,W1,HSET,doc:{},title,\"doc {}\",score,{}", i, i, rng.gen_range(0..100))?,
            4 => writeln!(out, "UPDATE,U1,HSET,doc:{},score,{}", rng.gen_range(0..=i), rng.gen_range(0..100))?,
            5 => writeln!(out, "DELETE,D1,DEL,doc:{}", rng.gen_range(0..=i))?,
            6 => writeln!(out, "READ,R2,FT.AGGREGATE,idx,*,WITHCURSOR")?,
            _ => writeln!(out, "READ,R1,FT.SEARCH,idx,@title:doc")?,
        }
    }
    out.flush()
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Some(rows) = cli.generate {
        if let Err(err) = generate(rows) {
            eprintln!("Error: {}", err);
            std::process::exit(1);
        }
        return;
    }

    let mean_latency_us = cli.mean_latency_us;
    let error_rate = cli.error_rate;
    let connect: ExecutorFactory = Arc::new(move |worker: usize| -> Result<Box<dyn CommandExecutor>> {
        Ok(Box::new(SimulatedTarget {
            rng: StdRng::seed_from_u64(worker as u64),
            mean_latency_us,
            error_rate,
        }))
    });

    let config = cli.runner.into_config();
    let benchmark = LineBenchmark::new(connect)
        .with_continue_on_error(cli.continue_on_error)
        .with_batch_capacity(config.batch_size)
        .with_setting("target", "simulated")
        .with_setting("meanLatencyUs", mean_latency_us)
        .with_setting("errorRate", error_rate);

    let runner = BenchmarkRunner::new(config);
    if let Err(err) = runner.run(Arc::new(benchmark)) {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}
