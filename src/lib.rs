pub mod core;
pub mod dispatch;
pub mod worker;
pub mod stats;
pub mod runner;
pub mod lines;

/*
┌────────────────────────────────────────────────────────────────────────────────────────────┐
│                            DRUSBENCH RUN ARCHITECTURE                                       │
└────────────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── RUNNER LAYER ───────────────────────────────────────────┐
│                                                                                              │
│  ┌────────────────────────────────────────────────────────────────────────────────────┐    │
│  │                           struct BenchmarkRunner                                    │    │
│  │  ┌──────────────────────────────────────────────────────────────────────────────┐ │    │
│  │  │ config: RunnerConfig              // workers, batch size, limit, queues       │ │    │
│  │  │ run(Arc<impl Benchmark>)          // validate → spawn → scan → close → join   │ │    │
│  │  └──────────────────────────────────────────────────────────────────────────────┘ │    │
│  └────────────────────────────────────────────────────────────────────────────────────┘    │
│                                                                                              │
│  ┌──────────────────────────┐  ┌──────────────────────────┐  ┌──────────────────────────┐  │
│  │ trait Benchmark          │  │ struct RunnerArgs (clap) │  │ struct TestResult (JSON) │  │
│  │ • decoder(input)         │  │ • --workers --requests   │  │ • Totals, Rates          │  │
│  │ • batch_factory()        │  │ • --batch-size           │  │ • OverallQuantiles       │  │
│  │ • indexer(partitions)    │  │ • --work-queues          │  │ • TimeSeries             │  │
│  │ • processor()            │  │ • --duration --burn-in   │  │ • PerSecondEncoded...    │  │
│  └──────────────────────────┘  └──────────────────────────┘  └──────────────────────────┘  │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────────── DISPATCH LAYER ──────────────────────────────────────────┐
│                                                                                              │
│   Decoder ──item──▶ Indexer ──partition──▶ filling batch ──full──▶ DuplexChannel[p]          │
│                                                                     │        ▲               │
│   scan_with_timeout: one thread, outstanding ≤ queues × cap × 3     ▼        │ ack           │
│   flush → drain acks to 0 → close                               to_worker  to_scanner        │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── WORKER LAYER ───────────────────────────────────────────┐
│                                                                                              │
│   WorkerPool: N threads, worker i on queue i % queues                                        │
│   recv batch → Processor::process_batch(batch, load, &RateLimiter) → Stat                    │
│              → StatsAggregator::record(&Stat) → release batch to BatchPool → ack             │
│   FatalSignal: first processor error cancels the scan, workers keep acking                   │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌───────────────────────────────────── STATS LAYER ───────────────────────────────────────────┐
│                                                                                              │
│  ┌────────────────────────────────────────────────────────────────────────────────────┐    │
│  │                           struct StatsAggregator                                    │    │
│  │  ┌──────────────────────────────────────────────────────────────────────────────┐ │    │
│  │  │ labels: Mutex<LabelSet>           // cumulative + instant per label, total    │ │    │
│  │  │ detailed: RwLock<HashMap>         // "LABEL-QUERY" histograms                 │ │    │
│  │  │ per_second: RwLock<BTreeMap>      // histograms by start second               │ │    │
│  │  │ series: Mutex<BTreeMap>           // DataPoint per period                     │ │    │
│  │  │ tx_bytes, rx_bytes: AtomicU64                                                  │ │    │
│  │  └──────────────────────────────────────────────────────────────────────────────┘ │    │
│  └────────────────────────────────────────────────────────────────────────────────────┘    │
│                                                                                              │
│   Reporter thread: tick(period) → close_period → print row, reset instant histograms         │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌───────────────────────────────────── LINES LAYER ───────────────────────────────────────────┐
│                                                                                              │
│   LineBenchmark: LineDecoder (Bytes per line) → RowBatch → ModuloIndexer                     │
│   CommandProcessor: parse "label,query_id,cmd,args..." → CommandExecutor → cursor reads      │
└──────────────────────────────────────────────────────────────────────────────────────────────┘
*/
