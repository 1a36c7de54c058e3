use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use crate::core::error::Result;
use crate::core::types::{CmdStat, CommandLabel, Stat};
use crate::stats::histogram::{LatencyHistogram, QuantileMap};
use crate::stats::rates::{calculate_rate, format_bytes, ratio};
use crate::stats::reporter::{DataPoint, DataValue, PeriodQuantiles};
use crate::stats::result::{MeasuredRatios, OverallRates, Totals};

const LABELS: usize = CommandLabel::ALL.len();

/// Key of the all-commands quantiles and time series.
pub const ALL_COMMANDS: &str = "allCommands";

struct LabelSlot {
    cumulative: LatencyHistogram,
    instant: LatencyHistogram,
    errors: u64,
    timeouts: u64,
}

/// Fixed per-label histograms. Guarded by one lock so the all-commands
/// histogram never disagrees with the per-label ones.
struct LabelSet {
    slots: Vec<LabelSlot>,
    total: LatencyHistogram,
    instant_total: LatencyHistogram,
}

/// Cumulative counters at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Counts {
    pub per_label: [u64; LABELS],
    pub total: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
}

impl Counts {
    pub fn label(&self, label: CommandLabel) -> u64 {
        self.per_label[label.index()]
    }
}

/// One reporting period as printed on the console.
#[derive(Debug, Clone)]
pub struct PeriodRow {
    pub counts: Counts,
    pub label_rates: [f64; LABELS],
    pub label_q50_ms: [f64; LABELS],
    pub total_rate: f64,
    pub total_q50_ms: f64,
    pub tx_byte_rate: f64,
    pub rx_byte_rate: f64,
}

/// Shared sink for every measured command of a run.
///
/// Workers call [`record`](Self::record) once per processed batch; the
/// reporter closes periods; the final report reads it after the workers
/// have joined.
pub struct StatsAggregator {
    labels: Mutex<LabelSet>,
    detailed: RwLock<HashMap<String, LatencyHistogram>>,
    per_second: RwLock<BTreeMap<u64, LatencyHistogram>>,
    series: Mutex<BTreeMap<String, Vec<DataPoint>>>,
    template: LatencyHistogram,
    tx_bytes: AtomicU64,
    rx_bytes: AtomicU64,
    burn_in: u64,
    seen: AtomicU64,
}

impl StatsAggregator {
    /// `burn_in` leading commands are discarded before anything is counted.
    pub fn new(burn_in: u64) -> Result<Self> {
        let template = LatencyHistogram::new()?;
        let slots = CommandLabel::ALL
            .iter()
            .map(|_| LabelSlot {
                cumulative: template.empty_like(),
                instant: template.empty_like(),
                errors: 0,
                timeouts: 0,
            })
            .collect();

        Ok(StatsAggregator {
            labels: Mutex::new(LabelSet {
                slots,
                total: template.empty_like(),
                instant_total: template.empty_like(),
            }),
            detailed: RwLock::new(HashMap::new()),
            per_second: RwLock::new(BTreeMap::new()),
            series: Mutex::new(BTreeMap::new()),
            template,
            tx_bytes: AtomicU64::new(0),
            rx_bytes: AtomicU64::new(0),
            burn_in,
            seen: AtomicU64::new(0),
        })
    }

    /// Folds every command of one batch into the histograms and counters.
    pub fn record(&self, stat: &Stat) {
        let measured: Vec<&CmdStat> = stat
            .cmd_stats()
            .iter()
            .filter(|_| self.seen.fetch_add(1, Ordering::Relaxed) >= self.burn_in)
            .collect();
        if measured.is_empty() {
            return;
        }

        {
            let mut labels = self.labels.lock();
            for cmd in &measured {
                let slot = &mut labels.slots[cmd.command_label().index()];
                slot.cumulative.record(cmd.latency_us);
                slot.instant.record(cmd.latency_us);
                if cmd.error {
                    slot.errors += 1;
                }
                if cmd.timed_out {
                    slot.timeouts += 1;
                }
                labels.total.record(cmd.latency_us);
                labels.instant_total.record(cmd.latency_us);
            }
        }

        {
            let mut detailed = self.detailed.write();
            for cmd in &measured {
                detailed
                    .entry(cmd.detail_key())
                    .or_insert_with(|| self.template.empty_like())
                    .record(cmd.latency_us);
            }
        }

        {
            let mut per_second = self.per_second.write();
            for cmd in &measured {
                per_second
                    .entry(cmd.start_ts)
                    .or_insert_with(|| self.template.empty_like())
                    .record(cmd.latency_us);
            }
        }

        let (tx, rx) = measured
            .iter()
            .fold((0u64, 0u64), |(tx, rx), cmd| (tx + cmd.tx_bytes, rx + cmd.rx_bytes));
        self.tx_bytes.fetch_add(tx, Ordering::Relaxed);
        self.rx_bytes.fetch_add(rx, Ordering::Relaxed);
    }

    /// Commands dropped by the burn-in so far.
    pub fn burned_in(&self) -> u64 {
        self.seen.load(Ordering::Relaxed).min(self.burn_in)
    }

    pub fn counts(&self) -> Counts {
        let labels = self.labels.lock();
        self.counts_locked(&labels)
    }

    fn counts_locked(&self, labels: &LabelSet) -> Counts {
        let mut counts = Counts {
            total: labels.total.count(),
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
            ..Counts::default()
        };
        for (i, slot) in labels.slots.iter().enumerate() {
            counts.per_label[i] = slot.cumulative.count();
            counts.errors += slot.errors;
            counts.timeouts += slot.timeouts;
        }
        counts
    }

    /// Ends a reporting period of length `took` that started at `prev`.
    ///
    /// Appends one data point per series stamped `timestamp` and resets the
    /// instant histograms. Cumulative histograms are never reset.
    pub fn close_period(&self, timestamp: u64, took: Duration, prev: &Counts) -> PeriodRow {
        let mut labels = self.labels.lock();
        let counts = self.counts_locked(&labels);

        let mut points = Vec::with_capacity(LABELS + 3);
        let mut row = PeriodRow {
            counts,
            label_rates: [0.0; LABELS],
            label_q50_ms: [0.0; LABELS],
            total_rate: calculate_rate(counts.total, prev.total, took),
            total_q50_ms: labels.total.percentile_ms(50.0),
            tx_byte_rate: calculate_rate(counts.tx_bytes, prev.tx_bytes, took),
            rx_byte_rate: calculate_rate(counts.rx_bytes, prev.rx_bytes, took),
        };

        for label in CommandLabel::ALL {
            let i = label.index();
            let slot = &mut labels.slots[i];
            row.label_rates[i] = calculate_rate(counts.per_label[i], prev.per_label[i], took);
            row.label_q50_ms[i] = slot.cumulative.percentile_ms(50.0);
            points.push((format!("{}Ts", label.report_key()), period_point(timestamp, took, &slot.instant)));
            slot.instant.reset();
        }
        points.push((format!("{}Ts", ALL_COMMANDS), period_point(timestamp, took, &labels.instant_total)));
        labels.instant_total.reset();
        drop(labels);

        points.push(("overallTxByteRateTs".to_string(), scalar_point(timestamp, row.tx_byte_rate)));
        points.push(("overallRxByteRateTs".to_string(), scalar_point(timestamp, row.rx_byte_rate)));

        let mut series = self.series.lock();
        for (key, point) in points {
            series.entry(key).or_default().push(point);
        }
        row
    }

    pub fn totals(&self) -> Totals {
        let counts = self.counts();
        Totals {
            total_ops: counts.total,
            setup_writes: counts.label(CommandLabel::SetupWrite),
            writes: counts.label(CommandLabel::Write),
            reads: counts.label(CommandLabel::Read),
            reads_cursor: counts.label(CommandLabel::CursorRead),
            updates: counts.label(CommandLabel::Update),
            deletes: counts.label(CommandLabel::Delete),
            others: counts.label(CommandLabel::Other),
            errors: counts.errors,
            timeouts: counts.timeouts,
            tx_bytes: counts.tx_bytes,
            rx_bytes: counts.rx_bytes,
        }
    }

    /// Traffic mix. Setup writes count as writes and cursor reads as reads.
    pub fn ratios(&self) -> MeasuredRatios {
        let c = self.counts();
        MeasuredRatios {
            measured_write_ratio: ratio(c.label(CommandLabel::Write) + c.label(CommandLabel::SetupWrite), c.total),
            measured_read_ratio: ratio(c.label(CommandLabel::Read) + c.label(CommandLabel::CursorRead), c.total),
            measured_update_ratio: ratio(c.label(CommandLabel::Update), c.total),
            measured_delete_ratio: ratio(c.label(CommandLabel::Delete), c.total),
        }
    }

    /// Mean rates over the whole run of length `took`.
    pub fn overall_rates(&self, took: Duration) -> OverallRates {
        let counts = self.counts();
        let mut rates = BTreeMap::new();
        for label in CommandLabel::ALL {
            rates.insert(
                format!("{}Rate", label.report_key()),
                calculate_rate(counts.label(label), 0, took),
            );
        }
        for (key, hist) in self.detailed.read().iter() {
            rates.insert(format!("{}Rate", key), calculate_rate(hist.count(), 0, took));
        }

        let tx_rate = calculate_rate(counts.tx_bytes, 0, took);
        let rx_rate = calculate_rate(counts.rx_bytes, 0, took);
        OverallRates {
            rates,
            overall_ops_rate: calculate_rate(counts.total, 0, took),
            overall_tx_byte_rate: tx_rate,
            overall_rx_byte_rate: rx_rate,
            tx_byte_rate_str: format_bytes(tx_rate),
            rx_byte_rate_str: format_bytes(rx_rate),
        }
    }

    /// Quantiles of every cumulative histogram, including the per-query ones.
    pub fn overall_quantiles(&self) -> BTreeMap<String, QuantileMap> {
        let mut quantiles = BTreeMap::new();
        {
            let labels = self.labels.lock();
            for label in CommandLabel::ALL {
                quantiles.insert(
                    label.report_key().to_string(),
                    labels.slots[label.index()].cumulative.quantiles(),
                );
            }
            quantiles.insert(ALL_COMMANDS.to_string(), labels.total.quantiles());
        }
        for (key, hist) in self.detailed.read().iter() {
            quantiles.insert(key.clone(), hist.quantiles());
        }
        quantiles
    }

    /// Every time series, sorted by timestamp.
    pub fn time_series(&self) -> BTreeMap<String, Vec<DataPoint>> {
        let mut series = self.series.lock().clone();
        for points in series.values_mut() {
            points.sort_by_key(|p| p.timestamp);
        }
        series
    }

    /// Per-second histograms keyed by epoch second, encoded for offline merging.
    pub fn per_second_encoded(&self) -> Result<BTreeMap<u64, String>> {
        self.per_second
            .read()
            .par_iter()
            .map(|(second, hist)| -> Result<(u64, String)> { Ok((*second, hist.encode()?)) })
            .collect()
    }

    pub fn per_second_count(&self) -> usize {
        self.per_second.read().len()
    }
}

fn period_point(timestamp: u64, took: Duration, instant: &LatencyHistogram) -> DataPoint {
    DataPoint {
        timestamp,
        value: DataValue::Quantiles(PeriodQuantiles {
            quantiles: instant.quantiles(),
            rate: calculate_rate(instant.count(), 0, took),
        }),
    }
}

fn scalar_point(timestamp: u64, value: f64) -> DataPoint {
    DataPoint {
        timestamp,
        value: DataValue::Scalar(value),
    }
}
