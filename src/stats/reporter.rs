use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::core::error::Result;
use crate::core::types::CommandLabel;
use crate::stats::aggregator::{PeriodRow, StatsAggregator};
use crate::stats::histogram::QuantileMap;
use crate::stats::rates::format_bytes;

/// One time-series sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataPoint {
    pub timestamp: u64, // epoch seconds
    pub value: DataValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Scalar(f64),
    Quantiles(PeriodQuantiles),
}

/// Quantiles of one period's instant histogram plus its rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodQuantiles {
    #[serde(flatten)]
    pub quantiles: QuantileMap,
    pub rate: f64,
}

/// Columns of the console table, in print order.
const COLUMNS: [CommandLabel; 6] = [
    CommandLabel::SetupWrite,
    CommandLabel::Write,
    CommandLabel::Update,
    CommandLabel::Read,
    CommandLabel::CursorRead,
    CommandLabel::Delete,
];

/// Background thread that closes a reporting period every tick and prints
/// one row of rates per period.
pub struct Reporter {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Reporter {
    pub fn spawn(aggregator: Arc<StatsAggregator>, period: Duration) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = channel::bounded(0);
        let handle = thread::Builder::new()
            .name("bench-reporter".to_string())
            .spawn(move || report_loop(&aggregator, period, shutdown_rx))?;

        Ok(Reporter {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Stops ticking and waits for the thread. No further period is closed.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        drop(self.shutdown.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

fn report_loop(aggregator: &StatsAggregator, period: Duration, shutdown: Receiver<()>) {
    let ticker = channel::tick(period);
    let mut prev_time = Instant::now();
    let mut prev = aggregator.counts();

    println!("{}", header());
    loop {
        select! {
            recv(ticker) -> tick => {
                let Ok(now) = tick else { break };
                let took = now.saturating_duration_since(prev_time);
                let row = aggregator.close_period(epoch_seconds(), took, &prev);
                println!("{}", format_row(&row));
                prev = row.counts;
                prev_time = now;
            }
            recv(shutdown) -> _ => break,
        }
    }
    debug!("reporter stopped");
}

pub(crate) fn epoch_seconds() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

fn header() -> String {
    let mut line = String::new();
    for label in COLUMNS {
        line.push_str(&format!("{:>22}", format!("{} ops/sec", label.report_key())));
    }
    line.push_str(&format!("{:>22}{:>12}{:>12}{:>12}", "current ops/sec", "total ops", "TX BW/s", "RX BW/s"));
    line
}

/// Rates followed by the cumulative q50 latency in ms.
fn format_row(row: &PeriodRow) -> String {
    let mut line = String::new();
    for label in COLUMNS {
        let i = label.index();
        line.push_str(&format!("{:>22}", format!("{:.0} ({:.3})", row.label_rates[i], row.label_q50_ms[i])));
    }
    line.push_str(&format!(
        "{:>22}{:>12}{:>12}{:>12}",
        format!("{:.0} ({:.3})", row.total_rate, row.total_q50_ms),
        row.counts.total,
        format!("{}B/s", format_bytes(row.tx_byte_rate)),
        format!("{}B/s", format_bytes(row.rx_byte_rate)),
    ));
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Stat;

    #[test]
    fn test_data_point_json_shape() {
        let scalar = DataPoint { timestamp: 7, value: DataValue::Scalar(2.5) };
        assert_eq!(
            serde_json::to_string(&scalar).unwrap(),
            r#"{"Timestamp":7,"Value":2.5}"#
        );

        let quantiles = DataPoint {
            timestamp: 8,
            value: DataValue::Quantiles(PeriodQuantiles { quantiles: QuantileMap::default(), rate: 4.0 }),
        };
        let json: serde_json::Value = serde_json::to_value(&quantiles).unwrap();
        assert_eq!(json["Value"]["rate"], 4.0);
        assert_eq!(json["Value"]["q999"], 0.0);
    }

    #[test]
    fn test_reporter_closes_periods() {
        let aggregator = Arc::new(StatsAggregator::new(0).unwrap());
        let mut stat = Stat::new();
        stat.add_entry("READ", "R1", 1, 100, false, false, 0, 0);
        aggregator.record(&stat);

        let reporter = Reporter::spawn(aggregator.clone(), Duration::from_millis(20)).unwrap();
        thread::sleep(Duration::from_millis(110));
        reporter.stop();

        let series = aggregator.time_series();
        let points = series.get("readTs").map(|p| p.len()).unwrap_or(0);
        assert!(points >= 2, "expected several periods, got {}", points);

        // stopped: no more periods
        thread::sleep(Duration::from_millis(50));
        assert_eq!(aggregator.time_series()["readTs"].len(), points);
    }

    #[test]
    fn test_row_layout() {
        let row = PeriodRow {
            counts: Default::default(),
            label_rates: [1.0; 7],
            label_q50_ms: [0.5; 7],
            total_rate: 6.0,
            total_q50_ms: 0.5,
            tx_byte_rate: 2048.0,
            rx_byte_rate: -1.0,
        };
        let line = format_row(&row);
        assert!(line.contains("6 (0.500)"));
        assert!(line.contains("2KB/s"));
        assert!(line.contains("-B/s"));
        assert_eq!(header().len(), line.len());
    }
}
