use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::core::error::Result;
use crate::stats::aggregator::StatsAggregator;
use crate::stats::histogram::QuantileMap;
use crate::stats::reporter::DataPoint;

pub const RESULT_FORMAT_VERSION: &str = "0.1";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Totals {
    pub total_ops: u64,
    pub setup_writes: u64,
    pub writes: u64,
    pub reads: u64,
    pub reads_cursor: u64,
    pub updates: u64,
    pub deletes: u64,
    pub others: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MeasuredRatios {
    pub measured_write_ratio: f64,
    pub measured_read_ratio: f64,
    pub measured_update_ratio: f64,
    pub measured_delete_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallRates {
    /// `<label>Rate` and `<LABEL>-<QUERY>Rate` in ops/sec.
    #[serde(flatten)]
    pub rates: BTreeMap<String, f64>,
    pub overall_ops_rate: f64,
    pub overall_tx_byte_rate: f64,
    pub overall_rx_byte_rate: f64,
    pub tx_byte_rate_str: String,
    pub rx_byte_rate_str: String,
}

/// Run-level facts the aggregator does not know.
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub took: Duration,
    pub metadata: String,
    pub limit: u64,
    pub workers: usize,
    pub max_rps: u64,
    pub batch_size: usize,
    pub db_specific_configs: serde_json::Map<String, serde_json::Value>,
}

/// Final report of a run, written as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestResult {
    pub start_time: i64, // epoch ms
    pub end_time: i64,
    pub duration_millis: u64,
    pub run_id: Uuid,
    pub metadata: String,
    pub result_format_version: String,
    pub limit: u64,
    pub workers: usize,
    pub max_rps: u64,
    pub batch_size: usize,
    #[serde(rename = "DBSpecificConfigs")]
    pub db_specific_configs: serde_json::Map<String, serde_json::Value>,
    pub totals: Totals,
    pub measured_ratios: MeasuredRatios,
    pub overall_rates: OverallRates,
    pub overall_quantiles: BTreeMap<String, QuantileMap>,
    pub time_series: BTreeMap<String, Vec<DataPoint>>,
    pub per_second_encoded_histograms: BTreeMap<u64, String>,
}

impl TestResult {
    /// Snapshot of `aggregator`. Call after every worker has joined.
    pub fn compose(aggregator: &StatsAggregator, info: RunInfo) -> Result<Self> {
        Ok(TestResult {
            start_time: info.start.timestamp_millis(),
            end_time: info.end.timestamp_millis(),
            duration_millis: info.took.as_millis() as u64,
            run_id: Uuid::new_v4(),
            metadata: info.metadata,
            result_format_version: RESULT_FORMAT_VERSION.to_string(),
            limit: info.limit,
            workers: info.workers,
            max_rps: info.max_rps,
            batch_size: info.batch_size,
            db_specific_configs: info.db_specific_configs,
            totals: aggregator.totals(),
            measured_ratios: aggregator.ratios(),
            overall_rates: aggregator.overall_rates(info.took),
            overall_quantiles: aggregator.overall_quantiles(),
            time_series: aggregator.time_series(),
            per_second_encoded_histograms: aggregator.per_second_encoded()?,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
