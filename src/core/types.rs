use serde::{Serialize, Deserialize};

/// Command group a measured command is accounted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandLabel {
    SetupWrite,
    Write,
    Read,
    CursorRead,
    Update,
    Delete,
    Other,
}

impl CommandLabel {
    pub const ALL: [CommandLabel; 7] = [
        CommandLabel::SetupWrite,
        CommandLabel::Write,
        CommandLabel::Read,
        CommandLabel::CursorRead,
        CommandLabel::Update,
        CommandLabel::Delete,
        CommandLabel::Other,
    ];

    pub fn parse(label: &str) -> Self {
        match label {
            "SETUP_WRITE" => CommandLabel::SetupWrite,
            "WRITE" => CommandLabel::Write,
            "READ" => CommandLabel::Read,
            "CURSOR_READ" => CommandLabel::CursorRead,
            "UPDATE" => CommandLabel::Update,
            "DELETE" => CommandLabel::Delete,
            _ => CommandLabel::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandLabel::SetupWrite => "SETUP_WRITE",
            CommandLabel::Write => "WRITE",
            CommandLabel::Read => "READ",
            CommandLabel::CursorRead => "CURSOR_READ",
            CommandLabel::Update => "UPDATE",
            CommandLabel::Delete => "DELETE",
            CommandLabel::Other => "OTHER",
        }
    }

    /// Key used for rates, quantiles and time series in the report.
    pub fn report_key(&self) -> &'static str {
        match self {
            CommandLabel::SetupWrite => "setupWrite",
            CommandLabel::Write => "write",
            CommandLabel::Read => "read",
            CommandLabel::CursorRead => "readCursor",
            CommandLabel::Update => "update",
            CommandLabel::Delete => "delete",
            CommandLabel::Other => "other",
        }
    }

    /// Key used in the report totals.
    pub fn totals_key(&self) -> &'static str {
        match self {
            CommandLabel::SetupWrite => "SetupWrites",
            CommandLabel::Write => "Writes",
            CommandLabel::Read => "Reads",
            CommandLabel::CursorRead => "ReadsCursor",
            CommandLabel::Update => "Updates",
            CommandLabel::Delete => "Deletes",
            CommandLabel::Other => "Others",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// One measured command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmdStat {
    pub label: String,       // READ, WRITE, ...
    pub query_id: String,    // R1, R2, ...
    pub start_ts: u64,       // seconds since epoch
    pub latency_us: u64,
    pub error: bool,
    pub timed_out: bool,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

impl CmdStat {
    pub fn new(label: impl Into<String>, query_id: impl Into<String>, start_ts: u64, latency_us: u64) -> Self {
        CmdStat {
            label: label.into(),
            query_id: query_id.into(),
            start_ts,
            latency_us,
            error: false,
            timed_out: false,
            rx_bytes: 0,
            tx_bytes: 0,
        }
    }

    pub fn with_bytes(mut self, tx_bytes: u64, rx_bytes: u64) -> Self {
        self.tx_bytes = tx_bytes;
        self.rx_bytes = rx_bytes;
        self
    }

    pub fn with_outcome(mut self, error: bool, timed_out: bool) -> Self {
        self.error = error;
        self.timed_out = timed_out;
        self
    }

    pub fn command_label(&self) -> CommandLabel {
        CommandLabel::parse(&self.label)
    }

    /// Key of the per-(label, sub-query) histogram.
    pub fn detail_key(&self) -> String {
        format!("{}-{}", self.label, self.query_id)
    }
}

/// Everything one processed batch measured.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stat {
    total_cmds: u64,
    cmd_stats: Vec<CmdStat>,
}

impl Stat {
    pub fn new() -> Self {
        Stat::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_entry(
        &mut self,
        label: &str,
        query_id: &str,
        start_ts: u64,
        latency_us: u64,
        error: bool,
        timed_out: bool,
        rx_bytes: u64,
        tx_bytes: u64,
    ) -> &mut Self {
        let entry = CmdStat::new(label, query_id, start_ts, latency_us)
            .with_outcome(error, timed_out)
            .with_bytes(tx_bytes, rx_bytes);
        self.add_cmd_stat(entry)
    }

    pub fn add_cmd_stat(&mut self, stat: CmdStat) -> &mut Self {
        self.total_cmds += 1;
        self.cmd_stats.push(stat);
        self
    }

    pub fn cmd_stats(&self) -> &[CmdStat] {
        &self.cmd_stats
    }

    pub fn cmds_count(&self) -> u64 {
        self.total_cmds
    }

    pub fn merge(&mut self, other: Stat) {
        self.total_cmds += other.total_cmds;
        self.cmd_stats.extend(other.cmd_stats);
    }

    pub fn is_empty(&self) -> bool {
        self.cmd_stats.is_empty()
    }
}
