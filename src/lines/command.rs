use crate::core::error::{Error, Result};
use csv::{ReaderBuilder, StringRecord};

/// One input row: `label,query_id,command,arg...` in CSV form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub label: String,
    pub query_id: String,
    pub name: String,
    pub args: Vec<String>,
    pub tx_bytes: u64, // row length minus the label
}

impl Command {
    /// `name arg...`, as it would be typed in a client.
    pub fn display(&self) -> String {
        let mut text = self.name.clone();
        for arg in &self.args {
            text.push(' ');
            text.push_str(arg);
        }
        text
    }
}

/// Parses one row. Fields may be double-quoted; `""` inside quotes is a quote.
pub fn parse_row(row: &[u8]) -> Result<Command> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(row);
    let mut record = StringRecord::new();
    if !reader.read_record(&mut record)? {
        return Err(Error::decode("empty row"));
    }
    if record.len() < 3 {
        return Err(Error::decode(format!(
            "row needs at least a label, a query id and a command: {:?}",
            String::from_utf8_lossy(row)
        )));
    }

    let label = record[0].to_string();
    let tx_bytes = (row.len() - label.len().min(row.len())) as u64;

    Ok(Command {
        label,
        query_id: record[1].to_string(),
        name: record[2].to_string(),
        args: record.iter().skip(3).map(str::to_string).collect(),
        tx_bytes,
    })
}
