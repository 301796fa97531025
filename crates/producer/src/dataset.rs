//! Historical smoker dataset: one header line, then
//! `timestamp,smoker,food A,food B` rows with empty cells for missing data.

use std::path::Path;

use pitwatch_core::{parse_value, Reading, NO_READING};

use crate::error::ProducerError;

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRow {
    /// 1-based line number in the source file.
    pub line: usize,
    pub timestamp: String,
    /// Temperature cells after the timestamp; `cells[0]` is column 1.
    pub cells: Vec<String>,
}

impl DatasetRow {
    /// Wire body for the given dataset column. Empty or missing cells
    /// become `No Reading`; numbers are re-rendered in canonical form.
    pub fn message(&self, column: usize) -> Result<String, ProducerError> {
        let cell = column
            .checked_sub(1)
            .and_then(|i| self.cells.get(i))
            .map(String::as_str)
            .filter(|c| !c.is_empty())
            .unwrap_or(NO_READING);

        let cell_error = |source| ProducerError::Cell {
            line: self.line,
            column,
            source,
        };
        let value = parse_value(cell).map_err(cell_error)?;
        Reading::new(self.timestamp.as_str(), value)
            .encode()
            .map_err(cell_error)
    }
}

/// Parse dataset text, skipping the header row and blank lines.
pub fn parse(text: &str) -> Result<Vec<DatasetRow>, ProducerError> {
    let mut rows = Vec::new();
    for (index, line) in text.lines().enumerate().skip(1) {
        let line_no = index + 1;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let mut fields = line.split(',').map(str::trim);
        let timestamp = fields.next().unwrap_or_default();
        if timestamp.is_empty() {
            return Err(ProducerError::Dataset {
                line: line_no,
                message: "timestamp is empty".into(),
            });
        }

        rows.push(DatasetRow {
            line: line_no,
            timestamp: timestamp.to_string(),
            cells: fields.map(String::from).collect(),
        });
    }
    Ok(rows)
}

pub fn load(path: impl AsRef<Path>) -> Result<Vec<DatasetRow>, ProducerError> {
    let text = std::fs::read_to_string(path)?;
    parse(&text)
}
