//! Intermediate CSV file shared by the transform and load stages

use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;
use crate::record::NormalizedRecord;

/// Write records to `path`, replacing any previous file.
///
/// The header is the key order of the first record and every record is
/// written in that order. An empty slice writes nothing and leaves any
/// existing file untouched.
pub fn write_records(path: &Path, records: &[NormalizedRecord]) -> Result<usize> {
    let Some(first) = records.first() else {
        return Ok(0);
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let header: Vec<&str> = first.keys().collect();
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&header)?;

    for record in records {
        let row = header
            .iter()
            .map(|name| record.get(name).map(|v| v.to_cell()).unwrap_or_default());
        writer.write_record(row)?;
    }
    writer.flush()?;

    tracing::debug!("Wrote {} rows to {}", records.len(), path.display());
    Ok(records.len())
}

/// A fully read CSV file with name-based cell access
#[derive(Debug)]
pub struct TableFile {
    index: HashMap<String, usize>,
    rows: Vec<csv::StringRecord>,
}

impl TableFile {
    /// Read a CSV file with a header row
    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let index = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), i))
            .collect();
        let rows = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { index, rows })
    }

    /// Number of data rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the file has no data rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether the header contains `name`
    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Iterate over rows; each row resolves cells by header name
    pub fn rows(&self) -> impl Iterator<Item = TableRow<'_>> {
        self.rows.iter().map(|record| TableRow {
            index: &self.index,
            record,
        })
    }
}

/// One data row of a [`TableFile`]
#[derive(Debug, Clone, Copy)]
pub struct TableRow<'a> {
    index: &'a HashMap<String, usize>,
    record: &'a csv::StringRecord,
}

impl<'a> TableRow<'a> {
    /// Raw cell text for a column, or `None` when the header lacks it
    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.index.get(name).and_then(|&i| self.record.get(i))
    }
}
