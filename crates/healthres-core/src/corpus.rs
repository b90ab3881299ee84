use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::{Corpus, DocumentMeta};

pub const ABSTRACT_COLUMN: &str = "Abstract";
pub const AUTHORS_COLUMN: &str = "Authors";
pub const YEAR_COLUMN: &str = "Publication Year";
pub const SUMMARY_COLUMN: &str = "Summary";

const REQUIRED_COLUMNS: [&str; 4] = [ABSTRACT_COLUMN, AUTHORS_COLUMN, YEAR_COLUMN, SUMMARY_COLUMN];

/// Cell values read as missing, matching the usual dataframe NA sentinels.
const MISSING_MARKERS: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN", "<NA>", "N/A", "NA",
    "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Shape of the table before and after cleaning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub raw_rows: usize,
    /// Columns after the row-identifier column, before dropping `Summary`.
    pub raw_columns: usize,
    pub rows: usize,
    pub columns: usize,
    pub dropped_rows: usize,
}

pub struct CorpusLoader {
    delimiter: u8,
}

impl Default for CorpusLoader {
    fn default() -> Self { Self { delimiter: b',' } }
}

impl CorpusLoader {
    pub fn new() -> Self { Self::default() }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn load(&self, path: &Path) -> Result<(Corpus, LoadReport)> {
        let file = File::open(path).map_err(|e| Error::DataLoad(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), "loading corpus");
        self.load_reader(file)
    }

    /// Reads a delimited table whose first column is a row identifier.
    ///
    /// `Summary` is dropped unconditionally and any row with a missing value in
    /// a retained column, or a year that is not a whole number, is skipped. Document ids follow the surviving row order.
    pub fn load_reader<R: Read>(&self, reader: R) -> Result<(Corpus, LoadReport)> {
        let mut rdr = csv::ReaderBuilder::new().delimiter(self.delimiter).has_headers(true).from_reader(reader);
        let headers = rdr.headers().map_err(|e| Error::DataLoad(format!("unreadable header: {e}")))?.clone();
        if headers.len() < 2 {
            return Err(Error::DataLoad("expected a row-identifier column followed by data columns".into()));
        }

        let column = |name: &str| -> Result<usize> {
            headers
                .iter()
                .skip(1)
                .position(|h| h.trim() == name)
                .map(|p| p + 1)
                .ok_or_else(|| Error::DataLoad(format!("missing required column '{name}'")))
        };
        for name in REQUIRED_COLUMNS {
            column(name)?;
        }
        let abstract_idx = column(ABSTRACT_COLUMN)?;
        let authors_idx = column(AUTHORS_COLUMN)?;
        let year_idx = column(YEAR_COLUMN)?;
        let summary_idx = column(SUMMARY_COLUMN)?;
        let retained: Vec<usize> = (1..headers.len()).filter(|&i| i != summary_idx).collect();

        let mut report = LoadReport { raw_columns: headers.len() - 1, columns: retained.len(), ..LoadReport::default() };
        let mut rows = Vec::new();
        for (line, record) in rdr.records().enumerate() {
            let record = record.map_err(|e| Error::DataLoad(format!("row {}: {e}", line + 1)))?;
            report.raw_rows += 1;
            if retained.iter().any(|&i| is_missing(record.get(i).unwrap_or(""))) {
                report.dropped_rows += 1;
                continue;
            }
            let cell = |i: usize| record.get(i).unwrap_or("").to_string();
            let Some(year) = parse_year(record.get(year_idx).unwrap_or("")) else {
                warn!(row = line + 1, value = %cell(year_idx), "skipping row with an unreadable publication year");
                report.dropped_rows += 1;
                continue;
            };
            rows.push(DocumentMeta { abstract_text: cell(abstract_idx), authors: cell(authors_idx), publication_year: year });
        }
        report.rows = rows.len();
        if report.dropped_rows > 0 {
            debug!(dropped = report.dropped_rows, "skipped incomplete rows");
        }
        info!(rows = report.rows, columns = report.columns, "corpus loaded");
        Ok((Corpus::from_rows(rows), report))
    }
}

pub fn load_corpus(path: &Path) -> Result<(Corpus, LoadReport)> { CorpusLoader::new().load(path) }

fn is_missing(value: &str) -> bool {
    let v = value.trim();
    MISSING_MARKERS.contains(&v)
}

/// Accepts integral years, including float renderings such as `2019.0`.
fn parse_year(value: &str) -> Option<i32> {
    let v = value.trim();
    if let Ok(year) = v.parse::<i32>() {
        return Some(year);
    }
    let f = v.parse::<f64>().ok()?;
    if f.fract() != 0.0 || f < f64::from(i32::MIN) || f > f64::from(i32::MAX) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    Some(f as i32)
}
