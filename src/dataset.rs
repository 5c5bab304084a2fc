use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use calamine::{open_workbook_auto, Data, Reader, Sheets};

use crate::error::EngineError;

/// Cell texts treated as "no value" after trimming (empty string included)
pub const MISSING_MARKERS: [&str; 10] = [
    "NA", "N/A", "n/a", "NaN", "nan", "null", "NULL", "None", "#N/A", "<NA>",
];

/// Date shapes recognised when sniffing a column
pub const DATE_PATTERNS: [&str; 3] = [
    r"^\d{4}-\d{2}-\d{2}",
    r"^\d{2}/\d{2}/\d{4}",
    r"^\d{2}-\d{2}-\d{4}",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%m-%d-%Y"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Temporal,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Categorical => "categorical",
            ColumnKind::Temporal => "temporal",
        }
    }
}

pub fn is_missing(raw: &str) -> bool {
    let v = raw.trim();
    v.is_empty() || MISSING_MARKERS.contains(&v)
}

/// Finite numbers only. "inf" and friends keep a column out of the numeric kind.
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Days since the common era for the leading date of a cell, if it has one
pub fn parse_date_days(raw: &str) -> Option<f64> {
    let v = raw.trim();
    let head = v.get(0..10)?;
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(head, f).ok())
        .map(|d| {
            use chrono::Datelike;
            d.num_days_from_ce() as f64
        })
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    pub data: ColumnData,
}

impl Column {
    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn numeric(&self) -> Option<&[Option<f64>]> {
        match &self.data {
            ColumnData::Numeric(v) => Some(v),
            ColumnData::Text(_) => None,
        }
    }

    pub fn text(&self) -> Option<&[Option<String>]> {
        match &self.data {
            ColumnData::Text(v) => Some(v),
            ColumnData::Numeric(_) => None,
        }
    }

    /// Non-missing numbers in row order. Empty for non-numeric columns.
    pub fn numeric_values(&self) -> Vec<f64> {
        self.numeric()
            .map(|v| v.iter().flatten().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_missing_at(&self, row: usize) -> bool {
        match &self.data {
            ColumnData::Numeric(v) => v.get(row).map(|c| c.is_none()).unwrap_or(true),
            ColumnData::Text(v) => v.get(row).map(|c| c.is_none()).unwrap_or(true),
        }
    }

    pub fn missing_count(&self) -> usize {
        (0..self.len()).filter(|r| self.is_missing_at(*r)).count()
    }

    pub fn non_missing_count(&self) -> usize {
        self.len() - self.missing_count()
    }

    /// Cell rendered as text: the source text for categorical/temporal, a plain number otherwise
    pub fn display_at(&self, row: usize) -> Option<String> {
        match &self.data {
            ColumnData::Numeric(v) => v.get(row).copied().flatten().map(format_number),
            ColumnData::Text(v) => v.get(row).cloned().flatten(),
        }
    }

    /// Non-missing cells as text keys, in row order (numbers rendered as in `display_at`)
    pub fn value_keys(&self) -> Vec<String> {
        (0..self.len()).filter_map(|r| self.display_at(r)).collect()
    }
}

pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

/// What a caller hands over to load a dataset: a header plus text rows, with optional kind hints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadRequest {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    #[serde(default)]
    pub type_hints: HashMap<String, ColumnKind>,
}

impl LoadRequest {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows, type_hints: HashMap::new() }
    }

    pub fn with_hint(mut self, column: &str, kind: ColumnKind) -> Self {
        self.type_hints.insert(column.to_string(), kind);
        self
    }

    /// First record is the header. Short records are padded with missing cells.
    pub fn from_csv_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self, EngineError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(reader);

        let mut records = rdr.records();
        let header = match records.next() {
            Some(rec) => rec.map_err(|e| EngineError::unsupported(format!("cannot read header: {}", e)))?,
            None => return Err(EngineError::unsupported("file has no header row")),
        };
        let columns: Vec<String> = header.iter().map(|h| h.trim().trim_start_matches('\u{feff}').to_string()).collect();

        let mut rows: Vec<Vec<String>> = Vec::new();
        for (i, rec) in records.enumerate() {
            let rec = rec.map_err(|e| EngineError::unsupported(format!("record {}: {}", i + 1, e)))?;
            rows.push(rec.iter().map(|c| c.to_string()).collect());
        }

        Ok(Self::new(columns, rows))
    }

    /// Picks the reader from the extension: csv/txt and tsv as delimited text, spreadsheet formats through calamine
    pub fn from_path(path: &Path) -> Result<Self, EngineError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        let delimiter = match ext.as_str() {
            "csv" | "txt" => b',',
            "tsv" => b'\t',
            e if SPREADSHEET_EXTENSIONS.contains(&e) => return Self::from_excel_path(path),
            other => {
                return Err(EngineError::unsupported(format!(
                    "'{}' files are not supported, use csv/tsv/txt/{}",
                    other,
                    SPREADSHEET_EXTENSIONS.join("/")
                )))
            }
        };
        let file = std::fs::File::open(path)
            .map_err(|e| EngineError::unsupported(format!("cannot open {}: {}", path.display(), e)))?;
        Self::from_csv_reader(file, delimiter)
    }

    /// First sheet only. Its first row is the header, fully blank rows are dropped.
    pub fn from_excel_path(path: &Path) -> Result<Self, EngineError> {
        let mut workbook: Sheets<_> = open_workbook_auto(path)
            .map_err(|e| EngineError::unsupported(format!("cannot open workbook {}: {}", path.display(), e)))?;
        let sheet_names = workbook.sheet_names().to_vec();
        let first = sheet_names
            .first()
            .ok_or_else(|| EngineError::unsupported("workbook contains no sheets"))?;
        let range = workbook
            .worksheet_range(first)
            .map_err(|e| EngineError::unsupported(format!("cannot read sheet '{}': {}", first, e)))?;

        let mut rows = range.rows();
        let header = rows
            .next()
            .ok_or_else(|| EngineError::unsupported(format!("sheet '{}' is empty", first)))?;
        let columns: Vec<String> = header.iter().map(|c| excel_cell_text(c).trim().to_string()).collect();

        let body: Vec<Vec<String>> = rows
            .map(|r| r.iter().map(excel_cell_text).collect::<Vec<String>>())
            .filter(|r| r.iter().any(|c| !c.is_empty()))
            .collect();
        crate::debug_note!("sheet '{}' of {}: {} columns, {} rows", first, path.display(), columns.len(), body.len());

        Ok(Self::new(columns, body))
    }
}

/// Extensions read through calamine
pub const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Spreadsheet cell as the text a delimited file would have carried
pub fn excel_cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(n) => format_number(*n),
        Data::Int(n) => n.to_string(),
        Data::Bool(b) => String::from(if *b { "TRUE" } else { "FALSE" }),
        Data::Error(e) => format!("#{:?}", e),
        Data::DateTime(dt) => excel_serial_text(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

/// 1900 date system serial to an ISO date, with the time only when there is one
pub fn excel_serial_text(serial: f64) -> String {
    let base = NaiveDate::from_ymd_opt(1899, 12, 30).and_then(|d| d.and_hms_opt(0, 0, 0));
    let millis = (serial * 86_400_000.0).round() as i64;
    match base.and_then(|b| b.checked_add_signed(chrono::Duration::milliseconds(millis))) {
        Some(at) if serial.fract().abs() < 1e-9 => at.format("%Y-%m-%d").to_string(),
        Some(at) => at.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format_number(serial),
    }
}

/// The loaded table, column-major. Kinds are decided once, here.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    columns: Vec<Column>,
    row_count: usize,
}

impl Dataset {
    pub fn from_request(req: &LoadRequest, type_sample_rows: usize) -> Result<Self, EngineError> {
        if req.columns.is_empty() {
            return Err(EngineError::unsupported("dataset has no columns"));
        }
        let width = req.columns.len();
        for (i, row) in req.rows.iter().enumerate() {
            if row.len() > width {
                return Err(EngineError::unsupported(format!(
                    "row {} has {} fields, header has {}",
                    i + 1,
                    row.len(),
                    width
                )));
            }
        }

        let names = unique_names(&req.columns);
        let date_res: Vec<Regex> = DATE_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();

        let mut columns: Vec<Column> = Vec::with_capacity(width);
        for (idx, name) in names.into_iter().enumerate() {
            let raw: Vec<Option<&str>> = req
                .rows
                .iter()
                .map(|row| row.get(idx).map(|s| s.trim()).filter(|s| !is_missing(s)))
                .collect();

            let hint = req
                .type_hints
                .get(&name)
                .or_else(|| req.columns.get(idx).and_then(|orig| req.type_hints.get(orig)))
                .copied();
            let kind = match hint {
                Some(k) => k,
                None => sniff_kind(&raw, &date_res, type_sample_rows),
            };

            let data = match kind {
                ColumnKind::Numeric => {
                    let mut values = Vec::with_capacity(raw.len());
                    for (row, cell) in raw.iter().enumerate() {
                        match cell {
                            None => values.push(None),
                            Some(text) => match parse_number(text) {
                                Some(v) => values.push(Some(v)),
                                None => {
                                    return Err(EngineError::unsupported(format!(
                                        "column '{}' is declared numeric but row {} holds '{}'",
                                        name,
                                        row + 1,
                                        text
                                    )))
                                }
                            },
                        }
                    }
                    ColumnData::Numeric(values)
                }
                ColumnKind::Categorical | ColumnKind::Temporal => {
                    ColumnData::Text(raw.iter().map(|c| c.map(|s| s.to_string())).collect())
                }
            };

            crate::debug_note!("column '{}' loaded as {} (hinted: {})", name, kind.as_str(), hint.is_some());
            columns.push(Column { name, kind, data });
        }

        Ok(Self { columns, row_count: req.rows.len() })
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn columns_of(&self, kind: ColumnKind) -> Vec<&Column> {
        self.columns.iter().filter(|c| c.kind == kind).collect()
    }

    pub fn names_of(&self, kind: ColumnKind) -> Vec<String> {
        self.columns_of(kind).iter().map(|c| c.name.clone()).collect()
    }

    pub fn total_cells(&self) -> usize {
        self.row_count * self.columns.len()
    }

    pub fn missing_cells(&self) -> usize {
        self.columns.iter().map(|c| c.missing_count()).sum()
    }

    /// Rows that are exact copies of an earlier row
    pub fn duplicate_rows(&self) -> usize {
        let mut seen: HashSet<Vec<Option<String>>> = HashSet::new();
        let mut dups = 0;
        for r in 0..self.row_count {
            let key: Vec<Option<String>> = self.columns.iter().map(|c| c.display_at(r)).collect();
            if !seen.insert(key) {
                dups += 1;
            }
        }
        dups
    }
}

fn sniff_kind(raw: &[Option<&str>], date_res: &[Regex], sample_rows: usize) -> ColumnKind {
    let present: Vec<&str> = raw.iter().flatten().copied().collect();
    if present.is_empty() {
        return ColumnKind::Categorical;
    }
    if present.iter().all(|v| parse_number(v).is_some()) {
        return ColumnKind::Numeric;
    }
    let looks_like_date = present
        .iter()
        .take(sample_rows)
        .any(|v| date_res.iter().any(|re| re.is_match(v)));
    if looks_like_date {
        ColumnKind::Temporal
    } else {
        ColumnKind::Categorical
    }
}

// blank headers become "Unnamed: i", repeats get ".1", ".2" ...
fn unique_names(header: &[String]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    header
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let base = if h.trim().is_empty() { format!("Unnamed: {}", i) } else { h.trim().to_string() };
            let n = seen.entry(base.clone()).or_insert(0);
            let name = if *n == 0 { base.clone() } else { format!("{}.{}", base, n) };
            *n += 1;
            name
        })
        .collect()
}
