use regex::Regex;
use rusqlite::types::ValueRef;
use serde_json::{Map, Value};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use tabled::builder::Builder;
use tabled::settings::{object::Segment, Modify, Style, Width};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SpreadsheetError {
    #[error("format must be specified when reading from stdin")]
    StdinWithoutFormat,
    #[error("both database connection and queries must be provided through command line")]
    StdinWithQueries,
    #[error("unparseable spreadsheet format: {0}")]
    Unparseable(String),
    #[error("database format requires at least one query")]
    MissingQueries,
    #[error("query {query:?} returned columns {found:?}, expected {expected:?}")]
    MismatchedColumns {
        query: String,
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("JSON input must be an array of objects")]
    NotRecords,
    #[error("Failed to read spreadsheet: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, SpreadsheetError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    Csv,
    Tsv,
    Json,
    Ndjson,
    Database,
    Excel,
    Parquet,
    Ipc,
}

impl SpreadsheetFormat {
    pub fn is_readable(self) -> bool {
        !matches!(
            self,
            SpreadsheetFormat::Excel | SpreadsheetFormat::Parquet | SpreadsheetFormat::Ipc
        )
    }
}

impl FromStr for SpreadsheetFormat {
    type Err = SpreadsheetError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().trim_start_matches('.').to_lowercase();
        let name = canonical_format_name(&name);
        match name {
            "csv" => Ok(SpreadsheetFormat::Csv),
            "tsv" | "tab" => Ok(SpreadsheetFormat::Tsv),
            "json" => Ok(SpreadsheetFormat::Json),
            "ndjson" | "jsonl" => Ok(SpreadsheetFormat::Ndjson),
            "database" => Ok(SpreadsheetFormat::Database),
            "excel" => Ok(SpreadsheetFormat::Excel),
            "parquet" => Ok(SpreadsheetFormat::Parquet),
            "ipc" => Ok(SpreadsheetFormat::Ipc),
            _ => Err(SpreadsheetError::Unparseable(s.to_string())),
        }
    }
}

impl fmt::Display for SpreadsheetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpreadsheetFormat::Csv => "csv",
            SpreadsheetFormat::Tsv => "tsv",
            SpreadsheetFormat::Json => "json",
            SpreadsheetFormat::Ndjson => "ndjson",
            SpreadsheetFormat::Database => "database",
            SpreadsheetFormat::Excel => "excel",
            SpreadsheetFormat::Parquet => "parquet",
            SpreadsheetFormat::Ipc => "ipc",
        };
        f.write_str(name)
    }
}

/// Maps file extensions that share a reader onto that reader's name.
fn canonical_format_name(name: &str) -> &str {
    static FILETYPE_MAP: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    let map = FILETYPE_MAP.get_or_init(|| {
        [(r"^xls[xmb]?$", "excel"), (r"^(feather|arrow)$", "ipc")]
            .into_iter()
            .map(|(pattern, format)| (Regex::new(pattern).expect("valid regex"), format))
            .collect()
    });

    map.iter()
        .find(|(re, _)| re.is_match(name))
        .map_or(name, |&(_, format)| format)
}

/// Where the rows come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Stdin,
    File(PathBuf),
    Database { uri: String, queries: Vec<String> },
}

impl Source {
    /// Works out the source and its format from the positional argument, the
    /// queries and the optional explicit format.
    pub fn detect(
        spreadsheet: &str,
        queries: &[String],
        format: Option<&str>,
    ) -> Result<(Source, SpreadsheetFormat)> {
        let explicit = format.map(SpreadsheetFormat::from_str).transpose()?;

        match (spreadsheet, queries.is_empty(), explicit) {
            ("-", _, None) => Err(SpreadsheetError::StdinWithoutFormat),
            ("-", false, Some(_)) => Err(SpreadsheetError::StdinWithQueries),
            ("-", true, Some(format)) => Ok((Source::Stdin, format)),
            (uri, false, format) => {
                let format = format.unwrap_or(SpreadsheetFormat::Database);
                let source = match format {
                    SpreadsheetFormat::Database => Source::Database {
                        uri: uri.to_string(),
                        queries: queries.to_vec(),
                    },
                    _ => Source::File(PathBuf::from(uri)),
                };
                Ok((source, format))
            }
            (path, true, Some(format)) => Ok((Source::File(PathBuf::from(path)), format)),
            (path, true, None) => {
                let extension = Path::new(path)
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .unwrap_or_default();
                Ok((Source::File(PathBuf::from(path)), extension.parse()?))
            }
        }
    }
}

/// Rows of string cells under named columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }

    /// Pads short rows with empty cells so every row has one cell per column.
    fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.columns.len(), String::new());
        self.rows.push(row);
    }

    /// Appends a column; missing values are left empty.
    pub fn push_column(&mut self, name: &str, values: impl IntoIterator<Item = String>) {
        self.columns.push(name.to_string());
        let mut values = values.into_iter();
        for row in &mut self.rows {
            row.push(values.next().unwrap_or_default());
        }
    }

    pub fn truncate(&mut self, len: usize) {
        self.rows.truncate(len);
    }

    fn from_records(records: Vec<Map<String, Value>>) -> Self {
        let mut table = Table::default();
        for record in &records {
            for key in record.keys() {
                if !table.columns.contains(key) {
                    table.columns.push(key.clone());
                }
            }
        }
        for record in records {
            let row = table
                .columns
                .iter()
                .map(|column| record.get(column).map(json_cell).unwrap_or_default())
                .collect();
            table.rows.push(row);
        }
        table
    }

    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Text rendering of the first `n` rows, long cells clipped.
    pub fn head(&self, n: usize) -> String {
        const MAX_WIDTH: usize = 40;

        let mut builder = Builder::default();
        builder.push_record(self.columns.iter().cloned());
        for row in self.rows.iter().take(n) {
            builder.push_record(row.iter().cloned());
        }

        let mut table = builder.build();
        table
            .with(Style::psql())
            .with(Modify::new(Segment::all()).with(Width::truncate(MAX_WIDTH).suffix("…")));

        format!("shape: ({}, {})\n{}", self.rows.len(), self.columns.len(), table)
    }

    /// Replaces the cells of the named column, appending it if absent.
    pub fn set_column(&mut self, name: &str, values: impl IntoIterator<Item = String>) {
        let Some(index) = self.column_index(name) else {
            self.push_column(name, values);
            return;
        };
        let mut values = values.into_iter();
        for row in &mut self.rows {
            if row.len() <= index {
                row.resize(index + 1, String::new());
            }
            row[index] = values.next().unwrap_or_default();
        }
    }
}

fn json_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Reads the whole source into a table.
pub fn read(source: &Source, format: SpreadsheetFormat) -> Result<Table> {
    debug!("Reading {:?} as {}", source, format);
    if !format.is_readable() {
        return Err(SpreadsheetError::Unparseable(format.to_string()));
    }

    match source {
        Source::Database { uri, queries } => read_database(uri, queries),
        _ if format == SpreadsheetFormat::Database => Err(SpreadsheetError::MissingQueries),
        Source::Stdin => read_from(std::io::stdin().lock(), format),
        Source::File(path) => read_from(File::open(path)?, format),
    }
}

pub fn read_from<R: Read>(reader: R, format: SpreadsheetFormat) -> Result<Table> {
    match format {
        SpreadsheetFormat::Csv => read_delimited(reader, b','),
        SpreadsheetFormat::Tsv => read_delimited(reader, b'\t'),
        SpreadsheetFormat::Json => read_json(reader),
        SpreadsheetFormat::Ndjson => read_ndjson(reader),
        other => Err(SpreadsheetError::Unparseable(other.to_string())),
    }
}

fn read_delimited<R: Read>(reader: R, delimiter: u8) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(reader);

    let columns = reader.headers()?.iter().map(str::to_string).collect();
    let mut table = Table::new(columns);
    for record in reader.records() {
        table.push_row(record?.iter().map(str::to_string).collect());
    }
    Ok(table)
}

fn read_json<R: Read>(reader: R) -> Result<Table> {
    let value: Value = serde_json::from_reader(BufReader::new(reader))?;
    let Value::Array(items) = value else {
        return Err(SpreadsheetError::NotRecords);
    };
    let records = items
        .into_iter()
        .map(|item| match item {
            Value::Object(record) => Ok(record),
            _ => Err(SpreadsheetError::NotRecords),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Table::from_records(records))
}

fn read_ndjson<R: Read>(reader: R) -> Result<Table> {
    let mut records = Vec::new();
    for line in BufReader::new(reader).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line)? {
            Value::Object(record) => records.push(record),
            _ => return Err(SpreadsheetError::NotRecords),
        }
    }
    Ok(Table::from_records(records))
}

fn read_database(uri: &str, queries: &[String]) -> Result<Table> {
    if queries.is_empty() {
        return Err(SpreadsheetError::MissingQueries);
    }

    let path = uri
        .strip_prefix("sqlite://")
        .or_else(|| uri.strip_prefix("sqlite:"))
        .unwrap_or(uri);
    let conn = rusqlite::Connection::open_with_flags(
        path,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_URI,
    )?;

    let mut table: Option<Table> = None;
    for query in queries {
        let mut stmt = conn.prepare(query)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let width = columns.len();

        let table = table.get_or_insert_with(|| Table::new(columns.clone()));
        if table.columns != columns {
            return Err(SpreadsheetError::MismatchedColumns {
                query: query.clone(),
                expected: table.columns.clone(),
                found: columns,
            });
        }

        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                cells.push(sql_cell(row.get_ref(i)?));
            }
            table.push_row(cells);
        }
        debug!("Query {:?} read, {} rows so far", query, table.len());
    }
    Ok(table.unwrap_or_default())
}

fn sql_cell(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}
