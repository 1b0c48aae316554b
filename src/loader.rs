//! Turns an uploaded byte stream into a [`Dataset`].
//!
//! Native workbooks (xlsx, xls, xlsb, ods) go through calamine. HTML table
//! exports, which many HR systems save with an `.xls` extension, go through
//! scraper. Anything else that is UTF-8 text is read as delimited values.

use crate::error::LoadError;
use crate::models::{Cell, Dataset, Table};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE2_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Workbook,
    Html,
    Delimited,
}

fn sniff(bytes: &[u8]) -> Option<Format> {
    if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE2_MAGIC) {
        return Some(Format::Workbook);
    }
    let text = std::str::from_utf8(bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)).ok()?;
    if text.trim().is_empty() {
        return None;
    }
    if text.to_lowercase().contains("<table") {
        Some(Format::Html)
    } else {
        Some(Format::Delimited)
    }
}

/// Result of header normalization for one sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedHeaders {
    pub columns: Vec<String>,
    /// Source positions of the kept columns.
    pub kept: Vec<usize>,
    /// Names whose later occurrences were dropped.
    pub dropped: Vec<String>,
}

/// Trims every header, names blank ones `Unnamed: {i}` and keeps only the
/// first of any names that collide after trimming.
pub fn normalize_headers(raw: &[String]) -> NormalizedHeaders {
    let mut columns: Vec<String> = Vec::with_capacity(raw.len());
    let mut kept = Vec::with_capacity(raw.len());
    let mut dropped = Vec::new();

    for (i, header) in raw.iter().enumerate() {
        let name = match header.trim() {
            "" => format!("Unnamed: {}", i),
            trimmed => trimmed.to_string(),
        };
        if columns.contains(&name) {
            dropped.push(name);
        } else {
            columns.push(name);
            kept.push(i);
        }
    }

    NormalizedHeaders {
        columns,
        kept,
        dropped,
    }
}

/// Builds a table from a header row and raw data rows.
fn build_table(sheet: &str, header: &[String], raw_rows: Vec<Vec<Cell>>) -> Table {
    let headers = normalize_headers(header);
    for name in &headers.dropped {
        tracing::warn!(sheet, column = %name, "Dropping duplicate column; first occurrence kept");
    }

    let rows = raw_rows
        .into_iter()
        .map(|row| {
            headers
                .kept
                .iter()
                .map(|&i| row.get(i).cloned().flatten())
                .collect()
        })
        .collect();

    Table::new(headers.columns, rows)
}

fn workbook_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Returns `name`, or `name (n)` with the first free `n >= 2` when a sheet
/// of that name already exists.
fn unique_sheet_name(name: &str, sheets: &[(String, Table)]) -> String {
    let taken = |candidate: &str| sheets.iter().any(|(existing, _)| existing == candidate);
    if !taken(name) {
        return name.to_string();
    }
    (2..)
        .map(|n| format!("{} ({})", name, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| name.to_string())
}

fn text_cell(value: &str) -> Cell {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub struct WorkbookLoader {
    client: reqwest::Client,
    whitespace: Regex,
    table_selector: Selector,
    caption_selector: Selector,
    row_selector: Selector,
    cell_selector: Selector,
}

impl WorkbookLoader {
    pub fn new() -> anyhow::Result<Self> {
        let selector =
            |css: &str| Selector::parse(css).map_err(|e| anyhow::anyhow!("invalid selector {}: {}", css, e));

        Ok(Self {
            client: reqwest::Client::new(),
            whitespace: Regex::new(r"\s+")?,
            table_selector: selector("table")?,
            caption_selector: selector("caption")?,
            row_selector: selector("tr")?,
            cell_selector: selector("th, td")?,
        })
    }

    pub fn load_file(&self, file_path: &Path) -> Result<Dataset, LoadError> {
        let bytes = std::fs::read(file_path).map_err(|source| LoadError::Read {
            path: file_path.to_path_buf(),
            source,
        })?;

        self.parse_bytes(&bytes, &file_path.to_string_lossy())
    }

    pub async fn load_url(&self, url: &str) -> Result<Dataset, LoadError> {
        tracing::info!(url, "Fetching workbook");
        let fetch_error = |message: String| LoadError::Fetch {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_error(format!(
                "HTTP request failed with status: {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        self.parse_bytes(&bytes, url)
    }

    /// Parses an in-memory upload. `source_name` is used for messages and to
    /// name the single sheet of delimited input.
    pub fn parse_bytes(&self, bytes: &[u8], source_name: &str) -> Result<Dataset, LoadError> {
        let format = sniff(bytes).ok_or_else(|| LoadError::UnsupportedFormat {
            source_name: source_name.to_string(),
        })?;
        tracing::debug!(source = source_name, ?format, bytes = bytes.len(), "Detected input format");

        let dataset = match format {
            Format::Workbook => self.parse_workbook(bytes, source_name)?,
            Format::Html => self.parse_html(bytes, source_name)?,
            Format::Delimited => self.parse_delimited(bytes, source_name)?,
        };

        if dataset.is_empty() {
            return Err(LoadError::NoSheets {
                source_name: source_name.to_string(),
            });
        }

        for (name, table) in dataset.sheets() {
            tracing::info!(
                sheet = %name,
                rows = table.len(),
                columns = table.columns().len(),
                "Loaded sheet"
            );
        }
        Ok(dataset)
    }

    fn parse_workbook(&self, bytes: &[u8], source_name: &str) -> Result<Dataset, LoadError> {
        let workbook_error = |message: String| LoadError::Workbook {
            source_name: source_name.to_string(),
            message,
        };

        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| workbook_error(e.to_string()))?;

        let mut sheets = Vec::new();
        for sheet_name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&sheet_name)
                .map_err(|e| workbook_error(format!("sheet '{}': {}", sheet_name, e)))?;

            let mut rows = range.rows();
            let header: Vec<String> = rows
                .next()
                .map(|cells| {
                    cells
                        .iter()
                        .map(|cell| workbook_cell(cell).unwrap_or_default())
                        .collect()
                })
                .unwrap_or_default();
            let data = rows
                .map(|cells| cells.iter().map(workbook_cell).collect())
                .collect();

            let table = build_table(&sheet_name, &header, data);
            sheets.push((sheet_name, table));
        }

        Ok(Dataset::new(sheets))
    }

    fn parse_html(&self, bytes: &[u8], source_name: &str) -> Result<Dataset, LoadError> {
        let content = String::from_utf8_lossy(bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes));
        let document = Html::parse_document(&content);

        let mut sheets: Vec<(String, Table)> = Vec::new();
        for (i, table) in document.select(&self.table_selector).enumerate() {
            let caption = table
                .select(&self.caption_selector)
                .next()
                .map(|caption| self.label_text(caption))
                .filter(|caption| !caption.is_empty())
                .unwrap_or_else(|| format!("Sheet{}", i + 1));
            let sheet_name = unique_sheet_name(&caption, &sheets);
            if sheet_name != caption {
                tracing::warn!(sheet = %caption, renamed = %sheet_name, "Duplicate table caption; renamed sheet");
            }

            let mut rows = table.select(&self.row_selector).map(|row| {
                row.select(&self.cell_selector)
                    .map(|cell| cell.text().collect::<String>())
                    .collect::<Vec<String>>()
            });

            // Header labels are normalized like captions; data cells stay raw.
            let header = rows
                .next()
                .map(|labels| {
                    labels
                        .iter()
                        .map(|label| self.collapse_whitespace(label))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            let data = rows
                .map(|row| row.iter().map(|value| text_cell(value)).collect())
                .collect();

            let table = build_table(&sheet_name, &header, data);
            sheets.push((sheet_name, table));
        }

        if sheets.is_empty() {
            tracing::warn!(source = source_name, "No <table> elements found in HTML export");
        }
        Ok(Dataset::new(sheets))
    }

    fn label_text(&self, element: ElementRef) -> String {
        self.collapse_whitespace(&element.text().collect::<String>())
    }

    fn collapse_whitespace(&self, text: &str) -> String {
        self.whitespace.replace_all(text, " ").trim().to_string()
    }

    fn parse_delimited(&self, bytes: &[u8], source_name: &str) -> Result<Dataset, LoadError> {
        let csv_error = |source: csv::Error| LoadError::Csv {
            source_name: source_name.to_string(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes));

        let mut records = reader.records();
        let header: Vec<String> = match records.next() {
            Some(record) => record.map_err(csv_error)?.iter().map(str::to_string).collect(),
            None => Vec::new(),
        };

        let mut data = Vec::new();
        for record in records {
            let record = record.map_err(csv_error)?;
            data.push(record.iter().map(text_cell).collect());
        }

        let sheet_name = Path::new(source_name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| "Sheet1".to_string());

        let table = build_table(&sheet_name, &header, data);
        Ok(Dataset::new(vec![(sheet_name, table)]))
    }
}
