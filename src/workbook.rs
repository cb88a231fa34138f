//! Workbook access: calamine for reading source files and the configuration,
//! rust_xlsxwriter for the pipeline artifact.

use crate::error::{PipelineError, Result};
use crate::schema;
use crate::time::{column_dates, from_excel_serial, parse_date_text};
use calamine::{open_workbook_auto, Data, DataType as CellType, Range, Reader, Sheets};
use chrono::NaiveDate;
use polars::prelude::*;
use rust_xlsxwriter::Workbook as XlsxWorkbook;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Excel limits sheet names to 31 characters.
const MAX_SHEET_NAME: usize = 31;

pub struct SourceWorkbook {
    path: PathBuf,
    sheets: Sheets<BufReader<File>>,
}

impl SourceWorkbook {
    pub fn open(path: &Path) -> Result<Self> {
        let sheets = open_workbook_auto(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            sheets,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheets.sheet_names().iter().any(|s| s == name)
    }

    pub fn range(&mut self, name: &str) -> Result<Range<Data>> {
        if !self.has_sheet(name) {
            return Err(PipelineError::Extraction(format!(
                "sheet '{}' not found in {}",
                name,
                self.path.display()
            )));
        }
        Ok(self.sheets.worksheet_range(name)?)
    }

    /// Load a sheet whose first row holds the column headers.
    pub fn header_table(&mut self, name: &str) -> Result<HeaderTable> {
        let range = self.range(name)?;
        Ok(HeaderTable::from_range(name, &range))
    }
}

/// A sheet read as header row + data rows, the shape of every configuration
/// sheet and of `standard` extraction sheets.
#[derive(Debug, Clone)]
pub struct HeaderTable {
    pub sheet: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Data>>,
}

impl HeaderTable {
    pub fn from_range(sheet: &str, range: &Range<Data>) -> Self {
        let mut rows = range.rows();
        let raw_headers: Vec<Option<String>> = rows
            .next()
            .map(|r| r.iter().map(cell_text).collect())
            .unwrap_or_default();
        let headers = dedupe_headers(&raw_headers);
        let rows = rows
            .filter(|r| r.iter().any(|c| !c.is_empty()))
            .map(|r| r.to_vec())
            .collect();
        Self {
            sheet: sheet.to_string(),
            headers,
            rows,
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn require_columns(&self, required: &[&str]) -> Result<()> {
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|c| self.column_index(c).is_none())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Configuration(format!(
                "sheet '{}' is missing required columns: {}",
                self.sheet,
                missing.join(", ")
            )))
        }
    }

    fn cell(&self, row: usize, column: &str) -> Option<&Data> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    pub fn text(&self, row: usize, column: &str) -> Option<String> {
        self.cell(row, column).and_then(cell_text)
    }

    pub fn number(&self, row: usize, column: &str) -> Option<f64> {
        self.cell(row, column).and_then(cell_number)
    }

    /// Non-empty texts of one column, in row order.
    pub fn column_texts(&self, column: &str) -> Vec<String> {
        (0..self.rows.len()).filter_map(|r| self.text(r, column)).collect()
    }

    /// Convert to a frame, inferring one type per column: the date column
    /// becomes `Date`, columns whose non-empty cells are all numeric become
    /// `Float64`, everything else `String`.
    pub fn to_frame(&self) -> PolarsResult<DataFrame> {
        let mut columns = Vec::with_capacity(self.headers.len());
        for (idx, header) in self.headers.iter().enumerate() {
            let cells: Vec<&Data> = self
                .rows
                .iter()
                .map(|r| r.get(idx).unwrap_or(&Data::Empty))
                .collect();
            columns.push(infer_series(header, &cells)?);
        }
        DataFrame::new(columns)
    }
}

fn infer_series(header: &str, cells: &[&Data]) -> PolarsResult<Series> {
    if header == schema::DATE {
        let dates: Vec<Option<NaiveDate>> = cells.iter().map(|c| cell_date(c)).collect();
        let unparsed = cells
            .iter()
            .zip(&dates)
            .filter(|(c, d)| !c.is_empty() && d.is_none())
            .count();
        if unparsed > 0 {
            warn!("{} cells of column {} are not dates and were left empty", unparsed, header);
        }
        return crate::time::date_series(header, &dates);
    }

    let filled: Vec<&Data> = cells
        .iter()
        .copied()
        .filter(|c| !c.is_empty() && !is_placeholder(c))
        .collect();
    let any_content = cells.iter().any(|c| !c.is_empty());
    let numeric = (!filled.is_empty() || !any_content) && filled.iter().all(|c| numeric_cell(c).is_some());
    if numeric {
        let placeholders = cells.iter().filter(|c| is_placeholder(c)).count();
        if placeholders > 0 {
            warn!("{} placeholder cells of column {} were read as empty", placeholders, header);
        }
        let values: Vec<Option<f64>> = cells.iter().map(|c| numeric_cell(c)).collect();
        Ok(Series::new(header, values))
    } else {
        let values: Vec<Option<String>> = cells.iter().map(|c| cell_text(c)).collect();
        Ok(Series::new(header, values))
    }
}

/// Texts that stand for a missing figure in source reports.
const PLACEHOLDERS: &[&str] = &["-", "--", "\u{2014}", "\u{2014}\u{2014}", "/", "N/A", "n/a", "NA", "#N/A", "null"];

pub fn is_placeholder(cell: &Data) -> bool {
    matches!(cell, Data::String(s) if PLACEHOLDERS.contains(&s.trim()))
}

/// Number held by a cell of a numeric column; placeholders and booleans
/// read as empty.
fn numeric_cell(cell: &Data) -> Option<f64> {
    match cell {
        Data::Bool(_) => None,
        c if is_placeholder(c) => None,
        c => cell_number(c),
    }
}

/// Empty headers become `Unnamed: N`, repeated headers get `.1`, `.2`, ...
fn dedupe_headers(raw: &[Option<String>]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    raw.iter()
        .enumerate()
        .map(|(idx, h)| {
            let base = h.clone().unwrap_or_else(|| format!("Unnamed: {}", idx));
            let mut name = base.clone();
            let mut n = 1;
            while seen.contains(&name) {
                name = format!("{}.{}", base, n);
                n += 1;
            }
            seen.insert(name.clone());
            name
        })
        .collect()
}

pub fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty | Data::Error(_) => return None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Int(v) => v.to_string(),
        Data::Float(v) => {
            if v.fract() == 0.0 && v.abs() < 1e15 {
                format!("{}", *v as i64)
            } else {
                v.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(_) => cell.as_date()?.format("%Y-%m-%d").to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Numeric reading of a cell. Text is accepted when it parses after removing
/// thousands separators; a trailing `%` divides by 100.
pub fn cell_number(cell: &Data) -> Option<f64> {
    match cell {
        Data::Int(v) => Some(*v as f64),
        Data::Float(v) => Some(*v),
        Data::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Data::String(s) => parse_number_text(s),
        _ => None,
    }
}

pub fn parse_number_text(text: &str) -> Option<f64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    match cleaned.strip_suffix('%') {
        Some(pct) => pct.trim().parse::<f64>().ok().map(|v| v / 100.0),
        None => cleaned.parse::<f64>().ok(),
    }
}

pub fn cell_date(cell: &Data) -> Option<NaiveDate> {
    match cell {
        Data::DateTime(_) => cell.as_date(),
        Data::DateTimeIso(s) | Data::String(s) => parse_date_text(s),
        Data::Float(v) => from_excel_serial(*v),
        Data::Int(v) => from_excel_serial(*v as f64),
        _ => None,
    }
}

/// Writes frames as pages of one output workbook.
pub struct ArtifactWriter {
    workbook: XlsxWorkbook,
    used_names: HashSet<String>,
}

impl Default for ArtifactWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactWriter {
    pub fn new() -> Self {
        Self {
            workbook: XlsxWorkbook::new(),
            used_names: HashSet::new(),
        }
    }

    /// Append `frame` as a page. Returns the sheet name actually used, which
    /// is the requested name cleaned and truncated to Excel's limit.
    pub fn add_frame(&mut self, name: &str, frame: &DataFrame) -> Result<String> {
        let sheet_name = self.sheet_name(name);
        let worksheet = self.workbook.add_worksheet();
        worksheet.set_name(&sheet_name)?;

        for (col_idx, series) in frame.get_columns().iter().enumerate() {
            let col = col_idx as u16;
            worksheet.write_string(0, col, series.name())?;

            let dates = if series.dtype() == &DataType::Date {
                Some(column_dates(series)?)
            } else {
                None
            };

            for row_idx in 0..series.len() {
                let row = (row_idx + 1) as u32;
                if let Some(dates) = &dates {
                    if let Some(date) = dates[row_idx] {
                        worksheet.write_string(row, col, date.format("%Y-%m-%d").to_string())?;
                    }
                    continue;
                }
                match series.get(row_idx)? {
                    AnyValue::Null => {}
                    AnyValue::String(s) => {
                        worksheet.write_string(row, col, s)?;
                    }
                    AnyValue::Boolean(b) => {
                        worksheet.write_boolean(row, col, b)?;
                    }
                    other => match other.extract::<f64>() {
                        Some(v) if v.is_finite() => {
                            worksheet.write_number(row, col, v)?;
                        }
                        Some(v) => {
                            debug!("skipping non-finite value {} in {}", v, series.name());
                        }
                        None => {
                            worksheet.write_string(row, col, other.to_string())?;
                        }
                    },
                }
            }
        }
        Ok(sheet_name)
    }

    /// Append raw sheet cells as a page, row by row from the top-left
    /// corner. Returns the sheet name used.
    pub fn add_rows(&mut self, name: &str, rows: &[Vec<Data>]) -> Result<String> {
        let sheet_name = self.sheet_name(name);
        let worksheet = self.workbook.add_worksheet();
        worksheet.set_name(&sheet_name)?;

        for (row_idx, cells) in rows.iter().enumerate() {
            let row = row_idx as u32;
            for (col_idx, cell) in cells.iter().enumerate() {
                let col = col_idx as u16;
                match cell {
                    Data::Empty | Data::Error(_) => {}
                    Data::Int(v) => {
                        worksheet.write_number(row, col, *v as f64)?;
                    }
                    Data::Float(v) => {
                        worksheet.write_number(row, col, *v)?;
                    }
                    Data::Bool(b) => {
                        worksheet.write_boolean(row, col, *b)?;
                    }
                    other => {
                        if let Some(text) = cell_text(other) {
                            worksheet.write_string(row, col, text)?;
                        }
                    }
                }
            }
        }
        Ok(sheet_name)
    }

    fn sheet_name(&mut self, requested: &str) -> String {
        let cleaned: String = requested
            .chars()
            .map(|c| if "[]:*?/\\".contains(c) { '_' } else { c })
            .take(MAX_SHEET_NAME)
            .collect();
        let mut name = cleaned.clone();
        let mut n = 1;
        while self.used_names.contains(&name.to_lowercase()) {
            let suffix = format!("~{}", n);
            let keep = MAX_SHEET_NAME - suffix.chars().count();
            name = format!("{}{}", cleaned.chars().take(keep).collect::<String>(), suffix);
            n += 1;
        }
        self.used_names.insert(name.to_lowercase());
        name
    }

    pub fn save(mut self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.workbook.save(path)?;
        Ok(())
    }
}
