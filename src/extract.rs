//! Per-rule sheet extraction.
//!
//! Every rule is independent: a missing file or a malformed name only skips
//! that rule. Rules run on the rayon pool and are re-assembled in
//! configuration order.

use crate::catalog::{ConfigCatalog, ExtractionMode, ExtractionRule, FieldSpec, FieldType};
use crate::error::{PipelineError, Result};
use crate::schema;
use crate::time::date_series;
use crate::workbook::{cell_number, cell_text, HeaderTable, SourceWorkbook};
use calamine::{Data, DataType as CellType, Range};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use polars::prelude::*;
use rayon::prelude::*;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

lazy_static! {
    static ref FILE_DATE: Regex = Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").unwrap();
}

/// Data date of a source file: the last ten characters of the base name
/// (up to the first `.`), which must read `YYYY-MM-DD`.
pub fn file_date(file_name: &str) -> Option<NaiveDate> {
    let base = Path::new(file_name).file_name()?.to_str()?;
    let stem = base.split('.').next()?;
    let chars: Vec<char> = stem.chars().collect();
    if chars.len() < 10 {
        return None;
    }
    let tail: String = chars[chars.len() - 10..].iter().collect();
    let caps = FILE_DATE.captures(&tail)?;
    NaiveDate::from_ymd_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?)
}

/// One raw page of the artifact, ready for the merge.
#[derive(Debug, Clone)]
pub struct ExtractedTable {
    pub name: String,
    pub frame: DataFrame,
    pub plan: bool,
}

#[derive(Debug, Clone)]
pub struct ExtractionFailure {
    pub group: String,
    pub file_name: String,
    pub sheet_name: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub tables: Vec<ExtractedTable>,
    pub failures: Vec<ExtractionFailure>,
}

pub struct SheetExtractor<'a> {
    catalog: &'a ConfigCatalog,
    raw_dir: PathBuf,
}

impl<'a> SheetExtractor<'a> {
    pub fn new(catalog: &'a ConfigCatalog, raw_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            raw_dir: raw_dir.into(),
        }
    }

    /// Run every rule and group the results into raw tables.
    pub fn extract_all(&self) -> ExtractionReport {
        let results: Vec<(&ExtractionRule, Result<DataFrame>)> = self
            .catalog
            .rules
            .par_iter()
            .map(|rule| (rule, self.extract(rule)))
            .collect();

        // (name, parts, plan, standard) in order of first appearance.
        let mut groups: Vec<(String, Vec<DataFrame>, bool, bool)> = Vec::new();
        let mut report = ExtractionReport::default();

        for (rule, result) in results {
            match result {
                Ok(frame) => {
                    debug!(
                        "rule {} ({} / {}) extracted {} rows",
                        rule.group_key,
                        rule.file_name,
                        rule.sheet_name,
                        frame.height()
                    );
                    let name = match rule.mode {
                        ExtractionMode::Manual => rule.group_key.clone(),
                        ExtractionMode::Standard => {
                            format!("{}{}", schema::STANDARD_PAGE_PREFIX, rule.sheet_name)
                        }
                    };
                    match groups.iter_mut().find(|(n, _, _, _)| *n == name) {
                        Some((_, parts, plan, _)) => {
                            parts.push(frame);
                            *plan |= rule.plan;
                        }
                        None => {
                            let standard = rule.mode == ExtractionMode::Standard;
                            groups.push((name, vec![frame], rule.plan, standard))
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "skipping rule {} ({} / {}): {}",
                        rule.group_key, rule.file_name, rule.sheet_name, e
                    );
                    report.failures.push(ExtractionFailure {
                        group: rule.group_key.clone(),
                        file_name: rule.file_name.clone(),
                        sheet_name: rule.sheet_name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        // Manual groups first, then the standard pages; both keep their order.
        groups.sort_by_key(|(_, _, _, standard)| *standard);
        for (name, parts, plan, _) in groups {
            match stack(parts) {
                Ok(frame) => report.tables.push(ExtractedTable { name, frame, plan }),
                Err(e) => {
                    warn!("cannot stack the tables of group {}: {}", name, e);
                    report.failures.push(ExtractionFailure {
                        group: name,
                        file_name: String::new(),
                        sheet_name: String::new(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "extraction finished: {} tables, {} failed rules",
            report.tables.len(),
            report.failures.len()
        );
        report
    }

    /// Extract the region addressed by one rule.
    pub fn extract(&self, rule: &ExtractionRule) -> Result<DataFrame> {
        let path = self.raw_dir.join(&rule.file_name);
        if !path.exists() {
            return Err(PipelineError::Extraction(format!(
                "source file not found: {}",
                path.display()
            )));
        }

        let frame = match rule.mode {
            ExtractionMode::Manual => {
                let field_map_id = rule.field_map.as_deref().unwrap_or_default();
                let specs = self.catalog.field_map(field_map_id).ok_or_else(|| {
                    PipelineError::Extraction(format!("no field map named '{}'", field_map_id))
                })?;
                let date = file_date(&rule.file_name).ok_or_else(|| {
                    PipelineError::Extraction(format!(
                        "file name '{}' does not end with a YYYY-MM-DD date",
                        rule.file_name
                    ))
                })?;
                let mut book = SourceWorkbook::open(&path)?;
                let range = book.range(&rule.sheet_name)?;
                extract_manual(&range, specs, rule.start_row, rule.end_row, date)?
            }
            ExtractionMode::Standard => {
                let mut book = SourceWorkbook::open(&path)?;
                let range = book.range(&rule.sheet_name)?;
                HeaderTable::from_range(&rule.sheet_name, &range).to_frame()?
            }
        };

        self.clean_orgs(frame)
    }

    /// Apply the alias map and the organization filter, and drop rows without
    /// an organization name.
    pub fn clean_orgs(&self, frame: DataFrame) -> Result<DataFrame> {
        if !frame.get_column_names().contains(&schema::ORG) {
            return Ok(frame);
        }
        let aliases = &self.catalog.aliases;
        let filter = &self.catalog.org_filter;

        let orgs = frame.column(schema::ORG)?.cast(&DataType::String)?;
        let normalized: Vec<Option<String>> = orgs
            .str()?
            .into_iter()
            .map(|o| {
                o.map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(|o| aliases.normalize(o).to_string())
            })
            .collect();

        let unreconciled = normalized
            .iter()
            .flatten()
            .filter(|o| aliases.is_alias(o))
            .count();
        if unreconciled > 0 {
            warn!(
                "{} organization names still match an alias after substitution",
                unreconciled
            );
        }

        let keep: BooleanChunked = normalized
            .iter()
            .map(|o| o.as_ref().is_some_and(|o| !filter.contains(o)))
            .collect();
        let filtered = normalized
            .iter()
            .flatten()
            .filter(|o| filter.contains(*o))
            .count();
        if filtered > 0 {
            info!("{} rows removed by the organization filter", filtered);
        }

        let mut frame = frame;
        frame.with_column(Series::new(schema::ORG, normalized))?;
        Ok(frame.filter(&keep)?)
    }
}

fn extract_manual(
    range: &Range<Data>,
    specs: &[FieldSpec],
    start_row: u32,
    end_row: u32,
    date: NaiveDate,
) -> Result<DataFrame> {
    let Some((last_row, last_col)) = range.end() else {
        return Err(PipelineError::Extraction("sheet is empty".to_string()));
    };

    let matched: Vec<&FieldSpec> = specs
        .iter()
        .filter(|s| s.column_rank - 1 <= last_col)
        .collect();
    let outside = || {
        specs
            .iter()
            .filter(|s| s.column_rank - 1 > last_col)
            .map(|s| format!("{}({})", s.field, s.column))
            .collect::<Vec<_>>()
            .join(", ")
    };
    if matched.is_empty() {
        return Err(PipelineError::Extraction(format!(
            "none of the mapped columns exist in the sheet: {}",
            outside()
        )));
    }
    if matched.len() < specs.len() {
        debug!("mapped columns outside the sheet are left empty: {}", outside());
    }

    let first = start_row - 1;
    let last = (end_row - 1).min(last_row);
    let rows: Vec<u32> = if first <= last { (first..=last).collect() } else { Vec::new() };

    let mut columns = Vec::with_capacity(specs.len() + 1);
    columns.push(date_series(schema::DATE, &vec![Some(date); rows.len()])?);

    for spec in specs {
        let col = spec.column_rank - 1;
        let cells: Vec<Option<&Data>> = rows.iter().map(|&r| range.get_value((r, col))).collect();
        let series = match spec.dtype {
            FieldType::Text => {
                let values: Vec<Option<String>> =
                    cells.iter().map(|c| c.and_then(cell_text)).collect();
                Series::new(&spec.field, values)
            }
            FieldType::Number => {
                let values: Vec<Option<f64>> =
                    cells.iter().map(|c| c.and_then(cell_number)).collect();
                let unparsed = cells
                    .iter()
                    .zip(&values)
                    .filter(|(c, v)| c.is_some_and(|c| !c.is_empty()) && v.is_none())
                    .count();
                if unparsed > 0 {
                    debug!("{} cells of {} are not numbers and were left empty", unparsed, spec.field);
                }
                Series::new(&spec.field, values)
            }
        };
        columns.push(series);
    }

    Ok(DataFrame::new(columns)?)
}

/// Union of columns, rows in part order.
fn stack(mut parts: Vec<DataFrame>) -> PolarsResult<DataFrame> {
    if parts.len() == 1 {
        return Ok(parts.remove(0));
    }
    let lazy: Vec<LazyFrame> = parts.into_iter().map(|df| df.lazy()).collect();
    concat_lf_diagonal(lazy, UnionArgs::default())?.collect()
}
