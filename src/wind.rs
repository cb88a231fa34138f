//! Pivot of a Wind listed-bank export into a standard extraction sheet.
//!
//! The export has one row per bank and one column per (indicator, period),
//! with headers like `贷款总额\n[单位]亿元\n[报告期]2024-12-31\n[报表类型]合并报表`.
//! The pivot has one row per (bank, date) and one column per indicator,
//! keyed by `机构名称` and `数据日期` so it can be read as a `standard` rule.

use crate::error::{PipelineError, Result};
use crate::schema::{DATE, ORG};
use crate::workbook::{ArtifactWriter, HeaderTable, SourceWorkbook};
use lazy_static::lazy_static;
use polars::prelude::*;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{info, warn};

pub const CODE_COLUMN: &str = "代码";
pub const NAME_COLUMN: &str = "名称";
pub const RESHAPED_SHEET: &str = "reshaped";

lazy_static! {
    static ref UNIT_TAG: Regex = Regex::new(r"\[单位\].*?_").unwrap();
    static ref PERIOD_TAG: Regex = Regex::new(r"\[报告期\]|\[年度\]").unwrap();
}

/// Indicator and `YYYY/MM/DD` date encoded in an export header. A bare year
/// stands for its year end.
pub fn parse_header(header: &str) -> Option<(String, String)> {
    let flat = header.replace('\n', "_");
    let flat = UNIT_TAG.replace_all(&flat, "");
    let mut parts = flat.split('_');
    let indicator = parts.next()?.trim();
    let period = PERIOD_TAG.replace_all(parts.next()?, "");
    let period = period.trim();
    if indicator.is_empty() || period.is_empty() {
        return None;
    }
    let period = if period.chars().all(|c| c.is_ascii_digit()) {
        format!("{}-12-31", period)
    } else {
        period.to_string()
    };
    Some((indicator.to_string(), period.replace('-', "/")))
}

/// One row per (code, name, date), sorted, one mean-valued column per
/// indicator in name order. Cells without a number are left out; rows with
/// no number at all are dropped.
pub fn pivot(table: &HeaderTable) -> Result<DataFrame> {
    table.require_columns(&[CODE_COLUMN, NAME_COLUMN])?;

    let mut measures: Vec<(&str, String, String)> = Vec::new();
    for header in &table.headers {
        if header == CODE_COLUMN || header == NAME_COLUMN {
            continue;
        }
        match parse_header(header) {
            Some((indicator, date)) => measures.push((header.as_str(), indicator, date)),
            None => warn!("column {} has no indicator and period, skipped", header),
        }
    }

    let mut cells: BTreeMap<(String, String, String), BTreeMap<&str, (f64, usize)>> = BTreeMap::new();
    let mut indicators: BTreeSet<&str> = BTreeSet::new();
    for row in 0..table.rows.len() {
        let (Some(code), Some(name)) = (table.text(row, CODE_COLUMN), table.text(row, NAME_COLUMN)) else {
            continue;
        };
        for (column, indicator, date) in &measures {
            let Some(value) = table.number(row, column) else {
                continue;
            };
            let slot = cells
                .entry((code.clone(), name.clone(), date.clone()))
                .or_default()
                .entry(indicator.as_str())
                .or_insert((0.0, 0));
            slot.0 += value;
            slot.1 += 1;
            indicators.insert(indicator.as_str());
        }
    }

    if cells.is_empty() {
        return Err(PipelineError::DataQuality(format!(
            "sheet '{}' holds no indicator values to pivot",
            table.sheet
        )));
    }

    let mut columns = vec![
        Series::new(ORG, cells.keys().map(|(_, name, _)| name.as_str()).collect::<Vec<_>>()),
        Series::new(DATE, cells.keys().map(|(_, _, date)| date.as_str()).collect::<Vec<_>>()),
    ];
    for indicator in &indicators {
        let values: Vec<Option<f64>> = cells
            .values()
            .map(|row| row.get(indicator).map(|(sum, n)| sum / *n as f64))
            .collect();
        columns.push(Series::new(indicator, values));
    }
    Ok(DataFrame::new(columns)?)
}

/// Read `sheet` of the export at `input` and write the pivot to `output`.
pub fn reshape_wind(input: &Path, sheet: &str, output: &Path) -> Result<usize> {
    let mut book = SourceWorkbook::open(input)?;
    let table = book.header_table(sheet)?;
    let frame = pivot(&table)?;

    let mut writer = ArtifactWriter::new();
    writer.add_frame(RESHAPED_SHEET, &frame)?;
    writer.save(output)?;
    info!(
        "{} rows x {} indicators written to {}",
        frame.height(),
        frame.width() - 2,
        output.display()
    );
    Ok(frame.height())
}
