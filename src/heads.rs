//! Header region dump.
//!
//! Copies the top rows (down to `start_row`) and the last three rows of the
//! configured range of every extraction rule into one page per source
//! sheet, so row ranges and column letters can be checked by eye.

use crate::catalog::ConfigCatalog;
use crate::error::Result;
use crate::workbook::{ArtifactWriter, SourceWorkbook};
use calamine::{Data, Range};
use itertools::Itertools;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Rows kept from the bottom of the configured range.
const TAIL_ROWS: u32 = 3;

#[derive(Debug, Clone)]
pub struct HeadsSummary {
    pub rules: usize,
    pub skipped: usize,
    pub pages: usize,
    pub output: PathBuf,
}

/// Rows `1..=start_row` and the last three rows up to `end_row` (1-based,
/// absolute), with `end_row` clamped to the last used row of the sheet.
/// Overlapping rows are emitted once.
pub fn header_region(range: &Range<Data>, start_row: u32, end_row: u32) -> Vec<Vec<Data>> {
    let Some((last_row, last_col)) = range.end() else {
        return Vec::new();
    };
    let head_end = start_row.min(last_row + 1);
    let tail_end = end_row.min(last_row + 1);
    let tail_start = tail_end.saturating_sub(TAIL_ROWS - 1).max(start_row.saturating_add(1));

    (1..=head_end)
        .chain(tail_start..=tail_end)
        .map(|row| {
            (0..=last_col)
                .map(|col| range.get_value((row - 1, col)).cloned().unwrap_or(Data::Empty))
                .collect()
        })
        .collect()
}

/// Write the header regions of every rule in `config_path` to `output`.
/// Rules whose file or sheet cannot be read are skipped with a warning.
pub fn dump_heads(config_path: &Path, raw_dir: &Path, output: &Path) -> Result<HeadsSummary> {
    let catalog = ConfigCatalog::load(config_path)?;
    let mut writer = ArtifactWriter::new();
    let mut skipped = 0;
    let mut pages = 0;

    for sheet in catalog.rules.iter().map(|r| r.sheet_name.as_str()).unique() {
        let mut rows: Vec<Vec<Data>> = Vec::new();
        for rule in catalog.rules.iter().filter(|r| r.sheet_name == sheet) {
            let path = raw_dir.join(&rule.file_name);
            let region = SourceWorkbook::open(&path).and_then(|mut book| book.range(sheet));
            let range = match region {
                Ok(range) => range,
                Err(e) => {
                    warn!("no header region for {} / {}: {}", rule.file_name, sheet, e);
                    skipped += 1;
                    continue;
                }
            };
            let label = if rule.end_row == u32::MAX {
                format!("{} [{}-]", rule.file_name, rule.start_row)
            } else {
                format!("{} [{}-{}]", rule.file_name, rule.start_row, rule.end_row)
            };
            rows.push(vec![Data::String(label)]);
            rows.extend(header_region(&range, rule.start_row, rule.end_row));
            rows.push(Vec::new());
        }
        if rows.is_empty() {
            continue;
        }
        writer.add_rows(sheet, &rows)?;
        pages += 1;
    }

    if pages == 0 {
        warn!("no rule could be read, {} holds an empty page", output.display());
        writer.add_rows("heads", &[])?;
    }
    writer.save(output)?;

    let summary = HeadsSummary {
        rules: catalog.rules.len(),
        skipped,
        pages,
        output: output.to_path_buf(),
    };
    info!(
        "header regions of {} rules written to {} ({} pages, {} skipped)",
        summary.rules - summary.skipped,
        output.display(),
        summary.pages,
        summary.skipped
    );
    Ok(summary)
}
