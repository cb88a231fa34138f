//! Batch entry points tying the stages together.

use crate::catalog::ConfigCatalog;
use crate::error::Result;
use crate::extract::SheetExtractor;
use crate::long_table::LongTable;
use crate::merge::MergeEngine;
use crate::polarity::RankingSentimentPolicy;
use crate::report::{ReportConfig, ReportGenerator};
use crate::schema::{LONG_SHEET, WIDE_SHEET};
use crate::workbook::ArtifactWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Counts of one `prepare` run.
#[derive(Debug, Clone)]
pub struct PrepareSummary {
    pub raw_tables: usize,
    pub failed_rules: usize,
    pub wide_rows: usize,
    pub long_rows: usize,
    pub output: PathBuf,
}

/// Extract every configured sheet, merge, and write the artifact workbook.
pub fn prepare(config_path: &Path, raw_dir: &Path, output: &Path) -> Result<PrepareSummary> {
    info!("loading extraction configuration from {}", config_path.display());
    let catalog = ConfigCatalog::load(config_path)?;

    let extraction = SheetExtractor::new(&catalog, raw_dir).extract_all();
    let merged = MergeEngine::new(&catalog.org_groups).merge_all(&extraction.tables)?;

    let mut writer = ArtifactWriter::new();
    for table in &extraction.tables {
        let name = if table.name == WIDE_SHEET || table.name == LONG_SHEET {
            warn!("raw table {} clashes with a merged page name and is written as RAW_{}", table.name, table.name);
            format!("RAW_{}", table.name)
        } else {
            table.name.clone()
        };
        let written = writer.add_frame(&name, &table.frame)?;
        if written != name {
            warn!("raw table {} written as sheet {}", name, written);
        }
    }
    writer.add_frame(WIDE_SHEET, &merged.wide)?;
    writer.add_frame(LONG_SHEET, &merged.long)?;
    writer.save(output)?;

    let summary = PrepareSummary {
        raw_tables: extraction.tables.len(),
        failed_rules: extraction.failures.len(),
        wide_rows: merged.wide.height(),
        long_rows: merged.long.height(),
        output: output.to_path_buf(),
    };
    info!(
        "artifact written to {}: {} raw tables, {} wide rows, {} long rows, {} failed rules",
        output.display(),
        summary.raw_tables,
        summary.wide_rows,
        summary.long_rows,
        summary.failed_rules
    );
    Ok(summary)
}

/// Render the configured reports from a prepared artifact.
pub fn generate_reports(
    config_path: &Path,
    report_config_path: &Path,
    artifact: &Path,
    out_dir: &Path,
    policy: RankingSentimentPolicy,
) -> Result<Vec<PathBuf>> {
    let polarity = ConfigCatalog::load_polarity(config_path)?.with_ranking_policy(policy);
    let report_config = ReportConfig::load(report_config_path)?;
    let table = LongTable::read_artifact(artifact)?;
    ReportGenerator::new(&report_config, &table, &polarity)?.write_all(out_dir)
}
