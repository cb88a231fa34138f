//! Extraction configuration catalog.
//!
//! Parses the configuration workbook into validated in-memory tables. Any
//! missing required sheet or column is fatal for the batch.

use crate::error::{PipelineError, Result};
use crate::polarity::PolarityConfig;
use crate::schema;
use crate::workbook::{HeaderTable, SourceWorkbook};
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use strsim::jaro_winkler;
use tracing::{info, warn};

pub const RULES_SHEET: &str = "multi_sheet_df";
pub const FIELD_MAP_SHEET: &str = "single_sheet_df";
pub const GROUPS_SHEET: &str = "机构分组";
pub const ALIAS_SHEET: &str = "机构名替换";
pub const FILTER_SHEET: &str = "过滤机构";
pub const ASC_KEYWORDS_SHEET: &str = "ASC_ORDERED_KEYWORDS";
pub const PCT_KEYWORDS_SHEET: &str = "PERCENTAGE_KEYWORDS";

const KEYWORD_COLUMN: &str = "关键词";
const ALIAS_OLD_COLUMN: &str = "原机构名称";
const ALIAS_NEW_COLUMN: &str = "新机构名称";

const REQUIRED_RULE_COLUMNS: &[&str] = &[
    "multi_sheet_df",
    "single_sheet_df",
    "file_name",
    "sheet_name",
    "start_row",
    "end_row",
    "type",
];
const REQUIRED_FIELD_COLUMNS: &[&str] = &["single_sheet_df", "field", "column_index", "dtype"];
const REQUIRED_GROUP_COLUMNS: &[&str] = &[schema::GROUP, schema::ORG];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Explicit column map over a row range.
    Manual,
    /// Whole sheet loaded verbatim, first row as header.
    Standard,
}

impl std::str::FromStr for ExtractionMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "standard" => Ok(Self::Standard),
            other => Err(PipelineError::Configuration(format!(
                "unknown extraction type '{}', expected manual or standard",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionRule {
    pub group_key: String,
    pub field_map: Option<String>,
    pub file_name: String,
    pub sheet_name: String,
    pub start_row: u32,
    pub end_row: u32,
    pub mode: ExtractionMode,
    /// Plan tables carry annual constants and join on (year, organization).
    pub plan: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Number,
}

impl FieldType {
    pub fn from_declared(dtype: &str) -> Self {
        match dtype.trim().to_lowercase().as_str() {
            "str" | "string" | "text" | "object" => FieldType::Text,
            _ => FieldType::Number,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub field: String,
    pub column: String,
    /// 1-based column number of `column` (A=1, AA=27).
    pub column_rank: u32,
    pub dtype: FieldType,
}

/// Spreadsheet column letters to their 1-based rank, case-insensitive.
pub fn column_rank(letters: &str) -> Option<u32> {
    let trimmed = letters.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.chars().try_fold(0u32, |acc, c| {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = c.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
        acc.checked_mul(26)?.checked_add(digit)
    })
}

/// Organization name -> peer group label.
#[derive(Debug, Clone, Default)]
pub struct OrgGroupMap {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl OrgGroupMap {
    /// Build from (organization, group) pairs. A repeated organization keeps
    /// its first group.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut map = Self::default();
        for (org, group) in pairs {
            let org = org.into();
            let group = group.into();
            if let Some(&idx) = map.index.get(&org) {
                if map.entries[idx].1 != group {
                    warn!(
                        "organization {} is listed in groups {} and {}, keeping {}",
                        org, map.entries[idx].1, group, map.entries[idx].1
                    );
                }
                continue;
            }
            map.index.insert(org.clone(), map.entries.len());
            map.entries.push((org, group));
        }
        map
    }

    pub fn group_of(&self, org: &str) -> Option<&str> {
        self.index.get(org).map(|&i| self.entries[i].1.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most similar known organization name, for hints on unmapped names.
    pub fn closest(&self, org: &str) -> Option<(&str, f64)> {
        self.entries
            .iter()
            .map(|(known, _)| (known.as_str(), jaro_winkler(org, known)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    pub fn to_frame(&self) -> PolarsResult<DataFrame> {
        let orgs: Vec<&str> = self.entries.iter().map(|(o, _)| o.as_str()).collect();
        let groups: Vec<&str> = self.entries.iter().map(|(_, g)| g.as_str()).collect();
        DataFrame::new(vec![Series::new(schema::ORG, orgs), Series::new(schema::GROUP, groups)])
    }
}

/// Old organization name -> canonical name.
#[derive(Debug, Clone, Default)]
pub struct OrgAliasMap {
    aliases: HashMap<String, String>,
}

impl OrgAliasMap {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        Self {
            aliases: pairs.into_iter().map(|(a, b)| (a.into(), b.into())).collect(),
        }
    }

    /// Single substitution pass.
    pub fn normalize<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(|s| s.as_str()).unwrap_or(name)
    }

    pub fn is_alias(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }

    pub(crate) fn len(&self) -> usize {
        self.aliases.len()
    }
}

#[derive(Debug, Clone)]
pub struct ConfigCatalog {
    pub rules: Vec<ExtractionRule>,
    /// Field maps keyed by group id, each sorted by column rank.
    pub field_maps: HashMap<String, Vec<FieldSpec>>,
    pub org_groups: OrgGroupMap,
    pub aliases: OrgAliasMap,
    /// Organizations dropped from every extracted table.
    pub org_filter: HashSet<String>,
    pub polarity: PolarityConfig,
}

impl ConfigCatalog {
    /// Load and validate the whole configuration workbook.
    pub fn load(path: &Path) -> Result<Self> {
        let mut book = open_config(path)?;

        let rules_table = required_sheet(&mut book, RULES_SHEET)?;
        rules_table.require_columns(REQUIRED_RULE_COLUMNS)?;
        let rules = parse_rules(&rules_table)?;

        let fields_table = required_sheet(&mut book, FIELD_MAP_SHEET)?;
        fields_table.require_columns(REQUIRED_FIELD_COLUMNS)?;
        let field_maps = parse_field_maps(&fields_table)?;

        let groups_table = required_sheet(&mut book, GROUPS_SHEET)?;
        groups_table.require_columns(REQUIRED_GROUP_COLUMNS)?;
        let org_groups = parse_groups(&groups_table);
        if org_groups.is_empty() {
            warn!("sheet {} lists no organization, ranking will find no peers", GROUPS_SHEET);
        }

        let aliases = match optional_sheet(&mut book, ALIAS_SHEET)? {
            Some(table) => {
                table.require_columns(&[ALIAS_OLD_COLUMN, ALIAS_NEW_COLUMN])?;
                OrgAliasMap::from_pairs((0..table.rows.len()).filter_map(|r| {
                    Some((table.text(r, ALIAS_OLD_COLUMN)?, table.text(r, ALIAS_NEW_COLUMN)?))
                }))
            }
            None => {
                warn!("sheet {} not found, organization names are used as-is", ALIAS_SHEET);
                OrgAliasMap::default()
            }
        };

        let org_filter = match optional_sheet(&mut book, FILTER_SHEET)? {
            Some(table) => {
                table.require_columns(&[schema::ORG])?;
                table.column_texts(schema::ORG).into_iter().collect()
            }
            None => HashSet::new(),
        };

        let polarity = read_polarity(&mut book)?;

        info!(
            "configuration loaded: {} rules, {} field maps, {} grouped organizations, {} aliases, {} filtered",
            rules.len(),
            field_maps.len(),
            org_groups.len(),
            aliases.len(),
            org_filter.len()
        );

        Ok(Self {
            rules,
            field_maps,
            org_groups,
            aliases,
            org_filter,
            polarity,
        })
    }

    /// Only the keyword sheets, for report runs that never extract.
    pub fn load_polarity(path: &Path) -> Result<PolarityConfig> {
        let mut book = open_config(path)?;
        read_polarity(&mut book)
    }

    pub fn field_map(&self, id: &str) -> Option<&[FieldSpec]> {
        self.field_maps.get(id).map(|v| v.as_slice())
    }
}

fn open_config(path: &Path) -> Result<SourceWorkbook> {
    if !path.exists() {
        return Err(PipelineError::Configuration(format!(
            "configuration workbook not found: {}",
            path.display()
        )));
    }
    SourceWorkbook::open(path).map_err(|e| {
        PipelineError::Configuration(format!("cannot open {}: {}", path.display(), e))
    })
}

fn required_sheet(book: &mut SourceWorkbook, name: &str) -> Result<HeaderTable> {
    if !book.has_sheet(name) {
        return Err(PipelineError::Configuration(format!(
            "configuration workbook {} has no sheet '{}'",
            book.path().display(),
            name
        )));
    }
    book.header_table(name)
}

fn optional_sheet(book: &mut SourceWorkbook, name: &str) -> Result<Option<HeaderTable>> {
    if book.has_sheet(name) {
        book.header_table(name).map(Some)
    } else {
        Ok(None)
    }
}

fn read_polarity(book: &mut SourceWorkbook) -> Result<PolarityConfig> {
    let asc = optional_sheet(book, ASC_KEYWORDS_SHEET)?;
    let pct = optional_sheet(book, PCT_KEYWORDS_SHEET)?;
    match (asc, pct) {
        (Some(asc), Some(pct)) => {
            asc.require_columns(&[KEYWORD_COLUMN])?;
            pct.require_columns(&[KEYWORD_COLUMN])?;
            let config = PolarityConfig::new(
                asc.column_texts(KEYWORD_COLUMN),
                pct.column_texts(KEYWORD_COLUMN),
            );
            info!("ascending keywords: {:?}", config.ascending_keywords);
            info!("percentage keywords: {:?}", config.percentage_keywords);
            Ok(config)
        }
        _ => {
            info!("keyword sheets not configured, using built-in keyword lists");
            Ok(PolarityConfig::default())
        }
    }
}

fn parse_truthy(text: Option<String>) -> bool {
    matches!(
        text.map(|t| t.trim().to_lowercase()).as_deref(),
        Some("1" | "true" | "y" | "yes" | "是")
    )
}

fn row_number(table: &HeaderTable, row: usize, column: &str) -> Result<u32> {
    let value = table.number(row, column).ok_or_else(|| {
        PipelineError::Configuration(format!(
            "{} row {}: '{}' must be a row number",
            table.sheet,
            row + 2,
            column
        ))
    })?;
    if value < 1.0 || value.fract() != 0.0 {
        return Err(PipelineError::Configuration(format!(
            "{} row {}: '{}' must be a positive whole number, got {}",
            table.sheet,
            row + 2,
            column,
            value
        )));
    }
    Ok(value as u32)
}

fn parse_rules(table: &HeaderTable) -> Result<Vec<ExtractionRule>> {
    let has_plan = table.column_index("plan").is_some();
    let mut rules = Vec::with_capacity(table.rows.len());

    for row in 0..table.rows.len() {
        let line = row + 2;
        let missing = |column: &str| {
            PipelineError::Configuration(format!(
                "{} row {}: '{}' is empty",
                table.sheet, line, column
            ))
        };

        let mode: ExtractionMode = table
            .text(row, "type")
            .ok_or_else(|| missing("type"))?
            .parse()?;
        let group_key = table.text(row, "multi_sheet_df").ok_or_else(|| missing("multi_sheet_df"))?;
        let file_name = table.text(row, "file_name").ok_or_else(|| missing("file_name"))?;
        let sheet_name = table.text(row, "sheet_name").ok_or_else(|| missing("sheet_name"))?;
        let field_map = table.text(row, "single_sheet_df");

        let (start_row, end_row) = match mode {
            ExtractionMode::Manual => {
                if field_map.is_none() {
                    return Err(missing("single_sheet_df"));
                }
                let start = row_number(table, row, "start_row")?;
                let end = row_number(table, row, "end_row")?;
                if end < start {
                    return Err(PipelineError::Configuration(format!(
                        "{} row {}: end_row {} is before start_row {}",
                        table.sheet, line, end, start
                    )));
                }
                (start, end)
            }
            // The whole sheet is read; the row range is informative only.
            ExtractionMode::Standard => (
                table.number(row, "start_row").map(|v| v as u32).unwrap_or(1),
                table.number(row, "end_row").map(|v| v as u32).unwrap_or(u32::MAX),
            ),
        };

        rules.push(ExtractionRule {
            group_key,
            field_map,
            file_name,
            sheet_name,
            start_row,
            end_row,
            mode,
            plan: has_plan && parse_truthy(table.text(row, "plan")),
        });
    }
    Ok(rules)
}

fn parse_field_maps(table: &HeaderTable) -> Result<HashMap<String, Vec<FieldSpec>>> {
    let mut maps: HashMap<String, Vec<FieldSpec>> = HashMap::new();

    for row in 0..table.rows.len() {
        let line = row + 2;
        let (Some(group), Some(field), Some(column)) = (
            table.text(row, "single_sheet_df"),
            table.text(row, "field"),
            table.text(row, "column_index"),
        ) else {
            warn!("{} row {}: incomplete field mapping skipped", table.sheet, line);
            continue;
        };
        let column_rank = column_rank(&column).ok_or_else(|| {
            PipelineError::Configuration(format!(
                "{} row {}: '{}' is not a column letter",
                table.sheet, line, column
            ))
        })?;
        let dtype = table
            .text(row, "dtype")
            .map(|d| FieldType::from_declared(&d))
            .unwrap_or(FieldType::Number);
        // The organization name is always text whatever the declared type.
        let dtype = if field == schema::ORG { FieldType::Text } else { dtype };

        maps.entry(group).or_default().push(FieldSpec {
            field,
            column: column.to_uppercase(),
            column_rank,
            dtype,
        });
    }

    for specs in maps.values_mut() {
        specs.sort_by_key(|s| s.column_rank);
    }
    Ok(maps)
}

fn parse_groups(table: &HeaderTable) -> OrgGroupMap {
    OrgGroupMap::from_pairs((0..table.rows.len()).filter_map(|r| {
        Some((table.text(r, schema::ORG)?, table.text(r, schema::GROUP)?))
    }))
}
