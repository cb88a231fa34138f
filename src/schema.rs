//! Column and sheet names of the pipeline artifact.
//!
//! These names are the contract with existing downstream workbooks and must
//! not change.

pub const DATE: &str = "数据日期";
pub const ORG: &str = "机构名称";
pub const GROUP: &str = "机构分组";
pub const INDICATOR: &str = "指标名称";
pub const VALUE: &str = "指标值";

/// Leading columns of the wide table, in output order.
pub const WIDE_ID_COLUMNS: [&str; 3] = [DATE, GROUP, ORG];

/// Columns of the long table, in output order.
pub const LONG_COLUMNS: [&str; 5] = [DATE, GROUP, ORG, INDICATOR, VALUE];

pub const WIDE_SHEET: &str = "ALL_DATA";
pub const LONG_SHEET: &str = "ALL_DATA_MELTED";

/// Prefix of the raw page written for a `standard` extraction rule.
pub const STANDARD_PAGE_PREFIX: &str = "ALL_DT_";

/// Suffix given to the right-hand copy of a column present on both sides of
/// a join, before the copies are reconciled.
pub const DUPLICATE_SUFFIX: &str = "_DROP";

/// Transient join key for plan tables.
pub const YEAR_KEY: &str = "__year";
