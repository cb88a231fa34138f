//! Wide table assembly: joins, duplicate column reconciliation, derived plan
//! completion rates and peer group attachment.

use crate::catalog::OrgGroupMap;
use crate::error::{PipelineError, Result};
use crate::extract::ExtractedTable;
use crate::reshape::melt;
use crate::schema::{self, DATE, DUPLICATE_SUFFIX, GROUP, ORG, YEAR_KEY};
use itertools::Itertools;
use polars::prelude::*;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Suffix marking plan indicators.
pub const PLAN_SUFFIX: &str = "计划";
/// Appended to a plan column name: actual / plan.
pub const COMPLETION_SUFFIX: &str = "完成率";
/// Appended to an actual column name: actual / (plan × month ⁄ 12).
pub const PRORATED_SUFFIX: &str = "时序完成率";

#[derive(Debug, Clone)]
pub struct MergeOutput {
    pub wide: DataFrame,
    pub long: DataFrame,
}

pub struct MergeEngine<'a> {
    groups: &'a OrgGroupMap,
}

impl<'a> MergeEngine<'a> {
    pub fn new(groups: &'a OrgGroupMap) -> Self {
        Self { groups }
    }

    /// Fold every joinable table into the wide table and melt it.
    pub fn merge_all(&self, tables: &[ExtractedTable]) -> Result<MergeOutput> {
        let mut plain = Vec::new();
        let mut plans = Vec::new();
        for table in tables {
            match joinable(table)? {
                Some(frame) if table.plan => plans.push((table.name.as_str(), frame)),
                Some(frame) => plain.push((table.name.as_str(), frame)),
                None => warn!(
                    "table {} lacks {} or {} and is left out of the merge",
                    table.name, DATE, ORG
                ),
            }
        }

        let mut plain = plain.into_iter();
        let (first_name, mut wide) = plain.next().ok_or_else(|| {
            PipelineError::DataQuality("no table with date and organization columns to merge".to_string())
        })?;
        debug!("merge starts from {}", first_name);

        for (name, frame) in plain {
            debug!("outer join with {}", name);
            wide = outer_join(wide, frame)?;
        }
        for (name, frame) in plans {
            debug!("plan join with {}", name);
            wide = plan_join(wide, frame)?;
        }

        let wide = derive_completion_rates(wide)?;
        let wide = self.attach_groups(wide)?;
        let wide = order_wide(wide)?;
        report_duplicate_keys(&wide)?;

        let long = melt(&wide)?;
        info!(
            "merged wide table: {} rows x {} columns, long table: {} rows",
            wide.height(),
            wide.width(),
            long.height()
        );
        Ok(MergeOutput { wide, long })
    }

    /// Left join the peer group label on the organization name.
    pub fn attach_groups(&self, wide: DataFrame) -> Result<DataFrame> {
        let mut map = self.groups.to_frame()?;
        let has_group = wide.get_column_names().contains(&GROUP);
        if has_group {
            map.rename(GROUP, &format!("{}{}", GROUP, DUPLICATE_SUFFIX))?;
        }

        let joined = wide
            .lazy()
            .join(map.lazy(), [col(ORG)], [col(ORG)], JoinArgs::new(JoinType::Left))
            .collect()?;
        let joined = if has_group {
            reconcile(joined, GROUP)?
        } else {
            joined
        };

        let missing_group = joined.column(GROUP)?.is_null();
        let orgs = joined.column(ORG)?.str()?;
        let unmapped: Vec<&str> = orgs
            .into_iter()
            .zip(missing_group.into_iter())
            .filter_map(|(org, missing)| match (org, missing) {
                (Some(org), Some(true)) => Some(org),
                _ => None,
            })
            .unique()
            .collect();
        for org in unmapped {
            match self.groups.closest(org) {
                Some((hint, score)) => warn!(
                    "organization {} has no group; closest configured name is {} ({:.2})",
                    org, hint, score
                ),
                None => warn!("organization {} has no group", org),
            }
        }
        Ok(joined)
    }
}

/// The frame with date and organization in join-ready types, or None when
/// either column is missing.
fn joinable(table: &ExtractedTable) -> Result<Option<DataFrame>> {
    let names = table.frame.get_column_names();
    if !names.contains(&DATE) || !names.contains(&ORG) {
        return Ok(None);
    }
    let frame = table
        .frame
        .clone()
        .lazy()
        .with_columns([
            col(DATE).cast(DataType::Date),
            col(ORG).cast(DataType::String),
        ])
        .collect()?;

    let keyed = frame
        .clone()
        .lazy()
        .filter(col(DATE).is_not_null().and(col(ORG).is_not_null()))
        .collect()?;
    let dropped = frame.height() - keyed.height();
    if dropped > 0 {
        warn!("{} rows of {} have no date and were left out of the merge", dropped, table.name);
    }
    Ok(Some(keyed))
}

/// Rename the right-hand columns that already exist on the left.
fn mark_duplicates(left: &DataFrame, mut right: DataFrame, keys: &[&str]) -> Result<(DataFrame, Vec<String>)> {
    let left_names: HashSet<&str> = left.get_column_names().into_iter().collect();
    let overlapping: Vec<String> = right
        .get_column_names()
        .into_iter()
        .filter(|n| !keys.contains(n) && left_names.contains(n))
        .map(|n| n.to_string())
        .collect();
    for name in &overlapping {
        right.rename(name, &format!("{}{}", name, DUPLICATE_SUFFIX))?;
    }
    Ok((right, overlapping))
}

/// Full outer join on (date, organization) that keeps a single copy of each
/// key column: the union of keys, in first-seen order, left-joined to both
/// sides.
pub fn outer_join(left: DataFrame, right: DataFrame) -> Result<DataFrame> {
    let keys = [DATE, ORG];
    let (right, overlapping) = mark_duplicates(&left, right, &keys)?;

    let all_keys = concat(
        [left.clone().lazy().select([col(DATE), col(ORG)]), right.clone().lazy().select([col(DATE), col(ORG)])],
        UnionArgs::default(),
    )?
    .unique_stable(None, UniqueKeepStrategy::First);

    let mut joined = all_keys
        .join(left.lazy(), [col(DATE), col(ORG)], [col(DATE), col(ORG)], JoinArgs::new(JoinType::Left))
        .join(right.lazy(), [col(DATE), col(ORG)], [col(DATE), col(ORG)], JoinArgs::new(JoinType::Left))
        .collect()?;

    for name in &overlapping {
        joined = reconcile(joined, name)?;
    }
    Ok(joined)
}

/// Left join an annual plan table on (year, organization). The plan's own
/// date is dropped; the latest plan row per year wins.
pub fn plan_join(wide: DataFrame, plan: DataFrame) -> Result<DataFrame> {
    let plan = plan
        .lazy()
        .with_column(col(DATE).dt().year().alias(YEAR_KEY))
        .sort(
            [DATE],
            SortMultipleOptions::default().with_nulls_last(true).with_maintain_order(true),
        )
        .unique_stable(
            Some(vec![YEAR_KEY.to_string(), ORG.to_string()]),
            UniqueKeepStrategy::Last,
        )
        .collect()?
        .drop(DATE)?;

    let wide = wide
        .lazy()
        .with_column(col(DATE).dt().year().alias(YEAR_KEY))
        .collect()?;

    let orphans = count_orphans(&wide, &plan)?;
    if orphans > 0 {
        warn!(
            "{} plan rows match no (year, organization) of the merged data and were dropped",
            orphans
        );
    }

    let (plan, overlapping) = mark_duplicates(&wide, plan, &[YEAR_KEY, ORG])?;
    let mut joined = wide
        .lazy()
        .join(
            plan.lazy(),
            [col(YEAR_KEY), col(ORG)],
            [col(YEAR_KEY), col(ORG)],
            JoinArgs::new(JoinType::Left),
        )
        .collect()?;
    for name in &overlapping {
        joined = reconcile(joined, name)?;
    }
    Ok(joined.drop(YEAR_KEY)?)
}

fn year_org_keys(frame: &DataFrame) -> Result<Vec<Option<(i32, String)>>> {
    let years = frame.column(YEAR_KEY)?.i32()?;
    let orgs = frame.column(ORG)?.str()?;
    Ok(years
        .into_iter()
        .zip(orgs.into_iter())
        .map(|(y, o)| Some((y?, o?.to_string())))
        .collect())
}

fn count_orphans(wide: &DataFrame, plan: &DataFrame) -> Result<usize> {
    let known: HashSet<(i32, String)> = year_org_keys(wide)?.into_iter().flatten().collect();
    Ok(year_org_keys(plan)?
        .into_iter()
        .filter(|k| k.as_ref().map_or(true, |k| !known.contains(k)))
        .count())
}

/// Fill the gaps of `name` from its `_DROP` copy and drop the copy. The
/// primary column always wins where both sides hold a value.
pub fn reconcile(frame: DataFrame, name: &str) -> Result<DataFrame> {
    let dup_name = format!("{}{}", name, DUPLICATE_SUFFIX);
    let primary = frame.column(name)?;
    let dtype = primary.dtype().clone();
    let dup = frame.column(&dup_name)?.cast(&dtype)?;

    let filled = (&primary.is_null() & &dup.is_not_null()).sum().unwrap_or(0);
    let conflicts = primary.not_equal(&dup)?.sum().unwrap_or(0);
    if filled > 0 {
        debug!("column {}: {} gaps filled from the duplicate copy", name, filled);
    }
    if conflicts > 0 {
        warn!(
            "column {}: {} cells disagree between joined tables, the first value is kept",
            name, conflicts
        );
    }

    let merged = frame
        .lazy()
        .with_column(col(name).fill_null(col(&dup_name).cast(dtype)).alias(name))
        .collect()?;
    Ok(merged.drop(&dup_name)?)
}

/// Append `X计划完成率` and `X时序完成率` for every numeric `X计划` column
/// with a matching numeric `X` column.
pub fn derive_completion_rates(wide: DataFrame) -> Result<DataFrame> {
    let numeric: HashSet<&str> = wide
        .get_columns()
        .iter()
        .filter(|s| s.dtype().is_numeric())
        .map(|s| s.name())
        .collect();

    let mut exprs = Vec::new();
    for series in wide.get_columns() {
        let plan_name = series.name();
        let Some(actual_name) = plan_name.strip_suffix(PLAN_SUFFIX) else {
            continue;
        };
        if actual_name.is_empty() || !numeric.contains(plan_name) || !numeric.contains(actual_name) {
            continue;
        }
        let completion = format!("{}{}", plan_name, COMPLETION_SUFFIX);
        let prorated = format!("{}{}", actual_name, PRORATED_SUFFIX);
        if numeric.contains(completion.as_str()) || numeric.contains(prorated.as_str()) {
            debug!("completion columns for {} already present", plan_name);
            continue;
        }

        let plan = col(plan_name).cast(DataType::Float64);
        let actual = col(actual_name).cast(DataType::Float64);
        let month = col(DATE).dt().month().cast(DataType::Float64);
        let no_plan = plan.clone().is_null().or(plan.clone().eq(lit(0.0)));

        exprs.push(
            when(no_plan.clone())
                .then(lit(Null {}).cast(DataType::Float64))
                .otherwise(actual.clone() / plan.clone())
                .alias(&completion),
        );
        exprs.push(
            when(no_plan)
                .then(lit(Null {}).cast(DataType::Float64))
                .otherwise(actual / (plan * month / lit(12.0)))
                .alias(&prorated),
        );
        info!("derived {} and {}", completion, prorated);
    }

    if exprs.is_empty() {
        return Ok(wide);
    }
    Ok(wide.lazy().with_columns(exprs).collect()?)
}

/// `[date, group, organization, rest]`, sorted by (date, organization).
fn order_wide(wide: DataFrame) -> Result<DataFrame> {
    let rest: Vec<String> = wide
        .get_column_names()
        .into_iter()
        .filter(|n| !schema::WIDE_ID_COLUMNS.contains(n))
        .map(|n| n.to_string())
        .collect();
    let ordered: Vec<String> = schema::WIDE_ID_COLUMNS
        .iter()
        .map(|s| s.to_string())
        .chain(rest)
        .collect();

    Ok(wide
        .select(ordered)?
        .lazy()
        .sort(
            [DATE, ORG],
            SortMultipleOptions::default().with_nulls_last(true).with_maintain_order(true),
        )
        .collect()?)
}

fn report_duplicate_keys(wide: &DataFrame) -> Result<usize> {
    let duplicated = wide
        .clone()
        .lazy()
        .group_by([col(DATE), col(ORG)])
        .agg([len().alias("__rows")])
        .filter(col("__rows").gt(lit(1)))
        .collect()?;
    let count = duplicated.height();
    if count > 0 {
        warn!("{} (date, organization) keys appear more than once in the wide table", count);
    }
    Ok(count)
}
