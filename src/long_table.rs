//! Read-only query layer over the long table.

use crate::error::{PipelineError, QueryError, Result};
use crate::schema::{self, DATE, GROUP, INDICATOR, LONG_COLUMNS, ORG, VALUE};
use crate::time::{column_dates, date_lit, date_series};
use crate::workbook::SourceWorkbook;
use chrono::NaiveDate;
use polars::prelude::*;
use std::path::Path;
use tracing::info;

/// One row of the long table.
#[derive(Debug, Clone, PartialEq)]
pub struct Fact {
    pub date: NaiveDate,
    pub group: Option<String>,
    pub org: String,
    pub indicator: String,
    pub value: f64,
}

impl Fact {
    pub fn new(date: NaiveDate, group: Option<&str>, org: &str, indicator: &str, value: f64) -> Self {
        Self {
            date,
            group: group.map(str::to_string),
            org: org.to_string(),
            indicator: indicator.to_string(),
            value,
        }
    }
}

/// The single row found by a point query.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRow {
    pub value: f64,
    pub group: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LongTable {
    frame: DataFrame,
}

impl LongTable {
    /// Wrap a frame with the long table columns, normalizing their types.
    pub fn new(frame: DataFrame) -> Result<Self> {
        let names = frame.get_column_names();
        let missing: Vec<&str> = LONG_COLUMNS
            .iter()
            .copied()
            .filter(|c| !names.contains(c))
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::Report(format!(
                "long table is missing columns: {}",
                missing.join(", ")
            )));
        }

        let frame = frame
            .lazy()
            .select([
                col(DATE).cast(DataType::Date),
                col(GROUP).cast(DataType::String),
                col(ORG).cast(DataType::String),
                col(INDICATOR).cast(DataType::String),
                col(VALUE).cast(DataType::Float64),
            ])
            .filter(col(VALUE).is_not_null())
            .collect()?;
        Ok(Self { frame })
    }

    pub fn from_facts(facts: &[Fact]) -> Result<Self> {
        let dates: Vec<Option<NaiveDate>> = facts.iter().map(|f| Some(f.date)).collect();
        let frame = DataFrame::new(vec![
            date_series(DATE, &dates)?,
            Series::new(GROUP, facts.iter().map(|f| f.group.clone()).collect::<Vec<_>>()),
            Series::new(ORG, facts.iter().map(|f| f.org.as_str()).collect::<Vec<_>>()),
            Series::new(INDICATOR, facts.iter().map(|f| f.indicator.as_str()).collect::<Vec<_>>()),
            Series::new(VALUE, facts.iter().map(|f| f.value).collect::<Vec<_>>()),
        ])?;
        Self::new(frame)
    }

    /// Reload the long table page of a pipeline artifact.
    pub fn read_artifact(path: &Path) -> Result<Self> {
        let mut book = SourceWorkbook::open(path)?;
        let table = book.header_table(schema::LONG_SHEET)?;
        table.require_columns(&LONG_COLUMNS)?;
        let long = Self::new(table.to_frame()?)?;
        info!("loaded {} facts from {}", long.height(), path.display());
        Ok(long)
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    fn query(&self, predicate: Expr) -> std::result::Result<DataFrame, QueryError> {
        Ok(self.frame.clone().lazy().filter(predicate).collect()?)
    }

    fn point_predicate(date: NaiveDate, org: &str, indicator: &str) -> Expr {
        col(DATE)
            .eq(date_lit(date))
            .and(col(ORG).eq(lit(org)))
            .and(col(INDICATOR).eq(lit(indicator)))
    }

    /// The value at (date, organization, indicator); exactly one row must
    /// match. `period` names the queried point in error messages.
    pub fn point(
        &self,
        date: NaiveDate,
        org: &str,
        indicator: &str,
        period: &'static str,
    ) -> std::result::Result<PointRow, QueryError> {
        let rows = self.query(Self::point_predicate(date, org, indicator))?;
        match rows.height() {
            0 => Err(QueryError::Missing { period }),
            1 => {
                let value = rows.column(VALUE)?.f64()?.get(0).ok_or(QueryError::Missing { period })?;
                let group = rows.column(GROUP)?.str()?.get(0).map(str::to_string);
                Ok(PointRow { value, group })
            }
            count => Err(QueryError::Duplicate { period, count }),
        }
    }

    /// Every (organization, value) of a peer group at one date, one entry per
    /// organization keeping its last row, in table order.
    pub fn peers(
        &self,
        date: NaiveDate,
        group: &str,
        indicator: &str,
    ) -> std::result::Result<Vec<(String, f64)>, QueryError> {
        let rows = self.query(
            col(DATE)
                .eq(date_lit(date))
                .and(col(GROUP).eq(lit(group)))
                .and(col(INDICATOR).eq(lit(indicator))),
        )?;
        let orgs = rows.column(ORG)?.str()?;
        let values = rows.column(VALUE)?.f64()?;

        let mut peers: Vec<(String, f64)> = Vec::with_capacity(rows.height());
        for (org, value) in orgs.into_iter().zip(values.into_iter()) {
            let (Some(org), Some(value)) = (org, value) else {
                continue;
            };
            peers.retain(|(o, _)| o != org);
            peers.push((org.to_string(), value));
        }
        Ok(peers)
    }

    /// Most recent date holding a value for (organization, indicator).
    pub fn latest_date(&self, org: &str, indicator: &str) -> Option<NaiveDate> {
        let rows = self
            .query(col(ORG).eq(lit(org)).and(col(INDICATOR).eq(lit(indicator))))
            .ok()?;
        column_dates(rows.column(DATE).ok()?)
            .ok()?
            .into_iter()
            .flatten()
            .max()
    }
}
