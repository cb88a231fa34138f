//! Indicator operators.
//!
//! Every operator reads the long table for one (date, organization,
//! indicator) request and returns report text plus a sentiment. Query
//! failures are rendered as text so one bad indicator never stops a report.

pub mod current;
pub mod delta;
pub mod format;
pub mod ranking;
pub mod trend;

pub use format::pp;

use crate::error::QueryError;
use crate::long_table::LongTable;
use crate::polarity::PolarityConfig;
use crate::sentiment::{classify, Sentiment, Signal};
use chrono::NaiveDate;
use std::fmt;

/// Period label of the target point in query errors.
pub(crate) const CURRENT_PERIOD: &str = "当前";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendPeriod {
    Month,
    Quarter,
    Year,
}

impl TrendPeriod {
    pub fn unit(&self) -> &'static str {
        match self {
            TrendPeriod::Month => "月",
            TrendPeriod::Quarter => "季度",
            TrendPeriod::Year => "年",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrendPeriod::Month => "近3月",
            TrendPeriod::Quarter => "近3季度",
            TrendPeriod::Year => "近3年",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    CurrentValue,
    Ranking,
    Trend(TrendPeriod),
    YearOverYear,
    MonthOverMonth,
}

/// (report name, alias, operator)
const OPERATOR_NAMES: &[(&str, &str, OperatorKind)] = &[
    ("当期值", "current_value", OperatorKind::CurrentValue),
    ("组内排名", "ranking", OperatorKind::Ranking),
    ("近3月趋势", "trend_3m", OperatorKind::Trend(TrendPeriod::Month)),
    ("近3季度趋势", "trend_3q", OperatorKind::Trend(TrendPeriod::Quarter)),
    ("近3年趋势", "trend_3y", OperatorKind::Trend(TrendPeriod::Year)),
    ("年同比", "yoy", OperatorKind::YearOverYear),
    ("月环比", "mom", OperatorKind::MonthOverMonth),
];

impl OperatorKind {
    pub fn lookup(name: &str) -> Option<Self> {
        let name = name.trim();
        OPERATOR_NAMES
            .iter()
            .find(|(report, alias, _)| *report == name || *alias == name)
            .map(|(_, _, kind)| *kind)
    }

    pub fn name(&self) -> &'static str {
        OPERATOR_NAMES
            .iter()
            .find(|(_, _, kind)| kind == self)
            .map(|(report, _, _)| *report)
            .unwrap_or_default()
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputVariant {
    /// Full sentence with sentiment marker.
    #[default]
    Detailed,
    /// Compact bar for the ranking summary.
    Bar,
}

#[derive(Debug, Clone, Copy)]
pub struct OperatorRequest<'a> {
    pub date: NaiveDate,
    pub org: &'a str,
    pub indicator: &'a str,
    pub variant: OutputVariant,
}

impl<'a> OperatorRequest<'a> {
    pub fn new(date: NaiveDate, org: &'a str, indicator: &'a str) -> Self {
        Self {
            date,
            org,
            indicator,
            variant: OutputVariant::Detailed,
        }
    }

    pub fn with_variant(mut self, variant: OutputVariant) -> Self {
        self.variant = variant;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub body: String,
    /// `None` for error text and bar output.
    pub sentiment: Option<Sentiment>,
}

impl Outcome {
    pub fn judged(body: String, sentiment: Sentiment) -> Self {
        Self {
            body,
            sentiment: Some(sentiment),
        }
    }

    pub fn plain(body: String) -> Self {
        Self { body, sentiment: None }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sentiment {
            Some(s) => write!(f, "{}{}", s.marker(), self.body),
            None => f.write_str(&self.body),
        }
    }
}

pub struct OperatorEngine<'a> {
    table: &'a LongTable,
    polarity: &'a PolarityConfig,
}

impl<'a> OperatorEngine<'a> {
    pub fn new(table: &'a LongTable, polarity: &'a PolarityConfig) -> Self {
        Self { table, polarity }
    }

    pub fn table(&self) -> &LongTable {
        self.table
    }

    pub fn polarity(&self) -> &PolarityConfig {
        self.polarity
    }

    /// Display text of a value of `indicator`.
    pub fn pp(&self, indicator: &str, value: f64) -> String {
        pp(indicator, value, self.polarity)
    }

    pub fn sentiment(&self, indicator: &str, signal: Signal) -> Sentiment {
        classify(signal, self.polarity.polarity(indicator), self.polarity.ranking_policy)
    }

    pub fn handle(&self, kind: OperatorKind, request: &OperatorRequest<'_>) -> Outcome {
        let result: Result<Outcome, QueryError> = match kind {
            OperatorKind::CurrentValue => current::evaluate(self, request),
            OperatorKind::Ranking => ranking::evaluate(self, request),
            OperatorKind::Trend(period) => trend::evaluate(self, request, period),
            OperatorKind::YearOverYear => delta::evaluate(self, request, &delta::YEAR_OVER_YEAR),
            OperatorKind::MonthOverMonth => delta::evaluate(self, request, &delta::MONTH_OVER_MONTH),
        };
        result.unwrap_or_else(|e| Outcome::plain(format!("计算{}时：查询指标数据出错，{}", kind.name(), e)))
    }
}
