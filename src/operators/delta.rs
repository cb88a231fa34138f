//! Year-over-year and month-over-month comparison.

use super::{OperatorEngine, OperatorRequest, Outcome, CURRENT_PERIOD};
use crate::error::QueryError;
use crate::sentiment::Signal;
use crate::time::month_end_back;

/// Wording and look-back of one comparison family.
#[derive(Debug, Clone, Copy)]
pub struct DeltaTerms {
    pub months_back: u32,
    pub title: &'static str,
    pub marker: &'static str,
    pub prior_period: &'static str,
}

pub const YEAR_OVER_YEAR: DeltaTerms = DeltaTerms {
    months_back: 12,
    title: "年同比",
    marker: super::format::YOY_MARKER,
    prior_period: "去年同期",
};

pub const MONTH_OVER_MONTH: DeltaTerms = DeltaTerms {
    months_back: 1,
    title: "月环比",
    marker: super::format::MOM_MARKER,
    prior_period: "上月同期",
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaFigures {
    pub current: f64,
    pub prior: f64,
    pub delta: f64,
    /// Percentage change; undefined when the prior value is zero.
    pub rate: Option<f64>,
}

impl DeltaFigures {
    pub fn new(current: f64, prior: f64) -> Self {
        let delta = current - prior;
        let rate = if prior == 0.0 {
            None
        } else {
            Some(delta / prior * 100.0)
        };
        Self {
            current,
            prior,
            delta,
            rate,
        }
    }
}

pub fn evaluate(
    engine: &OperatorEngine<'_>,
    request: &OperatorRequest<'_>,
    terms: &DeltaTerms,
) -> Result<Outcome, QueryError> {
    let prior_date = month_end_back(request.date, terms.months_back).ok_or(QueryError::DateOutOfRange)?;
    let table = engine.table();
    let current = table.point(request.date, request.org, request.indicator, CURRENT_PERIOD)?;
    let prior = table.point(prior_date, request.org, request.indicator, terms.prior_period)?;
    let figures = DeltaFigures::new(current.value, prior.value);

    let change = engine.pp(&format!("{}_{}", request.indicator, terms.marker), figures.delta);
    let rate = if request.indicator.contains("排名") {
        String::new()
    } else {
        match figures.rate {
            Some(rate) => format!("，{}增幅 {:+.1}%", terms.marker, rate),
            None => format!("，{}增幅 不适用（基期为0）", terms.marker),
        }
    };
    let body = format!(
        "{}情况：{}变动 {}{}，{}：{}",
        terms.title,
        terms.marker,
        change,
        rate,
        terms.prior_period,
        engine.pp(request.indicator, figures.prior)
    );
    Ok(Outcome::judged(body, engine.sentiment(request.indicator, Signal::Delta(figures.delta))))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::long_table::{Fact, LongTable};
    use crate::polarity::PolarityConfig;

    #[test]
    fn test_figures() {
        let figures = DeltaFigures::new(120.0, 100.0);
        assert_eq!(figures.delta, 20.0);
        assert_eq!(figures.rate, Some(20.0));
        assert_eq!(DeltaFigures::new(5.0, 0.0).rate, None);
    }

    #[test]
    fn test_year_over_year() {
        let table = sample_table();
        let polarity = PolarityConfig::default();
        let engine = OperatorEngine::new(&table, &polarity);
        let request = OperatorRequest::new(d(2024, 6, 30), "东城支行", "存款余额");
        assert_eq!(
            evaluate(&engine, &request, &YEAR_OVER_YEAR).unwrap().to_string(),
            "🔴年同比情况：同比变动 20.0，同比增幅 +20.0%，去年同期：100.0"
        );
    }

    #[test]
    fn test_month_over_month_lower_is_better() {
        let table = sample_table();
        let polarity = PolarityConfig::default();
        let engine = OperatorEngine::new(&table, &polarity);
        let request = OperatorRequest::new(d(2024, 6, 30), "东城支行", "不良率");
        assert_eq!(
            evaluate(&engine, &request, &MONTH_OVER_MONTH).unwrap().to_string(),
            "🔴月环比情况：环比变动 -0.30%，环比增幅 -20.0%，上月同期：1.50%"
        );
    }

    #[test]
    fn test_missing_prior_period() {
        let table = sample_table();
        let polarity = PolarityConfig::default();
        let engine = OperatorEngine::new(&table, &polarity);
        let request = OperatorRequest::new(d(2024, 6, 30), "西城支行", "存款余额");
        assert_eq!(
            evaluate(&engine, &request, &YEAR_OVER_YEAR),
            Err(QueryError::Missing { period: "去年同期" })
        );
    }

    #[test]
    fn test_rank_indicator_and_zero_base() {
        let table = LongTable::from_facts(&[
            Fact::new(d(2024, 5, 31), Some("城区"), "东城支行", "存款同业排名", 5.0),
            Fact::new(d(2024, 6, 30), Some("城区"), "东城支行", "存款同业排名", 3.0),
            Fact::new(d(2024, 5, 31), Some("城区"), "东城支行", "新增客户数", 0.0),
            Fact::new(d(2024, 6, 30), Some("城区"), "东城支行", "新增客户数", 12.0),
        ])
        .unwrap();
        let polarity = PolarityConfig::default();
        let engine = OperatorEngine::new(&table, &polarity);

        let request = OperatorRequest::new(d(2024, 6, 30), "东城支行", "存款同业排名");
        assert_eq!(
            evaluate(&engine, &request, &MONTH_OVER_MONTH).unwrap().to_string(),
            "🔴月环比情况：环比变动 排名位次上升2位，上月同期：第5名"
        );

        let request = OperatorRequest::new(d(2024, 6, 30), "东城支行", "新增客户数");
        assert_eq!(
            evaluate(&engine, &request, &MONTH_OVER_MONTH).unwrap().to_string(),
            "🔴月环比情况：环比变动 12，环比增幅 不适用（基期为0），上月同期：0"
        );
    }
}
