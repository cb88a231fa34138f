//! Three-period trend classification.

use super::{OperatorEngine, OperatorRequest, Outcome, TrendPeriod};
use crate::error::QueryError;
use crate::polarity::Polarity;
use crate::sentiment::{Direction, Signal};
use crate::time::{last_quarter_end, last_year_end, month_end_back};
use chrono::{Datelike, NaiveDate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendShape {
    Rising,
    Falling,
    InflectionToFall,
    InflectionToRise,
    Flat,
    Irregular,
}

impl TrendShape {
    /// Checked in this order; the first matching shape wins.
    pub fn classify(v1: f64, v2: f64, v3: f64) -> Self {
        if v1 < v2 && v2 < v3 {
            TrendShape::Rising
        } else if v1 > v2 && v2 > v3 {
            TrendShape::Falling
        } else if v1 <= v2 && v2 > v3 {
            TrendShape::InflectionToFall
        } else if v1 >= v2 && v2 < v3 {
            TrendShape::InflectionToRise
        } else if v1 == v2 && v2 == v3 {
            TrendShape::Flat
        } else {
            TrendShape::Irregular
        }
    }

    pub fn direction(&self, polarity: Polarity) -> Option<Direction> {
        match self {
            TrendShape::Rising | TrendShape::InflectionToRise => Some(Direction::of_movement(true, polarity)),
            TrendShape::Falling | TrendShape::InflectionToFall => Some(Direction::of_movement(false, polarity)),
            TrendShape::Flat | TrendShape::Irregular => None,
        }
    }
}

/// The three period ends ending at `target`, oldest first.
pub fn period_ends(period: TrendPeriod, target: NaiveDate) -> Option<[NaiveDate; 3]> {
    match period {
        TrendPeriod::Month => Some([
            month_end_back(target, 2)?,
            month_end_back(target, 1)?,
            month_end_back(target, 0)?,
        ]),
        TrendPeriod::Quarter => {
            let q0 = last_quarter_end(target)?;
            Some([month_end_back(q0, 6)?, month_end_back(q0, 3)?, q0])
        }
        TrendPeriod::Year => {
            let y0 = last_year_end(target)?;
            Some([
                NaiveDate::from_ymd_opt(y0.year() - 2, 12, 31)?,
                NaiveDate::from_ymd_opt(y0.year() - 1, 12, 31)?,
                y0,
            ])
        }
    }
}

pub fn evaluate(
    engine: &OperatorEngine<'_>,
    request: &OperatorRequest<'_>,
    period: TrendPeriod,
) -> Result<Outcome, QueryError> {
    let ends = period_ends(period, request.date).ok_or(QueryError::DateOutOfRange)?;

    let mut values = Vec::with_capacity(3);
    let mut missing = Vec::new();
    for end in ends {
        match engine.table().point(end, request.org, request.indicator, period.label()) {
            Ok(row) => values.push(row.value),
            Err(QueryError::Missing { .. }) => missing.push(end.format("%Y-%m-%d").to_string()),
            Err(e) => return Err(e),
        }
    }
    if !missing.is_empty() {
        return Err(QueryError::IncompletePeriods {
            unit: period.unit(),
            missing: missing.join("、"),
        });
    }

    let (v1, v2, v3) = (values[0], values[1], values[2]);
    let shape = TrendShape::classify(v1, v2, v3);
    let direction = shape.direction(engine.polarity().polarity(request.indicator));
    let unit = period.unit();

    let judgement = match (shape, direction) {
        (TrendShape::Rising | TrendShape::Falling, Some(dir)) => format!("连续2{}{}", unit, dir.label()),
        (TrendShape::InflectionToFall | TrendShape::InflectionToRise, Some(dir)) => {
            format!("出现拐点，开始{}", dir.label())
        }
        (TrendShape::Flat, _) => "持平".to_string(),
        _ => "波动".to_string(),
    };
    let body = format!(
        "{}趋势：{}。{}指标值为：{} {} {}",
        period.label(),
        judgement,
        period.label(),
        engine.pp(request.indicator, v1),
        engine.pp(request.indicator, v2),
        engine.pp(request.indicator, v3)
    );
    Ok(Outcome::judged(body, engine.sentiment(request.indicator, Signal::Trend(direction))))
}
