//! Rank of an organization inside its peer group.

use super::{OperatorEngine, OperatorRequest, OutputVariant, Outcome, CURRENT_PERIOD};
use crate::error::QueryError;
use crate::sentiment::Signal;

#[derive(Debug, Clone, PartialEq)]
pub struct RankedPeer {
    pub org: String,
    pub value: f64,
    pub rank: usize,
}

fn better(a: f64, b: f64, lower_is_better: bool) -> bool {
    if lower_is_better {
        a < b
    } else {
        a > b
    }
}

/// Minimum-method ranks in input order: ties share the best rank and the
/// next rank skips over them.
pub fn min_ranks(values: &[f64], lower_is_better: bool) -> Vec<usize> {
    values
        .iter()
        .map(|&v| 1 + values.iter().filter(|&&o| better(o, v, lower_is_better)).count())
        .collect()
}

/// Peers sorted best first (stable on ties) with their ranks.
pub fn rank_peers(peers: Vec<(String, f64)>, lower_is_better: bool) -> Vec<RankedPeer> {
    let values: Vec<f64> = peers.iter().map(|(_, v)| *v).collect();
    let ranks = min_ranks(&values, lower_is_better);
    let mut ranked: Vec<RankedPeer> = peers
        .into_iter()
        .zip(ranks)
        .map(|((org, value), rank)| RankedPeer { org, value, rank })
        .collect();
    ranked.sort_by(|a, b| {
        let ord = a.value.total_cmp(&b.value);
        if lower_is_better {
            ord
        } else {
            ord.reverse()
        }
    });
    ranked
}

/// `=====` once per organization ranked at or below this one.
pub fn rank_bar(rank: usize, total: usize) -> String {
    format!("{}（第{}名）", "=====".repeat(total + 1 - rank.min(total + 1)), rank)
}

pub fn evaluate(engine: &OperatorEngine<'_>, request: &OperatorRequest<'_>) -> Result<Outcome, QueryError> {
    let table = engine.table();
    let row = table.point(request.date, request.org, request.indicator, CURRENT_PERIOD)?;
    let group = row.group.ok_or(QueryError::NoGroup)?;
    let lower_is_better = engine.polarity().lower_is_better(request.indicator);

    let ranked = rank_peers(table.peers(request.date, &group, request.indicator)?, lower_is_better);
    let total = ranked.len();
    let own = ranked
        .iter()
        .find(|p| p.org == request.org)
        .ok_or(QueryError::Missing { period: CURRENT_PERIOD })?;

    match request.variant {
        OutputVariant::Bar => Ok(Outcome::plain(rank_bar(own.rank, total))),
        OutputVariant::Detailed => {
            let order = ranked
                .iter()
                .map(|p| format!("No{}.{}（{}）", p.rank, p.org, engine.pp(request.indicator, p.value)))
                .collect::<Vec<_>>()
                .join("， ");
            let body = format!(
                "组内排名：第{}名（组内共{}家机构）；组内排名顺序为：{}",
                own.rank, total, order
            );
            let signal = Signal::Rank { rank: own.rank, total };
            Ok(Outcome::judged(body, engine.sentiment(request.indicator, signal)))
        }
    }
}
