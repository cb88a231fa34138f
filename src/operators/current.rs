use super::{OperatorEngine, OperatorRequest, Outcome, CURRENT_PERIOD};
use crate::error::QueryError;
use crate::sentiment::Signal;

pub fn evaluate(engine: &OperatorEngine<'_>, request: &OperatorRequest<'_>) -> Result<Outcome, QueryError> {
    let row = engine
        .table()
        .point(request.date, request.org, request.indicator, CURRENT_PERIOD)?;
    let body = format!("当期值：{}", engine.pp(request.indicator, row.value));
    Ok(Outcome::judged(body, engine.sentiment(request.indicator, Signal::CurrentValue)))
}
