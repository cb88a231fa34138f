//! Wide to long reshaping.

use crate::schema::{DATE, GROUP, INDICATOR, LONG_COLUMNS, ORG, VALUE, WIDE_ID_COLUMNS};
use crate::time::date_series;
use crate::workbook::parse_number_text;
use polars::prelude::*;
use tracing::warn;

/// Melt the indicator columns of the wide table into
/// `(date, group, organization, indicator, value)` rows. Text indicator
/// columns are parsed as numbers first; cells that do not parse are logged
/// and left out. Null values are dropped; rows are sorted by (date, group,
/// organization, indicator) with null groups last.
pub fn melt(wide: &DataFrame) -> PolarsResult<DataFrame> {
    let mut wide = wide.clone();
    let mut measures: Vec<String> = Vec::new();
    for name in wide.get_column_names_owned() {
        if WIDE_ID_COLUMNS.contains(&name.as_str()) {
            continue;
        }
        let series = wide.column(&name)?;
        if series.dtype().is_numeric() {
            measures.push(name.to_string());
        } else if series.dtype() == &DataType::String {
            let parsed = parse_text_measure(series)?;
            let dropped = (series.len() - series.null_count()) - (parsed.len() - parsed.null_count());
            if parsed.null_count() == parsed.len() {
                if dropped > 0 {
                    warn!("indicator {} holds no numbers, its {} cells are left out of the long table", name, dropped);
                }
                continue;
            }
            if dropped > 0 {
                warn!("{} cells of indicator {} are not numbers and are left out of the long table", dropped, name);
            }
            wide.with_column(parsed)?;
            measures.push(name.to_string());
        }
    }

    if measures.is_empty() {
        return empty_long();
    }

    let parts: Vec<LazyFrame> = measures
        .iter()
        .map(|name| {
            wide.clone().lazy().select([
                col(DATE),
                col(GROUP).cast(DataType::String),
                col(ORG),
                lit(name.as_str()).alias(INDICATOR),
                col(name).cast(DataType::Float64).alias(VALUE),
            ])
        })
        .collect();

    concat(parts, UnionArgs::default())?
        .filter(col(VALUE).is_not_null())
        .sort(
            LONG_COLUMNS[..4].to_vec(),
            SortMultipleOptions::default().with_nulls_last(true).with_maintain_order(true),
        )
        .collect()
}

fn parse_text_measure(series: &Series) -> PolarsResult<Series> {
    let values: Float64Chunked = series
        .str()?
        .into_iter()
        .map(|v| v.and_then(parse_number_text))
        .collect();
    Ok(values.with_name(series.name()).into_series())
}

fn empty_long() -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        date_series(DATE, &[])?,
        Series::new(GROUP, Vec::<Option<String>>::new()),
        Series::new(ORG, Vec::<Option<String>>::new()),
        Series::new(INDICATOR, Vec::<String>::new()),
        Series::new(VALUE, Vec::<f64>::new()),
    ])
}
