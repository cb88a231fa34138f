//! Indicator value display rules.

use crate::polarity::PolarityConfig;

/// Markers appended to an indicator name when the value is a change.
pub const YOY_MARKER: &str = "同比";
pub const MOM_MARKER: &str = "环比";

struct FormatRule {
    applies: fn(&str, &PolarityConfig) -> bool,
    render: fn(f64) -> String,
}

fn contains_any(indicator: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| indicator.contains(k))
}

fn is_delta(indicator: &str) -> bool {
    contains_any(indicator, &[YOY_MARKER, MOM_MARKER])
}

fn rank_change(value: f64) -> String {
    let steps = value.trunc() as i64;
    match steps {
        0 => "排名位次不变".to_string(),
        s if s < 0 => format!("排名位次上升{}位", s.unsigned_abs()),
        s => format!("排名位次下降{}位", s),
    }
}

fn grade(value: f64) -> String {
    match value as i64 {
        1 if value.fract() == 0.0 => "A".to_string(),
        2 if value.fract() == 0.0 => "B".to_string(),
        3 if value.fract() == 0.0 => "C".to_string(),
        _ => format!("{:.1}", value),
    }
}

/// First match wins.
const RULES: &[FormatRule] = &[
    FormatRule {
        applies: |i, _| i.contains("排名") && is_delta(i),
        render: rank_change,
    },
    FormatRule {
        applies: |i, _| i.contains("排名"),
        render: |v| format!("第{}名", v.trunc() as i64),
    },
    FormatRule {
        applies: |i, _| contains_any(i, &["成本率", "定价"]) && is_delta(i),
        render: |v| format!("{:+}Bps", (v * 10_000.0).round() as i64),
    },
    FormatRule {
        applies: |i, _| contains_any(i, &["占比", "比例"]) && is_delta(i),
        render: |v| format!("{:.2}个百分点", v * 100.0),
    },
    FormatRule {
        applies: |i, config| config.is_percentage(i),
        render: |v| format!("{:.2}%", v * 100.0),
    },
    FormatRule {
        applies: |i, _| i.contains("客户数"),
        render: |v| format!("{}", v.trunc() as i64),
    },
    FormatRule {
        applies: |i, _| i.contains("零售综合考评等级"),
        render: grade,
    },
];

/// Display text of `value` for `indicator`.
pub fn pp(indicator: &str, value: f64, config: &PolarityConfig) -> String {
    RULES
        .iter()
        .find(|rule| (rule.applies)(indicator, config))
        .map(|rule| (rule.render)(value))
        .unwrap_or_else(|| format!("{:.1}", value))
}
