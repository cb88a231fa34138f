//! Markdown report assembly from a YAML report configuration.
//!
//! One report is produced per organization listed in the head. Sections are
//! rendered recursively; ranking bars collected along the way feed the
//! `indicator_rank` summaries.

use crate::error::{PipelineError, Result};
use crate::long_table::LongTable;
use crate::operators::{OperatorEngine, OperatorKind, OperatorRequest, OutputVariant};
use crate::polarity::PolarityConfig;
use crate::time::parse_date_text;
use chrono::NaiveDate;
use comfy_table::presets::ASCII_MARKDOWN;
use comfy_table::Table;
use itertools::Itertools;
use serde::{Deserialize, Deserializer};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A key that only needs to be present, whatever its value.
fn present<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    serde::de::IgnoredAny::deserialize(deserializer)?;
    Ok(true)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    pub head: ReportHead,
    #[serde(default)]
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportHead {
    pub title: String,
    pub data_dt: String,
    /// Space-separated; one report per name.
    pub org_name: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub section_title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub indicator_rank: bool,
    #[serde(default)]
    pub indicators: Vec<IndicatorSpec>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndicatorSpec {
    pub name: String,
    #[serde(default)]
    pub note: Option<String>,
    /// Fall back to the latest available date when the report date has no
    /// data yet.
    #[serde(default, deserialize_with = "present")]
    pub data_dt_rule: bool,
    /// Operator names, optionally followed by `:` and ignored parameters.
    #[serde(default)]
    pub operators: Vec<String>,
}

impl ReportConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            PipelineError::Configuration(format!("cannot open report configuration {}: {}", path.display(), e))
        })?;
        Self::parse(BufReader::new(file))
    }

    pub fn parse<R: std::io::Read>(reader: R) -> Result<Self> {
        let config: ReportConfig = serde_yaml::from_reader(reader)
            .map_err(|e| PipelineError::Configuration(format!("invalid report configuration: {}", e)))?;
        config.report_date()?;
        Ok(config)
    }

    pub fn report_date(&self) -> Result<NaiveDate> {
        parse_date_text(&self.head.data_dt).ok_or_else(|| {
            PipelineError::Configuration(format!("head.data_dt '{}' is not a YYYY-MM-DD date", self.head.data_dt))
        })
    }

    pub fn organizations(&self) -> Vec<&str> {
        self.head.org_name.split_whitespace().collect()
    }
}

/// One bar-variant ranking line of the summary table.
#[derive(Debug, Clone, PartialEq)]
pub struct RankSummaryEntry {
    pub dimension: String,
    pub indicator: String,
    pub rank_text: String,
}

/// Summary tables grouped by dimension, in first-seen order.
pub fn render_rank_summary(entries: &[RankSummaryEntry]) -> String {
    let mut output = Vec::new();
    for dimension in entries.iter().map(|e| e.dimension.as_str()).unique() {
        let heading: String = dimension
            .chars()
            .filter(|c| !c.is_ascii_digit() && !c.is_whitespace())
            .collect();
        output.push(format!("#### {}\n", heading));

        let mut table = Table::new();
        table.load_preset(ASCII_MARKDOWN).set_header(vec!["指标名称", "组内排名"]);
        for entry in entries.iter().filter(|e| e.dimension == dimension) {
            table.add_row(vec![entry.indicator.as_str(), entry.rank_text.as_str()]);
        }
        output.push(table.to_string());
    }
    output.join("\n")
}

/// `<title>_<org>_<date>.md` with spaces replaced by `_` and `:` by `-`.
pub fn report_file_name(title: &str, org: &str, date: &str) -> String {
    let safe = |s: &str| s.replace(' ', "_").replace(':', "-");
    format!("{}_{}_{}.md", safe(title), safe(org), safe(date))
}

#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub org: String,
    pub file_name: String,
    pub content: String,
}

pub struct ReportGenerator<'a> {
    config: &'a ReportConfig,
    engine: OperatorEngine<'a>,
    report_date: NaiveDate,
}

impl<'a> ReportGenerator<'a> {
    pub fn new(config: &'a ReportConfig, table: &'a LongTable, polarity: &'a PolarityConfig) -> Result<Self> {
        Ok(Self {
            config,
            engine: OperatorEngine::new(table, polarity),
            report_date: config.report_date()?,
        })
    }

    pub fn render_all(&self) -> Vec<RenderedReport> {
        self.config
            .organizations()
            .into_iter()
            .map(|org| RenderedReport {
                org: org.to_string(),
                file_name: report_file_name(&self.config.head.title, org, &self.config.head.data_dt),
                content: self.render(org),
            })
            .collect()
    }

    /// Render every report and write it under `out_dir`.
    pub fn write_all(&self, out_dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(out_dir)?;
        let mut written = Vec::new();
        for report in self.render_all() {
            let path = out_dir.join(&report.file_name);
            std::fs::write(&path, report.content)?;
            info!("report for {} written to {}", report.org, path.display());
            written.push(path);
        }
        if written.is_empty() {
            warn!("head.org_name lists no organization, nothing was written");
        }
        Ok(written)
    }

    pub fn render(&self, org: &str) -> String {
        let (body, entries) = self.render_sections(org, &self.config.sections, 1, "", &[]);
        debug!("{} ranking entries collected for {}", entries.len(), org);
        format!("{}\n{}", self.render_head(org), body)
    }

    fn render_head(&self, org: &str) -> String {
        let head = &self.config.head;
        let author = head.author.as_deref().map(|a| format!("【报告作者】{}", a)).unwrap_or_default();
        let desc = head.desc.as_deref().map(|d| format!("【说明】{}", d)).unwrap_or_default();
        format!(
            "> [!INFO] 【数据日期】{}        【机构名称】{}        {}        {}",
            head.data_dt, org, author, desc
        )
    }

    /// Returns the rendered text and the ranking entries this subtree added.
    /// `prior` holds the entries collected earlier in the report.
    fn render_sections(
        &self,
        org: &str,
        sections: &[Section],
        level: usize,
        dimension: &str,
        prior: &[RankSummaryEntry],
    ) -> (String, Vec<RankSummaryEntry>) {
        let mut content = Vec::new();
        let mut added: Vec<RankSummaryEntry> = Vec::new();
        let mut dimension = dimension.to_string();

        for section in sections {
            if let Some(title) = &section.section_title {
                content.push(format!("{} {}\n", "#".repeat(level + 1), title));
                if level == 1 {
                    dimension = title.clone();
                }
            }
            if let Some(text) = &section.content {
                content.push(format!("{}\n", text));
            }
            if section.indicator_rank {
                let collected: Vec<RankSummaryEntry> = prior.iter().chain(added.iter()).cloned().collect();
                content.push(render_rank_summary(&collected));
            }
            for indicator in &section.indicators {
                let (lines, entries) = self.render_indicator(org, indicator, &dimension);
                content.extend(lines);
                added.extend(entries);
            }
            if !section.sections.is_empty() {
                let seen: Vec<RankSummaryEntry> = prior.iter().chain(added.iter()).cloned().collect();
                let (text, entries) = self.render_sections(org, &section.sections, level + 1, &dimension, &seen);
                content.push(text);
                added.extend(entries);
            }
        }
        (content.join("\n"), added)
    }

    fn render_indicator(
        &self,
        org: &str,
        indicator: &IndicatorSpec,
        dimension: &str,
    ) -> (Vec<String>, Vec<RankSummaryEntry>) {
        let mut date = self.report_date;
        let mut remark = String::new();
        if indicator.data_dt_rule {
            if let Some(latest) = self.engine.table().latest_date(org, &indicator.name) {
                if latest < self.report_date {
                    date = latest;
                    remark = format!(" 注：该指标的数据日期为：{}", latest.format("%Y-%m-%d"));
                }
            }
        }

        let mut lines = vec![format!(
            "**{}{}{}**",
            indicator.name,
            indicator.note.as_deref().unwrap_or_default(),
            remark
        )];
        let mut entries = Vec::new();
        let request = OperatorRequest::new(date, org, &indicator.name);

        for operator in &indicator.operators {
            let name = operator.split(':').next().unwrap_or_default().trim();
            match OperatorKind::lookup(name) {
                Some(kind) => {
                    lines.push(format!("- {}", self.engine.handle(kind, &request)));
                    if kind == OperatorKind::Ranking {
                        let bar = self
                            .engine
                            .handle(kind, &request.with_variant(OutputVariant::Bar));
                        entries.push(RankSummaryEntry {
                            dimension: dimension.to_string(),
                            indicator: indicator.name.clone(),
                            rank_text: bar.to_string(),
                        });
                    }
                }
                None => lines.push(format!("- 未知操作符: {}", name)),
            }
        }
        lines.push(String::new());
        (lines, entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::long_table::Fact;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    const CONFIG: &str = r#"
head:
  title: 经营分析
  data_dt: "2024-06-30"
  org_name: 东城支行 西城支行
  author: 分析组
sections:
  - section_title: 1 存款
    content: 存款情况
    indicators:
      - name: 存款余额
        note: （亿元）
        operators: [当期值, 组内排名, "年同比:x"]
      - name: 不良率
        data_dt_rule:
        operators: [当期值, 完成率]
    sections:
      - section_title: 排名汇总
        indicator_rank:
"#;

    fn table() -> LongTable {
        LongTable::from_facts(&[
            Fact::new(d(2023, 6, 30), Some("城区"), "东城支行", "存款余额", 100.0),
            Fact::new(d(2024, 6, 30), Some("城区"), "东城支行", "存款余额", 120.0),
            Fact::new(d(2024, 6, 30), Some("城区"), "西城支行", "存款余额", 90.0),
            Fact::new(d(2024, 5, 31), Some("城区"), "东城支行", "不良率", 0.015),
        ])
        .unwrap()
    }

    #[test]
    fn test_parse_config() {
        let config = ReportConfig::parse(CONFIG.as_bytes()).unwrap();
        assert_eq!(config.organizations(), vec!["东城支行", "西城支行"]);
        assert_eq!(config.report_date().unwrap(), d(2024, 6, 30));
        let section = &config.sections[0];
        assert!(!section.indicator_rank);
        assert!(section.sections[0].indicator_rank);
        assert!(section.indicators[1].data_dt_rule);
        assert!(!section.indicators[0].data_dt_rule);
    }

    #[test]
    fn test_bad_report_date() {
        let yaml = "head:\n  title: t\n  data_dt: June\n  org_name: A\n";
        assert!(matches!(
            ReportConfig::parse(yaml.as_bytes()),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_render_report() {
        let config = ReportConfig::parse(CONFIG.as_bytes()).unwrap();
        let table = table();
        let polarity = PolarityConfig::default();
        let generator = ReportGenerator::new(&config, &table, &polarity).unwrap();
        let report = generator.render("东城支行");
        let lines: Vec<&str> = report.lines().collect();

        assert_eq!(
            lines[0],
            "> [!INFO] 【数据日期】2024-06-30        【机构名称】东城支行        【报告作者】分析组        "
        );
        assert!(report.contains("## 1 存款\n"));
        assert!(report.contains("**存款余额（亿元）**\n- ➖当期值：120.0\n- ➖组内排名：第1名（组内共2家机构）"));
        assert!(report.contains("- 🔴年同比情况：同比变动 20.0，同比增幅 +20.0%，去年同期：100.0"));
        assert!(report.contains("**不良率 注：该指标的数据日期为：2024-05-31**\n- ➖当期值：1.50%\n- 未知操作符: 完成率"));
        assert!(report.contains("### 排名汇总\n"));
        assert!(report.contains("#### 存款\n"));
        assert!(report.contains("| 存款余额"));
        assert!(report.contains("==========（第1名）"));
    }

    #[test]
    fn test_rank_summary_groups_by_dimension() {
        let entry = |dimension: &str, indicator: &str| RankSummaryEntry {
            dimension: dimension.to_string(),
            indicator: indicator.to_string(),
            rank_text: "=====（第1名）".to_string(),
        };
        let summary = render_rank_summary(&[entry("1 存款", "a"), entry("2 贷款", "b"), entry("1 存款", "c")]);
        let headings: Vec<&str> = summary.lines().filter(|l| l.starts_with("####")).collect();
        assert_eq!(headings, vec!["#### 存款", "#### 贷款"]);
        assert_eq!(summary.lines().filter(|l| l.starts_with("| ")).count(), 5);
        assert_eq!(render_rank_summary(&[]), "");
    }

    #[test]
    fn test_report_file_name() {
        assert_eq!(
            report_file_name("经营 分析", "东城支行", "2024-06-30 00:00"),
            "经营_分析_东城支行_2024-06-30_00-00.md"
        );
    }
}
