//! Workbook fixtures shared by the integration tests.
#![allow(dead_code)]

use rust_xlsxwriter::{Workbook, XlsxError};
use std::path::{Path, PathBuf};

pub enum Cell {
    Text(&'static str),
    Number(f64),
    Empty,
}

use Cell::{Empty, Number as N, Text as T};

pub fn write_sheet(workbook: &mut Workbook, name: &str, rows: &[Vec<Cell>]) -> Result<(), XlsxError> {
    let sheet = workbook.add_worksheet();
    sheet.set_name(name)?;
    for (r, row) in rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            match cell {
                Cell::Text(s) => {
                    sheet.write_string(r as u32, c as u16, *s)?;
                }
                Cell::Number(v) => {
                    sheet.write_number(r as u32, c as u16, *v)?;
                }
                Cell::Empty => {}
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn rule(
    group: &'static str,
    map: &'static str,
    file: &'static str,
    sheet: &'static str,
    start: f64,
    end: f64,
    mode: &'static str,
    plan: Cell,
) -> Vec<Cell> {
    let map = if map.is_empty() { Empty } else { T(map) };
    vec![T(group), map, T(file), T(sheet), N(start), N(end), T(mode), plan]
}

/// Manual, plan and standard rules plus one rule pointing at a missing file.
pub fn default_rules() -> Vec<Vec<Cell>> {
    vec![
        rule("存款", "存款字段", "存款月报2024-04-30.xlsx", "存款", 3.0, 10.0, "manual", N(0.0)),
        rule("存款", "存款字段", "存款月报2024-05-31.xlsx", "存款", 3.0, 10.0, "manual", N(0.0)),
        rule("存款", "存款字段", "存款月报2024-06-30.xlsx", "存款", 3.0, 10.0, "manual", N(0.0)),
        rule("存款", "存款字段", "存款月报2023-06-30.xlsx", "存款", 3.0, 10.0, "manual", N(0.0)),
        rule("计划", "计划字段", "年度计划2024-01-31.xlsx", "计划", 2.0, 10.0, "manual", T("是")),
        rule("客户", "", "客户2024-06-30.xlsx", "客户", 1.0, 100.0, "standard", Empty),
        rule("贷款", "存款字段", "贷款月报2024-06-30.xlsx", "贷款", 3.0, 10.0, "manual", Empty),
    ]
}

/// Extraction configuration with the default rules, aliases, a filter and
/// keyword sheets.
pub fn write_config(path: &Path) -> Result<(), XlsxError> {
    write_config_with_rules(path, default_rules())
}

pub fn write_config_with_rules(path: &Path, rules: Vec<Vec<Cell>>) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let mut rows = vec![vec![
        T("multi_sheet_df"),
        T("single_sheet_df"),
        T("file_name"),
        T("sheet_name"),
        T("start_row"),
        T("end_row"),
        T("type"),
        T("plan"),
    ]];
    rows.extend(rules);
    write_sheet(&mut workbook, "multi_sheet_df", &rows)?;
    write_sheet(
        &mut workbook,
        "single_sheet_df",
        &[
            vec![T("single_sheet_df"), T("field"), T("column_index"), T("dtype")],
            vec![T("存款字段"), T("存款余额"), T("C"), T("float")],
            vec![T("存款字段"), T("机构名称"), T("a"), T("str")],
            vec![T("计划字段"), T("机构名称"), T("A"), T("str")],
            vec![T("计划字段"), T("存款余额计划"), T("B"), T("float")],
        ],
    )?;
    write_sheet(
        &mut workbook,
        "机构分组",
        &[
            vec![T("机构分组"), T("机构名称")],
            vec![T("城区"), T("东城支行")],
            vec![T("城区"), T("西城支行")],
            vec![T("城区"), T("南城支行")],
        ],
    )?;
    write_sheet(
        &mut workbook,
        "机构名替换",
        &[vec![T("原机构名称"), T("新机构名称")], vec![T("老南城支行"), T("南城支行")]],
    )?;
    write_sheet(&mut workbook, "过滤机构", &[vec![T("机构名称")], vec![T("总行营业部")]])?;
    write_sheet(
        &mut workbook,
        "ASC_ORDERED_KEYWORDS",
        &[vec![T("关键词")], vec![T("不良率")], vec![T("排名")]],
    )?;
    write_sheet(
        &mut workbook,
        "PERCENTAGE_KEYWORDS",
        &[vec![T("关键词")], vec![T("率")], vec![T("占比")]],
    )?;
    workbook.save(path)
}

pub fn write_deposit_report(path: &Path, rows: &[(&'static str, f64)]) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let mut data = vec![
        vec![T("存款月报")],
        vec![T("机构名称"), T("备注"), T("存款余额")],
    ];
    for (org, value) in rows {
        data.push(vec![T(org), T("-"), N(*value)]);
    }
    write_sheet(&mut workbook, "存款", &data)?;
    workbook.save(path)
}

/// Source spreadsheets for the configuration above. The loan file is left
/// out on purpose.
pub fn write_sources(raw_dir: &Path) -> Result<(), XlsxError> {
    std::fs::create_dir_all(raw_dir).map_err(XlsxError::IoError)?;
    write_deposit_report(
        &raw_dir.join("存款月报2023-06-30.xlsx"),
        &[("东城支行", 100.0), ("西城支行", 80.0), ("老南城支行", 90.0), ("总行营业部", 500.0)],
    )?;
    write_deposit_report(
        &raw_dir.join("存款月报2024-04-30.xlsx"),
        &[("东城支行", 100.0), ("西城支行", 90.0), ("南城支行", 130.0)],
    )?;
    write_deposit_report(
        &raw_dir.join("存款月报2024-05-31.xlsx"),
        &[("东城支行", 110.0), ("西城支行", 95.0), ("南城支行", 125.0)],
    )?;
    write_deposit_report(
        &raw_dir.join("存款月报2024-06-30.xlsx"),
        &[("东城支行", 120.0), ("西城支行", 95.0), ("老南城支行", 120.0), ("总行营业部", 600.0)],
    )?;

    let mut plan = Workbook::new();
    write_sheet(
        &mut plan,
        "计划",
        &[
            vec![T("机构名称"), T("计划")],
            vec![T("东城支行"), N(240.0)],
            vec![T("西城支行"), N(0.0)],
            vec![T("南城支行"), Empty],
        ],
    )?;
    plan.save(raw_dir.join("年度计划2024-01-31.xlsx"))?;

    let mut customers = Workbook::new();
    write_sheet(
        &mut customers,
        "客户",
        &[
            vec![T("数据日期"), T("机构名称"), T("有效客户数")],
            vec![T("2024-06-30"), T("东城支行"), N(1500.0)],
            vec![T("2024-06-30"), T("老南城支行"), N(900.0)],
            vec![T("2024-06-30"), T("西城支行"), T("-")],
        ],
    )?;
    customers.save(raw_dir.join("客户2024-06-30.xlsx"))
}

pub const REPORT_CONFIG: &str = r#"
head:
  title: 经营分析
  data_dt: "2024-06-30"
  org_name: 东城支行 南城支行
  author: 分析组
  desc: 测试报告
sections:
  - section_title: 1 存款业务
    indicators:
      - name: 存款余额
        operators: [当期值, 组内排名, 近3月趋势, 年同比, 月环比]
      - name: 存款余额时序完成率
        operators: [当期值]
      - name: 有效客户数
        note: （户）
        operators: [当期值]
  - section_title: 2 排名汇总
    indicator_rank:
"#;

/// Layout of one test batch inside a temporary directory.
pub struct Batch {
    pub config: PathBuf,
    pub raw_dir: PathBuf,
    pub artifact: PathBuf,
    pub report_config: PathBuf,
    pub reports: PathBuf,
}

impl Batch {
    pub fn create(root: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let batch = Self {
            config: root.join("config/data_extraction_config.xlsx"),
            raw_dir: root.join("data/raw"),
            artifact: root.join("data/processed/data_preprocessed.xlsx"),
            report_config: root.join("config/report_config.yaml"),
            reports: root.join("reports"),
        };
        std::fs::create_dir_all(root.join("config"))?;
        write_config(&batch.config)?;
        write_sources(&batch.raw_dir)?;
        std::fs::write(&batch.report_config, REPORT_CONFIG)?;
        Ok(batch)
    }
}
