//! End-to-end runs of the extraction and report stages over workbooks
//! generated in a temporary directory.

mod common;

use aa_engine::error::{PipelineError, QueryError};
use aa_engine::heads::dump_heads;
use aa_engine::wind::{reshape_wind, RESHAPED_SHEET};
use aa_engine::long_table::LongTable;
use aa_engine::pipeline::{generate_reports, prepare};
use aa_engine::polarity::RankingSentimentPolicy;
use aa_engine::schema::{DATE, GROUP, LONG_SHEET, ORG, WIDE_SHEET};
use aa_engine::workbook::SourceWorkbook;
use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDate;
use common::{rule, Batch, Cell};
use tempfile::tempdir;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

#[test]
fn test_prepare_writes_raw_wide_and_long_pages() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let batch = Batch::create(dir.path())?;

    let summary = prepare(&batch.config, &batch.raw_dir, &batch.artifact)?;
    assert_eq!(summary.raw_tables, 3);
    assert_eq!(summary.failed_rules, 1);
    // 2023-06 and three months of 2024 for three branches; 总行营业部 is filtered
    assert_eq!(summary.wide_rows, 12);
    assert_eq!(summary.long_rows, 26);

    let sheets = open_workbook_auto(&batch.artifact)?.sheet_names();
    assert_eq!(sheets, vec!["存款", "计划", "ALL_DT_客户", WIDE_SHEET, LONG_SHEET]);

    let mut book = SourceWorkbook::open(&batch.artifact)?;

    let wide = book.header_table(WIDE_SHEET)?;
    assert_eq!(&wide.headers[..3], &[DATE, GROUP, ORG]);
    for column in ["存款余额", "有效客户数", "存款余额计划", "存款余额计划完成率", "存款余额时序完成率"] {
        assert!(wide.column_index(column).is_some(), "missing column {}", column);
    }
    assert_eq!(wide.text(0, DATE).as_deref(), Some("2023-06-30"));
    assert!(wide.column_texts(ORG).iter().all(|o| o != "总行营业部" && o != "老南城支行"));
    Ok(())
}

#[test]
fn test_long_table_values_after_prepare() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let batch = Batch::create(dir.path())?;
    prepare(&batch.config, &batch.raw_dir, &batch.artifact)?;

    let long = LongTable::read_artifact(&batch.artifact)?;
    assert_eq!(long.height(), 26);

    let current = long.point(d(2024, 6, 30), "东城支行", "存款余额", "当前")?;
    assert_eq!(current.value, 120.0);
    assert_eq!(current.group.as_deref(), Some("城区"));

    // alias substitution applies to standard sheets as well
    assert_eq!(long.point(d(2024, 6, 30), "南城支行", "有效客户数", "当前")?.value, 900.0);
    assert_eq!(long.point(d(2023, 6, 30), "南城支行", "存款余额", "当前")?.value, 90.0);
    // a "-" placeholder in a numeric column is an empty cell, not a text column
    assert_eq!(long.point(d(2024, 6, 30), "东城支行", "有效客户数", "当前")?.value, 1500.0);
    assert_eq!(
        long.point(d(2024, 6, 30), "西城支行", "有效客户数", "当前"),
        Err(QueryError::Missing { period: "当前" })
    );

    // the yearly plan reaches every month of its year and none of the prior year
    assert_eq!(long.point(d(2024, 4, 30), "东城支行", "存款余额计划", "当前")?.value, 240.0);
    assert_eq!(
        long.point(d(2023, 6, 30), "东城支行", "存款余额计划", "当前"),
        Err(QueryError::Missing { period: "当前" })
    );

    assert_eq!(long.point(d(2024, 6, 30), "东城支行", "存款余额计划完成率", "当前")?.value, 0.5);
    assert_eq!(long.point(d(2024, 6, 30), "东城支行", "存款余额时序完成率", "当前")?.value, 1.0);
    // a zero plan yields no completion rate
    assert_eq!(
        long.point(d(2024, 6, 30), "西城支行", "存款余额计划完成率", "当前"),
        Err(QueryError::Missing { period: "当前" })
    );
    Ok(())
}

#[test]
fn test_prepare_is_deterministic() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let batch = Batch::create(dir.path())?;
    let second = dir.path().join("data/processed/second.xlsx");

    prepare(&batch.config, &batch.raw_dir, &batch.artifact)?;
    prepare(&batch.config, &batch.raw_dir, &second)?;

    let first = LongTable::read_artifact(&batch.artifact)?;
    let again = LongTable::read_artifact(&second)?;
    assert!(first.frame().equals_missing(again.frame()));
    Ok(())
}

#[test]
fn test_missing_configuration_sheet_is_fatal() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let config = dir.path().join("config.xlsx");
    let mut workbook = rust_xlsxwriter::Workbook::new();
    common::write_sheet(&mut workbook, "其他", &[vec![common::Cell::Text("x")]])?;
    workbook.save(&config)?;

    let err = prepare(&config, dir.path(), &dir.path().join("out.xlsx")).unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)), "{:?}", err);
    assert_eq!(err.exit_code(), 2);

    let err = prepare(&dir.path().join("absent.xlsx"), dir.path(), &dir.path().join("out.xlsx")).unwrap_err();
    assert_eq!(err.exit_code(), 2);
    Ok(())
}

#[test]
fn test_standard_rules_listed_first_still_follow_manual_groups() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let batch = Batch::create(dir.path())?;
    common::write_config_with_rules(
        &batch.config,
        vec![
            rule("客户", "", "客户2024-06-30.xlsx", "客户", 1.0, 100.0, "standard", Cell::Empty),
            rule("存款", "存款字段", "存款月报2024-06-30.xlsx", "存款", 3.0, 10.0, "manual", Cell::Empty),
        ],
    )?;

    let summary = prepare(&batch.config, &batch.raw_dir, &batch.artifact)?;
    assert_eq!(summary.wide_rows, 3);
    assert_eq!(summary.long_rows, 5);

    let sheets = open_workbook_auto(&batch.artifact)?.sheet_names();
    assert_eq!(sheets, vec!["存款", "ALL_DT_客户", WIDE_SHEET, LONG_SHEET]);
    let wide = SourceWorkbook::open(&batch.artifact)?.header_table(WIDE_SHEET)?;
    assert_eq!(wide.headers, vec![DATE, GROUP, ORG, "存款余额", "有效客户数"]);
    Ok(())
}

#[test]
fn test_missing_configuration_column_is_fatal() -> Result<(), Box<dyn std::error::Error>> {
    use common::Cell::Text as T;

    let dir = tempdir()?;
    let config = dir.path().join("config.xlsx");
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let mut rules = vec![vec![
        T("multi_sheet_df"),
        T("single_sheet_df"),
        T("file_name"),
        T("sheet_name"),
        T("start_row"),
        T("end_row"),
        T("type"),
    ]];
    rules.extend(common::default_rules());
    common::write_sheet(&mut workbook, "multi_sheet_df", &rules)?;
    common::write_sheet(
        &mut workbook,
        "single_sheet_df",
        &[
            vec![T("single_sheet_df"), T("field"), T("column_index")],
            vec![T("存款字段"), T("存款余额"), T("C")],
        ],
    )?;
    workbook.save(&config)?;

    let err = prepare(&config, dir.path(), &dir.path().join("out.xlsx")).unwrap_err();
    assert!(
        matches!(&err, PipelineError::Configuration(m) if m.contains("single_sheet_df") && m.contains("dtype")),
        "{:?}",
        err
    );
    assert_eq!(err.exit_code(), 2);
    Ok(())
}

#[test]
fn test_reports_from_prepared_artifact() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let batch = Batch::create(dir.path())?;
    prepare(&batch.config, &batch.raw_dir, &batch.artifact)?;

    let written = generate_reports(
        &batch.config,
        &batch.report_config,
        &batch.artifact,
        &batch.reports,
        RankingSentimentPolicy::default(),
    )?;
    assert_eq!(written.len(), 2);
    assert_eq!(
        written[0].file_name().and_then(|n| n.to_str()),
        Some("经营分析_东城支行_2024-06-30.md")
    );

    let report = std::fs::read_to_string(&written[0])?;
    assert!(report.starts_with("> [!INFO] 【数据日期】2024-06-30        【机构名称】东城支行"));
    assert!(report.contains("## 1 存款业务"));
    assert!(report.contains("- ➖当期值：120.0"));
    assert!(report.contains(
        "- ➖组内排名：第1名（组内共3家机构）；组内排名顺序为：No1.东城支行（120.0）， No1.南城支行（120.0）， No3.西城支行（95.0）"
    ));
    assert!(report.contains("- 🔴近3月趋势：连续2月向好。近3月指标值为：100.0 110.0 120.0"));
    assert!(report.contains("- 🔴年同比情况：同比变动 20.0，同比增幅 +20.0%，去年同期：100.0"));
    assert!(report.contains("- 🔴月环比情况：环比变动 10.0，环比增幅 +9.1%，上月同期：110.0"));
    assert!(report.contains("- ➖当期值：100.00%"));
    assert!(report.contains("**有效客户数（户）**"));
    assert!(report.contains("- ➖当期值：1500"));
    assert!(report.contains("#### 存款业务"));
    assert!(report.contains("===============（第1名）"));

    let south = std::fs::read_to_string(&written[1])?;
    assert!(south.contains("- ➖当期值：900"));
    // no plan for 南城支行, so the derived rate is missing
    assert!(south.contains("计算当期值时：查询指标数据出错"));
    Ok(())
}

#[test]
fn test_header_dump_pages_per_source_sheet() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let batch = Batch::create(dir.path())?;
    let output = dir.path().join("data/processed/table_heads.xlsx");

    let summary = dump_heads(&batch.config, &batch.raw_dir, &output)?;
    assert_eq!(summary.rules, 7);
    // the loan report does not exist
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.pages, 3);

    let mut book = SourceWorkbook::open(&output)?;
    assert!(!book.has_sheet("贷款"));
    let deposits = book.range("存款")?;
    let text = |row: u32| deposits.get_value((row, 0)).cloned().unwrap_or(Data::Empty).to_string();
    assert_eq!(text(0), "存款月报2024-04-30.xlsx [3-10]");
    assert_eq!(text(1), "存款月报");
    assert_eq!(text(2), "机构名称");
    assert_eq!(text(3), "东城支行");
    assert_eq!(text(5), "南城支行");
    assert_eq!(text(7), "存款月报2024-05-31.xlsx [3-10]");
    Ok(())
}

#[test]
fn test_wind_export_pivots_into_a_standard_sheet() -> Result<(), Box<dyn std::error::Error>> {
    use common::Cell::{Empty, Number as N, Text as T};

    let dir = tempdir()?;
    let input = dir.path().join("wind.xlsx");
    let output = dir.path().join("wind_reshaped.xlsx");
    let mut workbook = rust_xlsxwriter::Workbook::new();
    common::write_sheet(
        &mut workbook,
        "业务指标",
        &[
            vec![
                T("代码"),
                T("名称"),
                T("贷款总额\n[单位]亿元\n[报告期]2024-12-31\n[报表类型]合并报表"),
                T("贷款总额\n[单位]亿元\n[报告期]2023-12-31\n[报表类型]合并报表"),
            ],
            vec![T("600036.SH"), T("招商银行"), N(60.0), N(55.0)],
            vec![T("000001.SZ"), T("平安银行"), N(30.0), Empty],
        ],
    )?;
    workbook.save(&input)?;

    assert_eq!(reshape_wind(&input, "业务指标", &output)?, 3);
    let table = SourceWorkbook::open(&output)?.header_table(RESHAPED_SHEET)?;
    assert_eq!(table.headers, vec![ORG, DATE, "贷款总额"]);
    assert_eq!(table.text(0, ORG).as_deref(), Some("平安银行"));
    assert_eq!(table.text(0, DATE).as_deref(), Some("2024/12/31"));
    assert_eq!(table.number(2, "贷款总额"), Some(60.0));
    Ok(())
}
