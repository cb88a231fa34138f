use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Data quality error: {0}")]
    DataQuality(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("Workbook read error: {0}")]
    WorkbookRead(#[from] calamine::Error),

    #[error("Workbook write error: {0}")]
    WorkbookWrite(#[from] rust_xlsxwriter::XlsxError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl PipelineError {
    /// Process exit status for a batch that stopped on this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Configuration(_) => 2,
            _ => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failure of a single point query against the long table.
///
/// These never abort a report: operators render them in place of the
/// expected text. The messages are the ones printed in the report body.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("{period}数据记录数为0，请检查数据是否完整")]
    Missing { period: &'static str },

    #[error("{period}数据记录数不为1（共{count}条），请检查数据是否重复")]
    Duplicate { period: &'static str, count: usize },

    #[error("该机构未配置机构分组，无法参与组内排名")]
    NoGroup,

    #[error("数据日期不完整，数据应包含近3个{unit}末的数据（缺少：{missing}）")]
    IncompletePeriods { unit: &'static str, missing: String },

    #[error("数据日期超出可计算范围")]
    DateOutOfRange,

    #[error("查询引擎错误：{0}")]
    Engine(String),
}

impl From<polars::prelude::PolarsError> for QueryError {
    fn from(e: polars::prelude::PolarsError) -> Self {
        QueryError::Engine(e.to_string())
    }
}

impl From<PipelineError> for QueryError {
    fn from(e: PipelineError) -> Self {
        QueryError::Engine(e.to_string())
    }
}
