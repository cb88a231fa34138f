//! Indicator polarity and display keyword sets.
//!
//! The keyword lists come from the extraction configuration workbook and are
//! passed by value into the operator engine; nothing here is global.

/// Whether larger values of an indicator are good news.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    HigherIsBetter,
    LowerIsBetter,
}

/// How a rank inside the peer group maps to a sentiment.
///
/// `Legacy` reproduces the production reports, where the worst third of the
/// peer group is marked positive exactly like the best third. That looks like
/// a duplicated branch, but downstream readers are used to it, so it stays
/// the default until the business owner confirms the intended reading.
/// `Symmetric` marks the worst third negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankingSentimentPolicy {
    #[default]
    Legacy,
    Symmetric,
}

impl std::str::FromStr for RankingSentimentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "symmetric" => Ok(Self::Symmetric),
            other => Err(format!("unknown ranking sentiment policy: {}", other)),
        }
    }
}

pub const DEFAULT_ASCENDING_KEYWORDS: &[&str] = &[
    "不良率",
    "成本率",
    "同业排名",
    "排名",
    "零售综合考评等级",
    "退货率",
    "成本",
    "库存量（件）",
];

pub const DEFAULT_PERCENTAGE_KEYWORDS: &[&str] = &["率", "占比", "定价", "比例"];

#[derive(Debug, Clone)]
pub struct PolarityConfig {
    /// Indicators containing any of these are "lower is better".
    pub ascending_keywords: Vec<String>,
    /// Indicators containing any of these are displayed as percentages.
    pub percentage_keywords: Vec<String>,
    pub ranking_policy: RankingSentimentPolicy,
}

impl Default for PolarityConfig {
    fn default() -> Self {
        Self {
            ascending_keywords: DEFAULT_ASCENDING_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            percentage_keywords: DEFAULT_PERCENTAGE_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            ranking_policy: RankingSentimentPolicy::default(),
        }
    }
}

impl PolarityConfig {
    pub fn new(ascending_keywords: Vec<String>, percentage_keywords: Vec<String>) -> Self {
        Self {
            ascending_keywords,
            percentage_keywords,
            ranking_policy: RankingSentimentPolicy::default(),
        }
    }

    pub fn with_ranking_policy(mut self, policy: RankingSentimentPolicy) -> Self {
        self.ranking_policy = policy;
        self
    }

    pub fn lower_is_better(&self, indicator: &str) -> bool {
        self.ascending_keywords.iter().any(|k| indicator.contains(k.as_str()))
    }

    pub fn polarity(&self, indicator: &str) -> Polarity {
        if self.lower_is_better(indicator) {
            Polarity::LowerIsBetter
        } else {
            Polarity::HigherIsBetter
        }
    }

    pub fn is_percentage(&self, indicator: &str) -> bool {
        self.percentage_keywords.iter().any(|k| indicator.contains(k.as_str()))
    }
}
