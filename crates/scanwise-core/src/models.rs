//! Data models for Scanwise
//!
//! Receipt pipeline types (receipt, breakdown, anomalies, advice) and the
//! persisted history types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Categories
// ============================================================================

/// Spending category for a receipt line item
///
/// Closed set. Labels the model invents are folded into `Others`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Category {
    Vegetables,
    Fruits,
    Dairy,
    Meat,
    Bakery,
    Beverages,
    Snacks,
    Cosmetics,
    PersonalCare,
    Household,
    Electronics,
    Clothing,
    #[default]
    Others,
}

impl Category {
    /// Display label, also used in prompts and stored rows
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vegetables => "Vegetables",
            Self::Fruits => "Fruits",
            Self::Dairy => "Dairy",
            Self::Meat => "Meat",
            Self::Bakery => "Bakery",
            Self::Beverages => "Beverages",
            Self::Snacks => "Snacks",
            Self::Cosmetics => "Cosmetics",
            Self::PersonalCare => "Personal Care",
            Self::Household => "Household",
            Self::Electronics => "Electronics",
            Self::Clothing => "Clothing",
            Self::Others => "Others",
        }
    }

    /// All categories in prompt order
    pub fn all() -> &'static [Category] {
        &[
            Self::Vegetables,
            Self::Fruits,
            Self::Dairy,
            Self::Meat,
            Self::Bakery,
            Self::Beverages,
            Self::Snacks,
            Self::Cosmetics,
            Self::PersonalCare,
            Self::Household,
            Self::Electronics,
            Self::Clothing,
            Self::Others,
        ]
    }

    /// Normalize a free-form label into a category
    ///
    /// Case, underscores, hyphens and repeated whitespace are ignored.
    /// Anything unrecognized becomes `Others`.
    pub fn from_label(label: &str) -> Self {
        let normalized = label
            .replace(['_', '-'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        match normalized.as_str() {
            "vegetables" | "vegetable" => Self::Vegetables,
            "fruits" | "fruit" => Self::Fruits,
            "dairy" => Self::Dairy,
            "meat" => Self::Meat,
            "bakery" => Self::Bakery,
            "beverages" | "beverage" => Self::Beverages,
            "snacks" | "snack" => Self::Snacks,
            "cosmetics" => Self::Cosmetics,
            "personal care" | "personalcare" => Self::PersonalCare,
            "household" => Self::Household,
            "electronics" => Self::Electronics,
            "clothing" => Self::Clothing,
            _ => Self::Others,
        }
    }

    /// Comma-separated list of every label, for prompts
    pub fn prompt_list() -> String {
        Self::all()
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        Self::from_label(&s)
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.as_str().to_string()
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Parsed receipts
// ============================================================================

/// A line item on a parsed receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub category: Category,
}

impl LineItem {
    pub fn new(name: &str, quantity: f64, unit_price: f64, category: Category) -> Self {
        Self {
            name: name.to_string(),
            quantity,
            unit_price,
            category,
        }
    }

    /// quantity × unit price
    pub fn line_total(&self) -> f64 {
        self.quantity * self.unit_price
    }
}

/// Structured receipt produced by the parser
///
/// The item sum is not required to match `total`; model output is untrusted
/// and the aggregator reports any discrepancy instead of rejecting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedReceipt {
    pub store_name: Option<String>,
    pub date: Option<NaiveDate>,
    pub items: Vec<LineItem>,
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub total: f64,
}

impl ParsedReceipt {
    /// Sum of quantity × unit price over every item
    pub fn items_total(&self) -> f64 {
        self.items.iter().map(LineItem::line_total).sum()
    }
}

// ============================================================================
// Aggregation and anomalies
// ============================================================================

/// Spend for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySpend {
    pub category: Category,
    pub amount: f64,
    /// amount / receipt total × 100
    pub percentage: f64,
}

/// Per-category spend, sorted by amount descending
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub categories: Vec<CategorySpend>,
    /// Receipt total the percentages are relative to
    pub total: f64,
    /// Sum of line totals (may differ from `total`)
    pub items_total: f64,
    pub item_count: usize,
}

impl CategoryBreakdown {
    pub fn get(&self, category: Category) -> Option<&CategorySpend> {
        self.categories.iter().find(|c| c.category == category)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategorySpend> {
        self.categories.iter()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Sum of all category percentages
    pub fn percentage_sum(&self) -> f64 {
        self.categories.iter().map(|c| c.percentage).sum()
    }

    /// Receipt total minus the item sum (tax, fees, or a misread)
    pub fn discrepancy(&self) -> f64 {
        self.total - self.items_total
    }
}

/// Anomaly severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// A category takes more than the configured share of total spend
    HighSpending,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighSpending => "high_spending",
        }
    }
}

/// A category whose share of spend exceeds the threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub category: Category,
    pub percentage: f64,
    pub severity: Severity,
}

impl Anomaly {
    pub fn message(&self) -> String {
        format!(
            "{} accounts for {:.1}% of total spending",
            self.category, self.percentage
        )
    }
}

// ============================================================================
// Advice and reports
// ============================================================================

/// Free-text advice from the language model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdviceReport {
    pub text: String,
    pub tokens_used: u32,
}

/// Tokens consumed by each model call in one pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub parse: u32,
    pub advice: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.parse + self.advice
    }
}

/// Aggregate result of a successful pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub receipt: ParsedReceipt,
    pub breakdown: CategoryBreakdown,
    pub anomalies: Vec<Anomaly>,
    pub advice: AdviceReport,
    pub usage: TokenUsage,
}

/// A pipeline stage, used to tag failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Extract,
    Parse,
    Aggregate,
    Detect,
    Advise,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Parse => "parse",
            Self::Aggregate => "aggregate",
            Self::Detect => "detect",
            Self::Advise => "advise",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// History
// ============================================================================

/// What produced a history row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Receipt,
    Summary,
    Code,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Receipt => "receipt",
            Self::Summary => "summary",
            Self::Code => "code",
        }
    }
}

impl std::str::FromStr for AnalysisKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "receipt" => Ok(Self::Receipt),
            "summary" => Ok(Self::Summary),
            "code" => Ok(Self::Code),
            _ => Err(format!("Unknown analysis kind: {}", s)),
        }
    }
}

/// A new history row
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub kind: AnalysisKind,
    /// Uploaded file name, if any
    pub source_name: Option<String>,
    pub extracted_text: String,
    /// Summary, code analysis, or receipt advice
    pub output_text: Option<String>,
    /// Free-form options (summary length/language, analysis type)
    pub options: Option<String>,
    pub tokens_used: u32,
    pub processing_ms: i64,
}

/// A stored history row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub id: i64,
    pub user_id: String,
    pub kind: AnalysisKind,
    pub source_name: Option<String>,
    pub content_hash: String,
    pub extracted_text: String,
    pub output_text: Option<String>,
    pub options: Option<String>,
    pub tokens_used: i64,
    pub processing_ms: i64,
    pub created_at: DateTime<Utc>,
}

/// A stored receipt analysis with its full report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredReport {
    pub analysis: Analysis,
    pub report: PipelineReport,
}

/// Per-user activity statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_analyses: i64,
    pub total_tokens: i64,
    pub avg_processing_ms: f64,
    pub active_days: i64,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Whole-system statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemStats {
    pub total_users: i64,
    pub total_analyses: i64,
    pub total_tokens: i64,
    pub today_analyses: i64,
}

/// Spend in one category across all of a user's receipts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: Category,
    pub amount: f64,
    pub receipt_count: i64,
}
