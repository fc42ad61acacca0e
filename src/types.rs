use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

//==============================================================================
// Questionnaire records
//==============================================================================

/// How a question is answered in the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    /// Free text
    #[default]
    Text,
    /// Compliance status (policy requirements)
    Compliance,
    /// Pick from a list (qualification)
    Select,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Text => "text",
            QuestionType::Compliance => "compliance",
            QuestionType::Select => "select",
        }
    }
}

impl FromStr for QuestionType {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(QuestionType::Text),
            "compliance" => Ok(QuestionType::Compliance),
            "select" => Ok(QuestionType::Select),
            other => Err(BridgeError::Mapping(format!(
                "unknown question type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One imported tab
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub id: i64,
    /// Exact tab name in the template (trailing spaces included)
    pub name: String,
    pub display_name: String,
    pub order_index: i64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSheet {
    pub name: String,
    pub display_name: String,
    pub order_index: i64,
    pub description: Option<String>,
}

/// One answerable item and the cell its answer is written back to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub sheet_id: i64,
    pub row_number: u32,
    pub cell_column: String,
    /// External identifier printed in the questionnaire (e.g. `1.2.3`)
    #[serde(rename = "question_id")]
    pub external_id: Option<String>,
    pub chapter: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub question_text: Option<String>,
    pub question_text_fr: Option<String>,
    pub question_type: QuestionType,
    pub required: bool,
}

/// Question fields as produced by the extraction rules, before insertion
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewQuestion {
    pub sheet_id: i64,
    pub row_number: u32,
    pub cell_column: String,
    pub external_id: Option<String>,
    pub chapter: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub question_text: Option<String>,
    pub question_text_fr: Option<String>,
    pub question_type: QuestionType,
    pub required: bool,
}

/// Stored answer for a question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: i64,
    pub question_id: i64,
    pub response_text: Option<String>,
    pub response_value: Option<String>,
    pub user_id: Option<i64>,
    pub updated_at: String,
}

/// Payload for saving an answer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResponseInput {
    #[serde(default)]
    pub response_text: Option<String>,
    #[serde(default)]
    pub response_value: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

/// A question together with its current answer, if any
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionWithResponse {
    #[serde(flatten)]
    pub question: Question,
    pub response: Option<Response>,
}

/// One answer resolved to the tab and cell it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    pub sheet_name: String,
    pub row_number: u32,
    pub cell_column: String,
    pub response_text: String,
}

//==============================================================================
// Templates
//==============================================================================

/// A stored template version, including its xlsx bytes
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateRecord {
    pub version: i64,
    pub content: Vec<u8>,
    pub imported_at: String,
}

/// Template metadata without the binary payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateInfo {
    pub version: i64,
    pub imported_at: String,
    pub size_bytes: i64,
}

//==============================================================================
// Pipeline results
//==============================================================================

/// Counts reported by a completed import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ImportSummary {
    pub sheet_count: usize,
    pub question_count: usize,
    pub seeded_responses: usize,
    pub template_version: i64,
    /// Tabs present in the file that no mapping covers
    pub ignored_tabs: Vec<String>,
}

/// A filled-in workbook ready to hand to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutput {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub template_version: i64,
    pub cells_written: usize,
    pub cells_skipped: usize,
}

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Suggested download name for an export made on `date`
pub fn export_filename(date: chrono::NaiveDate) -> String {
    format!("Questionnaire-Completed-{}.xlsx", date.format("%Y-%m-%d"))
}
