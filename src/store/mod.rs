//! Relational store
//!
//! The pipelines talk to storage only through [`QuestionnaireStore`]; the
//! SQLite implementation lives in [`sqlite`].

mod schema;
pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::BridgeResult;
use crate::types::{
    ExportRow, NewQuestion, NewSheet, QuestionWithResponse, Response, ResponseInput, Sheet,
    TemplateInfo, TemplateRecord,
};

pub trait QuestionnaireStore: Send + Sync {
    /// Delete every response, question and sheet, in that order, as one unit.
    /// Returns the number of questions that existed before the clear.
    fn clear_all(&self) -> BridgeResult<usize>;

    /// Insert a sheet and return its id
    fn create_sheet(&self, sheet: &NewSheet) -> BridgeResult<i64>;

    /// Insert a question and return its id
    fn create_question(&self, question: &NewQuestion) -> BridgeResult<i64>;

    /// Insert a response for a question and return its id
    fn create_response(&self, question_id: i64, response_text: &str) -> BridgeResult<i64>;

    /// Insert the first response for a question, or update the existing one in place
    fn upsert_response(&self, question_id: i64, input: &ResponseInput) -> BridgeResult<Response>;

    fn sheets(&self) -> BridgeResult<Vec<Sheet>>;

    fn sheet(&self, sheet_id: i64) -> BridgeResult<Option<Sheet>>;

    /// Questions of one sheet ordered by row, optionally filtered by a
    /// substring of title, description or question text
    fn questions(
        &self,
        sheet_id: i64,
        search: Option<&str>,
    ) -> BridgeResult<Vec<QuestionWithResponse>>;

    fn question(&self, question_id: i64) -> BridgeResult<Option<QuestionWithResponse>>;

    /// Answers with non-empty text, resolved to sheet name and cell
    fn export_rows(&self) -> BridgeResult<Vec<ExportRow>>;

    /// (sheet count, question count)
    fn counts(&self) -> BridgeResult<(usize, usize)>;

    /// Store template bytes as a new version
    fn save_template(&self, content: &[u8]) -> BridgeResult<TemplateInfo>;

    /// Delete all but the newest `keep` template versions; returns how many
    /// were removed. Version numbers are never reused.
    fn prune_templates(&self, keep: usize) -> BridgeResult<usize>;

    /// A specific template version, or the latest when `version` is `None`
    fn template(&self, version: Option<i64>) -> BridgeResult<Option<TemplateRecord>>;

    fn templates(&self) -> BridgeResult<Vec<TemplateInfo>>;
}
