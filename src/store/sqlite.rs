//! SQLite-backed [`QuestionnaireStore`]

use super::{schema, QuestionnaireStore};
use crate::error::{BridgeError, BridgeResult};
use crate::types::{
    ExportRow, NewQuestion, NewSheet, Question, QuestionType, QuestionWithResponse, Response,
    ResponseInput, Sheet, TemplateInfo, TemplateRecord,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

const QUESTION_COLUMNS: &str = "q.id, q.sheet_id, q.row_number, q.cell_column, q.question_id, \
     q.chapter, q.title, q.description, q.question_text, q.question_text_fr, q.question_type, \
     q.required, r.id, r.response_text, r.response_value, r.user_id, r.updated_at";

// A question is answered at most once in practice; pick the oldest row if not.
const RESPONSE_JOIN: &str = "LEFT JOIN responses r ON r.id = \
     (SELECT MIN(id) FROM responses WHERE question_id = q.id)";

impl SqliteStore {
    pub fn open_path(path: impl AsRef<Path>) -> BridgeResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> BridgeResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> BridgeResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        schema::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn sheet_from_row(row: &Row<'_>) -> rusqlite::Result<Sheet> {
    Ok(Sheet {
        id: row.get(0)?,
        name: row.get(1)?,
        display_name: row.get(2)?,
        order_index: row.get(3)?,
        description: row.get(4)?,
    })
}

fn question_from_row(row: &Row<'_>) -> rusqlite::Result<QuestionWithResponse> {
    let question_type: String = row.get(10)?;
    let question_type: QuestionType = question_type.parse().map_err(|e: BridgeError| {
        rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let question = Question {
        id: row.get(0)?,
        sheet_id: row.get(1)?,
        row_number: row.get(2)?,
        cell_column: row.get(3)?,
        external_id: row.get(4)?,
        chapter: row.get(5)?,
        title: row.get(6)?,
        description: row.get(7)?,
        question_text: row.get(8)?,
        question_text_fr: row.get(9)?,
        question_type,
        required: row.get(11)?,
    };

    let response_id: Option<i64> = row.get(12)?;
    let response = match response_id {
        Some(id) => Some(Response {
            id,
            question_id: question.id,
            response_text: row.get(13)?,
            response_value: row.get(14)?,
            user_id: row.get(15)?,
            updated_at: row.get(16)?,
        }),
        None => None,
    };

    Ok(QuestionWithResponse { question, response })
}

fn response_from_row(row: &Row<'_>) -> rusqlite::Result<Response> {
    Ok(Response {
        id: row.get(0)?,
        question_id: row.get(1)?,
        response_text: row.get(2)?,
        response_value: row.get(3)?,
        user_id: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

impl QuestionnaireStore for SqliteStore {
    fn clear_all(&self) -> BridgeResult<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let existing: i64 = tx.query_row("SELECT COUNT(*) FROM questions", [], |r| r.get(0))?;
        tx.execute("DELETE FROM responses", [])?;
        tx.execute("DELETE FROM questions", [])?;
        tx.execute("DELETE FROM sheets", [])?;
        tx.commit()?;
        Ok(existing as usize)
    }

    fn create_sheet(&self, sheet: &NewSheet) -> BridgeResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO sheets (name, display_name, order_index, description)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                sheet.name,
                sheet.display_name,
                sheet.order_index,
                sheet.description
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn create_question(&self, q: &NewQuestion) -> BridgeResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO questions (sheet_id, row_number, question_id, chapter, title, description,
                                    question_text, question_text_fr, cell_column, question_type, required)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                q.sheet_id,
                q.row_number,
                q.external_id,
                q.chapter,
                q.title,
                q.description,
                q.question_text,
                q.question_text_fr,
                q.cell_column,
                q.question_type.as_str(),
                q.required
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn create_response(&self, question_id: i64, response_text: &str) -> BridgeResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO responses (question_id, response_text) VALUES (?1, ?2)",
            params![question_id, response_text],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn upsert_response(&self, question_id: i64, input: &ResponseInput) -> BridgeResult<Response> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT MIN(id) FROM responses WHERE question_id = ?1",
                params![question_id],
                |r| r.get::<_, Option<i64>>(0),
            )
            .optional()?
            .flatten();

        let id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE responses
                     SET response_text = ?1, response_value = ?2, user_id = ?3,
                         updated_at = CURRENT_TIMESTAMP
                     WHERE id = ?4",
                    params![
                        input.response_text,
                        input.response_value,
                        input.user_id,
                        id
                    ],
                )?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO responses (question_id, response_text, response_value, user_id)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        question_id,
                        input.response_text,
                        input.response_value,
                        input.user_id
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };

        let response = tx.query_row(
            "SELECT id, question_id, response_text, response_value, user_id, updated_at
             FROM responses WHERE id = ?1",
            params![id],
            response_from_row,
        )?;
        tx.commit()?;
        Ok(response)
    }

    fn sheets(&self) -> BridgeResult<Vec<Sheet>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, display_name, order_index, description
             FROM sheets ORDER BY order_index",
        )?;
        let sheets = stmt
            .query_map([], sheet_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sheets)
    }

    fn sheet(&self, sheet_id: i64) -> BridgeResult<Option<Sheet>> {
        let conn = self.conn();
        let sheet = conn
            .query_row(
                "SELECT id, name, display_name, order_index, description
                 FROM sheets WHERE id = ?1",
                params![sheet_id],
                sheet_from_row,
            )
            .optional()?;
        Ok(sheet)
    }

    fn questions(
        &self,
        sheet_id: i64,
        search: Option<&str>,
    ) -> BridgeResult<Vec<QuestionWithResponse>> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        let conn = self.conn();
        let sql = format!(
            "SELECT {QUESTION_COLUMNS} FROM questions q {RESPONSE_JOIN}
             WHERE q.sheet_id = ?1
               AND (?2 IS NULL OR q.title LIKE ?2 OR q.description LIKE ?2 OR q.question_text LIKE ?2)
             ORDER BY q.row_number, q.cell_column"
        );
        let mut stmt = conn.prepare(&sql)?;
        let questions = stmt
            .query_map(params![sheet_id, pattern], question_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(questions)
    }

    fn question(&self, question_id: i64) -> BridgeResult<Option<QuestionWithResponse>> {
        let conn = self.conn();
        let sql = format!("SELECT {QUESTION_COLUMNS} FROM questions q {RESPONSE_JOIN} WHERE q.id = ?1");
        let question = conn
            .query_row(&sql, params![question_id], question_from_row)
            .optional()?;
        Ok(question)
    }

    fn export_rows(&self) -> BridgeResult<Vec<ExportRow>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT s.name, q.row_number, q.cell_column, r.response_text
             FROM questions q
             JOIN sheets s ON q.sheet_id = s.id
             {RESPONSE_JOIN}
             WHERE r.response_text IS NOT NULL AND r.response_text != ''
             ORDER BY s.order_index, q.row_number, q.cell_column"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ExportRow {
                    sheet_name: row.get(0)?,
                    row_number: row.get(1)?,
                    cell_column: row.get(2)?,
                    response_text: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn counts(&self) -> BridgeResult<(usize, usize)> {
        let conn = self.conn();
        let sheets: i64 = conn.query_row("SELECT COUNT(*) FROM sheets", [], |r| r.get(0))?;
        let questions: i64 = conn.query_row("SELECT COUNT(*) FROM questions", [], |r| r.get(0))?;
        Ok((sheets as usize, questions as usize))
    }

    fn save_template(&self, content: &[u8]) -> BridgeResult<TemplateInfo> {
        let imported_at = chrono::Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO templates (content, size_bytes, imported_at) VALUES (?1, ?2, ?3)",
            params![content, content.len() as i64, imported_at],
        )?;
        Ok(TemplateInfo {
            version: conn.last_insert_rowid(),
            imported_at,
            size_bytes: content.len() as i64,
        })
    }

    fn prune_templates(&self, keep: usize) -> BridgeResult<usize> {
        let conn = self.conn();
        let removed = conn.execute(
            "DELETE FROM templates WHERE version NOT IN
             (SELECT version FROM templates ORDER BY version DESC LIMIT ?1)",
            params![keep as i64],
        )?;
        Ok(removed)
    }

    fn template(&self, version: Option<i64>) -> BridgeResult<Option<TemplateRecord>> {
        let conn = self.conn();
        let map = |row: &Row<'_>| {
            Ok(TemplateRecord {
                version: row.get(0)?,
                content: row.get(1)?,
                imported_at: row.get(2)?,
            })
        };
        let record = match version {
            Some(v) => conn
                .query_row(
                    "SELECT version, content, imported_at FROM templates WHERE version = ?1",
                    params![v],
                    map,
                )
                .optional()?,
            None => conn
                .query_row(
                    "SELECT version, content, imported_at FROM templates
                     ORDER BY version DESC LIMIT 1",
                    [],
                    map,
                )
                .optional()?,
        };
        Ok(record)
    }

    fn templates(&self) -> BridgeResult<Vec<TemplateInfo>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT version, imported_at, size_bytes FROM templates ORDER BY version DESC",
        )?;
        let templates = stmt
            .query_map([], |row| {
                Ok(TemplateInfo {
                    version: row.get(0)?,
                    imported_at: row.get(1)?,
                    size_bytes: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(templates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store_with_question() -> (SqliteStore, i64, i64) {
        let store = SqliteStore::open_in_memory().unwrap();
        let sheet_id = store
            .create_sheet(&NewSheet {
                name: "2 - Qualification".to_string(),
                display_name: "2 - Qualification".to_string(),
                order_index: 2,
                description: None,
            })
            .unwrap();
        let question_id = store
            .create_question(&NewQuestion {
                sheet_id,
                row_number: 5,
                cell_column: "C".to_string(),
                title: Some("Personal data".to_string()),
                question_type: QuestionType::Select,
                ..Default::default()
            })
            .unwrap();
        (store, sheet_id, question_id)
    }

    #[test]
    fn test_upsert_inserts_then_updates_same_row() {
        let (store, _, question_id) = store_with_question();

        let first = store
            .upsert_response(
                question_id,
                &ResponseInput {
                    response_text: Some("Yes".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        let second = store
            .upsert_response(
                question_id,
                &ResponseInput {
                    response_text: Some("No".to_string()),
                    response_value: Some("0".to_string()),
                    user_id: Some(7),
                },
            )
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.response_text.as_deref(), Some("No"));
        assert_eq!(second.user_id, Some(7));

        let conn = store.conn();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM responses", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_duplicate_cell_in_sheet_rejected() {
        let (store, sheet_id, _) = store_with_question();
        let dup = store.create_question(&NewQuestion {
            sheet_id,
            row_number: 5,
            cell_column: "C".to_string(),
            ..Default::default()
        });
        assert!(matches!(dup, Err(BridgeError::Store(_))));
    }

    #[test]
    fn test_question_roundtrip_with_response() {
        let (store, _, question_id) = store_with_question();
        assert!(store.question(question_id).unwrap().unwrap().response.is_none());

        store.create_response(question_id, "Seeded").unwrap();
        let q = store.question(question_id).unwrap().unwrap();

        assert_eq!(q.question.title.as_deref(), Some("Personal data"));
        assert_eq!(q.question.question_type, QuestionType::Select);
        assert_eq!(
            q.response.unwrap().response_text.as_deref(),
            Some("Seeded")
        );
    }

    #[test]
    fn test_search_filters_questions() {
        let (store, sheet_id, _) = store_with_question();
        store
            .create_question(&NewQuestion {
                sheet_id,
                row_number: 6,
                cell_column: "C".to_string(),
                title: Some("Payment data".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(store.questions(sheet_id, None).unwrap().len(), 2);
        assert_eq!(store.questions(sheet_id, Some("")).unwrap().len(), 2);
        let hits = store.questions(sheet_id, Some("Payment")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].question.row_number, 6);
    }

    #[test]
    fn test_export_rows_skip_empty_text() {
        let (store, _, question_id) = store_with_question();
        store
            .upsert_response(
                question_id,
                &ResponseInput {
                    response_text: Some(String::new()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(store.export_rows().unwrap().is_empty());

        store
            .upsert_response(
                question_id,
                &ResponseInput {
                    response_text: Some("Yes".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        let rows = store.export_rows().unwrap();
        assert_eq!(
            rows,
            vec![ExportRow {
                sheet_name: "2 - Qualification".to_string(),
                row_number: 5,
                cell_column: "C".to_string(),
                response_text: "Yes".to_string(),
            }]
        );
    }

    #[test]
    fn test_export_rows_use_the_same_response_as_reads() {
        let (store, _, question_id) = store_with_question();
        store.create_response(question_id, "Oldest").unwrap();
        store.create_response(question_id, "Newer duplicate").unwrap();

        let shown = store.question(question_id).unwrap().unwrap();
        assert_eq!(
            shown.response.unwrap().response_text.as_deref(),
            Some("Oldest")
        );

        let rows = store.export_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].response_text, "Oldest");
    }

    #[test]
    fn test_clear_all_empties_tables() {
        let (store, _, question_id) = store_with_question();
        store.create_response(question_id, "x").unwrap();

        let removed = store.clear_all().unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.counts().unwrap(), (0, 0));
        assert!(store.export_rows().unwrap().is_empty());
    }

    #[test]
    fn test_template_versions() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.template(None).unwrap().is_none());

        let v1 = store.save_template(b"first").unwrap();
        let v2 = store.save_template(b"second!").unwrap();
        assert!(v2.version > v1.version);

        let latest = store.template(None).unwrap().unwrap();
        assert_eq!(latest.version, v2.version);
        assert_eq!(latest.content, b"second!".to_vec());

        let old = store.template(Some(v1.version)).unwrap().unwrap();
        assert_eq!(old.content, b"first".to_vec());
        assert!(store.template(Some(999)).unwrap().is_none());

        let listed = store.templates().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].version, v2.version);
        assert_eq!(listed[0].size_bytes, 7);
    }

    #[test]
    fn test_prune_keeps_newest_versions() {
        let store = SqliteStore::open_in_memory().unwrap();
        let versions: Vec<i64> = (0..5)
            .map(|i| store.save_template(format!("v{}", i).as_bytes()).unwrap().version)
            .collect();

        assert_eq!(store.prune_templates(2).unwrap(), 3);
        assert_eq!(store.prune_templates(2).unwrap(), 0);

        let kept: Vec<i64> = store.templates().unwrap().iter().map(|t| t.version).collect();
        assert_eq!(kept, vec![versions[4], versions[3]]);
        assert!(store.template(Some(versions[0])).unwrap().is_none());

        // pruned numbers are not handed out again
        let next = store.save_template(b"v5").unwrap();
        assert!(next.version > versions[4]);
    }
}
