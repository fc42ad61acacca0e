use rusqlite::Connection;

pub(crate) fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS sheets (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          name TEXT NOT NULL UNIQUE,
          display_name TEXT NOT NULL,
          order_index INTEGER NOT NULL,
          description TEXT
        );

        CREATE TABLE IF NOT EXISTS questions (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          sheet_id INTEGER NOT NULL REFERENCES sheets(id) ON DELETE CASCADE,
          row_number INTEGER NOT NULL,
          question_id TEXT,
          chapter TEXT,
          title TEXT,
          description TEXT,
          question_text TEXT,
          question_text_fr TEXT,
          cell_column TEXT NOT NULL,
          question_type TEXT NOT NULL DEFAULT 'text'
            CHECK (question_type IN ('text', 'compliance', 'select')),
          required INTEGER NOT NULL DEFAULT 0,
          UNIQUE (sheet_id, row_number, cell_column)
        );

        CREATE INDEX IF NOT EXISTS idx_questions_sheet ON questions(sheet_id, row_number);

        CREATE TABLE IF NOT EXISTS responses (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          question_id INTEGER NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
          response_text TEXT,
          response_value TEXT,
          user_id INTEGER,
          updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_responses_question ON responses(question_id);

        -- Versioned template history; the highest version is the live template.
        CREATE TABLE IF NOT EXISTS templates (
          version INTEGER PRIMARY KEY AUTOINCREMENT,
          content BLOB NOT NULL,
          size_bytes INTEGER NOT NULL,
          imported_at TEXT NOT NULL
        );
        "#,
    )?;

    Ok(())
}
