//! Questionnaire importer - spreadsheet → sheets, questions, seeded responses

use crate::address::CellAddress;
use crate::error::{BridgeError, BridgeResult};
use crate::excel::{read_workbook_bytes, Workbook, Worksheet};
use crate::mapping::{ExtractionRule, FixedCell, MappingRegistry, QuestionField, RowRange};
use crate::store::QuestionnaireStore;
use crate::template::TemplateStore;
use crate::types::{ImportSummary, NewQuestion, NewSheet};
use std::path::Path;
use tracing::{debug, info, warn};

/// A question produced by an extraction rule, plus the answer already in
/// the template cell when the rule seeds answers
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedQuestion {
    pub question: NewQuestion,
    pub seed: Option<String>,
}

/// Apply one extraction rule to a worksheet. Rows are visited in ascending
/// order; only fixed-cell rules seed answers.
pub fn extract(
    rule: &ExtractionRule,
    worksheet: &Worksheet,
    sheet_id: i64,
) -> BridgeResult<Vec<ExtractedQuestion>> {
    match rule {
        ExtractionRule::FixedCells { cells } => cells
            .iter()
            .map(|cell| extract_fixed_cell(cell, worksheet, sheet_id))
            .collect(),
        ExtractionRule::RowRange(range) => extract_row_range(range, worksheet, sheet_id),
    }
}

fn extract_fixed_cell(
    cell: &FixedCell,
    worksheet: &Worksheet,
    sheet_id: i64,
) -> BridgeResult<ExtractedQuestion> {
    let address = CellAddress::new(cell.column, cell.row)?;
    Ok(ExtractedQuestion {
        question: NewQuestion {
            sheet_id,
            row_number: cell.row,
            cell_column: cell.column.letters(),
            title: Some(cell.label.clone()),
            question_type: cell.question_type,
            ..Default::default()
        },
        seed: worksheet.value(address).to_text(),
    })
}

fn extract_row_range(
    range: &RowRange,
    worksheet: &Worksheet,
    sheet_id: i64,
) -> BridgeResult<Vec<ExtractedQuestion>> {
    let mut extracted = Vec::new();

    for row in range.rows() {
        let mut blank = true;
        for column in &range.skip_when_blank {
            if !worksheet.value(CellAddress::new(*column, row)?).is_blank() {
                blank = false;
                break;
            }
        }
        if blank && !range.skip_when_blank.is_empty() {
            continue;
        }

        let mut question = NewQuestion {
            sheet_id,
            row_number: row,
            cell_column: range.response_column.letters(),
            question_type: range.question_type,
            ..Default::default()
        };

        for binding in &range.fields {
            let text = worksheet.value(CellAddress::new(binding.column, row)?).to_text();
            let slot = match binding.field {
                QuestionField::QuestionId => &mut question.external_id,
                QuestionField::Chapter => &mut question.chapter,
                QuestionField::Title => &mut question.title,
                QuestionField::Description => &mut question.description,
                QuestionField::QuestionText => &mut question.question_text,
                QuestionField::QuestionTextFr => &mut question.question_text_fr,
            };
            *slot = text;
        }

        if let Some(label) = &range.title_label {
            question.title = Some(label.render(row));
        }

        extracted.push(ExtractedQuestion {
            question,
            seed: None,
        });
    }

    Ok(extracted)
}

/// Replaces the stored questionnaire with the content of a spreadsheet
pub struct QuestionnaireImporter<'a> {
    store: &'a dyn QuestionnaireStore,
    registry: &'a MappingRegistry,
    templates: &'a TemplateStore,
}

impl<'a> QuestionnaireImporter<'a> {
    pub fn new(
        store: &'a dyn QuestionnaireStore,
        registry: &'a MappingRegistry,
        templates: &'a TemplateStore,
    ) -> Self {
        Self {
            store,
            registry,
            templates,
        }
    }

    /// Parse the file at `path` and import it. Nothing is touched when the
    /// file cannot be read or parsed.
    pub fn import(&self, path: &Path) -> BridgeResult<ImportSummary> {
        info!(path = %path.display(), "reading questionnaire");
        let unreadable = |detail: String| {
            BridgeError::UnreadableDocument(format!("{}: {}", path.display(), detail))
        };
        let source = std::fs::read(path).map_err(|e| unreadable(e.to_string()))?;
        let workbook = read_workbook_bytes(&source).map_err(|e| match e {
            BridgeError::UnreadableDocument(detail) => unreadable(detail),
            other => other,
        })?;
        self.import_workbook(&source, &workbook)
    }

    /// Destructive replace: all sheets, questions and responses are deleted
    /// before `workbook` is mapped in again. `source` is the file it was
    /// parsed from and becomes the new template.
    pub fn import_workbook(&self, source: &[u8], workbook: &Workbook) -> BridgeResult<ImportSummary> {
        let removed = self.store.clear_all()?;
        if removed > 0 {
            warn!(
                questions = removed,
                "existing questionnaire and all its responses were deleted"
            );
        }

        let mut summary = ImportSummary {
            ignored_tabs: workbook
                .sheet_names()
                .into_iter()
                .filter(|name| self.registry.lookup(name).is_none())
                .map(str::to_string)
                .collect(),
            ..Default::default()
        };

        if let Err(source) = self.populate(workbook, &mut summary) {
            return Err(partial(&summary, source));
        }

        match self.templates.save(self.store, source, workbook) {
            Ok(template) => summary.template_version = template.version,
            Err(source) => return Err(partial(&summary, source)),
        }

        info!(
            sheets = summary.sheet_count,
            questions = summary.question_count,
            seeded = summary.seeded_responses,
            template_version = summary.template_version,
            "questionnaire import completed"
        );
        Ok(summary)
    }

    fn populate(&self, workbook: &Workbook, summary: &mut ImportSummary) -> BridgeResult<()> {
        for (order_index, mapping) in self.registry.ordered() {
            let Some(worksheet) = workbook.sheet(&mapping.name) else {
                debug!(sheet = %mapping.name, "tab not present, skipped");
                continue;
            };

            let sheet_id = self.store.create_sheet(&NewSheet {
                name: mapping.name.clone(),
                display_name: mapping.name.clone(),
                order_index,
                description: mapping.description.clone(),
            })?;
            summary.sheet_count += 1;

            let extracted = extract(&mapping.rule, worksheet, sheet_id)?;
            debug!(sheet = %mapping.name, questions = extracted.len(), "processing sheet");

            for item in extracted {
                let question_id = self.store.create_question(&item.question)?;
                summary.question_count += 1;

                if let Some(seed) = item.seed {
                    self.store.create_response(question_id, &seed)?;
                    summary.seeded_responses += 1;
                }
            }
        }
        Ok(())
    }
}

fn partial(summary: &ImportSummary, source: BridgeError) -> BridgeError {
    BridgeError::PartialImport {
        sheets_created: summary.sheet_count,
        questions_created: summary.question_count,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excel::{write_workbook, CellValue};
    use crate::mapping::{self, MappingRegistry};
    use crate::store::SqliteStore;
    use crate::types::{
        ExportRow, QuestionType, QuestionWithResponse, Response, ResponseInput, Sheet,
        TemplateInfo, TemplateRecord,
    };
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn text(ws: &mut Worksheet, reference: &str, value: &str) {
        ws.set_value(
            CellAddress::parse(reference).unwrap(),
            CellValue::Text(value.to_string()),
        );
    }

    fn rule(name: &str) -> ExtractionRule {
        MappingRegistry::builtin()
            .lookup(name)
            .unwrap()
            .rule
            .clone()
    }

    #[test]
    fn test_fixed_cells_create_all_questions_and_seed_values() {
        let mut ws = Worksheet::new(mapping::GENERAL_DESCRIPTION);
        text(&mut ws, "C3", "Vendor portal");
        text(&mut ws, "J8", "Jane Doe");
        text(&mut ws, "C4", "   ");

        let extracted = extract(&rule(mapping::GENERAL_DESCRIPTION), &ws, 1).unwrap();

        assert_eq!(extracted.len(), 11);
        let seeded: Vec<(&str, &str)> = extracted
            .iter()
            .filter_map(|e| {
                e.seed
                    .as_deref()
                    .map(|s| (e.question.title.as_deref().unwrap(), s))
            })
            .collect();
        assert_eq!(
            seeded,
            vec![("Project Title", "Vendor portal"), ("IT Project Manager", "Jane Doe")]
        );
        assert!(extracted
            .iter()
            .all(|e| e.question.question_type == QuestionType::Text));
    }

    #[test]
    fn test_fixed_cell_number_seed_is_text() {
        let mut ws = Worksheet::new(mapping::GENERAL_DESCRIPTION);
        ws.set_value(CellAddress::parse("C14").unwrap(), CellValue::Number(3.0));

        let extracted = extract(&rule(mapping::GENERAL_DESCRIPTION), &ws, 1).unwrap();
        let api = extracted.iter().find(|e| e.question.row_number == 14).unwrap();
        assert_eq!(api.seed.as_deref(), Some("3"));
    }

    #[test]
    fn test_row_range_skips_rows_with_blank_title_and_description() {
        let mut ws = Worksheet::new(mapping::SECURITY_POLICY);
        text(&mut ws, "A3", "1. Governance");
        text(&mut ws, "C3", "1.1");
        text(&mut ws, "D3", "Security policy");
        text(&mut ws, "E4", "Only a description");
        // chapter alone does not make a question
        text(&mut ws, "A5", "2. Access");

        let extracted = extract(&rule(mapping::SECURITY_POLICY), &ws, 9).unwrap();

        let rows: Vec<u32> = extracted.iter().map(|e| e.question.row_number).collect();
        assert_eq!(rows, vec![3, 4]);

        let first = &extracted[0].question;
        assert_eq!(first.chapter.as_deref(), Some("1. Governance"));
        assert_eq!(first.external_id.as_deref(), Some("1.1"));
        assert_eq!(first.title.as_deref(), Some("Security policy"));
        assert_eq!(first.description, None);
        assert_eq!(first.cell_column, "I");
        assert_eq!(first.question_type, QuestionType::Compliance);
        assert!(extracted.iter().all(|e| e.seed.is_none()));
    }

    #[test]
    fn test_row_range_respects_bounds() {
        let mut ws = Worksheet::new(mapping::SECURITY_POLICY);
        text(&mut ws, "D2", "Header row");
        text(&mut ws, "D100", "Last row");
        text(&mut ws, "D101", "Past the end");

        let extracted = extract(&rule(mapping::SECURITY_POLICY), &ws, 1).unwrap();
        let rows: Vec<u32> = extracted.iter().map(|e| e.question.row_number).collect();
        assert_eq!(rows, vec![100]);
    }

    #[test]
    fn test_assessment_populates_both_languages() {
        let mut ws = Worksheet::new(mapping::ASSESSMENT);
        text(&mut ws, "B5", "A.1");
        text(&mut ws, "C5", "Do you run background checks?");
        text(&mut ws, "D5", "Effectuez-vous des vérifications ?");
        text(&mut ws, "D6", "Seulement en français");

        let extracted = extract(&rule(mapping::ASSESSMENT), &ws, 1).unwrap();
        assert_eq!(extracted.len(), 2);

        let q = &extracted[0].question;
        assert_eq!(q.external_id.as_deref(), Some("A.1"));
        assert_eq!(q.question_text.as_deref(), Some("Do you run background checks?"));
        assert_eq!(
            q.question_text_fr.as_deref(),
            Some("Effectuez-vous des vérifications ?")
        );
        assert_eq!(q.title, None);
        assert_eq!(q.cell_column, "D");
    }

    #[test]
    fn test_risk_rows_get_generated_titles() {
        let mut ws = Worksheet::new(mapping::RISK_ASSESSMENT);
        text(&mut ws, "C4", "Data leak");
        text(&mut ws, "C7", "Ransomware");

        let extracted = extract(&rule(mapping::RISK_ASSESSMENT), &ws, 1).unwrap();
        let titles: Vec<(&str, &str)> = extracted
            .iter()
            .map(|e| {
                (
                    e.question.title.as_deref().unwrap(),
                    e.question.description.as_deref().unwrap(),
                )
            })
            .collect();
        assert_eq!(titles, vec![("Risk R1", "Data leak"), ("Risk R4", "Ransomware")]);
    }

    #[test]
    fn test_qualification_three_of_ten() {
        let mut ws = Worksheet::new(mapping::QUALIFICATION);
        text(&mut ws, "B5", "Personal data");
        text(&mut ws, "B9", "Health data");
        text(&mut ws, "B14", "Payment data");
        // answer column content alone does not count
        text(&mut ws, "C6", "Yes");

        let extracted = extract(&rule(mapping::QUALIFICATION), &ws, 1).unwrap();
        let rows: Vec<(u32, &str)> = extracted
            .iter()
            .map(|e| (e.question.row_number, e.question.cell_column.as_str()))
            .collect();
        assert_eq!(rows, vec![(5, "C"), (9, "C"), (14, "C")]);
        assert!(extracted
            .iter()
            .all(|e| e.question.question_type == QuestionType::Select));
    }

    #[test]
    fn test_out_of_range_date_seed_does_not_abort() {
        let mut ws = Worksheet::new(mapping::GENERAL_DESCRIPTION);
        ws.set_value(CellAddress::parse("C3").unwrap(), CellValue::DateValue(-1.0e20));

        let extracted = extract(&rule(mapping::GENERAL_DESCRIPTION), &ws, 1).unwrap();
        let title = extracted.iter().find(|e| e.question.row_number == 3).unwrap();
        assert_eq!(title.seed.as_deref(), Some("-100000000000000000000"));
    }

    /// Delegates to SQLite but fails the Nth `create_question`
    struct FailingStore {
        inner: SqliteStore,
        fail_on_question: usize,
        questions: AtomicUsize,
    }

    impl QuestionnaireStore for FailingStore {
        fn clear_all(&self) -> BridgeResult<usize> {
            self.inner.clear_all()
        }
        fn create_sheet(&self, sheet: &NewSheet) -> BridgeResult<i64> {
            self.inner.create_sheet(sheet)
        }
        fn create_question(&self, question: &NewQuestion) -> BridgeResult<i64> {
            let n = self.questions.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.fail_on_question {
                return Err(BridgeError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.inner.create_question(question)
        }
        fn create_response(&self, question_id: i64, response_text: &str) -> BridgeResult<i64> {
            self.inner.create_response(question_id, response_text)
        }
        fn upsert_response(&self, question_id: i64, input: &ResponseInput) -> BridgeResult<Response> {
            self.inner.upsert_response(question_id, input)
        }
        fn sheets(&self) -> BridgeResult<Vec<Sheet>> {
            self.inner.sheets()
        }
        fn sheet(&self, sheet_id: i64) -> BridgeResult<Option<Sheet>> {
            self.inner.sheet(sheet_id)
        }
        fn questions(
            &self,
            sheet_id: i64,
            search: Option<&str>,
        ) -> BridgeResult<Vec<QuestionWithResponse>> {
            self.inner.questions(sheet_id, search)
        }
        fn question(&self, question_id: i64) -> BridgeResult<Option<QuestionWithResponse>> {
            self.inner.question(question_id)
        }
        fn export_rows(&self) -> BridgeResult<Vec<ExportRow>> {
            self.inner.export_rows()
        }
        fn counts(&self) -> BridgeResult<(usize, usize)> {
            self.inner.counts()
        }
        fn save_template(&self, content: &[u8]) -> BridgeResult<TemplateInfo> {
            self.inner.save_template(content)
        }
        fn prune_templates(&self, keep: usize) -> BridgeResult<usize> {
            self.inner.prune_templates(keep)
        }
        fn template(&self, version: Option<i64>) -> BridgeResult<Option<TemplateRecord>> {
            self.inner.template(version)
        }
        fn templates(&self) -> BridgeResult<Vec<TemplateInfo>> {
            self.inner.templates()
        }
    }

    #[test]
    fn test_failure_after_clear_is_partial_import() {
        let store = FailingStore {
            inner: SqliteStore::open_in_memory().unwrap(),
            fail_on_question: 5,
            questions: AtomicUsize::new(0),
        };
        let registry = MappingRegistry::builtin();
        let templates = TemplateStore::without_mirror();

        let mut wb = Workbook::new();
        let mut ws = Worksheet::new(mapping::GENERAL_DESCRIPTION);
        text(&mut ws, "C3", "Vendor portal");
        wb.add_sheet(ws);
        let source = write_workbook(&wb).unwrap();

        let err = QuestionnaireImporter::new(&store, &registry, &templates)
            .import_workbook(&source, &wb)
            .unwrap_err();

        match err {
            BridgeError::PartialImport {
                sheets_created,
                questions_created,
                source,
            } => {
                assert_eq!((sheets_created, questions_created), (1, 4));
                assert!(source.to_string().contains("disk full"));
            }
            other => panic!("expected PartialImport, got {:?}", other),
        }

        // rows written before the failure stay, and no template was saved
        assert_eq!(store.counts().unwrap(), (1, 4));
        let sheets = store.sheets().unwrap();
        let kept = store.questions(sheets[0].id, None).unwrap();
        assert_eq!(kept[0].question.title.as_deref(), Some("Project Title"));
        assert_eq!(
            kept[0].response.as_ref().unwrap().response_text.as_deref(),
            Some("Vendor portal")
        );
        assert!(store.templates().unwrap().is_empty());
    }
}
