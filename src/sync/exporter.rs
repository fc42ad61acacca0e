//! Questionnaire exporter - stored answers → copy of the template

use crate::address::CellAddress;
use crate::error::BridgeResult;
use crate::excel::{apply_patches, CellPatches};
use crate::store::QuestionnaireStore;
use crate::template::TemplateStore;
use crate::types::{export_filename, ExportOutput, ExportRow};
use tracing::{info, warn};

/// Turn answers into cell patches. Rows whose stored cell reference does
/// not parse are left out and counted. Returns (patches, invalid).
pub fn collect_answers(rows: &[ExportRow]) -> (CellPatches, usize) {
    let mut patches = CellPatches::new();
    let mut invalid = 0;

    for row in rows {
        match CellAddress::from_parts(&row.cell_column, row.row_number) {
            Ok(address) => patches.set(&row.sheet_name, address, row.response_text.as_str()),
            Err(e) => {
                warn!(sheet = %row.sheet_name, row = row.row_number, error = %e, "invalid answer cell");
                invalid += 1;
            }
        }
    }

    (patches, invalid)
}

/// Produces a completed copy of a stored template
pub struct QuestionnaireExporter<'a> {
    store: &'a dyn QuestionnaireStore,
    templates: &'a TemplateStore,
}

impl<'a> QuestionnaireExporter<'a> {
    pub fn new(store: &'a dyn QuestionnaireStore, templates: &'a TemplateStore) -> Self {
        Self { store, templates }
    }

    /// Export against `version`, or the latest template when `None`.
    /// The stored template is never modified.
    pub fn export(&self, version: Option<i64>) -> BridgeResult<ExportOutput> {
        let (template_version, template) = self.templates.load(self.store, version)?;
        let rows = self.store.export_rows()?;

        let (patches, invalid) = collect_answers(&rows);
        let outcome = apply_patches(&template, &patches)?;
        let cells_written = outcome.written;
        let cells_skipped = outcome.skipped + invalid;

        info!(
            template_version,
            written = cells_written,
            skipped = cells_skipped,
            "questionnaire exported"
        );

        Ok(ExportOutput {
            bytes: outcome.bytes,
            filename: export_filename(chrono::Local::now().date_naive()),
            template_version,
            cells_written,
            cells_skipped,
        })
    }
}
