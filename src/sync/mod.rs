//! Import and export pipelines between spreadsheet files and the store

pub mod exporter;
pub mod importer;

pub use exporter::{collect_answers, QuestionnaireExporter};
pub use importer::{extract, ExtractedQuestion, QuestionnaireImporter};
