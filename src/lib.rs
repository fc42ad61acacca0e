//! Questionnaire Bridge - round-trip spreadsheet questionnaires through a database
//!
//! A vendor security questionnaire arrives as a multi-tab workbook. This
//! library imports it into a relational store (one question per answerable
//! cell), lets answers be edited, and writes them back into a copy of the
//! original workbook at the exact cells they came from.
//!
//! # Features
//!
//! - Data-driven sheet mapping: fixed cells or row ranges, YAML overridable
//! - Versioned templates, mirrored to disk and cached in memory
//! - Destructive, idempotent re-import
//! - SQLite storage behind the [`store::QuestionnaireStore`] trait
//! - CLI (`qbridge`) and HTTP API (`qbridge-server`)
//!
//! # Example
//!
//! ```no_run
//! use questionnaire_bridge::service::Questionnaire;
//! use questionnaire_bridge::types::ResponseInput;
//! use std::path::Path;
//!
//! let questionnaire = Questionnaire::in_memory()?;
//! let summary = questionnaire.import(Path::new("questionnaire.xlsx"))?;
//! println!("Questions: {}", summary.question_count);
//!
//! let sheets = questionnaire.sheets()?;
//! let questions = questionnaire.questions(sheets[0].id, None)?;
//! questionnaire.save_response(
//!     questions[0].question.id,
//!     &ResponseInput { response_text: Some("Yes".into()), ..Default::default() },
//! )?;
//!
//! let output = questionnaire.export(None)?;
//! std::fs::write(&output.filename, &output.bytes)?;
//! # Ok::<(), questionnaire_bridge::error::BridgeError>(())
//! ```

pub mod address;
pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod excel;
pub mod mapping;
pub mod service;
pub mod store;
pub mod sync;
pub mod template;
pub mod types;

// Re-export commonly used types
pub use error::{BridgeError, BridgeResult};
pub use mapping::MappingRegistry;
pub use service::Questionnaire;
pub use types::{ExportOutput, ImportSummary, Question, Response, ResponseInput, Sheet};
