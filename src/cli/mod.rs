//! CLI command handlers

pub mod commands;

pub use commands::{export, import, mapping, questions, respond, sheets, templates};
