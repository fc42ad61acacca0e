//! Sheet mapping registry
//!
//! Each known tab is described by data: either a list of fixed cells or a
//! row range with a column→field mapping. One interpreter (the importer)
//! consumes both shapes, so a new layout is a registry entry, not new code.
//!
//! The built-in registry covers the five tabs of the security questionnaire.
//! An alternate registry can be loaded from YAML:
//!
//! ```yaml
//! sheets:
//!   - name: "2 - Qualification"
//!     description: Data mapping and security requirements qualification
//!     rule:
//!       kind: row_range
//!       start_row: 5
//!       end_row: 14
//!       response_column: C
//!       question_type: select
//!       fields:
//!         - { field: title, column: B }
//!       skip_when_blank: [B]
//! ```

use crate::address::Column;
use crate::error::{BridgeError, BridgeResult};
use crate::types::QuestionType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Question record field a row-range column feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionField {
    QuestionId,
    Chapter,
    Title,
    Description,
    QuestionText,
    QuestionTextFr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBinding {
    pub field: QuestionField,
    pub column: Column,
}

/// A single answer cell at a known position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedCell {
    pub row: u32,
    pub column: Column,
    pub label: String,
    #[serde(default)]
    pub question_type: QuestionType,
}

/// Generated title `"<prefix><row - base_row>"`, e.g. `Risk R1` for row 4
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowLabel {
    pub prefix: String,
    pub base_row: u32,
}

impl RowLabel {
    pub fn render(&self, row: u32) -> String {
        format!("{}{}", self.prefix, row as i64 - self.base_row as i64)
    }
}

/// A contiguous block of question rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRange {
    pub start_row: u32,
    /// Inclusive upper bound of the scan
    pub end_row: u32,
    /// Column that receives the answer on export
    pub response_column: Column,
    #[serde(default)]
    pub question_type: QuestionType,
    #[serde(default)]
    pub fields: Vec<FieldBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_label: Option<RowLabel>,
    /// The row is skipped when every one of these columns is blank
    #[serde(default)]
    pub skip_when_blank: Vec<Column>,
}

impl RowRange {
    pub fn rows(&self) -> std::ops::RangeInclusive<u32> {
        self.start_row..=self.end_row
    }
}

/// Extraction strategy for one tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionRule {
    FixedCells { cells: Vec<FixedCell> },
    RowRange(RowRange),
}

impl ExtractionRule {
    /// Every (row, column) the rule can create a question for
    fn targets(&self) -> Vec<(u32, Column)> {
        match self {
            ExtractionRule::FixedCells { cells } => {
                cells.iter().map(|c| (c.row, c.column)).collect()
            }
            ExtractionRule::RowRange(range) => range
                .rows()
                .map(|row| (row, range.response_column))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetMapping {
    /// Exact tab name, case-sensitive, whitespace preserved
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub rule: ExtractionRule,
}

/// Ordered set of sheet mappings; position gives the sheet's `order_index`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRegistry {
    pub sheets: Vec<SheetMapping>,
}

impl MappingRegistry {
    pub fn new(sheets: Vec<SheetMapping>) -> BridgeResult<Self> {
        let registry = Self { sheets };
        registry.validate()?;
        Ok(registry)
    }

    pub fn lookup(&self, sheet_name: &str) -> Option<&SheetMapping> {
        self.sheets.iter().find(|m| m.name == sheet_name)
    }

    /// Mappings with their 1-based order index
    pub fn ordered(&self) -> impl Iterator<Item = (i64, &SheetMapping)> {
        self.sheets
            .iter()
            .enumerate()
            .map(|(idx, mapping)| (idx as i64 + 1, mapping))
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    pub fn validate(&self) -> BridgeResult<()> {
        let mut names = HashSet::new();
        for mapping in &self.sheets {
            if mapping.name.is_empty() {
                return Err(BridgeError::Mapping("sheet name must not be empty".to_string()));
            }
            if !names.insert(mapping.name.as_str()) {
                return Err(BridgeError::Mapping(format!(
                    "duplicate sheet mapping '{}'",
                    mapping.name
                )));
            }

            match &mapping.rule {
                ExtractionRule::FixedCells { cells } => {
                    if let Some(cell) = cells.iter().find(|c| c.row == 0) {
                        return Err(BridgeError::Mapping(format!(
                            "'{}': fixed cell '{}' has row 0",
                            mapping.name, cell.label
                        )));
                    }
                }
                ExtractionRule::RowRange(range) => {
                    if range.start_row == 0 || range.start_row > range.end_row {
                        return Err(BridgeError::Mapping(format!(
                            "'{}': invalid row bounds {}..={}",
                            mapping.name, range.start_row, range.end_row
                        )));
                    }
                }
            }

            let mut seen = HashSet::new();
            for (row, column) in mapping.rule.targets() {
                if !seen.insert((row, column)) {
                    return Err(BridgeError::Mapping(format!(
                        "'{}': cell {}{} is mapped twice",
                        mapping.name, column, row
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> BridgeResult<Self> {
        let registry: MappingRegistry = serde_yaml::from_str(yaml)?;
        registry.validate()?;
        Ok(registry)
    }

    pub fn from_yaml_file(path: &Path) -> BridgeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml(&self) -> BridgeResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// The security questionnaire layout
    pub fn builtin() -> Self {
        Self {
            sheets: vec![
                general_description(),
                qualification(),
                security_policy(),
                assessment(),
                risk_assessment(),
            ],
        }
    }
}

impl Default for MappingRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

pub const GENERAL_DESCRIPTION: &str = "1 - General description";
pub const QUALIFICATION: &str = "2 - Qualification";
pub const SECURITY_POLICY: &str = "3 - 3rd Party Security Policy";
/// Note the trailing space: it is part of the tab name in the template
pub const ASSESSMENT: &str = "4 - 3rd Party Assessment ";
pub const RISK_ASSESSMENT: &str = "5 - Risk Assessment";

const A: Column = Column::known(1);
const B: Column = Column::known(2);
const C: Column = Column::known(3);
const D: Column = Column::known(4);
const E: Column = Column::known(5);
const I: Column = Column::known(9);
const J: Column = Column::known(10);

fn general_description() -> SheetMapping {
    let cell = |row: u32, column: Column, label: &str| FixedCell {
        row,
        column,
        label: label.to_string(),
        question_type: QuestionType::Text,
    };

    SheetMapping {
        name: GENERAL_DESCRIPTION.to_string(),
        description: Some("General descriptive information about the IT project".to_string()),
        rule: ExtractionRule::FixedCells {
            cells: vec![
                cell(3, C, "Project Title"),
                cell(4, C, "Objectives"),
                cell(5, C, "Main Functions"),
                cell(6, C, "Business Domain"),
                cell(7, C, "Department"),
                cell(8, C, "Scope"),
                cell(8, J, "IT Project Manager"),
                cell(9, C, "Operational points"),
                cell(10, C, "Hosting"),
                cell(11, C, "Exposure"),
                cell(14, C, "API"),
            ],
        },
    }
}

fn qualification() -> SheetMapping {
    SheetMapping {
        name: QUALIFICATION.to_string(),
        description: Some("Data mapping and security requirements qualification".to_string()),
        rule: ExtractionRule::RowRange(RowRange {
            start_row: 5,
            end_row: 14,
            response_column: C,
            question_type: QuestionType::Select,
            fields: vec![FieldBinding {
                field: QuestionField::Title,
                column: B,
            }],
            title_label: None,
            skip_when_blank: vec![B],
        }),
    }
}

fn security_policy() -> SheetMapping {
    SheetMapping {
        name: SECURITY_POLICY.to_string(),
        description: Some("Third party security policy requirements".to_string()),
        rule: ExtractionRule::RowRange(RowRange {
            start_row: 3,
            end_row: 100,
            response_column: I,
            question_type: QuestionType::Compliance,
            fields: vec![
                FieldBinding {
                    field: QuestionField::Chapter,
                    column: A,
                },
                FieldBinding {
                    field: QuestionField::QuestionId,
                    column: C,
                },
                FieldBinding {
                    field: QuestionField::Title,
                    column: D,
                },
                FieldBinding {
                    field: QuestionField::Description,
                    column: E,
                },
            ],
            title_label: None,
            skip_when_blank: vec![D, E],
        }),
    }
}

fn assessment() -> SheetMapping {
    SheetMapping {
        name: ASSESSMENT.to_string(),
        description: Some("Organizational and technical security assessment".to_string()),
        rule: ExtractionRule::RowRange(RowRange {
            start_row: 5,
            end_row: 50,
            response_column: D,
            question_type: QuestionType::Text,
            fields: vec![
                FieldBinding {
                    field: QuestionField::QuestionId,
                    column: B,
                },
                FieldBinding {
                    field: QuestionField::QuestionText,
                    column: C,
                },
                FieldBinding {
                    field: QuestionField::QuestionTextFr,
                    column: D,
                },
            ],
            title_label: None,
            skip_when_blank: vec![C, D],
        }),
    }
}

fn risk_assessment() -> SheetMapping {
    SheetMapping {
        name: RISK_ASSESSMENT.to_string(),
        description: Some("Risk analysis and security controls".to_string()),
        rule: ExtractionRule::RowRange(RowRange {
            start_row: 4,
            end_row: 10,
            response_column: C,
            question_type: QuestionType::Text,
            fields: vec![FieldBinding {
                field: QuestionField::Description,
                column: C,
            }],
            title_label: Some(RowLabel {
                prefix: "Risk R".to_string(),
                base_row: 3,
            }),
            skip_when_blank: vec![C],
        }),
    }
}
