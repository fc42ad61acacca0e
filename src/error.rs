use thiserror::Error;

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Storage error: {0}")]
    Store(#[from] rusqlite::Error),

    /// The input could not be parsed as a spreadsheet. Raised before any
    /// stored data is touched.
    #[error("Unreadable document: {0}")]
    UnreadableDocument(String),

    /// Export was requested but no template has been imported (or the
    /// requested version does not exist).
    #[error("No template available: {0}")]
    TemplateMissing(String),

    /// A write failed after the destructive clear. Whatever was created
    /// before the failure stays in the store; re-run the import.
    #[error(
        "Import failed after clearing existing data ({sheets_created} sheets, {questions_created} questions created): {source}"
    )]
    PartialImport {
        sheets_created: usize,
        questions_created: usize,
        #[source]
        source: Box<BridgeError>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid sheet mapping: {0}")]
    Mapping(String),

    #[error("Spreadsheet codec error: {0}")]
    Codec(String),
}

impl From<rust_xlsxwriter::XlsxError> for BridgeError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        BridgeError::Codec(err.to_string())
    }
}

impl From<zip::result::ZipError> for BridgeError {
    fn from(err: zip::result::ZipError) -> Self {
        BridgeError::Codec(format!("xlsx package: {}", err))
    }
}

impl From<quick_xml::Error> for BridgeError {
    fn from(err: quick_xml::Error) -> Self {
        BridgeError::Codec(format!("xlsx part XML: {}", err))
    }
}

impl From<quick_xml::events::attributes::AttrError> for BridgeError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        BridgeError::Codec(format!("xlsx part XML: {}", err))
    }
}
