//! The questionnaire service
//!
//! [`Questionnaire`] owns the store, the sheet mapping and the template
//! store, and is the only entry point the CLI and the API use. Imports are
//! exclusive: an import waits for in-flight exports and answer saves, and
//! those wait for a running import, so nobody observes a half-cleared store.

use crate::config::StorageConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::mapping::MappingRegistry;
use crate::store::{QuestionnaireStore, SqliteStore};
use crate::sync::{QuestionnaireExporter, QuestionnaireImporter};
use crate::template::TemplateStore;
use crate::types::{
    ExportOutput, ImportSummary, QuestionWithResponse, Response, ResponseInput, Sheet,
    TemplateInfo,
};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

pub struct Questionnaire {
    store: Arc<dyn QuestionnaireStore>,
    registry: MappingRegistry,
    templates: TemplateStore,
    gate: RwLock<()>,
}

impl Questionnaire {
    pub fn new(
        store: Arc<dyn QuestionnaireStore>,
        registry: MappingRegistry,
        templates: TemplateStore,
    ) -> Self {
        Self {
            store,
            registry,
            templates,
            gate: RwLock::new(()),
        }
    }

    /// Open the SQLite store and mapping described by `config`
    pub fn open(config: &StorageConfig) -> BridgeResult<Self> {
        let registry = config.load_registry()?;
        let store = SqliteStore::open_path(&config.database_path)?;
        info!(
            database = %config.database_path.display(),
            sheets = registry.len(),
            "questionnaire store opened"
        );
        Ok(Self::new(
            Arc::new(store),
            registry,
            TemplateStore::new(config.template_mirror_path())
                .with_retention(config.template_retention),
        ))
    }

    /// In-memory store with the built-in mapping and no template mirror
    pub fn in_memory() -> BridgeResult<Self> {
        Ok(Self::new(
            Arc::new(SqliteStore::open_in_memory()?),
            MappingRegistry::builtin(),
            TemplateStore::without_mirror(),
        ))
    }

    pub fn registry(&self) -> &MappingRegistry {
        &self.registry
    }

    pub fn store(&self) -> &dyn QuestionnaireStore {
        self.store.as_ref()
    }

    fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the stored questionnaire with the spreadsheet at `path`
    pub fn import(&self, path: &Path) -> BridgeResult<ImportSummary> {
        let _guard = self.exclusive();
        QuestionnaireImporter::new(self.store(), &self.registry, &self.templates).import(path)
    }

    /// Completed copy of template `version` (latest when `None`)
    pub fn export(&self, version: Option<i64>) -> BridgeResult<ExportOutput> {
        let _guard = self.shared();
        QuestionnaireExporter::new(self.store(), &self.templates).export(version)
    }

    pub fn save_response(&self, question_id: i64, input: &ResponseInput) -> BridgeResult<Response> {
        let _guard = self.shared();
        if self.store.question(question_id)?.is_none() {
            return Err(BridgeError::NotFound(format!("question {}", question_id)));
        }
        let response = self.store.upsert_response(question_id, input)?;
        debug!(question_id, response_id = response.id, "response saved");
        Ok(response)
    }

    pub fn sheets(&self) -> BridgeResult<Vec<Sheet>> {
        self.store.sheets()
    }

    pub fn questions(
        &self,
        sheet_id: i64,
        search: Option<&str>,
    ) -> BridgeResult<Vec<QuestionWithResponse>> {
        if self.store.sheet(sheet_id)?.is_none() {
            return Err(BridgeError::NotFound(format!("sheet {}", sheet_id)));
        }
        self.store.questions(sheet_id, search)
    }

    pub fn question(&self, question_id: i64) -> BridgeResult<QuestionWithResponse> {
        self.store
            .question(question_id)?
            .ok_or_else(|| BridgeError::NotFound(format!("question {}", question_id)))
    }

    /// (sheet count, question count)
    pub fn counts(&self) -> BridgeResult<(usize, usize)> {
        self.store.counts()
    }

    pub fn templates(&self) -> BridgeResult<Vec<TemplateInfo>> {
        self.store.templates()
    }
}
