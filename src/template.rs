//! Template store
//!
//! Every import saves a new template version in the relational store,
//! overwrites the file mirror, and caches the stored bytes. A plain xlsx
//! upload is kept byte for byte so its layout survives every export; other
//! formats are stored as their xlsx re-serialization. Export asks for a
//! version (latest by default) and patches a copy; the stored bytes are
//! never changed.

use crate::config::DEFAULT_TEMPLATE_RETENTION;
use crate::error::{BridgeError, BridgeResult};
use crate::excel::{write_workbook, Workbook, XlsxPackage};
use crate::store::QuestionnaireStore;
use crate::types::TemplateInfo;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

struct CachedTemplate {
    version: i64,
    bytes: Arc<[u8]>,
}

pub struct TemplateStore {
    mirror_path: Option<PathBuf>,
    retention: usize,
    cache: Mutex<Option<CachedTemplate>>,
}

impl TemplateStore {
    /// Templates are also written to `mirror_path` on every import
    pub fn new(mirror_path: impl Into<PathBuf>) -> Self {
        Self {
            mirror_path: Some(mirror_path.into()),
            retention: DEFAULT_TEMPLATE_RETENTION,
            cache: Mutex::new(None),
        }
    }

    /// No file mirror; the relational store is the only durable copy
    pub fn without_mirror() -> Self {
        Self {
            mirror_path: None,
            retention: DEFAULT_TEMPLATE_RETENTION,
            cache: Mutex::new(None),
        }
    }

    /// Keep the newest `keep` versions (at least one) after each save
    pub fn with_retention(mut self, keep: usize) -> Self {
        self.retention = keep.max(1);
        self
    }

    pub fn mirror_path(&self) -> Option<&Path> {
        self.mirror_path.as_deref()
    }

    /// Persist a new live template. `source` is the uploaded file; when it
    /// is not a plain xlsx package, `workbook` is serialized instead.
    pub fn save(
        &self,
        store: &dyn QuestionnaireStore,
        source: &[u8],
        workbook: &Workbook,
    ) -> BridgeResult<TemplateInfo> {
        let bytes = if XlsxPackage::is_plain_xlsx(source) {
            source.to_vec()
        } else {
            debug!("source is not a plain xlsx package, storing a re-serialized copy");
            write_workbook(workbook)?
        };
        let info = store.save_template(&bytes)?;

        let pruned = store.prune_templates(self.retention)?;
        if pruned > 0 {
            debug!(pruned, keep = self.retention, "old template versions pruned");
        }

        if let Some(path) = &self.mirror_path {
            write_mirror(path, &bytes)?;
            debug!(path = %path.display(), "template mirror updated");
        }

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        *cache = Some(CachedTemplate {
            version: info.version,
            bytes: Arc::from(bytes),
        });

        info!(
            version = info.version,
            bytes = info.size_bytes,
            "template saved"
        );
        Ok(info)
    }

    /// Stored bytes of a template version (latest when `None`).
    pub fn load(
        &self,
        store: &dyn QuestionnaireStore,
        version: Option<i64>,
    ) -> BridgeResult<(i64, Arc<[u8]>)> {
        let version = match version {
            Some(v) => v,
            None => store
                .templates()?
                .first()
                .map(|latest| latest.version)
                .ok_or_else(|| {
                    BridgeError::TemplateMissing(
                        "import a questionnaire before exporting".to_string(),
                    )
                })?,
        };

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.as_ref() {
            if cached.version == version {
                return Ok((version, Arc::clone(&cached.bytes)));
            }
        }

        let record = store.template(Some(version))?.ok_or_else(|| {
            BridgeError::TemplateMissing(format!("template version {} not found", version))
        })?;
        let bytes: Arc<[u8]> = Arc::from(record.content);
        *cache = Some(CachedTemplate {
            version,
            bytes: Arc::clone(&bytes),
        });
        Ok((version, bytes))
    }
}

fn write_mirror(path: &Path, bytes: &[u8]) -> BridgeResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    // Write beside the target, then swap in
    let tmp = path.with_extension("xlsx.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
