//! Document storage.
//!
//! Adapters store the serialized JSON form and normalize on load, so a
//! document written by an older (or newer) engine is read the same way as
//! any other untrusted input. Saves are rejected unless the caller's lock
//! token is still valid according to the shared [`LockService`].

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::document::CanvasDocument;
use crate::error::PersistenceError;
use crate::lock::{LockService, LockToken};

#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    async fn load(&self, doc_id: &str) -> Result<CanvasDocument, PersistenceError>;

    /// Store `document`. Fails with [`PersistenceError::LockConflict`] when
    /// `token` no longer grants write access to `doc_id`.
    async fn save(
        &self,
        doc_id: &str,
        document: &CanvasDocument,
        token: &LockToken,
    ) -> Result<(), PersistenceError>;
}

/// Sanity checks a document must pass before it is written.
pub fn validate_document(document: &CanvasDocument) -> Result<(), PersistenceError> {
    let mut ids = HashSet::new();
    for el in &document.elements {
        if !ids.insert(el.id.as_str()) {
            return Err(PersistenceError::Validation(format!(
                "duplicate element id {}",
                el.id
            )));
        }
        if !el.x.is_finite() || !el.y.is_finite() {
            return Err(PersistenceError::Validation(format!(
                "element {} has a non-finite position",
                el.id
            )));
        }
    }
    let settings = &document.settings;
    if !(settings.width.is_finite() && settings.width > 0.0)
        || !(settings.height.is_finite() && settings.height > 0.0)
    {
        return Err(PersistenceError::Validation(
            "canvas dimensions must be positive".to_string(),
        ));
    }
    Ok(())
}

async fn authorize(
    locks: &dyn LockService,
    doc_id: &str,
    token: &LockToken,
) -> Result<(), PersistenceError> {
    if token.doc_id != doc_id {
        return Err(PersistenceError::LockConflict(doc_id.to_string()));
    }
    locks.verify(token).await.map_err(|e| {
        warn!(doc_id, holder = %token.holder, error = %e, "save rejected");
        PersistenceError::LockConflict(doc_id.to_string())
    })
}

fn encode(document: &CanvasDocument) -> Result<String, PersistenceError> {
    document
        .to_json_pretty()
        .map_err(|e| PersistenceError::Validation(e.to_string()))
}

fn decode(doc_id: &str, json: &str) -> Result<CanvasDocument, PersistenceError> {
    CanvasDocument::from_json(json)
        .map_err(|e| PersistenceError::Validation(format!("{}: {}", doc_id, e)))
}

// ============================================================================
// IN-MEMORY
// ============================================================================

/// Process-local store keyed by document id.
#[derive(Clone)]
pub struct MemoryPersistence {
    documents: Arc<RwLock<HashMap<String, String>>>,
    locks: Arc<dyn LockService>,
}

impl MemoryPersistence {
    pub fn new(locks: Arc<dyn LockService>) -> Self {
        Self {
            documents: Arc::new(RwLock::new(HashMap::new())),
            locks,
        }
    }

    /// Seed a document from raw JSON, bypassing lock checks.
    pub async fn insert_raw(&self, doc_id: impl Into<String>, json: impl Into<String>) {
        self.documents.write().await.insert(doc_id.into(), json.into());
    }

    /// Stored JSON for `doc_id`, as last written.
    pub async fn raw(&self, doc_id: &str) -> Option<String> {
        self.documents.read().await.get(doc_id).cloned()
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryPersistence {
    async fn load(&self, doc_id: &str) -> Result<CanvasDocument, PersistenceError> {
        let documents = self.documents.read().await;
        let json = documents
            .get(doc_id)
            .ok_or_else(|| PersistenceError::NotFound(doc_id.to_string()))?;
        decode(doc_id, json)
    }

    async fn save(
        &self,
        doc_id: &str,
        document: &CanvasDocument,
        token: &LockToken,
    ) -> Result<(), PersistenceError> {
        authorize(self.locks.as_ref(), doc_id, token).await?;
        validate_document(document)?;
        let json = encode(document)?;
        self.documents.write().await.insert(doc_id.to_string(), json);
        debug!(doc_id, "document saved");
        Ok(())
    }
}

// ============================================================================
// FILESYSTEM
// ============================================================================

/// One JSON file per document under a root directory.
#[derive(Clone)]
pub struct FilePersistence {
    root: PathBuf,
    locks: Arc<dyn LockService>,
}

impl FilePersistence {
    pub fn new(root: impl Into<PathBuf>, locks: Arc<dyn LockService>) -> Self {
        Self {
            root: root.into(),
            locks,
        }
    }

    fn path_for(&self, doc_id: &str) -> Result<PathBuf, PersistenceError> {
        let valid = !doc_id.is_empty()
            && doc_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !doc_id.starts_with('.');
        if !valid {
            return Err(PersistenceError::Validation(format!(
                "invalid document id {:?}",
                doc_id
            )));
        }
        Ok(self.root.join(format!("{}.json", doc_id)))
    }
}

#[async_trait]
impl PersistenceAdapter for FilePersistence {
    async fn load(&self, doc_id: &str) -> Result<CanvasDocument, PersistenceError> {
        let path = self.path_for(doc_id)?;
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PersistenceError::NotFound(doc_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        decode(doc_id, &json)
    }

    async fn save(
        &self,
        doc_id: &str,
        document: &CanvasDocument,
        token: &LockToken,
    ) -> Result<(), PersistenceError> {
        let path = self.path_for(doc_id)?;
        authorize(self.locks.as_ref(), doc_id, token).await?;
        validate_document(document)?;
        let json = encode(document)?;

        tokio::fs::create_dir_all(&self.root).await?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(doc_id, path = %path.display(), "document saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::LocalLockService;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn ttl() -> Duration {
        Duration::minutes(5)
    }

    #[tokio::test]
    async fn test_memory_load_normalizes() {
        let store = MemoryPersistence::new(Arc::new(LocalLockService::default()));
        store
            .insert_raw("doc", r#"{"elements": [{"id": "a", "x": "5"}, {"id": "a"}]}"#)
            .await;
        let doc = store.load("doc").await.unwrap();
        assert_eq!(doc.elements[0].x, 5.0);
        assert_eq!(doc.elements[1].id, "a-1");
    }

    #[tokio::test]
    async fn test_memory_missing_document() {
        let store = MemoryPersistence::new(Arc::new(LocalLockService::default()));
        assert!(matches!(
            store.load("nope").await,
            Err(PersistenceError::NotFound(id)) if id == "nope"
        ));
    }

    #[tokio::test]
    async fn test_save_requires_valid_token() {
        let locks = Arc::new(LocalLockService::default());
        let store = MemoryPersistence::new(locks.clone());
        let token = locks.acquire("doc", "alice", ttl()).await.unwrap();

        store.save("doc", &CanvasDocument::new(), &token).await.unwrap();
        assert!(store.raw("doc").await.unwrap().contains("\"version\": 1"));

        // token for a different document
        assert!(matches!(
            store.save("other", &CanvasDocument::new(), &token).await,
            Err(PersistenceError::LockConflict(_))
        ));

        locks.release(&token).await;
        assert!(matches!(
            store.save("doc", &CanvasDocument::new(), &token).await,
            Err(PersistenceError::LockConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_validation_rejects_duplicate_ids() {
        let locks = Arc::new(LocalLockService::default());
        let store = MemoryPersistence::new(locks.clone());
        let token = locks.acquire("doc", "alice", ttl()).await.unwrap();

        let mut doc = CanvasDocument::new();
        let el = crate::document::Element::editor_default(crate::document::ElementType::Text, "x");
        doc.elements = vec![el.clone(), el];
        assert!(matches!(
            store.save("doc", &doc, &token).await,
            Err(PersistenceError::Validation(_))
        ));
        assert_eq!(store.raw("doc").await, None);
    }

    #[tokio::test]
    async fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let locks = Arc::new(LocalLockService::default());
        let store = FilePersistence::new(dir.path().join("docs"), locks.clone());
        let token = locks.acquire("show-1", "alice", ttl()).await.unwrap();

        let doc = CanvasDocument::from_json(r#"{"elements": [{"id": "t", "content": "Hi"}]}"#).unwrap();
        store.save("show-1", &doc, &token).await.unwrap();
        assert_eq!(store.load("show-1").await.unwrap(), doc);

        assert!(matches!(
            store.load("missing").await,
            Err(PersistenceError::NotFound(_))
        ));
        assert!(matches!(
            store.load("../etc/passwd").await,
            Err(PersistenceError::Validation(_))
        ));
    }
}
