//! End-to-end editing sessions against file storage and a static provider.

use async_trait::async_trait;
use chrono::Duration;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use easel::clock::ManualClock;
use easel::collab::{FilePersistence, PersistenceAdapter, StaticProvider};
use easel::document::{CanvasDocument, ElementType};
use easel::error::PersistenceError;
use easel::lock::{LocalLockService, LockManager, LockService, LockToken};
use easel::series::Record;
use easel::session::{EditingSession, PreviewStatus, SessionServices};
use easel::{EaselError, EngineConfig};

struct Env {
    _dir: tempfile::TempDir,
    clock: ManualClock,
    services: SessionServices,
}

fn env() -> Env {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::default();
    let locks: Arc<dyn LockService> =
        Arc::new(LocalLockService::new(LockManager::new(Arc::new(clock.clone()))));
    let persistence = FilePersistence::new(dir.path(), locks.clone());
    let provider = StaticProvider::new().with_source(
        "finals",
        vec![
            Record::new("p1", "Ana", 120.0, 2).with_round("r1", 40.0),
            Record::new("p2", "Bo", 150.0, 1).with_round("r1", 35.0),
            Record::new("p3", "Cy", 90.0, 3).with_round("r1", 50.0),
        ],
    );
    let services = SessionServices::new(locks, Arc::new(persistence), Arc::new(provider))
        .with_clock(Arc::new(clock.clone()));
    Env {
        _dir: dir,
        clock,
        services,
    }
}

#[tokio::test]
async fn build_save_and_reopen() {
    let env = env();
    let config = EngineConfig::default();

    let mut session = EditingSession::create(
        "overlay",
        "producer",
        CanvasDocument::new(),
        env.services.clone(),
        config.clone(),
    )
    .await
    .unwrap();

    let store = session.store_mut().unwrap();
    let title = store.add_element(ElementType::Text).touched[0].clone();
    store
        .update_element(&title, &json!({"content": "Round 1", "x": 96, "y": 41}))
        .unwrap();
    let rank = store.add_element(ElementType::PlayerRank).touched[0].clone();
    let series_id = store.document().element(&rank).unwrap().series_id().unwrap().to_string();
    let mut spec = store.document().series(&series_id).unwrap().clone();
    spec.sort_by = easel::document::SortBy::Score;
    spec.sort_order = easel::document::SortOrder::Desc;
    spec.round_id = Some("r1".into());
    store.upsert_series(spec, &[]);
    store.update_preview_config(&json!({"enabled": true, "sourceId": "finals"}));

    assert!(matches!(session.refresh_preview().await, PreviewStatus::Applied(ref f) if f.is_empty()));
    let doc = session.document();
    let ranks: Vec<String> = doc
        .series_elements(&series_id)
        .map(|e| doc.display_text(e))
        .collect();
    // ordered by round score: Cy 50, Ana 40, Bo 35
    assert_eq!(ranks, ["3", "2", "1"]);

    session.save().await.unwrap();
    let saved = session.document().clone();
    session.close().await;

    let reopened = EditingSession::open("overlay", "director", env.services.clone(), config)
        .await
        .unwrap();
    assert_eq!(*reopened.document(), saved);
    let title_el = reopened.document().element(&title).unwrap();
    assert_eq!((title_el.x, title_el.y), (100.0, 40.0));
}

#[tokio::test]
async fn lapsed_lock_blocks_save_until_reopened() {
    let env = env();
    let mut first = EditingSession::create(
        "overlay",
        "producer",
        CanvasDocument::new(),
        env.services.clone(),
        EngineConfig::default(),
    )
    .await
    .unwrap();
    first.store_mut().unwrap().add_element(ElementType::Text);
    first.save().await.unwrap();

    env.clock.advance(Duration::minutes(10));
    let mut second = EditingSession::open("overlay", "director", env.services.clone(), EngineConfig::default())
        .await
        .unwrap();

    assert!(matches!(first.save().await, Err(EaselError::LockLost)));
    assert!(matches!(first.refresh_lock().await, Err(EaselError::LockLost)));

    second.store_mut().unwrap().add_element(ElementType::PlayerName);
    second.save().await.unwrap();

    let stored = env.services.persistence.load("overlay").await.unwrap();
    assert_eq!(stored.elements.len(), 2);
    assert_eq!(stored.element_series.len(), 1);

    // closing the displaced session must not release the new holder's lock
    first.close().await;
    assert!(second.is_writable());
    assert!(
        EditingSession::open("overlay", "intruder", env.services.clone(), EngineConfig::default())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn undo_across_session_edits() {
    let env = env();
    let mut session = EditingSession::create(
        "overlay",
        "producer",
        CanvasDocument::new(),
        env.services.clone(),
        EngineConfig::default(),
    )
    .await
    .unwrap();

    let store = session.store_mut().unwrap();
    let id = store.add_element(ElementType::Text).touched[0].clone();
    for x in [10.0, 55.0, 120.0, 240.0] {
        store.move_element(&id, x, 300.0).unwrap();
        store.commit_pending();
    }
    store.flush();
    assert_eq!(store.document().element(&id).unwrap().x, 240.0);

    assert!(store.undo());
    assert_eq!(store.document().element(&id).unwrap().x, 0.0);
    assert!(store.undo());
    assert!(store.document().elements.is_empty());
    assert!(!store.undo());
}

/// File storage whose writes fail while `failing` is set.
struct FlakyStorage {
    inner: FilePersistence,
    failing: AtomicBool,
}

#[async_trait]
impl PersistenceAdapter for FlakyStorage {
    async fn load(&self, doc_id: &str) -> Result<CanvasDocument, PersistenceError> {
        self.inner.load(doc_id).await
    }

    async fn save(
        &self,
        doc_id: &str,
        document: &CanvasDocument,
        token: &LockToken,
    ) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Io(std::io::Error::other("disk full")));
        }
        self.inner.save(doc_id, document, token).await
    }
}

#[tokio::test]
async fn failed_save_keeps_document_and_can_retry() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::default();
    let locks: Arc<dyn LockService> =
        Arc::new(LocalLockService::new(LockManager::new(Arc::new(clock.clone()))));
    let storage = Arc::new(FlakyStorage {
        inner: FilePersistence::new(dir.path(), locks.clone()),
        failing: AtomicBool::new(true),
    });
    let services = SessionServices::new(locks, storage.clone(), Arc::new(StaticProvider::new()))
        .with_clock(Arc::new(clock.clone()));

    let mut session = EditingSession::create(
        "overlay",
        "producer",
        CanvasDocument::new(),
        services,
        EngineConfig::default(),
    )
    .await
    .unwrap();
    let store = session.store_mut().unwrap();
    let id = store.add_element(ElementType::Text).touched[0].clone();
    store.update_element(&id, &json!({"content": "Final"})).unwrap();
    let edited = session.document().clone();

    let err = session.save().await.unwrap_err();
    assert!(matches!(err, EaselError::Persistence(PersistenceError::Io(_))));
    assert_eq!(*session.document(), edited);
    assert!(session.store().can_undo());
    assert!(!session.store().can_redo());
    assert!(session.is_writable());
    assert!(matches!(
        storage.inner.load("overlay").await,
        Err(PersistenceError::NotFound(_))
    ));

    storage.failing.store(false, Ordering::SeqCst);
    session.save().await.unwrap();
    assert_eq!(storage.inner.load("overlay").await.unwrap(), edited);

    // both edits are still undoable after the retry
    let store = session.store_mut().unwrap();
    assert!(store.undo());
    assert!(store.undo());
    assert!(store.document().elements.is_empty());
}
