//! # Editing Session
//!
//! One editor's write session on one document.
//!
//! Opening a session takes the document lock, loads and normalizes the
//! document, and wraps it in a [`CanvasStore`]. While the lock is held the
//! store is writable through [`EditingSession::store_mut`]; once the lock
//! expires or is taken over, every write fails with
//! [`EaselError::LockLost`] and the document stays readable.
//!
//! Live preview fetches run through a [`PreviewRequest`] so a host can drive
//! them from its own task. Each request carries a generation number and a
//! cancellation token: responses from superseded requests, or arriving after
//! the session closed, are discarded instead of applied.

use chrono::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::collab::{PersistenceAdapter, PreviewDataProvider};
use crate::config::EngineConfig;
use crate::document::edit::SeriesFailure;
use crate::document::{CanvasDocument, SortBy, SortOrder};
use crate::error::{EaselError, PersistenceError, ProviderError};
use crate::lock::{LockService, LockToken};
use crate::series::Record;
use crate::store::CanvasStore;

/// External services a session talks to.
#[derive(Clone)]
pub struct SessionServices {
    pub locks: Arc<dyn LockService>,
    pub persistence: Arc<dyn PersistenceAdapter>,
    pub provider: Arc<dyn PreviewDataProvider>,
    pub clock: Arc<dyn Clock>,
}

impl SessionServices {
    pub fn new(
        locks: Arc<dyn LockService>,
        persistence: Arc<dyn PersistenceAdapter>,
        provider: Arc<dyn PreviewDataProvider>,
    ) -> Self {
        Self {
            locks,
            persistence,
            provider,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// The session's current lock token, shared with the keeper task.
struct Lease {
    token: Mutex<LockToken>,
    lost: AtomicBool,
}

impl Lease {
    fn token(&self) -> LockToken {
        self.token.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_token(&self, token: LockToken) {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = token;
    }

    fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    fn mark_lost(&self) {
        if !self.lost.swap(true, Ordering::SeqCst) {
            let token = self.token();
            warn!(doc_id = %token.doc_id, holder = %token.holder, "lock lost, editing disabled");
        }
    }
}

async fn refresh_lease(locks: &dyn LockService, lease: &Lease, ttl: Duration) -> Result<LockToken, EaselError> {
    if lease.is_lost() {
        return Err(EaselError::LockLost);
    }
    match locks.refresh(&lease.token(), ttl).await {
        Ok(token) => {
            lease.set_token(token.clone());
            Ok(token)
        }
        Err(e) => {
            debug!(error = %e, "lock refresh failed");
            lease.mark_lost();
            Err(EaselError::LockLost)
        }
    }
}

// ============================================================================
// PREVIEW
// ============================================================================

/// A pending preview fetch, detached from the session.
pub struct PreviewRequest {
    generation: u64,
    source_id: String,
    sort_by: SortBy,
    sort_order: SortOrder,
    max_records: Option<u32>,
    provider: Arc<dyn PreviewDataProvider>,
    cancel: CancellationToken,
}

impl PreviewRequest {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Run the fetch. Resolves early with [`ProviderError::Cancelled`] when
    /// the request is superseded or the session closes.
    pub async fn fetch(self) -> PreviewResponse {
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ProviderError::Cancelled),
            r = self.provider.fetch_ranked(&self.source_id, self.sort_by, self.sort_order) => r,
        };
        let max_records = self.max_records;
        PreviewResponse {
            generation: self.generation,
            result: result.map(|mut records| {
                if let Some(max) = max_records {
                    records.truncate(max as usize);
                }
                records
            }),
        }
    }
}

/// Outcome of a [`PreviewRequest`], to be handed back to the session.
#[derive(Debug, Clone)]
pub struct PreviewResponse {
    pub generation: u64,
    pub result: Result<Vec<Record>, ProviderError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreviewStatus {
    /// Records applied. Series whose records were invalid are listed.
    Applied(Vec<SeriesFailure>),
    /// The provider failed; series show their placeholders.
    Placeholders(ProviderError),
    /// Preview is off or has no source; series show their placeholders.
    Disabled,
    /// A stale or cancelled response was dropped.
    Discarded,
}

// ============================================================================
// SESSION
// ============================================================================

pub struct EditingSession {
    doc_id: String,
    config: EngineConfig,
    services: SessionServices,
    store: CanvasStore,
    lease: Arc<Lease>,
    cancel: CancellationToken,
    preview_cancel: CancellationToken,
    preview_generation: u64,
    preview_error: Option<ProviderError>,
    keeper: Option<JoinHandle<()>>,
}

impl EditingSession {
    /// Lock and load `doc_id` for `holder`.
    pub async fn open(
        doc_id: &str,
        holder: &str,
        services: SessionServices,
        config: EngineConfig,
    ) -> Result<Self, EaselError> {
        let token = services.locks.acquire(doc_id, holder, config.lock_ttl()).await?;
        let document = match services.persistence.load(doc_id).await {
            Ok(document) => document,
            Err(e) => {
                services.locks.release(&token).await;
                return Err(e.into());
            }
        };
        info!(doc_id, holder, elements = document.elements.len(), "session opened");
        Ok(Self::start(doc_id, token, document, services, config))
    }

    /// Lock `doc_id` for `holder` and start from `document` instead of loading.
    pub async fn create(
        doc_id: &str,
        holder: &str,
        document: CanvasDocument,
        services: SessionServices,
        config: EngineConfig,
    ) -> Result<Self, EaselError> {
        let token = services.locks.acquire(doc_id, holder, config.lock_ttl()).await?;
        info!(doc_id, holder, "session created");
        Ok(Self::start(doc_id, token, document, services, config))
    }

    fn start(
        doc_id: &str,
        token: LockToken,
        document: CanvasDocument,
        services: SessionServices,
        config: EngineConfig,
    ) -> Self {
        let store = CanvasStore::with_clock(document, &config, services.clock.clone());
        let cancel = CancellationToken::new();
        Self {
            doc_id: doc_id.to_string(),
            config,
            store,
            lease: Arc::new(Lease {
                token: Mutex::new(token),
                lost: AtomicBool::new(false),
            }),
            preview_cancel: cancel.child_token(),
            cancel,
            preview_generation: 0,
            preview_error: None,
            keeper: None,
            services,
        }
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn document(&self) -> &CanvasDocument {
        self.store.document()
    }

    /// Read-only access to the store.
    pub fn store(&self) -> &CanvasStore {
        &self.store
    }

    /// Write access to the store, while the lock is held.
    pub fn store_mut(&mut self) -> Result<&mut CanvasStore, EaselError> {
        self.ensure_writable()?;
        Ok(&mut self.store)
    }

    pub fn lock_token(&self) -> LockToken {
        self.lease.token()
    }

    /// Whether edits are currently accepted. Checks local expiry too.
    pub fn is_writable(&self) -> bool {
        self.ensure_writable().is_ok()
    }

    /// Last preview provider failure, cleared by a successful fetch.
    pub fn preview_error(&self) -> Option<&ProviderError> {
        self.preview_error.as_ref()
    }

    fn ensure_writable(&self) -> Result<(), EaselError> {
        if self.cancel.is_cancelled() {
            return Err(EaselError::SessionClosed);
        }
        if self.lease.is_lost() {
            return Err(EaselError::LockLost);
        }
        if self.lease.token().expires_at <= self.services.clock.now() {
            self.lease.mark_lost();
            return Err(EaselError::LockLost);
        }
        Ok(())
    }

    // ========================================================================
    // LOCK
    // ========================================================================

    /// Extend the lock now.
    pub async fn refresh_lock(&self) -> Result<LockToken, EaselError> {
        self.ensure_writable()?;
        refresh_lease(self.services.locks.as_ref(), &self.lease, self.config.lock_ttl()).await
    }

    /// Refresh the lock in the background every `lockRefreshSecs` until the
    /// session closes or a refresh fails.
    pub fn spawn_lock_keeper(&mut self) {
        if self.keeper.is_some() {
            return;
        }
        let locks = self.services.locks.clone();
        let lease = self.lease.clone();
        let ttl = self.config.lock_ttl();
        let period = self.config.lock_refresh_interval();
        let cancel = self.cancel.clone();

        self.keeper = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // first tick completes immediately
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if refresh_lease(locks.as_ref(), &lease, ttl).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }));
    }

    // ========================================================================
    // PERSISTENCE
    // ========================================================================

    /// Write the current document. On failure the in-memory document is
    /// kept, so the save can be retried. Dropping the returned future
    /// abandons the write.
    pub async fn save(&mut self) -> Result<(), EaselError> {
        self.ensure_writable()?;
        self.store.flush();
        let token = self.lease.token();

        let result = self
            .services
            .persistence
            .save(&self.doc_id, self.store.document(), &token)
            .await;
        match result {
            Ok(()) => {
                info!(doc_id = %self.doc_id, "document saved");
                Ok(())
            }
            Err(e) => {
                if matches!(e, PersistenceError::LockConflict(_)) {
                    self.lease.mark_lost();
                }
                warn!(doc_id = %self.doc_id, error = %e, "save failed");
                Err(e.into())
            }
        }
    }

    // ========================================================================
    // PREVIEW
    // ========================================================================

    /// Start a preview fetch for the document's preview config, superseding
    /// any fetch still in flight. `None` when preview is off.
    pub fn begin_preview(&mut self) -> Option<PreviewRequest> {
        self.preview_cancel.cancel();
        self.preview_cancel = self.cancel.child_token();
        self.preview_generation += 1;

        let config = &self.store.document().preview_config;
        if !config.enabled {
            return None;
        }
        let source_id = config.source_id.clone()?;
        Some(PreviewRequest {
            generation: self.preview_generation,
            source_id,
            sort_by: config.sort_by,
            sort_order: config.sort_order,
            max_records: config.max_records,
            provider: self.services.provider.clone(),
            cancel: self.preview_cancel.clone(),
        })
    }

    /// Apply a fetch result if it is still current.
    pub fn apply_preview(&mut self, response: PreviewResponse) -> PreviewStatus {
        if self.cancel.is_cancelled() || response.generation != self.preview_generation {
            debug!(
                generation = response.generation,
                current = self.preview_generation,
                "discarding stale preview response"
            );
            return PreviewStatus::Discarded;
        }
        match response.result {
            Ok(records) => {
                self.preview_error = None;
                let applied = self.store.apply_preview_records(&records);
                PreviewStatus::Applied(applied.failures)
            }
            Err(ProviderError::Cancelled) => PreviewStatus::Discarded,
            Err(e) => {
                warn!(doc_id = %self.doc_id, error = %e, "preview unavailable, showing placeholders");
                self.store.apply_preview_records(&[]);
                self.preview_error = Some(e.clone());
                PreviewStatus::Placeholders(e)
            }
        }
    }

    /// Fetch and apply preview data in one step.
    pub async fn refresh_preview(&mut self) -> PreviewStatus {
        match self.begin_preview() {
            Some(request) => {
                let response = request.fetch().await;
                self.apply_preview(response)
            }
            None => {
                self.preview_error = None;
                self.store.apply_preview_records(&[]);
                PreviewStatus::Disabled
            }
        }
    }

    // ========================================================================
    // SHUTDOWN
    // ========================================================================

    /// Cancel in-flight work, stop the keeper and release the lock.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(keeper) = self.keeper.take() {
            keeper.abort();
        }
        if !self.lease.is_lost() {
            self.services.locks.release(&self.lease.token()).await;
        }
        info!(doc_id = %self.doc_id, "session closed");
    }
}

impl Drop for EditingSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(keeper) = self.keeper.take() {
            keeper.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collab::{MemoryPersistence, StaticProvider};
    use crate::document::ElementType;
    use crate::lock::{LocalLockService, LockManager};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Fixture {
        clock: ManualClock,
        services: SessionServices,
        persistence: MemoryPersistence,
    }

    async fn fixture() -> Fixture {
        let clock = ManualClock::default();
        let locks: Arc<dyn LockService> =
            Arc::new(LocalLockService::new(LockManager::new(Arc::new(clock.clone()))));
        let persistence = MemoryPersistence::new(locks.clone());
        persistence
            .insert_raw(
                "show",
                json!({
                    "elements": [{"id": "title", "type": "text", "content": "Top 3"}],
                    "previewConfig": {"enabled": true, "sourceId": "event", "sortBy": "score", "sortOrder": "desc"}
                })
                .to_string(),
            )
            .await;
        let provider = StaticProvider::new().with_source(
            "event",
            vec![
                Record::new("a", "Ana", 10.0, 3),
                Record::new("b", "Bo", 30.0, 1),
                Record::new("c", "Cy", 20.0, 2),
            ],
        );
        let services = SessionServices::new(locks, Arc::new(persistence.clone()), Arc::new(provider))
            .with_clock(Arc::new(clock.clone()));
        Fixture {
            clock,
            services,
            persistence,
        }
    }

    #[tokio::test]
    async fn test_second_editor_is_rejected() {
        let f = fixture().await;
        let _alice = EditingSession::open("show", "alice", f.services.clone(), EngineConfig::default())
            .await
            .unwrap();
        let err = EditingSession::open("show", "bob", f.services.clone(), EngineConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EaselError::LockConflict { ref holder, .. } if holder == "alice"));
    }

    #[tokio::test]
    async fn test_open_missing_document_releases_lock() {
        let f = fixture().await;
        let err = EditingSession::open("nope", "alice", f.services.clone(), EngineConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EaselError::Persistence(PersistenceError::NotFound(_))));
        assert!(
            EditingSession::create("nope", "bob", CanvasDocument::new(), f.services.clone(), EngineConfig::default())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_expired_lock_disables_editing() {
        let f = fixture().await;
        let mut session = EditingSession::open("show", "alice", f.services.clone(), EngineConfig::default())
            .await
            .unwrap();
        session.store_mut().unwrap().add_element(ElementType::Text);

        f.clock.advance(Duration::minutes(5));
        assert!(matches!(session.store_mut(), Err(EaselError::LockLost)));
        assert!(matches!(session.save().await, Err(EaselError::LockLost)));
        // still readable
        assert_eq!(session.document().elements.len(), 2);

        let bob = EditingSession::open("show", "bob", f.services.clone(), EngineConfig::default()).await;
        assert!(bob.is_ok());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let f = fixture().await;
        let mut session = EditingSession::open("show", "alice", f.services.clone(), EngineConfig::default())
            .await
            .unwrap();
        session
            .store_mut()
            .unwrap()
            .update_element("title", &json!({"content": "Final standings"}))
            .unwrap();
        session.save().await.unwrap();
        session.close().await;

        let doc = f.services.persistence.load("show").await.unwrap();
        assert_eq!(doc.element("title").unwrap().content.as_deref(), Some("Final standings"));
        assert!(f.persistence.raw("show").await.unwrap().contains("Final standings"));
    }

    #[tokio::test]
    async fn test_refresh_lock_extends_session() {
        let f = fixture().await;
        let session = EditingSession::open("show", "alice", f.services.clone(), EngineConfig::default())
            .await
            .unwrap();
        f.clock.advance(Duration::minutes(4));
        let token = session.refresh_lock().await.unwrap();
        assert_eq!(token.expires_at, f.clock.now() + Duration::minutes(5));
        f.clock.advance(Duration::minutes(4));
        assert!(session.is_writable());
    }

    #[tokio::test]
    async fn test_preview_generates_series() {
        let f = fixture().await;
        let mut session = EditingSession::open("show", "alice", f.services.clone(), EngineConfig::default())
            .await
            .unwrap();
        session.store_mut().unwrap().add_element(ElementType::PlayerName);

        let status = session.refresh_preview().await;
        assert_eq!(status, PreviewStatus::Applied(Vec::new()));
        let doc = session.document();
        let names: Vec<String> = doc
            .elements
            .iter()
            .filter(|e| e.series_id().is_some())
            .map(|e| doc.display_text(e))
            .collect();
        assert_eq!(names, ["Bo", "Cy", "Ana"]);
    }

    #[tokio::test]
    async fn test_stale_preview_is_discarded() {
        let f = fixture().await;
        let mut session = EditingSession::open("show", "alice", f.services.clone(), EngineConfig::default())
            .await
            .unwrap();
        session.store_mut().unwrap().add_element(ElementType::PlayerName);

        let first = session.begin_preview().unwrap();
        let second = session.begin_preview().unwrap();
        assert!(second.generation() > first.generation());

        let stale = first.fetch().await;
        assert_eq!(stale.result, Err(ProviderError::Cancelled));
        assert_eq!(session.apply_preview(stale), PreviewStatus::Discarded);

        let fresh = second.fetch().await;
        assert!(matches!(session.apply_preview(fresh), PreviewStatus::Applied(_)));
    }

    #[tokio::test]
    async fn test_provider_failure_degrades_to_placeholders() {
        let f = fixture().await;
        let mut session = EditingSession::open("show", "alice", f.services.clone(), EngineConfig::default())
            .await
            .unwrap();
        let store = session.store_mut().unwrap();
        store.add_element(ElementType::PlayerScore);
        store.update_preview_config(&json!({"sourceId": "offline"}));

        let status = session.refresh_preview().await;
        assert!(matches!(status, PreviewStatus::Placeholders(ProviderError::Unavailable(_))));
        assert!(session.preview_error().is_some());

        let doc = session.document();
        let score = doc.elements.iter().find(|e| e.series_id().is_some()).unwrap();
        assert_eq!(doc.display_text(score), "0");

        // manual editing still works
        assert!(session.store_mut().unwrap().update_element("title", &json!({"x": 40})).is_ok());
    }

    #[tokio::test]
    async fn test_close_cancels_in_flight_preview() {
        let f = fixture().await;
        let mut session = EditingSession::open("show", "alice", f.services.clone(), EngineConfig::default())
            .await
            .unwrap();
        let request = session.begin_preview().unwrap();
        session.close().await;
        assert_eq!(request.fetch().await.result, Err(ProviderError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_keeper_refreshes() {
        let f = fixture().await;
        let mut session = EditingSession::open("show", "alice", f.services.clone(), EngineConfig::default())
            .await
            .unwrap();
        session.spawn_lock_keeper();

        f.clock.advance(Duration::minutes(4));
        tokio::time::sleep(std::time::Duration::from_secs(80)).await;
        assert_eq!(session.lock_token().expires_at, f.clock.now() + Duration::minutes(5));

        f.clock.advance(Duration::minutes(4));
        assert!(session.is_writable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_keeper_detects_takeover() {
        let f = fixture().await;
        let mut session = EditingSession::open("show", "alice", f.services.clone(), EngineConfig::default())
            .await
            .unwrap();
        session.spawn_lock_keeper();

        f.clock.advance(Duration::minutes(6));
        let _bob = f.services.locks.acquire("show", "bob", Duration::minutes(5)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(80)).await;
        assert!(matches!(session.store_mut(), Err(EaselError::LockLost)));
    }
}
