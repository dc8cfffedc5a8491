//! # Canvas Document Store
//!
//! Owns the authoritative [`CanvasDocument`] together with its undo history.
//!
//! Every mutation goes through a pure function in [`crate::document::edit`];
//! the store swaps in the resulting document and records it in history.
//! Drags are the exception: [`CanvasStore::move_element`] and
//! [`CanvasStore::update_element_transient`] change the document without a
//! history entry, and the caller commits them with
//! [`CanvasStore::commit_pending`] on its own cadence. Those commits are
//! debounced per element, so a whole drag becomes one undo step.

use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::document::edit::{Edit, EditContext, SeriesFailure};
use crate::document::{CanvasDocument, ElementType, SeriesSpec};
use crate::error::EditError;
use crate::history::{Commit, History};
use crate::series::Record;
use crate::snap::{SnapLine, SnapOptions};

/// What an applied edit changed, minus the document itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Applied {
    pub guide_lines: Vec<SnapLine>,
    pub touched: Vec<String>,
    pub failures: Vec<SeriesFailure>,
}

pub struct CanvasStore {
    document: CanvasDocument,
    history: History<CanvasDocument>,
    context: EditContext,
    /// Debounce key of uncommitted transient changes.
    pending: Option<String>,
}

impl CanvasStore {
    pub fn new(document: CanvasDocument, config: &EngineConfig) -> Self {
        Self::with_clock(document, config, Arc::new(SystemClock))
    }

    pub fn with_clock(document: CanvasDocument, config: &EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let history = History::with_options(
            document.clone(),
            config.history_depth,
            config.debounce_window(),
            clock,
        );
        Self {
            document,
            history,
            context: EditContext {
                snap: config.snap_options(),
                grid_columns: config.grid_columns,
            },
            pending: None,
        }
    }

    pub fn document(&self) -> &CanvasDocument {
        &self.document
    }

    pub fn context(&self) -> &EditContext {
        &self.context
    }

    pub fn set_snap_options(&mut self, snap: SnapOptions) {
        self.context.snap = snap;
    }

    /// Swap in a freshly loaded document and start a new history.
    pub fn replace_document(&mut self, document: CanvasDocument) {
        self.pending = None;
        self.history.reset(document.clone());
        self.document = document;
    }

    fn record(&mut self, edit: Edit, commit: Commit) -> Applied {
        self.commit_pending();
        self.history.push(edit.document.clone(), commit);
        self.install(edit)
    }

    fn install(&mut self, edit: Edit) -> Applied {
        self.document = edit.document;
        Applied {
            guide_lines: edit.guide_lines,
            touched: edit.touched,
            failures: edit.failures,
        }
    }

    // ========================================================================
    // ELEMENTS
    // ========================================================================

    pub fn add_element(&mut self, element_type: ElementType) -> Applied {
        let edit = self.document.add_element(element_type);
        self.record(edit, Commit::Immediate)
    }

    pub fn update_element(&mut self, id: &str, patch: &Value) -> Result<Applied, EditError> {
        let edit = self.document.update_element(id, patch, &self.context)?;
        Ok(self.record(edit, Commit::Immediate))
    }

    /// Apply `patch` without recording history; see [`Self::commit_pending`].
    pub fn update_element_transient(&mut self, id: &str, patch: &Value) -> Result<Applied, EditError> {
        let edit = self.document.update_element(id, patch, &self.context)?;
        let key = format!("update:{}", id);
        if self.pending.as_ref().is_some_and(|k| *k != key) {
            self.commit_pending();
        }
        self.pending = Some(key);
        Ok(self.install(edit))
    }

    /// Drag step: move an element to a raw position and snap it.
    pub fn move_element(&mut self, id: &str, x: f64, y: f64) -> Result<Applied, EditError> {
        self.update_element_transient(id, &json!({"x": x, "y": y}))
    }

    pub fn remove_element(&mut self, id: &str) -> Result<Applied, EditError> {
        let edit = self.document.remove_element(id)?;
        Ok(self.record(edit, Commit::Immediate))
    }

    pub fn duplicate_element(&mut self, id: &str) -> Result<Applied, EditError> {
        let edit = self.document.duplicate_element(id, &self.context)?;
        Ok(self.record(edit, Commit::Immediate))
    }

    // ========================================================================
    // SERIES
    // ========================================================================

    pub fn upsert_series(&mut self, spec: SeriesSpec, records: &[Record]) -> Applied {
        let edit = self.document.upsert_series(spec, records, &self.context);
        self.record(edit, Commit::Immediate)
    }

    pub fn delete_series(&mut self, id: &str) -> Result<Applied, EditError> {
        let edit = self.document.delete_series(id)?;
        Ok(self.record(edit, Commit::Immediate))
    }

    pub fn regenerate_all(&mut self, records: &BTreeMap<String, Vec<Record>>) -> Applied {
        let edit = self.document.regenerate_all(records, &self.context);
        self.record(edit, Commit::Immediate)
    }

    /// Regenerate every series from live preview data. Not an undo step:
    /// it reflects remote data, not an edit.
    pub fn apply_preview_records(&mut self, records: &[Record]) -> Applied {
        let edit = self.document.apply_records(records, &self.context);
        self.install(edit)
    }

    // ========================================================================
    // SETTINGS
    // ========================================================================

    pub fn update_settings(&mut self, patch: &Value) -> Applied {
        let edit = self.document.update_settings(patch);
        self.record(edit, Commit::Immediate)
    }

    pub fn update_background(&mut self, image: Option<String>, dims: Option<(f64, f64)>) -> Applied {
        let edit = self.document.update_background(image, dims);
        self.record(edit, Commit::Immediate)
    }

    pub fn update_preview_config(&mut self, patch: &Value) -> Applied {
        let edit = self.document.update_preview_config(patch);
        self.record(edit, Commit::Immediate)
    }

    // ========================================================================
    // HISTORY
    // ========================================================================

    /// Record outstanding transient changes as a debounced history step.
    pub fn commit_pending(&mut self) {
        if let Some(key) = self.pending.take() {
            debug!(key = %key, "committing transient changes");
            self.history.push(self.document.clone(), Commit::Debounced(key));
        }
    }

    /// Commit transient changes and close the debounce window.
    pub fn flush(&mut self) {
        self.commit_pending();
        self.history.flush();
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn undo(&mut self) -> bool {
        self.commit_pending();
        match self.history.undo() {
            Some(snapshot) => {
                self.document = snapshot;
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        self.commit_pending();
        match self.history.redo() {
            Some(snapshot) => {
                self.document = snapshot;
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.pending.is_some() || self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.pending.is_none() && self.history.can_redo()
    }
}
