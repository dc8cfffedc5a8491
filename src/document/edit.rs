//! Pure document transformations.
//!
//! Every operation takes the current document by reference and returns an
//! [`Edit`]: a complete new document plus what a caller needs to update its
//! view (guide lines from snapping, touched element ids, series that failed
//! to regenerate). The input document is never modified, so a concurrent
//! reader holding the old snapshot never observes a half-applied change.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::warn;
use uuid::Uuid;

use super::normalize::{
    bind_base_element, normalize_element, normalize_preview_config, normalize_series,
    normalize_settings, unique_id,
};
use super::{CanvasDocument, Element, ElementType, SeriesSpec};
use crate::config::DEFAULT_GRID_COLUMNS;
use crate::error::{EditError, SeriesError};
use crate::series::{Record, generate_with_columns};
use crate::snap::{SnapLine, SnapOptions, snap};

/// Engine settings an edit needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EditContext {
    pub snap: SnapOptions,
    pub grid_columns: u32,
}

impl Default for EditContext {
    fn default() -> Self {
        Self {
            snap: SnapOptions::default(),
            grid_columns: DEFAULT_GRID_COLUMNS,
        }
    }
}

/// A series whose regeneration was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesFailure {
    pub series_id: String,
    pub error: SeriesError,
}

/// Result of a document operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    pub document: CanvasDocument,
    /// Alignment guides produced by snapping a moved or resized element.
    pub guide_lines: Vec<SnapLine>,
    /// Elements created, changed or removed by the operation.
    pub touched: Vec<String>,
    /// Series left unchanged because their records were invalid.
    pub failures: Vec<SeriesFailure>,
}

impl Edit {
    fn new(document: CanvasDocument) -> Self {
        Self {
            document,
            guide_lines: Vec::new(),
            touched: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn touching(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.touched.extend(ids);
        self
    }
}

// ============================================================================
// JSON MERGE
// ============================================================================

/// Apply a JSON merge patch (RFC 7396): objects merge recursively, `null`
/// removes a key, anything else replaces.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_obj) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_obj) = target {
        for (key, value) in patch_obj {
            if value.is_null() {
                target_obj.remove(key);
            } else {
                merge_patch(target_obj.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

// ============================================================================
// SERIES HELPERS
// ============================================================================

/// Swap a series' owned elements for `replacement` in one step.
///
/// The new elements take the position of the first old one in the element
/// order (or go to the end if the series owned nothing). Ids that collide
/// with unrelated elements are re-keyed.
fn replace_series_elements(
    elements: &mut Vec<Element>,
    series_id: &str,
    replacement: Vec<Element>,
) -> Vec<String> {
    let insert_at = elements
        .iter()
        .position(|e| e.series_id() == Some(series_id))
        .unwrap_or(elements.len());

    let mut touched: Vec<String> = elements
        .iter()
        .filter(|e| e.series_id() == Some(series_id))
        .map(|e| e.id.clone())
        .collect();
    elements.retain(|e| e.series_id() != Some(series_id));

    let mut taken: HashSet<String> = elements.iter().map(|e| e.id.clone()).collect();
    let replacement: Vec<Element> = replacement
        .into_iter()
        .map(|mut el| {
            el.id = unique_id(&el.id, &taken);
            taken.insert(el.id.clone());
            el
        })
        .collect();

    touched.extend(replacement.iter().map(|e| e.id.clone()));
    let tail = elements.split_off(insert_at);
    elements.extend(replacement);
    elements.extend(tail);
    touched
}

impl CanvasDocument {
    // ========================================================================
    // ELEMENTS
    // ========================================================================

    /// Add a new element of `element_type` with its editor defaults.
    ///
    /// Bound types also create the series that owns the element.
    pub fn add_element(&self, element_type: ElementType) -> Edit {
        let mut doc = self.clone();
        let taken: HashSet<String> = doc.elements.iter().map(|e| e.id.clone()).collect();
        let id = unique_id(&Uuid::new_v4().to_string(), &taken);
        let element = Element::editor_default(element_type, id.clone());

        if element_type.is_bound() {
            let spec = SeriesSpec::for_element(format!("series-{}", Uuid::new_v4()), element);
            doc.elements.push(spec.base_element.clone());
            doc.element_series.push(spec);
        } else {
            doc.elements.push(element);
        }
        Edit::new(doc).touching([id])
    }

    /// Merge `patch` into an element, renormalize it and, when its geometry
    /// changed, snap it against its siblings.
    ///
    /// The element id cannot be changed. Editing a series' base element
    /// (while no records are applied) also updates the series template.
    pub fn update_element(
        &self,
        id: &str,
        patch: &Value,
        ctx: &EditContext,
    ) -> Result<Edit, EditError> {
        let index = self
            .elements
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| EditError::ElementNotFound(id.to_string()))?;
        let before = &self.elements[index];

        let mut value = to_value(before);
        if patch.get("dataBinding").is_some()
            && patch.get("isPlaceholder").is_none()
            && let Value::Object(obj) = &mut value
        {
            obj.remove("isPlaceholder");
        }
        merge_patch(&mut value, patch);
        let mut updated = normalize_element(&value);
        updated.id = before.id.clone();
        if updated
            .series_id()
            .is_some_and(|sid| self.series(sid).is_none())
        {
            updated.is_placeholder = true;
        }

        let geometry_changed = updated.x != before.x
            || updated.y != before.y
            || updated.width != before.width
            || updated.height != before.height;

        let mut guide_lines = Vec::new();
        if geometry_changed {
            let result = snap(&updated, &self.elements, &ctx.snap);
            updated.x = result.position.x;
            updated.y = result.position.y;
            guide_lines = result.guide_lines;
        }

        let mut doc = self.clone();
        if let Some(series_id) = updated.series_id().map(str::to_string)
            && let Some(spec) = doc.element_series.iter_mut().find(|s| s.id == series_id)
            && spec.base_element.id == updated.id
        {
            spec.base_element = updated.clone();
            bind_base_element(spec);
            updated = spec.base_element.clone();
        }
        doc.elements[index] = updated;

        let mut edit = Edit::new(doc).touching([id.to_string()]);
        edit.guide_lines = guide_lines;
        Ok(edit)
    }

    pub fn remove_element(&self, id: &str) -> Result<Edit, EditError> {
        let mut doc = self.clone();
        let index = doc
            .elements
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| EditError::ElementNotFound(id.to_string()))?;
        doc.elements.remove(index);
        Ok(Edit::new(doc).touching([id.to_string()]))
    }

    /// Copy an element, offset by one grid step. A copy of a series element
    /// is detached from the series and keeps its current text.
    pub fn duplicate_element(&self, id: &str, ctx: &EditContext) -> Result<Edit, EditError> {
        let source = self
            .element(id)
            .ok_or_else(|| EditError::ElementNotFound(id.to_string()))?;
        let mut doc = self.clone();
        let taken: HashSet<String> = doc.elements.iter().map(|e| e.id.clone()).collect();

        let mut copy = source.clone();
        copy.id = unique_id(&format!("{}-copy", source.id), &taken);
        let step = if ctx.snap.grid_size.is_finite() && ctx.snap.grid_size > 0.0 {
            ctx.snap.grid_size
        } else {
            DEFAULT_GRID_STEP
        };
        copy.x += step;
        copy.y += step;
        if let Some(binding) = &mut copy.data_binding
            && binding.series_id.is_some()
        {
            binding.series_id = None;
            binding.source = super::BindingSource::Manual;
        }
        let copy_id = copy.id.clone();
        doc.elements.push(copy);
        Ok(Edit::new(doc).touching([copy_id]))
    }

    // ========================================================================
    // SERIES
    // ========================================================================

    /// Insert or replace a series and regenerate its elements from `records`.
    ///
    /// If the records are invalid the new definition is still stored but the series'
    /// current elements are left in place and the failure is reported.
    pub fn upsert_series(&self, spec: SeriesSpec, records: &[Record], ctx: &EditContext) -> Edit {
        let spec = normalize_series(&to_value(&spec));
        let mut doc = self.clone();
        match doc.element_series.iter_mut().find(|s| s.id == spec.id) {
            Some(existing) => *existing = spec.clone(),
            None => doc.element_series.push(spec.clone()),
        }

        match generate_with_columns(&spec, records, ctx.grid_columns) {
            Ok(generated) => {
                let touched = replace_series_elements(&mut doc.elements, &spec.id, generated);
                Edit::new(doc).touching(touched)
            }
            Err(error) => {
                warn!(series_id = %spec.id, %error, "series generation failed");
                let mut edit = Edit::new(doc);
                edit.failures.push(SeriesFailure {
                    series_id: spec.id,
                    error,
                });
                edit
            }
        }
    }

    /// Remove a series and every element it owns.
    pub fn delete_series(&self, id: &str) -> Result<Edit, EditError> {
        if self.series(id).is_none() {
            return Err(EditError::SeriesNotFound(id.to_string()));
        }
        let mut doc = self.clone();
        doc.element_series.retain(|s| s.id != id);
        let touched = replace_series_elements(&mut doc.elements, id, Vec::new());
        Ok(Edit::new(doc).touching(touched))
    }

    /// Regenerate every series. Series missing from `records` fall back to
    /// their base element; series whose records are invalid are skipped and
    /// reported without affecting the others. Series without their own round
    /// use the preview round.
    pub fn regenerate_all(
        &self,
        records: &BTreeMap<String, Vec<Record>>,
        ctx: &EditContext,
    ) -> Edit {
        let mut doc = self.clone();
        let mut touched = Vec::new();
        let mut failures = Vec::new();

        for spec in &self.element_series {
            let series_records = records.get(&spec.id).map(Vec::as_slice).unwrap_or(&[]);
            let mut effective = spec.clone();
            if effective.round_id.is_none() {
                effective.round_id = self.preview_config.round_id.clone();
            }
            match generate_with_columns(&effective, series_records, ctx.grid_columns) {
                Ok(generated) => {
                    touched.extend(replace_series_elements(&mut doc.elements, &spec.id, generated));
                }
                Err(error) => {
                    warn!(series_id = %spec.id, %error, "skipping series regeneration");
                    failures.push(SeriesFailure {
                        series_id: spec.id.clone(),
                        error,
                    });
                }
            }
        }

        let mut edit = Edit::new(doc).touching(touched);
        edit.failures = failures;
        edit
    }

    /// Regenerate every series from one shared record set.
    pub fn apply_records(&self, records: &[Record], ctx: &EditContext) -> Edit {
        let by_series = self
            .element_series
            .iter()
            .map(|s| (s.id.clone(), records.to_vec()))
            .collect();
        self.regenerate_all(&by_series, ctx)
    }

    // ========================================================================
    // SETTINGS
    // ========================================================================

    pub fn update_settings(&self, patch: &Value) -> Edit {
        let mut value = to_value(&self.settings);
        merge_patch(&mut value, patch);
        let mut doc = self.clone();
        doc.settings = normalize_settings(&value);
        Edit::new(doc)
    }

    /// Set (or clear) the background image, optionally resizing the canvas
    /// to the image's dimensions.
    pub fn update_background(&self, image: Option<String>, dims: Option<(f64, f64)>) -> Edit {
        let mut edit = match dims {
            Some((width, height)) => {
                self.update_settings(&serde_json::json!({"width": width, "height": height}))
            }
            None => Edit::new(self.clone()),
        };
        edit.document.background_image = image.filter(|s| !s.is_empty());
        edit
    }

    pub fn update_preview_config(&self, patch: &Value) -> Edit {
        let mut value = to_value(&self.preview_config);
        merge_patch(&mut value, patch);
        let mut doc = self.clone();
        doc.preview_config = normalize_preview_config(&value);
        Edit::new(doc)
    }
}

/// Offset for duplicates when no usable grid size is configured.
const DEFAULT_GRID_STEP: f64 = 10.0;
