//! # Normalizer
//!
//! Turns arbitrary JSON into fully-typed, defaulted document values.
//!
//! Every field is decoded on its own: a value that is absent or has the
//! wrong shape is replaced by that field's default, and the rest of the
//! object is kept. Nothing here returns an error or panics. All functions are
//! idempotent: feeding a normalized value (serialized back to JSON) through
//! again yields the same value.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashSet;
use uuid::Uuid;

use super::types::*;
use super::{CURRENT_VERSION, CanvasDocument};

// ============================================================================
// FIELD DECODERS
// ============================================================================

/// A finite number. Numeric strings (`"120"`) are accepted.
fn number(v: Option<&Value>) -> Option<f64> {
    let n = match v? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// A finite, strictly positive number.
fn positive(v: Option<&Value>) -> Option<f64> {
    number(v).filter(|n| *n > 0.0)
}

/// A positive whole count (`maxElements`, `columns`).
fn count(v: Option<&Value>) -> Option<u32> {
    let n = number(v)?;
    (n >= 1.0 && n.fract() == 0.0 && n <= u32::MAX as f64).then_some(n as u32)
}

fn boolean(v: Option<&Value>) -> Option<bool> {
    v?.as_bool()
}

fn string(v: Option<&Value>) -> Option<String> {
    v?.as_str().map(str::to_string)
}

fn non_empty(v: Option<&Value>) -> Option<String> {
    string(v).filter(|s| !s.is_empty())
}

/// Text content. Numbers are displayable too (scores typed into a field).
fn text(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Identifier: non-empty string, or a number rendered as a string.
fn identifier(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// One of an enum's recognized serde names; anything else is `None`.
fn variant<T: DeserializeOwned>(v: Option<&Value>) -> Option<T> {
    match v? {
        s @ Value::String(_) => serde_json::from_value(s.clone()).ok(),
        _ => None,
    }
}

fn object(v: Option<&Value>) -> Option<&Map<String, Value>> {
    v?.as_object()
}

static EMPTY: std::sync::LazyLock<Map<String, Value>> = std::sync::LazyLock::new(Map::new);

fn fields(raw: &Value) -> &Map<String, Value> {
    raw.as_object().unwrap_or(&EMPTY)
}

// ============================================================================
// ELEMENT
// ============================================================================

/// Decode an element. Missing ids get a fresh one.
pub fn normalize_element(raw: &Value) -> Element {
    let obj = fields(raw);
    let element_type: ElementType = variant(obj.get("type")).unwrap_or_default();
    let data_binding = object(obj.get("dataBinding")).map(|b| normalize_binding(b, element_type));

    let is_placeholder = boolean(obj.get("isPlaceholder")).unwrap_or_else(|| {
        element_type.is_bound()
            && data_binding
                .as_ref()
                .is_none_or(|b| b.manual_value.is_none())
    });

    Element {
        id: identifier(obj.get("id")).unwrap_or_else(|| Uuid::new_v4().to_string()),
        element_type,
        content: text(obj.get("content")),
        placeholder_text: string(obj.get("placeholderText")),
        x: number(obj.get("x")).unwrap_or(0.0),
        y: number(obj.get("y")).unwrap_or(0.0),
        width: positive(obj.get("width")),
        height: positive(obj.get("height")),
        style: normalize_style(obj),
        data_binding,
        is_placeholder,
    }
}

fn normalize_style(obj: &Map<String, Value>) -> ElementStyle {
    ElementStyle {
        font_family: non_empty(obj.get("fontFamily")),
        font_size: positive(obj.get("fontSize")),
        font_weight: text(obj.get("fontWeight")).filter(|s| !s.is_empty()),
        color: non_empty(obj.get("color")),
        background_color: non_empty(obj.get("backgroundColor")),
        text_align: variant(obj.get("textAlign")),
        text_transform: variant(obj.get("textTransform")),
        border: object(obj.get("border")).map(|b| Border {
            width: number(b.get("width")).filter(|w| *w >= 0.0).unwrap_or(0.0),
            color: non_empty(b.get("color")).unwrap_or_else(|| DEFAULT_TEXT_COLOR.to_string()),
            radius: number(b.get("radius")).filter(|r| *r >= 0.0).unwrap_or(0.0),
        }),
        shadow: object(obj.get("shadow")).map(|s| Shadow {
            color: non_empty(s.get("color")).unwrap_or_else(|| "#000000".to_string()),
            blur: number(s.get("blur")).filter(|b| *b >= 0.0).unwrap_or(0.0),
            offset_x: number(s.get("offsetX")).unwrap_or(0.0),
            offset_y: number(s.get("offsetY")).unwrap_or(0.0),
        }),
        letter_spacing: number(obj.get("letterSpacing")),
        line_height: positive(obj.get("lineHeight")),
        opacity: number(obj.get("opacity")).map(|o| o.clamp(0.0, 1.0)),
        rotation: number(obj.get("rotation")),
        z_index: number(obj.get("zIndex"))
            .filter(|z| z.fract() == 0.0 && z.abs() < i64::MAX as f64)
            .map(|z| z as i64),
    }
}

fn normalize_binding(obj: &Map<String, Value>, element_type: ElementType) -> DataBinding {
    DataBinding {
        source: variant(obj.get("source")).unwrap_or_default(),
        field: variant(obj.get("field")).unwrap_or_else(|| element_type.default_field()),
        series_id: identifier(obj.get("seriesId")),
        manual_value: text(obj.get("manualValue")),
        fallback_text: string(obj.get("fallbackText")),
    }
}

// ============================================================================
// SERIES
// ============================================================================

/// Decode a series spec. The base element is forced to the series' type and
/// bound back to the series.
pub fn normalize_series(raw: &Value) -> SeriesSpec {
    let obj = fields(raw);
    let base_raw = obj.get("baseElement").cloned().unwrap_or(Value::Null);
    let base_element = normalize_element(&base_raw);

    let series_type = variant::<ElementType>(obj.get("type"))
        .filter(|t| t.is_bound())
        .or_else(|| {
            Some(base_element.element_type).filter(|t| t.is_bound())
        })
        .unwrap_or(ElementType::PlayerName);

    let spacing = match object(obj.get("spacing")) {
        Some(s) => {
            let defaults = Spacing::default();
            Spacing {
                horizontal: number(s.get("horizontal")).unwrap_or(defaults.horizontal),
                vertical: number(s.get("vertical")).unwrap_or(defaults.vertical),
                direction: variant(s.get("direction")).unwrap_or_default(),
                columns: count(s.get("columns")),
            }
        }
        None => Spacing::default(),
    };

    let mut spec = SeriesSpec {
        id: identifier(obj.get("id")).unwrap_or_else(|| format!("series-{}", Uuid::new_v4())),
        series_type,
        base_element,
        spacing,
        auto_generate: boolean(obj.get("autoGenerate")).unwrap_or(true),
        max_elements: count(obj.get("maxElements")),
        sort_by: variant(obj.get("sortBy")).unwrap_or_default(),
        sort_order: variant(obj.get("sortOrder")).unwrap_or_default(),
        round_id: non_empty(obj.get("roundId")),
    };
    bind_base_element(&mut spec);
    spec
}

/// Tie the base element to its series: same type, `source: series`,
/// `seriesId` pointing back at the spec.
pub(crate) fn bind_base_element(spec: &mut SeriesSpec) {
    let base = &mut spec.base_element;
    if base.element_type != spec.series_type {
        base.element_type = spec.series_type;
        base.content = None;
    }
    let field = base
        .data_binding
        .as_ref()
        .map(|b| b.field)
        .unwrap_or_else(|| spec.series_type.default_field());
    let binding = base
        .data_binding
        .get_or_insert_with(|| DataBinding::manual(field));
    binding.source = BindingSource::Series;
    binding.series_id = Some(spec.id.clone());
}

// ============================================================================
// SETTINGS / PREVIEW
// ============================================================================

pub fn normalize_settings(raw: &Value) -> Settings {
    let obj = fields(raw);
    Settings {
        width: positive(obj.get("width")).unwrap_or(DEFAULT_CANVAS_WIDTH),
        height: positive(obj.get("height")).unwrap_or(DEFAULT_CANVAS_HEIGHT),
        background_color: non_empty(obj.get("backgroundColor"))
            .unwrap_or_else(|| DEFAULT_BACKGROUND_COLOR.to_string()),
    }
}

pub fn normalize_preview_config(raw: &Value) -> PreviewConfig {
    let obj = fields(raw);
    PreviewConfig {
        enabled: boolean(obj.get("enabled")).unwrap_or(false),
        source_id: identifier(obj.get("sourceId")),
        round_id: non_empty(obj.get("roundId")),
        sort_by: variant(obj.get("sortBy")).unwrap_or_default(),
        sort_order: variant(obj.get("sortOrder")).unwrap_or_default(),
        max_records: count(obj.get("maxRecords")),
    }
}

// ============================================================================
// DOCUMENT
// ============================================================================

/// Schema version of a serialized document. Unversioned input is version 0.
pub fn document_version(raw: &Value) -> u32 {
    fields(raw)
        .get("version")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0)
}

/// Decode a whole document, repairing cross-element invariants:
/// duplicate element ids are re-keyed, duplicate series are dropped (first
/// wins), and elements bound to a missing series become placeholders.
pub fn normalize_document(raw: &Value) -> CanvasDocument {
    let obj = fields(raw);
    let version = document_version(raw);
    if version > CURRENT_VERSION {
        tracing::warn!(version, "document is newer than this engine; reading known fields only");
    }

    let mut series_ids = HashSet::new();
    let element_series: Vec<SeriesSpec> = obj
        .get("elementSeries")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(normalize_series)
                .filter(|s| series_ids.insert(s.id.clone()))
                .collect()
        })
        .unwrap_or_default();

    let mut element_ids = HashSet::new();
    let elements = obj
        .get("elements")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    let mut el = normalize_element(item);
                    el.id = unique_id(&el.id, &element_ids);
                    element_ids.insert(el.id.clone());
                    if el.series_id().is_some_and(|sid| !series_ids.contains(sid)) {
                        el.is_placeholder = true;
                    }
                    el
                })
                .collect()
        })
        .unwrap_or_default();

    CanvasDocument {
        elements,
        element_series,
        settings: normalize_settings(obj.get("settings").unwrap_or(&Value::Null)),
        background_image: non_empty(obj.get("backgroundImage")),
        preview_config: normalize_preview_config(obj.get("previewConfig").unwrap_or(&Value::Null)),
    }
}

/// `id` if unused, else the first free `id-N`.
pub(crate) fn unique_id(id: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(id) {
        return id.to_string();
    }
    (1..)
        .map(|n| format!("{}-{}", id, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn renormalize(el: &Element) -> Element {
        normalize_element(&serde_json::to_value(el).unwrap())
    }

    #[test]
    fn test_garbage_element_gets_defaults() {
        let el = normalize_element(&json!({"x": "abc", "type": "unknown-type"}));
        assert_eq!(el.x, 0.0);
        assert_eq!(el.y, 0.0);
        assert_eq!(el.element_type, ElementType::Text);
        assert!(!el.is_placeholder);
        assert_eq!(el.width, None);
        assert!(!el.id.is_empty());
    }

    #[test]
    fn test_non_object_input() {
        for raw in [json!(null), json!(42), json!("text"), json!([1, 2])] {
            let el = normalize_element(&raw);
            assert_eq!(el.element_type, ElementType::Text);
            assert_eq!((el.x, el.y), (0.0, 0.0));
        }
    }

    #[test]
    #[allow(overflowing_literals)]
    fn test_numeric_fields() {
        let el = normalize_element(&json!({
            "id": "a",
            "x": "12.5",
            "y": 1e400,
            "width": -4,
            "height": "60",
            "opacity": 3,
            "fontSize": 0,
            "zIndex": 2.5
        }));
        assert_eq!(el.x, 12.5);
        assert_eq!(el.y, 0.0);
        assert_eq!(el.width, None);
        assert_eq!(el.height, Some(60.0));
        assert_eq!(el.style.opacity, Some(1.0));
        assert_eq!(el.style.font_size, None);
        assert_eq!(el.style.z_index, None);
    }

    #[test]
    fn test_invalid_enums_are_dropped() {
        let el = normalize_element(&json!({
            "id": "a",
            "type": "player-score",
            "textAlign": "justify",
            "textTransform": "UPPERCASE",
            "dataBinding": {"source": "ftp", "field": "elo"}
        }));
        assert_eq!(el.style.text_align, None);
        assert_eq!(el.style.text_transform, None);
        let binding = el.data_binding.unwrap();
        assert_eq!(binding.source, BindingSource::Manual);
        assert_eq!(binding.field, BindingField::Score);
    }

    #[test]
    fn test_bound_placeholder_default() {
        let el = normalize_element(&json!({"id": "a", "type": "player-name"}));
        assert!(el.is_placeholder);

        let el = normalize_element(&json!({
            "id": "a",
            "type": "player-name",
            "dataBinding": {"source": "manual", "field": "name", "manualValue": "Alice"}
        }));
        assert!(!el.is_placeholder);
    }

    #[test]
    fn test_element_idempotent() {
        let raw = json!({
            "id": "title",
            "type": "text",
            "content": 42,
            "x": "7",
            "y": 9,
            "width": 300,
            "textAlign": "center",
            "border": {"width": -1},
            "shadow": {"blur": 4, "offsetX": "2"},
            "dataBinding": {"source": "api", "seriesId": 3}
        });
        let once = normalize_element(&raw);
        assert_eq!(renormalize(&once), once);
        assert_eq!(once.content.as_deref(), Some("42"));
        assert_eq!(once.style.border.as_ref().unwrap().width, 0.0);
        assert_eq!(once.data_binding.as_ref().unwrap().series_id.as_deref(), Some("3"));
    }

    #[test]
    fn test_series_binds_base_element() {
        let spec = normalize_series(&json!({
            "id": "top",
            "type": "player-score",
            "baseElement": {"id": "base", "type": "text", "content": "x", "y": 100},
            "spacing": {"vertical": 60, "direction": "diagonal", "columns": 0},
            "maxElements": "3",
            "sortBy": "score",
            "sortOrder": "desc"
        }));
        assert_eq!(spec.base_element.element_type, ElementType::PlayerScore);
        assert_eq!(spec.base_element.content, None);
        let binding = spec.base_element.data_binding.as_ref().unwrap();
        assert_eq!(binding.source, BindingSource::Series);
        assert_eq!(binding.series_id.as_deref(), Some("top"));
        assert_eq!(binding.field, BindingField::Score);
        assert_eq!(spec.spacing.direction, Direction::Vertical);
        assert_eq!(spec.spacing.columns, None);
        assert_eq!(spec.max_elements, Some(3));
        assert_eq!(spec.sort_by, SortBy::Score);
        assert_eq!(spec.sort_order, SortOrder::Desc);

        let again = normalize_series(&serde_json::to_value(&spec).unwrap());
        assert_eq!(again, spec);
    }

    #[test]
    fn test_series_type_falls_back() {
        let spec = normalize_series(&json!({"id": "s", "type": "text"}));
        assert_eq!(spec.series_type, ElementType::PlayerName);

        let spec = normalize_series(&json!({"id": "s", "baseElement": {"type": "player-rank"}}));
        assert_eq!(spec.series_type, ElementType::PlayerRank);
    }

    #[test]
    fn test_settings_defaults() {
        let s = normalize_settings(&json!({"width": 0, "height": "720", "backgroundColor": 5}));
        assert_eq!(s.width, DEFAULT_CANVAS_WIDTH);
        assert_eq!(s.height, 720.0);
        assert_eq!(s.background_color, DEFAULT_BACKGROUND_COLOR);
    }

    #[test]
    fn test_document_repairs_ids_and_orphans() {
        let doc = normalize_document(&json!({
            "elements": [
                {"id": "a", "type": "text"},
                {"id": "a", "type": "text"},
                {"id": "a-1", "type": "text"},
                {"id": "p", "type": "player-name",
                 "dataBinding": {"source": "series", "seriesId": "missing", "manualValue": "Bob"},
                 "isPlaceholder": false},
                "not an element"
            ],
            "elementSeries": [{"id": "s1"}, {"id": "s1", "type": "player-rank"}]
        }));
        let ids: Vec<_> = doc.elements.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids[..4], ["a", "a-1", "a-1-1", "p"]);
        assert_eq!(doc.elements.len(), 5);
        assert!(doc.elements[3].is_placeholder);
        assert_eq!(doc.element_series.len(), 1);
        assert_eq!(doc.element_series[0].series_type, ElementType::PlayerName);
    }

    #[test]
    fn test_document_version() {
        assert_eq!(document_version(&json!({})), 0);
        assert_eq!(document_version(&json!({"version": "1"})), 0);
        assert_eq!(document_version(&json!({"version": 1})), 1);
    }
}
