//! # Canvas Document Model
//!
//! The full editable state of one broadcast graphic: positioned elements,
//! the series specs that generate data-bound elements, canvas settings, the
//! background image and the live-preview configuration.
//!
//! A document is plain data. It is decoded from JSON through the
//! [`normalize`] module (never trusted as well-formed), transformed by the
//! pure functions in [`edit`], and serialized with a schema version.
//!
//! ```
//! use easel::document::CanvasDocument;
//!
//! // Unversioned, partially-typed input is accepted and repaired.
//! let doc = CanvasDocument::from_json(r#"{"elements": [{"id": "t", "x": "12"}]}"#).unwrap();
//! assert_eq!(doc.elements[0].x, 12.0);
//!
//! let json = doc.to_json().unwrap();
//! assert!(json.contains(r#""version":1"#));
//! ```

pub mod edit;
pub mod normalize;
pub mod types;

pub use edit::Edit;
pub use normalize::{normalize_document, normalize_element};
pub use types::*;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Schema version written by [`CanvasDocument::to_json`].
pub const CURRENT_VERSION: u32 = 1;

/// The authoritative document state.
///
/// Invariants (established by [`normalize_document`], kept by [`edit`]):
/// element ids are unique, and an element bound to a series id that is not
/// in `element_series` is a placeholder.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(from = "Value")]
pub struct CanvasDocument {
    pub elements: Vec<Element>,
    pub element_series: Vec<SeriesSpec>,
    pub settings: Settings,
    pub background_image: Option<String>,
    pub preview_config: PreviewConfig,
}

impl From<Value> for CanvasDocument {
    fn from(raw: Value) -> Self {
        normalize_document(&raw)
    }
}

impl Serialize for CanvasDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Versioned<'a> {
            version: u32,
            elements: &'a [Element],
            element_series: &'a [SeriesSpec],
            settings: &'a Settings,
            background_image: &'a Option<String>,
            preview_config: &'a PreviewConfig,
        }

        Versioned {
            version: CURRENT_VERSION,
            elements: &self.elements,
            element_series: &self.element_series,
            settings: &self.settings,
            background_image: &self.background_image,
            preview_config: &self.preview_config,
        }
        .serialize(serializer)
    }
}

impl CanvasDocument {
    /// Create an empty document with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and normalize a serialized document.
    ///
    /// Only syntactically invalid JSON is an error; any well-formed JSON
    /// value normalizes to some document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: Value = serde_json::from_str(json)?;
        Ok(normalize_document(&raw))
    }

    /// Serialize with the current schema version.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn series(&self, id: &str) -> Option<&SeriesSpec> {
        self.element_series.iter().find(|s| s.id == id)
    }

    /// Elements generated by (or standing in for) the given series.
    pub fn series_elements<'a>(&'a self, series_id: &'a str) -> impl Iterator<Item = &'a Element> {
        self.elements
            .iter()
            .filter(move |e| e.series_id() == Some(series_id))
    }

    /// Elements whose series binding points at a series that does not exist.
    pub fn orphaned_elements(&self) -> impl Iterator<Item = &Element> {
        self.elements
            .iter()
            .filter(|e| e.series_id().is_some_and(|sid| self.series(sid).is_none()))
    }

    /// Text a renderer should show for `element` within this document.
    pub fn display_text(&self, element: &Element) -> String {
        let series_exists = element
            .series_id()
            .is_none_or(|sid| self.series(sid).is_some());
        element.display_text(series_exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> CanvasDocument {
        CanvasDocument::from_json(
            &json!({
                "version": 1,
                "elements": [
                    {"id": "title", "type": "text", "content": "Standings", "x": 40, "y": 20},
                    {"id": "p0", "type": "player-name", "x": 40, "y": 100,
                     "dataBinding": {"source": "series", "field": "name", "seriesId": "players"}}
                ],
                "elementSeries": [
                    {"id": "players", "type": "player-name",
                     "baseElement": {"id": "p0", "type": "player-name", "x": 40, "y": 100}}
                ],
                "settings": {"width": 1280, "height": 720, "backgroundColor": "#101010"},
                "backgroundImage": "https://cdn.example/bg.png",
                "previewConfig": {"enabled": true, "sourceId": "event-7", "sortBy": "score", "sortOrder": "desc"}
            })
            .to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_serialize_roundtrip_is_stable() {
        let doc = sample();
        let again = CanvasDocument::from_json(&doc.to_json().unwrap()).unwrap();
        assert_eq!(again, doc);
    }

    #[test]
    fn test_serialized_keys() {
        let value = serde_json::to_value(sample()).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            [
                "backgroundImage",
                "elementSeries",
                "elements",
                "previewConfig",
                "settings",
                "version"
            ]
        );
    }

    #[test]
    fn test_serde_deserialize_normalizes() {
        let doc: CanvasDocument =
            serde_json::from_str(r#"{"settings": {"width": "wide"}, "elements": 7}"#).unwrap();
        assert_eq!(doc.settings.width, DEFAULT_CANVAS_WIDTH);
        assert!(doc.elements.is_empty());
    }

    #[test]
    fn test_orphaned_elements_display_placeholder() {
        let mut doc = sample();
        doc.element_series.clear();
        let orphans: Vec<_> = doc.orphaned_elements().map(|e| e.id.as_str()).collect();
        assert_eq!(orphans, ["p0"]);
        let p0 = doc.element("p0").unwrap();
        assert_eq!(doc.display_text(p0), "Player Name");
    }

    #[test]
    fn test_series_elements() {
        let doc = sample();
        let ids: Vec<_> = doc.series_elements("players").map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["p0"]);
    }
}
