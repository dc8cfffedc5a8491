//! Element, series and settings types for the canvas document model.
//!
//! All types serialize with camelCase keys. Deserialization of every
//! top-level type goes through the normalizer (`#[serde(from = "Value")]`),
//! so a value read from JSON is always fully typed and defaulted; there is no
//! code path that deserializes an element without normalizing it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::normalize;

/// Dimensions assumed for an element that has no explicit width/height.
pub const DEFAULT_ELEMENT_WIDTH: f64 = 200.0;
pub const DEFAULT_ELEMENT_HEIGHT: f64 = 50.0;

pub const DEFAULT_CANVAS_WIDTH: f64 = 1920.0;
pub const DEFAULT_CANVAS_HEIGHT: f64 = 1080.0;
pub const DEFAULT_BACKGROUND_COLOR: &str = "transparent";

pub const DEFAULT_FONT_FAMILY: &str = "Inter";
pub const DEFAULT_FONT_SIZE: f64 = 32.0;
pub const DEFAULT_TEXT_COLOR: &str = "#ffffff";

/// Default series spacing: one default element plus a 10px gutter.
pub const DEFAULT_SERIES_HORIZONTAL_SPACING: f64 = DEFAULT_ELEMENT_WIDTH + 10.0;
pub const DEFAULT_SERIES_VERTICAL_SPACING: f64 = DEFAULT_ELEMENT_HEIGHT + 10.0;

// ============================================================================
// ELEMENT TYPES
// ============================================================================

/// What an element shows. `Text` is static; the others are bound to a field
/// of a ranked record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementType {
    #[default]
    Text,
    PlayerName,
    PlayerScore,
    PlayerRank,
}

impl ElementType {
    pub const ALL: [ElementType; 4] = [
        ElementType::Text,
        ElementType::PlayerName,
        ElementType::PlayerScore,
        ElementType::PlayerRank,
    ];

    /// True for types whose value comes from a ranked record.
    pub fn is_bound(self) -> bool {
        !matches!(self, ElementType::Text)
    }

    /// The record field a bound element of this type displays.
    pub fn default_field(self) -> BindingField {
        match self {
            ElementType::Text | ElementType::PlayerName => BindingField::Name,
            ElementType::PlayerScore => BindingField::Score,
            ElementType::PlayerRank => BindingField::Rank,
        }
    }

    /// Text shown while no record value is available.
    pub fn default_placeholder(self) -> &'static str {
        match self {
            ElementType::Text => "",
            ElementType::PlayerName => "Player Name",
            ElementType::PlayerScore => "0",
            ElementType::PlayerRank => "#",
        }
    }

    /// Human-readable display label.
    pub fn label(self) -> &'static str {
        match self {
            ElementType::Text => "Text",
            ElementType::PlayerName => "Player Name",
            ElementType::PlayerScore => "Player Score",
            ElementType::PlayerRank => "Player Rank",
        }
    }
}

// ============================================================================
// STYLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextTransform {
    None,
    Uppercase,
    Lowercase,
    Capitalize,
}

impl TextTransform {
    pub fn apply(self, text: &str) -> String {
        match self {
            TextTransform::None => text.to_string(),
            TextTransform::Uppercase => text.to_uppercase(),
            TextTransform::Lowercase => text.to_lowercase(),
            TextTransform::Capitalize => text
                .split(' ')
                .map(|word| {
                    let mut chars = word.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().chain(chars).collect(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Border {
    pub width: f64,
    pub color: String,
    pub radius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shadow {
    pub color: String,
    pub blur: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

/// Visual attributes of an element. `None` means "renderer default".
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    /// CSS-style weight ("bold", "600", ...). Passed through verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_align: Option<TextAlign>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_transform: Option<TextTransform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border: Option<Border>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadow: Option<Shadow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub letter_spacing: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_height: Option<f64>,
    /// 0.0 (transparent) to 1.0 (opaque).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    /// Degrees, clockwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
}

// ============================================================================
// DATA BINDING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingSource {
    #[default]
    Manual,
    Series,
    Dataset,
    Api,
}

/// Record field a bound element displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingField {
    #[default]
    Name,
    Score,
    Rank,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataBinding {
    pub source: BindingSource,
    pub field: BindingField,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_id: Option<String>,
    /// Resolved text (typed by the user, or written by series generation).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_text: Option<String>,
}

impl DataBinding {
    pub fn manual(field: BindingField) -> Self {
        Self {
            source: BindingSource::Manual,
            field,
            series_id: None,
            manual_value: None,
            fallback_text: None,
        }
    }

    pub fn series(field: BindingField, series_id: impl Into<String>) -> Self {
        Self {
            source: BindingSource::Series,
            series_id: Some(series_id.into()),
            ..Self::manual(field)
        }
    }
}

// ============================================================================
// ELEMENT
// ============================================================================

/// One positioned, styled unit on the canvas.
///
/// Invariant: `x`, `y`, and every `Some` numeric field are finite; sizes are
/// strictly positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "Value")]
pub struct Element {
    pub id: String,
    #[serde(rename = "type")]
    pub element_type: ElementType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder_text: Option<String>,
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(flatten)]
    pub style: ElementStyle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_binding: Option<DataBinding>,
    pub is_placeholder: bool,
}

impl From<Value> for Element {
    fn from(raw: Value) -> Self {
        normalize::normalize_element(&raw)
    }
}

impl Element {
    /// Starter element for the editor: example content and a styled default.
    pub fn editor_default(element_type: ElementType, id: impl Into<String>) -> Self {
        let data_binding = element_type
            .is_bound()
            .then(|| DataBinding::manual(element_type.default_field()));
        Self {
            id: id.into(),
            element_type,
            content: (!element_type.is_bound()).then(|| "Text".to_string()),
            placeholder_text: element_type
                .is_bound()
                .then(|| element_type.default_placeholder().to_string()),
            x: 0.0,
            y: 0.0,
            width: Some(DEFAULT_ELEMENT_WIDTH),
            height: Some(DEFAULT_ELEMENT_HEIGHT),
            style: ElementStyle {
                font_family: Some(DEFAULT_FONT_FAMILY.into()),
                font_size: Some(DEFAULT_FONT_SIZE),
                color: Some(DEFAULT_TEXT_COLOR.into()),
                ..Default::default()
            },
            data_binding,
            is_placeholder: element_type.is_bound(),
        }
    }

    /// Width used for layout and snapping.
    pub fn effective_width(&self) -> f64 {
        self.width.unwrap_or(DEFAULT_ELEMENT_WIDTH)
    }

    /// Height used for layout and snapping.
    pub fn effective_height(&self) -> f64 {
        self.height.unwrap_or(DEFAULT_ELEMENT_HEIGHT)
    }

    /// Series this element belongs to, if any.
    pub fn series_id(&self) -> Option<&str> {
        self.data_binding.as_ref()?.series_id.as_deref()
    }

    /// Text a renderer should show for this element.
    ///
    /// `series_exists` reports whether the element's series is present in
    /// the document; orphaned series elements always show their placeholder.
    pub fn display_text(&self, series_exists: bool) -> String {
        let raw = self.resolve_raw_text(series_exists);
        match self.style.text_transform {
            Some(t) => t.apply(&raw),
            None => raw,
        }
    }

    fn resolve_raw_text(&self, series_exists: bool) -> String {
        let placeholder = || {
            self.placeholder_text
                .clone()
                .unwrap_or_else(|| self.element_type.default_placeholder().to_string())
        };

        if let Some(binding) = &self.data_binding {
            if binding.series_id.is_some() && !series_exists {
                return placeholder();
            }
            if let Some(value) = &binding.manual_value {
                return value.clone();
            }
            if let Some(fallback) = &binding.fallback_text {
                return fallback.clone();
            }
        }

        if self.element_type.is_bound() || self.is_placeholder {
            return placeholder();
        }
        self.content.clone().unwrap_or_default()
    }
}

// ============================================================================
// SERIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Horizontal,
    #[default]
    Vertical,
    Grid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Spacing {
    pub horizontal: f64,
    pub vertical: f64,
    pub direction: Direction,
    /// Column count for `Direction::Grid`. `None` uses the engine default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<u32>,
}

impl Default for Spacing {
    fn default() -> Self {
        Self {
            horizontal: DEFAULT_SERIES_HORIZONTAL_SPACING,
            vertical: DEFAULT_SERIES_VERTICAL_SPACING,
            direction: Direction::Vertical,
            columns: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    Score,
    Name,
    #[default]
    Rank,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Expands one template element into many, bound to ranked records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "Value")]
pub struct SeriesSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub series_type: ElementType,
    pub base_element: Element,
    pub spacing: Spacing,
    pub auto_generate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_elements: Option<u32>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_id: Option<String>,
}

impl From<Value> for SeriesSpec {
    fn from(raw: Value) -> Self {
        normalize::normalize_series(&raw)
    }
}

impl SeriesSpec {
    /// Series owning `base_element`, with default spacing and sorting.
    pub fn for_element(id: impl Into<String>, base_element: Element) -> Self {
        let id = id.into();
        let series_type = if base_element.element_type.is_bound() {
            base_element.element_type
        } else {
            ElementType::PlayerName
        };
        let mut spec = Self {
            id,
            series_type,
            base_element,
            spacing: Spacing::default(),
            auto_generate: true,
            max_elements: None,
            sort_by: SortBy::default(),
            sort_order: SortOrder::default(),
            round_id: None,
        };
        normalize::bind_base_element(&mut spec);
        spec
    }
}

// ============================================================================
// DOCUMENT SETTINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "Value")]
pub struct Settings {
    pub width: f64,
    pub height: f64,
    pub background_color: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            width: DEFAULT_CANVAS_WIDTH,
            height: DEFAULT_CANVAS_HEIGHT,
            background_color: DEFAULT_BACKGROUND_COLOR.to_string(),
        }
    }
}

impl From<Value> for Settings {
    fn from(raw: Value) -> Self {
        normalize::normalize_settings(&raw)
    }
}

/// Where live preview data comes from and how it is ordered.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "Value")]
pub struct PreviewConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_id: Option<String>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_records: Option<u32>,
}

impl From<Value> for PreviewConfig {
    fn from(raw: Value) -> Self {
        normalize::normalize_preview_config(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_text_prefers_bound_value() {
        let mut el = Element::editor_default(ElementType::PlayerScore, "s");
        assert_eq!(el.display_text(true), "0");

        el.data_binding = Some(DataBinding {
            manual_value: Some("120".into()),
            ..DataBinding::series(BindingField::Score, "series-1")
        });
        assert_eq!(el.display_text(true), "120");
    }

    #[test]
    fn test_display_text_orphaned_series_shows_placeholder() {
        let mut el = Element::editor_default(ElementType::PlayerName, "n");
        el.data_binding = Some(DataBinding {
            manual_value: Some("Alice".into()),
            ..DataBinding::series(BindingField::Name, "gone")
        });
        assert_eq!(el.display_text(false), "Player Name");
    }

    #[test]
    fn test_display_text_transform() {
        let mut el = Element::editor_default(ElementType::Text, "t");
        el.content = Some("final round".into());
        el.style.text_transform = Some(TextTransform::Capitalize);
        assert_eq!(el.display_text(true), "Final Round");
        el.style.text_transform = Some(TextTransform::Uppercase);
        assert_eq!(el.display_text(true), "FINAL ROUND");
    }

    #[test]
    fn test_element_type_serde_names() {
        assert_eq!(
            serde_json::to_value(ElementType::PlayerScore).unwrap(),
            serde_json::json!("player-score")
        );
    }
}
