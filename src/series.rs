//! # Series Generator
//!
//! Expands a [`SeriesSpec`]'s template element into one positioned element
//! per ranked record.
//!
//! Generation is a pure function of `(spec, records)`: ids are derived from
//! the series id and the record's position, sorting is stable, and nothing
//! reads the clock or a random source. Regenerating on every preview refresh
//! therefore yields identical elements when nothing changed.
//!
//! ```
//! use easel::document::{SeriesSpec, SortBy, SortOrder, Element, ElementType};
//! use easel::series::{generate, Record};
//!
//! let mut spec = SeriesSpec::for_element("top", Element::editor_default(ElementType::PlayerName, "base"));
//! spec.sort_by = SortBy::Score;
//! spec.sort_order = SortOrder::Desc;
//!
//! let records = vec![Record::new("a", "Ana", 90.0, 2), Record::new("b", "Bo", 95.0, 1)];
//! let elements = generate(&spec, &records).unwrap();
//! assert_eq!(elements[0].id, "top-0");
//! assert_eq!(elements[0].data_binding.as_ref().unwrap().manual_value.as_deref(), Some("Bo"));
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::config::DEFAULT_GRID_COLUMNS;
use crate::document::normalize::normalize_element;
use crate::document::{
    BindingField, BindingSource, DataBinding, Direction, Element, SeriesSpec, SortBy, SortOrder,
};
use crate::error::SeriesError;

/// A ranked participant as returned by the preview data provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub name: String,
    pub total_score: f64,
    pub standing_rank: u32,
    #[serde(default)]
    pub per_round_scores: BTreeMap<String, f64>,
}

impl Record {
    pub fn new(id: impl Into<String>, name: impl Into<String>, total_score: f64, standing_rank: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            total_score,
            standing_rank,
            per_round_scores: BTreeMap::new(),
        }
    }

    pub fn with_round(mut self, round_id: impl Into<String>, score: f64) -> Self {
        self.per_round_scores.insert(round_id.into(), score);
        self
    }

    /// Per-round score when `round_id` is given and recorded, else the total.
    pub fn score(&self, round_id: Option<&str>) -> f64 {
        round_id
            .and_then(|r| self.per_round_scores.get(r))
            .copied()
            .unwrap_or(self.total_score)
    }

    /// Displayed text for `field`.
    pub fn field_text(&self, field: BindingField, round_id: Option<&str>) -> String {
        match field {
            BindingField::Name => self.name.clone(),
            BindingField::Score => self.score(round_id).to_string(),
            BindingField::Rank => self.standing_rank.to_string(),
        }
    }
}

/// Compare two records on `sort_by`, ascending.
pub fn compare_records(a: &Record, b: &Record, sort_by: SortBy, round_id: Option<&str>) -> Ordering {
    match sort_by {
        SortBy::Score => a.score(round_id).total_cmp(&b.score(round_id)),
        SortBy::Name => a.name.cmp(&b.name),
        SortBy::Rank => a.standing_rank.cmp(&b.standing_rank),
    }
}

/// Order records the way a series wants them. Ties keep input order.
pub fn sort_records(
    records: &mut [Record],
    sort_by: SortBy,
    sort_order: SortOrder,
    round_id: Option<&str>,
) {
    records.sort_by(|a, b| {
        let ord = compare_records(a, b, sort_by, round_id);
        match sort_order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
}

fn validate(records: &[Record], round_id: Option<&str>) -> Result<(), SeriesError> {
    for (index, record) in records.iter().enumerate() {
        let invalid = |message: &str| SeriesError::InvalidRecord {
            index,
            id: record.id.clone(),
            message: message.to_string(),
        };
        if record.id.is_empty() {
            return Err(invalid("empty id"));
        }
        if !record.total_score.is_finite() {
            return Err(invalid("total score is not finite"));
        }
        if !record.score(round_id).is_finite() {
            return Err(invalid("round score is not finite"));
        }
    }
    Ok(())
}

/// Offset of the `index`-th generated element from the base position.
fn offset(spec: &SeriesSpec, index: usize, default_columns: u32) -> (f64, f64) {
    let spacing = &spec.spacing;
    let i = index as f64;
    match spacing.direction {
        Direction::Horizontal => (i * spacing.horizontal, 0.0),
        Direction::Vertical => (0.0, i * spacing.vertical),
        Direction::Grid => {
            let columns = spacing.columns.unwrap_or(default_columns).max(1) as usize;
            let col = (index % columns) as f64;
            let row = (index / columns) as f64;
            (col * spacing.horizontal, row * spacing.vertical)
        }
    }
}

/// Id of the `index`-th element generated for `series_id`.
pub fn element_id(series_id: &str, index: usize) -> String {
    format!("{}-{}", series_id, index)
}

/// Expand `spec` against `records` using the default grid column count.
pub fn generate(spec: &SeriesSpec, records: &[Record]) -> Result<Vec<Element>, SeriesError> {
    generate_with_columns(spec, records, DEFAULT_GRID_COLUMNS)
}

/// Expand `spec` against `records`.
///
/// With generation disabled or no records, the result is the base element
/// alone. Otherwise records are sorted, truncated to `max_elements`, and
/// each becomes a clone of the base element offset along the series
/// direction, carrying the record's value in `dataBinding.manualValue`.
pub fn generate_with_columns(
    spec: &SeriesSpec,
    records: &[Record],
    default_columns: u32,
) -> Result<Vec<Element>, SeriesError> {
    if !spec.auto_generate || records.is_empty() {
        return Ok(vec![spec.base_element.clone()]);
    }

    let round_id = spec.round_id.as_deref();
    validate(records, round_id)?;

    let mut sorted = records.to_vec();
    sort_records(&mut sorted, spec.sort_by, spec.sort_order, round_id);
    if let Some(max) = spec.max_elements {
        sorted.truncate(max as usize);
    }

    let base = &spec.base_element;
    let field = base
        .data_binding
        .as_ref()
        .map(|b| b.field)
        .unwrap_or_else(|| spec.series_type.default_field());
    let fallback_text = base
        .data_binding
        .as_ref()
        .and_then(|b| b.fallback_text.clone());

    let elements = sorted
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let (dx, dy) = offset(spec, index, default_columns);
            let mut el = base.clone();
            el.id = element_id(&spec.id, index);
            el.x = base.x + dx;
            el.y = base.y + dy;
            el.is_placeholder = false;
            el.data_binding = Some(DataBinding {
                source: BindingSource::Series,
                field,
                series_id: Some(spec.id.clone()),
                manual_value: Some(record.field_text(field, round_id)),
                fallback_text: fallback_text.clone(),
            });
            renormalize(el)
        })
        .collect();

    Ok(elements)
}

/// Pass a constructed element back through the normalizer.
fn renormalize(el: Element) -> Element {
    match serde_json::to_value(&el) {
        Ok(value) => normalize_element(&value),
        Err(_) => el,
    }
}
