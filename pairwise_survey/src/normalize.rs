//! Mapping of stored or received answers onto the current definition.
//!
//! Normalization never fails. Anything that cannot be mapped is dropped and
//! reported as a `NormalizationWarning`.

use log::{debug, info, warn};
use serde_json::{Map as JSMap, Value as JSValue};
use std::collections::BTreeMap;

use crate::config::*;
use crate::matrix;
use crate::registry::{MatchKind, Resolved, SchemaRegistry};
use crate::state::SectionResponseState;

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum NoteSeverity {
    /// The value was mapped, but not verbatim.
    Info,
    /// The value was dropped.
    Warning,
}

/// Something the normalizer could not map exactly.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct NormalizationWarning {
    /// `None` for problems with the blob as a whole.
    pub section_key: Option<String>,
    /// The source field, e.g. `most` or `comparisonsMostVsOther.b`.
    pub field: String,
    pub message: String,
    pub severity: NoteSeverity,
}

impl NormalizationWarning {
    pub fn is_warning(&self) -> bool {
        self.severity == NoteSeverity::Warning
    }
}

/// The outcome of a normalization: one state per section of the current
/// definition, plus the notes.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct NormalizedResponses {
    pub responses: BTreeMap<String, SectionResponseState>,
    pub warnings: Vec<NormalizationWarning>,
}

impl NormalizedResponses {
    /// Only the notes of warning severity.
    pub fn dropped(&self) -> impl Iterator<Item = &NormalizationWarning> {
        self.warnings.iter().filter(|w| w.is_warning())
    }
}

struct Notes<'a> {
    section_key: &'a str,
    out: &'a mut Vec<NormalizationWarning>,
}

impl<'a> Notes<'a> {
    fn push(&mut self, field: &str, message: String, severity: NoteSeverity) {
        match severity {
            NoteSeverity::Info => info!(
                "normalize_section: {}.{}: {}",
                self.section_key, field, message
            ),
            NoteSeverity::Warning => warn!(
                "normalize_section: {}.{}: {}",
                self.section_key, field, message
            ),
        }
        self.out.push(NormalizationWarning {
            section_key: Some(self.section_key.to_string()),
            field: field.to_string(),
            message,
            severity,
        });
    }

    fn dropped(&mut self, field: &str, raw: &JSValue, what: &str) {
        self.push(
            field,
            format!("could not map {} {}", what, raw),
            NoteSeverity::Warning,
        )
    }

    // Notes fuzzy or ambiguous label resolutions.
    fn resolved(&mut self, field: &str, raw: &str, r: &Resolved) {
        if r.ambiguous {
            self.push(
                field,
                format!(
                    "label {:?} is shared by several declarations, using {:?}",
                    raw, r.id
                ),
                NoteSeverity::Info,
            );
        } else if r.matched == MatchKind::FoldedLabel {
            self.push(
                field,
                format!("mapped {:?} to {:?} by its label", raw, r.id),
                NoteSeverity::Info,
            );
        }
    }
}

fn text(v: &JSValue) -> Option<&str> {
    v.as_str().filter(|s| !s.is_empty())
}

fn resolve_item(
    registry: &SchemaRegistry,
    section_key: &str,
    field: &str,
    raw: &JSValue,
    notes: &mut Notes,
) -> Option<String> {
    let res = text(raw).and_then(|s| {
        let r = registry.resolve_item(section_key, s)?;
        notes.resolved(field, s, &r);
        Some(r.id)
    });
    if res.is_none() {
        notes.dropped(field, raw, "item");
    }
    res
}

fn resolve_scale(
    registry: &SchemaRegistry,
    field: &str,
    raw: &JSValue,
    notes: &mut Notes,
) -> Option<String> {
    let res = text(raw).and_then(|s| {
        let r = registry.resolve_scale(s)?;
        notes.resolved(field, s, &r);
        Some(r.id)
    });
    if res.is_none() {
        notes.dropped(field, raw, "scale option");
    }
    res
}

// The first non-empty value among the given field names.
fn primary<'b>(
    entry: &'b JSMap<String, JSValue>,
    names: &[&'static str],
) -> Option<(&'static str, &'b JSValue)> {
    names.iter().find_map(|name| {
        entry
            .get(*name)
            .filter(|v| !(v.is_null() || v.as_str() == Some("")))
            .map(|v| (*name, v))
    })
}

fn normalize_section(
    registry: &SchemaRegistry,
    section: &Section,
    entry: &JSMap<String, JSValue>,
    notes: &mut Notes,
) -> SectionResponseState {
    let mut st = SectionResponseState::default();

    // Step 1: the extremes.
    if let Some((field, raw)) = primary(entry, &["mostItemId", "most"]) {
        st.most_item_id = resolve_item(registry, &section.key, field, raw, notes);
    }
    if let Some((field, raw)) = primary(entry, &["leastItemId", "least"]) {
        st.least_item_id = resolve_item(registry, &section.key, field, raw, notes);
    }

    // Step 2: the "others" lists.
    if let (Some(most), Some(least)) = (&st.most_item_id, &st.least_item_id) {
        if let Ok(m) = matrix::comparison_matrix(section, most, least) {
            st.others_for_most = m.others_for_most;
            st.others_for_least = m.others_for_least;
        }
    }
    for (direction, field) in [
        (Direction::MostVsOther, "othersForMost"),
        (Direction::OtherVsLeast, "othersForLeast"),
    ] {
        if let Some(supplied) = entry.get(field).and_then(|v| v.as_array()) {
            let resolved: Vec<String> = supplied
                .iter()
                .enumerate()
                .filter_map(|(idx, raw)| {
                    resolve_item(
                        registry,
                        &section.key,
                        &format!("{}[{}]", field, idx),
                        raw,
                        notes,
                    )
                })
                .collect();
            if !resolved.is_empty() {
                match direction {
                    Direction::MostVsOther => st.others_for_most = resolved,
                    Direction::OtherVsLeast => st.others_for_least = resolved,
                }
            }
        }
    }

    // Step 3: the structured comparison maps.
    for direction in [Direction::MostVsOther, Direction::OtherVsLeast] {
        let field = direction.field_name();
        match entry.get(field) {
            None | Some(JSValue::Null) => {}
            Some(JSValue::Object(map)) => {
                for (other, scale) in map.iter() {
                    let path = format!("{}.{}", field, other);
                    let other_id =
                        resolve_item(registry, &section.key, &path, &JSValue::from(other.as_str()), notes);
                    let scale_id = resolve_scale(registry, &path, scale, notes);
                    if let (Some(o), Some(s)) = (other_id, scale_id) {
                        st.answers_mut(direction).insert(o, s);
                    }
                }
            }
            Some(other) => notes.dropped(field, other, "comparison map"),
        }
    }

    // Step 4: positional answers fill the gaps.
    for direction in [Direction::MostVsOther, Direction::OtherVsLeast] {
        let prefix = direction.legacy_prefix();
        let others = st.others(direction).to_vec();
        for (key, raw) in entry.iter() {
            let idx = match key.strip_prefix(prefix).and_then(|s| s.parse::<usize>().ok()) {
                Some(idx) => idx,
                None => continue,
            };
            if text(raw).is_none() {
                continue;
            }
            let other = match others.get(idx) {
                Some(other) => other,
                None => {
                    notes.dropped(key, raw, "positional answer");
                    continue;
                }
            };
            if st.answers(direction).contains_key(other) {
                debug!(
                    "normalize_section: {}.{} ignored, {:?} is already answered",
                    section.key, key, other
                );
                continue;
            }
            if let Some(scale_id) = resolve_scale(registry, key, raw, notes) {
                st.answers_mut(direction).insert(other.clone(), scale_id);
            }
        }
    }

    st
}

/// Maps a response blob (`sectionKey -> entry`) onto the current definition.
///
/// Entries may use the current field names (`mostItemId`, ...) or the older
/// ones (`most`, `least`, `comp_most_<i>`, `comp_least_<i>`); ids and labels
/// are both accepted. Every section of the definition is present in the
/// result.
pub fn normalize_responses(registry: &SchemaRegistry, raw: &JSValue) -> NormalizedResponses {
    let mut res = NormalizedResponses::default();
    let empty = JSMap::new();
    let raw_map = match raw {
        JSValue::Object(m) => m,
        JSValue::Null => &empty,
        other => {
            warn!("normalize_responses: responses is not an object: {}", other);
            res.warnings.push(NormalizationWarning {
                section_key: None,
                field: "responses".to_string(),
                message: "responses is not an object, nothing restored".to_string(),
                severity: NoteSeverity::Warning,
            });
            &empty
        }
    };

    for key in raw_map.keys() {
        if registry.section(key).is_none() {
            warn!("normalize_responses: unknown section {:?} dropped", key);
            res.warnings.push(NormalizationWarning {
                section_key: Some(key.clone()),
                field: key.clone(),
                message: format!("section {:?} is not part of the current survey", key),
                severity: NoteSeverity::Warning,
            });
        }
    }

    for section in registry.sections() {
        let mut notes = Notes {
            section_key: &section.key,
            out: &mut res.warnings,
        };
        let st = match raw_map.get(&section.key) {
            None | Some(JSValue::Null) => SectionResponseState::default(),
            Some(JSValue::Object(entry)) => normalize_section(registry, section, entry, &mut notes),
            Some(other) => {
                notes.dropped(&section.key, other, "section entry");
                SectionResponseState::default()
            }
        };
        res.responses.insert(section.key.clone(), st);
    }

    debug!(
        "normalize_responses: {} sections, {} notes",
        res.responses.len(),
        res.warnings.len()
    );
    res
}
