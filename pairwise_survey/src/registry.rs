//! Lookup indices over an immutable survey definition.

use log::{debug, warn};
use snafu::prelude::*;
use std::collections::HashMap;

use crate::config::*;

/// A survey definition that cannot be used.
///
/// These errors are fatal for the session that tried to load the definition.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SchemaError {
    #[snafu(display("the survey definition does not declare any section"))]
    NoSections {},
    #[snafu(display("duplicate section key: {key}"))]
    DuplicateSectionKey { key: String },
    #[snafu(display("section '{section}' has no items"))]
    EmptySection { section: String },
    #[snafu(display("duplicate item id '{item}' in section '{section}'"))]
    DuplicateItemId { section: String, item: String },
    #[snafu(display("the survey definition does not declare any scale option"))]
    NoScaleOptions {},
    #[snafu(display("duplicate scale id: {id}"))]
    DuplicateScaleId { id: String },
    #[snafu(display("blank identifier in {context}"))]
    BlankIdentifier { context: String },
    #[snafu(display("cannot parse the survey definition"))]
    ParsingDefinition { source: serde_json::Error },
}

/// Trimmed, case-folded form of a label, used as the fuzzy lookup key.
pub fn normalize_label(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// How a raw reference was resolved to a declared id.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum MatchKind {
    /// The raw value is the id itself.
    Id,
    /// The raw value is the label, character for character.
    Label,
    /// The raw value matches the label only after trimming and case folding.
    FoldedLabel,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Resolved {
    pub id: String,
    pub matched: MatchKind,
    /// Several declared labels fold to the same key. The first one in
    /// declared order was picked.
    pub ambiguous: bool,
}

/// Two declarations whose labels fold to the same lookup key.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct LabelCollision {
    /// `None` for scale options.
    pub section_key: Option<String>,
    pub normalized_label: String,
    pub kept_id: String,
    pub shadowed_id: String,
}

/// Read-only indices over one `SchemaSnapshot`.
///
/// The registry owns its copy of the definition: building a registry for a
/// newer definition never affects one built earlier.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    snapshot: SchemaSnapshot,
    section_index: HashMap<String, usize>,
    // section key -> item id -> position in the section
    item_index: HashMap<String, HashMap<String, usize>>,
    // section key -> normalized label -> item id
    item_labels: HashMap<String, HashMap<String, String>>,
    scale_index: HashMap<String, usize>,
    scale_labels: HashMap<String, String>,
    collisions: Vec<LabelCollision>,
}

impl SchemaRegistry {
    pub fn new(snapshot: SchemaSnapshot) -> Result<SchemaRegistry, SchemaError> {
        ensure!(!snapshot.sections.is_empty(), NoSectionsSnafu {});
        ensure!(!snapshot.scale_options.is_empty(), NoScaleOptionsSnafu {});

        let mut collisions: Vec<LabelCollision> = Vec::new();

        let mut scale_index: HashMap<String, usize> = HashMap::new();
        let mut scale_labels: HashMap<String, String> = HashMap::new();
        for (idx, scale) in snapshot.scale_options.iter().enumerate() {
            ensure!(
                !scale.id.trim().is_empty(),
                BlankIdentifierSnafu {
                    context: format!("scale option at index {}", idx)
                }
            );
            ensure!(
                scale_index.insert(scale.id.clone(), idx).is_none(),
                DuplicateScaleIdSnafu { id: &scale.id }
            );
            let norm = normalize_label(&scale.label);
            if let Some(kept) = scale_labels.get(&norm) {
                collisions.push(LabelCollision {
                    section_key: None,
                    normalized_label: norm,
                    kept_id: kept.clone(),
                    shadowed_id: scale.id.clone(),
                });
            } else {
                scale_labels.insert(norm, scale.id.clone());
            }
        }

        let mut section_index: HashMap<String, usize> = HashMap::new();
        let mut item_index: HashMap<String, HashMap<String, usize>> = HashMap::new();
        let mut item_labels: HashMap<String, HashMap<String, String>> = HashMap::new();
        for (sidx, section) in snapshot.sections.iter().enumerate() {
            ensure!(
                !section.key.trim().is_empty(),
                BlankIdentifierSnafu {
                    context: format!("section at index {}", sidx)
                }
            );
            ensure!(
                section_index.insert(section.key.clone(), sidx).is_none(),
                DuplicateSectionKeySnafu { key: &section.key }
            );
            ensure!(
                !section.items.is_empty(),
                EmptySectionSnafu {
                    section: &section.key
                }
            );
            let mut ids: HashMap<String, usize> = HashMap::new();
            let mut labels: HashMap<String, String> = HashMap::new();
            for (iidx, item) in section.items.iter().enumerate() {
                ensure!(
                    !item.id.trim().is_empty(),
                    BlankIdentifierSnafu {
                        context: format!("item {} of section '{}'", iidx, section.key)
                    }
                );
                ensure!(
                    ids.insert(item.id.clone(), iidx).is_none(),
                    DuplicateItemIdSnafu {
                        section: &section.key,
                        item: &item.id
                    }
                );
                let norm = normalize_label(&item.label);
                if let Some(kept) = labels.get(&norm) {
                    collisions.push(LabelCollision {
                        section_key: Some(section.key.clone()),
                        normalized_label: norm,
                        kept_id: kept.clone(),
                        shadowed_id: item.id.clone(),
                    });
                } else {
                    labels.insert(norm, item.id.clone());
                }
            }
            item_index.insert(section.key.clone(), ids);
            item_labels.insert(section.key.clone(), labels);
        }

        for c in collisions.iter() {
            warn!(
                "SchemaRegistry::new: label {:?} is shared by {:?} and {:?} (section {:?}), label lookups resolve to {:?}",
                c.normalized_label, c.kept_id, c.shadowed_id, c.section_key, c.kept_id
            );
        }
        debug!(
            "SchemaRegistry::new: survey {:?} version {:?}: {} sections, {} scale options",
            snapshot.survey_id,
            snapshot.survey_version,
            snapshot.sections.len(),
            snapshot.scale_options.len()
        );

        Ok(SchemaRegistry {
            snapshot,
            section_index,
            item_index,
            item_labels,
            scale_index,
            scale_labels,
            collisions,
        })
    }

    /// Parses a JSON survey definition and indexes it.
    pub fn from_json_str(s: &str) -> Result<SchemaRegistry, SchemaError> {
        let snapshot: SchemaSnapshot = serde_json::from_str(s).context(ParsingDefinitionSnafu {})?;
        SchemaRegistry::new(snapshot)
    }

    pub fn snapshot(&self) -> &SchemaSnapshot {
        &self.snapshot
    }

    pub fn sections(&self) -> &[Section] {
        &self.snapshot.sections
    }

    pub fn section(&self, key: &str) -> Option<&Section> {
        self.section_index
            .get(key)
            .map(|idx| &self.snapshot.sections[*idx])
    }

    /// Position of the section in the declared order.
    pub fn section_position(&self, key: &str) -> Option<usize> {
        self.section_index.get(key).cloned()
    }

    pub fn item(&self, section_key: &str, item_id: &str) -> Option<&Item> {
        let section = self.section(section_key)?;
        let idx = self.item_index.get(section_key)?.get(item_id)?;
        section.items.get(*idx)
    }

    pub fn has_item(&self, section_key: &str, item_id: &str) -> bool {
        self.item(section_key, item_id).is_some()
    }

    pub fn scale_options(&self) -> &[ScaleOption] {
        &self.snapshot.scale_options
    }

    pub fn scale(&self, scale_id: &str) -> Option<&ScaleOption> {
        self.scale_index
            .get(scale_id)
            .map(|idx| &self.snapshot.scale_options[*idx])
    }

    pub fn has_scale(&self, scale_id: &str) -> bool {
        self.scale_index.contains_key(scale_id)
    }

    pub fn label_collisions(&self) -> &[LabelCollision] {
        &self.collisions
    }

    /// Resolves a reference to an item, by id first and by label second.
    pub fn resolve_item(&self, section_key: &str, raw: &str) -> Option<Resolved> {
        if raw.is_empty() {
            return None;
        }
        if self.has_item(section_key, raw) {
            return Some(Resolved {
                id: raw.to_string(),
                matched: MatchKind::Id,
                ambiguous: false,
            });
        }
        let norm = normalize_label(raw);
        let id = self.item_labels.get(section_key)?.get(&norm)?;
        let label = self.item(section_key, id).map(|i| i.label.as_str());
        Some(Resolved {
            id: id.clone(),
            matched: if label == Some(raw) {
                MatchKind::Label
            } else {
                MatchKind::FoldedLabel
            },
            ambiguous: self.collisions.iter().any(|c| {
                c.section_key.as_deref() == Some(section_key) && c.normalized_label == norm
            }),
        })
    }

    /// Resolves a reference to a scale option, by id first and by label second.
    pub fn resolve_scale(&self, raw: &str) -> Option<Resolved> {
        if raw.is_empty() {
            return None;
        }
        if self.has_scale(raw) {
            return Some(Resolved {
                id: raw.to_string(),
                matched: MatchKind::Id,
                ambiguous: false,
            });
        }
        let norm = normalize_label(raw);
        let id = self.scale_labels.get(&norm)?;
        let label = self.scale(id).map(|s| s.label.as_str());
        Some(Resolved {
            id: id.clone(),
            matched: if label == Some(raw) {
                MatchKind::Label
            } else {
                MatchKind::FoldedLabel
            },
            ambiguous: self
                .collisions
                .iter()
                .any(|c| c.section_key.is_none() && c.normalized_label == norm),
        })
    }
}
