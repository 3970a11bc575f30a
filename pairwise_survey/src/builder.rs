pub use crate::config::*;
use crate::registry::{SchemaError, SchemaRegistry};

/// A builder for survey definitions.
///
/// Mostly useful for tests and for embedding a definition in code; the
/// usual path is to load the definition from JSON.
///
/// ```
/// use pairwise_survey::builder::SchemaBuilder;
/// use pairwise_survey::{SchemaError, SectionKind};
///
/// let registry = SchemaBuilder::new("bw_online_survey", "2026-02")
///     .scale("slightly_more", "Slightly more challenging")
///     .scale("extremely_more", "Extremely more challenging")
///     .section("economic", "Economic Barriers", SectionKind::Sub,
///              &[("cost", "High cost"), ("risk", "High financial risk")])
///     .build()?;
///
/// assert!(registry.has_item("economic", "risk"));
///
/// # Ok::<(), SchemaError>(())
/// ```
pub struct SchemaBuilder {
    pub(crate) _snapshot: SchemaSnapshot,
}

impl SchemaBuilder {
    pub fn new(survey_id: &str, survey_version: &str) -> SchemaBuilder {
        SchemaBuilder {
            _snapshot: SchemaSnapshot {
                schema_version: MIN_SCHEMA_VERSION,
                survey_id: survey_id.to_string(),
                survey_version: survey_version.to_string(),
                sections: Vec::new(),
                scale_options: Vec::new(),
            },
        }
    }

    pub fn schema_version(mut self, version: u32) -> SchemaBuilder {
        self._snapshot.schema_version = version;
        self
    }

    /// Appends one rung to the scale. Rungs keep the order of the calls.
    pub fn scale(mut self, id: &str, label: &str) -> SchemaBuilder {
        self._snapshot.scale_options.push(ScaleOption {
            id: id.to_string(),
            label: label.to_string(),
            help_text: None,
        });
        self
    }

    /// Appends a section. `items` are `(id, label)` pairs in display order.
    pub fn section(
        self,
        key: &str,
        title: &str,
        kind: SectionKind,
        items: &[(&str, &str)],
    ) -> SchemaBuilder {
        let items: Vec<Item> = items
            .iter()
            .map(|(id, label)| Item {
                id: id.to_string(),
                label: label.to_string(),
                description: None,
            })
            .collect();
        self.section_with_items(key, title, kind, items)
    }

    pub fn section_with_items(
        mut self,
        key: &str,
        title: &str,
        kind: SectionKind,
        items: Vec<Item>,
    ) -> SchemaBuilder {
        self._snapshot.sections.push(Section {
            key: key.to_string(),
            title: title.to_string(),
            kind,
            items,
        });
        self
    }

    /// The definition as built so far, without any check.
    pub fn snapshot(self) -> SchemaSnapshot {
        self._snapshot
    }

    pub fn build(self) -> Result<SchemaRegistry, SchemaError> {
        SchemaRegistry::new(self._snapshot)
    }
}
