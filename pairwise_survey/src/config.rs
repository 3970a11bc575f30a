// ********* Schema data structures ***********

use serde::{Deserialize, Serialize};

/// The oldest payload schema version accepted by the validator.
pub const MIN_SCHEMA_VERSION: u32 = 2;

/// Role of a section in the survey.
///
/// The main section ranks the categories themselves, sub sections rank the
/// barriers inside one category. The kind does not change any rule of the
/// state machine, it is carried along for reporting.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Main,
    Sub,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Main => "main",
            SectionKind::Sub => "sub",
        }
    }
}

/// One ranked entity within a section.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A themed group of comparable items.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub key: String,
    pub title: String,
    pub kind: SectionKind,
    pub items: Vec<Item>,
}

impl Section {
    /// The item ids, in declared order.
    pub fn item_ids(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|i| i.id.as_str())
    }

    pub fn has_item(&self, item_id: &str) -> bool {
        self.items.iter().any(|i| i.id == item_id)
    }
}

/// One rung of the ordinal "how much more challenging" scale.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ScaleOption {
    pub id: String,
    pub label: String,
    #[serde(
        rename = "helpText",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub help_text: Option<String>,
}

/// An immutable, versioned copy of the survey definition.
///
/// The same structure is used for the live definition (loaded from a JSON
/// file) and for the copy embedded in every payload.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "surveyId")]
    pub survey_id: String,
    #[serde(rename = "surveyVersion")]
    pub survey_version: String,
    pub sections: Vec<Section>,
    #[serde(rename = "scaleOptions")]
    pub scale_options: Vec<ScaleOption>,
}

impl SchemaSnapshot {
    /// The copy that travels inside payloads: descriptions and help texts
    /// are presentation details and are left out.
    pub fn embedded(&self) -> SchemaSnapshot {
        SchemaSnapshot {
            schema_version: self.schema_version,
            survey_id: self.survey_id.clone(),
            survey_version: self.survey_version.clone(),
            sections: self
                .sections
                .iter()
                .map(|s| Section {
                    key: s.key.clone(),
                    title: s.title.clone(),
                    kind: s.kind,
                    items: s
                        .items
                        .iter()
                        .map(|i| Item {
                            id: i.id.clone(),
                            label: i.label.clone(),
                            description: None,
                        })
                        .collect(),
                })
                .collect(),
            scale_options: self
                .scale_options
                .iter()
                .map(|s| ScaleOption {
                    id: s.id.clone(),
                    label: s.label.clone(),
                    help_text: None,
                })
                .collect(),
        }
    }
}

/// The two families of comparison questions in a section.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Direction {
    /// The most challenging item compared to every other item.
    MostVsOther,
    /// Every remaining item compared to the least challenging item.
    OtherVsLeast,
}

impl Direction {
    /// The name used in the comparison sheet.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::MostVsOther => "most_vs_other",
            Direction::OtherVsLeast => "other_vs_least",
        }
    }

    /// The field holding the answers of this direction in a response entry.
    pub fn field_name(&self) -> &'static str {
        match self {
            Direction::MostVsOther => "comparisonsMostVsOther",
            Direction::OtherVsLeast => "comparisonsOtherVsLeast",
        }
    }

    /// The prefix of the positional legacy fields (`comp_most_0`, ...).
    pub fn legacy_prefix(&self) -> &'static str {
        match self {
            Direction::MostVsOther => "comp_most_",
            Direction::OtherVsLeast => "comp_least_",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ******** Respondent metadata *********

/// Demographic and timing information about the respondent.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Respondent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default)]
    pub occupation: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub experience: String,
    #[serde(default)]
    pub education: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub expertise: String,
    #[serde(rename = "startTime", default)]
    pub start_time: String,
    #[serde(rename = "endTime", default)]
    pub end_time: String,
}

impl Respondent {
    /// The mandatory demographics are filled in. Expertise and the contact
    /// fields are optional.
    pub fn is_complete(&self) -> bool {
        [
            &self.occupation,
            &self.industry,
            &self.experience,
            &self.education,
            &self.country,
        ]
        .iter()
        .all(|f| !f.trim().is_empty())
    }

    /// The first mandatory field that is still blank, by its payload name.
    pub fn first_missing(&self) -> Option<&'static str> {
        [
            ("occupation", &self.occupation),
            ("industry", &self.industry),
            ("experience", &self.experience),
            ("education", &self.education),
            ("country", &self.country),
        ]
        .iter()
        .find(|(_, v)| v.trim().is_empty())
        .map(|(name, _)| *name)
    }
}

/// A select input with an "Other" escape hatch, as used for industry and
/// education.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum DemographicChoice {
    Listed(String),
    Other(String),
}

impl DemographicChoice {
    pub const OTHER: &'static str = "Other";

    /// Builds the choice from the raw select value and the free text field.
    pub fn from_inputs(choice: &str, other_text: &str) -> DemographicChoice {
        if choice == Self::OTHER {
            DemographicChoice::Other(other_text.trim().to_string())
        } else {
            DemographicChoice::Listed(choice.trim().to_string())
        }
    }

    /// The value stored in the respondent record. `None` when "Other" was
    /// picked without specifying anything.
    pub fn resolve(&self) -> Option<String> {
        match self {
            DemographicChoice::Listed(s) => Some(s.clone()),
            DemographicChoice::Other(s) if s.is_empty() => None,
            DemographicChoice::Other(s) => Some(s.clone()),
        }
    }
}

/// Information about the client that produced a submission.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientMeta {
    #[serde(rename = "userAgent", default)]
    pub user_agent: String,
    #[serde(default)]
    pub timezone: String,
    #[serde(rename = "pageUrl", default)]
    pub page_url: String,
}

/// Serde adapter mapping an unset id to the empty string, as the payloads
/// have always done.
pub(crate) mod empty_as_none {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(v.as_deref().unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let v: Option<String> = Option::deserialize(d)?;
        Ok(v.filter(|s| !s.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_snapshot_drops_presentation_fields() {
        let snap = SchemaSnapshot {
            schema_version: 2,
            survey_id: "s".to_string(),
            survey_version: "1".to_string(),
            sections: vec![Section {
                key: "econ".to_string(),
                title: "Economic".to_string(),
                kind: SectionKind::Sub,
                items: vec![Item {
                    id: "a".to_string(),
                    label: "A".to_string(),
                    description: Some("long text".to_string()),
                }],
            }],
            scale_options: vec![ScaleOption {
                id: "s1".to_string(),
                label: "Slightly".to_string(),
                help_text: Some("minor".to_string()),
            }],
        };
        let js = serde_json::to_value(snap.embedded()).unwrap();
        assert_eq!(
            js,
            serde_json::json!({
                "schemaVersion": 2,
                "surveyId": "s",
                "surveyVersion": "1",
                "sections": [{"key": "econ", "title": "Economic", "kind": "sub",
                              "items": [{"id": "a", "label": "A"}]}],
                "scaleOptions": [{"id": "s1", "label": "Slightly"}]
            })
        );
    }

    #[test]
    fn demographics_completion() {
        let mut r = Respondent {
            occupation: "Researcher".to_string(),
            industry: "Academia".to_string(),
            experience: "3-5".to_string(),
            education: "Master's".to_string(),
            country: "  ".to_string(),
            ..Respondent::default()
        };
        assert!(!r.is_complete());
        assert_eq!(r.first_missing(), Some("country"));
        r.country = "Germany".to_string();
        assert!(r.is_complete());
        assert_eq!(r.first_missing(), None);
    }

    #[test]
    fn other_choice_needs_text() {
        assert_eq!(DemographicChoice::from_inputs("Other", " ").resolve(), None);
        assert_eq!(
            DemographicChoice::from_inputs("Other", " Logistics ").resolve(),
            Some("Logistics".to_string())
        );
        assert_eq!(
            DemographicChoice::from_inputs("Academia", "ignored").resolve(),
            Some("Academia".to_string())
        );
    }
}
