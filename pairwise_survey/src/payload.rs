//! The JSON documents exchanged with the outside world: submissions, saved
//! progress, exports and the older fixed-layout submissions.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map as JSMap, Value as JSValue};
use std::collections::BTreeMap;

use crate::config::*;
use crate::registry::SchemaRegistry;
use crate::state::{EditBaseline, SectionResponseState};
use crate::validate::{schema_version, whole_version};

/// ISO-8601 with milliseconds and a `Z` suffix.
pub fn iso_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Stable identifier of a JSON document: the SHA-256 of its serialization
/// with sorted keys.
pub fn fingerprint(js: &JSValue) -> String {
    // serde_json maps are ordered by key, the serialization is canonical.
    sha256::digest(js.to_string())
}

fn lenient_version<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let v = match JSValue::deserialize(d)? {
        JSValue::Number(n) => n.as_f64(),
        JSValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    v.and_then(whole_version)
        .ok_or_else(|| serde::de::Error::custom("schemaVersion is not a whole positive number"))
}

/// A complete submission, as sent to the sink.
///
/// Built once at submission time. There is no way to change it afterwards.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionPayload {
    #[serde(rename = "schemaVersion", deserialize_with = "lenient_version")]
    schema_version: u32,
    #[serde(rename = "surveyId", default)]
    survey_id: String,
    #[serde(rename = "surveyVersion", default)]
    survey_version: String,
    #[serde(rename = "submittedAt", default)]
    submitted_at: String,
    #[serde(default)]
    respondent: Respondent,
    responses: BTreeMap<String, SectionResponseState>,
    #[serde(rename = "schemaSnapshot")]
    schema_snapshot: SchemaSnapshot,
    #[serde(rename = "clientMeta", default)]
    client_meta: ClientMeta,
}

impl SubmissionPayload {
    pub fn new(
        registry: &SchemaRegistry,
        respondent: Respondent,
        responses: BTreeMap<String, SectionResponseState>,
        client_meta: ClientMeta,
        submitted_at: &DateTime<Utc>,
    ) -> SubmissionPayload {
        let snapshot = registry.snapshot();
        SubmissionPayload {
            schema_version: snapshot.schema_version,
            survey_id: snapshot.survey_id.clone(),
            survey_version: snapshot.survey_version.clone(),
            submitted_at: iso_timestamp(submitted_at),
            respondent,
            responses,
            schema_snapshot: snapshot.embedded(),
            client_meta,
        }
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn survey_id(&self) -> &str {
        &self.survey_id
    }

    pub fn survey_version(&self) -> &str {
        &self.survey_version
    }

    pub fn submitted_at(&self) -> &str {
        &self.submitted_at
    }

    pub fn respondent(&self) -> &Respondent {
        &self.respondent
    }

    pub fn responses(&self) -> &BTreeMap<String, SectionResponseState> {
        &self.responses
    }

    pub fn schema_snapshot(&self) -> &SchemaSnapshot {
        &self.schema_snapshot
    }

    pub fn client_meta(&self) -> &ClientMeta {
        &self.client_meta
    }

    pub fn to_json(&self) -> JSValue {
        // Plain data with string keys only.
        serde_json::to_value(self).unwrap_or(JSValue::Null)
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.to_json())
    }
}

/// The saved progress of a session.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ProgressBlob {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "surveyId")]
    pub survey_id: String,
    #[serde(rename = "surveyVersion")]
    pub survey_version: String,
    #[serde(rename = "respondentInfo")]
    pub respondent_info: Respondent,
    pub responses: BTreeMap<String, SectionResponseState>,
    #[serde(rename = "currentPage")]
    pub current_page: usize,
    pub timestamp: String,
    /// Sections unlocked for editing when the progress was saved.
    #[serde(rename = "editBaselines", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub edit_baselines: BTreeMap<String, EditBaseline>,
}

/// The document offered for manual download: the saved progress plus the
/// definition it refers to.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ExportBlob {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "surveyId")]
    pub survey_id: String,
    #[serde(rename = "surveyVersion")]
    pub survey_version: String,
    #[serde(rename = "respondentInfo")]
    pub respondent_info: Respondent,
    pub responses: BTreeMap<String, SectionResponseState>,
    #[serde(rename = "currentPage")]
    pub current_page: usize,
    pub exported: String,
    #[serde(rename = "schemaSnapshot")]
    pub schema_snapshot: SchemaSnapshot,
}

/// Reads respondent fields from any JSON value. Missing fields and fields
/// that are not strings are left empty.
pub fn loose_respondent(js: &JSValue) -> Respondent {
    let text = |name: &str| -> String {
        js.get(name)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    };
    let opt = |name: &str| -> Option<String> { Some(text(name)).filter(|s| !s.is_empty()) };
    Respondent {
        name: opt("name"),
        email: opt("email"),
        organization: opt("organization"),
        occupation: text("occupation"),
        industry: text("industry"),
        experience: text("experience"),
        education: text("education"),
        country: text("country"),
        expertise: text("expertise"),
        start_time: text("startTime"),
        end_time: text("endTime"),
    }
}

/// A submission in the fixed layout used before versioned payloads.
#[derive(PartialEq, Debug, Clone)]
pub struct LegacyPayload {
    raw: JSValue,
    respondent: Respondent,
}

impl LegacyPayload {
    pub fn respondent(&self) -> &Respondent {
        &self.respondent
    }

    /// A string field of a section entry, empty when absent.
    pub fn field(&self, section_key: &str, name: &str) -> &str {
        self.raw
            .get("responses")
            .and_then(|r| r.get(section_key))
            .and_then(|s| s.get(name))
            .and_then(|v| v.as_str())
            .unwrap_or("")
    }

    /// The section entries, keyed by section.
    pub fn responses(&self) -> Option<&JSMap<String, JSValue>> {
        self.raw.get("responses").and_then(|r| r.as_object())
    }

    pub fn raw(&self) -> &JSValue {
        &self.raw
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.raw)
    }
}

/// The two shapes accepted at the ingestion boundary.
#[derive(PartialEq, Debug, Clone)]
pub enum IncomingPayload {
    /// A versioned payload. It still has to be validated.
    V2(JSValue),
    Legacy(LegacyPayload),
}

impl IncomingPayload {
    /// Tells the shapes apart: a versioned payload has a numeric
    /// `schemaVersion` of at least 2 and an object `responses`. Everything
    /// else that is an object is treated as legacy. Returns `None` for
    /// documents that are not objects.
    pub fn detect(js: JSValue) -> Option<IncomingPayload> {
        let obj = js.as_object()?;
        let versioned = schema_version(&js).map(|v| v >= MIN_SCHEMA_VERSION).unwrap_or(false)
            && obj.get("responses").map(|r| r.is_object()).unwrap_or(false);
        if versioned {
            Some(IncomingPayload::V2(js))
        } else {
            let respondent = js
                .get("respondent")
                .map(loose_respondent)
                .unwrap_or_default();
            Some(IncomingPayload::Legacy(LegacyPayload {
                raw: js,
                respondent,
            }))
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            IncomingPayload::V2(_) => "v2",
            IncomingPayload::Legacy(_) => "legacy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SchemaBuilder;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn detection() {
        let v2 = json!({"schemaVersion": 2, "responses": {}});
        assert_eq!(IncomingPayload::detect(v2).map(|p| p.mode()), Some("v2"));
        let v2_str = json!({"schemaVersion": "3", "responses": {}});
        assert_eq!(IncomingPayload::detect(v2_str).map(|p| p.mode()), Some("v2"));
        let old = json!({"schemaVersion": 1, "responses": {}});
        assert_eq!(IncomingPayload::detect(old).map(|p| p.mode()), Some("legacy"));
        let no_responses = json!({"schemaVersion": 2, "responses": []});
        assert_eq!(
            IncomingPayload::detect(no_responses).map(|p| p.mode()),
            Some("legacy")
        );
        assert_eq!(IncomingPayload::detect(json!("x")), None);
    }

    #[test]
    fn legacy_fields() {
        let js = json!({
            "respondent": {"occupation": "Researcher", "country": 12},
            "responses": {"mainCategories": {"most": "Economic", "comp_most_0": "Slightly more"}}
        });
        let p = match IncomingPayload::detect(js) {
            Some(IncomingPayload::Legacy(p)) => p,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(p.respondent().occupation, "Researcher");
        assert_eq!(p.respondent().country, "");
        assert_eq!(p.field("mainCategories", "most"), "Economic");
        assert_eq!(p.field("mainCategories", "comp_most_1"), "");
        assert_eq!(p.field("policy", "most"), "");
    }

    #[test]
    fn submission_wire_shape() {
        let reg = SchemaBuilder::new("s", "2026-02")
            .scale("s1", "One")
            .section("k", "K", SectionKind::Main, &[("a", "A"), ("b", "B")])
            .build()
            .unwrap();
        let t = Utc.with_ymd_and_hms(2026, 2, 1, 10, 0, 0).unwrap();
        let p = SubmissionPayload::new(
            &reg,
            Respondent::default(),
            BTreeMap::new(),
            ClientMeta::default(),
            &t,
        );
        let js = p.to_json();
        assert_eq!(js["submittedAt"], "2026-02-01T10:00:00.000Z");
        assert_eq!(js["schemaVersion"], 2);
        assert_eq!(js["schemaSnapshot"]["sections"][0]["key"], "k");
        assert_eq!(js["clientMeta"]["pageUrl"], "");
        let back: SubmissionPayload = serde_json::from_value(js).unwrap();
        assert_eq!(back, p);
        assert_eq!(back.fingerprint(), p.fingerprint());
        assert_eq!(p.fingerprint().len(), 64);
    }

    #[test]
    fn version_as_string() {
        let js = json!({
            "schemaVersion": "2",
            "responses": {},
            "schemaSnapshot": {"schemaVersion": 2, "surveyId": "s", "surveyVersion": "1",
                               "sections": [], "scaleOptions": []}
        });
        let p: SubmissionPayload = serde_json::from_value(js.clone()).unwrap();
        assert_eq!(p.schema_version(), 2);
        assert_eq!(p.survey_id(), "");

        for bad in [json!(2.7), json!(-1.0), json!("2.5")] {
            let mut js = js.clone();
            js["schemaVersion"] = bad;
            assert!(serde_json::from_value::<SubmissionPayload>(js).is_err());
        }
    }
}
