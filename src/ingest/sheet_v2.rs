// Rows written for versioned submissions: one meta row, one row per
// section of the embedded definition and one row per comparison answer.

use std::collections::HashMap;

use crate::ingest::io_common::text;
use crate::ingest::*;

pub const META_SHEET: &str = "Responses_Meta.csv";
pub const SECTIONS_SHEET: &str = "Responses_Sections.csv";
pub const COMPARISONS_SHEET: &str = "Responses_Comparisons.csv";

pub const META_HEADERS: [&str; 21] = [
    "Timestamp",
    "ResponseID",
    "SchemaVersion",
    "SurveyID",
    "SurveyVersion",
    "SubmittedAt",
    "StartTime",
    "EndTime",
    "Name",
    "Email",
    "Organization",
    "Occupation",
    "Industry",
    "Experience",
    "Education",
    "Country",
    "Expertise",
    "ClientTimezone",
    "ClientUserAgent",
    "ClientPageURL",
    "RawJSON",
];

pub const SECTION_HEADERS: [&str; 9] = [
    "Timestamp",
    "ResponseID",
    "SectionKey",
    "SectionTitle",
    "SectionKind",
    "MostItemID",
    "MostItemLabel",
    "LeastItemID",
    "LeastItemLabel",
];

pub const COMPARISON_HEADERS: [&str; 10] = [
    "Timestamp",
    "ResponseID",
    "SectionKey",
    "Direction",
    "AnchorItemID",
    "AnchorItemLabel",
    "OtherItemID",
    "OtherItemLabel",
    "ScaleID",
    "ScaleLabel",
];

#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct V2Rows {
    pub meta: Vec<String>,
    pub sections: Vec<Vec<String>>,
    pub comparisons: Vec<Vec<String>>,
}

fn version_text(js: &JSValue) -> String {
    match js.get("schemaVersion") {
        Some(JSValue::String(s)) => s.clone(),
        Some(v @ JSValue::Number(_)) => v.to_string(),
        _ => "".to_string(),
    }
}

fn meta_row(js: &JSValue, response_id: &str, timestamp: &str) -> Vec<String> {
    let respondent = js.get("respondent").unwrap_or(&JSValue::Null);
    let client = js.get("clientMeta").unwrap_or(&JSValue::Null);
    let submitted_at = match text(js, "submittedAt") {
        "" => timestamp,
        s => s,
    };
    let mut row = vec![
        timestamp.to_string(),
        response_id.to_string(),
        version_text(js),
        text(js, "surveyId").to_string(),
        text(js, "surveyVersion").to_string(),
        submitted_at.to_string(),
    ];
    for name in [
        "startTime",
        "endTime",
        "name",
        "email",
        "organization",
        "occupation",
        "industry",
        "experience",
        "education",
        "country",
        "expertise",
    ] {
        row.push(text(respondent, name).to_string());
    }
    for name in ["timezone", "userAgent", "pageUrl"] {
        row.push(text(client, name).to_string());
    }
    row.push(js.to_string());
    row
}

/// Builds all the rows of a submission that passed validation. Ids and
/// labels are taken from the definition embedded in the submission.
pub fn build_rows(js: &JSValue, response_id: &str, timestamp: &str) -> V2Rows {
    let empty = JSValue::Null;
    let responses = js.get("responses").unwrap_or(&empty);
    let snapshot = js.get("schemaSnapshot").unwrap_or(&empty);

    let scale_labels: HashMap<&str, &str> = snapshot
        .get("scaleOptions")
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .map(|s| (text(s, "id"), text(s, "label")))
        .collect();

    let mut rows = V2Rows {
        meta: meta_row(js, response_id, timestamp),
        ..Default::default()
    };

    let sections = snapshot
        .get("sections")
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten();
    for section in sections {
        let key = text(section, "key");
        let labels: HashMap<&str, &str> = section
            .get("items")
            .and_then(|v| v.as_array())
            .into_iter()
            .flatten()
            .map(|i| (text(i, "id"), text(i, "label")))
            .collect();
        let label = |id: &str| labels.get(id).copied().unwrap_or("").to_string();
        let entry = responses.get(key).unwrap_or(&empty);
        let most = text(entry, "mostItemId");
        let least = text(entry, "leastItemId");

        rows.sections.push(vec![
            timestamp.to_string(),
            response_id.to_string(),
            key.to_string(),
            text(section, "title").to_string(),
            text(section, "kind").to_string(),
            most.to_string(),
            label(most),
            least.to_string(),
            label(least),
        ]);

        for (direction, anchor) in [
            (Direction::MostVsOther, most),
            (Direction::OtherVsLeast, least),
        ] {
            let answers = entry
                .get(direction.field_name())
                .and_then(|v| v.as_object())
                .into_iter()
                .flatten();
            for (other, scale) in answers {
                let scale = scale.as_str().unwrap_or("");
                rows.comparisons.push(vec![
                    timestamp.to_string(),
                    response_id.to_string(),
                    key.to_string(),
                    direction.as_str().to_string(),
                    anchor.to_string(),
                    label(anchor),
                    other.clone(),
                    label(other),
                    scale.to_string(),
                    scale_labels.get(scale).copied().unwrap_or("").to_string(),
                ]);
            }
        }
    }
    debug!(
        "build_rows: {} section row(s), {} comparison row(s)",
        rows.sections.len(),
        rows.comparisons.len()
    );
    rows
}
