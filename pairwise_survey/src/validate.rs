//! Checks of a complete submission against the definition it embeds.
//!
//! The validator only looks at the payload itself: the live definition is
//! never consulted, so a stored submission can be checked again at any time.

use log::debug;
use serde_json::{Map as JSMap, Value as JSValue};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::config::{Direction, MIN_SCHEMA_VERSION};
use crate::payload::SubmissionPayload;

/// One problem found in a submission.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ValidationError {
    pub message: String,
    /// Where the problem is, e.g. `responses.econ.mostItemId`.
    pub path: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.path)
    }
}

struct Report {
    errors: Vec<ValidationError>,
}

impl Report {
    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            message: message.into(),
            path: path.into(),
        });
    }
}

/// `schemaVersion` of a document as a whole number. Numeric strings are
/// accepted, fractions and negative numbers are not.
pub fn schema_version(payload: &JSValue) -> Option<u32> {
    let v = match payload.get("schemaVersion")? {
        JSValue::Number(n) => n.as_f64()?,
        JSValue::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    whole_version(v)
}

pub(crate) fn whole_version(v: f64) -> Option<u32> {
    (v.fract() == 0.0 && v >= 0.0 && v <= u32::MAX as f64).then(|| v as u32)
}

fn non_empty_str(v: Option<&JSValue>) -> Option<&str> {
    v.and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

// section key -> declared item ids
type Declared<'a> = HashMap<&'a str, HashSet<&'a str>>;

fn check_snapshot<'a>(
    snapshot: &'a JSMap<String, JSValue>,
    report: &mut Report,
) -> (Declared<'a>, HashSet<&'a str>) {
    let sections = snapshot.get("sections").and_then(|v| v.as_array());
    let scales = snapshot.get("scaleOptions").and_then(|v| v.as_array());
    if sections.map(|v| v.is_empty()).unwrap_or(true) {
        report.push(
            "schemaSnapshot.sections",
            "schemaSnapshot.sections must be a non-empty array",
        );
    }
    if scales.map(|v| v.is_empty()).unwrap_or(true) {
        report.push(
            "schemaSnapshot.scaleOptions",
            "schemaSnapshot.scaleOptions must be a non-empty array",
        );
    }

    let mut scale_set: HashSet<&'a str> = HashSet::new();
    for (idx, scale) in scales.into_iter().flatten().enumerate() {
        let path = format!("schemaSnapshot.scaleOptions[{}]", idx);
        match non_empty_str(scale.get("id")) {
            None => report.push(path, format!("Invalid scale option at index {}", idx)),
            Some(id) if !scale_set.insert(id) => {
                report.push(path, format!("Duplicate scale id: {}", id))
            }
            Some(_) => {}
        }
    }

    let mut declared: Declared<'a> = HashMap::new();
    for (idx, section) in sections.into_iter().flatten().enumerate() {
        let path = format!("schemaSnapshot.sections[{}]", idx);
        let key = match non_empty_str(section.get("key")) {
            Some(key) => key,
            None => {
                report.push(path, format!("Invalid section at index {}", idx));
                continue;
            }
        };
        if declared.contains_key(key) {
            report.push(path, format!("Duplicate section key: {}", key));
            continue;
        }
        let items = match section.get("items").and_then(|v| v.as_array()) {
            Some(items) if !items.is_empty() => items,
            _ => {
                report.push(
                    format!("{}.items", path),
                    format!("Section '{}' has no items", key),
                );
                continue;
            }
        };
        let mut ids: HashSet<&'a str> = HashSet::new();
        for (item_idx, item) in items.iter().enumerate() {
            let item_path = format!("{}.items[{}]", path, item_idx);
            match non_empty_str(item.get("id")) {
                None => report.push(
                    item_path,
                    format!(
                        "Invalid item in section '{}' at index {}",
                        key, item_idx
                    ),
                ),
                Some(id) if !ids.insert(id) => report.push(
                    item_path,
                    format!("Duplicate item id '{}' in section '{}'", id, key),
                ),
                Some(_) => {}
            }
        }
        declared.insert(key, ids);
    }
    (declared, scale_set)
}

fn check_comparisons(
    section_key: &str,
    entry: &JSMap<String, JSValue>,
    direction: Direction,
    items: &HashSet<&str>,
    scales: &HashSet<&str>,
    excluded: &[&str],
    report: &mut Report,
) {
    let field = direction.field_name();
    let path = format!("responses.{}.{}", section_key, field);
    let map = match entry.get(field) {
        None | Some(JSValue::Null) => return,
        Some(JSValue::Object(map)) => map,
        Some(_) => {
            report.push(
                path,
                format!("{} must be an object in section '{}'", field, section_key),
            );
            return;
        }
    };
    for (other, scale) in map.iter() {
        let other_path = format!("{}.{}", path, other);
        if !items.contains(other.as_str()) {
            report.push(
                other_path,
                format!(
                    "Invalid item id '{}' in {} of section '{}'",
                    other, field, section_key
                ),
            );
            continue;
        }
        if excluded.contains(&other.as_str()) {
            report.push(
                other_path.clone(),
                format!(
                    "Item '{}' is an extreme and cannot be compared in {} of section '{}'",
                    other, field, section_key
                ),
            );
        }
        let scale_ok = scale.as_str().map(|s| scales.contains(s)).unwrap_or(false);
        if !scale_ok {
            report.push(
                other_path,
                format!(
                    "Invalid scale id {} in {} of section '{}'",
                    scale, field, section_key
                ),
            );
        }
    }
}

fn check_others(
    section_key: &str,
    entry: &JSMap<String, JSValue>,
    field: &str,
    items: &HashSet<&str>,
    report: &mut Report,
) {
    let path = format!("responses.{}.{}", section_key, field);
    match entry.get(field) {
        None | Some(JSValue::Null) => {}
        Some(JSValue::Array(ids)) => {
            for (idx, id) in ids.iter().enumerate() {
                if !id.as_str().map(|s| items.contains(s)).unwrap_or(false) {
                    report.push(
                        format!("{}[{}]", path, idx),
                        format!(
                            "Invalid item id {} in {} of section '{}'",
                            id, field, section_key
                        ),
                    );
                }
            }
        }
        Some(_) => report.push(
            path,
            format!("{} must be an array in section '{}'", field, section_key),
        ),
    }
}

fn check_responses(
    responses: &JSMap<String, JSValue>,
    declared: &Declared,
    scales: &HashSet<&str>,
    report: &mut Report,
) {
    for (section_key, entry) in responses.iter() {
        let path = format!("responses.{}", section_key);
        let items = match declared.get(section_key.as_str()) {
            Some(items) => items,
            None => {
                report.push(
                    path,
                    format!("Unknown response section key: {}", section_key),
                );
                continue;
            }
        };
        let entry = match entry.as_object() {
            Some(entry) => entry,
            None => {
                report.push(
                    path,
                    format!(
                        "Section response must be an object for key: {}",
                        section_key
                    ),
                );
                continue;
            }
        };

        let most = non_empty_str(entry.get("mostItemId"));
        let least = non_empty_str(entry.get("leastItemId"));
        if let Some(m) = most.filter(|m| !items.contains(m)) {
            report.push(
                format!("{}.mostItemId", path),
                format!("Invalid mostItemId '{}' in section '{}'", m, section_key),
            );
        }
        if let Some(l) = least.filter(|l| !items.contains(l)) {
            report.push(
                format!("{}.leastItemId", path),
                format!("Invalid leastItemId '{}' in section '{}'", l, section_key),
            );
        }
        if most.is_some() && most == least {
            report.push(
                path.clone(),
                format!(
                    "mostItemId and leastItemId cannot be the same in section '{}'",
                    section_key
                ),
            );
        }

        let most_excluded: Vec<&str> = most.into_iter().collect();
        let least_excluded: Vec<&str> = most.into_iter().chain(least).collect();
        check_comparisons(
            section_key,
            entry,
            Direction::MostVsOther,
            items,
            scales,
            &most_excluded,
            report,
        );
        check_comparisons(
            section_key,
            entry,
            Direction::OtherVsLeast,
            items,
            scales,
            &least_excluded,
            report,
        );
        check_others(section_key, entry, "othersForMost", items, report);
        check_others(section_key, entry, "othersForLeast", items, report);
    }
}

/// Validates a payload of unknown shape.
///
/// Every problem is reported. The only checks that stop early are the ones
/// whose prerequisite is missing: without an object there is nothing to
/// check, and without a schema snapshot the responses cannot be checked.
pub fn validate_value(payload: &JSValue) -> Vec<ValidationError> {
    let mut report = Report { errors: Vec::new() };
    let obj = match payload.as_object() {
        Some(obj) => obj,
        None => {
            report.push("", "Payload must be a JSON object");
            return report.errors;
        }
    };

    match schema_version(payload) {
        Some(v) if v >= MIN_SCHEMA_VERSION => {}
        _ => report.push(
            "schemaVersion",
            format!("schemaVersion must be >= {}", MIN_SCHEMA_VERSION),
        ),
    }
    let responses = obj.get("responses").and_then(|v| v.as_object());
    if responses.is_none() {
        report.push("responses", "responses must be an object");
    }
    let snapshot = match obj.get("schemaSnapshot").and_then(|v| v.as_object()) {
        Some(snapshot) => snapshot,
        None => {
            report.push("schemaSnapshot", "schemaSnapshot is required for v2");
            return report.errors;
        }
    };

    let (declared, scales) = check_snapshot(snapshot, &mut report);
    if let Some(responses) = responses {
        check_responses(responses, &declared, &scales, &mut report);
    }
    debug!("validate_value: {} errors", report.errors.len());
    report.errors
}

/// Validates a payload built in this process, through its wire form.
pub fn validate_submission(payload: &SubmissionPayload) -> Vec<ValidationError> {
    match serde_json::to_value(payload) {
        Ok(js) => validate_value(&js),
        Err(e) => vec![ValidationError {
            message: format!("the payload cannot be serialized: {}", e),
            path: String::new(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(responses: JSValue) -> JSValue {
        json!({
            "schemaVersion": 2,
            "surveyId": "s",
            "surveyVersion": "1",
            "responses": responses,
            "schemaSnapshot": {
                "schemaVersion": 2, "surveyId": "s", "surveyVersion": "1",
                "sections": [{"key": "econ", "title": "Economic", "kind": "sub",
                              "items": [{"id": "a", "label": "A"}, {"id": "b", "label": "B"},
                                        {"id": "c", "label": "C"}, {"id": "d", "label": "D"}]}],
                "scaleOptions": [{"id": "s1", "label": "1"}, {"id": "s2", "label": "2"},
                                 {"id": "s3", "label": "3"}, {"id": "s4", "label": "4"}]
            }
        })
    }

    fn paths(errors: &[ValidationError]) -> Vec<&str> {
        errors.iter().map(|e| e.path.as_str()).collect()
    }

    #[test]
    fn complete_section_is_valid() {
        let p = payload(json!({"econ": {
            "mostItemId": "a", "leastItemId": "d",
            "comparisonsMostVsOther": {"d": "s3", "b": "s1", "c": "s2"},
            "comparisonsOtherVsLeast": {"b": "s4", "c": "s1"},
            "othersForMost": ["b", "c", "d"], "othersForLeast": ["b", "c"]
        }}));
        assert_eq!(validate_value(&p), vec![]);
    }

    #[test]
    fn same_extremes_give_one_error() {
        let p = payload(json!({"econ": {"mostItemId": "a", "leastItemId": "a"}}));
        let errors = validate_value(&p);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "responses.econ");
        assert!(errors[0].message.contains("econ"));
    }

    #[test]
    fn every_problem_is_reported() {
        let p = payload(json!({
            "econ": {
                "mostItemId": "z", "leastItemId": "b",
                "comparisonsMostVsOther": {"q": "s1", "c": "s9"},
                "comparisonsOtherVsLeast": {"b": "s1"},
                "othersForMost": ["a", 3]
            },
            "retired": {}
        }));
        let errors = validate_value(&p);
        let paths = paths(&errors);
        assert_eq!(
            paths,
            vec![
                "responses.econ.mostItemId",
                "responses.econ.comparisonsMostVsOther.c",
                "responses.econ.comparisonsMostVsOther.q",
                "responses.econ.comparisonsOtherVsLeast.b",
                "responses.econ.othersForMost[1]",
                "responses.retired",
            ]
        );
    }

    #[test]
    fn top_level_shape() {
        assert_eq!(validate_value(&json!([])).len(), 1);

        let errors = validate_value(&json!({"schemaVersion": 1, "responses": []}));
        assert_eq!(
            paths(&errors),
            vec!["schemaVersion", "responses", "schemaSnapshot"]
        );

        let mut p = payload(json!({}));
        p["schemaVersion"] = json!("2");
        assert_eq!(validate_value(&p), vec![]);

        for bad in [json!(2.7), json!(-2), json!("3.5"), json!(null)] {
            p["schemaVersion"] = bad;
            assert_eq!(paths(&validate_value(&p)), vec!["schemaVersion"]);
        }
        p["schemaVersion"] = json!(3.0);
        assert_eq!(validate_value(&p), vec![]);
    }

    #[test]
    fn snapshot_consistency() {
        let p = json!({
            "schemaVersion": 2,
            "responses": {"econ": {"mostItemId": "a"}},
            "schemaSnapshot": {
                "sections": [
                    {"key": "econ", "items": [{"id": "a"}, {"id": "a"}]},
                    {"key": "econ", "items": [{"id": "x"}]},
                    {"key": "empty", "items": []}
                ],
                "scaleOptions": [{"id": "s1"}, {"id": "s1"}, {"label": "no id"}]
            }
        });
        let errors = validate_value(&p);
        assert_eq!(
            paths(&errors),
            vec![
                "schemaSnapshot.scaleOptions[1]",
                "schemaSnapshot.scaleOptions[2]",
                "schemaSnapshot.sections[0].items[1]",
                "schemaSnapshot.sections[1]",
                "schemaSnapshot.sections[2].items",
            ]
        );
    }

    #[test]
    fn empty_snapshot_lists() {
        let p = json!({"schemaVersion": 2, "responses": {},
                       "schemaSnapshot": {"sections": [], "scaleOptions": []}});
        assert_eq!(
            paths(&validate_value(&p)),
            vec!["schemaSnapshot.sections", "schemaSnapshot.scaleOptions"]
        );
    }
}
