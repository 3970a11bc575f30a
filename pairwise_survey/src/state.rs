use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{empty_as_none, Direction};

/// The most/least pair as it was before an unlock.
///
/// Saved progress carries it next to the responses, keyed by section.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct EditBaseline {
    #[serde(rename = "mostItemId", default, with = "empty_as_none")]
    pub most_item_id: Option<String>,
    #[serde(rename = "leastItemId", default, with = "empty_as_none")]
    pub least_item_id: Option<String>,
}

/// The answers of one section.
///
/// This is the V2 wire shape of a response entry. All the rules about when
/// a field may change live in `SectionMachine`.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionResponseState {
    #[serde(rename = "mostItemId", default, with = "empty_as_none")]
    pub most_item_id: Option<String>,
    #[serde(rename = "leastItemId", default, with = "empty_as_none")]
    pub least_item_id: Option<String>,
    /// other item id -> scale id
    #[serde(rename = "comparisonsMostVsOther", default)]
    pub comparisons_most_vs_other: BTreeMap<String, String>,
    /// other item id -> scale id
    #[serde(rename = "comparisonsOtherVsLeast", default)]
    pub comparisons_other_vs_least: BTreeMap<String, String>,
    #[serde(rename = "othersForMost", default)]
    pub others_for_most: Vec<String>,
    #[serde(rename = "othersForLeast", default)]
    pub others_for_least: Vec<String>,
    /// Set while the selections are unlocked for editing. Not part of the
    /// submitted entry.
    #[serde(skip)]
    pub edit_baseline: Option<EditBaseline>,
}

impl SectionResponseState {
    pub fn answers(&self, direction: Direction) -> &BTreeMap<String, String> {
        match direction {
            Direction::MostVsOther => &self.comparisons_most_vs_other,
            Direction::OtherVsLeast => &self.comparisons_other_vs_least,
        }
    }

    pub fn answers_mut(&mut self, direction: Direction) -> &mut BTreeMap<String, String> {
        match direction {
            Direction::MostVsOther => &mut self.comparisons_most_vs_other,
            Direction::OtherVsLeast => &mut self.comparisons_other_vs_least,
        }
    }

    pub fn others(&self, direction: Direction) -> &[String] {
        match direction {
            Direction::MostVsOther => &self.others_for_most,
            Direction::OtherVsLeast => &self.others_for_least,
        }
    }

    pub fn is_editing(&self) -> bool {
        self.edit_baseline.is_some()
    }

    pub fn has_answers(&self) -> bool {
        !self.comparisons_most_vs_other.is_empty() || !self.comparisons_other_vs_least.is_empty()
    }

    /// Both extremes are chosen and they differ.
    pub fn has_distinct_extremes(&self) -> bool {
        matches!((&self.most_item_id, &self.least_item_id), (Some(m), Some(l)) if m != l)
    }

    /// The first unanswered comparison, most side first.
    pub fn first_unanswered(&self) -> Option<(Direction, &str)> {
        [Direction::MostVsOther, Direction::OtherVsLeast]
            .into_iter()
            .find_map(|d| {
                self.others(d)
                    .iter()
                    .find(|id| !self.answers(d).contains_key(*id))
                    .map(|id| (d, id.as_str()))
            })
    }

    /// Every item of both "others" lists has an answer.
    ///
    /// Empty lists do not count as answered: a section whose comparisons
    /// were never opened is not complete.
    pub fn all_answered(&self) -> bool {
        !self.others_for_most.is_empty() && self.first_unanswered().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_shape() {
        let mut st = SectionResponseState {
            most_item_id: Some("a".to_string()),
            others_for_most: vec!["b".to_string()],
            ..SectionResponseState::default()
        };
        st.comparisons_most_vs_other
            .insert("b".to_string(), "s1".to_string());
        let js = serde_json::to_value(&st).unwrap();
        assert_eq!(
            js,
            json!({
                "mostItemId": "a",
                "leastItemId": "",
                "comparisonsMostVsOther": {"b": "s1"},
                "comparisonsOtherVsLeast": {},
                "othersForMost": ["b"],
                "othersForLeast": []
            })
        );
        let back: SectionResponseState = serde_json::from_value(js).unwrap();
        assert_eq!(back, st);
    }

    #[test]
    fn missing_fields_default() {
        let st: SectionResponseState = serde_json::from_value(json!({"leastItemId": ""})).unwrap();
        assert_eq!(st, SectionResponseState::default());
    }

    #[test]
    fn first_unanswered_walks_most_side_first() {
        let mut st = SectionResponseState {
            others_for_most: vec!["b".to_string(), "c".to_string()],
            others_for_least: vec!["b".to_string()],
            ..SectionResponseState::default()
        };
        assert_eq!(st.first_unanswered(), Some((Direction::MostVsOther, "b")));
        st.comparisons_most_vs_other.insert("b".to_string(), "s".to_string());
        st.comparisons_most_vs_other.insert("c".to_string(), "s".to_string());
        assert_eq!(st.first_unanswered(), Some((Direction::OtherVsLeast, "b")));
        st.comparisons_other_vs_least.insert("b".to_string(), "s".to_string());
        assert!(st.all_answered());
    }
}
