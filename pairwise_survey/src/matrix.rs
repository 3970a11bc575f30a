//! Derivation of the comparison questions of a section.
//!
//! The order of the "others" follows the declared item order. It is the
//! canonical order in which questions are presented and in which the
//! positional legacy answers (`comp_most_<i>`) are interpreted, so it must
//! never depend on anything but the definition.

use snafu::prelude::*;

use crate::config::*;

#[derive(Debug, Snafu, Eq, PartialEq)]
pub enum MatrixError {
    #[snafu(display("item '{item}' is both the most and the least challenging in section '{section}'"))]
    SameSelection { section: String, item: String },
    #[snafu(display("item '{item}' is not declared in section '{section}'"))]
    UnknownItem { section: String, item: String },
}

/// The two ordered lists of items compared against the chosen extremes.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ComparisonMatrix {
    pub others_for_most: Vec<String>,
    pub others_for_least: Vec<String>,
}

impl ComparisonMatrix {
    pub fn others(&self, direction: Direction) -> &[String] {
        match direction {
            Direction::MostVsOther => &self.others_for_most,
            Direction::OtherVsLeast => &self.others_for_least,
        }
    }

    /// Number of comparison questions: `(n - 1) + (n - 2)` for `n` items.
    pub fn question_count(&self) -> usize {
        self.others_for_most.len() + self.others_for_least.len()
    }
}

/// All the items except the most challenging one, in declared order.
pub fn others_for_most(items: &[Item], most_item_id: &str) -> Vec<String> {
    items
        .iter()
        .filter(|i| i.id != most_item_id)
        .map(|i| i.id.clone())
        .collect()
}

/// All the items except both extremes, in declared order.
pub fn others_for_least(items: &[Item], most_item_id: &str, least_item_id: &str) -> Vec<String> {
    items
        .iter()
        .filter(|i| i.id != most_item_id && i.id != least_item_id)
        .map(|i| i.id.clone())
        .collect()
}

/// Builds the comparison matrix of a section for a pair of extremes.
///
/// Both ids are required, must be declared in the section and must differ.
pub fn comparison_matrix(
    section: &Section,
    most_item_id: &str,
    least_item_id: &str,
) -> Result<ComparisonMatrix, MatrixError> {
    for id in [most_item_id, least_item_id] {
        ensure!(
            section.has_item(id),
            UnknownItemSnafu {
                section: &section.key,
                item: id
            }
        );
    }
    ensure!(
        most_item_id != least_item_id,
        SameSelectionSnafu {
            section: &section.key,
            item: most_item_id
        }
    );
    Ok(ComparisonMatrix {
        others_for_most: others_for_most(&section.items, most_item_id),
        others_for_least: others_for_least(&section.items, most_item_id, least_item_id),
    })
}

/// One comparison question, as presented to the respondent.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ComparisonQuestion {
    /// Questions 1 and 2 are the most/least selections, comparisons start at 3.
    pub number: usize,
    pub direction: Direction,
    /// The chosen extreme the question is anchored on.
    pub anchor_item_id: String,
    pub other_item_id: String,
    /// The other item is the opposite extreme (only possible for the most
    /// side: the least item is one of the others of the most item).
    pub other_is_extreme: bool,
}

/// Lays out the numbered questions: all the "most vs other" ones, then all
/// the "other vs least" ones.
pub fn comparison_questions(
    matrix: &ComparisonMatrix,
    most_item_id: &str,
    least_item_id: &str,
) -> Vec<ComparisonQuestion> {
    let most_side = matrix.others_for_most.iter().map(|other| ComparisonQuestion {
        number: 0,
        direction: Direction::MostVsOther,
        anchor_item_id: most_item_id.to_string(),
        other_item_id: other.clone(),
        other_is_extreme: other == least_item_id,
    });
    let least_side = matrix.others_for_least.iter().map(|other| ComparisonQuestion {
        number: 0,
        direction: Direction::OtherVsLeast,
        anchor_item_id: least_item_id.to_string(),
        other_item_id: other.clone(),
        other_is_extreme: other == most_item_id,
    });
    most_side
        .chain(least_side)
        .enumerate()
        .map(|(idx, q)| ComparisonQuestion {
            number: idx + 3,
            ..q
        })
        .collect()
}
