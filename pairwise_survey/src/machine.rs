//! The per-section workflow.
//!
//! ```text
//! Empty -> PrimaryChosen -> ComparisonsOpen(complete|incomplete)
//!                                 |   ^
//!                          unlock v   | confirm (partial invalidation)
//!                                Editing
//! ```
//!
//! While the comparisons are open the most/least selections are locked.
//! There is no separate "locked" state: locked and open are the same thing,
//! and completeness is derived from the recorded answers.

use log::debug;
use snafu::prelude::*;

use crate::config::*;
use crate::matrix::{comparison_matrix, ComparisonMatrix, MatrixError};
use crate::state::{EditBaseline, SectionResponseState};

/// An action that is not allowed in the current state of a section.
#[derive(Debug, Snafu, Eq, PartialEq)]
pub enum TransitionError {
    #[snafu(display("the selections of section '{section}' are locked, unlock them first"))]
    SelectionLocked { section: String },
    #[snafu(display("item '{item}' is not declared in section '{section}'"))]
    UnknownItem { section: String, item: String },
    #[snafu(display("both the most and the least challenging items of section '{section}' must be chosen"))]
    SelectionIncomplete { section: String },
    #[snafu(display("cannot open the comparisons"))]
    InvalidPair { source: MatrixError },
    #[snafu(display("the selections of section '{section}' are not locked"))]
    NotLocked { section: String },
    #[snafu(display("item '{item}' is not compared in {direction} of section '{section}'"))]
    NotAComparisonTarget {
        section: String,
        direction: Direction,
        item: String,
    },
}

/// The observable state of a section.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum SectionPhase {
    /// Nothing selected yet.
    Empty,
    /// At least one extreme is selected. `conflict` is raised when the same
    /// item was picked for both.
    PrimaryChosen { conflict: bool },
    /// Selections are locked and the comparison questions are answerable.
    ComparisonsOpen { complete: bool },
    /// Selections were unlocked after having been locked.
    Editing { conflict: bool },
}

/// Drives one `SectionResponseState` through its workflow.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct SectionMachine {
    state: SectionResponseState,
    locked: bool,
}

impl SectionMachine {
    pub fn new() -> SectionMachine {
        SectionMachine::default()
    }

    /// Wraps answers loaded from elsewhere. The section starts unlocked.
    pub fn from_state(state: SectionResponseState) -> SectionMachine {
        SectionMachine {
            state,
            locked: false,
        }
    }

    pub fn state(&self) -> &SectionResponseState {
        &self.state
    }

    pub fn into_state(self) -> SectionResponseState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn phase(&self) -> SectionPhase {
        let conflict = matches!(
            (&self.state.most_item_id, &self.state.least_item_id),
            (Some(m), Some(l)) if m == l
        );
        if self.locked {
            SectionPhase::ComparisonsOpen {
                complete: self.state.all_answered(),
            }
        } else if self.state.is_editing() {
            SectionPhase::Editing { conflict }
        } else if self.state.most_item_id.is_some() || self.state.least_item_id.is_some() {
            SectionPhase::PrimaryChosen { conflict }
        } else {
            SectionPhase::Empty
        }
    }

    /// Complete means: comparisons open and every comparison answered.
    pub fn is_complete(&self) -> bool {
        self.phase() == SectionPhase::ComparisonsOpen { complete: true }
    }

    pub fn select_most(
        &mut self,
        section: &Section,
        item_id: Option<&str>,
    ) -> Result<SectionPhase, TransitionError> {
        let least = self.state.least_item_id.clone();
        self.select(section, item_id, least.as_deref())
    }

    pub fn select_least(
        &mut self,
        section: &Section,
        item_id: Option<&str>,
    ) -> Result<SectionPhase, TransitionError> {
        let most = self.state.most_item_id.clone();
        self.select(section, most.as_deref(), item_id)
    }

    /// Sets both extremes at once. Picking the same item twice is accepted
    /// and reported through the phase; the comparisons cannot be opened
    /// until it is resolved.
    pub fn select(
        &mut self,
        section: &Section,
        most: Option<&str>,
        least: Option<&str>,
    ) -> Result<SectionPhase, TransitionError> {
        ensure!(
            !self.locked,
            SelectionLockedSnafu {
                section: &section.key
            }
        );
        let most = most.filter(|s| !s.is_empty());
        let least = least.filter(|s| !s.is_empty());
        for id in most.iter().chain(least.iter()) {
            ensure!(
                section.has_item(id),
                UnknownItemSnafu {
                    section: &section.key,
                    item: *id
                }
            );
        }
        self.state.most_item_id = most.map(|s| s.to_string());
        self.state.least_item_id = least.map(|s| s.to_string());
        let phase = self.phase();
        debug!(
            "SectionMachine::select: section {:?}: most {:?} least {:?} -> {:?}",
            section.key, most, least, phase
        );
        Ok(phase)
    }

    /// Confirms the selections and opens the comparisons.
    ///
    /// When the section was unlocked for editing, the answers that depend on
    /// a changed extreme are discarded:
    /// - both changed: every answer and both "others" lists,
    /// - only the most item changed: the "most vs other" answers,
    /// - only the least item changed: the "other vs least" answers,
    /// - nothing changed: nothing.
    pub fn confirm(&mut self, section: &Section) -> Result<ComparisonMatrix, TransitionError> {
        if self.locked {
            return Ok(ComparisonMatrix {
                others_for_most: self.state.others_for_most.clone(),
                others_for_least: self.state.others_for_least.clone(),
            });
        }
        let matrix = self.current_matrix(section)?;
        if let Some(baseline) = self.state.edit_baseline.take() {
            let most_changed = baseline.most_item_id != self.state.most_item_id;
            let least_changed = baseline.least_item_id != self.state.least_item_id;
            debug!(
                "SectionMachine::confirm: section {:?}: re-entry, most changed: {}, least changed: {}",
                section.key, most_changed, least_changed
            );
            if most_changed {
                self.state.comparisons_most_vs_other.clear();
                self.state.others_for_most.clear();
            }
            if least_changed {
                self.state.comparisons_other_vs_least.clear();
                self.state.others_for_least.clear();
            }
        }
        Ok(self.open(matrix))
    }

    /// Re-opens the comparisons of answers restored from storage, without
    /// discarding anything.
    pub fn restore(&mut self, section: &Section) -> Result<ComparisonMatrix, TransitionError> {
        let matrix = self.current_matrix(section)?;
        self.state.edit_baseline = None;
        Ok(self.open(matrix))
    }

    /// Unlocks the selections. The comparisons are hidden until the next
    /// `confirm`; the answers are kept until then.
    pub fn unlock(&mut self, section: &Section) -> Result<(), TransitionError> {
        ensure!(
            self.locked,
            NotLockedSnafu {
                section: &section.key
            }
        );
        self.locked = false;
        self.state.edit_baseline = Some(EditBaseline {
            most_item_id: self.state.most_item_id.clone(),
            least_item_id: self.state.least_item_id.clone(),
        });
        debug!(
            "SectionMachine::unlock: section {:?}: baseline {:?}",
            section.key, self.state.edit_baseline
        );
        Ok(())
    }

    /// Puts back a section that was saved while unlocked for editing. The
    /// next `confirm` compares the selections with `baseline`.
    pub fn resume_edit(&mut self, section: &Section, baseline: EditBaseline) {
        let declared = |id: &String| section.has_item(id);
        self.locked = false;
        self.state.edit_baseline = Some(EditBaseline {
            most_item_id: baseline.most_item_id.filter(declared),
            least_item_id: baseline.least_item_id.filter(declared),
        });
        debug!(
            "SectionMachine::resume_edit: section {:?}: baseline {:?}",
            section.key, self.state.edit_baseline
        );
    }

    /// Records one comparison answer. Recording the same answer twice is the
    /// same as recording it once; recording another scale replaces it.
    ///
    /// The comparisons must be open, and the other item must be in the
    /// active "others" list. Scale ids are checked when the submission is
    /// validated.
    pub fn record(
        &mut self,
        section_key: &str,
        direction: Direction,
        other_item_id: &str,
        scale_id: &str,
    ) -> Result<(), TransitionError> {
        ensure!(
            self.locked,
            NotLockedSnafu {
                section: section_key
            }
        );
        ensure!(
            self.state
                .others(direction)
                .iter()
                .any(|id| id == other_item_id),
            NotAComparisonTargetSnafu {
                section: section_key,
                direction,
                item: other_item_id
            }
        );
        self.state
            .answers_mut(direction)
            .insert(other_item_id.to_string(), scale_id.to_string());
        Ok(())
    }

    fn current_matrix(&self, section: &Section) -> Result<ComparisonMatrix, TransitionError> {
        match (&self.state.most_item_id, &self.state.least_item_id) {
            (Some(most), Some(least)) => {
                comparison_matrix(section, most, least).context(InvalidPairSnafu {})
            }
            _ => SelectionIncompleteSnafu {
                section: &section.key,
            }
            .fail(),
        }
    }

    fn open(&mut self, matrix: ComparisonMatrix) -> ComparisonMatrix {
        self.state.others_for_most = matrix.others_for_most.clone();
        self.state.others_for_least = matrix.others_for_least.clone();
        self.locked = true;
        matrix
    }
}
