//! One respondent filling in the survey.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use snafu::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::*;
use crate::machine::{SectionMachine, SectionPhase, TransitionError};
use crate::matrix::{comparison_questions, ComparisonMatrix, ComparisonQuestion};
use crate::normalize::{normalize_responses, NormalizationWarning};
use crate::payload::*;
use crate::registry::SchemaRegistry;
use crate::state::{EditBaseline, SectionResponseState};
use crate::store::*;
use crate::submit::*;
use crate::validate::validate_submission;

#[derive(Debug, Snafu)]
pub enum SessionError {
    #[snafu(display("section '{section}' is not part of the survey"))]
    UnknownSection { section: String },
    #[snafu(display("action refused"))]
    Refused { source: TransitionError },
    #[snafu(display("the comparisons of section '{section}' are not open"))]
    ComparisonsClosed { section: String },
    #[snafu(display("the progress saved under '{key}' is unreadable"))]
    CorruptProgress {
        key: String,
        source: serde_json::Error,
    },
    #[snafu(display("cannot save the progress"))]
    SavingProgress { source: StoreError },
}

/// What a page shows.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Page<'a> {
    Introduction,
    Demographics,
    Section(&'a Section),
}

/// The first thing missing on a page.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Gap {
    /// A mandatory demographic field, by its payload name.
    Demographic(&'static str),
    MostItem,
    LeastItem,
    /// Both extremes are chosen but the comparisons were not opened.
    Confirmation,
    Comparison {
        direction: Direction,
        other_item_id: String,
    },
}

/// A restored session, with what could not be restored.
#[derive(Debug)]
pub struct RestoredSession {
    pub session: SurveySession,
    pub warnings: Vec<NormalizationWarning>,
}

/// The whole state of one respondent.
///
/// Pages: 0 is the introduction, 1 the demographics, then one page per
/// section in declared order.
#[derive(Debug, Clone)]
pub struct SurveySession {
    registry: Arc<SchemaRegistry>,
    respondent: Respondent,
    // Created the first time a section is touched.
    sections: BTreeMap<String, SectionMachine>,
    current_page: usize,
    client_meta: ClientMeta,
}

impl SurveySession {
    pub fn new(registry: Arc<SchemaRegistry>) -> SurveySession {
        SurveySession {
            registry,
            respondent: Respondent::default(),
            sections: BTreeMap::new(),
            current_page: 0,
            client_meta: ClientMeta::default(),
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn respondent(&self) -> &Respondent {
        &self.respondent
    }

    pub fn respondent_mut(&mut self) -> &mut Respondent {
        &mut self.respondent
    }

    pub fn set_client_meta(&mut self, client_meta: ClientMeta) {
        self.client_meta = client_meta;
    }

    // ******** Pages *********

    pub fn total_pages(&self) -> usize {
        2 + self.registry.sections().len()
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    fn clamp_page(&self, page: usize) -> usize {
        page.min(self.total_pages() - 1)
    }

    /// Moves to a page. Out of range pages go to the last one.
    pub fn navigate(&mut self, page: usize) -> usize {
        self.current_page = self.clamp_page(page);
        self.current_page
    }

    pub fn page(&self, page: usize) -> Option<Page<'_>> {
        match page {
            0 => Some(Page::Introduction),
            1 => Some(Page::Demographics),
            n => self.registry.sections().get(n - 2).map(Page::Section),
        }
    }

    pub fn is_page_complete(&self, page: usize) -> bool {
        match self.page(page) {
            Some(Page::Introduction) => true,
            Some(Page::Demographics) => self.respondent.is_complete(),
            Some(Page::Section(s)) => self
                .sections
                .get(&s.key)
                .map(|m| m.is_complete())
                .unwrap_or(false),
            None => false,
        }
    }

    /// The pages that still need answers. The introduction never does.
    pub fn incomplete_pages(&self) -> Vec<usize> {
        (1..self.total_pages())
            .filter(|p| !self.is_page_complete(*p))
            .collect()
    }

    /// The first missing answer on a page.
    pub fn first_gap(&self, page: usize) -> Option<Gap> {
        match self.page(page)? {
            Page::Introduction => None,
            Page::Demographics => self.respondent.first_missing().map(Gap::Demographic),
            Page::Section(s) => {
                let machine = self.sections.get(&s.key);
                let st = machine.map(|m| m.state());
                if st.and_then(|st| st.most_item_id.as_ref()).is_none() {
                    Some(Gap::MostItem)
                } else if st.and_then(|st| st.least_item_id.as_ref()).is_none() {
                    Some(Gap::LeastItem)
                } else if !machine.map(|m| m.is_locked()).unwrap_or(false) {
                    Some(Gap::Confirmation)
                } else {
                    st.and_then(|st| st.first_unanswered())
                        .map(|(direction, other)| Gap::Comparison {
                            direction,
                            other_item_id: other.to_string(),
                        })
                }
            }
        }
    }

    // ******** Sections *********

    fn section(&self, key: &str) -> Result<&Section, SessionError> {
        self.registry
            .section(key)
            .context(UnknownSectionSnafu { section: key })
    }

    fn machine_mut(&mut self, key: &str) -> Result<(&Section, &mut SectionMachine), SessionError> {
        let section = self
            .registry
            .section(key)
            .context(UnknownSectionSnafu { section: key })?;
        let machine = self.sections.entry(key.to_string()).or_default();
        Ok((section, machine))
    }

    /// The answers of a section, `None` when it was never touched.
    pub fn section_state(&self, key: &str) -> Option<&SectionResponseState> {
        self.sections.get(key).map(|m| m.state())
    }

    pub fn phase(&self, key: &str) -> Result<SectionPhase, SessionError> {
        self.section(key)?;
        Ok(self
            .sections
            .get(key)
            .map(|m| m.phase())
            .unwrap_or(SectionPhase::Empty))
    }

    pub fn select_most(&mut self, key: &str, item_id: Option<&str>) -> Result<SectionPhase, SessionError> {
        let (section, machine) = self.machine_mut(key)?;
        machine.select_most(section, item_id).context(RefusedSnafu {})
    }

    pub fn select_least(&mut self, key: &str, item_id: Option<&str>) -> Result<SectionPhase, SessionError> {
        let (section, machine) = self.machine_mut(key)?;
        machine.select_least(section, item_id).context(RefusedSnafu {})
    }

    pub fn select(
        &mut self,
        key: &str,
        most: Option<&str>,
        least: Option<&str>,
    ) -> Result<SectionPhase, SessionError> {
        let (section, machine) = self.machine_mut(key)?;
        machine.select(section, most, least).context(RefusedSnafu {})
    }

    /// Opens the comparisons of a section.
    pub fn confirm(&mut self, key: &str) -> Result<ComparisonMatrix, SessionError> {
        let (section, machine) = self.machine_mut(key)?;
        machine.confirm(section).context(RefusedSnafu {})
    }

    pub fn unlock(&mut self, key: &str) -> Result<(), SessionError> {
        let (section, machine) = self.machine_mut(key)?;
        machine.unlock(section).context(RefusedSnafu {})
    }

    pub fn record(
        &mut self,
        key: &str,
        direction: Direction,
        other_item_id: &str,
        scale_id: &str,
    ) -> Result<(), SessionError> {
        let (_, machine) = self.machine_mut(key)?;
        machine
            .record(key, direction, other_item_id, scale_id)
            .context(RefusedSnafu {})
    }

    /// The numbered comparison questions of an open section.
    pub fn questions(&self, key: &str) -> Result<Vec<ComparisonQuestion>, SessionError> {
        self.section(key)?;
        let machine = self
            .sections
            .get(key)
            .filter(|m| m.is_locked())
            .context(ComparisonsClosedSnafu { section: key })?;
        let st = machine.state();
        let matrix = ComparisonMatrix {
            others_for_most: st.others_for_most.clone(),
            others_for_least: st.others_for_least.clone(),
        };
        Ok(comparison_questions(
            &matrix,
            st.most_item_id.as_deref().unwrap_or(""),
            st.least_item_id.as_deref().unwrap_or(""),
        ))
    }

    // ******** Outputs *********

    /// The answers of every section, restricted to what the definition
    /// declares. Untouched sections are present and empty.
    pub fn sanitized_responses(&self) -> BTreeMap<String, SectionResponseState> {
        let default = SectionResponseState::default();
        self.registry
            .sections()
            .iter()
            .map(|section| {
                let st = self
                    .sections
                    .get(&section.key)
                    .map(|m| m.state())
                    .unwrap_or(&default);
                (section.key.clone(), self.sanitize(section, st))
            })
            .collect()
    }

    fn sanitize(&self, section: &Section, st: &SectionResponseState) -> SectionResponseState {
        let declared = |id: &String| section.has_item(id);
        let mut out = SectionResponseState {
            most_item_id: st.most_item_id.clone().filter(declared),
            least_item_id: st.least_item_id.clone().filter(declared),
            others_for_most: st.others_for_most.iter().filter(|id| declared(*id)).cloned().collect(),
            others_for_least: st.others_for_least.iter().filter(|id| declared(*id)).cloned().collect(),
            ..SectionResponseState::default()
        };
        for direction in [Direction::MostVsOther, Direction::OtherVsLeast] {
            let kept: BTreeMap<String, String> = st
                .answers(direction)
                .iter()
                .filter(|(other, scale)| {
                    out.others(direction).contains(*other) && self.registry.has_scale(scale)
                })
                .map(|(o, s)| (o.clone(), s.clone()))
                .collect();
            *out.answers_mut(direction) = kept;
        }
        out
    }

    fn stamp_start(&mut self, now: &DateTime<Utc>) {
        if self.respondent.start_time.is_empty() {
            self.respondent.start_time = iso_timestamp(now);
        }
    }

    pub fn progress_blob(&self, now: &DateTime<Utc>) -> ProgressBlob {
        let snapshot = self.registry.snapshot();
        ProgressBlob {
            schema_version: snapshot.schema_version,
            survey_id: snapshot.survey_id.clone(),
            survey_version: snapshot.survey_version.clone(),
            respondent_info: self.respondent.clone(),
            responses: self.sanitized_responses(),
            current_page: self.current_page,
            timestamp: iso_timestamp(now),
            edit_baselines: self
                .sections
                .iter()
                .filter_map(|(key, m)| m.state().edit_baseline.clone().map(|b| (key.clone(), b)))
                .collect(),
        }
    }

    /// Saves the progress. Called after every change.
    pub fn save_progress(&mut self, store: &mut dyn BlobStore, now: &DateTime<Utc>) -> Result<(), SessionError> {
        self.stamp_start(now);
        let blob = self.progress_blob(now);
        let js = serde_json::to_string(&blob).context(CorruptProgressSnafu { key: PROGRESS_KEY })?;
        store.set(PROGRESS_KEY, js).context(SavingProgressSnafu {})
    }

    /// Restores the saved progress, if any.
    ///
    /// The answers are mapped onto the given definition. Sections saved while
    /// unlocked come back unlocked, with the pair they had before the unlock.
    /// Other sections whose extremes are both chosen and which already have
    /// answers come back with their comparisons open.
    pub fn load_progress(
        registry: Arc<SchemaRegistry>,
        store: &dyn BlobStore,
    ) -> Result<Option<RestoredSession>, SessionError> {
        let (key, raw) = match store
            .get(PROGRESS_KEY)
            .map(|v| (PROGRESS_KEY, v))
            .or_else(|| store.get(LEGACY_PROGRESS_KEY).map(|v| (LEGACY_PROGRESS_KEY, v)))
        {
            Some(found) => found,
            None => return Ok(None),
        };
        let blob: serde_json::Value = serde_json::from_str(&raw).context(CorruptProgressSnafu { key })?;
        debug!("SurveySession::load_progress: restoring from {}", key);

        let respondent = blob
            .get("respondentInfo")
            .or_else(|| blob.get("respondent"))
            .map(loose_respondent)
            .unwrap_or_default();
        let normalized = normalize_responses(&registry, blob.get("responses").unwrap_or(&serde_json::Value::Null));
        let mut baselines: BTreeMap<String, EditBaseline> = match blob.get("editBaselines") {
            Some(js) => serde_json::from_value(js.clone()).context(CorruptProgressSnafu { key })?,
            None => BTreeMap::new(),
        };

        let mut session = SurveySession::new(registry.clone());
        session.respondent = respondent;
        for (section_key, st) in normalized.responses {
            let reopen = st.has_distinct_extremes() && st.has_answers();
            let mut machine = SectionMachine::from_state(st);
            let section = registry.section(&section_key);
            if let (Some(section), Some(baseline)) = (section, baselines.remove(&section_key)) {
                machine.resume_edit(section, baseline);
            } else if reopen {
                if let Some(section) = section {
                    if let Err(e) = machine.restore(section) {
                        warn!(
                            "SurveySession::load_progress: section {} stays closed: {}",
                            section_key, e
                        );
                    }
                }
            }
            session.sections.insert(section_key, machine);
        }
        let page = blob.get("currentPage").and_then(|p| p.as_u64()).unwrap_or(0);
        session.navigate(page as usize);

        if !normalized.warnings.is_empty() {
            info!(
                "SurveySession::load_progress: {} notes while restoring",
                normalized.warnings.len()
            );
        }
        Ok(Some(RestoredSession {
            session,
            warnings: normalized.warnings,
        }))
    }

    /// Forgets everything, including the saved progress.
    pub fn reset(&mut self, store: &mut dyn BlobStore) {
        store.remove(PROGRESS_KEY);
        store.remove(LEGACY_PROGRESS_KEY);
        self.respondent = Respondent::default();
        self.sections.clear();
        self.current_page = 0;
    }

    /// The document offered for manual download.
    pub fn export(&self, now: &DateTime<Utc>) -> ExportBlob {
        let snapshot = self.registry.snapshot();
        ExportBlob {
            schema_version: snapshot.schema_version,
            survey_id: snapshot.survey_id.clone(),
            survey_version: snapshot.survey_version.clone(),
            respondent_info: self.respondent.clone(),
            responses: self.sanitized_responses(),
            current_page: self.current_page,
            exported: iso_timestamp(now),
            schema_snapshot: snapshot.embedded(),
        }
    }

    pub fn submission_payload(&mut self, now: &DateTime<Utc>) -> SubmissionPayload {
        self.stamp_start(now);
        SubmissionPayload::new(
            &self.registry,
            self.respondent.clone(),
            self.sanitized_responses(),
            self.client_meta.clone(),
            now,
        )
    }

    /// Submits the answers.
    ///
    /// Nothing is sent while a page is incomplete or the payload does not
    /// validate. When the sink cannot be reached or refuses the payload, the
    /// payload is kept in `store` under a `survey_backup_<millis>` key. There
    /// is no retry.
    pub fn submit(
        &mut self,
        transport: &mut dyn Transport,
        store: &mut dyn BlobStore,
        now: &DateTime<Utc>,
    ) -> Result<SubmissionReceipt, SubmitError> {
        let pages = self.incomplete_pages();
        ensure!(pages.is_empty(), IncompletePagesSnafu { pages });

        self.respondent.end_time = iso_timestamp(now);
        let payload = self.submission_payload(now);
        let errors = validate_submission(&payload);
        ensure!(errors.is_empty(), InvalidSubmissionSnafu { errors });

        match transport.send(&payload) {
            Ok(SinkResponse::Success {
                mode, response_id, ..
            }) => {
                info!("SurveySession::submit: accepted as {} ({})", response_id, mode);
                Ok(SubmissionReceipt {
                    mode,
                    response_id,
                    payload,
                })
            }
            Ok(SinkResponse::Error { message }) => {
                warn!("SurveySession::submit: rejected: {}", message);
                let backup_key = keep_backup(store, &payload, now);
                RejectedSnafu {
                    backup_key,
                    message,
                }
                .fail()
            }
            Err(failure) => {
                warn!("SurveySession::submit: not delivered: {}", failure);
                let backup_key = keep_backup(store, &payload, now);
                Err(failure).context(NotDeliveredSnafu { backup_key })
            }
        }
    }
}

fn keep_backup(store: &mut dyn BlobStore, payload: &SubmissionPayload, now: &DateTime<Utc>) -> Option<String> {
    let key = backup_key(now);
    match store.set(&key, payload.to_json().to_string()) {
        Ok(()) => Some(key),
        Err(e) => {
            warn!("keep_backup: the payload is lost: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SchemaBuilder;
    use chrono::TimeZone;

    fn registry() -> Arc<SchemaRegistry> {
        Arc::new(
            SchemaBuilder::new("s", "1")
                .scale("s1", "One")
                .scale("s2", "Two")
                .section("main", "Main", SectionKind::Main, &[("x", "X"), ("y", "Y")])
                .section(
                    "econ",
                    "Economic",
                    SectionKind::Sub,
                    &[("a", "A"), ("b", "B"), ("c", "C")],
                )
                .build()
                .unwrap(),
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn pages() {
        let mut s = SurveySession::new(registry());
        assert_eq!(s.total_pages(), 4);
        assert_eq!(s.navigate(17), 3);
        assert!(matches!(s.page(3), Some(Page::Section(sec)) if sec.key == "econ"));
        assert_eq!(s.page(4), None);
        assert!(s.is_page_complete(0));
        assert_eq!(s.incomplete_pages(), vec![1, 2, 3]);
        assert_eq!(s.first_gap(1), Some(Gap::Demographic("occupation")));
        assert_eq!(s.first_gap(2), Some(Gap::MostItem));
    }

    #[test]
    fn gaps_follow_the_workflow() {
        let mut s = SurveySession::new(registry());
        s.select_most("econ", Some("a")).unwrap();
        assert_eq!(s.first_gap(3), Some(Gap::LeastItem));
        s.select_least("econ", Some("c")).unwrap();
        assert_eq!(s.first_gap(3), Some(Gap::Confirmation));
        s.confirm("econ").unwrap();
        assert_eq!(
            s.first_gap(3),
            Some(Gap::Comparison {
                direction: Direction::MostVsOther,
                other_item_id: "b".to_string()
            })
        );
        s.record("econ", Direction::MostVsOther, "b", "s1").unwrap();
        s.record("econ", Direction::MostVsOther, "c", "s2").unwrap();
        s.record("econ", Direction::OtherVsLeast, "b", "s2").unwrap();
        assert_eq!(s.first_gap(3), None);
        assert!(s.is_page_complete(3));
        assert_eq!(s.questions("econ").unwrap().len(), 3);
    }

    #[test]
    fn unknown_section() {
        let mut s = SurveySession::new(registry());
        assert!(matches!(
            s.select_most("nope", Some("a")),
            Err(SessionError::UnknownSection { .. })
        ));
        assert!(matches!(
            s.questions("econ"),
            Err(SessionError::ComparisonsClosed { .. })
        ));
    }

    #[test]
    fn sanitized_covers_every_section() {
        let mut s = SurveySession::new(registry());
        s.select("econ", Some("a"), Some("b")).unwrap();
        s.confirm("econ").unwrap();
        s.record("econ", Direction::MostVsOther, "c", "s1").unwrap();
        let out = s.sanitized_responses();
        assert_eq!(out.len(), 2);
        assert_eq!(out["main"], SectionResponseState::default());
        assert_eq!(out["econ"].comparisons_most_vs_other.len(), 1);
    }

    #[test]
    fn save_and_load() {
        let reg = registry();
        let mut store = MemoryStore::new();
        let mut s = SurveySession::new(reg.clone());
        s.respondent_mut().occupation = "Researcher".to_string();
        s.select("econ", Some("a"), Some("c")).unwrap();
        s.confirm("econ").unwrap();
        s.record("econ", Direction::MostVsOther, "b", "s1").unwrap();
        s.select_most("main", Some("x")).unwrap();
        s.navigate(3);
        s.save_progress(&mut store, &now()).unwrap();

        let restored = SurveySession::load_progress(reg.clone(), &store)
            .unwrap()
            .unwrap();
        assert!(restored.warnings.is_empty());
        let r = restored.session;
        assert_eq!(r.current_page(), 3);
        assert_eq!(r.respondent().occupation, "Researcher");
        assert_eq!(r.respondent().start_time, "2026-02-01T09:30:00.000Z");
        assert_eq!(r.phase("econ").unwrap(), SectionPhase::ComparisonsOpen { complete: false });
        assert_eq!(r.phase("main").unwrap(), SectionPhase::PrimaryChosen { conflict: false });
        assert_eq!(r.sanitized_responses(), s.sanitized_responses());

        let mut r = r;
        r.reset(&mut store);
        assert!(store.is_empty());
        assert!(SurveySession::load_progress(reg, &store).unwrap().is_none());
    }

    #[test]
    fn edit_survives_a_reload() {
        let reg = registry();
        let mut store = MemoryStore::new();
        let mut s = SurveySession::new(reg.clone());
        s.select("econ", Some("a"), Some("c")).unwrap();
        s.confirm("econ").unwrap();
        s.record("econ", Direction::MostVsOther, "b", "s1").unwrap();
        s.record("econ", Direction::MostVsOther, "c", "s2").unwrap();
        s.record("econ", Direction::OtherVsLeast, "b", "s2").unwrap();
        s.unlock("econ").unwrap();
        s.select_most("econ", Some("b")).unwrap();
        s.save_progress(&mut store, &now()).unwrap();

        let saved: serde_json::Value = serde_json::from_str(&store.get(PROGRESS_KEY).unwrap()).unwrap();
        assert_eq!(saved["editBaselines"]["econ"]["mostItemId"], "a");
        assert_eq!(saved["responses"]["econ"].get("editBaseline"), None);

        let mut r = SurveySession::load_progress(reg, &store).unwrap().unwrap().session;
        assert_eq!(r.phase("econ").unwrap(), SectionPhase::Editing { conflict: false });
        assert!(r.record("econ", Direction::MostVsOther, "c", "s1").is_err());
        r.confirm("econ").unwrap();
        let st = r.section_state("econ").unwrap();
        assert!(st.comparisons_most_vs_other.is_empty());
        assert_eq!(st.others_for_most, vec!["a", "c"]);
        assert_eq!(st.comparisons_other_vs_least["b"], "s2");
    }

    #[test]
    fn legacy_key_and_corrupt_blob() {
        let reg = registry();
        let mut store = MemoryStore::new();
        store
            .set(
                LEGACY_PROGRESS_KEY,
                r#"{"respondent": {"country": "Germany"}, "responses": {"econ": {"most": "A"}}, "currentPage": 99}"#
                    .to_string(),
            )
            .unwrap();
        let r = SurveySession::load_progress(reg.clone(), &store).unwrap().unwrap();
        assert_eq!(r.session.respondent().country, "Germany");
        assert_eq!(r.session.current_page(), 3);
        assert_eq!(
            r.session.section_state("econ").unwrap().most_item_id.as_deref(),
            Some("a")
        );

        store.set(PROGRESS_KEY, "{not json".to_string()).unwrap();
        assert!(matches!(
            SurveySession::load_progress(reg, &store),
            Err(SessionError::CorruptProgress { .. })
        ));
    }

    #[test]
    fn export_embeds_the_definition() {
        let s = SurveySession::new(registry());
        let e = s.export(&now());
        assert_eq!(e.exported, "2026-02-01T09:30:00.000Z");
        assert_eq!(e.schema_snapshot.sections.len(), 2);
        assert_eq!(e.responses.len(), 2);
    }
}
